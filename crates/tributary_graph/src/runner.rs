//! Invocation of the external tool.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::error::LoadError;

/// Message the tool prints when packages must be installed first.
const MISSING_DEPS_MARKER: &str = "Run \"dbt deps\" to install package dependencies";

/// Flag name that contains the word `Error` without reporting one.
const ERROR_FALSE_POSITIVE: &str = "WarnErrorOptions";

/// Captured result of one tool invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolOutput {
    /// Whether the process exited with status zero.
    pub success: bool,
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
}

/// Runs external commands on behalf of the loader.
pub trait ToolRunner {
    /// Runs `command` in `cwd` with exactly the environment `env`.
    fn run(
        &self,
        command: &[String],
        cwd: &Path,
        env: &BTreeMap<String, String>,
    ) -> Result<ToolOutput, LoadError>;

    /// Resolves an executable name or path.
    fn locate(&self, executable: &str) -> Option<PathBuf> {
        which::which(executable).ok()
    }
}

/// Runs commands as blocking child processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

impl ToolRunner for ProcessRunner {
    fn run(
        &self,
        command: &[String],
        cwd: &Path,
        env: &BTreeMap<String, String>,
    ) -> Result<ToolOutput, LoadError> {
        let (program, args) = command
            .split_first()
            .ok_or_else(|| LoadError::Configuration("empty command".to_string()))?;
        let output = Command::new(program)
            .args(args)
            .current_dir(cwd)
            .env_clear()
            .envs(env)
            .output()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => LoadError::ExecutableNotFound(program.clone()),
                _ => LoadError::io(program, e),
            })?;
        Ok(ToolOutput {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Finds the executable to run: `primary` if it resolves, else `fallback`.
pub fn resolve_executable(
    runner: &dyn ToolRunner,
    primary: &str,
    fallback: Option<&str>,
) -> Result<PathBuf, LoadError> {
    if let Some(path) = runner.locate(primary) {
        return Ok(path);
    }
    if let Some(fallback) = fallback.filter(|f| !f.is_empty()) {
        if let Some(path) = runner.locate(fallback) {
            tracing::warn!("unable to find `{primary}`, using `{fallback}` instead");
            return Ok(path);
        }
    }
    Err(LoadError::ExecutableNotFound(primary.to_string()))
}

/// Runs `command` and returns its stdout, or the error it reported.
///
/// A run fails when the process exits non-zero or when stdout mentions
/// `Error` (the tool sometimes exits zero after printing one).
pub fn run_command(
    runner: &dyn ToolRunner,
    command: &[String],
    cwd: &Path,
    env: &BTreeMap<String, String>,
) -> Result<String, LoadError> {
    let command_line = command.join(" ");
    tracing::info!("running command: `{command_line}`");
    tracing::debug!("environment variable keys: {:?}", env.keys().collect::<Vec<_>>());

    let output = runner.run(command, cwd, env)?;

    if command.get(1).map(String::as_str) == Some("ls") && output.stdout.contains(MISSING_DEPS_MARKER) {
        let details = if output.stderr.is_empty() {
            output.stdout
        } else {
            format!("{}\n{}", output.stdout, output.stderr)
        };
        return Err(LoadError::MissingDependency {
            command: command_line,
            details,
        });
    }
    if !output.success || output.stdout.replace(ERROR_FALSE_POSITIVE, "").contains("Error") {
        let details = if output.stderr.is_empty() {
            output.stdout
        } else {
            output.stderr
        };
        return Err(LoadError::ExternalTool {
            command: command_line,
            details,
        });
    }
    Ok(output.stdout)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Canned(ToolOutput);

    impl ToolRunner for Canned {
        fn run(&self, _: &[String], _: &Path, _: &BTreeMap<String, String>) -> Result<ToolOutput, LoadError> {
            Ok(self.0.clone())
        }

        fn locate(&self, executable: &str) -> Option<PathBuf> {
            (executable == "present").then(|| PathBuf::from("/bin/present"))
        }
    }

    fn cmd(args: &[&str]) -> Vec<String> {
        args.iter().map(|s| s.to_string()).collect()
    }

    fn output(success: bool, stdout: &str, stderr: &str) -> ToolOutput {
        ToolOutput {
            success,
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
        }
    }

    fn run(out: ToolOutput, args: &[&str]) -> Result<String, LoadError> {
        run_command(&Canned(out), &cmd(args), Path::new("."), &BTreeMap::new())
    }

    #[test]
    fn success_returns_stdout() {
        let stdout = run(output(true, "{\"a\": 1}\n", ""), &["dbt", "ls"]).unwrap();
        assert_eq!(stdout, "{\"a\": 1}\n");
    }

    #[test]
    fn warn_error_options_is_not_an_error() {
        let out = output(true, "flags: WarnErrorOptions(include=[])", "");
        assert!(run(out, &["dbt", "ls"]).is_ok());
    }

    #[test]
    fn error_in_stdout_fails() {
        let out = output(true, "Compilation Error in model x", "");
        match run(out, &["dbt", "ls"]) {
            Err(LoadError::ExternalTool { command, details }) => {
                assert_eq!(command, "dbt ls");
                assert_eq!(details, "Compilation Error in model x");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn nonzero_exit_prefers_stderr() {
        let out = output(false, "partial", "boom");
        match run(out, &["dbt", "deps"]) {
            Err(LoadError::ExternalTool { details, .. }) => assert_eq!(details, "boom"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn missing_deps_only_for_ls() {
        let stdout = "Run \"dbt deps\" to install package dependencies";
        match run(output(false, stdout, "exit 2"), &["dbt", "ls"]) {
            Err(LoadError::MissingDependency { command, details }) => {
                assert_eq!(command, "dbt ls");
                assert_eq!(details, format!("{stdout}\nexit 2"));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(
            run(output(false, stdout, ""), &["dbt", "compile"]),
            Err(LoadError::ExternalTool { .. })
        ));
    }

    #[test]
    fn executable_resolution() {
        let runner = Canned(ToolOutput::default());
        assert_eq!(
            resolve_executable(&runner, "present", None).unwrap(),
            PathBuf::from("/bin/present")
        );
        assert_eq!(
            resolve_executable(&runner, "absent", Some("present")).unwrap(),
            PathBuf::from("/bin/present")
        );
        assert!(matches!(
            resolve_executable(&runner, "absent", Some("also_absent")),
            Err(LoadError::ExecutableNotFound(name)) if name == "absent"
        ));
    }

    #[cfg(unix)]
    #[test]
    fn process_runner_missing_program() {
        let result = ProcessRunner.run(
            &cmd(&["/nonexistent/tool-binary"]),
            Path::new("."),
            &BTreeMap::new(),
        );
        assert!(matches!(result, Err(LoadError::ExecutableNotFound(_))));
    }

    #[cfg(unix)]
    #[test]
    fn process_runner_captures_output() {
        let mut env = BTreeMap::new();
        env.insert("GREETING".to_string(), "hello".to_string());
        let out = ProcessRunner
            .run(&cmd(&["/bin/sh", "-c", "echo $GREETING; echo oops >&2"]), Path::new("."), &env)
            .unwrap();
        assert!(out.success);
        assert_eq!(out.stdout, "hello\n");
        assert_eq!(out.stderr, "oops\n");
    }
}
