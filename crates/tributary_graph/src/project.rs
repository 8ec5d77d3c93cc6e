//! Staging of a project into an ephemeral working directory.

use std::path::Path;

use crate::error::LoadError;

/// Directory the tool writes logs into.
pub const LOG_DIR_NAME: &str = "logs";

/// Directory the tool installs packages into.
pub const PACKAGES_DIR_NAME: &str = "dbt_packages";

/// Files that declare package dependencies.
pub const DEPENDENCY_FILES: [&str; 2] = ["packages.yml", "dependencies.yml"];

/// Entries never linked into a working directory.
const ALWAYS_SKIPPED: [&str; 3] = [LOG_DIR_NAME, tributary_cache::TARGET_DIR_NAME, "package-lock.yml"];

/// Links every top-level entry of `project_dir` into `working_dir`.
///
/// Tool output directories are left out so that each run writes its own.
/// Installed packages are left out when `install_deps` is set, because the
/// run reinstalls them into the working directory.
pub fn create_symlinks(project_dir: &Path, working_dir: &Path, install_deps: bool) -> Result<(), LoadError> {
    let entries = std::fs::read_dir(project_dir).map_err(|e| LoadError::io(project_dir, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| LoadError::io(project_dir, e))?;
        let name = entry.file_name();
        let name_str = name.to_string_lossy();
        if ALWAYS_SKIPPED.contains(&&*name_str) {
            continue;
        }
        if install_deps && name_str == PACKAGES_DIR_NAME {
            continue;
        }
        let link = working_dir.join(&name);
        symlink(&entry.path(), &link).map_err(|e| LoadError::io(link, e))?;
    }
    Ok(())
}

#[cfg(unix)]
fn symlink(original: &Path, link: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(original, link)
}

#[cfg(windows)]
fn symlink(original: &Path, link: &Path) -> std::io::Result<()> {
    if original.is_dir() {
        std::os::windows::fs::symlink_dir(original, link)
    } else {
        std::os::windows::fs::symlink_file(original, link)
    }
}

/// Returns `true` if the project declares at least one package dependency file
/// with non-blank content.
pub fn has_non_empty_dependencies_file(project_dir: &Path) -> bool {
    let found = DEPENDENCY_FILES.iter().any(|name| {
        std::fs::read_to_string(project_dir.join(name)).is_ok_and(|content| !content.trim().is_empty())
    });
    if !found {
        tracing::info!(
            "project {} has no non-empty dependency file, skipping package installation",
            project_dir.display()
        );
    }
    found
}
