//! `tributary gc`: deletes listing caches of entities that have not run recently.

use chrono::{TimeDelta, Utc};
use tributary_cache::{delete_unused_cache, FileHistory, GcReport};

use crate::setup::{load_settings, open_store};
use crate::{GcArgs, GlobalArgs};

/// Runs the `gc` subcommand.
pub fn run(args: &GcArgs, global: &GlobalArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let config = load_settings(global)?;
    let history_file = config
        .cache
        .history_file
        .as_deref()
        .ok_or("gc needs cache.history_file to know when entities last ran")?;

    let store = open_store(&config)?;
    let history = FileHistory::new(history_file);
    let report = delete_unused_cache(&store, &history, max_age(args), Utc::now())?;

    if !global.quiet {
        println!("{}", summary(&report));
        for key in &report.deleted_keys {
            println!("  deleted {key}");
        }
    }
    Ok(0)
}

fn max_age(args: &GcArgs) -> TimeDelta {
    TimeDelta::days(i64::from(args.max_age_days))
}

fn summary(report: &GcReport) -> String {
    format!(
        "scanned {} cache entries, deleted {}",
        report.scanned, report.deleted
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn max_age_in_days() {
        assert_eq!(max_age(&GcArgs { max_age_days: 7 }), TimeDelta::days(7));
        assert_eq!(max_age(&GcArgs { max_age_days: 0 }), TimeDelta::zero());
    }

    #[test]
    fn summary_counts() {
        let report = GcReport {
            scanned: 4,
            deleted: 1,
            deleted_keys: vec!["tributary_cache__old".to_string()],
        };
        assert_eq!(summary(&report), "scanned 4 cache entries, deleted 1");
    }

    #[test]
    fn gc_without_history_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("tributary.toml"), "[cache]\nstore_dir = \"kv\"\n").unwrap();
        let global = GlobalArgs {
            quiet: true,
            verbose: false,
            config: Some(dir.path().to_string_lossy().into_owned()),
        };

        let err = run(&GcArgs { max_age_days: 1 }, &global).unwrap_err();
        assert!(err.to_string().contains("history_file"));
    }

    #[test]
    fn gc_with_empty_history_keeps_everything() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("tributary.toml"),
            "[cache]\nstore_dir = \"kv\"\nhistory_file = \"runs.json\"\n",
        )
        .unwrap();
        let global = GlobalArgs {
            quiet: true,
            verbose: false,
            config: Some(dir.path().to_string_lossy().into_owned()),
        };

        assert_eq!(run(&GcArgs { max_age_days: 1 }, &global).unwrap(), 0);
    }
}
