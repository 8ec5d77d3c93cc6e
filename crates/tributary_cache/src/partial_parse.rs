//! Reconciliation of the tool's incremental-parse artifact.
//!
//! The artifact (`target/partial_parse.msgpack`, plus the companion
//! `target/manifest.json`) lets the tool skip re-parsing unchanged files. It
//! lives in the project directory, in a shared cache directory, and in each
//! ephemeral working directory. Before a run the freshest copy is staged into
//! the working directory; after a run the result is harvested back into the
//! shared directory. Concurrent writers are not coordinated: the last copy wins.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use rmpv::Value;

use crate::error::CacheError;

/// Name of the tool's output directory inside a project.
pub const TARGET_DIR_NAME: &str = "target";

/// File name of the incremental-parse artifact.
pub const PARTIAL_PARSE_FILE_NAME: &str = "partial_parse.msgpack";

/// File name of the companion manifest.
pub const MANIFEST_FILE_NAME: &str = "manifest.json";

/// Returns `<dir>/target/partial_parse.msgpack`.
pub fn partial_parse_path(dir: &Path) -> PathBuf {
    dir.join(TARGET_DIR_NAME).join(PARTIAL_PARSE_FILE_NAME)
}

fn companion_manifest(artifact: &Path) -> PathBuf {
    artifact.with_file_name(MANIFEST_FILE_NAME)
}

fn modified_time(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

fn copy_file(from: &Path, to: &Path) -> Result<(), CacheError> {
    std::fs::copy(from, to)
        .map(|_| ())
        .map_err(|e| CacheError::io(to, e))
}

/// Field of a node record naming the directory the node was parsed from.
const ROOT_PATH_KEY: &str = "root_path";

/// Value stored under a string `key` of a msgpack map. Non-map values have no entries.
fn map_entry_mut<'v>(map: &'v mut Value, key: &str) -> Option<&'v mut Value> {
    match map {
        Value::Map(entries) => entries
            .iter_mut()
            .find(|(k, _)| k.as_str() == Some(key))
            .map(|(_, v)| v),
        _ => None,
    }
}

/// Moves the incremental-parse artifact between project, shared and working directories.
pub struct ArtifactReconciler;

impl ArtifactReconciler {
    /// Picks the newest artifact among the project's and the shared directory's.
    ///
    /// On equal modification times the shared copy wins. Returns `None` if
    /// neither exists.
    pub fn pull(project_dir: &Path, shared_dir: &Path) -> Option<PathBuf> {
        let project = partial_parse_path(project_dir);
        let shared = partial_parse_path(shared_dir);
        match (modified_time(&project), modified_time(&shared)) {
            (Some(p), Some(s)) if p > s => Some(project),
            (Some(_), Some(_)) => Some(shared),
            (Some(_), None) => Some(project),
            (None, Some(_)) => Some(shared),
            (None, None) => None,
        }
    }

    /// Copies `artifact` (and its manifest, if any) into `working_dir/target`
    /// and rewrites stale root paths to point at `working_dir`.
    pub fn stage(artifact: &Path, working_dir: &Path) -> Result<(), CacheError> {
        let target_dir = working_dir.join(TARGET_DIR_NAME);
        std::fs::create_dir_all(&target_dir).map_err(|e| CacheError::io(&target_dir, e))?;

        let staged = partial_parse_path(working_dir);
        copy_file(artifact, &staged)?;
        Self::patch(&staged, working_dir);

        let manifest = companion_manifest(artifact);
        if manifest.exists() {
            copy_file(&manifest, &companion_manifest(&staged))?;
        }
        Ok(())
    }

    /// Rewrites `root_path` of node records that point at directories that no
    /// longer exist. Returns `true` if the file was rewritten.
    ///
    /// Records are visited in stored order. Records without a root path are
    /// skipped and the scan stops at the first root path that exists, since
    /// every record written by one run shares the same root. An unreadable
    /// artifact is logged and left alone.
    pub fn patch(artifact: &Path, project_dir: &Path) -> bool {
        match Self::try_patch(artifact, project_dir) {
            Ok(patched) => patched,
            Err(e) => {
                tracing::info!("unable to patch the partial parse artifact: {e}");
                false
            }
        }
    }

    fn try_patch(artifact: &Path, project_dir: &Path) -> Result<bool, CacheError> {
        let corrupt = |reason: String| CacheError::CorruptArtifact {
            path: artifact.to_path_buf(),
            reason,
        };

        let bytes = std::fs::read(artifact).map_err(|e| CacheError::io(artifact, e))?;
        let mut data = rmpv::decode::read_value(&mut bytes.as_slice())
            .map_err(|e| corrupt(e.to_string()))?;
        let nodes = match map_entry_mut(&mut data, "nodes") {
            Some(Value::Map(nodes)) => nodes,
            _ => return Err(corrupt("missing `nodes` map".to_string())),
        };

        let replacement = project_dir.to_string_lossy().into_owned();
        let mut dirty = false;
        for (_, record) in nodes.iter_mut() {
            let Some(root) = map_entry_mut(record, ROOT_PATH_KEY) else {
                continue;
            };
            let stale = match &*root {
                Value::Nil => continue,
                Value::String(root) => root
                    .as_str()
                    .is_some_and(|r| !r.is_empty() && !Path::new(r).exists()),
                _ => false,
            };
            if !stale {
                break;
            }
            *root = Value::from(replacement.as_str());
            dirty = true;
        }

        if dirty {
            let mut packed = Vec::with_capacity(bytes.len());
            rmpv::encode::write_value(&mut packed, &data).map_err(|e| {
                CacheError::Serialization {
                    reason: e.to_string(),
                }
            })?;
            std::fs::write(artifact, packed).map_err(|e| CacheError::io(artifact, e))?;
        }
        Ok(dirty)
    }

    /// Copies the working directory's artifact and manifest into `shared_dir/target`.
    ///
    /// Returns `false` when the run left no artifact behind. A missing
    /// manifest is tolerated.
    pub fn harvest(working_dir: &Path, shared_dir: &Path) -> Result<bool, CacheError> {
        let produced = partial_parse_path(working_dir);
        if !produced.exists() {
            return Ok(false);
        }
        let target_dir = shared_dir.join(TARGET_DIR_NAME);
        std::fs::create_dir_all(&target_dir).map_err(|e| CacheError::io(&target_dir, e))?;

        let shared = partial_parse_path(shared_dir);
        copy_file(&produced, &shared)?;
        let manifest = companion_manifest(&produced);
        if manifest.exists() {
            copy_file(&manifest, &companion_manifest(&shared))?;
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    fn write_artifact(dir: &Path, data: &serde_json::Value) -> PathBuf {
        let path = partial_parse_path(dir);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, rmp_serde::to_vec(data).unwrap()).unwrap();
        path
    }

    fn read_artifact(path: &Path) -> serde_json::Value {
        rmp_serde::from_slice(&std::fs::read(path).unwrap()).unwrap()
    }

    fn set_mtime(path: &Path, age_secs: u64) {
        let file = std::fs::File::options().write(true).open(path).unwrap();
        file.set_modified(SystemTime::now() - Duration::from_secs(age_secs))
            .unwrap();
    }

    #[test]
    fn pull_prefers_newer() {
        let project = tempfile::tempdir().unwrap();
        let shared = tempfile::tempdir().unwrap();
        let p = write_artifact(project.path(), &json!({"nodes": {}}));
        let s = write_artifact(shared.path(), &json!({"nodes": {}}));

        set_mtime(&p, 10);
        set_mtime(&s, 100);
        assert_eq!(ArtifactReconciler::pull(project.path(), shared.path()), Some(p.clone()));

        set_mtime(&p, 100);
        set_mtime(&s, 10);
        assert_eq!(ArtifactReconciler::pull(project.path(), shared.path()), Some(s));
    }

    #[test]
    fn pull_equal_mtime_prefers_shared() {
        let project = tempfile::tempdir().unwrap();
        let shared = tempfile::tempdir().unwrap();
        let p = write_artifact(project.path(), &json!({"nodes": {}}));
        let s = write_artifact(shared.path(), &json!({"nodes": {}}));
        set_mtime(&p, 50);
        set_mtime(&s, 50);
        assert_eq!(ArtifactReconciler::pull(project.path(), shared.path()), Some(s));
    }

    #[test]
    fn pull_single_or_none() {
        let project = tempfile::tempdir().unwrap();
        let shared = tempfile::tempdir().unwrap();
        assert_eq!(ArtifactReconciler::pull(project.path(), shared.path()), None);

        let s = write_artifact(shared.path(), &json!({"nodes": {}}));
        assert_eq!(ArtifactReconciler::pull(project.path(), shared.path()), Some(s));
    }

    #[test]
    fn patch_rewrites_stale_roots_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_artifact(
            dir.path(),
            &json!({"nodes": {
                "macro.x": {"name": "x"},
                "model.shop.a": {"root_path": "/gone/old/project"},
                "model.shop.b": {"root_path": "/gone/old/project"}
            }}),
        );
        let project = dir.path().join("work");

        assert!(ArtifactReconciler::patch(&path, &project));
        let data = read_artifact(&path);
        let expected = project.to_string_lossy();
        assert_eq!(data["nodes"]["model.shop.a"]["root_path"], *expected);
        assert_eq!(data["nodes"]["model.shop.b"]["root_path"], *expected);
        assert!(data["nodes"]["macro.x"].get("root_path").is_none());

        std::fs::create_dir_all(&project).unwrap();
        assert!(!ArtifactReconciler::patch(&path, &project));
    }

    #[test]
    fn patch_stops_at_first_existing_root() {
        let dir = tempfile::tempdir().unwrap();
        let existing = dir.path().to_string_lossy().into_owned();
        let path = write_artifact(
            dir.path(),
            &json!({"nodes": {
                "model.shop.a": {"root_path": existing},
                "model.shop.b": {"root_path": "/gone/old/project"}
            }}),
        );
        let before = std::fs::read(&path).unwrap();

        assert!(!ArtifactReconciler::patch(&path, Path::new("/new")));
        assert_eq!(std::fs::read(&path).unwrap(), before);
    }

    #[test]
    fn patch_keeps_extension_and_binary_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = partial_parse_path(dir.path());
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        let record = |root: &str| {
            Value::Map(vec![
                (Value::from("root_path"), Value::from(root)),
                (Value::from("created_at"), Value::Ext(2, b"2024-01-01".to_vec())),
                (Value::from("checksum"), Value::Binary(vec![0xde, 0xad, 0xbe, 0xef])),
            ])
        };
        let artifact = |root: &str| {
            Value::Map(vec![
                (Value::from("version"), Value::from(3u64)),
                (
                    Value::from("nodes"),
                    Value::Map(vec![(Value::from("model.shop.a"), record(root))]),
                ),
            ])
        };
        let mut bytes = Vec::new();
        rmpv::encode::write_value(&mut bytes, &artifact("/gone/x")).unwrap();
        std::fs::write(&path, bytes).unwrap();
        let project = dir.path().join("work");

        assert!(ArtifactReconciler::patch(&path, &project));

        let written = std::fs::read(&path).unwrap();
        let data = rmpv::decode::read_value(&mut written.as_slice()).unwrap();
        assert_eq!(data, artifact(&project.to_string_lossy()));
    }

    #[test]
    fn patch_corrupt_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = partial_parse_path(dir.path());
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, b"\xc1\xc1 definitely not msgpack").unwrap();
        assert!(!ArtifactReconciler::patch(&path, dir.path()));
    }

    #[test]
    fn stage_copies_and_patches() {
        let shared = tempfile::tempdir().unwrap();
        let work = tempfile::tempdir().unwrap();
        let artifact = write_artifact(
            shared.path(),
            &json!({"nodes": {"model.shop.a": {"root_path": "/gone"}}}),
        );
        std::fs::write(companion_manifest(&artifact), "{}").unwrap();

        ArtifactReconciler::stage(&artifact, work.path()).unwrap();

        let staged = partial_parse_path(work.path());
        let data = read_artifact(&staged);
        assert_eq!(
            data["nodes"]["model.shop.a"]["root_path"],
            *work.path().to_string_lossy()
        );
        assert!(work.path().join("target/manifest.json").exists());
    }

    #[test]
    fn stage_without_manifest() {
        let shared = tempfile::tempdir().unwrap();
        let work = tempfile::tempdir().unwrap();
        let artifact = write_artifact(shared.path(), &json!({"nodes": {}}));
        ArtifactReconciler::stage(&artifact, work.path()).unwrap();
        assert!(partial_parse_path(work.path()).exists());
        assert!(!work.path().join("target/manifest.json").exists());
    }

    #[test]
    fn harvest_copies_back() {
        let work = tempfile::tempdir().unwrap();
        let shared = tempfile::tempdir().unwrap();
        assert!(!ArtifactReconciler::harvest(work.path(), shared.path()).unwrap());

        let produced = write_artifact(work.path(), &json!({"nodes": {"n": {}}}));
        std::fs::write(companion_manifest(&produced), "{\"nodes\": {}}").unwrap();

        assert!(ArtifactReconciler::harvest(work.path(), shared.path()).unwrap());
        assert_eq!(
            std::fs::read(partial_parse_path(shared.path())).unwrap(),
            std::fs::read(&produced).unwrap()
        );
        assert!(shared.path().join("target/manifest.json").exists());
    }
}
