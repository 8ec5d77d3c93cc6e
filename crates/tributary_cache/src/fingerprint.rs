//! Project fingerprinting for listing-cache invalidation.
//!
//! A fingerprint combines a digest of every file under the project directory
//! with a digest of the arguments that influence the tool's output. It never
//! looks at modification times: deployments that sync files around rewrite
//! them freely, so only content counts.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Instant;

use tributary_common::{ContentHash, ContentHasher};
use walkdir::WalkDir;

use crate::error::CacheError;

/// Read buffer used while streaming project files into the hasher.
const READ_CHUNK: usize = 64 * 1024;

/// Computes version tokens for a project directory and its command arguments.
pub struct Fingerprinter;

impl Fingerprinter {
    /// Lists every regular file under `dir`, sorted lexicographically.
    ///
    /// Symlinks are followed, so a working directory made of links to the
    /// real project produces the same listing as the project itself.
    pub fn collect_files(dir: &Path) -> Result<Vec<PathBuf>, CacheError> {
        let mut files = Vec::new();
        for entry in WalkDir::new(dir).follow_links(true) {
            let entry = entry.map_err(|e| {
                let path = e.path().unwrap_or(dir).to_path_buf();
                CacheError::io(path, e.into())
            })?;
            if entry.file_type().is_file() {
                files.push(entry.into_path());
            }
        }
        files.sort();
        Ok(files)
    }

    /// Digests the contents of every file under `dir`, in sorted path order.
    ///
    /// An empty directory yields the hash of empty input.
    pub fn hash_dir(dir: &Path) -> Result<ContentHash, CacheError> {
        let mut hasher = ContentHasher::new();
        let mut buf = vec![0u8; READ_CHUNK];
        for path in Self::collect_files(dir)? {
            let mut file = File::open(&path).map_err(|e| CacheError::io(&path, e))?;
            loop {
                let n = file.read(&mut buf).map_err(|e| CacheError::io(&path, e))?;
                if n == 0 {
                    break;
                }
                hasher.update(&buf[..n]);
            }
        }
        Ok(hasher.finish())
    }

    /// Digests the concatenation of `args`.
    pub fn hash_args(args: &[String]) -> ContentHash {
        ContentHash::from_bytes(args.concat().as_bytes())
    }

    /// Returns `"<dir digest>,<args digest>"` for the project and arguments.
    ///
    /// `label` only names the cache in the timing log line.
    pub fn fingerprint(label: &str, dir: &Path, args: &[String]) -> Result<String, CacheError> {
        let start = Instant::now();
        let dir_hash = Self::hash_dir(dir)?;
        let args_hash = Self::hash_args(args);
        tracing::info!(
            "time to calculate cache identifier {label} for current version: {:?}",
            start.elapsed()
        );
        Ok(format!("{dir_hash},{args_hash}"))
    }
}

/// Returns `true` when a previously stored version differs from the current one.
pub fn was_project_modified(previous_version: &str, current_version: &str) -> bool {
    previous_version != current_version
}
