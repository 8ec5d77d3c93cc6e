//! Shared setup for CLI commands: logging, config discovery and the cache store.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use tracing_subscriber::EnvFilter;
use tributary_cache::FileStore;
use tributary_config::{load_config, TributaryConfig, CONFIG_FILE, DEFAULT_CACHE_DIR_NAME};

use crate::GlobalArgs;

/// Suffix of the default store directory, a sibling of the shared cache directory.
///
/// Every child of the cache directory is a per-consumer artifact directory,
/// so the store stays outside it.
const STORE_DIR_SUFFIX: &str = "_store";

/// Installs the stderr log subscriber.
///
/// `RUST_LOG` wins when set. Otherwise `--verbose` selects debug, `--quiet`
/// selects error, and the default is info.
pub fn init_logging(global: &GlobalArgs) {
    let default_level = if global.verbose {
        "debug"
    } else if global.quiet {
        "error"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Walks up from `start` looking for the nearest directory containing `tributary.toml`.
pub fn find_config_root(start: &Path) -> Result<PathBuf, Box<dyn std::error::Error>> {
    let mut current = start.to_path_buf();
    loop {
        if current.join(CONFIG_FILE).is_file() {
            return Ok(current);
        }
        if !current.pop() {
            return Err(format!(
                "could not find {CONFIG_FILE} in {} or any parent directory",
                start.display()
            )
            .into());
        }
    }
}

/// Loads the configuration named by `--config`, or the nearest one above the
/// current directory.
pub fn load_settings(global: &GlobalArgs) -> Result<TributaryConfig, Box<dyn std::error::Error>> {
    let path = match global.config {
        Some(ref config_path) => PathBuf::from(config_path),
        None => find_config_root(&std::env::current_dir()?)?,
    };
    Ok(load_config(&path)?)
}

/// Directory backing the file store: `cache.store_dir`, else `<cache dir>_store`.
pub fn store_dir(config: &TributaryConfig) -> PathBuf {
    if let Some(dir) = &config.cache.store_dir {
        return dir.clone();
    }
    let cache_dir = config.cache.cache_dir();
    let mut name = cache_dir
        .file_name()
        .map(OsStr::to_os_string)
        .unwrap_or_else(|| DEFAULT_CACHE_DIR_NAME.into());
    name.push(STORE_DIR_SUFFIX);
    cache_dir.with_file_name(name)
}

/// Opens the file store the listing cache lives in.
pub fn open_store(config: &TributaryConfig) -> Result<FileStore, Box<dyn std::error::Error>> {
    let dir = store_dir(config);
    tracing::debug!("using cache store at {}", dir.display());
    Ok(FileStore::open(&dir)?)
}
