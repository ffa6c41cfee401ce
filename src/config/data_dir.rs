use dyn_clone::DynClone;
use std::path::{Path, PathBuf};

use crate::config::ConfigToml;

/// Where dotrelay keeps its config file.
///
/// `PersistentDataDir` lives on disk, `MockDataDir` only exists in tests.
pub trait DataDir: std::fmt::Debug + DynClone + Send + Sync {
    fn path(&self) -> &Path;

    /// Creates the directory if needed and checks that we can write into it.
    fn ensure_data_dir_exists_and_is_writable(&self) -> anyhow::Result<()>;

    /// Writes a commented out sample if `config.toml` is missing.
    /// Returns the path of the file it created.
    fn create_config_file_if_missing(&self) -> anyhow::Result<Option<PathBuf>>;

    fn read_config_file(&self) -> anyhow::Result<ConfigToml>;
}

dyn_clone::clone_trait_object!(DataDir);
