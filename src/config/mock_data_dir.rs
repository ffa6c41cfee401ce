use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use super::{ConfigToml, DataDir};

/// Data directory backed by a temp dir. Removed when the last clone is dropped.
#[derive(Debug, Clone)]
pub struct MockDataDir {
    temp_dir: Arc<tempfile::TempDir>,
    pub config_toml: ConfigToml,
}

impl MockDataDir {
    pub fn new(config_toml: ConfigToml) -> anyhow::Result<Self> {
        Ok(Self {
            temp_dir: Arc::new(tempfile::TempDir::new()?),
            config_toml,
        })
    }

    pub fn test() -> Self {
        Self::new(ConfigToml::test()).expect("failed to create MockDataDir")
    }
}

impl DataDir for MockDataDir {
    fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    fn ensure_data_dir_exists_and_is_writable(&self) -> anyhow::Result<()> {
        Ok(()) // tempfile already created it.
    }

    fn create_config_file_if_missing(&self) -> anyhow::Result<Option<PathBuf>> {
        Ok(None)
    }

    fn read_config_file(&self) -> anyhow::Result<ConfigToml> {
        Ok(self.config_toml.clone())
    }
}
