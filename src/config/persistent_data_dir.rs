use super::{data_dir::DataDir, ConfigToml};
use std::{
    io::Write,
    path::{Path, PathBuf},
};

const CONFIG_FILE_NAME: &str = "config.toml";

/// Data directory on disk. Defaults to `~/.dotrelay`.
#[derive(Debug, Clone)]
pub struct PersistentDataDir {
    expanded_path: PathBuf,
}

impl PersistentDataDir {
    /// `path` is expanded to the home directory if it starts with "~/".
    pub fn new(path: PathBuf) -> Self {
        Self {
            expanded_path: Self::expand_home_dir(path),
        }
    }

    fn expand_home_dir(path: PathBuf) -> PathBuf {
        let without_home = match path.strip_prefix("~") {
            Ok(rest) => rest,
            Err(_) => return path,
        };

        match dirs::home_dir() {
            Some(home) => home.join(without_home),
            None => path,
        }
    }

    pub fn get_config_file_path(&self) -> PathBuf {
        self.expanded_path.join(CONFIG_FILE_NAME)
    }

    fn write_sample_config_file(&self) -> anyhow::Result<()> {
        let mut config_file = std::fs::File::create(self.get_config_file_path())?;
        config_file.write_all(ConfigToml::commented_out_sample().as_bytes())?;
        Ok(())
    }
}

impl DataDir for PersistentDataDir {
    fn path(&self) -> &Path {
        &self.expanded_path
    }

    fn ensure_data_dir_exists_and_is_writable(&self) -> anyhow::Result<()> {
        std::fs::create_dir_all(&self.expanded_path)?;

        let probe = self.expanded_path.join(".write_probe");
        std::fs::write(&probe, b"probe")
            .map_err(|err| anyhow::anyhow!("Data directory {} is not writable: {err}", self.expanded_path.display()))?;
        std::fs::remove_file(&probe)
            .map_err(|err| anyhow::anyhow!("Data directory {} is not writable: {err}", self.expanded_path.display()))?;
        Ok(())
    }

    fn create_config_file_if_missing(&self) -> anyhow::Result<Option<PathBuf>> {
        let config_file_path = self.get_config_file_path();
        if config_file_path.exists() {
            return Ok(None);
        }
        self.write_sample_config_file()?;
        Ok(Some(config_file_path))
    }

    fn read_config_file(&self) -> anyhow::Result<ConfigToml> {
        ConfigToml::from_file(self.get_config_file_path())
    }
}
