use std::path::PathBuf;

use crate::config::{ConfigToml, DataDir};

#[derive(Debug, Clone)]
pub struct AppContext {
    pub config: ConfigToml,
    pub data_dir: Box<dyn DataDir>,
    /// Sample config written on this start. Logged once logging is up.
    pub created_config_file: Option<PathBuf>,
}

impl AppContext {
    pub fn from_data_dir(data_dir: impl DataDir + 'static) -> Result<Self, anyhow::Error> {
        data_dir.ensure_data_dir_exists_and_is_writable()?;
        let created_config_file = data_dir.create_config_file_if_missing()?;
        let config = data_dir.read_config_file()?;
        Ok(Self {
            config,
            data_dir: Box::new(data_dir),
            created_config_file,
        })
    }
}
