mod config_toml;
mod data_dir;
#[cfg(test)]
mod mock_data_dir;
mod persistent_data_dir;

pub use config_toml::{ConfigToml, Relay};
pub use data_dir::DataDir;
#[cfg(test)]
pub use mock_data_dir::MockDataDir;
pub use persistent_data_dir::PersistentDataDir;
