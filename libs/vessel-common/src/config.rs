// Store configuration shared by the worker and the CLI
use std::path::PathBuf;

pub const DATA_DIR_ENV: &str = "VESSEL_DATA_DIR";
pub const DEFAULT_DATA_DIR: &str = "./data";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    pub data_dir: PathBuf,
}

impl StoreConfig {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }
}
