use crate::infrastructure::config::{AppSettings, ensure_default_configs, load_app_settings};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::storage::initialize_database;
use std::fs;
use std::path::{Path, PathBuf};

pub const DATABASE_FILE_NAME: &str = "study_tracker.sqlite";

#[derive(Debug)]
pub struct BootstrapResult {
    pub logs_dir: PathBuf,
    pub database_path: PathBuf,
    pub settings: AppSettings,
}

pub fn bootstrap_workspace(workspace_root: &Path) -> Result<BootstrapResult, InfraError> {
    let config_dir = workspace_root.join("config");
    let state_dir = workspace_root.join("state");
    let logs_dir = workspace_root.join("logs");
    let database_path = state_dir.join(DATABASE_FILE_NAME);

    fs::create_dir_all(&config_dir)?;
    fs::create_dir_all(&state_dir)?;
    fs::create_dir_all(&logs_dir)?;

    ensure_default_configs(&config_dir)?;
    let settings = load_app_settings(&config_dir)?;
    initialize_database(&database_path)?;

    Ok(BootstrapResult {
        logs_dir,
        database_path,
        settings,
    })
}
