pub mod application;
pub mod domain;
pub mod infrastructure;

use application::commands::{
    AppState, refresh_subject_catalog_impl, reload_dashboard_impl,
    sync_external_to_local_impl,
};
use domain::models::SubjectCatalogEntry;
use infrastructure::error::InfraError;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

pub fn run() -> Result<(), InfraError> {
    init_tracing();
    let workspace_root = std::env::current_dir()?;
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(run_once(workspace_root))
}

async fn run_once(workspace_root: PathBuf) -> Result<(), InfraError> {
    let state = AppState::new(workspace_root)?;
    tracing::info!(
        app = %state.settings().app_name,
        timezone = %state.settings().timezone,
        ai_enabled = state.ai_enabled(),
        "workspace ready"
    );

    let sync = match sync_external_to_local_impl(&state).await {
        Ok(report) => Some(report),
        Err(error) => {
            let message = state.command_error("sync_external_to_local", &error);
            tracing::warn!(%message, "sync skipped; showing local data");
            None
        }
    };

    let subjects = refreshed_subjects(&state).await;

    let dashboard = reload_dashboard_impl(&state).await.map_err(|error| {
        state.command_error("reload_dashboard", &error);
        error
    })?;

    let output = serde_json::json!({
        "sync": sync,
        "subjects": subjects,
        "dashboard": dashboard,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

async fn refreshed_subjects(state: &AppState) -> Vec<SubjectCatalogEntry> {
    match refresh_subject_catalog_impl(state).await {
        Ok(entries) => entries,
        Err(error) => {
            state.command_error("refresh_subject_catalog", &error);
            Vec::new()
        }
    }
}
