use anyhow::{Context, Result};
use std::path::Path;
use tokio::fs;
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::models::config::AnalyzerConfig;

pub const CONFIG_ENV: &str = "ANALYZER_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "analyzer.json";

pub fn config_path() -> String {
    std::env::var(CONFIG_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string())
}

/// Reads the JSON config; a missing file means all defaults.
pub async fn load_config(file_path: &str) -> Result<AnalyzerConfig> {
    if !Path::new(file_path).exists() {
        warn!("Config {} not found, using defaults", file_path);
        return Ok(AnalyzerConfig::default());
    }

    let data = fs::read_to_string(file_path)
        .await
        .with_context(|| format!("File read error: {file_path}"))?;

    serde_json::from_str(&data).with_context(|| format!("JSON parse error in {file_path}"))
}

/// Loads the config and opens the listener. Port 0 binds an ephemeral port,
/// which is written back into the returned config.
pub async fn init_config_and_bind() -> Result<(AnalyzerConfig, TcpListener)> {
    let mut config = load_config(&config_path()).await?;

    let bind_addr = config.bind_addr();
    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Bind failed: {bind_addr}"))?;

    let actual_port = listener.local_addr().context("Addr error")?.port();
    config.connection.port = actual_port;

    info!("Config initialized on port {}", actual_port);

    Ok((config, listener))
}
