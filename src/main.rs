use axum::Router;
use tracing::{info, Level};

mod models;
mod routes;
mod state;
mod utils;

use crate::state::app_state::AppState;
use crate::utils::conf_helper::init_config_and_bind;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_max_level(Level::INFO).init();

    // === CONFIG + LISTENER ===
    let (config, listener) = init_config_and_bind().await?;

    info!(
        "Server initialized on {}:{}",
        config.connection.ip, config.connection.port
    );
    info!(
        "Supported versions: {}; sample cap {}",
        config.supported_versions.join(", "),
        config.sample_cap
    );

    let state = AppState::new(config);

    let app = Router::new()
        .merge(routes::info_routes::health_routes(state.clone()))
        .merge(routes::data_routes::data_routes(state));

    axum::serve(listener, app).await?;
    Ok(())
}
