use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use episode_analyzer::analysis::grouping::{group_series, ChartGroup};
use episode_analyzer::analysis::lengths::{episode_length_stats, LengthStats};
use episode_analyzer::analysis::report::render_flagged;
use episode_analyzer::{analyze, flagged_episodes, load_sample, CrossEpisodeReport, DatasetError, EpisodeLocation};

use crate::state::app_state::AppState;

#[derive(Serialize)]
pub struct EpisodeResponse {
    pub dataset: String,
    pub episode: u64,
    pub task: Option<String>,
    pub frames: usize,
    pub duration: f64,
    pub location: EpisodeLocation,
    pub groups: Vec<ChartGroup>,
}

#[derive(Serialize)]
pub struct LengthsResponse {
    pub dataset: String,
    pub fps: f64,
    pub stats: Option<LengthStats>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(default)]
pub struct FlaggedRequest {
    /// Episodes the user flagged by hand.
    pub episodes: Vec<u64>,
}

#[derive(Serialize, Debug)]
pub struct FlaggedResponse {
    pub dataset: String,
    pub episodes: Vec<u64>,
    pub text: String,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

/// =======================
/// ROUTER
/// =======================

pub fn data_routes(state: AppState) -> Router {
    Router::new()
        .route("/datasets/{org}/{name}/episodes/{episode}", get(episode))
        .route("/datasets/{org}/{name}/lengths", get(lengths))
        .route("/datasets/{org}/{name}/analytics", get(analytics))
        .route("/datasets/{org}/{name}/flagged", post(flagged))
        .with_state(state)
}

pub fn status_for(err: &DatasetError) -> StatusCode {
    match err {
        DatasetError::EpisodeNotFound { .. } | DatasetError::MissingFile(_) => StatusCode::NOT_FOUND,
        DatasetError::UnsupportedVersion { .. } | DatasetError::MalformedMetadata { .. } => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        DatasetError::TransientFetch { .. } | DatasetError::Http(_) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(dataset: &str, err: DatasetError) -> Response {
    let status = status_for(&err);
    if status.is_server_error() {
        error!("{}: {}", dataset, err);
    } else {
        warn!("{}: {}", dataset, err);
    }
    (status, Json(ErrorBody { error: err.to_string() })).into_response()
}

/// =======================
/// HANDLERS
/// =======================

async fn episode(
    State(state): State<AppState>,
    Path((org, name, episode)): Path<(String, String, u64)>,
) -> Response {
    let dataset = format!("{}/{}", org, name);
    debug!("Episode request: {} #{}", dataset, episode);

    match state.resolver.resolve_episode(&dataset, episode).await {
        Ok((location, record)) => Json(EpisodeResponse {
            groups: group_series(&record),
            frames: record.len(),
            duration: record.duration(),
            task: record.task,
            location: location.as_ref().clone(),
            dataset,
            episode,
        })
        .into_response(),
        Err(e) => error_response(&dataset, e),
    }
}

async fn lengths(
    State(state): State<AppState>,
    Path((org, name)): Path<(String, String)>,
) -> Response {
    let dataset = format!("{}/{}", org, name);

    let descriptor = match state.resolver.descriptor(&dataset).await {
        Ok(descriptor) => descriptor,
        Err(e) => return error_response(&dataset, e),
    };
    match state.resolver.episode_lengths(&dataset).await {
        Ok(lengths) => Json(LengthsResponse {
            stats: episode_length_stats(&lengths, descriptor.fps),
            fps: descriptor.fps,
            dataset,
        })
        .into_response(),
        Err(e) => error_response(&dataset, e),
    }
}

async fn run_analytics(state: &AppState, dataset: &str) -> Result<CrossEpisodeReport, Response> {
    let sample = load_sample(
        state.resolver.clone(),
        dataset,
        state.config.sample_cap,
        state.config.concurrency,
    )
    .await
    .map_err(|e| error_response(dataset, e))?;

    // Analytics are CPU bound; keep them off the async workers
    let options = state.config.analytics.clone();
    tokio::task::spawn_blocking(move || analyze(&sample, &options))
        .await
        .map_err(|e| {
            error!("{}: analytics task failed: {}", dataset, e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        })
}

async fn analytics(
    State(state): State<AppState>,
    Path((org, name)): Path<(String, String)>,
) -> Response {
    let dataset = format!("{}/{}", org, name);
    match run_analytics(&state, &dataset).await {
        Ok(report) => Json(report).into_response(),
        Err(response) => response,
    }
}

async fn flagged(
    State(state): State<AppState>,
    Path((org, name)): Path<(String, String)>,
    Json(request): Json<FlaggedRequest>,
) -> Response {
    let dataset = format!("{}/{}", org, name);
    let report = match run_analytics(&state, &dataset).await {
        Ok(report) => report,
        Err(response) => return response,
    };

    let episodes = flagged_episodes(&report, &request.episodes);
    info!("{}: {} episodes flagged", dataset, episodes.len());

    Json(FlaggedResponse {
        text: render_flagged(&episodes),
        episodes,
        dataset,
    })
    .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_statuses() {
        let not_found = DatasetError::EpisodeNotFound {
            dataset: "org/ds".to_string(),
            episode: 9,
        };
        assert_eq!(status_for(&not_found), StatusCode::NOT_FOUND);

        let version = DatasetError::UnsupportedVersion {
            dataset: "org/ds".to_string(),
            version: "v1.6".to_string(),
        };
        assert_eq!(status_for(&version), StatusCode::UNPROCESSABLE_ENTITY);

        let transient = DatasetError::TransientFetch {
            path: "meta/info.json".to_string(),
            attempts: 3,
            reason: "timed out".to_string(),
        };
        assert_eq!(status_for(&transient), StatusCode::BAD_GATEWAY);

        assert_eq!(
            status_for(&DatasetError::ParseError("bad".to_string())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_flagged_request_defaults_to_empty() {
        let request: FlaggedRequest = serde_json::from_str("{}").unwrap();
        assert!(request.episodes.is_empty());
    }
}
