use axum::{extract::State, routing::get, Router};

use crate::AppState;

pub fn summary_router() -> Router<AppState> {
    Router::new().route("/", get(summary))
}

/// Plain-text list of configured monitors, for uptime pingers.
async fn summary(State(state): State<AppState>) -> String {
    let monitors: Vec<String> = state
        .processor
        .configured()
        .await
        .iter()
        .map(|spec| format!("{}({}m)", spec.key.symbol, spec.key.minutes()))
        .collect();
    format!("Monitoring: {}", monitors.join(", "))
}
