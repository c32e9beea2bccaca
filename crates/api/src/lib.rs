pub mod routes;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

use engine::{CommandProcessor, MonitorRegistry};

/// Shared application state injected into every route handler.
#[derive(Clone)]
pub struct AppState {
    pub processor: Arc<CommandProcessor>,
    pub registry: Arc<MonitorRegistry>,
}

pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_headers(Any)
        .allow_methods(Any);

    Router::new()
        .merge(routes::summary_router())
        .merge(routes::health_router())
        .with_state(state)
        .layer(cors)
}

/// Build and run the keep-alive HTTP server.
pub async fn serve(state: AppState, port: u16) {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(%addr, error = %e, "Failed to bind HTTP listener");
            return;
        }
    };

    info!(%addr, "HTTP server listening");
    if let Err(e) = axum::serve(listener, app(state)).await {
        error!(error = %e, "HTTP server stopped");
    }
}
