//! Inbound HTTP adapter: the submission and worker-polling API.

mod routes;

use crate::adapters::ffprobe::FfprobeProbe;
use crate::adapters::sqlite::SqliteRepository;
use crate::application::dispatch::Dispatcher;
use crate::application::submit::RequestService;
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<RequestService<FfprobeProbe, SqliteRepository>>,
    pub dispatcher: Arc<Dispatcher<SqliteRepository>>,
    pub repo: SqliteRepository,
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/requests", post(routes::submit))
        .route("/requests/mux", post(routes::submit_mux))
        .route("/requests/encode", post(routes::submit_encode))
        .route("/requests/:correlation_id", get(routes::request_progress))
        .route("/requests/:correlation_id/pause", post(routes::pause_request))
        .route("/jobs/next", get(routes::next_job))
        .route("/jobs/:id/heartbeat", post(routes::job_heartbeat))
        .route("/jobs/:id/done", post(routes::job_done))
        .route("/jobs/:id/failed", post(routes::job_failed))
        .route("/workers", get(routes::workers))
        .layer(cors)
        .with_state(state)
}
