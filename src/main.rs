//! Coordination server binary.
//!
//! Wires up:
//! - SQLite job store
//! - ffprobe metadata probing
//! - Submission and dispatch services
//! - HTTP API for clients and polling workers

use baton::adapters::ffprobe::FfprobeProbe;
use baton::adapters::http::{self, AppState};
use baton::adapters::sqlite::SqliteRepository;
use baton::application::dispatch::Dispatcher;
use baton::application::submit::RequestService;
use baton::Config;
use std::path::Path;
use std::sync::Arc;

#[tokio::main]
async fn main() {
    let config = Config::from_env();

    tracing_subscriber::fmt::init();

    let repo = match SqliteRepository::open(Path::new(&config.database_path)) {
        Ok(repo) => repo,
        Err(e) => {
            eprintln!("Failed to open job store: {}", e);
            std::process::exit(1);
        }
    };

    let service = Arc::new(RequestService::new(
        FfprobeProbe,
        repo.clone(),
        config.enable_crf,
    ));
    let dispatcher = Arc::new(Dispatcher::new(repo.clone(), config.timeout_seconds));

    let app = http::router(AppState {
        service,
        dispatcher,
        repo,
    });

    let listener = tokio::net::TcpListener::bind(format!("{}:{}", config.addr, config.port))
        .await
        .expect("Failed to bind TCP listener");
    println!("Listening at {}:{}", config.addr, config.port);
    axum::serve(listener, app)
        .await
        .expect("Server failed to start");
}
