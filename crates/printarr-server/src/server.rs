//! HTTP server implementation using Axum.

use std::sync::Arc;

use axum::routing::{delete, get, patch, post, put};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use printarr_core::catalog::{CatalogStore, SettingsService};
use printarr_core::config::PrintarrConfig;
use printarr_core::domain::Id;
use printarr_core::events::Broadcaster;
use printarr_pipeline::adapters::DirectUploadAdapter;
use printarr_pipeline::ingest::IngestService;

use crate::handlers;

/// Application state shared across handlers.
pub struct AppState {
    pub store: CatalogStore,
    pub broadcaster: Broadcaster,
    pub settings: SettingsService,
    pub config: Arc<PrintarrConfig>,
    /// Uploads bypass the per-channel adapter map entirely; this is the
    /// one adapter every HTTP handler talks to directly.
    pub direct_upload: Arc<DirectUploadAdapter>,
    pub upload_channel_id: Id,
    pub ingest: Arc<IngestService>,
}

pub type SharedState = Arc<AppState>;

/// Starts the HTTP server. Returns the actual bound address (useful when
/// `port` is 0).
pub async fn start_server(state: AppState, host: &str, port: u16) -> anyhow::Result<std::net::SocketAddr> {
    let state = Arc::new(state);

    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

    let api = Router::new()
        .route("/channels", get(handlers::channels::list).post(handlers::channels::create))
        .route("/channels/:id", get(handlers::channels::get).delete(handlers::channels::delete_channel))
        .route("/channels/:id/backfill", post(handlers::channels::trigger_backfill))
        .route("/channels/discovered", get(handlers::channels::discovered))
        .route("/designs", get(handlers::designs::list))
        .route("/designs/:id", get(handlers::designs::get))
        .route("/designs/:id", patch(handlers::designs::update_overrides))
        .route("/designs/:id/merge/:loser_id", post(handlers::designs::merge))
        .route("/jobs/queue", get(handlers::jobs::list_queue))
        .route("/jobs/activity", get(handlers::jobs::list_activity))
        .route("/jobs/:id/cancel", post(handlers::jobs::cancel))
        .route("/jobs/:id/retry", post(handlers::jobs::retry))
        .route("/jobs/:id/priority", put(handlers::jobs::set_priority))
        .route("/import-sources", get(handlers::import_sources::list).post(handlers::import_sources::create))
        .route("/import-sources/:id/sync", post(handlers::import_sources::sync))
        .route("/import-profiles", get(handlers::import_profiles::list).post(handlers::import_profiles::create))
        .route("/import-profiles/:id", get(handlers::import_profiles::get))
        .route("/uploads", post(handlers::uploads::stage_batch))
        .route("/uploads/pending", get(handlers::uploads::pending))
        .route("/uploads/:id", delete(handlers::uploads::remove))
        .route("/uploads/process", post(handlers::uploads::process))
        .route("/tags", get(handlers::tags::list))
        .route("/families", get(handlers::families::list))
        .route("/families/:id/members", get(handlers::families::members))
        .route("/families/:id/assign/:design_id", post(handlers::families::assign))
        .route("/families/detach/:design_id", post(handlers::families::detach))
        .route("/settings", get(handlers::settings::get_all).delete(handlers::settings::reset))
        .route("/settings/schema", get(handlers::settings::schema))
        .route("/settings/:key", get(handlers::settings::get_one))
        .route("/settings/:key", put(handlers::settings::put_one))
        .route("/settings/:key", delete(handlers::settings::delete_one))
        .route("/stats/dashboard", get(handlers::stats::dashboard))
        .route("/stats/storage", get(handlers::stats::storage))
        .route("/external-metadata/search", get(handlers::external_metadata::search))
        .route("/events", get(handlers::events::stream));

    let app = Router::new()
        .route("/health", get(handlers::health::basic))
        .route("/health/detailed", get(handlers::health::detailed))
        .nest("/api/v1", api)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr: std::net::SocketAddr = format!("{host}:{port}").parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let actual_addr = listener.local_addr()?;

    info!(%actual_addr, "HTTP server listening");

    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("server error");
    });

    Ok(actual_addr)
}
