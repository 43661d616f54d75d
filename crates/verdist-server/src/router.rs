use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use verdist_service::{ConsumerService, IngestService};

use crate::api::{
    FILES_PATH, FILE_INFO_PATH, FILE_PATH, FILE_VERSIONS_PATH, FILE_VERSION_PATH, HEALTH_PATH,
    UPDATES_PATH, UPLOAD_PATH,
};
use crate::handler;

/// Room for multipart boundaries and the text fields on top of the file.
const MULTIPART_OVERHEAD: u64 = 64 * 1024;

/// Build the ingest router. It also serves the update stream, since only
/// the ingest side sees publishes as they happen.
pub fn ingest_router(ingest: Arc<IngestService>, allow_cors: bool) -> Router {
    let body_limit = ingest
        .config()
        .max_upload_bytes
        .saturating_add(MULTIPART_OVERHEAD);
    let router = Router::new()
        .route(UPLOAD_PATH, post(handler::upload))
        .route(UPDATES_PATH, get(handler::updates))
        .route(HEALTH_PATH, get(handler::ingest_health))
        .layer(DefaultBodyLimit::max(
            usize::try_from(body_limit).unwrap_or(usize::MAX),
        ))
        .with_state(ingest);
    finish(router, allow_cors)
}

/// Build the consumer router.
pub fn consumer_router(consumer: Arc<ConsumerService>, allow_cors: bool) -> Router {
    let router = Router::new()
        .route(FILES_PATH, get(handler::list_files))
        .route(FILE_PATH, get(handler::get_latest))
        .route(FILE_VERSION_PATH, get(handler::get_version))
        .route(FILE_INFO_PATH, get(handler::get_info))
        .route(FILE_VERSIONS_PATH, get(handler::list_versions))
        .route(HEALTH_PATH, get(handler::consumer_health))
        .with_state(consumer);
    finish(router, allow_cors)
}

fn finish(router: Router, allow_cors: bool) -> Router {
    let router = router.layer(TraceLayer::new_for_http());
    if allow_cors {
        router.layer(CorsLayer::permissive())
    } else {
        router
    }
}
