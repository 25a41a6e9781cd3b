use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use tower_http::cors::CorsLayer;

use crate::model::{Keyword, Partition, Principal};
use crate::session::Session;
use crate::sync::PartitionSnapshot;

/// Read-only observer API over a running session. Rendering is the
/// client's business; this only exposes what the engine currently believes.
pub fn router(session: Arc<Session>) -> Router {
    Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/partitions/{partition}", get(partition_view))
        .route("/keywords", get(keywords))
        .route("/whoami", get(whoami))
        .layer(CorsLayer::very_permissive())
        .with_state(session)
}

async fn partition_view(
    State(session): State<Arc<Session>>,
    Path(partition): Path<String>,
) -> Result<Json<PartitionSnapshot>, (StatusCode, String)> {
    let partition: Partition = partition
        .parse()
        .map_err(|e: String| (StatusCode::NOT_FOUND, e))?;
    Ok(Json(session.snapshot(partition)))
}

async fn keywords(State(session): State<Arc<Session>>) -> Json<Vec<Keyword>> {
    Json(session.cached_keywords())
}

async fn whoami(State(session): State<Arc<Session>>) -> Json<Principal> {
    Json(session.principal().clone())
}
