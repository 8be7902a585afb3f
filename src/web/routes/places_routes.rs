use axum::{
    Extension, Json, Router,
    extract::State,
    response::Response,
    routing::post,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::attachment;
use crate::csv;
use crate::db::models::Business;
use crate::places::SearchRequest;
use crate::web::models::AuthenticatedUser;
use crate::web::{AppError, AppState};

#[derive(Serialize)]
pub struct SearchResponse {
    results: Vec<Business>,
}

#[derive(Deserialize)]
pub struct ExportRequest {
    results: Vec<Business>,
    #[serde(default)]
    filename: Option<String>,
}

async fn search_handler(
    Extension(user): Extension<AuthenticatedUser>,
    State(app_state): State<Arc<AppState>>,
    Json(payload): Json<SearchRequest>,
) -> Result<Json<SearchResponse>, AppError> {
    tracing::debug!(user_id = user.id, "Places search requested.");
    let results = app_state.places.search(&payload).await?;
    Ok(Json(SearchResponse { results }))
}

async fn export_handler(Json(payload): Json<ExportRequest>) -> Result<Response, AppError> {
    if payload.results.is_empty() {
        return Err(AppError::InvalidInput("No results to export.".to_string()));
    }
    let filename = csv::export_filename(
        payload.filename.as_deref().unwrap_or("companies"),
        chrono::Utc::now(),
    );
    Ok(attachment(
        csv::CONTENT_TYPE,
        &filename,
        csv::export_businesses(&payload.results),
    ))
}

pub fn create_places_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/search", post(search_handler))
        .route("/export", post(export_handler))
}
