use axum::{
    Extension, Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::Response,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use super::attachment;
use crate::csv;
use crate::db::entities::saved_list;
use crate::db::models::{Business, SearchParams};
use crate::db::services::{self, SavedListSummary, list_businesses};
use crate::web::models::AuthenticatedUser;
use crate::web::{AppError, AppState};
use crate::whatsapp::Contact;
use crate::whatsapp::contacts::contacts_from_businesses;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateListRequest {
    name: String,
    companies: Vec<Business>,
    #[serde(default)]
    search_params: Option<SearchParams>,
}

#[derive(Deserialize)]
pub struct CreateFromNumbersRequest {
    name: String,
    numbers: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedListDetail {
    #[serde(flatten)]
    summary: SavedListSummary,
    companies: Vec<Business>,
}

impl From<saved_list::Model> for SavedListDetail {
    fn from(model: saved_list::Model) -> Self {
        Self {
            summary: SavedListSummary::from(&model),
            companies: list_businesses(&model),
        }
    }
}

async fn list_lists_handler(
    Extension(user): Extension<AuthenticatedUser>,
    State(app_state): State<Arc<AppState>>,
) -> Result<Json<Vec<SavedListSummary>>, AppError> {
    let lists = services::list_saved_lists(&app_state.db_pool, user.id).await?;
    Ok(Json(lists.iter().map(SavedListSummary::from).collect()))
}

async fn create_list_handler(
    Extension(user): Extension<AuthenticatedUser>,
    State(app_state): State<Arc<AppState>>,
    Json(payload): Json<CreateListRequest>,
) -> Result<(StatusCode, Json<SavedListDetail>), AppError> {
    let model = services::create_saved_list(
        &app_state.db_pool,
        user.id,
        &payload.name,
        &payload.companies,
        payload.search_params.as_ref(),
    )
    .await?;
    info!(user_id = user.id, list_id = %model.id, companies = payload.companies.len(), "Saved list created.");
    Ok((StatusCode::CREATED, Json(model.into())))
}

async fn create_from_numbers_handler(
    Extension(user): Extension<AuthenticatedUser>,
    State(app_state): State<Arc<AppState>>,
    Json(payload): Json<CreateFromNumbersRequest>,
) -> Result<(StatusCode, Json<SavedListDetail>), AppError> {
    let model = services::create_saved_list_from_numbers(
        &app_state.db_pool,
        user.id,
        &payload.name,
        &payload.numbers,
    )
    .await?;
    info!(user_id = user.id, list_id = %model.id, "Saved list created from numbers.");
    Ok((StatusCode::CREATED, Json(model.into())))
}

async fn get_list_handler(
    Extension(user): Extension<AuthenticatedUser>,
    State(app_state): State<Arc<AppState>>,
    Path(list_id): Path<Uuid>,
) -> Result<Json<SavedListDetail>, AppError> {
    let model = services::get_saved_list(&app_state.db_pool, list_id, user.id).await?;
    Ok(Json(model.into()))
}

async fn delete_list_handler(
    Extension(user): Extension<AuthenticatedUser>,
    State(app_state): State<Arc<AppState>>,
    Path(list_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    services::delete_saved_list(&app_state.db_pool, list_id, user.id).await?;
    info!(user_id = user.id, %list_id, "Saved list deleted.");
    Ok(StatusCode::NO_CONTENT)
}

async fn list_contacts_handler(
    Extension(user): Extension<AuthenticatedUser>,
    State(app_state): State<Arc<AppState>>,
    Path(list_id): Path<Uuid>,
) -> Result<Json<Vec<Contact>>, AppError> {
    let model = services::get_saved_list(&app_state.db_pool, list_id, user.id).await?;
    Ok(Json(contacts_from_businesses(&list_businesses(&model))))
}

async fn export_list_handler(
    Extension(user): Extension<AuthenticatedUser>,
    State(app_state): State<Arc<AppState>>,
    Path(list_id): Path<Uuid>,
) -> Result<Response, AppError> {
    let model = services::get_saved_list(&app_state.db_pool, list_id, user.id).await?;
    let filename = csv::export_filename(&model.name, chrono::Utc::now());
    let body = csv::export_businesses(&list_businesses(&model));
    Ok(attachment(csv::CONTENT_TYPE, &filename, body))
}

pub fn create_list_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_lists_handler).post(create_list_handler))
        .route("/from-numbers", post(create_from_numbers_handler))
        .route("/{id}", get(get_list_handler).delete(delete_list_handler))
        .route("/{id}/contacts", get(list_contacts_handler))
        .route("/{id}/export", get(export_list_handler))
}
