use axum::{
    Extension, Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get},
};
use std::sync::Arc;
use tracing::info;

use crate::db::entities::company;
use crate::db::services::{self, NewCompany};
use crate::web::models::AuthenticatedUser;
use crate::web::{AppError, AppState};

async fn list_companies_handler(
    Extension(user): Extension<AuthenticatedUser>,
    State(app_state): State<Arc<AppState>>,
) -> Result<Json<Vec<company::Model>>, AppError> {
    let companies = services::list_companies(&app_state.db_pool, user.id).await?;
    Ok(Json(companies))
}

async fn create_company_handler(
    Extension(user): Extension<AuthenticatedUser>,
    State(app_state): State<Arc<AppState>>,
    Json(payload): Json<NewCompany>,
) -> Result<(StatusCode, Json<company::Model>), AppError> {
    let company = services::create_company(&app_state.db_pool, user.id, payload).await?;
    info!(user_id = user.id, company_id = company.id, "Company registered.");
    Ok((StatusCode::CREATED, Json(company)))
}

async fn delete_company_handler(
    Extension(user): Extension<AuthenticatedUser>,
    State(app_state): State<Arc<AppState>>,
    Path(company_id): Path<i32>,
) -> Result<StatusCode, AppError> {
    let rows = services::delete_company(&app_state.db_pool, company_id, user.id).await?;
    if rows == 0 {
        return Err(AppError::NotFound("Company not found".to_string()));
    }
    Ok(StatusCode::NO_CONTENT)
}

pub fn create_company_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_companies_handler).post(create_company_handler))
        .route("/{id}", delete(delete_company_handler))
}
