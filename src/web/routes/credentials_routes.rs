use axum::{
    Extension, Json, Router,
    extract::State,
    http::StatusCode,
    routing::get,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;

use crate::gateway::CredentialsView;
use crate::gateway::credentials;
use crate::web::models::AuthenticatedUser;
use crate::web::{AppError, AppState};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveCredentialsRequest {
    api_url: String,
    api_key: String,
}

async fn get_credentials_handler(
    Extension(user): Extension<AuthenticatedUser>,
    State(app_state): State<Arc<AppState>>,
) -> Result<Json<Option<CredentialsView>>, AppError> {
    let view = credentials::credentials_view(&app_state.db_pool, &app_state.cipher, user.id).await?;
    Ok(Json(view))
}

async fn save_credentials_handler(
    Extension(user): Extension<AuthenticatedUser>,
    State(app_state): State<Arc<AppState>>,
    Json(payload): Json<SaveCredentialsRequest>,
) -> Result<Json<CredentialsView>, AppError> {
    let view = credentials::save_credentials(
        &app_state.db_pool,
        &app_state.cipher,
        user.id,
        &payload.api_url,
        &payload.api_key,
    )
    .await?;
    info!(user_id = user.id, api_url = %view.api_url, "Gateway credentials saved.");
    Ok(Json(view))
}

async fn delete_credentials_handler(
    Extension(user): Extension<AuthenticatedUser>,
    State(app_state): State<Arc<AppState>>,
) -> Result<StatusCode, AppError> {
    credentials::remove_credentials(&app_state.db_pool, user.id).await?;
    info!(user_id = user.id, "Gateway credentials removed.");
    Ok(StatusCode::NO_CONTENT)
}

pub fn create_credentials_router() -> Router<Arc<AppState>> {
    Router::new().route(
        "/",
        get(get_credentials_handler)
            .put(save_credentials_handler)
            .delete(delete_credentials_handler),
    )
}
