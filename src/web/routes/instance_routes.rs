use axum::{
    Extension, Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get, post},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use crate::db::entities::whatsapp_instance;
use crate::db::services::{self, is_unique_violation};
use crate::gateway::OutgoingMessage;
use crate::web::models::AuthenticatedUser;
use crate::web::{AppError, AppState};
use crate::whatsapp::pairing::{self, StatusCheck};
use crate::whatsapp::validation::{self, ValidationReport};

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct CreateInstanceRequest {
    #[serde(default)]
    instance_name: Option<String>,
    #[serde(default)]
    phone_number: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateInstanceResponse {
    instance: whatsapp_instance::Model,
    qr_code: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QrCodeResponse {
    qr_code: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PairResponse {
    qr_code: Option<String>,
    poll_interval_secs: u64,
    timeout_secs: u64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateRequest {
    instance_name: String,
}

#[derive(Deserialize)]
pub struct SendMessageRequest {
    number: String,
    message: OutgoingMessage,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageResponse {
    message_id: Option<String>,
}

/// Gateway instance names end up in URL paths.
pub(crate) fn check_instance_name(name: &str) -> Result<(), AppError> {
    let valid = !name.is_empty()
        && name.len() <= 100
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));
    if valid {
        Ok(())
    } else {
        Err(AppError::InvalidInput(
            "Instance name may only contain letters, digits, '_', '-' and '.'.".to_string(),
        ))
    }
}

fn default_instance_name(user_id: i32) -> String {
    format!("user_{user_id}_{}", chrono::Utc::now().timestamp_millis())
}

pub(crate) async fn owned_instance(
    app_state: &AppState,
    user_id: i32,
    name: &str,
) -> Result<whatsapp_instance::Model, AppError> {
    services::find_instance(&app_state.db_pool, user_id, name)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Instance {name} not found")))
}

async fn list_instances_handler(
    Extension(user): Extension<AuthenticatedUser>,
    State(app_state): State<Arc<AppState>>,
) -> Result<Json<Vec<whatsapp_instance::Model>>, AppError> {
    let instances = services::list_instances(&app_state.db_pool, user.id).await?;
    Ok(Json(instances))
}

async fn create_instance_handler(
    Extension(user): Extension<AuthenticatedUser>,
    State(app_state): State<Arc<AppState>>,
    payload: Option<Json<CreateInstanceRequest>>,
) -> Result<(StatusCode, Json<CreateInstanceResponse>), AppError> {
    let payload = payload.map(|Json(p)| p).unwrap_or_default();
    let name = payload
        .instance_name
        .map(|n| n.trim().to_owned())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| default_instance_name(user.id));
    check_instance_name(&name)?;

    if services::find_instance(&app_state.db_pool, user.id, &name)
        .await?
        .is_some()
    {
        return Err(AppError::Conflict(format!("Instance {name} already exists")));
    }

    let gateway = app_state.gateway_for(user.id).await?;
    let qr_code = gateway.create_instance(&name).await?;

    let phone_number = payload
        .phone_number
        .as_deref()
        .map(str::trim)
        .filter(|p| !p.is_empty());
    let mut instance =
        services::create_instance_record(&app_state.db_pool, user.id, &name, phone_number)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    AppError::Conflict(format!("Instance {name} already exists"))
                } else {
                    AppError::from(e)
                }
            })?;
    if let Some(qr) = qr_code.as_deref() {
        instance = services::update_instance_qr_code(&app_state.db_pool, instance, qr).await?;
    }

    info!(user_id = user.id, instance = %name, "WhatsApp instance created.");
    Ok((
        StatusCode::CREATED,
        Json(CreateInstanceResponse { instance, qr_code }),
    ))
}

async fn delete_instance_handler(
    Extension(user): Extension<AuthenticatedUser>,
    State(app_state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<StatusCode, AppError> {
    let rows = services::delete_instance_record(&app_state.db_pool, user.id, &name).await?;
    if rows == 0 {
        return Err(AppError::NotFound(format!("Instance {name} not found")));
    }

    match app_state.gateway_for(user.id).await {
        Ok(gateway) => {
            if let Err(e) = gateway.delete_instance(&name).await {
                warn!(user_id = user.id, instance = %name, error = %e, "Remote instance delete failed.");
            }
        }
        Err(e) => warn!(user_id = user.id, instance = %name, error = %e, "No gateway to delete remote instance."),
    }
    info!(user_id = user.id, instance = %name, "WhatsApp instance deleted.");
    Ok(StatusCode::NO_CONTENT)
}

async fn refresh_qr_handler(
    Extension(user): Extension<AuthenticatedUser>,
    State(app_state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<QrCodeResponse>, AppError> {
    let instance = owned_instance(&app_state, user.id, &name).await?;
    let gateway = app_state.gateway_for(user.id).await?;
    let qr_code = gateway.fetch_qr_code(&name).await?;
    if let Some(qr) = qr_code.as_deref() {
        services::update_instance_qr_code(&app_state.db_pool, instance, qr).await?;
    }
    Ok(Json(QrCodeResponse { qr_code }))
}

async fn check_status_handler(
    Extension(user): Extension<AuthenticatedUser>,
    State(app_state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<StatusCheck>, AppError> {
    let instance = owned_instance(&app_state, user.id, &name).await?;
    let gateway = app_state.gateway_for(user.id).await?;
    let check = pairing::check_status(gateway.as_ref(), &name).await?;
    services::update_instance_status(
        &app_state.db_pool,
        instance,
        check.status,
        check.phone_number.as_deref(),
    )
    .await?;
    Ok(Json(check))
}

async fn pair_handler(
    Extension(user): Extension<AuthenticatedUser>,
    State(app_state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<(StatusCode, Json<PairResponse>), AppError> {
    let instance = owned_instance(&app_state, user.id, &name).await?;
    let gateway = app_state.gateway_for(user.id).await?;
    let qr_code = gateway.fetch_qr_code(&name).await?;
    if let Some(qr) = qr_code.as_deref() {
        services::update_instance_qr_code(&app_state.db_pool, instance, qr).await?;
    }

    let interval = app_state.config.pairing_poll_interval();
    let timeout = app_state.config.pairing_timeout();
    pairing::spawn_pairing_poller(
        app_state.db_pool.clone(),
        gateway,
        user.id,
        name.clone(),
        interval,
        timeout,
    );
    info!(user_id = user.id, instance = %name, "Pairing poll started.");

    Ok((
        StatusCode::ACCEPTED,
        Json(PairResponse {
            qr_code,
            poll_interval_secs: interval.as_secs(),
            timeout_secs: timeout.as_secs(),
        }),
    ))
}

async fn validate_handler(
    Extension(user): Extension<AuthenticatedUser>,
    State(app_state): State<Arc<AppState>>,
    Json(payload): Json<ValidateRequest>,
) -> Result<Json<ValidationReport>, AppError> {
    let name = payload.instance_name.trim();
    check_instance_name(name)?;
    owned_instance(&app_state, user.id, name).await?;
    let gateways = app_state.gateways_for(user.id).await?;
    Ok(Json(validation::validate_instance(name, &gateways).await))
}

async fn send_message_handler(
    Extension(user): Extension<AuthenticatedUser>,
    State(app_state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Json(payload): Json<SendMessageRequest>,
) -> Result<Json<SendMessageResponse>, AppError> {
    check_instance_name(&name)?;
    if payload.message.is_blank() {
        return Err(AppError::InvalidInput("Message content is required.".to_string()));
    }
    owned_instance(&app_state, user.id, &name).await?;
    let gateway = app_state.gateway_for(user.id).await?;
    let message_id = gateway
        .send_message(&name, &payload.number, &payload.message)
        .await?;
    info!(user_id = user.id, instance = %name, kind = %payload.message.kind, "Single message sent.");
    Ok(Json(SendMessageResponse { message_id }))
}

pub fn create_instance_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_instances_handler).post(create_instance_handler))
        .route("/validate", post(validate_handler))
        .route("/{name}", delete(delete_instance_handler))
        .route("/{name}/qrcode", post(refresh_qr_handler))
        .route("/{name}/status", post(check_status_handler))
        .route("/{name}/pair", post(pair_handler))
        .route("/{name}/messages", post(send_message_handler))
}
