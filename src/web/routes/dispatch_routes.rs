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
use super::instance_routes::{check_instance_name, owned_instance};
use crate::db::services::{self, list_businesses};
use crate::gateway::{OutgoingMessage, credentials};
use crate::web::models::AuthenticatedUser;
use crate::web::{AppError, AppState};
use crate::whatsapp::contacts::{contacts_from_businesses, contacts_from_numbers};
use crate::whatsapp::n8n::{self, AutomationPayload};
use crate::whatsapp::validation;
use crate::whatsapp::{Contact, DelayRange, DispatchPlan, DispatchSnapshot};

/// Recipients may come from any mix of an explicit list, raw numbers and a saved list.
#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ContactSelection {
    #[serde(default)]
    contacts: Vec<Contact>,
    #[serde(default)]
    numbers: Option<String>,
    #[serde(default)]
    list_id: Option<Uuid>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartDispatchRequest {
    instance_name: String,
    #[serde(flatten)]
    selection: ContactSelection,
    messages: Vec<OutgoingMessage>,
    #[serde(default)]
    min_delay_secs: Option<u64>,
    #[serde(default)]
    max_delay_secs: Option<u64>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForwardRequest {
    instance_name: String,
    #[serde(flatten)]
    selection: ContactSelection,
    message: String,
}

#[derive(Serialize)]
pub struct ForwardResponse {
    success: bool,
    message: String,
}

async fn resolve_contacts(
    app_state: &AppState,
    user_id: i32,
    selection: ContactSelection,
) -> Result<Vec<Contact>, AppError> {
    let mut contacts = selection.contacts;
    contacts.retain(|c| !c.phone.trim().is_empty());
    if let Some(numbers) = selection.numbers.as_deref() {
        contacts.extend(contacts_from_numbers(numbers));
    }
    if let Some(list_id) = selection.list_id {
        let list = services::get_saved_list(&app_state.db_pool, list_id, user_id).await?;
        contacts.extend(contacts_from_businesses(&list_businesses(&list)));
    }
    Ok(contacts)
}

async fn start_dispatch_handler(
    Extension(user): Extension<AuthenticatedUser>,
    State(app_state): State<Arc<AppState>>,
    Json(payload): Json<StartDispatchRequest>,
) -> Result<(StatusCode, Json<DispatchSnapshot>), AppError> {
    let contacts = resolve_contacts(&app_state, user.id, payload.selection).await?;
    let delay = DelayRange::new(
        payload
            .min_delay_secs
            .unwrap_or(app_state.config.dispatch_min_delay_secs),
        payload
            .max_delay_secs
            .unwrap_or(app_state.config.dispatch_max_delay_secs),
    )?;
    let plan = DispatchPlan::new(&payload.instance_name, contacts, payload.messages, delay)?;
    check_instance_name(&plan.instance)?;
    owned_instance(&app_state, user.id, &plan.instance).await?;

    if app_state.dispatch_manager.is_running(user.id, &plan.instance) {
        return Err(AppError::Conflict(format!(
            "A dispatch is already running for instance {}",
            plan.instance
        )));
    }

    let gateways = app_state.gateways_for(user.id).await?;
    let report = validation::validate_instance(&plan.instance, &gateways).await;
    let gateway = report.accepted_gateway(&gateways).ok_or_else(|| {
        AppError::InvalidInput(format!(
            "Instance {} is not active: {}",
            plan.instance,
            report.reason.as_deref().unwrap_or("unknown reason")
        ))
    })?;

    let job = app_state
        .dispatch_manager
        .start(user.id, gateway, plan)
        .await?;
    info!(user_id = user.id, job_id = %job.id, instance = %job.instance, total = job.total, "Dispatch queued.");
    Ok((StatusCode::ACCEPTED, Json(job.snapshot().await)))
}

async fn forward_handler(
    Extension(user): Extension<AuthenticatedUser>,
    State(app_state): State<Arc<AppState>>,
    Json(payload): Json<ForwardRequest>,
) -> Result<Json<ForwardResponse>, AppError> {
    if payload.message.trim().is_empty() {
        return Err(AppError::InvalidInput("Message content is required.".to_string()));
    }
    let instance_name = payload.instance_name.trim();
    check_instance_name(instance_name)?;
    owned_instance(&app_state, user.id, instance_name).await?;
    let contacts = resolve_contacts(&app_state, user.id, payload.selection).await?;
    let creds = credentials::resolve_gateway(
        &app_state.db_pool,
        &app_state.cipher,
        &app_state.config,
        user.id,
    )
    .await?;

    let automation = AutomationPayload {
        instance_id: instance_name.to_owned(),
        api_key: creds.api_key,
        server_url: creds.api_url,
        contacts,
        message: payload.message,
        timestamp: chrono::Utc::now(),
        user_id: user.id,
    };
    n8n::forward_to_webhook(
        &app_state.http_client,
        app_state.config.n8n_webhook_url.as_deref(),
        &automation,
    )
    .await?;

    Ok(Json(ForwardResponse {
        success: true,
        message: "Forwarded to the automation webhook".to_string(),
    }))
}

async fn get_dispatch_handler(
    Extension(user): Extension<AuthenticatedUser>,
    State(app_state): State<Arc<AppState>>,
    Path(job_id): Path<Uuid>,
) -> Result<Json<DispatchSnapshot>, AppError> {
    let job = app_state.dispatch_manager.get(user.id, job_id)?;
    Ok(Json(job.snapshot().await))
}

async fn dispatch_log_handler(
    Extension(user): Extension<AuthenticatedUser>,
    State(app_state): State<Arc<AppState>>,
    Path(job_id): Path<Uuid>,
) -> Result<Response, AppError> {
    let job = app_state.dispatch_manager.get(user.id, job_id)?;
    Ok(attachment(
        "text/plain; charset=utf-8",
        "dispatch-log.txt",
        job.log_text().await,
    ))
}

async fn cancel_dispatch_handler(
    Extension(user): Extension<AuthenticatedUser>,
    State(app_state): State<Arc<AppState>>,
    Path(job_id): Path<Uuid>,
) -> Result<Json<DispatchSnapshot>, AppError> {
    let job = app_state.dispatch_manager.cancel(user.id, job_id).await?;
    Ok(Json(job.snapshot().await))
}

pub fn create_dispatch_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", post(start_dispatch_handler))
        .route("/n8n", post(forward_handler))
        .route("/{id}", get(get_dispatch_handler))
        .route("/{id}/log", get(dispatch_log_handler))
        .route("/{id}/cancel", post(cancel_dispatch_handler))
}
