use chrono::{DateTime, Utc};
use reqwest::Url;
use sea_orm::{DatabaseConnection, DbErr};
use serde::Serialize;
use thiserror::Error;

use crate::config::ServerConfig;
use crate::db::entities::evolution_credential;
use crate::db::services as db_services;
use crate::services::encryption_service::{CredentialCipher, EncryptionError, mask_secret};

#[derive(Error, Debug)]
pub enum CredentialsError {
    #[error("{0}")]
    Validation(String),
    #[error("Gateway credentials not configured")]
    NotConfigured,
    #[error("Credential encryption error: {0}")]
    Encryption(#[from] EncryptionError),
    #[error("Database error: {0}")]
    Db(#[from] DbErr),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GatewaySource {
    User,
    ServerDefault,
}

/// A decrypted gateway pair ready to build a client from.
#[derive(Clone, PartialEq, Eq)]
pub struct GatewayCredentials {
    pub api_url: String,
    pub api_key: String,
    pub source: GatewaySource,
}

impl std::fmt::Debug for GatewayCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayCredentials")
            .field("api_url", &self.api_url)
            .field("api_key", &mask_secret(&self.api_key))
            .field("source", &self.source)
            .finish()
    }
}

impl GatewayCredentials {
    fn same_gateway(&self, other: &GatewayCredentials) -> bool {
        normalize_url(&self.api_url) == normalize_url(&other.api_url)
            && self.api_key == other.api_key
    }
}

/// What the API returns for stored credentials. The key is always masked.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialsView {
    pub api_url: String,
    pub api_key_masked: String,
    pub updated_at: DateTime<Utc>,
}

fn normalize_url(url: &str) -> String {
    url.trim().trim_end_matches('/').to_ascii_lowercase()
}

fn validate_pair(api_url: &str, api_key: &str) -> Result<(), CredentialsError> {
    if api_url.trim().is_empty() || api_key.trim().is_empty() {
        return Err(CredentialsError::Validation(
            "API URL and API key are required.".to_string(),
        ));
    }
    Url::parse(api_url.trim())
        .map_err(|_| CredentialsError::Validation("API URL is not a valid URL.".to_string()))?;
    Ok(())
}

fn view_of(
    model: &evolution_credential::Model,
    cipher: &CredentialCipher,
) -> Result<CredentialsView, CredentialsError> {
    let api_key = cipher.decrypt(&model.api_key_encrypted)?;
    Ok(CredentialsView {
        api_url: model.api_url.clone(),
        api_key_masked: mask_secret(&api_key),
        updated_at: model.updated_at,
    })
}

pub async fn credentials_view(
    db: &DatabaseConnection,
    cipher: &CredentialCipher,
    user_id: i32,
) -> Result<Option<CredentialsView>, CredentialsError> {
    db_services::get_credentials(db, user_id)
        .await?
        .map(|model| view_of(&model, cipher))
        .transpose()
}

pub async fn save_credentials(
    db: &DatabaseConnection,
    cipher: &CredentialCipher,
    user_id: i32,
    api_url: &str,
    api_key: &str,
) -> Result<CredentialsView, CredentialsError> {
    validate_pair(api_url, api_key)?;
    let sealed = cipher.encrypt(api_key.trim())?;
    let api_url = api_url.trim().trim_end_matches('/');
    let model = db_services::upsert_credentials(db, user_id, api_url, &sealed).await?;
    view_of(&model, cipher)
}

pub async fn remove_credentials(db: &DatabaseConnection, user_id: i32) -> Result<(), CredentialsError> {
    if db_services::delete_credentials(db, user_id).await? == 0 {
        return Err(CredentialsError::NotConfigured);
    }
    Ok(())
}

pub async fn user_credentials(
    db: &DatabaseConnection,
    cipher: &CredentialCipher,
    user_id: i32,
) -> Result<Option<GatewayCredentials>, CredentialsError> {
    let Some(model) = db_services::get_credentials(db, user_id).await? else {
        return Ok(None);
    };
    Ok(Some(GatewayCredentials {
        api_url: model.api_url,
        api_key: cipher.decrypt(&model.api_key_encrypted)?,
        source: GatewaySource::User,
    }))
}

pub fn server_default(config: &ServerConfig) -> Option<GatewayCredentials> {
    config
        .default_gateway()
        .map(|(api_url, api_key)| GatewayCredentials {
            api_url: api_url.to_owned(),
            api_key: api_key.to_owned(),
            source: GatewaySource::ServerDefault,
        })
}

/// User credentials first, then the server default, without duplicates.
pub fn distinct_gateways(
    user: Option<GatewayCredentials>,
    server: Option<GatewayCredentials>,
) -> Vec<GatewayCredentials> {
    let mut gateways: Vec<GatewayCredentials> = Vec::with_capacity(2);
    for candidate in user.into_iter().chain(server) {
        if !gateways.iter().any(|g| g.same_gateway(&candidate)) {
            gateways.push(candidate);
        }
    }
    gateways
}

pub async fn candidate_gateways(
    db: &DatabaseConnection,
    cipher: &CredentialCipher,
    config: &ServerConfig,
    user_id: i32,
) -> Result<Vec<GatewayCredentials>, CredentialsError> {
    let user = user_credentials(db, cipher, user_id).await?;
    Ok(distinct_gateways(user, server_default(config)))
}

/// The gateway a user's operations go through.
pub async fn resolve_gateway(
    db: &DatabaseConnection,
    cipher: &CredentialCipher,
    config: &ServerConfig,
    user_id: i32,
) -> Result<GatewayCredentials, CredentialsError> {
    candidate_gateways(db, cipher, config, user_id)
        .await?
        .into_iter()
        .next()
        .ok_or(CredentialsError::NotConfigured)
}
