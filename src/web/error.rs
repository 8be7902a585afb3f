use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::error;

use crate::db::services::{CompanyServiceError, ListServiceError};
use crate::gateway::{CredentialsError, GatewayError};
use crate::places::PlacesError;
use crate::services::encryption_service::EncryptionError;
use crate::whatsapp::DispatchError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("User already exists: {0}")]
    UserAlreadyExists(String),
    #[error("Invalid credentials")]
    InvalidCredentials,
    #[error("Password hashing failed: {0}")]
    PasswordHashingError(String),
    #[error("JWT creation failed: {0}")]
    TokenCreationError(String),
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("Internal server error: {0}")]
    InternalServerError(String),
    #[error("Not Found: {0}")]
    NotFound(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Upstream error: {0}")]
    BadGateway(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::InvalidInput(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::UserAlreadyExists(msg) => (StatusCode::CONFLICT, msg),
            AppError::InvalidCredentials => (
                StatusCode::UNAUTHORIZED,
                "Invalid username or password".to_string(),
            ),
            AppError::PasswordHashingError(msg) => {
                error!(error = %msg, "Password hashing failed.");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    format!("Password hashing error: {msg}"),
                )
            }
            AppError::TokenCreationError(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Token creation error: {msg}"),
            ),
            AppError::DatabaseError(msg) => {
                error!(error = %msg, "Database error.");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    format!("Database error: {msg}"),
                )
            }
            AppError::InternalServerError(msg) => {
                error!(error = %msg, "Internal server error.");
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            AppError::BadGateway(msg) => (StatusCode::BAD_GATEWAY, msg),
        };
        (status, Json(serde_json::json!({ "error": error_message }))).into_response()
    }
}

impl From<sea_orm::DbErr> for AppError {
    fn from(err: sea_orm::DbErr) -> Self {
        AppError::DatabaseError(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::InternalServerError(format!("JSON serialization/deserialization error: {err}"))
    }
}

impl From<EncryptionError> for AppError {
    fn from(err: EncryptionError) -> Self {
        AppError::InternalServerError(err.to_string())
    }
}

impl From<CompanyServiceError> for AppError {
    fn from(err: CompanyServiceError) -> Self {
        match err {
            CompanyServiceError::Validation(msg) => AppError::InvalidInput(msg),
            CompanyServiceError::Db(e) => e.into(),
        }
    }
}

impl From<ListServiceError> for AppError {
    fn from(err: ListServiceError) -> Self {
        match err {
            ListServiceError::Validation(msg) => AppError::InvalidInput(msg),
            ListServiceError::NotFound => AppError::NotFound(err.to_string()),
            ListServiceError::Encode(e) => e.into(),
            ListServiceError::Db(e) => e.into(),
        }
    }
}

impl From<PlacesError> for AppError {
    fn from(err: PlacesError) -> Self {
        match err {
            PlacesError::MissingKey | PlacesError::InvalidRequest(_) => {
                AppError::InvalidInput(err.to_string())
            }
            PlacesError::AddressNotFound { .. } => AppError::NotFound(err.to_string()),
            PlacesError::Api { .. } | PlacesError::Network(_) | PlacesError::Decode(_) => {
                AppError::BadGateway(err.to_string())
            }
        }
    }
}

impl From<GatewayError> for AppError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::InvalidConfiguration(_) => AppError::InvalidInput(err.to_string()),
            GatewayError::Network(_) | GatewayError::Api { .. } | GatewayError::Decode(_) => {
                AppError::BadGateway(err.to_string())
            }
        }
    }
}

impl From<CredentialsError> for AppError {
    fn from(err: CredentialsError) -> Self {
        match err {
            CredentialsError::Validation(msg) => AppError::InvalidInput(msg),
            CredentialsError::NotConfigured => AppError::NotFound(err.to_string()),
            CredentialsError::Encryption(e) => e.into(),
            CredentialsError::Db(e) => e.into(),
        }
    }
}

impl From<DispatchError> for AppError {
    fn from(err: DispatchError) -> Self {
        match err {
            DispatchError::Validation(msg) => AppError::InvalidInput(msg),
            DispatchError::AlreadyRunning(_) | DispatchError::NotRunning(_) => {
                AppError::Conflict(err.to_string())
            }
            DispatchError::NotFound(_) => AppError::NotFound(err.to_string()),
            DispatchError::WebhookNotConfigured => AppError::InvalidInput(err.to_string()),
            DispatchError::WebhookFailed(_) | DispatchError::Network(_) => {
                AppError::BadGateway(err.to_string())
            }
        }
    }
}
