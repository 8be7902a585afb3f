//! Client side of the Evolution WhatsApp gateway.
//!
//! [`WhatsAppGateway`] is the seam used by pairing, validation and dispatch;
//! [`evolution::EvolutionClient`] is the HTTP implementation.

use async_trait::async_trait;
use thiserror::Error;

pub mod credentials;
pub mod evolution;
pub mod models;

pub use credentials::{CredentialsError, CredentialsView, GatewayCredentials, GatewaySource};
pub use evolution::EvolutionClient;
pub use models::{ConnectionState, MessageKind, OutgoingMessage};

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Network error while calling the gateway: {0}")]
    Network(#[from] reqwest::Error),
    #[error("Gateway returned {status}: {message}")]
    Api { status: u16, message: String },
    #[error("Invalid response from the gateway: {0}")]
    Decode(String),
    #[error("Invalid gateway configuration: {0}")]
    InvalidConfiguration(String),
}

impl GatewayError {
    /// Short reason used in dispatch logs.
    pub fn reason(&self) -> String {
        match self {
            GatewayError::Api { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}

#[async_trait]
pub trait WhatsAppGateway: Send + Sync {
    fn base_url(&self) -> &str;

    /// Creates the instance remotely. Returns the QR code when the gateway
    /// includes one in the creation response.
    async fn create_instance(&self, name: &str) -> Result<Option<String>, GatewayError>;

    async fn fetch_qr_code(&self, name: &str) -> Result<Option<String>, GatewayError>;

    async fn connection_state(&self, name: &str) -> Result<ConnectionState, GatewayError>;

    async fn connected_number(&self, name: &str) -> Result<Option<String>, GatewayError>;

    /// Sends one message and returns the gateway's message id, if any.
    async fn send_message(
        &self,
        name: &str,
        number: &str,
        message: &OutgoingMessage,
    ) -> Result<Option<String>, GatewayError>;

    async fn delete_instance(&self, name: &str) -> Result<(), GatewayError>;
}
