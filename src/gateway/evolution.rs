use async_trait::async_trait;
use reqwest::{Client, Method, Url};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use super::models::{
    ConnectionState, CreateInstancePayload, MessageKind, OutgoingMessage, SendAudioPayload,
    SendMediaPayload, SendTextPayload, digits_only, extract_connected_number,
    extract_error_message, extract_message_id, extract_qr_code, extract_state,
};
use super::{GatewayError, WhatsAppGateway};

/// HTTP client for one Evolution gateway (base URL plus `apikey`).
#[derive(Clone)]
pub struct EvolutionClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl std::fmt::Debug for EvolutionClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EvolutionClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl EvolutionClient {
    pub fn new(client: Client, base_url: &str, api_key: &str) -> Result<Self, GatewayError> {
        let base_url = base_url.trim().trim_end_matches('/');
        Url::parse(base_url).map_err(|e| {
            GatewayError::InvalidConfiguration(format!("invalid gateway URL '{base_url}': {e}"))
        })?;
        if api_key.trim().is_empty() {
            return Err(GatewayError::InvalidConfiguration(
                "gateway API key is empty".to_string(),
            ));
        }
        Ok(Self {
            client,
            base_url: base_url.to_owned(),
            api_key: api_key.trim().to_owned(),
        })
    }

    async fn call<B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<Value, GatewayError> {
        let url = format!("{}{}", self.base_url, path);
        debug!(%method, %url, "Calling Evolution gateway.");

        let mut request = self
            .client
            .request(method, &url)
            .header("apikey", &self.api_key);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            let message = serde_json::from_str::<Value>(&text)
                .ok()
                .and_then(|body| extract_error_message(&body))
                .unwrap_or_else(|| {
                    if text.trim().is_empty() {
                        status.to_string()
                    } else {
                        text.clone()
                    }
                });
            return Err(GatewayError::Api {
                status: status.as_u16(),
                message,
            });
        }

        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text).map_err(|e| GatewayError::Decode(e.to_string()))
    }
}

#[async_trait]
impl WhatsAppGateway for EvolutionClient {
    fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn create_instance(&self, name: &str) -> Result<Option<String>, GatewayError> {
        let payload = CreateInstancePayload {
            instance_name: name,
            qrcode: true,
            integration: "WHATSAPP-BAILEYS",
        };
        let body = self
            .call(Method::POST, "/instance/create", Some(&payload))
            .await?;
        Ok(extract_qr_code(&body))
    }

    async fn fetch_qr_code(&self, name: &str) -> Result<Option<String>, GatewayError> {
        let body = self
            .call::<()>(Method::GET, &format!("/instance/connect/{name}"), None)
            .await?;
        Ok(extract_qr_code(&body))
    }

    async fn connection_state(&self, name: &str) -> Result<ConnectionState, GatewayError> {
        let body = self
            .call::<()>(
                Method::GET,
                &format!("/instance/connectionState/{name}"),
                None,
            )
            .await?;
        Ok(extract_state(&body)
            .map(|state| ConnectionState::from_remote(&state))
            .unwrap_or(ConnectionState::Unknown))
    }

    async fn connected_number(&self, name: &str) -> Result<Option<String>, GatewayError> {
        let body = self
            .call::<()>(Method::GET, &format!("/instance/info/{name}"), None)
            .await?;
        Ok(extract_connected_number(&body))
    }

    async fn send_message(
        &self,
        name: &str,
        number: &str,
        message: &OutgoingMessage,
    ) -> Result<Option<String>, GatewayError> {
        let number = digits_only(number);
        if number.is_empty() {
            return Err(GatewayError::InvalidConfiguration(
                "recipient number has no digits".to_string(),
            ));
        }

        let body = match message.kind {
            MessageKind::Text => {
                let payload = SendTextPayload {
                    number: &number,
                    text: &message.content,
                };
                self.call(Method::POST, &format!("/message/sendText/{name}"), Some(&payload))
                    .await?
            }
            MessageKind::Image | MessageKind::Video => {
                let payload = SendMediaPayload {
                    number: &number,
                    mediatype: message.kind.as_str(),
                    media: &message.content,
                    caption: message.caption.as_deref().filter(|c| !c.is_empty()),
                };
                self.call(Method::POST, &format!("/message/sendMedia/{name}"), Some(&payload))
                    .await?
            }
            MessageKind::Audio => {
                let payload = SendAudioPayload {
                    number: &number,
                    audio: &message.content,
                };
                self.call(
                    Method::POST,
                    &format!("/message/sendWhatsAppAudio/{name}"),
                    Some(&payload),
                )
                .await?
            }
        };
        Ok(extract_message_id(&body))
    }

    async fn delete_instance(&self, name: &str) -> Result<(), GatewayError> {
        self.call::<()>(Method::DELETE, &format!("/instance/delete/{name}"), None)
            .await?;
        Ok(())
    }
}
