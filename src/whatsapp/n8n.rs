use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Serialize;
use tracing::info;

use super::DispatchError;
use super::contacts::Contact;

/// Body posted to the automation webhook so an external flow can run the dispatch.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AutomationPayload {
    pub instance_id: String,
    pub api_key: String,
    pub server_url: String,
    pub contacts: Vec<Contact>,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub user_id: i32,
}

pub async fn forward_to_webhook(
    client: &Client,
    webhook_url: Option<&str>,
    payload: &AutomationPayload,
) -> Result<(), DispatchError> {
    let url = webhook_url
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .ok_or(DispatchError::WebhookNotConfigured)?;
    if payload.contacts.is_empty() {
        return Err(DispatchError::Validation(
            "Select at least one contact.".to_string(),
        ));
    }

    let response = client.post(url).json(payload).send().await?;
    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Failed to read error body".to_string());
        return Err(DispatchError::WebhookFailed(format!("{status}: {body}")));
    }

    info!(
        user_id = payload.user_id,
        instance = %payload.instance_id,
        contacts = payload.contacts.len(),
        "Dispatch forwarded to automation webhook."
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::whatsapp::contacts::ContactSource;

    fn payload(contacts: Vec<Contact>) -> AutomationPayload {
        AutomationPayload {
            instance_id: "inst".to_string(),
            api_key: "key".to_string(),
            server_url: "https://evo.example.com".to_string(),
            contacts,
            message: "Olá".to_string(),
            timestamp: Utc::now(),
            user_id: 4,
        }
    }

    #[test]
    fn test_payload_field_names() {
        let value = serde_json::to_value(payload(vec![])).unwrap();
        for field in ["instanceId", "apiKey", "serverUrl", "contacts", "message", "timestamp", "userId"] {
            assert!(value.get(field).is_some(), "missing {field}");
        }
    }

    #[tokio::test]
    async fn test_missing_webhook_url() {
        let contacts = vec![Contact::new("Ana", "1", ContactSource::Manual)];
        let result = forward_to_webhook(&Client::new(), Some("  "), &payload(contacts)).await;
        assert!(matches!(result, Err(DispatchError::WebhookNotConfigured)));
    }

    #[tokio::test]
    async fn test_empty_contacts_rejected_before_sending() {
        let result = forward_to_webhook(
            &Client::new(),
            Some("http://127.0.0.1:9/hook"),
            &payload(vec![]),
        )
        .await;
        assert!(matches!(result, Err(DispatchError::Validation(_))));
    }
}
