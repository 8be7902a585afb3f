use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};

use crate::gateway::{ConnectionState, GatewaySource, WhatsAppGateway};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayCheck {
    pub api_url: String,
    pub source: GatewaySource,
    pub state: Option<ConnectionState>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    pub instance: String,
    pub valid: bool,
    pub accepted_by: Option<String>,
    pub reason: Option<String>,
    pub checks: Vec<GatewayCheck>,
    /// Position of the accepting gateway in the list that was checked.
    #[serde(skip)]
    pub accepted_index: Option<usize>,
}

impl ValidationReport {
    /// The exact gateway entry that reported the instance open.
    pub fn accepted_gateway(
        &self,
        gateways: &[(GatewaySource, Arc<dyn WhatsAppGateway>)],
    ) -> Option<Arc<dyn WhatsAppGateway>> {
        self.accepted_index
            .and_then(|index| gateways.get(index))
            .map(|(_, gateway)| gateway.clone())
    }
}

/// Asks each gateway in order whether the instance is open. The first
/// gateway reporting `open` wins and the rest are not asked.
pub async fn validate_instance(
    instance: &str,
    gateways: &[(GatewaySource, Arc<dyn WhatsAppGateway>)],
) -> ValidationReport {
    let mut checks = Vec::with_capacity(gateways.len());

    for (index, (source, gateway)) in gateways.iter().enumerate() {
        let check = match gateway.connection_state(instance).await {
            Ok(state) => GatewayCheck {
                api_url: gateway.base_url().to_owned(),
                source: *source,
                state: Some(state),
                error: None,
            },
            Err(e) => GatewayCheck {
                api_url: gateway.base_url().to_owned(),
                source: *source,
                state: None,
                error: Some(e.reason()),
            },
        };
        debug!(%instance, api_url = %check.api_url, state = ?check.state, "Validation check.");

        let accepted = check.state == Some(ConnectionState::Open);
        checks.push(check);
        if accepted {
            let api_url = gateway.base_url().to_owned();
            info!(%instance, %api_url, "Instance validated.");
            return ValidationReport {
                instance: instance.to_owned(),
                valid: true,
                accepted_by: Some(api_url),
                reason: None,
                checks,
                accepted_index: Some(index),
            };
        }
    }

    let reason = if checks.is_empty() {
        "Gateway credentials not configured".to_string()
    } else {
        checks
            .iter()
            .map(|check| match (&check.state, &check.error) {
                (_, Some(error)) => format!("{}: {}", check.api_url, error),
                (Some(state), None) => format!("{}: instance is {}", check.api_url, state),
                (None, None) => format!("{}: no answer", check.api_url),
            })
            .collect::<Vec<_>>()
            .join("; ")
    };

    ValidationReport {
        instance: instance.to_owned(),
        valid: false,
        accepted_by: None,
        reason: Some(reason),
        checks,
        accepted_index: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::whatsapp::dispatcher::tests::RecordingGateway;

    fn gateway(state: ConnectionState) -> Arc<dyn WhatsAppGateway> {
        Arc::new(RecordingGateway {
            state: Some(state),
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn test_valid_when_any_gateway_reports_open() {
        let gateways = vec![
            (GatewaySource::User, gateway(ConnectionState::Close)),
            (GatewaySource::ServerDefault, gateway(ConnectionState::Open)),
        ];
        let report = validate_instance("inst", &gateways).await;
        assert!(report.valid);
        assert_eq!(report.accepted_by.as_deref(), Some("https://fake.gateway"));
        assert_eq!(report.checks.len(), 2);
        assert_eq!(report.checks[1].source, GatewaySource::ServerDefault);
        assert_eq!(report.accepted_index, Some(1));
    }

    #[tokio::test]
    async fn test_accepted_gateway_is_the_entry_that_answered_open() {
        // Same host, different keys: only the second key sees the instance open.
        let user = gateway(ConnectionState::Close);
        let shared = gateway(ConnectionState::Open);
        let gateways = vec![
            (GatewaySource::User, user.clone()),
            (GatewaySource::ServerDefault, shared.clone()),
        ];
        let report = validate_instance("inst", &gateways).await;
        assert_eq!(user.base_url(), shared.base_url());

        let picked = report.accepted_gateway(&gateways).unwrap();
        assert!(Arc::ptr_eq(&picked, &shared));
        assert!(!Arc::ptr_eq(&picked, &user));
    }

    #[tokio::test]
    async fn test_invalid_carries_reason() {
        let gateways = vec![(GatewaySource::User, gateway(ConnectionState::Connecting))];
        let report = validate_instance("inst", &gateways).await;
        assert!(!report.valid);
        assert_eq!(
            report.reason.as_deref(),
            Some("https://fake.gateway: instance is connecting")
        );
    }

    #[tokio::test]
    async fn test_no_gateways() {
        let report = validate_instance("inst", &[]).await;
        assert!(!report.valid);
        assert!(report.accepted_gateway(&[]).is_none());
        assert_eq!(
            report.reason.as_deref(),
            Some("Gateway credentials not configured")
        );
    }
}
