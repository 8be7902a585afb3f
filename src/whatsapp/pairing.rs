use sea_orm::{DatabaseConnection, DbErr};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::db::entities::whatsapp_instance;
use crate::db::enums::InstanceStatus;
use crate::db::services::{find_instance, update_instance_status};
use crate::gateway::{ConnectionState, GatewayError, WhatsAppGateway};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusCheck {
    pub status: InstanceStatus,
    pub phone_number: Option<String>,
    pub gateway_state: ConnectionState,
}

/// One status probe. The connected number is only looked up for open
/// instances, and a failed lookup does not fail the probe.
pub async fn check_status(
    gateway: &dyn WhatsAppGateway,
    instance: &str,
) -> Result<StatusCheck, GatewayError> {
    let gateway_state = gateway.connection_state(instance).await?;
    let phone_number = if gateway_state == ConnectionState::Open {
        match gateway.connected_number(instance).await {
            Ok(number) => number,
            Err(e) => {
                warn!(%instance, error = %e, "Could not read connected number.");
                None
            }
        }
    } else {
        None
    };
    Ok(StatusCheck {
        status: gateway_state.instance_status(),
        phone_number,
        gateway_state,
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairingOutcome {
    pub status: InstanceStatus,
    pub phone_number: Option<String>,
    pub timed_out: bool,
}

/// Re-checks every `interval` until a terminal status or `timeout`.
pub async fn poll_until_terminal(
    gateway: &dyn WhatsAppGateway,
    instance: &str,
    interval: Duration,
    timeout: Duration,
) -> PairingOutcome {
    let poll = async {
        loop {
            tokio::time::sleep(interval).await;
            match check_status(gateway, instance).await {
                Ok(check) if check.status.is_terminal() => return check,
                Ok(check) => {
                    debug!(%instance, state = %check.gateway_state, "Instance not paired yet.");
                }
                Err(e) => {
                    warn!(%instance, error = %e, "Pairing status poll failed, retrying.");
                }
            }
        }
    };

    match tokio::time::timeout(timeout, poll).await {
        Ok(check) => PairingOutcome {
            status: check.status,
            phone_number: check.phone_number,
            timed_out: false,
        },
        Err(_) => PairingOutcome {
            status: InstanceStatus::Pending,
            phone_number: None,
            timed_out: true,
        },
    }
}

/// Stores an observed status on the owner's instance row, if it still exists.
pub async fn persist_status(
    db: &DatabaseConnection,
    user_id: i32,
    instance: &str,
    status: InstanceStatus,
    phone_number: Option<&str>,
) -> Result<Option<whatsapp_instance::Model>, DbErr> {
    let Some(row) = find_instance(db, user_id, instance).await? else {
        return Ok(None);
    };
    update_instance_status(db, row, status, phone_number)
        .await
        .map(Some)
}

pub fn spawn_pairing_poller(
    db: DatabaseConnection,
    gateway: Arc<dyn WhatsAppGateway>,
    user_id: i32,
    instance: String,
    interval: Duration,
    timeout: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let outcome = poll_until_terminal(gateway.as_ref(), &instance, interval, timeout).await;
        if outcome.timed_out {
            info!(user_id, %instance, "Pairing timed out, instance stays pending.");
            return;
        }
        match persist_status(
            &db,
            user_id,
            &instance,
            outcome.status,
            outcome.phone_number.as_deref(),
        )
        .await
        {
            Ok(Some(_)) => info!(user_id, %instance, status = %outcome.status, "Pairing finished."),
            Ok(None) => warn!(user_id, %instance, "Instance removed before pairing finished."),
            Err(e) => error!(user_id, %instance, error = %e, "Failed to store pairing result."),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::OutgoingMessage;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays a fixed sequence of states, then repeats the last one.
    struct ScriptedGateway {
        states: Mutex<VecDeque<Result<ConnectionState, u16>>>,
        last: ConnectionState,
        number: Option<String>,
    }

    impl ScriptedGateway {
        fn new(states: Vec<Result<ConnectionState, u16>>, last: ConnectionState) -> Self {
            Self {
                states: Mutex::new(states.into()),
                last,
                number: Some("5511999990000".to_string()),
            }
        }
    }

    #[async_trait]
    impl WhatsAppGateway for ScriptedGateway {
        fn base_url(&self) -> &str {
            "https://scripted.gateway"
        }
        async fn create_instance(&self, _: &str) -> Result<Option<String>, GatewayError> {
            Ok(None)
        }
        async fn fetch_qr_code(&self, _: &str) -> Result<Option<String>, GatewayError> {
            Ok(None)
        }
        async fn connection_state(&self, _: &str) -> Result<ConnectionState, GatewayError> {
            match self.states.lock().unwrap().pop_front() {
                Some(Ok(state)) => Ok(state),
                Some(Err(status)) => Err(GatewayError::Api {
                    status,
                    message: "temporarily unavailable".to_string(),
                }),
                None => Ok(self.last),
            }
        }
        async fn connected_number(&self, _: &str) -> Result<Option<String>, GatewayError> {
            Ok(self.number.clone())
        }
        async fn send_message(
            &self,
            _: &str,
            _: &str,
            _: &OutgoingMessage,
        ) -> Result<Option<String>, GatewayError> {
            Ok(None)
        }
        async fn delete_instance(&self, _: &str) -> Result<(), GatewayError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_check_status_reads_number_only_when_open() {
        let open = ScriptedGateway::new(vec![], ConnectionState::Open);
        let check = check_status(&open, "inst").await.unwrap();
        assert_eq!(check.status, InstanceStatus::Connected);
        assert_eq!(check.phone_number.as_deref(), Some("5511999990000"));

        let closed = ScriptedGateway::new(vec![], ConnectionState::Close);
        let check = check_status(&closed, "inst").await.unwrap();
        assert_eq!(check.status, InstanceStatus::Disconnected);
        assert!(check.phone_number.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_survives_errors_until_connected() {
        let gateway = ScriptedGateway::new(
            vec![Err(503), Ok(ConnectionState::Connecting)],
            ConnectionState::Open,
        );
        let started = tokio::time::Instant::now();
        let outcome = poll_until_terminal(
            &gateway,
            "inst",
            Duration::from_secs(3),
            Duration::from_secs(120),
        )
        .await;

        assert_eq!(
            outcome,
            PairingOutcome {
                status: InstanceStatus::Connected,
                phone_number: Some("5511999990000".to_string()),
                timed_out: false,
            }
        );
        assert_eq!(started.elapsed(), Duration::from_secs(9));
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_times_out_as_pending() {
        let gateway = ScriptedGateway::new(vec![], ConnectionState::Connecting);
        let outcome = poll_until_terminal(
            &gateway,
            "inst",
            Duration::from_secs(3),
            Duration::from_secs(10),
        )
        .await;
        assert!(outcome.timed_out);
        assert_eq!(outcome.status, InstanceStatus::Pending);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnected_is_terminal() {
        let gateway = ScriptedGateway::new(vec![], ConnectionState::Close);
        let outcome = poll_until_terminal(
            &gateway,
            "inst",
            Duration::from_secs(1),
            Duration::from_secs(10),
        )
        .await;
        assert_eq!(outcome.status, InstanceStatus::Disconnected);
        assert!(!outcome.timed_out);
    }
}
