use chrono::{DateTime, Utc};
use rand::Rng;
use serde::Serialize;
use std::time::Duration;
use tera::{Context, Tera};
use tokio::sync::{Mutex, watch};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::DispatchError;
use super::contacts::Contact;
use crate::gateway::{MessageKind, OutgoingMessage, WhatsAppGateway};

/// Inclusive range of whole seconds to wait between contacts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DelayRange {
    min_secs: u64,
    max_secs: u64,
}

impl DelayRange {
    pub fn new(min_secs: u64, max_secs: u64) -> Result<Self, DispatchError> {
        if min_secs > max_secs {
            return Err(DispatchError::Validation(format!(
                "Minimum delay ({min_secs}s) must not exceed maximum delay ({max_secs}s)."
            )));
        }
        Ok(Self { min_secs, max_secs })
    }

    pub fn sample(&self) -> Duration {
        let secs = rand::rng().random_range(self.min_secs..=self.max_secs);
        Duration::from_secs(secs)
    }
}

/// A validated dispatch request.
#[derive(Debug, Clone)]
pub struct DispatchPlan {
    pub instance: String,
    pub contacts: Vec<Contact>,
    pub messages: Vec<OutgoingMessage>,
    pub delay: DelayRange,
}

impl DispatchPlan {
    /// Drops blank messages, then requires at least one contact and one message.
    pub fn new(
        instance: &str,
        contacts: Vec<Contact>,
        messages: Vec<OutgoingMessage>,
        delay: DelayRange,
    ) -> Result<Self, DispatchError> {
        let instance = instance.trim();
        if instance.is_empty() {
            return Err(DispatchError::Validation(
                "Instance name is required.".to_string(),
            ));
        }
        if contacts.is_empty() {
            return Err(DispatchError::Validation(
                "Select at least one contact.".to_string(),
            ));
        }
        let messages: Vec<OutgoingMessage> =
            messages.into_iter().filter(|m| !m.is_blank()).collect();
        if messages.is_empty() {
            return Err(DispatchError::Validation(
                "Add at least one message with content.".to_string(),
            ));
        }
        Ok(Self {
            instance: instance.to_owned(),
            contacts,
            messages,
            delay,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Running,
    Completed,
    Cancelled,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactResult {
    pub contact: Contact,
    pub success: bool,
    pub message_ids: Vec<String>,
    pub error: Option<String>,
}

#[derive(Debug)]
struct JobState {
    status: JobStatus,
    progress: u8,
    status_text: String,
    results: Vec<ContactResult>,
    log: Vec<String>,
    finished_at: Option<DateTime<Utc>>,
}

/// Point-in-time view of a job returned to pollers.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchSnapshot {
    pub id: Uuid,
    pub instance: String,
    pub status: JobStatus,
    pub progress: u8,
    pub status_text: String,
    pub total: usize,
    pub total_sent: usize,
    pub total_failed: usize,
    pub results: Vec<ContactResult>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

pub struct DispatchJob {
    pub id: Uuid,
    pub user_id: i32,
    pub instance: String,
    pub total: usize,
    pub started_at: DateTime<Utc>,
    state: Mutex<JobState>,
    cancel_tx: watch::Sender<bool>,
}

impl std::fmt::Debug for DispatchJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchJob")
            .field("id", &self.id)
            .field("user_id", &self.user_id)
            .field("instance", &self.instance)
            .field("total", &self.total)
            .finish_non_exhaustive()
    }
}

impl DispatchJob {
    pub fn new(user_id: i32, instance: &str, total: usize) -> (Self, watch::Receiver<bool>) {
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let job = Self {
            id: Uuid::new_v4(),
            user_id,
            instance: instance.to_owned(),
            total,
            started_at: Utc::now(),
            state: Mutex::new(JobState {
                status: JobStatus::Running,
                progress: 0,
                status_text: format!("Sending 0/{total} (0%)"),
                results: Vec::with_capacity(total),
                log: Vec::new(),
                finished_at: None,
            }),
            cancel_tx,
        };
        (job, cancel_rx)
    }

    /// Requests cancellation. Returns false when the job already finished.
    pub async fn cancel(&self) -> bool {
        if self.state.lock().await.status != JobStatus::Running {
            return false;
        }
        self.cancel_tx.send_replace(true);
        true
    }

    pub async fn status(&self) -> JobStatus {
        self.state.lock().await.status
    }

    pub async fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.state.lock().await.finished_at
    }

    pub async fn snapshot(&self) -> DispatchSnapshot {
        let state = self.state.lock().await;
        let total_sent = state.results.iter().filter(|r| r.success).count();
        DispatchSnapshot {
            id: self.id,
            instance: self.instance.clone(),
            status: state.status,
            progress: state.progress,
            status_text: state.status_text.clone(),
            total: self.total,
            total_sent,
            total_failed: state.results.len() - total_sent,
            results: state.results.clone(),
            started_at: self.started_at,
            finished_at: state.finished_at,
        }
    }

    /// The send log, one line per message.
    pub async fn log_text(&self) -> String {
        let state = self.state.lock().await;
        let mut text = state.log.join("\n");
        if !text.is_empty() {
            text.push('\n');
        }
        text
    }

    async fn record(&self, index: usize, result: ContactResult, lines: Vec<String>) {
        let done = index + 1;
        let pct = (done * 100 / self.total.max(1)) as u8;
        let mut state = self.state.lock().await;
        state.results.push(result);
        state.log.extend(lines);
        state.progress = pct;
        state.status_text = format!("Sending {done}/{} ({pct}%)", self.total);
    }

    async fn finish(&self, status: JobStatus) {
        let mut state = self.state.lock().await;
        let sent = state.results.iter().filter(|r| r.success).count();
        let failed = state.results.len() - sent;
        state.status = status;
        state.finished_at = Some(Utc::now());
        state.status_text = match status {
            JobStatus::Cancelled => format!("Cancelled: {sent} sent, {failed} failed"),
            _ => format!("Completed: {sent} sent, {failed} failed"),
        };
    }
}

/// Fills `{{ name }}` and `{{ phone }}`. Falls back to the raw text when the
/// template does not render.
pub fn personalize(content: &str, contact: &Contact) -> String {
    if !content.contains("{{") && !content.contains("{%") {
        return content.to_owned();
    }
    let mut context = Context::new();
    context.insert("name", &contact.name);
    context.insert("phone", &contact.phone);
    match Tera::one_off(content, &context, false) {
        Ok(rendered) => rendered,
        Err(e) => {
            debug!(error = %e, "Message template failed to render, sending raw text.");
            content.to_owned()
        }
    }
}

fn personalized_message(message: &OutgoingMessage, contact: &Contact) -> OutgoingMessage {
    let mut message = message.clone();
    match message.kind {
        MessageKind::Text => {
            message.content = personalize(&message.content, contact);
        }
        _ => {
            message.caption = message.caption.map(|c| personalize(&c, contact));
        }
    }
    message
}

/// Runs a dispatch to completion or cancellation and returns the final status.
pub async fn run_dispatch(
    gateway: &dyn WhatsAppGateway,
    plan: &DispatchPlan,
    job: &DispatchJob,
    mut cancel_rx: watch::Receiver<bool>,
) -> JobStatus {
    let total = plan.contacts.len();
    info!(job_id = %job.id, instance = %plan.instance, total, "Dispatch started.");

    for (index, contact) in plan.contacts.iter().enumerate() {
        let cancelled = *cancel_rx.borrow();
        if cancelled {
            info!(job_id = %job.id, sent_contacts = index, "Dispatch cancelled.");
            job.finish(JobStatus::Cancelled).await;
            return JobStatus::Cancelled;
        }

        let mut lines = Vec::with_capacity(plan.messages.len());
        let mut message_ids = Vec::new();
        let mut first_error = None;

        for message in &plan.messages {
            let outgoing = personalized_message(message, contact);
            match gateway
                .send_message(&plan.instance, &contact.phone, &outgoing)
                .await
            {
                Ok(message_id) => {
                    lines.push(format!(
                        "✅ {} via {} - {}: OK",
                        contact.phone, plan.instance, message.kind
                    ));
                    message_ids.extend(message_id);
                }
                Err(e) => {
                    let reason = e.reason();
                    warn!(job_id = %job.id, phone = %contact.phone, error = %e, "Message send failed.");
                    lines.push(format!(
                        "❌ {} via {} - Error: {}",
                        contact.phone, plan.instance, reason
                    ));
                    if first_error.is_none() {
                        first_error = Some(reason);
                    }
                }
            }
        }

        let result = ContactResult {
            contact: contact.clone(),
            success: first_error.is_none(),
            message_ids,
            error: first_error,
        };
        job.record(index, result, lines).await;

        if index + 1 < total {
            let delay = plan.delay.sample();
            debug!(job_id = %job.id, delay_secs = delay.as_secs(), "Waiting before next contact.");
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = cancel_rx.changed() => {}
            }
        }
    }

    job.finish(JobStatus::Completed).await;
    info!(job_id = %job.id, instance = %plan.instance, "Dispatch completed.");
    JobStatus::Completed
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::gateway::{ConnectionState, GatewayError};
    use crate::whatsapp::contacts::ContactSource;
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::sync::Mutex as StdMutex;

    /// Records sends; numbers in `failing` are rejected by the "gateway".
    #[derive(Default)]
    pub(crate) struct RecordingGateway {
        pub sent: StdMutex<Vec<(String, OutgoingMessage, tokio::time::Instant)>>,
        pub failing: HashSet<String>,
        pub state: Option<ConnectionState>,
    }

    #[async_trait]
    impl WhatsAppGateway for RecordingGateway {
        fn base_url(&self) -> &str {
            "https://fake.gateway"
        }

        async fn create_instance(&self, _name: &str) -> Result<Option<String>, GatewayError> {
            Ok(None)
        }

        async fn fetch_qr_code(&self, _name: &str) -> Result<Option<String>, GatewayError> {
            Ok(Some("qr".to_string()))
        }

        async fn connection_state(&self, _name: &str) -> Result<ConnectionState, GatewayError> {
            Ok(self.state.unwrap_or(ConnectionState::Open))
        }

        async fn connected_number(&self, _name: &str) -> Result<Option<String>, GatewayError> {
            Ok(None)
        }

        async fn send_message(
            &self,
            _name: &str,
            number: &str,
            message: &OutgoingMessage,
        ) -> Result<Option<String>, GatewayError> {
            self.sent.lock().unwrap().push((
                number.to_string(),
                message.clone(),
                tokio::time::Instant::now(),
            ));
            if self.failing.contains(number) {
                return Err(GatewayError::Api {
                    status: 400,
                    message: "number not on WhatsApp".to_string(),
                });
            }
            Ok(Some(format!("msg-{number}")))
        }

        async fn delete_instance(&self, _name: &str) -> Result<(), GatewayError> {
            Ok(())
        }
    }

    pub(crate) fn contacts(numbers: &[&str]) -> Vec<Contact> {
        numbers
            .iter()
            .enumerate()
            .map(|(i, n)| Contact::new(format!("Lead {i}"), *n, ContactSource::Manual))
            .collect()
    }

    #[test]
    fn test_delay_range_bounds() {
        assert!(DelayRange::new(5, 2).is_err());
        let range = DelayRange::new(2, 4).unwrap();
        for _ in 0..50 {
            let secs = range.sample().as_secs();
            assert!((2..=4).contains(&secs));
        }
        assert_eq!(DelayRange::new(3, 3).unwrap().sample(), Duration::from_secs(3));
    }

    #[test]
    fn test_plan_drops_blank_messages() {
        let delay = DelayRange::new(0, 0).unwrap();
        let messages = vec![OutgoingMessage::text("  "), OutgoingMessage::text("Olá")];
        let plan = DispatchPlan::new("inst", contacts(&["1"]), messages, delay).unwrap();
        assert_eq!(plan.messages.len(), 1);

        let err = DispatchPlan::new("inst", contacts(&["1"]), vec![OutgoingMessage::text(" ")], delay)
            .unwrap_err();
        assert!(matches!(err, DispatchError::Validation(_)));

        let err = DispatchPlan::new("inst", Vec::new(), vec![OutgoingMessage::text("x")], delay)
            .unwrap_err();
        assert!(matches!(err, DispatchError::Validation(_)));
    }

    #[test]
    fn test_personalize() {
        let contact = Contact::new("Ana", "5511999990000", ContactSource::Manual);
        assert_eq!(personalize("Olá {{ name }}!", &contact), "Olá Ana!");
        assert_eq!(personalize("Plain text", &contact), "Plain text");
        assert_eq!(personalize("Broken {{ name", &contact), "Broken {{ name");
    }

    #[tokio::test(start_paused = true)]
    async fn test_dispatch_records_results_progress_and_log() {
        let gateway = RecordingGateway {
            failing: HashSet::from(["222".to_string()]),
            ..Default::default()
        };
        let messages = vec![
            OutgoingMessage::text("Oi {{ name }}"),
            OutgoingMessage {
                kind: MessageKind::Image,
                content: "https://cdn.example.com/promo.png".to_string(),
                caption: Some("Promo".to_string()),
            },
        ];
        let plan = DispatchPlan::new(
            "inst-1",
            contacts(&["111", "222", "333"]),
            messages,
            DelayRange::new(2, 2).unwrap(),
        )
        .unwrap();
        let (job, cancel_rx) = DispatchJob::new(1, "inst-1", 3);

        let status = run_dispatch(&gateway, &plan, &job, cancel_rx).await;
        assert_eq!(status, JobStatus::Completed);

        let snapshot = job.snapshot().await;
        assert_eq!(snapshot.progress, 100);
        assert_eq!(snapshot.total_sent, 2);
        assert_eq!(snapshot.total_failed, 1);
        assert_eq!(snapshot.results[1].error.as_deref(), Some("number not on WhatsApp"));
        assert_eq!(snapshot.results[0].message_ids.len(), 2);

        let sent = gateway.sent.lock().unwrap();
        assert_eq!(sent.len(), 6);
        assert_eq!(sent[0].1.content, "Oi Lead 0");
        // One fixed gap between consecutive contacts.
        assert_eq!(sent[2].2 - sent[0].2, Duration::from_secs(2));
        assert_eq!(sent[4].2 - sent[2].2, Duration::from_secs(2));

        let log = job.log_text().await;
        let lines: Vec<&str> = log.lines().collect();
        assert_eq!(lines.len(), 6);
        assert_eq!(lines[0], "✅ 111 via inst-1 - text: OK");
        assert_eq!(lines[1], "✅ 111 via inst-1 - image: OK");
        assert_eq!(lines[2], "❌ 222 via inst-1 - Error: number not on WhatsApp");
    }

    #[tokio::test]
    async fn test_progress_uses_floor() {
        let plan = DispatchPlan::new(
            "inst",
            contacts(&["1", "2", "3"]),
            vec![OutgoingMessage::text("hi")],
            DelayRange::new(0, 0).unwrap(),
        )
        .unwrap();
        let (job, _cancel_rx) = DispatchJob::new(1, "inst", 3);
        job.record(
            0,
            ContactResult {
                contact: plan.contacts[0].clone(),
                success: true,
                message_ids: Vec::new(),
                error: None,
            },
            Vec::new(),
        )
        .await;
        let snapshot = job.snapshot().await;
        assert_eq!(snapshot.progress, 33);
        assert_eq!(snapshot.status_text, "Sending 1/3 (33%)");
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_before_next_contact() {
        let gateway = RecordingGateway::default();
        let plan = DispatchPlan::new(
            "inst",
            contacts(&["1", "2", "3"]),
            vec![OutgoingMessage::text("hi")],
            DelayRange::new(10, 10).unwrap(),
        )
        .unwrap();
        let (job, cancel_rx) = DispatchJob::new(1, "inst", 3);

        let run = run_dispatch(&gateway, &plan, &job, cancel_rx);
        let cancel = async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            assert!(job.cancel().await);
        };
        let (status, ()) = tokio::join!(run, cancel);

        assert_eq!(status, JobStatus::Cancelled);
        assert_eq!(gateway.sent.lock().unwrap().len(), 1);
        let snapshot = job.snapshot().await;
        assert_eq!(snapshot.status, JobStatus::Cancelled);
        assert!(snapshot.finished_at.is_some());
        assert!(!job.cancel().await);
    }
}
