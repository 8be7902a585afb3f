//! WhatsApp workflows on top of the gateway: pairing, validation and bulk dispatch.

use thiserror::Error;
use uuid::Uuid;

pub mod contacts;
pub mod dispatcher;
pub mod manager;
pub mod n8n;
pub mod pairing;
pub mod validation;

pub use contacts::{Contact, ContactSource};
pub use dispatcher::{DelayRange, DispatchJob, DispatchPlan, DispatchSnapshot, JobStatus};
pub use manager::DispatchManager;

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("{0}")]
    Validation(String),
    #[error("A dispatch is already running for instance {0}")]
    AlreadyRunning(String),
    #[error("Dispatch job not found: {0}")]
    NotFound(Uuid),
    #[error("Dispatch job {0} is not running")]
    NotRunning(Uuid),
    #[error("Automation webhook URL not configured")]
    WebhookNotConfigured,
    #[error("Automation webhook failed: {0}")]
    WebhookFailed(String),
    #[error("Network error while calling the automation webhook: {0}")]
    Network(#[from] reqwest::Error),
}
