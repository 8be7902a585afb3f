//! Data access for the prospecting store.
//!
//! Each sub-module owns one table. All public functions are re-exported here
//! so handlers can reach them as `crate::db::services::*`.

pub mod company_service;
pub mod credentials_service;
pub mod instance_service;
pub mod saved_list_service;
pub mod user_service;

pub use company_service::*;
pub use credentials_service::*;
pub use instance_service::*;
pub use saved_list_service::*;
pub use user_service::*;

use sea_orm::{DbErr, SqlErr};

/// True when the error is a unique-constraint violation reported by the store.
pub fn is_unique_violation(err: &DbErr) -> bool {
    matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
}
