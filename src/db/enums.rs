use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Connection status of a WhatsApp instance, mirrored from the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Text", enum_name = "instance_status_enum")]
#[serde(rename_all = "lowercase")]
pub enum InstanceStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "connected")]
    Connected,
    #[sea_orm(string_value = "disconnected")]
    Disconnected,
}

impl InstanceStatus {
    /// Connected and disconnected end a pairing poll.
    pub fn is_terminal(self) -> bool {
        !matches!(self, InstanceStatus::Pending)
    }
}

impl fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = match self {
            InstanceStatus::Pending => "pending",
            InstanceStatus::Connected => "connected",
            InstanceStatus::Disconnected => "disconnected",
        };
        f.write_str(value)
    }
}
