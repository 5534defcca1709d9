/// Admin audit trail
///
/// Every successful admin action (approval, block, credit grant) is
/// recorded with the acting admin and the subject account.

use crate::error::{MeterError, MeterResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Admin action kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AdminAction {
    #[serde(rename = "account.approve")]
    ApproveAccount,
    #[serde(rename = "account.block")]
    BlockAccount,
    #[serde(rename = "credits.grant")]
    GrantCredits,
}

impl AdminAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdminAction::ApproveAccount => "account.approve",
            AdminAction::BlockAccount => "account.block",
            AdminAction::GrantCredits => "credits.grant",
        }
    }

    pub fn from_str(s: &str) -> MeterResult<Self> {
        match s {
            "account.approve" => Ok(AdminAction::ApproveAccount),
            "account.block" => Ok(AdminAction::BlockAccount),
            "credits.grant" => Ok(AdminAction::GrantCredits),
            _ => Err(MeterError::StorageInconsistency(format!("Unknown audit action: {}", s))),
        }
    }
}

/// Audit entry to be written
#[derive(Debug, Clone)]
pub struct NewAuditEntry {
    pub admin_id: String,
    pub action: AdminAction,
    pub subject_id: Option<String>,
    pub details: Option<String>,
}

/// Admin action audit log entry
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditLogEntry {
    pub id: i64,
    pub admin_id: String,
    pub action: AdminAction,
    pub subject_id: Option<String>,
    pub details: Option<String>,
    pub created_at: DateTime<Utc>,
}
