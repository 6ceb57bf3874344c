//! Wire protocol between `sid-agent` and `sid-cli`: one newline-terminated
//! JSON request per connection, one JSON response back.

use serde::{Deserialize, Serialize};

use crate::matching::MatchKind;
use crate::risk::RiskLevel;
use crate::scoring::{AiTier, RiskScore};
use crate::settings::OrgSettings;
use crate::types::ManagementStatus;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum IpcRequest {
    Status,
    List {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        risk: Option<RiskLevel>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        status: Option<ManagementStatus>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        search: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        limit: Option<usize>,
    },
    Show {
        app_id: String,
    },
    Score {
        app_id: String,
    },
    Settings,
    SaveSettings {
        settings: OrgSettings,
    },
    UpdateApp {
        app_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        status: Option<ManagementStatus>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        owner_email: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        notes: Option<String>,
    },
    Categorize {
        app_id: String,
        category: String,
    },
    Import {
        path: String,
    },
    ImportRubric {
        path: String,
    },
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct IpcResponse {
    pub success: bool,
    pub data: serde_json::Value,
}

impl IpcResponse {
    pub fn ok<T: Serialize>(data: &T) -> Self {
        match serde_json::to_value(data) {
            Ok(data) => Self { success: true, data },
            Err(e) => Self::error(format!("Failed to encode response: {}", e)),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: serde_json::json!({ "error": message.into() }),
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        self.data.get("error").and_then(|e| e.as_str())
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RiskCounts {
    pub high: usize,
    pub medium: usize,
    pub low: usize,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatusCounts {
    pub managed: usize,
    pub unmanaged: usize,
    pub needs_review: usize,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct InventoryStatus {
    pub status: String,
    pub uptime_seconds: u64,
    pub applications: usize,
    pub users: usize,
    pub by_risk: RiskCounts,
    pub by_status: StatusCounts,
    pub uncategorized: usize,
    pub without_rubric: usize,
    pub last_import: Option<String>,
}

/// One row of the risk-ranked inventory.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct AppSummary {
    pub id: String,
    pub name: String,
    pub category: Option<String>,
    pub risk_level: RiskLevel,
    pub risk_reason: String,
    pub user_count: usize,
    pub scope_count: usize,
    pub management_status: ManagementStatus,
    pub owner_email: Option<String>,
    pub ai_tier: AiTier,
    /// Displayed Total App Risk Score; `None` without rubric data.
    pub total_score: Option<f64>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ScopeView {
    pub scope: String,
    pub risk_level: RiskLevel,
    pub description: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct UserView {
    pub name: String,
    pub email: String,
    pub risk_level: RiskLevel,
    pub risk_reason: String,
    pub scopes: Vec<ScopeView>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct AppDetail {
    pub summary: AppSummary,
    pub notes: Option<String>,
    pub gen_ai_status: String,
    pub scopes: Vec<ScopeView>,
    pub users: Vec<UserView>,
    pub imported_at: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ScoreReport {
    pub app_id: String,
    pub app_name: String,
    pub has_rubric_data: bool,
    pub score: RiskScore,
    pub formula: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct ImportReport {
    pub applications: usize,
    pub users: usize,
    pub preserved: usize,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RubricMatch {
    pub app_id: String,
    pub app_name: String,
    pub rubric_name: String,
    #[serde(flatten)]
    pub kind: MatchKind,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct RubricImportReport {
    pub rows: usize,
    pub matched: Vec<RubricMatch>,
    pub unmatched: Vec<String>,
}
