use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::category::CategoryValues;

/// One OAuth permission grant, e.g. `https://www.googleapis.com/auth/drive`.
pub type Scope = String;

/// Administrator-assigned lifecycle tag, orthogonal to risk.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ManagementStatus {
    Managed,
    Unmanaged,
    #[default]
    #[serde(rename = "Needs Review")]
    NeedsReview,
}

impl ManagementStatus {
    pub const ALL: [ManagementStatus; 3] = [
        ManagementStatus::Managed,
        ManagementStatus::Unmanaged,
        ManagementStatus::NeedsReview,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ManagementStatus::Managed => "Managed",
            ManagementStatus::Unmanaged => "Unmanaged",
            ManagementStatus::NeedsReview => "Needs Review",
        }
    }

    pub fn parse(input: &str) -> Option<Self> {
        let normalized: String = input
            .chars()
            .filter(|c| c.is_ascii_alphabetic())
            .collect::<String>()
            .to_ascii_lowercase();
        match normalized.as_str() {
            "managed" => Some(ManagementStatus::Managed),
            "unmanaged" => Some(ManagementStatus::Unmanaged),
            "needsreview" | "review" => Some(ManagementStatus::NeedsReview),
            _ => None,
        }
    }
}

impl fmt::Display for ManagementStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ManagementStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ManagementStatus::parse(s).ok_or_else(|| {
            let known: Vec<&str> = ManagementStatus::ALL.iter().map(ManagementStatus::as_str).collect();
            format!("unknown status '{}', expected one of: {}", s, known.join(", "))
        })
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct AppUser {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub scopes: Vec<Scope>,
}

/// An inventoried third-party application. Risk fields are derived from
/// `scopes`/`users` on read and are not part of this record.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct Application {
    pub id: String,
    pub name: String,
    /// Filled in later by the external categorizer.
    pub category: Option<String>,
    /// Everything the app can request from any user.
    pub scopes: Vec<Scope>,
    pub users: Vec<AppUser>,
    pub management_status: ManagementStatus,
    pub owner_email: Option<String>,
    pub notes: Option<String>,
    /// Rubric averages on a 0-5 scale, 0 meaning no data.
    pub rubric: CategoryValues<f64>,
    /// Free text from the rubric's `Gen AI-Native` column.
    pub gen_ai_status: String,
}

impl Application {
    pub fn has_rubric_data(&self) -> bool {
        self.rubric.iter().any(|(_, v)| *v > 0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn management_status_parses_loose_labels() {
        assert_eq!(ManagementStatus::parse("Managed"), Some(ManagementStatus::Managed));
        assert_eq!(ManagementStatus::parse("UNMANAGED"), Some(ManagementStatus::Unmanaged));
        assert_eq!(ManagementStatus::parse("Needs Review"), Some(ManagementStatus::NeedsReview));
        assert_eq!(ManagementStatus::parse("needs_review"), Some(ManagementStatus::NeedsReview));
        assert_eq!(ManagementStatus::parse("archived"), None);
    }

    #[test]
    fn every_status_label_parses_back() {
        for status in ManagementStatus::ALL {
            assert_eq!(status.as_str().parse::<ManagementStatus>(), Ok(status));
        }
        let err = "retired".parse::<ManagementStatus>().unwrap_err();
        assert_eq!(err, "unknown status 'retired', expected one of: Managed, Unmanaged, Needs Review");
    }

    #[test]
    fn management_status_serializes_display_label() {
        let json = serde_json::to_string(&ManagementStatus::NeedsReview).unwrap();
        assert_eq!(json, "\"Needs Review\"");
        let back: ManagementStatus = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ManagementStatus::NeedsReview);
    }
}
