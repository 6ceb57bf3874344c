//! Per-user and per-application risk aggregation.
//!
//! Levels are max-reductions over [`classify_scope`]; nothing here is
//! cached, callers recompute from the scope sets on every read.

use serde::{Deserialize, Serialize};

use crate::risk::RiskLevel;
use crate::scopes::{classify_scope, matching_rule};
use crate::types::{AppUser, Application};

/// A derived level plus the advisory text explaining it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub level: RiskLevel,
    pub reason: String,
}

const MAX_LISTED: usize = 3;

/// Highest tier over all scopes; `Low` for an empty set.
pub fn determine_risk_level<S: AsRef<str>>(scopes: &[S]) -> RiskLevel {
    scopes
        .iter()
        .map(|s| classify_scope(s.as_ref()))
        .max()
        .unwrap_or(RiskLevel::Low)
}

/// Highest level over all users; `Low` when the app has no users.
pub fn application_risk_level(users: &[AppUser]) -> RiskLevel {
    users
        .iter()
        .map(|u| determine_risk_level(&u.scopes))
        .max()
        .unwrap_or(RiskLevel::Low)
}

pub fn assess_user(user: &AppUser) -> RiskAssessment {
    assess_scopes(&user.scopes)
}

pub fn assess_scopes<S: AsRef<str>>(scopes: &[S]) -> RiskAssessment {
    let level = determine_risk_level(scopes);
    let reason = match level {
        RiskLevel::Low if scopes.is_empty() => "No scopes granted".to_string(),
        RiskLevel::Low => format!("Only low-risk scopes granted ({})", scopes.len()),
        _ => format!(
            "{}-risk access: {}",
            level,
            summarize(&triggers(scopes.iter().map(AsRef::as_ref), level))
        ),
    };
    RiskAssessment { level, reason }
}

pub fn assess_application(app: &Application) -> RiskAssessment {
    let levels: Vec<RiskLevel> = app.users.iter().map(|u| determine_risk_level(&u.scopes)).collect();
    let level = levels.iter().copied().max().unwrap_or(RiskLevel::Low);

    let reason = if app.users.is_empty() {
        "No connected users".to_string()
    } else if level == RiskLevel::Low {
        format!("All {} users hold only low-risk scopes", app.users.len())
    } else {
        let flagged = levels.iter().filter(|l| **l == level).count();
        let scopes = app
            .users
            .iter()
            .zip(&levels)
            .filter(|(_, l)| **l == level)
            .flat_map(|(u, _)| u.scopes.iter().map(String::as_str));
        format!(
            "{} of {} users hold {}-risk scopes ({})",
            flagged,
            app.users.len(),
            level,
            summarize(&triggers(scopes, level))
        )
    };
    RiskAssessment { level, reason }
}

/// Distinct catalog descriptions of the scopes classified at `level`,
/// in first-seen order.
fn triggers<'a>(scopes: impl Iterator<Item = &'a str>, level: RiskLevel) -> Vec<&'static str> {
    let mut out: Vec<&'static str> = Vec::new();
    for scope in scopes {
        if let Some((matched, rule)) = matching_rule(scope) {
            if matched == level && !out.contains(&rule.description) {
                out.push(rule.description);
            }
        }
    }
    out
}

fn summarize(items: &[&str]) -> String {
    if items.len() <= MAX_LISTED {
        return items.join(", ");
    }
    format!("{} (+{} more)", items[..MAX_LISTED].join(", "), items.len() - MAX_LISTED)
}
