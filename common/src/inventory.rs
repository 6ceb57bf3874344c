use std::cmp::Ordering;

use crate::aggregate::{assess_application, assess_user};
use crate::ipc::{AppDetail, AppSummary, RiskCounts, ScopeView, StatusCounts, UserView};
use crate::risk::RiskLevel;
use crate::scopes::{describe_scope, evaluate_single_scope_risk};
use crate::scoring::{score_application, AiTier};
use crate::settings::OrgSettings;
use crate::types::{Application, ManagementStatus};

#[derive(Debug, Clone, Default)]
pub struct ListFilter {
    pub risk: Option<RiskLevel>,
    pub status: Option<ManagementStatus>,
    pub search: Option<String>,
    pub limit: Option<usize>,
}

pub fn summarize(app: &Application, settings: &OrgSettings) -> AppSummary {
    let assessment = assess_application(app);
    let total_score = app
        .has_rubric_data()
        .then(|| score_application(app, settings).displayed_total);
    AppSummary {
        id: app.id.clone(),
        name: app.name.clone(),
        category: app.category.clone(),
        risk_level: assessment.level,
        risk_reason: assessment.reason,
        user_count: app.users.len(),
        scope_count: app.scopes.len(),
        management_status: app.management_status,
        owner_email: app.owner_email.clone(),
        ai_tier: AiTier::from_status(&app.gen_ai_status),
        total_score,
    }
}

pub fn scope_view(scope: &str) -> ScopeView {
    ScopeView {
        scope: scope.to_string(),
        risk_level: evaluate_single_scope_risk(scope),
        description: describe_scope(scope),
    }
}

/// Scopes sorted most-sensitive first, preserving input order within a tier.
fn scope_views(scopes: &[String]) -> Vec<ScopeView> {
    let mut views: Vec<ScopeView> = scopes.iter().map(|s| scope_view(s)).collect();
    views.sort_by(|a, b| b.risk_level.cmp(&a.risk_level));
    views
}

pub fn detail(app: &Application, settings: &OrgSettings, imported_at: Option<String>) -> AppDetail {
    let mut users: Vec<UserView> = app
        .users
        .iter()
        .map(|user| {
            let assessment = assess_user(user);
            UserView {
                name: user.name.clone(),
                email: user.email.clone(),
                risk_level: assessment.level,
                risk_reason: assessment.reason,
                scopes: scope_views(&user.scopes),
            }
        })
        .collect();
    users.sort_by(|a, b| b.risk_level.cmp(&a.risk_level).then_with(|| a.email.cmp(&b.email)));

    AppDetail {
        summary: summarize(app, settings),
        notes: app.notes.clone(),
        gen_ai_status: app.gen_ai_status.clone(),
        scopes: scope_views(&app.scopes),
        users,
        imported_at,
    }
}

fn rank(a: &AppSummary, b: &AppSummary) -> Ordering {
    b.risk_level
        .cmp(&a.risk_level)
        .then_with(|| {
            let (x, y) = (a.total_score.unwrap_or(0.0), b.total_score.unwrap_or(0.0));
            y.partial_cmp(&x).unwrap_or(Ordering::Equal)
        })
        .then_with(|| a.name.to_lowercase().cmp(&b.name.to_lowercase()))
}

/// Filters the inventory and orders it by risk level, then displayed
/// score, then name.
pub fn risk_ranked(apps: &[Application], settings: &OrgSettings, filter: &ListFilter) -> Vec<AppSummary> {
    let needle = filter
        .search
        .as_deref()
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty());

    let mut rows: Vec<AppSummary> = apps
        .iter()
        .filter(|app| filter.status.map_or(true, |s| app.management_status == s))
        .filter(|app| needle.as_ref().map_or(true, |n| app.name.to_lowercase().contains(n.as_str())))
        .map(|app| summarize(app, settings))
        .filter(|row| filter.risk.map_or(true, |r| row.risk_level == r))
        .collect();

    rows.sort_by(rank);
    if let Some(limit) = filter.limit {
        rows.truncate(limit);
    }
    rows
}

pub fn count_by_risk(apps: &[Application]) -> RiskCounts {
    let mut counts = RiskCounts::default();
    for app in apps {
        match assess_application(app).level {
            RiskLevel::High => counts.high += 1,
            RiskLevel::Medium => counts.medium += 1,
            RiskLevel::Low => counts.low += 1,
        }
    }
    counts
}

pub fn count_by_status(apps: &[Application]) -> StatusCounts {
    let mut counts = StatusCounts::default();
    for app in apps {
        match app.management_status {
            ManagementStatus::Managed => counts.managed += 1,
            ManagementStatus::Unmanaged => counts.unmanaged += 1,
            ManagementStatus::NeedsReview => counts.needs_review += 1,
        }
    }
    counts
}
