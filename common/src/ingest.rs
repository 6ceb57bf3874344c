//! Normalization of loosely-typed scan and rubric input.
//!
//! Every coercion of upstream fields happens here: string-encoded numbers,
//! null or malformed scope lists, inconsistent status labels. Downstream
//! code works with the well-typed [`Application`].

use log::{debug, warn};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

use crate::category::{Category, CategoryValues};
use crate::types::{AppUser, Application, ManagementStatus, Scope};

pub const MAX_RUBRIC_SCORE: f64 = 5.0;

const AVERAGE_COLUMNS: [&str; 5] = ["Average 1", "Average 2", "Average 3", "Average 4", "Average 5"];
const GEN_AI_COLUMN: &str = "Gen AI-Native";
const NAME_COLUMNS: [&str; 4] = ["app name", "application", "application name", "name"];

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse application scan: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Failed to parse rubric CSV: {0}")]
    Csv(#[from] csv::Error),

    #[error("Rubric has none of the columns {0:?}")]
    MissingAverages([&'static str; 5]),
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawUser {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub scopes: Value,
}

/// One application as the identity-provider connector emits it.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawApplication {
    #[serde(default)]
    pub id: Value,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub scopes: Value,
    #[serde(default)]
    pub users: Vec<RawUser>,
    #[serde(rename = "Average 1", default)]
    pub average_1: Value,
    #[serde(rename = "Average 2", default)]
    pub average_2: Value,
    #[serde(rename = "Average 3", default)]
    pub average_3: Value,
    #[serde(rename = "Average 4", default)]
    pub average_4: Value,
    #[serde(rename = "Average 5", default)]
    pub average_5: Value,
    #[serde(rename = "Gen AI-Native", default)]
    pub gen_ai_native: Option<String>,
    #[serde(alias = "managementStatus", default)]
    pub management_status: Option<String>,
    #[serde(alias = "ownerEmail", default)]
    pub owner_email: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ScanDocument {
    List(Vec<RawApplication>),
    Wrapped { applications: Vec<RawApplication> },
}

/// A rubric row keyed by application name.
#[derive(Debug, Clone, PartialEq)]
pub struct RubricRow {
    pub name: String,
    pub averages: CategoryValues<f64>,
    pub gen_ai_status: String,
}

/// Parses a rubric average; absent, non-numeric and non-finite values are 0,
/// everything else is clamped to the 0-5 scale.
pub fn parse_rubric_average(raw: &str) -> f64 {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return 0.0;
    }
    match trimmed.parse::<f64>() {
        Ok(v) if v.is_finite() => v.clamp(0.0, MAX_RUBRIC_SCORE),
        _ => {
            debug!("Non-numeric rubric average '{}' treated as 0", trimmed);
            0.0
        }
    }
}

pub fn rubric_value(value: &Value) -> f64 {
    match value {
        Value::Number(n) => n
            .as_f64()
            .filter(|v| v.is_finite())
            .map_or(0.0, |v| v.clamp(0.0, MAX_RUBRIC_SCORE)),
        Value::String(s) => parse_rubric_average(s),
        _ => 0.0,
    }
}

/// Accepts a JSON array of strings (nulls and non-strings skipped) or a
/// single whitespace/comma separated string.
pub fn scope_list(value: &Value) -> Vec<Scope> {
    let mut out: Vec<Scope> = Vec::new();
    let mut push = |s: &str| {
        let s = s.trim();
        if !s.is_empty() && !out.iter().any(|x| x == s) {
            out.push(s.to_string());
        }
    };
    match value {
        Value::Array(items) => {
            for item in items {
                match item {
                    Value::String(s) => push(s.as_str()),
                    Value::Null => {}
                    other => debug!("Skipping non-string scope {}", other),
                }
            }
        }
        Value::String(s) => s.split(|c: char| c.is_whitespace() || c == ',').for_each(push),
        _ => {}
    }
    out
}

pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for c in name.trim().chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.ends_with('-') {
            slug.push('-');
        }
    }
    slug.trim_matches('-').to_string()
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

fn app_id(raw: &Value, name: &str) -> String {
    match raw {
        Value::String(s) if !s.trim().is_empty() => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => slugify(name),
    }
}

impl RawApplication {
    pub fn into_application(self) -> Application {
        let name = non_empty(self.name).unwrap_or_else(|| "Unnamed application".to_string());
        let id = app_id(&self.id, &name);

        // merge duplicate principals by email
        let mut users: Vec<AppUser> = Vec::new();
        let mut by_email: HashMap<String, usize> = HashMap::new();
        for raw in self.users {
            let email = non_empty(raw.email).map(|e| e.to_ascii_lowercase()).unwrap_or_default();
            let scopes = scope_list(&raw.scopes);
            if let Some(&idx) = by_email.get(&email).filter(|_| !email.is_empty()) {
                extend_unique(&mut users[idx].scopes, scopes);
                continue;
            }
            let name = non_empty(raw.name).unwrap_or_else(|| email.clone());
            by_email.insert(email.clone(), users.len());
            users.push(AppUser { name, email, scopes });
        }

        // advertised surface is a superset of every granted scope
        let mut scopes = scope_list(&self.scopes);
        for user in &users {
            extend_unique(&mut scopes, user.scopes.iter().cloned());
        }

        let averages = [
            &self.average_1,
            &self.average_2,
            &self.average_3,
            &self.average_4,
            &self.average_5,
        ];
        let rubric = CategoryValues::from_fn(|c| rubric_value(averages[category_index(c)]));

        let management_status = match self.management_status.as_deref().map(str::trim) {
            None | Some("") => ManagementStatus::default(),
            Some(label) => ManagementStatus::parse(label).unwrap_or_else(|| {
                warn!("Unknown management status '{}' for {}, using default", label, name);
                ManagementStatus::default()
            }),
        };

        Application {
            id,
            name,
            category: non_empty(self.category),
            scopes,
            users,
            management_status,
            owner_email: non_empty(self.owner_email),
            notes: non_empty(self.notes),
            rubric,
            gen_ai_status: self.gen_ai_native.unwrap_or_default().trim().to_string(),
        }
    }
}

fn category_index(category: Category) -> usize {
    Category::ALL
        .iter()
        .position(|c| *c == category)
        .unwrap_or_default()
}

/// Parses a scan: either a bare array of applications or
/// `{"applications": [...]}`.
pub fn parse_scan(json: &str) -> Result<Vec<Application>, IngestError> {
    let raw = match serde_json::from_str::<ScanDocument>(json)? {
        ScanDocument::List(apps) => apps,
        ScanDocument::Wrapped { applications } => applications,
    };

    let mut apps: Vec<Application> = Vec::with_capacity(raw.len());
    let mut by_id: HashMap<String, usize> = HashMap::new();
    for app in raw.into_iter().map(RawApplication::into_application) {
        match by_id.get(&app.id) {
            Some(&idx) => {
                warn!(
                    "Applications '{}' and '{}' share id '{}', merging their users and scopes",
                    apps[idx].name, app.name, app.id
                );
                merge_application(&mut apps[idx], app);
            }
            None => {
                by_id.insert(app.id.clone(), apps.len());
                apps.push(app);
            }
        }
    }
    Ok(apps)
}

fn extend_unique(target: &mut Vec<Scope>, scopes: impl IntoIterator<Item = Scope>) {
    for scope in scopes {
        if !target.contains(&scope) {
            target.push(scope);
        }
    }
}

/// Folds a later scan row with the same id into the first one. Users merge
/// by email, scopes are unioned, and fields the first row left empty are
/// taken from the later one.
fn merge_application(target: &mut Application, other: Application) {
    let other_has_rubric = other.has_rubric_data();
    for user in other.users {
        let existing = target
            .users
            .iter_mut()
            .find(|u| !u.email.is_empty() && u.email == user.email);
        match existing {
            Some(existing) => extend_unique(&mut existing.scopes, user.scopes),
            None => target.users.push(user),
        }
    }
    let granted: Vec<Scope> = target.users.iter().flat_map(|u| u.scopes.iter().cloned()).collect();
    extend_unique(&mut target.scopes, other.scopes);
    extend_unique(&mut target.scopes, granted);

    if target.category.is_none() {
        target.category = other.category;
    }
    if target.owner_email.is_none() {
        target.owner_email = other.owner_email;
    }
    if target.notes.is_none() {
        target.notes = other.notes;
    }
    if !target.has_rubric_data() && other_has_rubric {
        target.rubric = other.rubric;
        target.gen_ai_status = other.gen_ai_status;
    } else if target.gen_ai_status.is_empty() {
        target.gen_ai_status = other.gen_ai_status;
    }
}

pub fn load_scan(path: &Path) -> Result<Vec<Application>, IngestError> {
    parse_scan(&read(path)?)
}

fn read(path: &Path) -> Result<String, IngestError> {
    std::fs::read_to_string(path).map_err(|source| IngestError::Io {
        path: path.display().to_string(),
        source,
    })
}

/// Parses the rubric CSV. The name comes from an `App Name`/`Application`/
/// `Name` column, or the first column when none of those exist.
pub fn parse_rubric_csv(data: &str) -> Result<Vec<RubricRow>, IngestError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(data.as_bytes());

    let headers = reader.headers()?.clone();
    let column = |wanted: &str| headers.iter().position(|h| h.eq_ignore_ascii_case(wanted));

    let name_idx = NAME_COLUMNS.iter().find_map(|n| column(*n)).unwrap_or(0);
    let average_idx: Vec<Option<usize>> = AVERAGE_COLUMNS.iter().map(|c| column(*c)).collect();
    if average_idx.iter().all(Option::is_none) {
        return Err(IngestError::MissingAverages(AVERAGE_COLUMNS));
    }
    let gen_ai_idx = column(GEN_AI_COLUMN);

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        let name = record.get(name_idx).unwrap_or_default().trim().trim_matches('"').trim();
        if name.is_empty() {
            continue;
        }
        let cell = |idx: Option<usize>| idx.and_then(|i| record.get(i)).unwrap_or_default();
        let averages =
            CategoryValues::from_fn(|c| parse_rubric_average(cell(average_idx[category_index(c)])));
        rows.push(RubricRow {
            name: name.to_string(),
            averages,
            gen_ai_status: cell(gen_ai_idx).to_string(),
        });
    }
    Ok(rows)
}

pub fn load_rubric(path: &Path) -> Result<Vec<RubricRow>, IngestError> {
    parse_rubric_csv(&read(path)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    #[test]
    fn malformed_rubric_averages_become_zero() {
        assert_eq!(parse_rubric_average("3.5"), 3.5);
        assert_eq!(parse_rubric_average(" 4 "), 4.0);
        assert_eq!(parse_rubric_average(""), 0.0);
        assert_eq!(parse_rubric_average("n/a"), 0.0);
        assert_eq!(parse_rubric_average("NaN"), 0.0);
        assert_eq!(parse_rubric_average("inf"), 0.0);
        assert_eq!(parse_rubric_average("7"), 5.0);
        assert_eq!(parse_rubric_average("-1"), 0.0);
    }

    #[test]
    fn rubric_value_accepts_numbers_and_strings() {
        assert_eq!(rubric_value(&json!(2.5)), 2.5);
        assert_eq!(rubric_value(&json!("2.5")), 2.5);
        assert_eq!(rubric_value(&json!(null)), 0.0);
        assert_eq!(rubric_value(&json!(true)), 0.0);
    }

    #[test]
    fn scope_lists_tolerate_nulls_and_strings() {
        assert_eq!(scope_list(&json!(null)), Vec::<String>::new());
        assert_eq!(scope_list(&json!(["openid", null, 3, "openid", " email "])), vec!["openid", "email"]);
        assert_eq!(scope_list(&json!("openid email,profile")), vec!["openid", "email", "profile"]);
    }

    #[test]
    fn slugify_builds_ids_from_names() {
        assert_eq!(slugify("Otter.ai Notes"), "otter-ai-notes");
        assert_eq!(slugify("  --Zoom-- "), "zoom");
    }

    #[test]
    fn scan_is_normalized() {
        let scan = json!([{
            "name": "Acme CRM",
            "scopes": ["openid"],
            "users": [
                {"name": "Ann", "email": "Ann@X.io", "scopes": ["https://www.googleapis.com/auth/calendar"]},
                {"email": "ann@x.io", "scopes": ["https://www.googleapis.com/auth/gmail.send"]},
                {"name": "Bob", "email": "bob@x.io", "scopes": null}
            ],
            "Average 1": "4.5",
            "Average 2": 3,
            "Average 3": "bad",
            "Gen AI-Native": " Partial ",
            "managementStatus": "needs review",
            "ownerEmail": "  "
        }]);
        let apps = parse_scan(&scan.to_string()).unwrap();
        assert_eq!(apps.len(), 1);
        let app = &apps[0];
        assert_eq!(app.id, "acme-crm");
        assert_eq!(app.users.len(), 2);
        assert_eq!(app.users[0].email, "ann@x.io");
        assert_eq!(app.users[0].scopes.len(), 2);
        assert!(app.users[1].scopes.is_empty());
        assert_eq!(app.scopes.len(), 3);
        assert_eq!(app.rubric.data_privacy, 4.5);
        assert_eq!(app.rubric.security_access, 3.0);
        assert_eq!(app.rubric.business_impact, 0.0);
        assert_eq!(app.rubric.vendor_profile, 0.0);
        assert_eq!(app.gen_ai_status, "Partial");
        assert_eq!(app.management_status, ManagementStatus::NeedsReview);
        assert_eq!(app.owner_email, None);
        assert_eq!(app.category, None);
    }

    #[test]
    fn wrapped_scan_and_numeric_ids() {
        let scan = json!({"applications": [{"id": 42, "name": "Zoom", "category": "Video"}]});
        let apps = parse_scan(&scan.to_string()).unwrap();
        assert_eq!(apps[0].id, "42");
        assert_eq!(apps[0].category.as_deref(), Some("Video"));
    }

    #[test]
    fn rows_sharing_an_id_are_merged() {
        let scan = json!([
            {"name": "Zoom", "users": [{"name": "A", "email": "a@x.io", "scopes": ["https://mail.google.com/"]}]},
            {"name": "zoom", "category": "Video", "users": [
                {"name": "B", "email": "b@x.io", "scopes": ["openid"]},
                {"name": "A", "email": "a@x.io", "scopes": ["email"]}
            ]},
            {"name": "Slack"}
        ]);
        let apps = parse_scan(&scan.to_string()).unwrap();
        assert_eq!(apps.len(), 2);
        let zoom = &apps[0];
        assert_eq!(zoom.id, "zoom");
        assert_eq!(zoom.name, "Zoom");
        assert_eq!(zoom.category.as_deref(), Some("Video"));
        let emails: Vec<&str> = zoom.users.iter().map(|u| u.email.as_str()).collect();
        assert_eq!(emails, vec!["a@x.io", "b@x.io"]);
        assert_eq!(zoom.users[0].scopes, vec!["https://mail.google.com/", "email"]);
        assert_eq!(zoom.scopes.len(), 3);
        assert_eq!(crate::aggregate::application_risk_level(&zoom.users), crate::RiskLevel::High);
    }

    #[test]
    fn malformed_scan_is_an_error() {
        assert!(matches!(parse_scan("{not json"), Err(IngestError::Json(_))));
    }

    #[test]
    fn rubric_csv_is_parsed_by_header() {
        let csv = "App Name,Vendor,Average 1,Average 2,Average 3,Average 4,Average 5,Gen AI-Native\n\
                   Notion,Notion Labs,4,3.5,,2,x,Partial\n\
                   ,empty,1,1,1,1,1,No\n\
                   \"Zoom, Inc\",Zoom,1,1,1,1,1,No\n";
        let rows = parse_rubric_csv(csv).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].name, "Notion");
        assert_eq!(rows[0].averages.data_privacy, 4.0);
        assert_eq!(rows[0].averages.security_access, 3.5);
        assert_eq!(rows[0].averages.business_impact, 0.0);
        assert_eq!(rows[0].averages.vendor_profile, 0.0);
        assert_eq!(rows[0].gen_ai_status, "Partial");
        assert_eq!(rows[1].name, "Zoom, Inc");
    }

    #[test]
    fn rubric_without_averages_is_rejected() {
        let csv = "Name,Vendor\nNotion,Notion Labs\n";
        assert!(matches!(parse_rubric_csv(csv), Err(IngestError::MissingAverages(_))));
    }

    #[test]
    fn rubric_loads_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "Name,Average 1,Average 2,Average 3,Average 4,Average 5,Gen AI-Native").unwrap();
        writeln!(file, "Slack,2,2,2,2,2,Yes").unwrap();
        let rows = load_rubric(file.path()).unwrap();
        assert_eq!(rows[0].averages, CategoryValues::splat(2.0));
        assert!(matches!(
            load_rubric(Path::new("/nonexistent/rubric.csv")),
            Err(IngestError::Io { .. })
        ));
    }
}
