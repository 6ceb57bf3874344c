use anyhow::{Context, Result};
use common::ingest::{load_rubric, load_scan, RubricRow};
use common::ipc::{ImportReport, RubricImportReport, RubricMatch};
use common::matching::find_match;
use log::{info, warn};
use std::path::PathBuf;

use crate::storage::Storage;

/// Replaces the inventory with the applications in a scan file.
pub async fn import_scan(storage: &Storage, path: &str) -> Result<ImportReport> {
    let file = PathBuf::from(path);
    let apps = tokio::task::spawn_blocking(move || load_scan(&file))
        .await
        .context("Scan loader panicked")??;
    info!("Loaded {} applications from {}", apps.len(), path);

    let report = storage.replace_inventory(&apps).await?;
    info!(
        "Inventory replaced: {} applications, {} users, {} kept admin fields",
        report.applications, report.users, report.preserved
    );
    Ok(report)
}

/// Applies a rubric CSV to the inventory, matching rows to applications by
/// name. Applications without a matching row keep their current rubric.
pub async fn import_rubric(storage: &Storage, path: &str, threshold: f64) -> Result<RubricImportReport> {
    let file = PathBuf::from(path);
    let rows: Vec<RubricRow> = tokio::task::spawn_blocking(move || load_rubric(&file))
        .await
        .context("Rubric loader panicked")??;
    let names: Vec<&str> = rows.iter().map(|r| r.name.as_str()).collect();

    let mut report = RubricImportReport { rows: rows.len(), ..Default::default() };
    for stored in storage.list_applications().await? {
        let app = stored.app;
        let Some(found) = find_match(&app.name, &names, threshold) else {
            report.unmatched.push(app.name);
            continue;
        };
        let row = &rows[found.index];
        if storage.apply_rubric(&app.id, &row.averages, &row.gen_ai_status).await? {
            report.matched.push(RubricMatch {
                app_id: app.id,
                app_name: app.name,
                rubric_name: row.name.clone(),
                kind: found.kind,
            });
        } else {
            warn!("Application {} disappeared during rubric import", app.id);
        }
    }

    report.unmatched.sort();
    info!(
        "Rubric import from {}: {} rows, {} apps matched, {} without scoring data",
        path,
        report.rows,
        report.matched.len(),
        report.unmatched.len()
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::matching::{MatchKind, DEFAULT_MATCH_THRESHOLD};
    use common::CategoryValues;
    use std::io::Write;

    fn write_temp(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    const SCAN: &str = r#"[
        {"name": "Zoom", "users": [{"name": "Ann", "email": "ann@x.io", "scopes": ["openid"]}]},
        {"name": "Calendy", "users": []},
        {"name": "Box", "users": []}
    ]"#;

    #[tokio::test]
    async fn scan_then_rubric_import() {
        let storage = Storage::in_memory().await.unwrap();
        let scan = write_temp(SCAN);
        let report = import_scan(&storage, scan.path().to_str().unwrap()).await.unwrap();
        assert_eq!(report.applications, 3);
        assert_eq!(report.users, 1);

        let rubric = write_temp(
            "App Name,Average 1,Average 2,Average 3,Average 4,Average 5,Gen AI-Native\n\
             Zoom Video Communications,4,4,4,4,4,Partial\n\
             Calendly,2,2,2,2,2,No\n",
        );
        let report = import_rubric(&storage, rubric.path().to_str().unwrap(), DEFAULT_MATCH_THRESHOLD)
            .await
            .unwrap();
        assert_eq!(report.rows, 2);
        assert_eq!(report.unmatched, vec!["Box".to_string()]);
        assert_eq!(report.matched.len(), 2);

        let zoom = report.matched.iter().find(|m| m.app_id == "zoom").unwrap();
        assert_eq!(zoom.kind, MatchKind::Contains);
        let calendy = report.matched.iter().find(|m| m.app_id == "calendy").unwrap();
        assert!(matches!(calendy.kind, MatchKind::Similar { .. }));

        let stored = storage.get_application("zoom").await.unwrap().unwrap().app;
        assert_eq!(stored.rubric, CategoryValues::splat(4.0));
        assert_eq!(stored.gen_ai_status, "Partial");
    }

    #[tokio::test]
    async fn case_variant_names_import_as_one_app() {
        let storage = Storage::in_memory().await.unwrap();
        let scan = write_temp(
            r#"[
                {"name": "Zoom", "users": [{"name": "A", "email": "a@x.io", "scopes": ["https://mail.google.com/"]}]},
                {"name": "zoom", "users": [{"name": "B", "email": "b@x.io", "scopes": ["openid"]}]}
            ]"#,
        );
        let report = import_scan(&storage, scan.path().to_str().unwrap()).await.unwrap();
        assert_eq!(report.applications, 1);
        assert_eq!(report.users, 2);

        let apps = storage.list_applications().await.unwrap();
        assert_eq!(apps.len(), 1);
        let emails: Vec<&str> = apps[0].app.users.iter().map(|u| u.email.as_str()).collect();
        assert_eq!(emails, vec!["a@x.io", "b@x.io"]);
    }

    #[tokio::test]
    async fn missing_scan_file_is_an_error() {
        let storage = Storage::in_memory().await.unwrap();
        assert!(import_scan(&storage, "/nonexistent/scan.json").await.is_err());
        assert!(import_rubric(&storage, "/nonexistent/rubric.csv", 0.8).await.is_err());
    }
}
