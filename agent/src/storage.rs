use anyhow::{Context, Result};
use common::ipc::ImportReport;
use common::{AppUser, Application, CategoryValues, ManagementStatus};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Executor, Row, SqlitePool};
use log::warn;
use std::collections::{HashMap, HashSet};
use std::str::FromStr;

#[derive(Clone)]
pub struct Storage { pool: SqlitePool }

/// An application as persisted, with the time of the scan that wrote it.
#[derive(Debug, Clone)]
pub struct StoredApp {
    pub app: Application,
    pub imported_at: i64,
}

/// Administrator-owned fields carried over when a rescan replaces a row.
struct Preserved {
    category: Option<String>,
    management_status: ManagementStatus,
    owner_email: Option<String>,
    notes: Option<String>,
    rubric: CategoryValues<f64>,
    gen_ai_status: String,
}

const APP_COLUMNS: &str = "id, name, category, scopes, management_status, owner_email, notes, gen_ai_status, \
     avg_data_privacy, avg_security_access, avg_business_impact, avg_ai_governance, avg_vendor_profile, imported_at";

impl Storage {
    pub async fn new(path: &str) -> Result<Self> {
        let url = format!("sqlite://{}", path);
        let options = SqliteConnectOptions::from_str(&url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new().connect_with(options).await
            .with_context(|| format!("Failed to open database {}", path))?;
        Self::init(pool).await
    }

    /// Single-connection in-memory database; every connection of a pool
    /// would otherwise see its own empty database.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;
        Self::init(pool).await
    }

    async fn init(pool: SqlitePool) -> Result<Self> {
        pool.execute(include_str!("../../sql/schema.sql")).await
            .context("Failed to apply schema")?;
        Ok(Self { pool })
    }

    /// Replaces the whole inventory with a fresh scan. Category, management
    /// status, owner, notes and rubric data survive for ids already known.
    pub async fn replace_inventory(&self, apps: &[Application]) -> Result<ImportReport> {
        let mut tx = self.pool.begin().await?;

        let rows = sqlx::query(&format!("SELECT {} FROM applications", APP_COLUMNS))
            .fetch_all(&mut *tx)
            .await?;
        let mut preserved: HashMap<String, Preserved> = HashMap::new();
        for row in &rows {
            let app = decode_app(row)?;
            preserved.insert(app.id.clone(), Preserved {
                category: app.category,
                management_status: app.management_status,
                owner_email: app.owner_email,
                notes: app.notes,
                rubric: app.rubric,
                gen_ai_status: app.gen_ai_status,
            });
        }

        sqlx::query("DELETE FROM app_users").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM applications").execute(&mut *tx).await?;

        let now = chrono::Utc::now().timestamp();
        let mut report = ImportReport::default();
        let mut written: HashSet<&str> = HashSet::new();
        for incoming in apps {
            if !written.insert(incoming.id.as_str()) {
                warn!("Skipping second application with id {} ({})", incoming.id, incoming.name);
                continue;
            }
            let mut app = incoming.clone();
            if let Some(old) = preserved.remove(&app.id) {
                report.preserved += 1;
                app.management_status = old.management_status;
                app.owner_email = old.owner_email;
                app.notes = old.notes;
                if app.category.is_none() {
                    app.category = old.category;
                }
                if !app.has_rubric_data() {
                    app.rubric = old.rubric;
                    app.gen_ai_status = old.gen_ai_status;
                }
            }

            sqlx::query(&format!(
                "INSERT OR REPLACE INTO applications({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                APP_COLUMNS
            ))
            .bind(&app.id)
            .bind(&app.name)
            .bind(&app.category)
            .bind(serde_json::to_string(&app.scopes)?)
            .bind(app.management_status.as_str())
            .bind(&app.owner_email)
            .bind(&app.notes)
            .bind(&app.gen_ai_status)
            .bind(app.rubric.data_privacy)
            .bind(app.rubric.security_access)
            .bind(app.rubric.business_impact)
            .bind(app.rubric.ai_governance)
            .bind(app.rubric.vendor_profile)
            .bind(now)
            .execute(&mut *tx)
            .await?;

            for (position, user) in app.users.iter().enumerate() {
                sqlx::query("INSERT INTO app_users(app_id, position, name, email, scopes) VALUES (?, ?, ?, ?, ?)")
                    .bind(&app.id)
                    .bind(position as i64)
                    .bind(&user.name)
                    .bind(&user.email)
                    .bind(serde_json::to_string(&user.scopes)?)
                    .execute(&mut *tx)
                    .await?;
            }
            report.applications += 1;
            report.users += app.users.len();
        }

        tx.commit().await?;
        Ok(report)
    }

    pub async fn list_applications(&self) -> Result<Vec<StoredApp>> {
        let rows = sqlx::query(&format!("SELECT {} FROM applications ORDER BY name", APP_COLUMNS))
            .fetch_all(&self.pool)
            .await?;
        let mut users = self.users_by_app(None).await?;

        rows.iter().map(|row| -> Result<StoredApp> {
            let mut app = decode_app(row)?;
            app.users = users.remove(&app.id).unwrap_or_default();
            Ok(StoredApp { app, imported_at: row.try_get("imported_at")? })
        }).collect()
    }

    pub async fn get_application(&self, id: &str) -> Result<Option<StoredApp>> {
        let row = sqlx::query(&format!("SELECT {} FROM applications WHERE id = ?", APP_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        let Some(row) = row else { return Ok(None) };

        let mut app = decode_app(&row)?;
        app.users = self.users_by_app(Some(id)).await?.remove(id).unwrap_or_default();
        Ok(Some(StoredApp { app, imported_at: row.try_get("imported_at")? }))
    }

    async fn users_by_app(&self, id: Option<&str>) -> Result<HashMap<String, Vec<AppUser>>> {
        let rows = match id {
            Some(id) => sqlx::query_as::<_, (String, String, String, String)>(
                "SELECT app_id, name, email, scopes FROM app_users WHERE app_id = ? ORDER BY position",
            )
            .bind(id)
            .fetch_all(&self.pool)
            .await?,
            None => sqlx::query_as::<_, (String, String, String, String)>(
                "SELECT app_id, name, email, scopes FROM app_users ORDER BY app_id, position",
            )
            .fetch_all(&self.pool)
            .await?,
        };

        let mut by_app: HashMap<String, Vec<AppUser>> = HashMap::new();
        for (app_id, name, email, scopes) in rows {
            let scopes = serde_json::from_str(&scopes)
                .with_context(|| format!("Corrupt scope list for user {} of {}", email, app_id))?;
            by_app.entry(app_id).or_default().push(AppUser { name, email, scopes });
        }
        Ok(by_app)
    }

    /// Administrator edits. `None` leaves a field unchanged; an empty owner or
    /// notes string clears it. Returns false when the id is unknown.
    pub async fn update_management(
        &self,
        id: &str,
        status: Option<ManagementStatus>,
        owner_email: Option<&str>,
        notes: Option<&str>,
    ) -> Result<bool> {
        let clear_empty = |v: Option<&str>| v.map(|s| s.trim().to_string());
        let result = sqlx::query(
            "UPDATE applications SET \
               management_status = COALESCE(?, management_status), \
               owner_email = CASE WHEN ? IS NULL THEN owner_email ELSE NULLIF(?, '') END, \
               notes = CASE WHEN ? IS NULL THEN notes ELSE NULLIF(?, '') END \
             WHERE id = ?",
        )
        .bind(status.map(|s| s.as_str()))
        .bind(clear_empty(owner_email))
        .bind(clear_empty(owner_email))
        .bind(clear_empty(notes))
        .bind(clear_empty(notes))
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn set_category(&self, id: &str, category: &str) -> Result<bool> {
        let result = sqlx::query("UPDATE applications SET category = ? WHERE id = ?")
            .bind(category)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn apply_rubric(&self, id: &str, averages: &CategoryValues<f64>, gen_ai_status: &str) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE applications SET avg_data_privacy = ?, avg_security_access = ?, avg_business_impact = ?, \
             avg_ai_governance = ?, avg_vendor_profile = ?, gen_ai_status = ? WHERE id = ?",
        )
        .bind(averages.data_privacy)
        .bind(averages.security_access)
        .bind(averages.business_impact)
        .bind(averages.ai_governance)
        .bind(averages.vendor_profile)
        .bind(gen_ai_status)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn last_import(&self) -> Result<Option<i64>> {
        let (ts,): (Option<i64>,) = sqlx::query_as("SELECT MAX(imported_at) FROM applications")
            .fetch_one(&self.pool)
            .await?;
        Ok(ts)
    }

    pub(crate) async fn read_settings_body(&self) -> Result<Option<String>> {
        let row: Option<(String,)> = sqlx::query_as("SELECT body FROM org_settings WHERE id = 1")
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|(body,)| body))
    }

    pub(crate) async fn write_settings_body(&self, body: &str) -> Result<()> {
        sqlx::query("INSERT OR REPLACE INTO org_settings(id, body, updated_at) VALUES (1, ?, ?)")
            .bind(body)
            .bind(chrono::Utc::now().timestamp())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

fn decode_app(row: &SqliteRow) -> Result<Application> {
    let id: String = row.try_get("id")?;
    let scopes: String = row.try_get("scopes")?;
    let status: String = row.try_get("management_status")?;
    Ok(Application {
        scopes: serde_json::from_str(&scopes)
            .with_context(|| format!("Corrupt scope list for application {}", id))?,
        name: row.try_get("name")?,
        category: row.try_get("category")?,
        users: Vec::new(),
        management_status: ManagementStatus::parse(&status).unwrap_or_default(),
        owner_email: row.try_get("owner_email")?,
        notes: row.try_get("notes")?,
        rubric: CategoryValues {
            data_privacy: row.try_get("avg_data_privacy")?,
            security_access: row.try_get("avg_security_access")?,
            business_impact: row.try_get("avg_business_impact")?,
            ai_governance: row.try_get("avg_ai_governance")?,
            vendor_profile: row.try_get("avg_vendor_profile")?,
        },
        gen_ai_status: row.try_get("gen_ai_status")?,
        id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scan() -> Vec<Application> {
        vec![
            Application {
                id: "zoom".into(),
                name: "Zoom".into(),
                scopes: vec!["openid".into(), "https://www.googleapis.com/auth/calendar".into()],
                users: vec![
                    AppUser { name: "Ann".into(), email: "ann@x.io".into(), scopes: vec!["openid".into()] },
                    AppUser {
                        name: "Bob".into(),
                        email: "bob@x.io".into(),
                        scopes: vec!["https://www.googleapis.com/auth/calendar".into()],
                    },
                ],
                ..Default::default()
            },
            Application { id: "miro".into(), name: "Miro".into(), ..Default::default() },
        ]
    }

    #[tokio::test]
    async fn inventory_round_trips() {
        let storage = Storage::in_memory().await.unwrap();
        let report = storage.replace_inventory(&scan()).await.unwrap();
        assert_eq!(report, ImportReport { applications: 2, users: 2, preserved: 0 });

        let apps = storage.list_applications().await.unwrap();
        assert_eq!(apps.len(), 2);
        assert_eq!(apps[0].app.name, "Miro");
        assert!(apps[0].app.users.is_empty());
        assert_eq!(apps[1].app.users.len(), 2);
        assert_eq!(apps[1].app.users[1].email, "bob@x.io");
        assert_eq!(apps[1].app.scopes.len(), 2);

        let zoom = storage.get_application("zoom").await.unwrap().unwrap();
        assert_eq!(zoom.app, scan()[0]);
        assert!(storage.get_application("nope").await.unwrap().is_none());
        assert!(storage.last_import().await.unwrap().is_some());
    }

    #[tokio::test]
    async fn repeated_id_keeps_first_row_and_its_users() {
        let storage = Storage::in_memory().await.unwrap();
        let mut apps = scan();
        let mut shadow = apps[0].clone();
        shadow.name = "zoom".into();
        shadow.users = vec![AppUser { name: "Eve".into(), email: "eve@x.io".into(), scopes: vec!["openid".into()] }];
        apps.insert(1, shadow);

        let report = storage.replace_inventory(&apps).await.unwrap();
        assert_eq!(report, ImportReport { applications: 2, users: 2, preserved: 0 });

        let zoom = storage.get_application("zoom").await.unwrap().unwrap().app;
        assert_eq!(zoom.name, "Zoom");
        let emails: Vec<&str> = zoom.users.iter().map(|u| u.email.as_str()).collect();
        assert_eq!(emails, vec!["ann@x.io", "bob@x.io"]);
    }

    #[tokio::test]
    async fn rescan_preserves_admin_fields() {
        let storage = Storage::in_memory().await.unwrap();
        storage.replace_inventory(&scan()).await.unwrap();
        assert!(storage
            .update_management("zoom", Some(ManagementStatus::Managed), Some("it@x.io"), Some("approved"))
            .await
            .unwrap());
        assert!(storage.set_category("zoom", "Video").await.unwrap());
        assert!(storage.apply_rubric("zoom", &CategoryValues::splat(3.0), "No").await.unwrap());

        let mut rescan = scan();
        rescan[0].users.pop();
        rescan.pop();
        let report = storage.replace_inventory(&rescan).await.unwrap();
        assert_eq!(report.preserved, 1);

        let apps = storage.list_applications().await.unwrap();
        assert_eq!(apps.len(), 1);
        let zoom = &apps[0].app;
        assert_eq!(zoom.users.len(), 1);
        assert_eq!(zoom.management_status, ManagementStatus::Managed);
        assert_eq!(zoom.owner_email.as_deref(), Some("it@x.io"));
        assert_eq!(zoom.notes.as_deref(), Some("approved"));
        assert_eq!(zoom.category.as_deref(), Some("Video"));
        assert_eq!(zoom.rubric, CategoryValues::splat(3.0));
        assert_eq!(zoom.gen_ai_status, "No");
    }

    #[tokio::test]
    async fn partial_updates_leave_other_fields() {
        let storage = Storage::in_memory().await.unwrap();
        storage.replace_inventory(&scan()).await.unwrap();
        storage.update_management("miro", None, Some("owner@x.io"), Some("n")).await.unwrap();
        storage.update_management("miro", Some(ManagementStatus::Unmanaged), None, Some("")).await.unwrap();

        let miro = storage.get_application("miro").await.unwrap().unwrap().app;
        assert_eq!(miro.management_status, ManagementStatus::Unmanaged);
        assert_eq!(miro.owner_email.as_deref(), Some("owner@x.io"));
        assert_eq!(miro.notes, None);

        assert!(!storage.update_management("ghost", None, None, None).await.unwrap());
        assert!(!storage.set_category("ghost", "x").await.unwrap());
    }
}
