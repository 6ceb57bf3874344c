use crate::importer::{import_rubric, import_scan};
use crate::settings_store::{save_settings, SettingsStore};
use crate::storage::Storage;
use anyhow::Result;
use chrono::{TimeZone, Utc};
use common::inventory::{count_by_risk, count_by_status, detail, risk_ranked, summarize, ListFilter};
use common::ipc::{InventoryStatus, ScoreReport};
use common::{score_application, IngestConfig, IpcRequest, IpcResponse, ManagementStatus};
use log::{debug, error, info, warn};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};

static START_TIME: std::sync::OnceLock<u64> = std::sync::OnceLock::new();

/// Largest request line accepted from a client.
const MAX_REQUEST_BYTES: usize = 64 * 1024;

/// Everything a request handler needs.
#[derive(Clone)]
pub struct AgentState {
    pub storage: Storage,
    pub ingest: IngestConfig,
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

pub async fn start_ipc_server(state: AgentState, socket_path: String) -> Result<()> {
    // Remove old socket if exists
    let _ = std::fs::remove_file(&socket_path);

    let listener = UnixListener::bind(&socket_path)?;

    // Owner and group only: the socket accepts settings changes
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o660);
        std::fs::set_permissions(&socket_path, perms)?;
    }

    info!("IPC server listening on {}", socket_path);
    START_TIME.get_or_init(now_secs);

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((stream, _)) => {
                    let state = state.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handle_client(stream, state).await {
                            error!("Client error: {}", e);
                        }
                    });
                }
                Err(e) => {
                    error!("Accept error: {}", e);
                }
            }
        }
    });

    Ok(())
}

async fn handle_client(stream: UnixStream, state: AgentState) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut buf = Vec::new();
    let n = BufReader::new(reader)
        .take(MAX_REQUEST_BYTES as u64 + 1)
        .read_until(b'\n', &mut buf)
        .await?;

    if n == 0 {
        return Ok(());
    }

    let response = match decode_request(&buf) {
        Ok(req) => handle_request(req, &state).await,
        Err(message) => {
            warn!("{}", message);
            IpcResponse::error(message)
        }
    };

    let response_json = serde_json::to_string(&response)?;
    writer.write_all(response_json.as_bytes()).await?;
    writer.write_all(b"\n").await?;

    Ok(())
}

/// Decodes one raw request line. The error is the message sent back.
fn decode_request(buf: &[u8]) -> std::result::Result<IpcRequest, String> {
    let line = buf.strip_suffix(b"\n").unwrap_or(buf);
    if line.len() > MAX_REQUEST_BYTES {
        return Err(format!("Invalid request: longer than {} bytes", MAX_REQUEST_BYTES));
    }
    let text = std::str::from_utf8(line).map_err(|e| format!("Invalid request: not UTF-8 ({})", e))?;
    debug!("IPC request: {}", text.trim());
    serde_json::from_str(text).map_err(|e| format!("Invalid request: {}", e))
}

pub async fn handle_request(req: IpcRequest, state: &AgentState) -> IpcResponse {
    let result = match req {
        IpcRequest::Status => handle_status(state).await,
        IpcRequest::List { risk, status, search, limit } => {
            handle_list(state, ListFilter { risk, status, search, limit }).await
        }
        IpcRequest::Show { app_id } => handle_show(state, &app_id).await,
        IpcRequest::Score { app_id } => handle_score(state, &app_id).await,
        IpcRequest::Settings => state.storage.load_settings().await.map(|s| IpcResponse::ok(&s)),
        IpcRequest::SaveSettings { settings } => save_settings(&state.storage, &settings)
            .await
            .map(|_| IpcResponse::ok(&settings)),
        IpcRequest::UpdateApp { app_id, status, owner_email, notes } => {
            handle_update(state, &app_id, status, owner_email, notes).await
        }
        IpcRequest::Categorize { app_id, category } => handle_categorize(state, &app_id, &category).await,
        IpcRequest::Import { path } => import_scan(&state.storage, &path).await.map(|r| IpcResponse::ok(&r)),
        IpcRequest::ImportRubric { path } => import_rubric(&state.storage, &path, state.ingest.match_threshold)
            .await
            .map(|r| IpcResponse::ok(&r)),
    };

    result.unwrap_or_else(|e| {
        warn!("Request failed: {:#}", e);
        IpcResponse::error(format!("{:#}", e))
    })
}

fn not_found(app_id: &str) -> IpcResponse {
    IpcResponse::error(format!("Application {} not found", app_id))
}

fn format_ts(ts: i64) -> Option<String> {
    Utc.timestamp_opt(ts, 0).single().map(|dt| dt.to_rfc3339())
}

async fn handle_status(state: &AgentState) -> Result<IpcResponse> {
    let apps: Vec<_> = state.storage.list_applications().await?.into_iter().map(|s| s.app).collect();
    let uptime_seconds = now_secs().saturating_sub(*START_TIME.get().unwrap_or(&0));

    let status = InventoryStatus {
        status: "running".to_string(),
        uptime_seconds,
        applications: apps.len(),
        users: apps.iter().map(|a| a.users.len()).sum(),
        by_risk: count_by_risk(&apps),
        by_status: count_by_status(&apps),
        uncategorized: apps.iter().filter(|a| a.category.is_none()).count(),
        without_rubric: apps.iter().filter(|a| !a.has_rubric_data()).count(),
        last_import: state.storage.last_import().await?.and_then(format_ts),
    };
    Ok(IpcResponse::ok(&status))
}

/// `total` counts every match before `limit` is applied.
async fn handle_list(state: &AgentState, filter: ListFilter) -> Result<IpcResponse> {
    let settings = state.storage.load_settings().await?;
    let apps: Vec<_> = state.storage.list_applications().await?.into_iter().map(|s| s.app).collect();
    let limit = filter.limit;
    let mut rows = risk_ranked(&apps, &settings, &ListFilter { limit: None, ..filter });
    let total = rows.len();
    if let Some(limit) = limit {
        rows.truncate(limit);
    }
    Ok(IpcResponse::ok(&serde_json::json!({ "applications": rows, "total": total })))
}

async fn handle_show(state: &AgentState, app_id: &str) -> Result<IpcResponse> {
    let Some(stored) = state.storage.get_application(app_id).await? else {
        return Ok(not_found(app_id));
    };
    let settings = state.storage.load_settings().await?;
    Ok(IpcResponse::ok(&detail(&stored.app, &settings, format_ts(stored.imported_at))))
}

async fn handle_score(state: &AgentState, app_id: &str) -> Result<IpcResponse> {
    let Some(stored) = state.storage.get_application(app_id).await? else {
        return Ok(not_found(app_id));
    };
    let settings = state.storage.load_settings().await?;
    let score = score_application(&stored.app, &settings);
    Ok(IpcResponse::ok(&ScoreReport {
        app_id: stored.app.id.clone(),
        app_name: stored.app.name.clone(),
        has_rubric_data: stored.app.has_rubric_data(),
        formula: score.formula(),
        score,
    }))
}

async fn handle_update(
    state: &AgentState,
    app_id: &str,
    status: Option<ManagementStatus>,
    owner_email: Option<String>,
    notes: Option<String>,
) -> Result<IpcResponse> {
    if status.is_none() && owner_email.is_none() && notes.is_none() {
        return Ok(IpcResponse::error("Nothing to update: pass a status, owner or notes"));
    }
    let found = state
        .storage
        .update_management(app_id, status, owner_email.as_deref(), notes.as_deref())
        .await?;
    if !found {
        return Ok(not_found(app_id));
    }
    info!("Application {} updated", app_id);

    let settings = state.storage.load_settings().await?;
    match state.storage.get_application(app_id).await? {
        Some(stored) => Ok(IpcResponse::ok(&summarize(&stored.app, &settings))),
        None => Ok(not_found(app_id)),
    }
}

async fn handle_categorize(state: &AgentState, app_id: &str, category: &str) -> Result<IpcResponse> {
    let category = category.trim();
    if category.is_empty() {
        return Ok(IpcResponse::error("Category must not be empty"));
    }
    if !state.storage.set_category(app_id, category).await? {
        return Ok(not_found(app_id));
    }
    info!("Application {} categorized as {}", app_id, category);
    Ok(IpcResponse::ok(&serde_json::json!({ "app_id": app_id, "category": category })))
}
