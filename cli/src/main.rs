use tokio::net::UnixStream;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use common::ipc::{AppDetail, AppSummary, ImportReport, InventoryStatus, RubricImportReport, ScoreReport};
use common::matching::MatchKind;
use common::{Category, CategoryValues, IpcRequest, IpcResponse, ManagementStatus, OrgSettings, RiskLevel};
use inquire::{Confirm, CustomType, Select};

#[derive(Parser)]
#[command(name = "sid-cli")]
#[command(about = "Inspect and manage the third-party app inventory held by sid-agent")]
struct Cli {
    /// Agent socket
    #[arg(long, global = true, env = "SID_SOCKET", default_value = "/tmp/sid-agent.sock")]
    socket: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Inventory overview
    Status,
    /// Applications ranked by risk
    List {
        #[arg(long)]
        risk: Option<RiskLevel>,
        /// Managed, Unmanaged or "Needs Review" (case and separators ignored)
        #[arg(long)]
        status: Option<ManagementStatus>,
        /// Case-insensitive substring of the application name
        #[arg(long)]
        search: Option<String>,
        /// Show at most this many rows
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Application details with per-user and per-scope risk
    Show { app_id: String },
    /// Risk score breakdown
    Score { app_id: String },
    /// Organization scoring settings
    Settings {
        #[command(subcommand)]
        action: Option<SettingsAction>,
    },
    /// Set management status, owner or notes. Pass "" to clear owner or notes.
    Update {
        app_id: String,
        #[arg(long)]
        status: Option<ManagementStatus>,
        #[arg(long)]
        owner: Option<String>,
        #[arg(long)]
        notes: Option<String>,
    },
    /// Assign a category
    Categorize { app_id: String, category: String },
    /// Replace the inventory with a scan file (JSON)
    Import { path: String },
    /// Apply rubric averages from a CSV file
    ImportRubric { path: String },
}

#[derive(Subcommand, Clone, Copy)]
enum SettingsAction {
    Show,
    /// Interactive editor
    Edit,
    /// Restore the default weights and multipliers
    Reset,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let socket = cli.socket.as_str();

    match cli.command {
        Command::Status => {
            let response = send_request(socket, &IpcRequest::Status).await?;
            print_status(&response);
        }
        Command::List { risk, status, search, limit } => {
            let req = IpcRequest::List { risk, status, search, limit };
            let response = send_request(socket, &req).await?;
            print_list(&response);
        }
        Command::Show { app_id } => {
            let response = send_request(socket, &IpcRequest::Show { app_id }).await?;
            print_show(&response);
        }
        Command::Score { app_id } => {
            let response = send_request(socket, &IpcRequest::Score { app_id }).await?;
            print_score(&response);
        }
        Command::Settings { action } => {
            run_settings(socket, action.unwrap_or(SettingsAction::Show)).await?;
        }
        Command::Update { app_id, status, owner, notes } => {
            let req = IpcRequest::UpdateApp { app_id, status, owner_email: owner, notes };
            let response = send_request(socket, &req).await?;
            match decode::<AppSummary>(&response) {
                Some(app) => println!(
                    "{} {} is now {} (owner: {})",
                    "✓".bright_green(),
                    app.name.bright_white().bold(),
                    app.management_status.to_string().bright_cyan(),
                    app.owner_email.as_deref().unwrap_or("none")
                ),
                None => print_error(&response),
            }
        }
        Command::Categorize { app_id, category } => {
            let response = send_request(socket, &IpcRequest::Categorize { app_id: app_id.clone(), category }).await?;
            if response.success {
                println!(
                    "{} {} categorized as {}",
                    "✓".bright_green(),
                    app_id.bright_white().bold(),
                    response.data["category"].as_str().unwrap_or("?").bright_cyan()
                );
            } else {
                print_error(&response);
            }
        }
        Command::Import { path } => {
            let response = send_request(socket, &IpcRequest::Import { path: absolute(&path)? }).await?;
            match decode::<ImportReport>(&response) {
                Some(report) => println!(
                    "{} Imported {} applications and {} users ({} kept their admin fields)",
                    "✓".bright_green(),
                    report.applications.to_string().bold(),
                    report.users.to_string().bold(),
                    report.preserved
                ),
                None => print_error(&response),
            }
        }
        Command::ImportRubric { path } => {
            let response = send_request(socket, &IpcRequest::ImportRubric { path: absolute(&path)? }).await?;
            print_rubric_import(&response);
        }
    }

    Ok(())
}

/// The agent resolves paths against its own working directory.
fn absolute(path: &str) -> Result<String> {
    let path = std::path::Path::new(path);
    let full = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };
    Ok(full.to_string_lossy().into_owned())
}

async fn send_request(socket_path: &str, request: &IpcRequest) -> Result<IpcResponse> {
    let mut stream = UnixStream::connect(socket_path)
        .await
        .with_context(|| format!("Cannot reach sid-agent at {} (is it running?)", socket_path))?;

    let mut request_json = serde_json::to_string(request)?;
    request_json.push('\n');
    stream.write_all(request_json.as_bytes()).await?;
    stream.shutdown().await?;

    let mut buffer = Vec::new();
    stream.read_to_end(&mut buffer).await?;

    let response: IpcResponse = serde_json::from_slice(&buffer)?;
    Ok(response)
}

fn decode<T: serde::de::DeserializeOwned>(response: &IpcResponse) -> Option<T> {
    if !response.success {
        return None;
    }
    serde_json::from_value(response.data.clone()).ok()
}

fn print_error(response: &IpcResponse) {
    println!(
        "{} {}",
        "✗ Error:".red().bold(),
        response.error_message().unwrap_or("Unexpected response from agent")
    );
}

fn risk_color(level: RiskLevel) -> Color {
    match level {
        RiskLevel::High => Color::Red,
        RiskLevel::Medium => Color::Yellow,
        RiskLevel::Low => Color::Green,
    }
}

fn status_color(status: ManagementStatus) -> Color {
    match status {
        ManagementStatus::Managed => Color::Green,
        ManagementStatus::Unmanaged => Color::Red,
        ManagementStatus::NeedsReview => Color::Yellow,
    }
}

const WIDTH: usize = 62;

fn box_top(title: &str) {
    println!("\n{}", format!("╔{}╗", "═".repeat(WIDTH)).bright_cyan());
    println!("{}", format!("║{:^width$}║", title, width = WIDTH).bright_cyan().bold());
    box_rule();
}

fn box_rule() {
    println!("{}", format!("╠{}╣", "═".repeat(WIDTH)).bright_cyan());
}

fn box_bottom() {
    println!("{}", format!("╚{}╝\n", "═".repeat(WIDTH)).bright_cyan());
}

/// One `║ label value ║` row. `value` is padded before coloring so the
/// escape codes do not count toward the width.
fn box_row(label: &str, value: &str, color: Color) {
    let label_width = 16;
    let value_width = WIDTH - label_width - 3;
    println!(
        "{} {} {}{}",
        "║".bright_cyan(),
        truncate(label, label_width).bright_cyan(),
        truncate(value, value_width).color(color).bold(),
        " ║".bright_cyan()
    );
}

fn box_line(text: &str) {
    println!("{} {} {}", "║".bright_cyan(), truncate(text, WIDTH - 2).dimmed(), "║".bright_cyan());
}

fn print_status(response: &IpcResponse) {
    let Some(status) = decode::<InventoryStatus>(response) else {
        print_error(response);
        return;
    };

    box_top("SID Inventory Status");
    box_row("Agent:", &format!("{} (up {})", status.status, format_uptime(status.uptime_seconds)), Color::BrightGreen);
    box_row("Last import:", status.last_import.as_deref().unwrap_or("never"), Color::BrightWhite);
    box_rule();
    box_row("Applications:", &status.applications.to_string(), Color::BrightWhite);
    box_row("Users:", &status.users.to_string(), Color::BrightWhite);
    box_row("Uncategorized:", &status.uncategorized.to_string(), Color::BrightWhite);
    box_row("No rubric:", &status.without_rubric.to_string(), Color::BrightWhite);
    box_rule();
    box_row("High risk:", &status.by_risk.high.to_string(), risk_color(RiskLevel::High));
    box_row("Medium risk:", &status.by_risk.medium.to_string(), risk_color(RiskLevel::Medium));
    box_row("Low risk:", &status.by_risk.low.to_string(), risk_color(RiskLevel::Low));
    box_rule();
    box_row("Managed:", &status.by_status.managed.to_string(), status_color(ManagementStatus::Managed));
    box_row("Unmanaged:", &status.by_status.unmanaged.to_string(), status_color(ManagementStatus::Unmanaged));
    box_row("Needs review:", &status.by_status.needs_review.to_string(), status_color(ManagementStatus::NeedsReview));
    box_bottom();
}

fn print_list(response: &IpcResponse) {
    let apps: Option<Vec<AppSummary>> = response
        .success
        .then(|| serde_json::from_value(response.data["applications"].clone()).ok())
        .flatten();
    let Some(apps) = apps else {
        print_error(response);
        return;
    };

    if apps.is_empty() {
        println!("\n{}\n", "No applications match.".dimmed());
        return;
    }

    println!("\n{}", "┌────────────────────────┬────────┬───────┬────────┬──────────────┬─────────┐".bright_cyan());
    println!("{}", "│ Application            │ Risk   │ Users │ Scopes │ Status       │ Score   │".bright_cyan().bold());
    println!("{}", "├────────────────────────┼────────┼───────┼────────┼──────────────┼─────────┤".bright_cyan());

    for app in &apps {
        println!(
            "│ {} │ {} │ {:>5} │ {:>6} │ {} │ {:>7} │",
            truncate(&app.name, 22).bright_white(),
            truncate(app.risk_level.as_str(), 6).color(risk_color(app.risk_level)).bold(),
            app.user_count,
            app.scope_count,
            truncate(app.management_status.as_str(), 12).color(status_color(app.management_status)),
            format_score(app.total_score)
        );
    }

    println!("{}", "└────────────────────────┴────────┴───────┴────────┴──────────────┴─────────┘".bright_cyan());
    let total = response.data["total"].as_u64().map_or(apps.len(), |t| t as usize);
    println!("{}\n", list_footer(apps.len(), total).dimmed());
}

fn print_show(response: &IpcResponse) {
    let Some(detail) = decode::<AppDetail>(response) else {
        print_error(response);
        return;
    };
    let app = &detail.summary;

    box_top(&app.name);
    box_row("ID:", &app.id, Color::BrightWhite);
    box_row("Category:", app.category.as_deref().unwrap_or("uncategorized"), Color::BrightWhite);
    box_row("Risk:", app.risk_level.as_str(), risk_color(app.risk_level));
    box_line(&app.risk_reason);
    box_row("Status:", app.management_status.as_str(), status_color(app.management_status));
    box_row("Owner:", app.owner_email.as_deref().unwrap_or("none"), Color::BrightWhite);
    box_row("Gen AI:", &format!("{} ({})", display_or(&detail.gen_ai_status, "unknown"), app.ai_tier.as_str()), Color::BrightWhite);
    box_row("Score:", &format_score(app.total_score), Color::BrightWhite);
    if let Some(imported) = &detail.imported_at {
        box_row("Imported:", imported, Color::White);
    }
    if let Some(notes) = &detail.notes {
        box_rule();
        for line in wrap_text(notes, WIDTH - 2) {
            box_line(&line);
        }
    }

    box_rule();
    println!("{}", format!("║ {:<w$} ║", format!("Scopes ({})", detail.scopes.len()), w = WIDTH - 2).bright_cyan());
    for scope in &detail.scopes {
        println!(
            "{} {} {} {}",
            "║".bright_cyan(),
            truncate(scope.risk_level.as_str(), 6).color(risk_color(scope.risk_level)).bold(),
            truncate(&scope.description, WIDTH - 9).bright_white(),
            "║".bright_cyan()
        );
    }

    box_rule();
    println!("{}", format!("║ {:<w$} ║", format!("Users ({})", detail.users.len()), w = WIDTH - 2).bright_cyan());
    for user in &detail.users {
        println!(
            "{} {} {} {}",
            "║".bright_cyan(),
            truncate(user.risk_level.as_str(), 6).color(risk_color(user.risk_level)).bold(),
            truncate(&format!("{} <{}>", user.name, user.email), WIDTH - 9).bright_white(),
            "║".bright_cyan()
        );
        box_line(&format!("       {}", user.risk_reason));
    }
    box_bottom();
}

fn print_score(response: &IpcResponse) {
    let Some(report) = decode::<ScoreReport>(response) else {
        print_error(response);
        return;
    };
    let score = &report.score;

    println!(
        "\n{} {}  {} {}  {} {}",
        report.app_name.bright_white().bold(),
        format!("({})", report.app_id).dimmed(),
        "AI tier:".bright_cyan(),
        score.ai_tier.as_str().bright_white(),
        "Scope tier:".bright_cyan(),
        score.scope_tier.as_str().bright_white()
    );
    if !report.has_rubric_data {
        println!("{}", "No rubric data imported for this application; every average is 0.".yellow());
    }
    if !score.scope_risk_applicable {
        println!("{}", "Scope risk is not applied to this application.".dimmed());
    }

    println!("{}", "┌────────────────────┬───────┬────────┬────────┬────────┬────────┬────────┬────────┐".bright_cyan());
    println!("{}", "│ Category           │ Avg   │ Weight │ Base   │ AI ×   │ AI     │ Scope× │ Scope  │".bright_cyan().bold());
    println!("{}", "├────────────────────┼───────┼────────┼────────┼────────┼────────┼────────┼────────┤".bright_cyan());
    for (category, row) in score.categories.iter() {
        println!(
            "│ {} │ {:>5.2} │ {:>6.1} │ {:>6.2} │ {:>6.2} │ {:>6.2} │ {:>6.2} │ {:>6.2} │",
            truncate(category.label(), 18).bright_white(),
            row.average,
            row.weight,
            row.base,
            row.ai_multiplier,
            row.ai,
            row.scope_multiplier,
            row.scope
        );
    }
    println!("{}", "├────────────────────┼───────┼────────┼────────┼────────┼────────┼────────┼────────┤".bright_cyan());
    println!(
        "│ {} │       │        │ {:>6.2} │        │ {:>6.2} │        │ {:>6.2} │",
        truncate("Total", 18).bold(),
        score.base_score,
        score.ai_score,
        score.scope_score
    );
    println!("{}", "└────────────────────┴───────┴────────┴────────┴────────┴────────┴────────┴────────┘".bright_cyan());

    let chain = if score.scope_risk_applicable {
        "Base × AI-amp × Scope-amp = Total"
    } else {
        "Base × AI-amp = Total"
    };
    println!("{} {}", chain.dimmed(), report.formula.bright_white().bold());
    println!();
}

fn print_rubric_import(response: &IpcResponse) {
    let Some(report) = decode::<RubricImportReport>(response) else {
        print_error(response);
        return;
    };

    println!(
        "\n{} {} rubric rows, {} applications matched",
        "✓".bright_green(),
        report.rows,
        report.matched.len().to_string().bold()
    );
    for m in &report.matched {
        let how = match m.kind {
            MatchKind::Exact => "exact".to_string(),
            MatchKind::Contains => "contains".to_string(),
            MatchKind::Similar { ratio } => format!("similar {:.2}", ratio),
        };
        println!("  {} ← {} {}", m.app_name.bright_white(), m.rubric_name, format!("({})", how).dimmed());
    }
    if !report.unmatched.is_empty() {
        println!("{}", format!("{} applications without scoring data:", report.unmatched.len()).yellow());
        for name in &report.unmatched {
            println!("  {}", name.dimmed());
        }
    }
    println!();
}

async fn run_settings(socket: &str, action: SettingsAction) -> Result<()> {
    match action {
        SettingsAction::Show => {
            let response = send_request(socket, &IpcRequest::Settings).await?;
            match decode::<OrgSettings>(&response) {
                Some(settings) => print_settings(&settings),
                None => print_error(&response),
            }
        }
        SettingsAction::Reset => {
            let confirmed = Confirm::new("Restore default weights and multipliers?")
                .with_default(false)
                .prompt()?;
            if confirmed {
                save(socket, OrgSettings::default()).await?;
            }
        }
        SettingsAction::Edit => {
            let response = send_request(socket, &IpcRequest::Settings).await?;
            let Some(current) = decode::<OrgSettings>(&response) else {
                print_error(&response);
                return Ok(());
            };
            if let Some(edited) = edit_settings(current)? {
                save(socket, edited).await?;
            }
        }
    }
    Ok(())
}

async fn save(socket: &str, settings: OrgSettings) -> Result<()> {
    let response = send_request(socket, &IpcRequest::SaveSettings { settings }).await?;
    match decode::<OrgSettings>(&response) {
        Some(saved) => {
            println!("{}", "✓ Settings saved".bright_green());
            print_settings(&saved);
            Ok(())
        }
        None => bail!(response.error_message().unwrap_or("Settings rejected").to_string()),
    }
}

const TABLES: [&str; 7] = [
    "Bucket weights",
    "AI multipliers: native",
    "AI multipliers: partial",
    "AI multipliers: none",
    "Scope multipliers: high",
    "Scope multipliers: medium",
    "Scope multipliers: low",
];

fn table_mut(settings: &mut OrgSettings, index: usize) -> &mut CategoryValues<f64> {
    match index {
        0 => &mut settings.bucket_weights,
        1 => &mut settings.ai_multipliers.native,
        2 => &mut settings.ai_multipliers.partial,
        3 => &mut settings.ai_multipliers.none,
        4 => &mut settings.scope_multipliers.high,
        5 => &mut settings.scope_multipliers.medium,
        _ => &mut settings.scope_multipliers.low,
    }
}

/// Returns the edited settings once they validate, or `None` on cancel.
fn edit_settings(mut settings: OrgSettings) -> Result<Option<OrgSettings>> {
    const SAVE: &str = "Save";
    const CANCEL: &str = "Cancel";

    loop {
        let mut options: Vec<&str> = TABLES.to_vec();
        options.push(SAVE);
        options.push(CANCEL);

        let choice = Select::new("Edit which table?", options).prompt()?;
        if choice == CANCEL {
            return Ok(None);
        }
        if choice == SAVE {
            match settings.validate() {
                Ok(()) => return Ok(Some(settings)),
                Err(e) => {
                    println!("{} {}", "✗".red().bold(), e.to_string().red());
                    continue;
                }
            }
        }

        let Some(index) = TABLES.iter().position(|t| *t == choice) else {
            continue;
        };
        let table = table_mut(&mut settings, index);
        for category in Category::ALL {
            let value = table.get_mut(category);
            *value = CustomType::<f64>::new(&format!("{}:", category.label()))
                .with_default(*value)
                .with_error_message("Enter a number")
                .prompt()?;
        }
        if index == 0 {
            println!("{}", format!("Weights now sum to {:.1}", settings.weight_sum()).dimmed());
        }
    }
}

fn print_settings(settings: &OrgSettings) {
    let mut copy = *settings;
    println!();
    print!("{}", format!("{:<26}", "Table").bright_cyan().bold());
    for category in Category::ALL {
        print!("{}", format!("{:>19}", category.label()).bright_cyan().bold());
    }
    println!();
    for (index, name) in TABLES.iter().enumerate() {
        print!("{:<26}", name);
        for (_, value) in table_mut(&mut copy, index).iter() {
            print!("{:>19.2}", value);
        }
        println!();
    }
    println!();
}

fn list_footer(shown: usize, total: usize) -> String {
    if shown < total {
        format!("showing {} of {} applications (raise --limit for more)", shown, total)
    } else {
        format!("{} applications", shown)
    }
}

fn format_score(score: Option<f64>) -> String {
    score.map(|s| format!("{:.2}", s)).unwrap_or_else(|| "-".to_string())
}

fn display_or<'a>(value: &'a str, fallback: &'a str) -> &'a str {
    if value.trim().is_empty() { fallback } else { value }
}

fn wrap_text(text: &str, max_width: usize) -> Vec<String> {
    let mut result = Vec::new();
    let mut current_line = String::new();

    for word in text.split_whitespace() {
        if current_line.is_empty() {
            current_line = word.to_string();
        } else if current_line.chars().count() + word.chars().count() < max_width {
            current_line.push(' ');
            current_line.push_str(word);
        } else {
            result.push(std::mem::take(&mut current_line));
            current_line = word.to_string();
        }
    }

    if !current_line.is_empty() || result.is_empty() {
        result.push(current_line);
    }
    result
}

fn format_uptime(seconds: u64) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;

    if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, secs)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, secs)
    } else {
        format!("{}s", secs)
    }
}

/// Pads or cuts `s` to exactly `max_len` characters.
fn truncate(s: &str, max_len: usize) -> String {
    let len = s.chars().count();
    if len <= max_len {
        format!("{:width$}", s, width = max_len)
    } else {
        let cut: String = s.chars().take(max_len.saturating_sub(2)).collect();
        format!("{}..", cut)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_pads_and_cuts_by_chars() {
        assert_eq!(truncate("abc", 5), "abc  ");
        assert_eq!(truncate("abcdefgh", 5), "abc..");
        assert_eq!(truncate("Übersicht-Tool", 6).chars().count(), 6);
    }

    #[test]
    fn uptime_formats() {
        assert_eq!(format_uptime(42), "42s");
        assert_eq!(format_uptime(125), "2m 5s");
        assert_eq!(format_uptime(3725), "1h 2m 5s");
    }

    #[test]
    fn wrap_respects_width() {
        let lines = wrap_text("approved by security for the marketing team only", 20);
        assert!(lines.iter().all(|l| l.chars().count() <= 20));
        assert_eq!(lines.join(" "), "approved by security for the marketing team only");
        assert_eq!(wrap_text("", 10), vec![String::new()]);
    }

    #[test]
    fn score_placeholder_when_unscored() {
        assert_eq!(format_score(None), "-");
        assert_eq!(format_score(Some(12.345)), "12.35");
    }

    #[test]
    fn every_table_is_editable() {
        let mut settings = OrgSettings::default();
        for index in 0..TABLES.len() {
            *table_mut(&mut settings, index).get_mut(Category::VendorProfile) = 2.5;
        }
        assert_eq!(settings.bucket_weights.vendor_profile, 2.5);
        assert_eq!(settings.scope_multipliers.low.vendor_profile, 2.5);
        assert_eq!(settings.ai_multipliers.partial.vendor_profile, 2.5);
    }

    #[test]
    fn status_flag_parsing() {
        let cli = Cli::try_parse_from(["sid-cli", "list", "--status", "needs-review"]).unwrap();
        match cli.command {
            Command::List { status, .. } => assert_eq!(status, Some(ManagementStatus::NeedsReview)),
            _ => panic!("expected list"),
        }
        assert!(Cli::try_parse_from(["sid-cli", "update", "zoom", "--status", "retired"]).is_err());
    }

    #[test]
    fn cli_arguments_parse() {
        let cli = Cli::try_parse_from(["sid-cli", "list", "--risk", "high", "--limit", "5"]).unwrap();
        match cli.command {
            Command::List { risk, limit, .. } => {
                assert_eq!(risk, Some(RiskLevel::High));
                assert_eq!(limit, Some(5));
            }
            _ => panic!("expected list"),
        }
    }

    #[test]
    fn list_is_unlimited_by_default() {
        let cli = Cli::try_parse_from(["sid-cli", "list"]).unwrap();
        match cli.command {
            Command::List { limit, .. } => assert_eq!(limit, None),
            _ => panic!("expected list"),
        }
    }

    #[test]
    fn footer_reports_cut_lists() {
        assert_eq!(list_footer(3, 3), "3 applications");
        assert_eq!(list_footer(5, 12), "showing 5 of 12 applications (raise --limit for more)");
    }
}
