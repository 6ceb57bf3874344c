//! OAuth scope catalogs and single-scope classification.
//!
//! Scopes are compared lowercased, with any `http(s)://` scheme and leading
//! `www.` removed. Google scopes are matched by substring so that every
//! variant of a broad grant (e.g. all `gmail.*` scopes) lands in the same
//! tier. Microsoft Graph permissions are matched by name, either
//! bare (`Mail.Read`) or as the last path segment of a resource URI
//! (`https://graph.microsoft.com/Mail.Read`), because their names are
//! prefixes of one another (`Mail.Read` vs `Mail.ReadBasic`).

use crate::risk::RiskLevel;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopePattern {
    /// Lowercased scope contains the needle.
    Contains(&'static str),
    /// Normalized scope equals the needle exactly.
    Exact(&'static str),
    /// Contains the needle and does not end in `.readonly`.
    Write(&'static str),
    /// Contains the needle and ends in `.readonly`.
    ReadOnly(&'static str),
    /// Lowercased scope is the permission name, or ends with `/<name>`.
    Permission(&'static str),
}

impl ScopePattern {
    pub fn matches(&self, lowered: &str) -> bool {
        match *self {
            ScopePattern::Contains(needle) => lowered.contains(needle),
            ScopePattern::Exact(needle) => lowered == needle,
            ScopePattern::Write(needle) => lowered.contains(needle) && !lowered.ends_with(".readonly"),
            ScopePattern::ReadOnly(needle) => lowered.contains(needle) && lowered.ends_with(".readonly"),
            ScopePattern::Permission(name) => {
                lowered == name
                    || lowered
                        .strip_suffix(name)
                        .map_or(false, |head| head.ends_with('/'))
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ScopeRule {
    pub pattern: ScopePattern,
    pub description: &'static str,
}

const fn rule(pattern: ScopePattern, description: &'static str) -> ScopeRule {
    ScopeRule { pattern, description }
}

use ScopePattern::{Contains, Exact, Permission, ReadOnly, Write};

pub const HIGH_RISK_SCOPES: &[ScopeRule] = &[
    // Google Workspace
    rule(Contains("mail.google.com"), "Full Gmail access"),
    rule(Contains("googleapis.com/auth/gmail"), "Gmail access"),
    rule(Exact("googleapis.com/auth/drive"), "Full Drive access"),
    rule(Exact("googleapis.com/auth/drive.readonly"), "Read all Drive files"),
    rule(Exact("googleapis.com/auth/admin.directory.user"), "Directory user administration"),
    rule(Exact("googleapis.com/auth/admin.directory.group"), "Directory group administration"),
    rule(Exact("googleapis.com/auth/admin.directory.domain"), "Domain administration"),
    rule(Exact("googleapis.com/auth/admin.directory.rolemanagement"), "Admin role management"),
    rule(Exact("googleapis.com/auth/admin.directory.device.chromeos"), "Device administration"),
    rule(Exact("googleapis.com/auth/admin.directory.device.mobile"), "Device administration"),
    rule(Exact("googleapis.com/auth/admin.directory.orgunit"), "Org unit administration"),
    rule(Exact("googleapis.com/auth/admin.directory.user.alias"), "User alias administration"),
    rule(Exact("googleapis.com/auth/admin.directory.customer"), "Customer account administration"),
    rule(Exact("googleapis.com/auth/admin.directory.userschema"), "User schema administration"),
    rule(Exact("googleapis.com/auth/admin.directory.resource.calendar"), "Calendar resource administration"),
    rule(Contains("googleapis.com/auth/admin.directory.user.security"), "User security settings"),
    rule(Write("googleapis.com/auth/admin.directory."), "Directory write access"),
    rule(Contains("googleapis.com/auth/admin.datatransfer"), "Admin data transfer"),
    rule(Contains("googleapis.com/auth/apps.groups.settings"), "Group settings administration"),
    rule(Contains("googleapis.com/auth/cloud-identity"), "Cloud Identity administration"),
    rule(Contains("googleapis.com/auth/cloud-platform"), "Full Google Cloud access"),
    rule(Contains("googleapis.com/auth/ediscovery"), "Vault eDiscovery"),
    rule(Contains("googleapis.com/auth/apps.alerts"), "Security alert center"),
    // Microsoft Graph
    rule(Permission("mail.read"), "Read user mail"),
    rule(Permission("mail.readwrite"), "Read and write user mail"),
    rule(Permission("mail.send"), "Send mail as user"),
    rule(Permission("mail.read.shared"), "Read shared mailboxes"),
    rule(Permission("mail.readwrite.shared"), "Read and write shared mailboxes"),
    rule(Permission("files.read.all"), "Read all files"),
    rule(Permission("files.readwrite.all"), "Read and write all files"),
    rule(Permission("sites.read.all"), "Read all SharePoint sites"),
    rule(Permission("sites.readwrite.all"), "Read and write all SharePoint sites"),
    rule(Permission("sites.fullcontrol.all"), "Full control of SharePoint sites"),
    rule(Permission("directory.readwrite.all"), "Directory write access"),
    rule(Permission("directory.accessasuser.all"), "Directory access as user"),
    rule(Permission("user.readwrite.all"), "Write all user profiles"),
    rule(Permission("group.readwrite.all"), "Write all groups"),
    rule(Permission("rolemanagement.readwrite.directory"), "Admin role management"),
    rule(Permission("application.readwrite.all"), "Application registration management"),
    rule(Permission("securityevents.readwrite.all"), "Security events write access"),
    rule(Contains("policy.readwrite."), "Security policy write access"),
    rule(Permission("full_access_as_app"), "Full mailbox access as application"),
    rule(Permission("full_access_as_user"), "Full mailbox access as user"),
];

pub const MEDIUM_RISK_SCOPES: &[ScopeRule] = &[
    // Google Workspace
    rule(Contains("googleapis.com/auth/calendar"), "Calendar access"),
    rule(Contains("googleapis.com/auth/contacts"), "Contacts access"),
    rule(Contains("googleapis.com/auth/directory.readonly"), "Read organization directory"),
    rule(ReadOnly("googleapis.com/auth/admin.directory."), "Read-only directory access"),
    rule(Contains("googleapis.com/auth/admin.reports"), "Admin reports"),
    rule(Contains("googleapis.com/auth/drive."), "Limited Drive access"),
    rule(Contains("googleapis.com/auth/spreadsheets"), "Sheets access"),
    rule(Contains("googleapis.com/auth/documents"), "Docs access"),
    rule(Contains("googleapis.com/auth/presentations"), "Slides access"),
    rule(Contains("googleapis.com/auth/forms"), "Forms access"),
    rule(Contains("googleapis.com/auth/tasks"), "Tasks access"),
    rule(Contains("googleapis.com/auth/chat"), "Chat access"),
    rule(Contains("googleapis.com/auth/meetings"), "Meet access"),
    rule(Contains("googleapis.com/auth/user.phonenumbers"), "Phone numbers"),
    rule(Contains("googleapis.com/auth/user.addresses"), "Postal addresses"),
    rule(Contains("googleapis.com/auth/user.birthday"), "Birthday"),
    // Microsoft Graph
    rule(Permission("mail.readbasic"), "Read basic mail metadata"),
    rule(Permission("calendars.read"), "Read calendars"),
    rule(Permission("calendars.readwrite"), "Read and write calendars"),
    rule(Permission("calendars.read.shared"), "Read shared calendars"),
    rule(Permission("calendars.readwrite.shared"), "Read and write shared calendars"),
    rule(Permission("contacts.read"), "Read contacts"),
    rule(Permission("contacts.readwrite"), "Read and write contacts"),
    rule(Permission("files.read"), "Read user files"),
    rule(Permission("files.readwrite"), "Read and write user files"),
    rule(Permission("user.read.all"), "Read all user profiles"),
    rule(Permission("user.readbasic.all"), "Read basic user profiles"),
    rule(Permission("directory.read.all"), "Read directory"),
    rule(Permission("group.read.all"), "Read all groups"),
    rule(Permission("people.read"), "Read relevant people"),
    rule(Permission("tasks.readwrite"), "Read and write tasks"),
    rule(Permission("notes.readwrite"), "Read and write OneNote notebooks"),
    rule(Permission("chat.read"), "Read chats"),
    rule(Permission("chat.readwrite"), "Read and write chats"),
    rule(Permission("channelmessage.read.all"), "Read channel messages"),
    rule(Permission("team.readbasic.all"), "Read team names"),
    rule(Permission("onlinemeetings.readwrite"), "Manage online meetings"),
];

/// Lowercases and drops the URI scheme and a leading `www.`, so
/// `http://www.googleapis.com/auth/drive` and `googleapis.com/auth/drive`
/// compare equal.
pub fn normalize_scope(scope: &str) -> String {
    let lowered = scope.trim().to_ascii_lowercase();
    let rest = lowered
        .strip_prefix("https://")
        .or_else(|| lowered.strip_prefix("http://"))
        .unwrap_or(&lowered);
    rest.strip_prefix("www.").unwrap_or(rest).to_string()
}

/// First catalog rule matching the scope, with the tier it belongs to.
/// High is checked before Medium.
pub fn matching_rule(scope: &str) -> Option<(RiskLevel, &'static ScopeRule)> {
    let lowered = normalize_scope(scope);
    if lowered.is_empty() {
        return None;
    }
    if let Some(r) = HIGH_RISK_SCOPES.iter().find(|r| r.pattern.matches(&lowered)) {
        return Some((RiskLevel::High, r));
    }
    MEDIUM_RISK_SCOPES
        .iter()
        .find(|r| r.pattern.matches(&lowered))
        .map(|r| (RiskLevel::Medium, r))
}

pub fn classify_scope(scope: &str) -> RiskLevel {
    matching_rule(scope).map_or(RiskLevel::Low, |(level, _)| level)
}

/// Per-row entry point used to color-code individual scopes.
pub fn evaluate_single_scope_risk(scope: &str) -> RiskLevel {
    classify_scope(scope)
}

/// Short label for a scope: the catalog description when one matches,
/// otherwise the last path segment of the scope URI.
pub fn describe_scope(scope: &str) -> String {
    match matching_rule(scope) {
        Some((_, r)) => r.description.to_string(),
        None => short_scope_name(scope).to_string(),
    }
}

pub fn short_scope_name(scope: &str) -> &str {
    let trimmed = scope.trim().trim_end_matches('/');
    match trimmed.rsplit_once('/') {
        Some((_, tail)) if !tail.is_empty() => tail,
        _ => trimmed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const G: &str = "https://www.googleapis.com/auth/";

    #[test]
    fn gmail_is_high() {
        assert_eq!(classify_scope("https://www.googleapis.com/auth/gmail"), RiskLevel::High);
        assert_eq!(classify_scope(&format!("{G}gmail.readonly")), RiskLevel::High);
        assert_eq!(classify_scope("https://mail.google.com/"), RiskLevel::High);
    }

    #[test]
    fn calendar_readonly_is_medium() {
        assert_eq!(
            classify_scope("https://www.googleapis.com/auth/calendar.readonly"),
            RiskLevel::Medium
        );
    }

    #[test]
    fn identity_scopes_are_low() {
        for scope in ["openid", "email", "profile", "offline_access", "User.Read"] {
            assert_eq!(classify_scope(scope), RiskLevel::Low, "{scope}");
        }
        assert_eq!(classify_scope(&format!("{G}userinfo.email")), RiskLevel::Low);
    }

    #[test]
    fn empty_scope_is_low() {
        assert_eq!(classify_scope(""), RiskLevel::Low);
        assert_eq!(classify_scope("   "), RiskLevel::Low);
    }

    #[test]
    fn high_wins_over_overlapping_medium() {
        // full drive matches the Drive rules in both catalogs
        assert_eq!(classify_scope(&format!("{G}drive")), RiskLevel::High);
        assert_eq!(classify_scope(&format!("{G}drive.readonly")), RiskLevel::High);
        assert_eq!(classify_scope(&format!("{G}drive.file")), RiskLevel::Medium);
    }

    #[test]
    fn directory_write_is_high_and_readonly_is_medium() {
        assert_eq!(classify_scope(&format!("{G}admin.directory.user")), RiskLevel::High);
        assert_eq!(
            classify_scope(&format!("{G}admin.directory.user.readonly")),
            RiskLevel::Medium
        );
        assert_eq!(
            classify_scope(&format!("{G}admin.directory.user.security")),
            RiskLevel::High
        );
    }

    #[test]
    fn directory_admin_writes_are_high() {
        for name in ["orgunit", "user.alias", "customer", "userschema", "resource.calendar", "group.member"] {
            let scope = format!("{G}admin.directory.{name}");
            assert_eq!(classify_scope(&scope), RiskLevel::High, "{scope}");
            assert_ne!(describe_scope(&scope), "Read-only directory access", "{scope}");

            let readonly = format!("{scope}.readonly");
            assert_eq!(classify_scope(&readonly), RiskLevel::Medium, "{readonly}");
            assert_eq!(describe_scope(&readonly), "Read-only directory access");
        }
        assert_eq!(describe_scope(&format!("{G}admin.directory.orgunit")), "Org unit administration");
    }

    #[test]
    fn scheme_and_host_prefix_do_not_matter() {
        for scope in [
            "www.googleapis.com/auth/drive",
            "http://www.googleapis.com/auth/drive",
            "https://googleapis.com/auth/drive",
            "googleapis.com/auth/drive",
        ] {
            assert_eq!(classify_scope(scope), RiskLevel::High, "{scope}");
        }
        assert_eq!(classify_scope("http://www.googleapis.com/auth/drive.file"), RiskLevel::Medium);
        assert_eq!(normalize_scope(" HTTP://WWW.googleapis.com/auth/Drive "), "googleapis.com/auth/drive");
        assert_eq!(normalize_scope("Mail.Read"), "mail.read");
    }

    #[test]
    fn matching_ignores_case() {
        assert_eq!(classify_scope("HTTPS://WWW.GOOGLEAPIS.COM/AUTH/GMAIL.SEND"), RiskLevel::High);
        assert_eq!(classify_scope("mail.readwrite"), RiskLevel::High);
    }

    #[test]
    fn graph_permissions_match_by_name() {
        assert_eq!(classify_scope("Mail.Read"), RiskLevel::High);
        assert_eq!(classify_scope("https://graph.microsoft.com/Mail.Read"), RiskLevel::High);
        assert_eq!(classify_scope("Mail.ReadBasic"), RiskLevel::Medium);
        assert_eq!(classify_scope("Files.ReadWrite.All"), RiskLevel::High);
        assert_eq!(classify_scope("Files.ReadWrite"), RiskLevel::Medium);
        assert_eq!(classify_scope("Calendars.Read"), RiskLevel::Medium);
        // suffix alone is not a permission boundary
        assert_eq!(classify_scope("xmail.read"), RiskLevel::Low);
    }

    #[test]
    fn describe_uses_catalog_or_tail() {
        assert_eq!(describe_scope(&format!("{G}gmail.send")), "Gmail access");
        assert_eq!(describe_scope(&format!("{G}userinfo.profile")), "userinfo.profile");
        assert_eq!(describe_scope("openid"), "openid");
        assert_eq!(short_scope_name("https://mail.google.com/"), "mail.google.com");
    }

    proptest! {
        #[test]
        fn single_scope_entry_point_agrees(scope in ".*") {
            prop_assert_eq!(evaluate_single_scope_risk(&scope), classify_scope(&scope));
        }

        #[test]
        fn catalog_scopes_agree(idx in 0usize..64, suffix in "[a-z.]{0,12}") {
            let scope = format!("{G}{}{}", ["gmail", "drive", "calendar", "contacts"][idx % 4], suffix);
            prop_assert_eq!(evaluate_single_scope_risk(&scope), classify_scope(&scope));
        }
    }
}
