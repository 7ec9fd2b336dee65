//! Tables that never leave or re-enter the database through a backup.
//!
//! The same list drives the `--exclude-table` flags of the dump and the truncation
//! set of a restore. Login, token and session state therefore survives a restore.

/// Authentication, session, social login and admin-log internals.
pub const EXCLUDED_TABLES: &[&str] = &[
    "account_emailaddress",
    "account_emailconfirmation",
    "auth_group",
    "auth_group_permissions",
    "auth_permission",
    "authtoken_token",
    "django_admin_log",
    "django_content_type",
    "django_migrations",
    "django_session",
    "socialaccount_socialaccount",
    "socialaccount_socialapp",
    "socialaccount_socialtoken",
];

pub fn is_excluded(table: &str) -> bool {
    EXCLUDED_TABLES.contains(&table)
}

/// Live tables minus the excluded set, in the order the database listed them.
pub fn truncation_set<S: AsRef<str>>(live_tables: &[S]) -> Vec<String> {
    live_tables
        .iter()
        .map(|t| t.as_ref().trim())
        .filter(|t| !t.is_empty() && !is_excluded(t))
        .map(str::to_string)
        .collect()
}

/// Double-quoted SQL identifier.
pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// One statement emptying every given table in the public schema.
///
/// Returns `None` for an empty set; `TRUNCATE TABLE` without targets is a syntax error.
pub fn truncate_statement(tables: &[String]) -> Option<String> {
    if tables.is_empty() {
        return None;
    }
    let targets: Vec<String> = tables
        .iter()
        .map(|t| format!("{}.{}", quote_ident("public"), quote_ident(t)))
        .collect();
    Some(format!(
        "TRUNCATE TABLE {} RESTART IDENTITY CASCADE;",
        targets.join(", ")
    ))
}
