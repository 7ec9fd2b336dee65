use chrono::{DateTime, Utc};

/// Role that may use the backup endpoints.
pub const ADMIN_ROLE: &str = "ADMIN";

/// An authenticated API session.
#[derive(Debug, Clone)]
pub struct Session {
    pub token: String,
    pub username: String,
    pub roles: Vec<String>,
    pub created_at: DateTime<Utc>,
    /// `None` for sessions that never expire (bootstrap admin token)
    pub expires_at: Option<DateTime<Utc>>,
}

impl Session {
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r.eq_ignore_ascii_case(role))
    }

    pub fn is_admin(&self) -> bool {
        self.has_role(ADMIN_ROLE)
    }
}

/// Roles are stored as a comma separated column.
pub fn join_roles(roles: &[&str]) -> String {
    roles
        .iter()
        .map(|r| r.trim())
        .filter(|r| !r.is_empty())
        .collect::<Vec<_>>()
        .join(",")
}

pub fn split_roles(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .map(str::to_string)
        .collect()
}
