//! Database methods for the sessions table

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};
use uuid::Uuid;

use crate::db::{Database, DbResult};
use crate::models::session::{join_roles, split_roles};
use crate::models::Session;

fn parse_ts(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn session_from_row(row: &Row<'_>) -> rusqlite::Result<Session> {
    let created_at: String = row.get(3)?;
    let expires_at: Option<String> = row.get(4)?;
    let roles: String = row.get(2)?;

    Ok(Session {
        token: row.get(0)?,
        username: row.get(1)?,
        roles: split_roles(&roles),
        created_at: parse_ts(&created_at).unwrap_or_else(Utc::now),
        expires_at: expires_at.as_deref().and_then(parse_ts),
    })
}

impl Database {
    /// Insert or replace a session with a caller-chosen token.
    pub fn ensure_session(
        &self,
        token: &str,
        username: &str,
        roles: &[&str],
        expires_at: Option<DateTime<Utc>>,
    ) -> DbResult<Session> {
        let conn = self.conn()?;
        let created_at = Utc::now();

        conn.execute(
            "INSERT INTO sessions (token, username, roles, created_at, expires_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(token) DO UPDATE SET
                username = excluded.username,
                roles = excluded.roles,
                expires_at = excluded.expires_at",
            params![
                token,
                username,
                join_roles(roles),
                created_at.to_rfc3339(),
                expires_at.map(|e| e.to_rfc3339()),
            ],
        )?;

        Ok(Session {
            token: token.to_string(),
            username: username.to_string(),
            roles: split_roles(&join_roles(roles)),
            created_at,
            expires_at,
        })
    }

    /// Create a session with a fresh random token.
    pub fn create_session(
        &self,
        username: &str,
        roles: &[&str],
        expires_at: Option<DateTime<Utc>>,
    ) -> DbResult<Session> {
        let token = Uuid::new_v4().simple().to_string();
        self.ensure_session(&token, username, roles, expires_at)
    }

    /// Look up a session that has not expired yet.
    pub fn validate_session(&self, token: &str) -> DbResult<Option<Session>> {
        let conn = self.conn()?;
        let now = Utc::now().to_rfc3339();

        let session = conn
            .query_row(
                "SELECT token, username, roles, created_at, expires_at FROM sessions
                 WHERE token = ?1 AND (expires_at IS NULL OR expires_at > ?2)",
                params![token, now],
                session_from_row,
            )
            .optional()?;

        Ok(session)
    }

    /// Whether any live session carries `role`.
    pub fn has_role_session(&self, role: &str) -> DbResult<bool> {
        let conn = self.conn()?;
        let now = Utc::now().to_rfc3339();

        let mut stmt = conn.prepare(
            "SELECT token, username, roles, created_at, expires_at FROM sessions
             WHERE expires_at IS NULL OR expires_at > ?1",
        )?;
        let sessions = stmt
            .query_map([now], session_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(sessions.iter().any(|s| s.has_role(role)))
    }

    /// Remove expired sessions, returning how many were dropped.
    pub fn delete_expired_sessions(&self) -> DbResult<usize> {
        let conn = self.conn()?;
        let now = Utc::now().to_rfc3339();
        let rows = conn.execute(
            "DELETE FROM sessions WHERE expires_at IS NOT NULL AND expires_at <= ?1",
            [now],
        )?;
        Ok(rows)
    }
}
