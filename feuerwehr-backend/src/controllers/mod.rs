pub mod backup;
pub mod health;

use actix_web::{web, HttpRequest, HttpResponse};

use crate::models::Session;
use crate::AppState;

/// Cookie carrying the API token for browser clients.
pub const ACCESS_TOKEN_COOKIE: &str = "app-access-token";
/// Browser session cookie of the admin frontend.
pub const SESSION_COOKIE: &str = "sessionid";

/// Token from `Authorization: Bearer|Token <t>`, falling back to the access token cookie.
fn request_token(req: &HttpRequest) -> Option<String> {
    let header = req
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| {
            s.strip_prefix("Bearer ")
                .or_else(|| s.strip_prefix("Token "))
                .map(|t| t.trim().to_string())
        })
        .filter(|t| !t.is_empty());

    header.or_else(|| {
        req.cookie(ACCESS_TOKEN_COOKIE)
            .map(|c| c.value().to_string())
            .filter(|t| !t.is_empty())
    })
}

/// Shared session validation for controller handlers.
pub fn validate_session(
    state: &web::Data<AppState>,
    req: &HttpRequest,
) -> Result<Session, HttpResponse> {
    let token = match request_token(req) {
        Some(t) => t,
        None => {
            return Err(HttpResponse::Unauthorized().json(serde_json::json!({
                "error": "No authorization token provided"
            })));
        }
    };

    match state.db.validate_session(&token) {
        Ok(Some(session)) => {
            log::debug!(
                "[Auth] {} authenticated (session created {}, expires {:?})",
                session.username,
                session.created_at,
                session.expires_at
            );
            Ok(session)
        }
        Ok(None) => Err(HttpResponse::Unauthorized().json(serde_json::json!({
            "error": "Invalid or expired session"
        }))),
        Err(e) => {
            log::error!("Session validation error: {}", e);
            Err(HttpResponse::InternalServerError().json(serde_json::json!({
                "error": "Internal server error"
            })))
        }
    }
}

/// Valid session of an admin.
pub fn require_admin(
    state: &web::Data<AppState>,
    req: &HttpRequest,
) -> Result<Session, HttpResponse> {
    let session = validate_session(state, req)?;
    if session.is_admin() {
        Ok(session)
    } else {
        log::warn!("[Auth] {} is not an admin, refusing {}", session.username, req.path());
        Err(HttpResponse::Forbidden().json(serde_json::json!({
            "error": "You do not have permission to perform this action"
        })))
    }
}
