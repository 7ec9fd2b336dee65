//! Admin endpoints for listing, creating, restoring, downloading and deleting backups.

use actix_files::NamedFile;
use actix_web::cookie::Cookie;
use actix_web::http::header::{ContentDisposition, ContentType, DispositionParam, DispositionType};
use actix_web::{web, HttpRequest, HttpResponse, Responder};
use serde::Deserialize;

use super::{require_admin, ACCESS_TOKEN_COOKIE, SESSION_COOKIE};
use crate::backup::BackupError;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct BackupRequest {
    #[serde(default)]
    pub backup: String,
}

impl BackupRequest {
    fn name(&self) -> Result<&str, BackupError> {
        if self.backup.is_empty() {
            Err(BackupError::validation("No backup was given."))
        } else {
            Ok(&self.backup)
        }
    }
}

pub fn config_routes(cfg: &mut web::ServiceConfig, api_prefix: &str) {
    cfg.service(
        web::scope(api_prefix)
            .service(
                web::resource("/backup/")
                    .route(web::get().to(list_backups))
                    .route(web::post().to(create_backup)),
            )
            .service(web::resource("/backup/restore/").route(web::post().to(restore_backup)))
            .service(web::resource("/backup/file/").route(web::post().to(download_backup)))
            .service(web::resource("/backup/delete/").route(web::post().to(delete_backup))),
    );
}

/// Validation problems are the only errors answered with a 4xx.
fn error_response(err: BackupError) -> HttpResponse {
    if err.is_validation() {
        HttpResponse::BadRequest().json(serde_json::json!({ "error": err.to_string() }))
    } else {
        log::error!("[Backup] Request failed: {}", err);
        HttpResponse::Ok().json(serde_json::json!({ "msg": err.to_string() }))
    }
}

fn removal_cookie(name: &'static str) -> Cookie<'static> {
    let mut cookie = Cookie::named(name);
    cookie.set_path("/");
    cookie.make_removal();
    cookie
}

async fn list_backups(state: web::Data<AppState>, req: HttpRequest) -> impl Responder {
    if let Err(resp) = require_admin(&state, &req) {
        return resp;
    }

    HttpResponse::Ok().json(serde_json::json!({
        "backups": state.backups.list_or_empty()
    }))
}

async fn create_backup(state: web::Data<AppState>, req: HttpRequest) -> impl Responder {
    let session = match require_admin(&state, &req) {
        Ok(s) => s,
        Err(resp) => return resp,
    };
    log::info!("[Backup] Backup requested by {}", session.username);

    let outcome = state.backups.create_backup().await;
    HttpResponse::Ok().json(serde_json::json!({
        "msg": outcome.msg,
        "backups": outcome.backups
    }))
}

async fn restore_backup(
    state: web::Data<AppState>,
    req: HttpRequest,
    body: web::Json<BackupRequest>,
) -> impl Responder {
    let session = match require_admin(&state, &req) {
        Ok(s) => s,
        Err(resp) => return resp,
    };

    let name = match body.name() {
        Ok(n) => n,
        Err(e) => return error_response(e),
    };
    log::info!("[Restore] Restore of {} requested by {}", name, session.username);

    match state.backups.restore(name).await {
        Ok(outcome) => {
            if !outcome.succeeded() {
                log::warn!("[Restore] {} failed: {}", name, outcome.msg);
            }
            HttpResponse::Ok()
                // user and session rows may have changed underneath the caller
                .cookie(removal_cookie(SESSION_COOKIE))
                .cookie(removal_cookie(ACCESS_TOKEN_COOKIE))
                .json(serde_json::json!({ "msg": outcome.msg }))
        }
        Err(e) => error_response(e),
    }
}

async fn download_backup(
    state: web::Data<AppState>,
    req: HttpRequest,
    body: web::Json<BackupRequest>,
) -> impl Responder {
    if let Err(resp) = require_admin(&state, &req) {
        return resp;
    }

    let path = match body.name().and_then(|n| state.backups.archive_path(n)) {
        Ok(p) => p,
        Err(e) => return error_response(e),
    };

    let file = match NamedFile::open_async(&path).await {
        Ok(f) => f,
        Err(e) => return error_response(e.into()),
    };

    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    file.set_content_type(ContentType::octet_stream().0)
        .set_content_disposition(ContentDisposition {
            disposition: DispositionType::Attachment,
            parameters: vec![DispositionParam::Filename(filename)],
        })
        .into_response(&req)
}

async fn delete_backup(
    state: web::Data<AppState>,
    req: HttpRequest,
    body: web::Json<BackupRequest>,
) -> impl Responder {
    if let Err(resp) = require_admin(&state, &req) {
        return resp;
    }

    let result = match body.name() {
        Ok(name) => state.backups.delete(name).await,
        Err(e) => Err(e),
    };

    match result {
        Ok(result) => HttpResponse::Ok().json(serde_json::json!({
            "msg": result.msg,
            "backups": result.backups
        })),
        Err(e) => error_response(e),
    }
}
