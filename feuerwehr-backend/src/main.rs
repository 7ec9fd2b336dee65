use actix_cors::Cors;
use actix_web::{middleware::Logger, web, App, HttpServer};
use dotenv::dotenv;
use std::sync::Arc;

mod backup;
mod config;
mod controllers;
mod db;
mod models;
mod process;

use backup::BackupService;
use config::Config;
use db::{Database, DbResult};
use models::ADMIN_ROLE;
use process::TokioCommandRunner;

pub struct AppState {
    pub db: Arc<Database>,
    pub config: Config,
    pub backups: Arc<BackupService>,
}

/// Make sure some admin can log in. `ADMIN_TOKEN` wins; otherwise a token is
/// generated once when no admin session exists. Returns a newly generated token.
fn bootstrap_admin(db: &Database, config: &Config) -> DbResult<Option<String>> {
    if let Some(token) = &config.admin_token {
        db.ensure_session(token, &config.admin_username, &[ADMIN_ROLE], None)?;
        log::info!("[Auth] Admin session for {} taken from ADMIN_TOKEN", config.admin_username);
        return Ok(None);
    }

    if db.has_role_session(ADMIN_ROLE)? {
        return Ok(None);
    }

    let session = db.create_session(&config.admin_username, &[ADMIN_ROLE], None)?;
    Ok(Some(session.token))
}

/// Hand a generated admin token to the operator once, outside the log stream.
fn announce_generated_token(
    out: &mut impl std::io::Write,
    username: &str,
    token: &str,
) -> std::io::Result<()> {
    writeln!(out, "Generated admin token for {}: {}", username, token)?;
    writeln!(out, "Set ADMIN_TOKEN to keep a fixed token across restarts.")?;
    out.flush()
}

fn startup_error<E: std::fmt::Display>(what: &str, e: E) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::Other, format!("{}: {}", what, e))
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv().ok();
    env_logger::init();

    let config = Config::from_env();
    let port = config.port;
    let bind_address = config.bind_address.clone();

    config.backup.ensure_dirs()?;

    log::info!("Initializing database at {}", config.auth_database_url);
    let db = Database::new(&config.auth_database_url)
        .map_err(|e| startup_error("Failed to initialize database", e))?;

    match db.delete_expired_sessions() {
        Ok(0) => {}
        Ok(n) => log::info!("[Auth] Removed {} expired sessions", n),
        Err(e) => log::warn!("[Auth] Failed to purge expired sessions: {}", e),
    }
    if let Some(token) = bootstrap_admin(&db, &config)
        .map_err(|e| startup_error("Failed to bootstrap admin session", e))?
    {
        log::warn!(
            "[Auth] No admin session found, generated a token for {} (printed to stderr)",
            config.admin_username
        );
        announce_generated_token(&mut std::io::stderr(), &config.admin_username, &token)?;
    }
    let db = Arc::new(db);

    let runner = Arc::new(TokioCommandRunner::new(config.backup.command_timeout));
    let backups = Arc::new(BackupService::new(config.backup.clone(), runner));
    log::info!(
        "Backups in {:?}, media in {:?}, version {}",
        backups.config().backup_dir,
        backups.config().media_root,
        backups.config().app_version
    );

    log::info!("Starting feuerwehr backend on {}:{}", bind_address, port);
    log::info!("Backup API mounted under {}", config.api_prefix);

    HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        let api_prefix = config.api_prefix.clone();

        App::new()
            .app_data(web::Data::new(AppState {
                db: Arc::clone(&db),
                config: config.clone(),
                backups: Arc::clone(&backups),
            }))
            .wrap(Logger::default())
            .wrap(cors)
            .configure(controllers::health::config_routes)
            .configure(move |cfg| controllers::backup::config_routes(cfg, &api_prefix))
    })
    .bind((bind_address.as_str(), port))?
    .run()
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BackupConfig;
    use std::path::Path;

    fn config(admin_token: Option<&str>) -> Config {
        Config {
            port: 0,
            bind_address: "127.0.0.1".to_string(),
            api_prefix: "/api/v1".to_string(),
            auth_database_url: ":memory:".to_string(),
            admin_token: admin_token.map(str::to_string),
            admin_username: "admin".to_string(),
            backup: BackupConfig::with_dirs(Path::new("/tmp/b"), Path::new("/tmp/m"), "test"),
        }
    }

    #[test]
    fn test_bootstrap_uses_configured_token() {
        let db = Database::new(":memory:").unwrap();
        assert!(bootstrap_admin(&db, &config(Some("secret"))).unwrap().is_none());
        assert!(db.validate_session("secret").unwrap().unwrap().is_admin());
    }

    #[test]
    fn test_bootstrap_generates_token_once() {
        let db = Database::new(":memory:").unwrap();
        let token = bootstrap_admin(&db, &config(None)).unwrap().unwrap();
        assert!(db.validate_session(&token).unwrap().unwrap().is_admin());
        assert!(bootstrap_admin(&db, &config(None)).unwrap().is_none());
    }

    #[test]
    fn test_generated_token_is_written_to_the_given_stream() {
        let mut out = Vec::new();
        announce_generated_token(&mut out, "admin", "abc123").unwrap();

        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("Generated admin token for admin: abc123\n"));
        assert!(text.contains("ADMIN_TOKEN"));
    }

    #[actix_web::test]
    async fn test_health_and_version() {
        use actix_web::test;

        let cfg = config(None);
        let backups = Arc::new(BackupService::new(
            cfg.backup.clone(),
            Arc::new(process::mock::MockCommandRunner::succeeding(&[])),
        ));
        let state = web::Data::new(AppState {
            db: Arc::new(Database::new(":memory:").unwrap()),
            config: cfg,
            backups,
        });
        let app = test::init_service(
            App::new()
                .app_data(state)
                .configure(controllers::health::config_routes),
        )
        .await;

        let req = test::TestRequest::get().uri("/api/health").to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["status"], "ok");

        let req = test::TestRequest::get().uri("/api/version").to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["version"], "test");
    }
}
