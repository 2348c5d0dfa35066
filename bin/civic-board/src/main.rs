//! # civic-board Binary
//!
//! The entry point that assembles the application based on compile-time features.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use actix_files::Files;
use actix_web::{web, App, HttpServer};
use anyhow::Context;
use cb_api::users::{register, NewUser};
use cb_api::{configure_routes, middleware, ApiSettings, AppState};
use cb_config::{AuthSettings, Settings};
use cb_core::main_page::MainPageManager;
use cb_core::models::Role;
use cb_core::traits::{AuthProvider, Clock, SystemClock, UserRepo};
use secrecy::ExposeSecret;

// Feature-gated imports
#[cfg(feature = "db-sqlite")]
use cb_db_sqlite::SqliteStore;

#[cfg(feature = "storage-local")]
use cb_storage_local::LocalBlobStore;

#[cfg(feature = "auth-simple")]
use cb_auth_simple::SimpleAuthProvider;

#[cfg(not(all(feature = "db-sqlite", feature = "storage-local", feature = "auth-simple")))]
compile_error!("civic-board needs a database, a storage and an auth plugin enabled");

/// Static assets shipped with the application, such as the fallback background.
const ASSETS_DIR: &str = "./static";

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));
    let settings = Settings::load()?;

    // 1. Initialize Database Implementation
    let db = Arc::new(
        SqliteStore::new(&settings.database.url)
            .await
            .with_context(|| format!("opening {}", settings.database.url))?,
    );

    // 2. Initialize Storage Implementation
    let upload_root = PathBuf::from(&settings.storage.root);
    tokio::fs::create_dir_all(&upload_root)
        .await
        .with_context(|| format!("creating {}", upload_root.display()))?;
    let blobs = Arc::new(LocalBlobStore::new(upload_root.clone(), settings.storage.url_prefix.clone()));

    // 3. Initialize Auth Implementation
    let auth: Arc<dyn AuthProvider> = Arc::new(SimpleAuthProvider::new());
    bootstrap_admin(&settings.auth, db.as_ref(), auth.clone()).await?;

    // 4. Main page: first load, then periodic re-evaluation
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let main_page = Arc::new(MainPageManager::new(db.clone(), blobs.clone(), clock.clone()));
    let initial = main_page.load().await;
    log::info!(
        "Main page has {} scheduled configuration(s); showing {}",
        initial.scheduled.len(),
        main_page.displayed().id
    );
    let refresh = main_page.spawn_refresh(Duration::from_secs(settings.main_page.refresh_interval_secs));

    // 5. Wrap in AppState
    let state = web::Data::new(AppState {
        main_page,
        content: db.clone(),
        inquiries: db.clone(),
        users: db,
        blobs: blobs.clone(),
        auth,
        clock,
        settings: ApiSettings {
            session_ttl: chrono::Duration::hours(settings.auth.session_ttl_hours),
            max_upload_bytes: settings.storage.max_upload_bytes,
            refresh_secs: settings.main_page.refresh_interval_secs,
            secure_cookies: settings.server.secure_cookies,
        },
    });

    let origins = settings.server.allowed_origins.clone();
    let url_prefix = blobs.url_prefix().to_string();
    let (host, port) = settings.bind_address();
    log::info!("civic-board starting on http://{host}:{port}");

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .wrap(middleware::security_headers())
            .wrap(middleware::cors_policy(&origins))
            .wrap(middleware::standard_middleware())
            .service(Files::new(&url_prefix, upload_root.clone()))
            .service(Files::new("/static", ASSETS_DIR))
            .configure(configure_routes)
    })
    .bind((host, port))?
    .run()
    .await?;

    refresh.cancel().await;
    log::info!("civic-board stopped");
    Ok(())
}

/// Creates the configured admin when no accounts exist yet.
async fn bootstrap_admin(settings: &AuthSettings, users: &dyn UserRepo, auth: Arc<dyn AuthProvider>) -> anyhow::Result<()> {
    let (Some(email), Some(password)) = (&settings.bootstrap_admin_email, &settings.bootstrap_admin_password) else {
        return Ok(());
    };
    if users.count_users().await? > 0 {
        log::debug!("Accounts exist; skipping bootstrap admin");
        return Ok(());
    }

    let new_user = NewUser {
        email: email.clone(),
        display_name: "Administrator".into(),
        role: Role::Admin,
        password: password.expose_secret().to_string(),
    };
    let admin = register(users, auth, new_user)
        .await
        .map_err(|err| anyhow::anyhow!("bootstrap admin rejected: {err}"))?;
    log::info!("Created bootstrap admin {}", admin.email);
    Ok(())
}
