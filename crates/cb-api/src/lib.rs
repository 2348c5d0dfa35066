//! # cb-api
//!
//! The web routing and orchestration layer for civic-board.
//! Handlers only see the core traits; the binary decides which plugins fill them.

pub mod auth;
pub mod content;
pub mod error;
pub mod form;
pub mod handlers;
pub mod inquiries;
pub mod middleware;
pub mod users;

use std::sync::Arc;

use actix_web::web;
use cb_core::error::AppError;
use cb_core::main_page::MainPageManager;
use cb_core::traits::{AuthProvider, BlobStore, Clock, ContentRepo, InquiryRepo, UserRepo};

pub use error::ApiError;

/// Request-independent knobs the handlers need.
#[derive(Debug, Clone)]
pub struct ApiSettings {
    pub session_ttl: chrono::Duration,
    /// Upper bound for a single multipart field
    pub max_upload_bytes: usize,
    /// Shown on the admin overview
    pub refresh_secs: u64,
    pub secure_cookies: bool,
}

/// State shared across all Actix-web workers.
pub struct AppState {
    pub main_page: Arc<MainPageManager>,
    pub content: Arc<dyn ContentRepo>,
    pub inquiries: Arc<dyn InquiryRepo>,
    pub users: Arc<dyn UserRepo>,
    pub blobs: Arc<dyn BlobStore>,
    pub auth: Arc<dyn AuthProvider>,
    pub clock: Arc<dyn Clock>,
    pub settings: ApiSettings,
}

/// Mounts every page and API route.
///
/// Paths sharing a resource are registered once with one route per method,
/// so a wrong method answers 405 instead of falling through to 404.
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    // Malformed JSON bodies get the same error shape as everything else.
    cfg.app_data(web::JsonConfig::default().error_handler(|err, _req| {
        ApiError(AppError::ValidationError(err.to_string())).into()
    }));

    cfg.route("/", web::get().to(handlers::index))
        .route("/help/{slug}", web::get().to(handlers::help_article))
        .route("/admin/main-page", web::get().to(handlers::admin_main_page))
        .service(
            web::scope("/api")
                // Main page schedule
                .route("/main-page/active", web::get().to(handlers::active_config))
                .service(
                    web::resource("/main-page/configs")
                        .route(web::get().to(handlers::list_configs))
                        .route(web::post().to(handlers::create_config)),
                )
                .service(
                    web::resource("/main-page/configs/{id}")
                        .route(web::patch().to(handlers::update_config))
                        .route(web::delete().to(handlers::delete_config)),
                )
                .route("/main-page/reload", web::post().to(handlers::reload_configs))
                // Sessions
                .route("/auth/sign-in", web::post().to(auth::sign_in))
                .route("/auth/sign-out", web::post().to(auth::sign_out))
                .route("/auth/me", web::get().to(auth::me))
                // Content
                .route("/public/content/{kind}", web::get().to(content::list_published))
                .service(
                    web::resource("/content/{kind}")
                        .route(web::get().to(content::list))
                        .route(web::post().to(content::create)),
                )
                .service(
                    web::resource("/content/{kind}/{id}")
                        .route(web::get().to(content::get))
                        .route(web::patch().to(content::update))
                        .route(web::delete().to(content::delete)),
                )
                // Inquiries
                .service(
                    web::resource("/inquiries")
                        .route(web::get().to(inquiries::list))
                        .route(web::post().to(inquiries::submit)),
                )
                .service(
                    web::resource("/inquiries/{id}")
                        .route(web::patch().to(inquiries::set_status))
                        .route(web::delete().to(inquiries::delete)),
                )
                // Accounts
                .service(
                    web::resource("/users")
                        .route(web::get().to(users::list))
                        .route(web::post().to(users::create)),
                )
                .service(
                    web::resource("/users/{id}")
                        .route(web::patch().to(users::update))
                        .route(web::delete().to(users::delete)),
                ),
        );
}
