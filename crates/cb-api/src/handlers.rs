//! # cb-api Handlers
//!
//! Public pages and the main-page schedule. Each handler parses the request,
//! calls into `MainPageManager` and maps the outcome to a response.

use actix_multipart::Multipart;
use actix_web::{web, HttpResponse};
use askama::Template;
use cb_core::main_page::{ConfigEdit, ScheduleRequest};
use cb_ui::{help, AdminMainPageTemplate, ConfigRow, HelpTemplate, MainPageTemplate};

use crate::auth::Session;
use crate::error::{not_found, ApiError};
use crate::form::FormData;
use crate::AppState;

fn html(body: String) -> HttpResponse {
    HttpResponse::Ok().content_type("text/html; charset=utf-8").body(body)
}

/// The public landing page, showing whichever configuration is displayed now.
pub async fn index(data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let config = data.main_page.displayed();
    let body = MainPageTemplate::for_config(&config).render()?;
    Ok(html(body))
}

pub async fn help_article(path: web::Path<String>) -> Result<HttpResponse, ApiError> {
    let slug = path.into_inner();
    let article = help::find_article(&slug).ok_or_else(|| not_found("help article", &slug))?;

    let body_html = help::render_markdown(article.source);
    let body = HelpTemplate {
        title: article.title,
        heading: article.title,
        links: help::links(),
        body_html: &body_html,
    }
    .render()?;
    Ok(html(body))
}

/// The displayed configuration as JSON, for clients rendering their own page.
pub async fn active_config(data: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(data.main_page.displayed())
}

/// Staff overview of every configuration and its window state.
pub async fn admin_main_page(data: web::Data<AppState>, _session: Session) -> Result<HttpResponse, ApiError> {
    let overview = data.main_page.overview().await;

    let mut rows = Vec::with_capacity(overview.entries.len());
    for entry in &overview.entries {
        let thumbnail = match entry.config.background_image_url.as_str() {
            "" => None,
            url => data.blobs.thumbnail_url(url).await,
        };
        let is_active = entry.config.id == overview.active_id;
        rows.push(ConfigRow::new(&entry.config, entry.state, is_active, thumbnail));
    }

    let body = AdminMainPageTemplate::new(&overview, data.settings.refresh_secs, &rows).render()?;
    Ok(html(body))
}

pub async fn list_configs(data: web::Data<AppState>, _session: Session) -> HttpResponse {
    HttpResponse::Ok().json(data.main_page.overview().await)
}

/// Schedules a configuration from a multipart form:
/// `subtitle`, `starts_at`, `ends_at` and an optional `image` file.
pub async fn create_config(
    data: web::Data<AppState>,
    session: Session,
    payload: Multipart,
) -> Result<HttpResponse, ApiError> {
    let mut form = FormData::read(payload, data.settings.max_upload_bytes).await?;

    let request = ScheduleRequest {
        subtitle: form.take_text("subtitle").unwrap_or_default(),
        starts_at: form.datetime("starts_at")?,
        ends_at: form.datetime("ends_at")?,
    };
    let saved = data.main_page.create(request, form.image.take()).await?;

    log::info!("{} scheduled main page config {}", session.user.email, saved.config.id);
    Ok(HttpResponse::Created().json(saved))
}

/// Edits a configuration; omitted fields are left as they are.
pub async fn update_config(
    data: web::Data<AppState>,
    session: Session,
    path: web::Path<String>,
    payload: Multipart,
) -> Result<HttpResponse, ApiError> {
    let id = path.into_inner();
    let mut form = FormData::read(payload, data.settings.max_upload_bytes).await?;

    let edit = ConfigEdit {
        subtitle: form.take_text("subtitle"),
        starts_at: form.datetime("starts_at")?,
        ends_at: form.datetime("ends_at")?,
    };
    let saved = data.main_page.update(&id, edit, form.image.take()).await?;

    log::info!("{} updated main page config {id}", session.user.email);
    Ok(HttpResponse::Ok().json(saved))
}

pub async fn delete_config(
    data: web::Data<AppState>,
    session: Session,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let id = path.into_inner();
    let report = data.main_page.delete(&id).await?;

    log::info!("{} deleted main page config {id}", session.user.email);
    Ok(HttpResponse::Ok().json(report))
}

/// Forces a reload instead of waiting for the next refresh tick.
pub async fn reload_configs(data: web::Data<AppState>, _session: Session) -> HttpResponse {
    data.main_page.load().await;
    HttpResponse::Ok().json(data.main_page.overview().await)
}
