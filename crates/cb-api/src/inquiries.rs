//! Public contact form submissions and their staff-side triage.

use actix_web::{web, HttpResponse};
use cb_core::models::{InquiryDraft, InquiryStatus};
use serde::Deserialize;

use crate::auth::Session;
use crate::error::{not_found, ApiError};
use crate::AppState;

/// Anyone may submit; the inquiry starts out `open`.
pub async fn submit(data: web::Data<AppState>, body: web::Json<InquiryDraft>) -> Result<HttpResponse, ApiError> {
    let mut draft = body.into_inner();
    draft.name = draft.name.trim().to_string();
    draft.email = draft.email.trim().to_string();
    draft.validate()?;

    let inquiry = data.inquiries.create_inquiry(draft).await?;
    log::info!("New inquiry {} from {}", inquiry.id, inquiry.email);
    Ok(HttpResponse::Created().json(inquiry))
}

pub async fn list(data: web::Data<AppState>, _session: Session) -> Result<HttpResponse, ApiError> {
    Ok(HttpResponse::Ok().json(data.inquiries.list_inquiries().await?))
}

#[derive(Debug, Deserialize)]
pub struct StatusChange {
    pub status: InquiryStatus,
}

pub async fn set_status(
    data: web::Data<AppState>,
    _session: Session,
    path: web::Path<String>,
    body: web::Json<StatusChange>,
) -> Result<HttpResponse, ApiError> {
    let id = path.into_inner();
    let inquiry = data
        .inquiries
        .set_inquiry_status(&id, body.status)
        .await?
        .ok_or_else(|| not_found("inquiry", &id))?;
    Ok(HttpResponse::Ok().json(inquiry))
}

pub async fn delete(data: web::Data<AppState>, session: Session, path: web::Path<String>) -> Result<HttpResponse, ApiError> {
    let id = path.into_inner();
    if !data.inquiries.delete_inquiry(&id).await? {
        return Err(not_found("inquiry", &id));
    }
    log::info!("{} deleted inquiry {id}", session.user.email);
    Ok(HttpResponse::NoContent().finish())
}
