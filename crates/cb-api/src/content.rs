//! CRUD for events, activities, advertisements, educational posts and partners.
//!
//! All five kinds share one handler set; the kind comes from the path.
//! Images follow the main-page ordering: document first, then blob, then patch.

use actix_multipart::Multipart;
use actix_web::{web, HttpResponse};
use cb_core::models::{check_content_dates, ContentDraft, ContentItem, ContentKind, ContentPatch, DeleteReport, ImageCleanup};
use cb_core::traits::BlobStore;

use crate::auth::Session;
use crate::error::{invalid, not_found, ApiError};
use crate::form::FormData;
use crate::AppState;

fn image_namespace(kind: ContentKind, id: &str) -> String {
    format!("{kind}/{id}")
}

fn parse_kind(raw: &str) -> Result<ContentKind, ApiError> {
    Ok(raw.parse::<ContentKind>()?)
}

/// Loads an item and checks it belongs to the kind named in the path.
async fn find_item(data: &AppState, kind: ContentKind, id: &str) -> Result<ContentItem, ApiError> {
    match data.content.get_content(id).await? {
        Some(item) if item.kind == kind => Ok(item),
        _ => Err(not_found(kind.as_str(), id)),
    }
}

/// Best-effort removal of an image that is no longer referenced.
async fn discard_image(blobs: &dyn BlobStore, url: &str) -> ImageCleanup {
    match blobs.delete_by_url(url).await {
        Ok(()) => ImageCleanup::Deleted,
        Err(err) => {
            log::warn!("Could not remove image {url}: {err:#}");
            ImageCleanup::Failed(err.to_string())
        }
    }
}

pub async fn list(data: web::Data<AppState>, _session: Session, path: web::Path<String>) -> Result<HttpResponse, ApiError> {
    let kind = parse_kind(&path)?;
    Ok(HttpResponse::Ok().json(data.content.list_content(kind).await?))
}

/// Published items only; no session needed.
pub async fn list_published(data: web::Data<AppState>, path: web::Path<String>) -> Result<HttpResponse, ApiError> {
    let kind = parse_kind(&path)?;
    let items: Vec<ContentItem> = data
        .content
        .list_content(kind)
        .await?
        .into_iter()
        .filter(|item| item.published)
        .collect();
    Ok(HttpResponse::Ok().json(items))
}

pub async fn get(
    data: web::Data<AppState>,
    _session: Session,
    path: web::Path<(String, String)>,
) -> Result<HttpResponse, ApiError> {
    let (kind, id) = path.into_inner();
    let item = find_item(&data, parse_kind(&kind)?, &id).await?;
    Ok(HttpResponse::Ok().json(item))
}

/// Multipart fields: `title`, `body`, `link_url`, `starts_at`, `ends_at`,
/// `published` and an optional `image`.
pub async fn create(
    data: web::Data<AppState>,
    session: Session,
    path: web::Path<String>,
    payload: Multipart,
) -> Result<HttpResponse, ApiError> {
    let kind = parse_kind(&path)?;
    let mut form = FormData::read(payload, data.settings.max_upload_bytes).await?;

    // 1. Validate before anything is written
    let draft = ContentDraft {
        kind,
        title: form.take_text("title").unwrap_or_default().trim().to_string(),
        body: form.take_text("body").unwrap_or_default(),
        image_url: None,
        link_url: form.take_text("link_url").filter(|url| !url.trim().is_empty()),
        starts_at: form.datetime("starts_at")?,
        ends_at: form.datetime("ends_at")?,
        published: form.flag("published")?.unwrap_or(false),
    };
    draft.validate()?;

    // 2. Document
    let mut item = data.content.create_content(draft).await?;

    // 3. Image, keyed by the new id. A failed upload leaves no orphan document.
    if let Some(image) = form.image.take() {
        let uploaded = data
            .blobs
            .upload(&image_namespace(kind, &item.id), image.data, &image.content_type)
            .await;
        let url = match uploaded {
            Ok(url) => url,
            Err(err) => {
                if let Err(cleanup) = data.content.delete_content(&item.id).await {
                    log::error!("Could not roll back {kind} {}: {cleanup:#}", item.id);
                }
                return Err(err.into());
            }
        };

        let patch = ContentPatch {
            image_url: Some(url.clone()),
            ..ContentPatch::default()
        };
        item = match data.content.update_content(&item.id, patch).await {
            Ok(Some(updated)) => updated,
            Ok(None) => return Err(not_found(kind.as_str(), &item.id)),
            Err(err) => {
                discard_image(data.blobs.as_ref(), &url).await;
                return Err(err.into());
            }
        };
    }

    log::info!("{} created {kind} {}", session.user.email, item.id);
    Ok(HttpResponse::Created().json(item))
}

/// Partial update. Blank `link_url` clears the link.
pub async fn update(
    data: web::Data<AppState>,
    session: Session,
    path: web::Path<(String, String)>,
    payload: Multipart,
) -> Result<HttpResponse, ApiError> {
    let (kind, id) = path.into_inner();
    let kind = parse_kind(&kind)?;
    let current = find_item(&data, kind, &id).await?;
    let mut form = FormData::read(payload, data.settings.max_upload_bytes).await?;

    let mut patch = ContentPatch {
        title: form.take_text("title").map(|title| title.trim().to_string()),
        body: form.take_text("body"),
        image_url: None,
        link_url: form.take_text("link_url").map(|url| url.trim().to_string()),
        starts_at: form.datetime("starts_at")?,
        ends_at: form.datetime("ends_at")?,
        published: form.flag("published")?,
    };
    if patch.title.as_deref() == Some("") {
        return Err(invalid("title is required"));
    }
    check_content_dates(patch.starts_at.or(current.starts_at), patch.ends_at.or(current.ends_at))?;

    // New image first; the old one goes only once the document points away from it.
    let new_image = match form.image.take() {
        Some(image) => Some(
            data.blobs
                .upload(&image_namespace(kind, &id), image.data, &image.content_type)
                .await?,
        ),
        None => None,
    };
    patch.image_url = new_image.clone();

    let updated = match data.content.update_content(&id, patch).await {
        Ok(Some(updated)) => updated,
        outcome => {
            if let Some(url) = new_image.as_deref().filter(|url| current.image_url.as_deref() != Some(*url)) {
                discard_image(data.blobs.as_ref(), url).await;
            }
            return match outcome {
                Err(err) => Err(err.into()),
                _ => Err(not_found(kind.as_str(), &id)),
            };
        }
    };

    if let (Some(old), Some(new)) = (current.image_url.as_deref(), new_image.as_deref()) {
        if old != new {
            discard_image(data.blobs.as_ref(), old).await;
        }
    }

    log::info!("{} updated {kind} {id}", session.user.email);
    Ok(HttpResponse::Ok().json(updated))
}

pub async fn delete(
    data: web::Data<AppState>,
    session: Session,
    path: web::Path<(String, String)>,
) -> Result<HttpResponse, ApiError> {
    let (kind, id) = path.into_inner();
    let kind = parse_kind(&kind)?;
    let current = find_item(&data, kind, &id).await?;

    if !data.content.delete_content(&id).await? {
        return Err(not_found(kind.as_str(), &id));
    }
    let image = match current.image_url.as_deref() {
        Some(url) => discard_image(data.blobs.as_ref(), url).await,
        None => ImageCleanup::NoImage,
    };

    log::info!("{} deleted {kind} {id}", session.user.email);
    Ok(HttpResponse::Ok().json(DeleteReport { id, image }))
}
