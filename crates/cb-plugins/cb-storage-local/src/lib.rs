//! # cb-storage-local
//! civic-board/crates/cb-plugins/cb-storage-local/src/lib.rs
//! Local filesystem implementation of `BlobStore`.
//! Features: owner namespaces, content-addressed file names, and thumbnailing.
//!
//! Layout: `<root>/<namespace>/<sha256>.<ext>` with a sibling
//! `thumb_<sha256>.webp` for images, served at `<url_prefix>/<namespace>/...`.

use std::io::{Cursor, ErrorKind};
use std::path::{Component, Path, PathBuf};

use anyhow::Context;
use async_trait::async_trait;
use cb_core::traits::BlobStore;
use image::{DynamicImage, ImageFormat, ImageReader};
use sha2::{Digest, Sha256};
use tokio::fs;

/// Longest edge of generated thumbnails, in pixels.
const THUMBNAIL_EDGE: u32 = 250;

pub struct LocalBlobStore {
    /// Root directory for all uploads (e.g., "./data/uploads")
    root_path: PathBuf,
    /// Public URL prefix (e.g., "/static/uploads")
    url_prefix: String,
}

impl LocalBlobStore {
    pub fn new(root: PathBuf, url_prefix: String) -> Self {
        Self {
            root_path: root,
            url_prefix: url_prefix.trim_end_matches('/').to_string(),
        }
    }

    pub fn root_path(&self) -> &Path {
        &self.root_path
    }

    pub fn url_prefix(&self) -> &str {
        &self.url_prefix
    }

    /// Maps a URL produced by `upload` back to `(namespace, file name)`.
    ///
    /// Anything outside the prefix, or containing traversal segments, is rejected.
    pub fn locate(&self, url: &str) -> Option<(String, String)> {
        let relative = url.strip_prefix(&self.url_prefix)?.strip_prefix('/')?;
        let (namespace, file_name) = relative.rsplit_once('/')?;
        if !is_safe_namespace(namespace) || !is_safe_segment(file_name) {
            return None;
        }
        Some((namespace.to_string(), file_name.to_string()))
    }

    fn path_for(&self, namespace: &str, file_name: &str) -> PathBuf {
        let mut path = self.root_path.clone();
        path.extend(namespace.split('/'));
        path.push(file_name);
        path
    }

    fn url_for(&self, namespace: &str, file_name: &str) -> String {
        format!("{}/{}/{}", self.url_prefix, namespace, file_name)
    }
}

fn is_safe_segment(segment: &str) -> bool {
    !segment.is_empty()
        && segment != "."
        && segment != ".."
        && segment
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        && matches!(Path::new(segment).components().next(), Some(Component::Normal(_)))
}

fn is_safe_namespace(namespace: &str) -> bool {
    !namespace.is_empty() && namespace.split('/').all(is_safe_segment)
}

fn extension_for(content_type: &str) -> &'static str {
    match content_type {
        "image/jpeg" => "jpg",
        "image/png" => "png",
        "image/webp" => "webp",
        "image/gif" => "gif",
        other => mime_guess::get_mime_extensions_str(other)
            .and_then(|extensions| extensions.first().copied())
            .unwrap_or("bin"),
    }
}

fn thumbnail_name(file_name: &str) -> String {
    let stem = file_name.split('.').next().unwrap_or(file_name);
    format!("thumb_{stem}.webp")
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    /// Saves an upload using its SHA-256 hash as the filename.
    /// Re-uploading the same bytes into the same namespace is a no-op.
    async fn upload(&self, namespace: &str, data: Vec<u8>, content_type: &str) -> anyhow::Result<String> {
        if !is_safe_namespace(namespace) {
            anyhow::bail!("invalid blob namespace {namespace:?}");
        }

        // 1. Calculate Hash
        let hash = hex::encode(Sha256::digest(&data));
        let file_name = format!("{hash}.{}", extension_for(content_type));
        let target_path = self.path_for(namespace, &file_name);

        // 2. Ensure directory exists
        if let Some(parent) = target_path.parent() {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("creating {}", parent.display()))?;
        }

        // 3. Save Original (if not exists)
        if fs::metadata(&target_path).await.is_err() {
            fs::write(&target_path, &data)
                .await
                .with_context(|| format!("writing {}", target_path.display()))?;

            // 4. Thumbnail is a convenience; a broken image still uploads.
            if content_type.starts_with("image/") {
                let thumb_path = self.path_for(namespace, &thumbnail_name(&file_name));
                if let Err(err) = generate_thumbnail(data, thumb_path).await {
                    log::warn!("No thumbnail for {namespace}/{file_name}: {err:#}");
                }
            }
        }

        log::debug!("Stored blob {namespace}/{file_name}");
        Ok(self.url_for(namespace, &file_name))
    }

    async fn delete_by_url(&self, url: &str) -> anyhow::Result<()> {
        let (namespace, file_name) = self
            .locate(url)
            .ok_or_else(|| anyhow::anyhow!("{url} is not a URL served by this store"))?;

        for name in [file_name.clone(), thumbnail_name(&file_name)] {
            match fs::remove_file(self.path_for(&namespace, &name)).await {
                Ok(()) => {}
                Err(err) if err.kind() == ErrorKind::NotFound => {
                    log::debug!("Blob {namespace}/{name} already gone");
                }
                Err(err) => {
                    return Err(anyhow::Error::new(err).context(format!("removing {namespace}/{name}")));
                }
            }
        }
        Ok(())
    }

    async fn thumbnail_url(&self, url: &str) -> Option<String> {
        let (namespace, file_name) = self.locate(url)?;
        let thumb = thumbnail_name(&file_name);
        match fs::metadata(self.path_for(&namespace, &thumb)).await {
            Ok(_) => Some(self.url_for(&namespace, &thumb)),
            Err(_) => None,
        }
    }
}

/// Internal helper to generate a 250px WebP thumbnail off the async runtime.
async fn generate_thumbnail(data: Vec<u8>, thumb_path: PathBuf) -> anyhow::Result<()> {
    tokio::task::spawn_blocking(move || -> anyhow::Result<()> {
        let img = ImageReader::new(Cursor::new(data))
            .with_guessed_format()?
            .decode()?;

        // The WebP encoder only takes 8-bit RGB(A).
        let thumb = DynamicImage::ImageRgba8(img.thumbnail(THUMBNAIL_EDGE, THUMBNAIL_EDGE).to_rgba8());
        thumb.save_with_format(&thumb_path, ImageFormat::WebP)?;
        Ok(())
    })
    .await?
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store() -> LocalBlobStore {
        let root = std::env::temp_dir().join(format!("cb-storage-{}", uuid::Uuid::new_v4()));
        LocalBlobStore::new(root, "/uploads/".into())
    }

    fn tiny_png() -> Vec<u8> {
        let img = DynamicImage::new_rgb8(8, 4);
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, ImageFormat::Png).unwrap();
        out.into_inner()
    }

    #[tokio::test]
    async fn test_upload_is_namespaced_and_content_addressed() {
        let store = temp_store();
        let url = store.upload("main-page/abc", b"hello".to_vec(), "application/pdf").await.unwrap();

        assert!(url.starts_with("/uploads/main-page/abc/"));
        assert!(url.ends_with(".pdf"));
        let again = store.upload("main-page/abc", b"hello".to_vec(), "application/pdf").await.unwrap();
        assert_eq!(url, again);

        let (namespace, file_name) = store.locate(&url).unwrap();
        assert!(store.path_for(&namespace, &file_name).exists());
        assert!(store.thumbnail_url(&url).await.is_none());
    }

    #[tokio::test]
    async fn test_image_upload_gets_thumbnail_and_delete_removes_both() {
        let store = temp_store();
        let url = store.upload("event/e1", tiny_png(), "image/png").await.unwrap();

        let thumb = store.thumbnail_url(&url).await.expect("thumbnail generated");
        assert!(thumb.contains("/thumb_"));

        store.delete_by_url(&url).await.unwrap();
        let (namespace, file_name) = store.locate(&url).unwrap();
        assert!(!store.path_for(&namespace, &file_name).exists());
        assert!(store.thumbnail_url(&url).await.is_none());

        // Deleting twice is harmless.
        store.delete_by_url(&url).await.unwrap();
    }

    #[tokio::test]
    async fn test_undecodable_image_still_uploads() {
        let store = temp_store();
        let url = store.upload("partner/p1", b"not really a png".to_vec(), "image/png").await.unwrap();
        assert!(url.ends_with(".png"));
        assert!(store.thumbnail_url(&url).await.is_none());
    }

    #[tokio::test]
    async fn test_foreign_and_traversal_urls_are_rejected() {
        let store = temp_store();
        assert!(store.locate("https://cdn.example.org/main-page/a/b.png").is_none());
        assert!(store.locate("/uploads/../etc/passwd").is_none());
        assert!(store.locate("/uploads/main-page/../x.png").is_none());
        assert!(store.delete_by_url("/elsewhere/a/b.png").await.is_err());
        assert!(store.upload("../escape", vec![1], "image/png").await.is_err());
    }
}
