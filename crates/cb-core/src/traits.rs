//! # Core Traits (Ports)
//!
//! Any plugin must implement these traits to be used by the binary.
//! Implementations are constructed once and shared as `Arc<dyn Trait>`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::{
    ConfigDraft, ConfigPatch, ContentDraft, ContentItem, ContentKind, ContentPatch, Inquiry,
    InquiryDraft, InquiryStatus, MainPageConfig, User, UserDraft,
};

#[cfg(any(test, feature = "testing"))]
use mockall::automock;

/// Document store for main-page configurations.
#[cfg_attr(any(test, feature = "testing"), automock)]
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// All configurations, newest first.
    async fn list_configs(&self) -> anyhow::Result<Vec<MainPageConfig>>;
    async fn get_config(&self, id: &str) -> anyhow::Result<Option<MainPageConfig>>;
    /// Persists a new document and returns it with its generated identifier.
    async fn create_config(&self, draft: ConfigDraft) -> anyhow::Result<MainPageConfig>;
    /// Returns `None` when no document has this identifier.
    async fn update_config(&self, id: &str, patch: ConfigPatch) -> anyhow::Result<Option<MainPageConfig>>;
    /// Returns `false` when no document had this identifier.
    async fn delete_config(&self, id: &str) -> anyhow::Result<bool>;
}

/// Document store for the uniform CRUD content types.
#[cfg_attr(any(test, feature = "testing"), automock)]
#[async_trait]
pub trait ContentRepo: Send + Sync {
    /// Items of one kind, newest first.
    async fn list_content(&self, kind: ContentKind) -> anyhow::Result<Vec<ContentItem>>;
    async fn get_content(&self, id: &str) -> anyhow::Result<Option<ContentItem>>;
    async fn create_content(&self, draft: ContentDraft) -> anyhow::Result<ContentItem>;
    async fn update_content(&self, id: &str, patch: ContentPatch) -> anyhow::Result<Option<ContentItem>>;
    async fn delete_content(&self, id: &str) -> anyhow::Result<bool>;
}

#[cfg_attr(any(test, feature = "testing"), automock)]
#[async_trait]
pub trait InquiryRepo: Send + Sync {
    async fn create_inquiry(&self, draft: InquiryDraft) -> anyhow::Result<Inquiry>;
    /// All inquiries, newest first.
    async fn list_inquiries(&self) -> anyhow::Result<Vec<Inquiry>>;
    async fn set_inquiry_status(&self, id: &str, status: InquiryStatus) -> anyhow::Result<Option<Inquiry>>;
    async fn delete_inquiry(&self, id: &str) -> anyhow::Result<bool>;
}

/// Staff accounts and their sessions.
#[cfg_attr(any(test, feature = "testing"), automock)]
#[async_trait]
pub trait UserRepo: Send + Sync {
    /// Fails with `AppError::Conflict` when the email is taken.
    async fn create_user(&self, draft: UserDraft) -> anyhow::Result<User>;
    async fn get_user(&self, id: &str) -> anyhow::Result<Option<User>>;
    async fn find_user_by_email(&self, email: &str) -> anyhow::Result<Option<User>>;
    async fn list_users(&self) -> anyhow::Result<Vec<User>>;
    async fn count_users(&self) -> anyhow::Result<i64>;
    async fn update_user(&self, user: User) -> anyhow::Result<bool>;
    async fn delete_user(&self, id: &str) -> anyhow::Result<bool>;

    // Session Operations
    async fn create_session(&self, token_digest: &str, user_id: &str, expires_at: DateTime<Utc>) -> anyhow::Result<()>;
    /// Resolves a live session; expired sessions are removed and yield `None`.
    async fn find_session(&self, token_digest: &str, now: DateTime<Utc>) -> anyhow::Result<Option<User>>;
    async fn delete_session(&self, token_digest: &str) -> anyhow::Result<()>;
}

/// Blob storage for uploaded images.
#[cfg_attr(any(test, feature = "testing"), automock)]
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Saves raw bytes under `namespace` (e.g., "main-page/<id>") and returns a retrievable URL.
    async fn upload(&self, namespace: &str, data: Vec<u8>, content_type: &str) -> anyhow::Result<String>;
    /// Deletes the blob behind a URL previously returned by `upload`.
    async fn delete_by_url(&self, url: &str) -> anyhow::Result<()>;
    /// Returns the URL of the thumbnail for a stored image, if one was generated.
    async fn thumbnail_url(&self, url: &str) -> Option<String>;
}

/// Credential hashing and session token primitives.
#[cfg_attr(any(test, feature = "testing"), automock)]
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Produces a PHC-format hash suitable for `UserRepo` storage.
    fn hash_password(&self, password: &str) -> anyhow::Result<String>;

    /// Verifies staff credentials against a stored hash.
    async fn verify_password(&self, password: &str, hash: &str) -> bool;

    /// A fresh opaque bearer token handed to the client.
    fn new_session_token(&self) -> anyhow::Result<String>;

    /// The form in which a token is persisted; tokens themselves are never stored.
    fn token_digest(&self, token: &str) -> String;
}

/// Wall-clock source, injected so scheduling can be tested.
#[cfg_attr(any(test, feature = "testing"), automock)]
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// The real clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
