//! # Domain Models
//!
//! These structs represent the records the dashboard manages.
//! Identifiers are assigned by the document store (UUID v7 strings in the
//! bundled SQLite plugin, so they sort by creation time).

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Subtitle used when no default configuration exists yet.
pub const FALLBACK_SUBTITLE: &str = "Building bridges between communities";
/// Background image used when no default configuration exists yet.
pub const FALLBACK_BACKGROUND_URL: &str = "/static/main-page/default-background.svg";
/// Identifier of the in-memory fallback used while the store is unreachable.
pub const FALLBACK_CONFIG_ID: &str = "fallback";

/// A "main page" presentation record.
///
/// Scheduled configurations carry an inclusive `[starts_at, ends_at]` window.
/// The default configuration has no window and is always eligible.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MainPageConfig {
    pub id: String,
    pub subtitle: String,
    /// Empty until an image has been uploaded for this record
    pub background_image_url: String,
    /// `None` for the default, or when the stored value could not be parsed
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
    pub is_default: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MainPageConfig {
    /// The hardcoded default shown when the store cannot provide one.
    pub fn fallback(now: DateTime<Utc>) -> Self {
        Self {
            id: FALLBACK_CONFIG_ID.to_string(),
            subtitle: FALLBACK_SUBTITLE.to_string(),
            background_image_url: FALLBACK_BACKGROUND_URL.to_string(),
            starts_at: None,
            ends_at: None,
            is_default: true,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Input for creating a configuration document. The store assigns id and timestamps.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ConfigDraft {
    pub subtitle: String,
    pub background_image_url: String,
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
    pub is_default: bool,
}

impl ConfigDraft {
    /// Draft for the lazily created default document.
    pub fn default_config() -> Self {
        Self {
            subtitle: FALLBACK_SUBTITLE.to_string(),
            background_image_url: FALLBACK_BACKGROUND_URL.to_string(),
            starts_at: None,
            ends_at: None,
            is_default: true,
        }
    }
}

/// Partial update of a configuration document. `None` leaves a field untouched.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ConfigPatch {
    pub subtitle: Option<String>,
    pub background_image_url: Option<String>,
    pub window: Option<(DateTime<Utc>, DateTime<Utc>)>,
}

/// The uniform CRUD content types of the dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    Event,
    Activity,
    Advertisement,
    EducationalPost,
    Partner,
}

impl ContentKind {
    pub const ALL: [ContentKind; 5] = [
        ContentKind::Event,
        ContentKind::Activity,
        ContentKind::Advertisement,
        ContentKind::EducationalPost,
        ContentKind::Partner,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ContentKind::Event => "event",
            ContentKind::Activity => "activity",
            ContentKind::Advertisement => "advertisement",
            ContentKind::EducationalPost => "educational_post",
            ContentKind::Partner => "partner",
        }
    }
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ContentKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| AppError::ValidationError(format!("unknown content kind '{s}'")))
    }
}

/// An event, activity, advertisement, educational post or partner entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentItem {
    pub id: String,
    pub kind: ContentKind,
    pub title: String,
    pub body: String,
    pub image_url: Option<String>,
    pub link_url: Option<String>,
    /// Only meaningful for events and activities
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
    pub published: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentDraft {
    pub kind: ContentKind,
    pub title: String,
    pub body: String,
    pub image_url: Option<String>,
    pub link_url: Option<String>,
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
    pub published: bool,
}

impl ContentDraft {
    pub fn validate(&self) -> crate::Result<()> {
        if self.title.trim().is_empty() {
            return Err(AppError::ValidationError("title is required".into()));
        }
        check_content_dates(self.starts_at, self.ends_at)
    }
}

/// Event dates are optional, but when both are set they must not be inverted.
pub fn check_content_dates(starts_at: Option<DateTime<Utc>>, ends_at: Option<DateTime<Utc>>) -> crate::Result<()> {
    match (starts_at, ends_at) {
        (Some(start), Some(end)) if start > end => Err(AppError::ValidationError(
            "start date must not be after end date".into(),
        )),
        _ => Ok(()),
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ContentPatch {
    pub title: Option<String>,
    pub body: Option<String>,
    pub image_url: Option<String>,
    pub link_url: Option<String>,
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
    pub published: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InquiryStatus {
    Open,
    Answered,
    Archived,
}

impl InquiryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InquiryStatus::Open => "open",
            InquiryStatus::Answered => "answered",
            InquiryStatus::Archived => "archived",
        }
    }
}

impl FromStr for InquiryStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(InquiryStatus::Open),
            "answered" => Ok(InquiryStatus::Answered),
            "archived" => Ok(InquiryStatus::Archived),
            other => Err(AppError::ValidationError(format!("unknown inquiry status '{other}'"))),
        }
    }
}

/// A message submitted through the public contact form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Inquiry {
    pub id: String,
    pub name: String,
    pub email: String,
    pub subject: String,
    pub message: String,
    pub status: InquiryStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InquiryDraft {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub subject: String,
    pub message: String,
}

impl InquiryDraft {
    pub fn validate(&self) -> crate::Result<()> {
        if self.name.trim().is_empty() {
            return Err(AppError::ValidationError("name is required".into()));
        }
        if !self.email.contains('@') {
            return Err(AppError::ValidationError("a valid email is required".into()));
        }
        if self.message.trim().is_empty() {
            return Err(AppError::ValidationError("message is required".into()));
        }
        Ok(())
    }
}

/// Staff role. Editors manage content; admins additionally manage accounts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Editor,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Editor => "editor",
        }
    }
}

impl FromStr for Role {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Role::Admin),
            "editor" => Ok(Role::Editor),
            other => Err(AppError::ValidationError(format!("unknown role '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: String,
    pub display_name: String,
    pub role: Role,
    /// Argon2 PHC string; never leaves the server
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UserDraft {
    pub email: String,
    pub display_name: String,
    pub role: Role,
    pub password_hash: String,
}

/// An image received from an upload form, not yet stored.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageUpload {
    pub data: Vec<u8>,
    pub content_type: String,
}

/// Outcome of the best-effort blob removal that follows a document delete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum ImageCleanup {
    NoImage,
    Deleted,
    Failed(String),
}

/// Result of a two-step delete: the document is gone, the image may not be.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeleteReport {
    pub id: String,
    pub image: ImageCleanup,
}
