//! # cb-db-sqlite Implementation
//!
//! This module implements the data mapping between the SQLite relational model
//! and the `cb-core` domain models. One `SqliteStore` backs every repository port.
//!
//! Timestamps are stored as RFC 3339 UTC text with fixed precision, so
//! `ORDER BY created_at` is chronological.

use std::str::FromStr;

use async_trait::async_trait;
use cb_core::error::AppError;
use cb_core::models::{
    ConfigDraft, ConfigPatch, ContentDraft, ContentItem, ContentKind, ContentPatch, Inquiry,
    InquiryDraft, InquiryStatus, MainPageConfig, Role, User, UserDraft,
};
use cb_core::traits::{ConfigStore, ContentRepo, InquiryRepo, UserRepo};
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use uuid::Uuid;

mod schema;

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Connects (creating the database file if needed) and applies the schema.
    pub async fn new(url: &str) -> anyhow::Result<Self> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .foreign_keys(true);

        // Every connection to `:memory:` is a separate database.
        let pool = if url.contains(":memory:") {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect_with(options)
                .await?
        } else {
            SqlitePoolOptions::new()
                .max_connections(5)
                .connect_with(options)
                .await?
        };

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> anyhow::Result<()> {
        for statement in schema::STATEMENTS {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        log::debug!("SQLite schema is up to date");
        Ok(())
    }
}

// Helpers for timestamp conversion
fn ts(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|parsed| parsed.with_timezone(&Utc))
}

fn required_ts(row: &SqliteRow, column: &str) -> anyhow::Result<DateTime<Utc>> {
    let raw: String = row.try_get(column)?;
    parse_ts(&raw).ok_or_else(|| anyhow::anyhow!("malformed timestamp in {column}: {raw:?}"))
}

/// Unparseable optional timestamps decode as `None`; the record stays readable.
fn optional_ts(row: &SqliteRow, column: &str) -> anyhow::Result<Option<DateTime<Utc>>> {
    let raw: Option<String> = row.try_get(column)?;
    Ok(raw.and_then(|raw| {
        let parsed = parse_ts(&raw);
        if parsed.is_none() {
            log::warn!("Ignoring malformed {column} value {raw:?}");
        }
        parsed
    }))
}

fn optional_text(row: &SqliteRow, column: &str) -> anyhow::Result<Option<String>> {
    let raw: Option<String> = row.try_get(column)?;
    Ok(raw.filter(|value| !value.is_empty()))
}

fn new_id() -> String {
    Uuid::now_v7().to_string()
}

fn config_from_row(row: &SqliteRow) -> anyhow::Result<MainPageConfig> {
    Ok(MainPageConfig {
        id: row.try_get("id")?,
        subtitle: row.try_get("subtitle")?,
        background_image_url: row.try_get("background_image_url")?,
        starts_at: optional_ts(row, "starts_at")?,
        ends_at: optional_ts(row, "ends_at")?,
        is_default: row.try_get("is_default")?,
        created_at: required_ts(row, "created_at")?,
        updated_at: required_ts(row, "updated_at")?,
    })
}

fn content_from_row(row: &SqliteRow) -> anyhow::Result<ContentItem> {
    let kind: String = row.try_get("kind")?;
    Ok(ContentItem {
        id: row.try_get("id")?,
        kind: ContentKind::from_str(&kind)?,
        title: row.try_get("title")?,
        body: row.try_get("body")?,
        image_url: optional_text(row, "image_url")?,
        link_url: optional_text(row, "link_url")?,
        starts_at: optional_ts(row, "starts_at")?,
        ends_at: optional_ts(row, "ends_at")?,
        published: row.try_get("published")?,
        created_at: required_ts(row, "created_at")?,
        updated_at: required_ts(row, "updated_at")?,
    })
}

fn inquiry_from_row(row: &SqliteRow) -> anyhow::Result<Inquiry> {
    let status: String = row.try_get("status")?;
    Ok(Inquiry {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        email: row.try_get("email")?,
        subject: row.try_get("subject")?,
        message: row.try_get("message")?,
        status: InquiryStatus::from_str(&status)?,
        created_at: required_ts(row, "created_at")?,
        updated_at: required_ts(row, "updated_at")?,
    })
}

fn user_from_row(row: &SqliteRow) -> anyhow::Result<User> {
    let role: String = row.try_get("role")?;
    Ok(User {
        id: row.try_get("id")?,
        email: row.try_get("email")?,
        display_name: row.try_get("display_name")?,
        role: Role::from_str(&role)?,
        password_hash: row.try_get("password_hash")?,
        created_at: required_ts(row, "created_at")?,
    })
}

#[async_trait]
impl ConfigStore for SqliteStore {
    async fn list_configs(&self) -> anyhow::Result<Vec<MainPageConfig>> {
        let rows = sqlx::query("SELECT * FROM main_page_configs ORDER BY created_at DESC, rowid DESC")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(config_from_row).collect()
    }

    async fn get_config(&self, id: &str) -> anyhow::Result<Option<MainPageConfig>> {
        let row = sqlx::query("SELECT * FROM main_page_configs WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(config_from_row).transpose()
    }

    async fn create_config(&self, draft: ConfigDraft) -> anyhow::Result<MainPageConfig> {
        let now = Utc::now();
        let config = MainPageConfig {
            id: new_id(),
            subtitle: draft.subtitle,
            background_image_url: draft.background_image_url,
            starts_at: draft.starts_at,
            ends_at: draft.ends_at,
            is_default: draft.is_default,
            created_at: now,
            updated_at: now,
        };

        sqlx::query(
            "INSERT INTO main_page_configs (id, subtitle, background_image_url, starts_at, ends_at, is_default, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&config.id)
        .bind(&config.subtitle)
        .bind(&config.background_image_url)
        .bind(config.starts_at.map(ts))
        .bind(config.ends_at.map(ts))
        .bind(config.is_default)
        .bind(ts(config.created_at))
        .bind(ts(config.updated_at))
        .execute(&self.pool)
        .await?;

        Ok(config)
    }

    async fn update_config(&self, id: &str, patch: ConfigPatch) -> anyhow::Result<Option<MainPageConfig>> {
        let (starts_at, ends_at) = match patch.window {
            Some((start, end)) => (Some(ts(start)), Some(ts(end))),
            None => (None, None),
        };
        let result = sqlx::query(
            "UPDATE main_page_configs SET subtitle = COALESCE(?, subtitle), background_image_url = COALESCE(?, background_image_url), starts_at = COALESCE(?, starts_at), ends_at = COALESCE(?, ends_at), updated_at = ? WHERE id = ?",
        )
        .bind(patch.subtitle)
        .bind(patch.background_image_url)
        .bind(starts_at)
        .bind(ends_at)
        .bind(ts(Utc::now()))
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.get_config(id).await
    }

    async fn delete_config(&self, id: &str) -> anyhow::Result<bool> {
        let result = sqlx::query("DELETE FROM main_page_configs WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl ContentRepo for SqliteStore {
    async fn list_content(&self, kind: ContentKind) -> anyhow::Result<Vec<ContentItem>> {
        let rows = sqlx::query("SELECT * FROM content_items WHERE kind = ? ORDER BY created_at DESC, rowid DESC")
            .bind(kind.as_str())
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(content_from_row).collect()
    }

    async fn get_content(&self, id: &str) -> anyhow::Result<Option<ContentItem>> {
        let row = sqlx::query("SELECT * FROM content_items WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(content_from_row).transpose()
    }

    async fn create_content(&self, draft: ContentDraft) -> anyhow::Result<ContentItem> {
        let now = Utc::now();
        let item = ContentItem {
            id: new_id(),
            kind: draft.kind,
            title: draft.title,
            body: draft.body,
            image_url: draft.image_url,
            link_url: draft.link_url,
            starts_at: draft.starts_at,
            ends_at: draft.ends_at,
            published: draft.published,
            created_at: now,
            updated_at: now,
        };

        sqlx::query(
            "INSERT INTO content_items (id, kind, title, body, image_url, link_url, starts_at, ends_at, published, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&item.id)
        .bind(item.kind.as_str())
        .bind(&item.title)
        .bind(&item.body)
        .bind(&item.image_url)
        .bind(&item.link_url)
        .bind(item.starts_at.map(ts))
        .bind(item.ends_at.map(ts))
        .bind(item.published)
        .bind(ts(item.created_at))
        .bind(ts(item.updated_at))
        .execute(&self.pool)
        .await?;

        Ok(item)
    }

    async fn update_content(&self, id: &str, patch: ContentPatch) -> anyhow::Result<Option<ContentItem>> {
        let result = sqlx::query(
            "UPDATE content_items SET title = COALESCE(?, title), body = COALESCE(?, body), image_url = COALESCE(?, image_url), link_url = COALESCE(?, link_url), starts_at = COALESCE(?, starts_at), ends_at = COALESCE(?, ends_at), published = COALESCE(?, published), updated_at = ? WHERE id = ?",
        )
        .bind(patch.title)
        .bind(patch.body)
        .bind(patch.image_url)
        .bind(patch.link_url)
        .bind(patch.starts_at.map(ts))
        .bind(patch.ends_at.map(ts))
        .bind(patch.published)
        .bind(ts(Utc::now()))
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.get_content(id).await
    }

    async fn delete_content(&self, id: &str) -> anyhow::Result<bool> {
        let result = sqlx::query("DELETE FROM content_items WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl InquiryRepo for SqliteStore {
    async fn create_inquiry(&self, draft: InquiryDraft) -> anyhow::Result<Inquiry> {
        let now = Utc::now();
        let inquiry = Inquiry {
            id: new_id(),
            name: draft.name,
            email: draft.email,
            subject: draft.subject,
            message: draft.message,
            status: InquiryStatus::Open,
            created_at: now,
            updated_at: now,
        };

        sqlx::query(
            "INSERT INTO inquiries (id, name, email, subject, message, status, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&inquiry.id)
        .bind(&inquiry.name)
        .bind(&inquiry.email)
        .bind(&inquiry.subject)
        .bind(&inquiry.message)
        .bind(inquiry.status.as_str())
        .bind(ts(inquiry.created_at))
        .bind(ts(inquiry.updated_at))
        .execute(&self.pool)
        .await?;

        Ok(inquiry)
    }

    async fn list_inquiries(&self) -> anyhow::Result<Vec<Inquiry>> {
        let rows = sqlx::query("SELECT * FROM inquiries ORDER BY created_at DESC, rowid DESC")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(inquiry_from_row).collect()
    }

    async fn set_inquiry_status(&self, id: &str, status: InquiryStatus) -> anyhow::Result<Option<Inquiry>> {
        let result = sqlx::query("UPDATE inquiries SET status = ?, updated_at = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(ts(Utc::now()))
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Ok(None);
        }

        let row = sqlx::query("SELECT * FROM inquiries WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(inquiry_from_row).transpose()
    }

    async fn delete_inquiry(&self, id: &str) -> anyhow::Result<bool> {
        let result = sqlx::query("DELETE FROM inquiries WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl UserRepo for SqliteStore {
    async fn create_user(&self, draft: UserDraft) -> anyhow::Result<User> {
        let user = User {
            id: new_id(),
            email: draft.email.trim().to_lowercase(),
            display_name: draft.display_name,
            role: draft.role,
            password_hash: draft.password_hash,
            created_at: Utc::now(),
        };

        let inserted = sqlx::query(
            "INSERT INTO users (id, email, display_name, role, password_hash, created_at) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&user.id)
        .bind(&user.email)
        .bind(&user.display_name)
        .bind(user.role.as_str())
        .bind(&user.password_hash)
        .bind(ts(user.created_at))
        .execute(&self.pool)
        .await;

        match inserted {
            Ok(_) => Ok(user),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => Err(anyhow::Error::new(
                AppError::Conflict(format!("a user with email {} already exists", user.email)),
            )),
            Err(err) => Err(err.into()),
        }
    }

    async fn get_user(&self, id: &str) -> anyhow::Result<Option<User>> {
        let row = sqlx::query("SELECT * FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(user_from_row).transpose()
    }

    async fn find_user_by_email(&self, email: &str) -> anyhow::Result<Option<User>> {
        let row = sqlx::query("SELECT * FROM users WHERE email = ?")
            .bind(email.trim().to_lowercase())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(user_from_row).transpose()
    }

    async fn list_users(&self) -> anyhow::Result<Vec<User>> {
        let rows = sqlx::query("SELECT * FROM users ORDER BY email ASC")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(user_from_row).collect()
    }

    async fn count_users(&self) -> anyhow::Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn update_user(&self, user: User) -> anyhow::Result<bool> {
        let result = sqlx::query("UPDATE users SET display_name = ?, role = ?, password_hash = ? WHERE id = ?")
            .bind(&user.display_name)
            .bind(user.role.as_str())
            .bind(&user.password_hash)
            .bind(&user.id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_user(&self, id: &str) -> anyhow::Result<bool> {
        let result = sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn create_session(&self, token_digest: &str, user_id: &str, expires_at: DateTime<Utc>) -> anyhow::Result<()> {
        sqlx::query("INSERT INTO sessions (token_digest, user_id, expires_at, created_at) VALUES (?, ?, ?, ?)")
            .bind(token_digest)
            .bind(user_id)
            .bind(ts(expires_at))
            .bind(ts(Utc::now()))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn find_session(&self, token_digest: &str, now: DateTime<Utc>) -> anyhow::Result<Option<User>> {
        let row = sqlx::query(
            "SELECT u.*, s.expires_at AS session_expires_at FROM sessions s JOIN users u ON u.id = s.user_id WHERE s.token_digest = ?",
        )
        .bind(token_digest)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let expired = optional_ts(&row, "session_expires_at")?.map_or(true, |expires_at| expires_at <= now);
        if expired {
            self.delete_session(token_digest).await?;
            return Ok(None);
        }
        user_from_row(&row).map(Some)
    }

    async fn delete_session(&self, token_digest: &str) -> anyhow::Result<()> {
        sqlx::query("DELETE FROM sessions WHERE token_digest = ?")
            .bind(token_digest)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    async fn store() -> SqliteStore {
        SqliteStore::new("sqlite::memory:").await.unwrap()
    }

    fn scheduled(subtitle: &str) -> ConfigDraft {
        ConfigDraft {
            subtitle: subtitle.into(),
            starts_at: Some(Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()),
            ends_at: Some(Utc.with_ymd_and_hms(2025, 1, 31, 0, 0, 0).unwrap()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_configs_list_newest_first() {
        let store = store().await;
        let first = store.create_config(scheduled("first")).await.unwrap();
        let second = store.create_config(scheduled("second")).await.unwrap();

        let listed = store.list_configs().await.unwrap();
        let ids: Vec<_> = listed.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec![second.id.as_str(), first.id.as_str()]);
        assert_eq!(listed[1].starts_at, first.starts_at);
    }

    #[tokio::test]
    async fn test_config_patch_keeps_untouched_fields() {
        let store = store().await;
        let created = store.create_config(scheduled("original")).await.unwrap();

        let patch = ConfigPatch {
            background_image_url: Some("/uploads/main-page/x/abc.png".into()),
            ..Default::default()
        };
        let updated = store.update_config(&created.id, patch).await.unwrap().unwrap();
        assert_eq!(updated.subtitle, "original");
        assert_eq!(updated.background_image_url, "/uploads/main-page/x/abc.png");
        assert_eq!(updated.ends_at, created.ends_at);

        assert!(store.update_config("missing", ConfigPatch::default()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_malformed_window_decodes_as_none() {
        let store = store().await;
        let created = store.create_config(scheduled("corrupt")).await.unwrap();
        sqlx::query("UPDATE main_page_configs SET starts_at = 'next tuesday' WHERE id = ?")
            .bind(&created.id)
            .execute(&store.pool)
            .await
            .unwrap();

        let loaded = store.get_config(&created.id).await.unwrap().unwrap();
        assert!(loaded.starts_at.is_none());
        assert!(loaded.ends_at.is_some());
    }

    #[tokio::test]
    async fn test_delete_config() {
        let store = store().await;
        let created = store.create_config(ConfigDraft::default_config()).await.unwrap();
        assert!(store.delete_config(&created.id).await.unwrap());
        assert!(!store.delete_config(&created.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_content_is_scoped_by_kind_and_patchable() {
        let store = store().await;
        let draft = ContentDraft {
            kind: ContentKind::Event,
            title: "Open day".into(),
            body: "Come by".into(),
            image_url: None,
            link_url: Some("https://example.org".into()),
            starts_at: None,
            ends_at: None,
            published: false,
        };
        let event = store.create_content(draft.clone()).await.unwrap();
        store
            .create_content(ContentDraft { kind: ContentKind::Partner, ..draft })
            .await
            .unwrap();

        let events = store.list_content(ContentKind::Event).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].id, event.id);

        let patch = ContentPatch {
            published: Some(true),
            link_url: Some(String::new()),
            ..Default::default()
        };
        let updated = store.update_content(&event.id, patch).await.unwrap().unwrap();
        assert!(updated.published);
        assert!(updated.link_url.is_none());
        assert_eq!(updated.title, "Open day");
    }

    #[tokio::test]
    async fn test_inquiry_status_transitions() {
        let store = store().await;
        let inquiry = store
            .create_inquiry(InquiryDraft {
                name: "Ana".into(),
                email: "ana@example.org".into(),
                subject: "Volunteering".into(),
                message: "How can I help?".into(),
            })
            .await
            .unwrap();
        assert_eq!(inquiry.status, InquiryStatus::Open);

        let answered = store
            .set_inquiry_status(&inquiry.id, InquiryStatus::Answered)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(answered.status, InquiryStatus::Answered);
        assert!(store.delete_inquiry(&inquiry.id).await.unwrap());
        assert!(store.list_inquiries().await.unwrap().is_empty());
    }

    fn user_draft(email: &str) -> UserDraft {
        UserDraft {
            email: email.into(),
            display_name: "Staff".into(),
            role: Role::Editor,
            password_hash: "$argon2id$placeholder".into(),
        }
    }

    #[tokio::test]
    async fn test_duplicate_email_is_a_conflict() {
        let store = store().await;
        store.create_user(user_draft("Staff@Example.org")).await.unwrap();
        let err = store.create_user(user_draft("staff@example.org")).await.unwrap_err();
        assert!(matches!(AppError::from(err), AppError::Conflict(_)));
        assert_eq!(store.count_users().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_sessions_expire_and_cascade() {
        let store = store().await;
        let user = store.create_user(user_draft("staff@example.org")).await.unwrap();
        let now = Utc::now();

        store.create_session("live", &user.id, now + Duration::hours(1)).await.unwrap();
        store.create_session("stale", &user.id, now - Duration::hours(1)).await.unwrap();

        let found = store.find_session("live", now).await.unwrap().unwrap();
        assert_eq!(found.id, user.id);
        assert!(store.find_session("stale", now).await.unwrap().is_none());

        assert!(store.delete_user(&user.id).await.unwrap());
        assert!(store.find_session("live", now).await.unwrap().is_none());
    }
}
