//! In-memory port implementations for tests.
//!
//! Compiled for this crate's own tests and behind the `testing` feature for
//! other crates. Not meant for production use: nothing is persisted.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};

use crate::models::{ConfigDraft, ConfigPatch, MainPageConfig};
use crate::traits::{BlobStore, Clock, ConfigStore};

/// A clock that only moves when told to.
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self { now: Mutex::new(now) }
    }

    pub fn at_ymd(year: i32, month: u32, day: u32) -> Self {
        Self::new(Utc.with_ymd_and_hms(year, month, day, 12, 0, 0).unwrap())
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().unwrap() = now;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

/// Vec-backed configuration store. Listing is newest first, like the SQLite plugin.
#[derive(Default)]
pub struct MemoryConfigStore {
    docs: Mutex<Vec<MainPageConfig>>,
    sequence: AtomicU64,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl MemoryConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a document as-is, bypassing id generation.
    pub fn seed(&self, config: MainPageConfig) {
        self.docs.lock().unwrap().push(config);
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> Vec<MainPageConfig> {
        self.docs.lock().unwrap().clone()
    }

    fn check_write(&self) -> anyhow::Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            anyhow::bail!("store rejected the write");
        }
        Ok(())
    }
}

#[async_trait]
impl ConfigStore for MemoryConfigStore {
    async fn list_configs(&self) -> anyhow::Result<Vec<MainPageConfig>> {
        if self.fail_reads.load(Ordering::SeqCst) {
            anyhow::bail!("store unreachable");
        }
        let mut docs = self.docs.lock().unwrap().clone();
        docs.reverse();
        Ok(docs)
    }

    async fn get_config(&self, id: &str) -> anyhow::Result<Option<MainPageConfig>> {
        Ok(self.docs.lock().unwrap().iter().find(|c| c.id == id).cloned())
    }

    async fn create_config(&self, draft: ConfigDraft) -> anyhow::Result<MainPageConfig> {
        self.check_write()?;
        let n = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        let created_at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::minutes(n as i64);
        let config = MainPageConfig {
            id: format!("cfg-{n}"),
            subtitle: draft.subtitle,
            background_image_url: draft.background_image_url,
            starts_at: draft.starts_at,
            ends_at: draft.ends_at,
            is_default: draft.is_default,
            created_at,
            updated_at: created_at,
        };
        self.docs.lock().unwrap().push(config.clone());
        Ok(config)
    }

    async fn update_config(&self, id: &str, patch: ConfigPatch) -> anyhow::Result<Option<MainPageConfig>> {
        self.check_write()?;
        let mut docs = self.docs.lock().unwrap();
        let Some(config) = docs.iter_mut().find(|c| c.id == id) else {
            return Ok(None);
        };
        if let Some(subtitle) = patch.subtitle {
            config.subtitle = subtitle;
        }
        if let Some(url) = patch.background_image_url {
            config.background_image_url = url;
        }
        if let Some((start, end)) = patch.window {
            config.starts_at = Some(start);
            config.ends_at = Some(end);
        }
        Ok(Some(config.clone()))
    }

    async fn delete_config(&self, id: &str) -> anyhow::Result<bool> {
        self.check_write()?;
        let mut docs = self.docs.lock().unwrap();
        let before = docs.len();
        docs.retain(|c| c.id != id);
        Ok(docs.len() != before)
    }
}

/// HashMap-backed blob store with switchable failures.
#[derive(Default)]
pub struct MemoryBlobStore {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
    sequence: AtomicU64,
    fail_uploads: AtomicBool,
    fail_deletes: AtomicBool,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_uploads(&self, fail: bool) {
        self.fail_uploads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    pub fn contains(&self, url: &str) -> bool {
        self.blobs.lock().unwrap().contains_key(url)
    }

    pub fn len(&self) -> usize {
        self.blobs.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn upload(&self, namespace: &str, data: Vec<u8>, _content_type: &str) -> anyhow::Result<String> {
        if self.fail_uploads.load(Ordering::SeqCst) {
            anyhow::bail!("blob store rejected the upload");
        }
        let n = self.sequence.fetch_add(1, Ordering::SeqCst);
        let url = format!("memory://{namespace}/{n}");
        self.blobs.lock().unwrap().insert(url.clone(), data);
        Ok(url)
    }

    async fn delete_by_url(&self, url: &str) -> anyhow::Result<()> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            anyhow::bail!("blob store rejected the delete");
        }
        self.blobs.lock().unwrap().remove(url);
        Ok(())
    }

    async fn thumbnail_url(&self, _url: &str) -> Option<String> {
        None
    }
}
