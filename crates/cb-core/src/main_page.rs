//! # Main Page Manager
//!
//! Owns the in-memory working set of main-page configurations, keeps the
//! displayed configuration current, and performs the administrative writes.
//!
//! # Developer Note
//! The store is authoritative; the working set is only a cache that is
//! re-fetched after every successful write. Loads are numbered so a slow
//! fetch that resolves after a newer one cannot overwrite it.

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::FutureExt;
use serde::Serialize;
use tokio::sync::{oneshot, watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::error::{AppError, Result};
use crate::models::{
    ConfigDraft, ConfigPatch, DeleteReport, ImageCleanup, ImageUpload, MainPageConfig,
    FALLBACK_BACKGROUND_URL,
};
use crate::schedule::{overlapping_ids, select_active, validate_window, WindowState};
use crate::traits::{BlobStore, Clock, ConfigStore};

/// How often the displayed configuration is re-evaluated.
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(60);

/// The partitioned, in-memory copy of all configuration documents.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkingSet {
    pub default: MainPageConfig,
    /// Non-default configurations in fetch order (newest first)
    pub scheduled: Vec<MainPageConfig>,
}

impl WorkingSet {
    /// Working set holding only the hardcoded default.
    pub fn fallback(now: DateTime<Utc>) -> Self {
        Self {
            default: MainPageConfig::fallback(now),
            scheduled: Vec::new(),
        }
    }

    pub fn select(&self, now: DateTime<Utc>) -> &MainPageConfig {
        select_active(now, &self.default, &self.scheduled)
    }

    pub fn find(&self, id: &str) -> Option<&MainPageConfig> {
        std::iter::once(&self.default)
            .chain(self.scheduled.iter())
            .find(|config| config.id == id)
    }
}

/// Splits fetched documents into the default (first flagged one wins) and the rest.
fn partition(documents: Vec<MainPageConfig>) -> (Option<MainPageConfig>, Vec<MainPageConfig>) {
    let mut default = None;
    let mut scheduled = Vec::with_capacity(documents.len());
    for doc in documents {
        if !doc.is_default {
            scheduled.push(doc);
        } else if default.is_none() {
            default = Some(doc);
        } else {
            log::warn!("Ignoring extra default main page configuration {}", doc.id);
        }
    }
    (default, scheduled)
}

/// Fields accepted when scheduling a new configuration.
#[derive(Debug, Clone, Default)]
pub struct ScheduleRequest {
    pub subtitle: String,
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
}

/// Fields accepted when editing. `None` keeps the stored value.
#[derive(Debug, Clone, Default)]
pub struct ConfigEdit {
    pub subtitle: Option<String>,
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
}

/// A written configuration plus the scheduled ones its window overlaps.
#[derive(Debug, Clone, Serialize)]
pub struct SavedConfig {
    pub config: MainPageConfig,
    pub overlaps: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OverviewEntry {
    pub config: MainPageConfig,
    pub state: WindowState,
}

/// Everything the admin overview shows, evaluated at one instant.
#[derive(Debug, Clone, Serialize)]
pub struct Overview {
    pub now: DateTime<Utc>,
    pub active_id: String,
    pub entries: Vec<OverviewEntry>,
}

struct Applied {
    token: u64,
    set: WorkingSet,
}

pub struct MainPageManager {
    store: Arc<dyn ConfigStore>,
    blobs: Arc<dyn BlobStore>,
    clock: Arc<dyn Clock>,
    working: RwLock<Applied>,
    next_token: AtomicU64,
    /// Serializes lazy creation of the default document
    default_guard: Mutex<()>,
    displayed: watch::Sender<MainPageConfig>,
}

impl MainPageManager {
    /// Starts out showing the hardcoded default; call [`load`](Self::load) to fetch.
    pub fn new(store: Arc<dyn ConfigStore>, blobs: Arc<dyn BlobStore>, clock: Arc<dyn Clock>) -> Self {
        let set = WorkingSet::fallback(clock.now());
        let (displayed, _) = watch::channel(set.default.clone());
        Self {
            store,
            blobs,
            clock,
            working: RwLock::new(Applied { token: 0, set }),
            next_token: AtomicU64::new(0),
            default_guard: Mutex::new(()),
            displayed,
        }
    }

    /// The configuration currently on display.
    pub fn displayed(&self) -> MainPageConfig {
        self.displayed.borrow().clone()
    }

    /// Render target for the presentation layer; changes whenever the selection does.
    pub fn subscribe(&self) -> watch::Receiver<MainPageConfig> {
        self.displayed.subscribe()
    }

    pub async fn working_set(&self) -> WorkingSet {
        self.working.read().await.set.clone()
    }

    pub async fn overview(&self) -> Overview {
        let now = self.clock.now();
        let working = self.working.read().await;
        let active_id = working.set.select(now).id.clone();
        let entries = std::iter::once(&working.set.default)
            .chain(working.set.scheduled.iter())
            .map(|config| OverviewEntry {
                config: config.clone(),
                state: config.window_state(now),
            })
            .collect();
        Overview { now, active_id, entries }
    }

    /// Re-fetches every configuration and re-runs selection.
    ///
    /// Never fails: if the store cannot be read the working set becomes the
    /// hardcoded default alone, so no stale schedule stays on display.
    pub async fn load(&self) -> WorkingSet {
        let token = self.next_token.fetch_add(1, Ordering::SeqCst) + 1;

        let fetched = match self.fetch_working_set().await {
            Ok(set) => set,
            Err(err) => {
                log::error!("Failed to load main page configurations, showing the built-in default: {err:#}");
                WorkingSet::fallback(self.clock.now())
            }
        };

        let mut working = self.working.write().await;
        if token > working.token {
            working.token = token;
            working.set = fetched;
        } else {
            log::debug!("Discarding stale main page load #{token}; #{} is newer", working.token);
        }

        // Publishing under the write lock keeps the display in load order.
        let selected = working.set.select(self.clock.now());
        self.displayed.send_if_modified(|current| {
            if *current != *selected {
                *current = selected.clone();
                true
            } else {
                false
            }
        });
        working.set.clone()
    }

    async fn fetch_working_set(&self) -> anyhow::Result<WorkingSet> {
        if let (Some(default), scheduled) = partition(self.store.list_configs().await?) {
            return Ok(WorkingSet { default, scheduled });
        }

        let _guard = self.default_guard.lock().await;
        // A concurrent load may have created it while we waited.
        let (default, scheduled) = partition(self.store.list_configs().await?);
        let default = match default {
            Some(default) => default,
            None => {
                log::info!("No default main page configuration found, creating one");
                match self.store.create_config(ConfigDraft::default_config()).await {
                    Ok(created) => created,
                    Err(err) => {
                        log::error!("Failed to create default main page configuration: {err:#}");
                        MainPageConfig::fallback(self.clock.now())
                    }
                }
            }
        };
        Ok(WorkingSet { default, scheduled })
    }

    /// One refresh tick: re-select against the in-memory working set.
    ///
    /// Returns true when the displayed configuration changed (by identifier).
    pub async fn refresh_now(&self) -> bool {
        let now = self.clock.now();
        let working = self.working.read().await;
        let selected = working.set.select(now);
        let changed = self.displayed.send_if_modified(|current| {
            if current.id != selected.id {
                *current = selected.clone();
                true
            } else {
                false
            }
        });
        if changed {
            log::info!("Main page now showing configuration {}", selected.id);
        }
        changed
    }

    /// Spawns the periodic refresh. The task stops when the returned handle is
    /// cancelled or dropped, or when the manager itself is dropped.
    pub fn spawn_refresh(self: &Arc<Self>, period: Duration) -> RefreshHandle {
        let period = period.max(Duration::from_secs(1));
        let manager = Arc::downgrade(self);
        let (cancel_tx, mut cancel_rx) = oneshot::channel::<()>();

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately; `load` already selected.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = &mut cancel_rx => break,
                    _ = ticker.tick() => {
                        let Some(manager) = manager.upgrade() else { break };
                        if AssertUnwindSafe(manager.refresh_now()).catch_unwind().await.is_err() {
                            log::error!("Main page refresh tick panicked; will retry next tick");
                        }
                    }
                }
            }
            log::debug!("Main page refresh task stopped");
        });

        RefreshHandle {
            cancel: Some(cancel_tx),
            task: Some(task),
        }
    }

    /// Creates a scheduled configuration, then attaches its image if one was given.
    pub async fn create(&self, request: ScheduleRequest, image: Option<ImageUpload>) -> Result<SavedConfig> {
        let subtitle = required_subtitle(&request.subtitle)?;
        let (start, end) = validate_window(request.starts_at, request.ends_at)?;
        let overlaps = {
            let working = self.working.read().await;
            overlapping_ids(start, end, &working.set.scheduled, None)
        };

        let draft = ConfigDraft {
            subtitle,
            background_image_url: String::new(),
            starts_at: Some(start),
            ends_at: Some(end),
            is_default: false,
        };
        let mut config = self.store.create_config(draft).await.map_err(write_failure("create"))?;

        if let Some(image) = image {
            match self.replace_image(&config.id, ConfigPatch::default(), image, "").await {
                Ok(updated) => config = updated,
                Err(err) => {
                    if let Err(cleanup) = self.store.delete_config(&config.id).await {
                        log::warn!("Could not roll back configuration {}: {cleanup:#}", config.id);
                    }
                    return Err(err);
                }
            }
        }

        if !overlaps.is_empty() {
            log::warn!("Configuration {} overlaps {:?}; newest wins", config.id, overlaps);
        }
        self.load().await;
        Ok(SavedConfig { config, overlaps })
    }

    /// Edits subtitle, window and/or image. The default's window cannot be set.
    pub async fn update(&self, id: &str, edit: ConfigEdit, image: Option<ImageUpload>) -> Result<SavedConfig> {
        let current = self
            .store
            .get_config(id)
            .await?
            .ok_or_else(|| not_found(id))?;

        let mut patch = ConfigPatch::default();
        if let Some(subtitle) = &edit.subtitle {
            patch.subtitle = Some(required_subtitle(subtitle)?);
        }

        let mut overlaps = Vec::new();
        if edit.starts_at.is_some() || edit.ends_at.is_some() {
            if current.is_default {
                return Err(AppError::ValidationError(
                    "the default configuration has no schedule".into(),
                ));
            }
            let (start, end) = validate_window(
                edit.starts_at.or(current.starts_at),
                edit.ends_at.or(current.ends_at),
            )?;
            let working = self.working.read().await;
            overlaps = overlapping_ids(start, end, &working.set.scheduled, Some(id));
            patch.window = Some((start, end));
        }

        let config = match image {
            Some(image) => {
                let updated = self
                    .replace_image(id, patch, image, &current.background_image_url)
                    .await?;
                // Identical bytes map to the same URL in content-addressed stores.
                if updated.background_image_url != current.background_image_url {
                    if let ImageCleanup::Failed(reason) = self.remove_image(&current.background_image_url).await {
                        log::warn!("Old image of configuration {id} left in storage: {reason}");
                    }
                }
                updated
            }
            None => self
                .store
                .update_config(id, patch)
                .await
                .map_err(write_failure("update"))?
                .ok_or_else(|| not_found(id))?,
        };

        self.load().await;
        Ok(SavedConfig { config, overlaps })
    }

    /// Deletes the document, then best-effort deletes its image.
    pub async fn delete(&self, id: &str) -> Result<DeleteReport> {
        let current = self
            .store
            .get_config(id)
            .await?
            .ok_or_else(|| not_found(id))?;
        if current.is_default {
            return Err(AppError::ValidationError(
                "the default configuration cannot be deleted".into(),
            ));
        }

        if !self.store.delete_config(id).await.map_err(write_failure("delete"))? {
            return Err(not_found(id));
        }

        let image = self.remove_image(&current.background_image_url).await;
        if let ImageCleanup::Failed(reason) = &image {
            log::warn!("Configuration {id} deleted but its image was not: {reason}");
        }

        self.load().await;
        Ok(DeleteReport {
            id: id.to_string(),
            image,
        })
    }

    /// Uploads first, then points the document at the new blob. A failed
    /// document write discards the fresh blob unless it is still `previous`.
    async fn replace_image(
        &self,
        id: &str,
        mut patch: ConfigPatch,
        image: ImageUpload,
        previous: &str,
    ) -> Result<MainPageConfig> {
        let url = self
            .blobs
            .upload(&image_namespace(id), image.data, &image.content_type)
            .await
            .map_err(write_failure("upload image for"))?;
        patch.background_image_url = Some(url.clone());

        let outcome = self.store.update_config(id, patch).await;
        let failure = match outcome {
            Ok(Some(config)) => return Ok(config),
            Ok(None) => not_found(id),
            Err(err) => write_failure("update")(err),
        };
        if url != previous {
            if let ImageCleanup::Failed(reason) = self.remove_image(&url).await {
                log::warn!("Orphaned upload {url}: {reason}");
            }
        }
        Err(failure)
    }

    async fn remove_image(&self, url: &str) -> ImageCleanup {
        if url.is_empty() || url == FALLBACK_BACKGROUND_URL {
            return ImageCleanup::NoImage;
        }
        match self.blobs.delete_by_url(url).await {
            Ok(()) => ImageCleanup::Deleted,
            Err(err) => ImageCleanup::Failed(format!("{err:#}")),
        }
    }
}

/// Disposer for the refresh task started by [`MainPageManager::spawn_refresh`].
#[must_use = "dropping the handle stops the refresh task"]
pub struct RefreshHandle {
    cancel: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl RefreshHandle {
    /// Stops the task and waits for it to exit.
    pub async fn cancel(mut self) {
        if let Some(cancel) = self.cancel.take() {
            let _ = cancel.send(());
        }
        if let Some(task) = self.task.take() {
            if let Err(err) = task.await {
                log::warn!("Main page refresh task ended abnormally: {err}");
            }
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, |task| task.is_finished())
    }
}

/// Blob namespace for a configuration's images.
pub fn image_namespace(id: &str) -> String {
    format!("main-page/{id}")
}

fn required_subtitle(subtitle: &str) -> Result<String> {
    let subtitle = subtitle.trim();
    if subtitle.is_empty() {
        return Err(AppError::ValidationError("subtitle is required".into()));
    }
    Ok(subtitle.to_string())
}

fn not_found(id: &str) -> AppError {
    AppError::NotFound("main page configuration".into(), id.to_string())
}

fn write_failure(action: &'static str) -> impl Fn(anyhow::Error) -> AppError {
    move |err| {
        log::error!("Failed to {action} main page configuration: {err:#}");
        AppError::from(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ManualClock, MemoryBlobStore, MemoryConfigStore};
    use crate::traits::MockConfigStore;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use tokio::sync::Notify;

    fn day(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
    }

    struct Harness {
        store: Arc<MemoryConfigStore>,
        blobs: Arc<MemoryBlobStore>,
        clock: Arc<ManualClock>,
        manager: Arc<MainPageManager>,
    }

    fn harness(now: DateTime<Utc>) -> Harness {
        let store = Arc::new(MemoryConfigStore::new());
        let blobs = Arc::new(MemoryBlobStore::new());
        let clock = Arc::new(ManualClock::new(now));
        let manager = Arc::new(MainPageManager::new(store.clone(), blobs.clone(), clock.clone()));
        Harness { store, blobs, clock, manager }
    }

    fn january(subtitle: &str) -> ScheduleRequest {
        ScheduleRequest {
            subtitle: subtitle.to_string(),
            starts_at: Some(day(2025, 1, 1)),
            ends_at: Some(day(2025, 1, 31)),
        }
    }

    fn png() -> ImageUpload {
        ImageUpload {
            data: vec![0x89, b'P', b'N', b'G'],
            content_type: "image/png".into(),
        }
    }

    #[tokio::test]
    async fn first_load_creates_the_default() {
        let h = harness(day(2025, 1, 15));
        let set = h.manager.load().await;

        assert!(set.scheduled.is_empty());
        assert!(set.default.is_default);
        assert_eq!(h.store.snapshot().len(), 1);
        assert_eq!(h.manager.displayed().id, set.default.id);

        // A second load reuses it.
        h.manager.load().await;
        assert_eq!(h.store.snapshot().len(), 1);
    }

    #[tokio::test]
    async fn unreachable_store_falls_back_to_builtin_default() {
        let h = harness(day(2025, 1, 15));
        h.store.fail_reads(true);

        let set = h.manager.load().await;
        assert_eq!(set.default.id, crate::models::FALLBACK_CONFIG_ID);
        assert_eq!(h.manager.displayed().subtitle, crate::models::FALLBACK_SUBTITLE);
    }

    #[tokio::test]
    async fn fetch_failure_after_a_good_load_drops_the_schedule() {
        let h = harness(day(2025, 1, 15));
        h.manager.load().await;
        let saved = h.manager.create(january("Winter festival"), None).await.unwrap();
        assert_eq!(h.manager.displayed().id, saved.config.id);

        h.store.fail_reads(true);
        let set = h.manager.load().await;

        assert_eq!(set.default.id, crate::models::FALLBACK_CONFIG_ID);
        assert!(set.scheduled.is_empty());
        assert_eq!(h.manager.displayed().id, crate::models::FALLBACK_CONFIG_ID);

        // The store comes back and the schedule with it.
        h.store.fail_reads(false);
        h.manager.load().await;
        assert_eq!(h.manager.displayed().id, saved.config.id);
    }

    /// Yields on every call so concurrent loads interleave.
    struct YieldingStore {
        inner: MemoryConfigStore,
    }

    #[async_trait]
    impl ConfigStore for YieldingStore {
        async fn list_configs(&self) -> anyhow::Result<Vec<MainPageConfig>> {
            tokio::task::yield_now().await;
            self.inner.list_configs().await
        }
        async fn get_config(&self, id: &str) -> anyhow::Result<Option<MainPageConfig>> {
            self.inner.get_config(id).await
        }
        async fn create_config(&self, draft: ConfigDraft) -> anyhow::Result<MainPageConfig> {
            tokio::task::yield_now().await;
            self.inner.create_config(draft).await
        }
        async fn update_config(&self, id: &str, patch: ConfigPatch) -> anyhow::Result<Option<MainPageConfig>> {
            self.inner.update_config(id, patch).await
        }
        async fn delete_config(&self, id: &str) -> anyhow::Result<bool> {
            self.inner.delete_config(id).await
        }
    }

    #[tokio::test]
    async fn concurrent_first_loads_create_one_default() {
        let store = Arc::new(YieldingStore {
            inner: MemoryConfigStore::new(),
        });
        let manager = MainPageManager::new(
            store.clone(),
            Arc::new(MemoryBlobStore::new()),
            Arc::new(ManualClock::at_ymd(2025, 1, 15)),
        );

        let (first, second) = tokio::join!(manager.load(), manager.load());

        let defaults: Vec<_> = store.inner.snapshot().into_iter().filter(|c| c.is_default).collect();
        assert_eq!(defaults.len(), 1);
        assert_eq!(first.default.id, defaults[0].id);
        assert_eq!(second.default.id, defaults[0].id);
    }

    #[tokio::test]
    async fn failed_default_creation_still_yields_a_default() {
        let mut store = MockConfigStore::new();
        store.expect_list_configs().returning(|| Ok(Vec::new()));
        store
            .expect_create_config()
            .returning(|_| Err(anyhow::anyhow!("quota exceeded")));

        let manager = MainPageManager::new(
            Arc::new(store),
            Arc::new(MemoryBlobStore::new()),
            Arc::new(ManualClock::at_ymd(2025, 1, 15)),
        );
        let set = manager.load().await;
        assert_eq!(set.default.id, crate::models::FALLBACK_CONFIG_ID);
    }

    #[tokio::test]
    async fn create_selects_new_config_and_stores_image() {
        let h = harness(day(2025, 1, 15));
        h.manager.load().await;

        let saved = h.manager.create(january("Winter festival"), Some(png())).await.unwrap();
        assert!(saved.overlaps.is_empty());
        assert!(saved.config.background_image_url.starts_with(&format!("memory://main-page/{}", saved.config.id)));
        assert!(h.blobs.contains(&saved.config.background_image_url));
        assert_eq!(h.manager.displayed().id, saved.config.id);
    }

    #[tokio::test]
    async fn create_rejects_inverted_window_without_touching_state() {
        let h = harness(day(2025, 1, 15));
        let before = h.manager.load().await;

        let err = h
            .manager
            .create(
                ScheduleRequest {
                    subtitle: "Backwards".into(),
                    starts_at: Some(day(2025, 2, 1)),
                    ends_at: Some(day(2025, 1, 1)),
                },
                None,
            )
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::ValidationError(_)));
        assert_eq!(h.manager.working_set().await, before);
    }

    #[tokio::test]
    async fn failed_upload_rolls_back_the_document() {
        let h = harness(day(2025, 1, 15));
        let before = h.manager.load().await;
        h.blobs.fail_uploads(true);

        let err = h.manager.create(january("No image"), Some(png())).await.unwrap_err();
        assert!(matches!(err, AppError::Internal(_)));
        assert_eq!(h.store.snapshot().len(), 1);
        assert_eq!(h.manager.working_set().await, before);
    }

    #[tokio::test]
    async fn store_write_failure_is_surfaced() {
        let h = harness(day(2025, 1, 15));
        let before = h.manager.load().await;
        h.store.fail_writes(true);

        let err = h.manager.create(january("Rejected"), None).await.unwrap_err();
        assert!(matches!(err, AppError::Internal(_)));
        assert_eq!(h.manager.working_set().await, before);
    }

    #[tokio::test]
    async fn overlapping_create_reports_and_newest_wins() {
        let h = harness(day(2025, 1, 15));
        h.manager.load().await;

        let first = h.manager.create(january("First"), None).await.unwrap();
        let second = h
            .manager
            .create(
                ScheduleRequest {
                    subtitle: "Second".into(),
                    starts_at: Some(day(2025, 1, 10)),
                    ends_at: Some(day(2025, 1, 20)),
                },
                None,
            )
            .await
            .unwrap();

        assert_eq!(second.overlaps, vec![first.config.id.clone()]);
        assert_eq!(h.manager.displayed().id, second.config.id);
    }

    #[tokio::test]
    async fn update_replaces_image_and_removes_old_blob() {
        let h = harness(day(2025, 1, 15));
        h.manager.load().await;
        let saved = h.manager.create(january("Festival"), Some(png())).await.unwrap();
        let old_url = saved.config.background_image_url.clone();

        let edit = ConfigEdit {
            subtitle: Some("Festival, day two".into()),
            ..Default::default()
        };
        let updated = h.manager.update(&saved.config.id, edit, Some(png())).await.unwrap();

        assert_ne!(updated.config.background_image_url, old_url);
        assert!(!h.blobs.contains(&old_url));
        assert!(h.blobs.contains(&updated.config.background_image_url));
        assert_eq!(h.manager.displayed().subtitle, "Festival, day two");
    }

    #[tokio::test]
    async fn default_window_cannot_be_edited_or_deleted() {
        let h = harness(day(2025, 1, 15));
        let set = h.manager.load().await;
        let id = set.default.id.clone();

        let edit = ConfigEdit {
            starts_at: Some(day(2025, 1, 1)),
            ..Default::default()
        };
        assert!(matches!(h.manager.update(&id, edit, None).await, Err(AppError::ValidationError(_))));
        assert!(matches!(h.manager.delete(&id).await, Err(AppError::ValidationError(_))));

        let renamed = ConfigEdit {
            subtitle: Some("Welcome".into()),
            ..Default::default()
        };
        assert_eq!(h.manager.update(&id, renamed, None).await.unwrap().config.subtitle, "Welcome");
    }

    #[tokio::test]
    async fn delete_reports_image_cleanup_failure() {
        let h = harness(day(2025, 1, 15));
        h.manager.load().await;
        let saved = h.manager.create(january("Short lived"), Some(png())).await.unwrap();
        h.blobs.fail_deletes(true);

        let report = h.manager.delete(&saved.config.id).await.unwrap();
        assert!(matches!(report.image, ImageCleanup::Failed(_)));
        assert!(h.store.snapshot().iter().all(|c| c.id != saved.config.id));
        assert!(h.manager.displayed().is_default);
    }

    #[tokio::test]
    async fn delete_unknown_id_is_not_found() {
        let h = harness(day(2025, 1, 15));
        h.manager.load().await;
        assert!(matches!(h.manager.delete("missing").await, Err(AppError::NotFound(_, _))));
    }

    #[tokio::test]
    async fn refresh_only_publishes_on_change() {
        let h = harness(day(2024, 12, 30));
        h.manager.load().await;
        let saved = h.manager.create(january("January"), None).await.unwrap();
        assert!(h.manager.displayed().is_default);

        assert!(!h.manager.refresh_now().await);
        h.clock.set(day(2025, 1, 1));
        assert!(h.manager.refresh_now().await);
        assert_eq!(h.manager.displayed().id, saved.config.id);
        assert!(!h.manager.refresh_now().await);

        h.clock.set(day(2025, 2, 1));
        assert!(h.manager.refresh_now().await);
        assert!(h.manager.displayed().is_default);
    }

    #[tokio::test(start_paused = true)]
    async fn refresh_task_tracks_the_clock_until_cancelled() {
        let h = harness(day(2024, 12, 31));
        h.manager.load().await;
        let saved = h.manager.create(january("January"), None).await.unwrap();
        let mut displayed = h.manager.subscribe();
        displayed.borrow_and_update();

        let handle = h.manager.spawn_refresh(DEFAULT_REFRESH_INTERVAL);
        h.clock.set(day(2025, 1, 2));

        tokio::time::timeout(Duration::from_secs(120), displayed.changed())
            .await
            .expect("refresh tick should fire")
            .unwrap();
        assert_eq!(displayed.borrow_and_update().id, saved.config.id);

        handle.cancel().await;
        h.clock.set(day(2025, 3, 1));
        tokio::time::sleep(Duration::from_secs(300)).await;
        assert!(!displayed.has_changed().unwrap());
    }

    /// Panics on the call numbered `panic_on`, otherwise defers to a manual clock.
    struct FlakyClock {
        inner: ManualClock,
        calls: std::sync::atomic::AtomicUsize,
        panic_on: std::sync::atomic::AtomicUsize,
    }

    impl Clock for FlakyClock {
        fn now(&self) -> DateTime<Utc> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call == self.panic_on.load(Ordering::SeqCst) {
                panic!("clock source unavailable");
            }
            self.inner.now()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn refresh_survives_a_panicking_tick() {
        let clock = Arc::new(FlakyClock {
            inner: ManualClock::new(day(2024, 12, 31)),
            calls: std::sync::atomic::AtomicUsize::new(0),
            panic_on: std::sync::atomic::AtomicUsize::new(usize::MAX),
        });
        let manager = Arc::new(MainPageManager::new(
            Arc::new(MemoryConfigStore::new()),
            Arc::new(MemoryBlobStore::new()),
            clock.clone(),
        ));
        manager.load().await;
        let saved = manager.create(january("January"), None).await.unwrap();
        let mut displayed = manager.subscribe();
        displayed.borrow_and_update();

        // The very next clock read, made by the first tick, panics.
        let next = clock.calls.load(Ordering::SeqCst) + 1;
        clock.panic_on.store(next, Ordering::SeqCst);
        clock.inner.set(day(2025, 1, 2));

        let handle = manager.spawn_refresh(DEFAULT_REFRESH_INTERVAL);
        tokio::time::sleep(DEFAULT_REFRESH_INTERVAL + Duration::from_secs(1)).await;
        assert!(clock.calls.load(Ordering::SeqCst) >= next, "first tick should have run");
        assert!(!displayed.has_changed().unwrap());
        assert!(!handle.is_finished());

        tokio::time::timeout(Duration::from_secs(120), displayed.changed())
            .await
            .expect("a later tick should still fire")
            .unwrap();
        assert_eq!(displayed.borrow_and_update().id, saved.config.id);

        handle.cancel().await;
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_the_handle_stops_the_task() {
        let h = harness(day(2025, 1, 15));
        h.manager.load().await;
        let handle = h.manager.spawn_refresh(DEFAULT_REFRESH_INTERVAL);
        let task = handle.task.as_ref().unwrap().abort_handle();
        drop(handle);

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(task.is_finished());
    }

    /// Holds the first listing until released, so a later load can overtake it.
    struct GatedStore {
        inner: MemoryConfigStore,
        entered: Notify,
        gate: std::sync::Mutex<Option<oneshot::Receiver<()>>>,
    }

    #[async_trait]
    impl ConfigStore for GatedStore {
        async fn list_configs(&self) -> anyhow::Result<Vec<MainPageConfig>> {
            let listed = self.inner.list_configs().await;
            let gate = self.gate.lock().unwrap().take();
            if let Some(gate) = gate {
                self.entered.notify_one();
                let _ = gate.await;
            }
            listed
        }
        async fn get_config(&self, id: &str) -> anyhow::Result<Option<MainPageConfig>> {
            self.inner.get_config(id).await
        }
        async fn create_config(&self, draft: ConfigDraft) -> anyhow::Result<MainPageConfig> {
            self.inner.create_config(draft).await
        }
        async fn update_config(&self, id: &str, patch: ConfigPatch) -> anyhow::Result<Option<MainPageConfig>> {
            self.inner.update_config(id, patch).await
        }
        async fn delete_config(&self, id: &str) -> anyhow::Result<bool> {
            self.inner.delete_config(id).await
        }
    }

    #[tokio::test]
    async fn stale_load_does_not_overwrite_newer_one() {
        let inner = MemoryConfigStore::new();
        inner.seed(MainPageConfig {
            id: "default".into(),
            ..MainPageConfig::fallback(day(2024, 1, 1))
        });
        let (release, gate) = oneshot::channel();
        let store = Arc::new(GatedStore {
            inner,
            entered: Notify::new(),
            gate: std::sync::Mutex::new(Some(gate)),
        });
        let manager = Arc::new(MainPageManager::new(
            store.clone(),
            Arc::new(MemoryBlobStore::new()),
            Arc::new(ManualClock::at_ymd(2025, 1, 15)),
        ));

        let slow = tokio::spawn({
            let manager = manager.clone();
            async move { manager.load().await }
        });
        store.entered.notified().await;

        store
            .inner
            .create_config(ConfigDraft {
                subtitle: "Fresh".into(),
                starts_at: Some(day(2025, 1, 1)),
                ends_at: Some(day(2025, 1, 31)),
                ..Default::default()
            })
            .await
            .unwrap();
        let fresh = manager.load().await;
        assert_eq!(fresh.scheduled.len(), 1);

        release.send(()).unwrap();
        slow.await.unwrap();

        assert_eq!(manager.working_set().await.scheduled.len(), 1);
        assert_eq!(manager.displayed().subtitle, "Fresh");
    }
}
