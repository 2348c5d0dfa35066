//! # Active-Configuration Selection
//!
//! Decides which main-page configuration is displayed at a given instant.
//! Everything here is pure: the caller supplies `now`, nothing is fetched or mutated.
//!
//! Rules:
//! - a scheduled configuration is active when `starts_at <= now <= ends_at` (inclusive both ends)
//! - the scheduled list is scanned in the order supplied; the first active entry wins
//! - a configuration with a missing or inverted window never matches
//! - when nothing matches, the default is returned

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::{AppError, Result};
use crate::models::MainPageConfig;

/// Derived (never stored) lifecycle position of a configuration at some instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowState {
    /// The always-eligible fallback
    Default,
    /// Window opens in the future
    Scheduled,
    Active,
    Expired,
    /// Missing, unparseable, or inverted window; excluded from selection
    Invalid,
}

impl WindowState {
    pub fn as_str(&self) -> &'static str {
        match self {
            WindowState::Default => "default",
            WindowState::Scheduled => "scheduled",
            WindowState::Active => "active",
            WindowState::Expired => "expired",
            WindowState::Invalid => "invalid",
        }
    }
}

impl MainPageConfig {
    /// Where this configuration sits relative to `now`.
    pub fn window_state(&self, now: DateTime<Utc>) -> WindowState {
        if self.is_default {
            return WindowState::Default;
        }
        match (self.starts_at, self.ends_at) {
            (Some(start), Some(end)) if start <= end => {
                if now < start {
                    WindowState::Scheduled
                } else if now > end {
                    WindowState::Expired
                } else {
                    WindowState::Active
                }
            }
            _ => WindowState::Invalid,
        }
    }

    /// True when this scheduled configuration may be displayed at `now`.
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.window_state(now) == WindowState::Active
    }
}

/// Returns the configuration to display at `now`.
///
/// Ties between overlapping windows go to whichever comes first in
/// `scheduled`; with the store's newest-first ordering that is the most
/// recently created configuration.
pub fn select_active<'a>(
    now: DateTime<Utc>,
    default: &'a MainPageConfig,
    scheduled: &'a [MainPageConfig],
) -> &'a MainPageConfig {
    scheduled
        .iter()
        .find(|config| config.is_active_at(now))
        .unwrap_or(default)
}

/// Checks the window of a scheduled configuration at creation/edit time.
pub fn validate_window(starts_at: Option<DateTime<Utc>>, ends_at: Option<DateTime<Utc>>) -> Result<(DateTime<Utc>, DateTime<Utc>)> {
    match (starts_at, ends_at) {
        (Some(start), Some(end)) if start < end => Ok((start, end)),
        (Some(_), Some(_)) => Err(AppError::ValidationError(
            "schedule start must be strictly before its end".into(),
        )),
        _ => Err(AppError::ValidationError(
            "scheduled configurations need both a start and an end".into(),
        )),
    }
}

/// Identifiers of scheduled configurations whose windows intersect `[start, end]`.
///
/// `exclude` skips the record being edited.
pub fn overlapping_ids(
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    scheduled: &[MainPageConfig],
    exclude: Option<&str>,
) -> Vec<String> {
    scheduled
        .iter()
        .filter(|config| Some(config.id.as_str()) != exclude)
        .filter(|config| match (config.starts_at, config.ends_at) {
            (Some(other_start), Some(other_end)) if other_start <= other_end => {
                start <= other_end && other_start <= end
            }
            _ => false,
        })
        .map(|config| config.id.clone())
        .collect()
}
