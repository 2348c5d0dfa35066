//! # cb-ui
//!
//! Askama templates and the view models they render.

pub mod help;

use askama::Template;
use cb_core::main_page::Overview;
use cb_core::models::MainPageConfig;
use cb_core::schedule::WindowState;
use chrono::{DateTime, Utc};

/// Shown in the page title and hero heading.
pub const ORGANIZATION: &str = "Civic Relations Office";

#[derive(Template)]
#[template(path = "main_page.html")]
pub struct MainPageTemplate<'a> {
    pub title: &'a str,
    pub organization: &'a str,
    pub subtitle: &'a str,
    pub background_url: &'a str,
}

impl<'a> MainPageTemplate<'a> {
    pub fn for_config(config: &'a MainPageConfig) -> Self {
        Self {
            title: ORGANIZATION,
            organization: ORGANIZATION,
            subtitle: &config.subtitle,
            background_url: &config.background_image_url,
        }
    }
}

/// One line of the admin overview table.
pub struct ConfigRow {
    pub id: String,
    pub subtitle: String,
    pub window: String,
    pub state: &'static str,
    pub is_active: bool,
    pub has_thumbnail: bool,
    pub thumbnail_url: String,
}

impl ConfigRow {
    pub fn new(config: &MainPageConfig, state: WindowState, is_active: bool, thumbnail_url: Option<String>) -> Self {
        Self {
            id: config.id.clone(),
            subtitle: config.subtitle.clone(),
            window: describe_window(config),
            state: state.as_str(),
            is_active,
            has_thumbnail: thumbnail_url.is_some(),
            thumbnail_url: thumbnail_url.unwrap_or_default(),
        }
    }
}

fn describe_window(config: &MainPageConfig) -> String {
    if config.is_default {
        return "always (fallback)".to_string();
    }
    match (config.starts_at, config.ends_at) {
        (Some(start), Some(end)) => format!("{} to {}", short(start), short(end)),
        _ => "unreadable schedule".to_string(),
    }
}

fn short(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d %H:%M UTC").to_string()
}

#[derive(Template)]
#[template(path = "admin_main_page.html")]
pub struct AdminMainPageTemplate<'a> {
    pub title: &'a str,
    pub evaluated_at: String,
    pub refresh_secs: u64,
    pub rows: &'a [ConfigRow],
}

impl<'a> AdminMainPageTemplate<'a> {
    pub fn new(overview: &Overview, refresh_secs: u64, rows: &'a [ConfigRow]) -> Self {
        Self {
            title: "Main page - Admin",
            evaluated_at: short(overview.now),
            refresh_secs,
            rows,
        }
    }
}

pub struct HelpLink {
    pub slug: &'static str,
    pub title: &'static str,
}

#[derive(Template)]
#[template(path = "help.html")]
pub struct HelpTemplate<'a> {
    pub title: &'a str,
    pub heading: &'a str,
    pub links: Vec<HelpLink>,
    /// Output of [`help::render_markdown`]; already escaped
    pub body_html: &'a str,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn config() -> MainPageConfig {
        let created = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        MainPageConfig {
            id: "A".into(),
            subtitle: "Peace & <dialogue>".into(),
            background_image_url: "/static/uploads/main-page/A/abc.png".into(),
            starts_at: Some(created),
            ends_at: Some(Utc.with_ymd_and_hms(2025, 1, 31, 0, 0, 0).unwrap()),
            is_default: false,
            created_at: created,
            updated_at: created,
        }
    }

    #[test]
    fn test_main_page_escapes_subtitle() {
        let config = config();
        let html = MainPageTemplate::for_config(&config).render().unwrap();
        assert!(html.contains("Peace &amp; &lt;dialogue&gt;"));
        assert!(html.contains(ORGANIZATION));
    }

    #[test]
    fn test_admin_rows_describe_windows() {
        let config = config();
        let rows = vec![ConfigRow::new(&config, WindowState::Active, true, None)];
        assert_eq!(rows[0].window, "2025-01-01 00:00 UTC to 2025-01-31 00:00 UTC");

        let overview = Overview {
            now: Utc.with_ymd_and_hms(2025, 1, 15, 0, 0, 0).unwrap(),
            active_id: "A".into(),
            entries: Vec::new(),
        };
        let html = AdminMainPageTemplate::new(&overview, 60, &rows).render().unwrap();
        assert!(html.contains("active (showing)"));
        assert!(html.contains("every 60 seconds"));
    }
}
