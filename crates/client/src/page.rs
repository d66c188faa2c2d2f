//! The beacon's view of the hosting page.
//!
//! Hosts implement [`PageContext`] over whatever document model they have.
//! [`StaticPage`] is a settable implementation for headless hosts and tests.

use std::sync::RwLock;

use beacon_common::{PerformanceTimings, ScreenInfo, Viewport};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReadyState {
    Loading,
    Interactive,
    #[default]
    Complete,
}

impl ReadyState {
    /// True once listeners may be attached.
    pub fn is_interactive(self) -> bool {
        !matches!(self, ReadyState::Loading)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NavigatorInfo {
    pub user_agent: String,
    pub language: String,
    pub cookies_enabled: bool,
    pub online: bool,
}

/// Raw navigation timestamps (epoch millis) as the host reports them.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct NavigationTiming {
    pub navigation_start: i64,
    pub dom_content_loaded_event_end: i64,
    pub load_event_end: i64,
    /// Start time of the first paint entry, relative to navigation start.
    pub first_paint: Option<f64>,
}

impl NavigationTiming {
    pub fn timings(&self) -> PerformanceTimings {
        PerformanceTimings {
            load_time: self.load_event_end - self.navigation_start,
            dom_ready: self.dom_content_loaded_event_end - self.navigation_start,
            first_paint: self.first_paint.unwrap_or(0.0),
        }
    }
}

pub trait PageContext: Send + Sync {
    fn url(&self) -> String;
    fn title(&self) -> String;
    fn referrer(&self) -> String;
    fn navigator(&self) -> NavigatorInfo;
    fn screen(&self) -> ScreenInfo;
    fn viewport(&self) -> Viewport;
    fn timezone(&self) -> String;
    fn navigation_timing(&self) -> NavigationTiming;
    fn ready_state(&self) -> ReadyState;
}

#[derive(Debug, Clone, Default)]
pub struct PageSnapshot {
    pub url: String,
    pub title: String,
    pub referrer: String,
    pub navigator: NavigatorInfo,
    pub screen: ScreenInfo,
    pub viewport: Viewport,
    pub timezone: String,
    pub timing: NavigationTiming,
    pub ready_state: ReadyState,
}

#[derive(Debug, Default)]
pub struct StaticPage {
    snapshot: RwLock<PageSnapshot>,
}

impl StaticPage {
    pub fn new(snapshot: PageSnapshot) -> Self {
        Self {
            snapshot: RwLock::new(snapshot),
        }
    }

    pub fn update(&self, change: impl FnOnce(&mut PageSnapshot)) {
        let mut guard = self
            .snapshot
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        change(&mut guard);
    }

    fn read<T>(&self, field: impl FnOnce(&PageSnapshot) -> T) -> T {
        let guard = self
            .snapshot
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        field(&guard)
    }
}

impl PageContext for StaticPage {
    fn url(&self) -> String {
        self.read(|page| page.url.clone())
    }

    fn title(&self) -> String {
        self.read(|page| page.title.clone())
    }

    fn referrer(&self) -> String {
        self.read(|page| page.referrer.clone())
    }

    fn navigator(&self) -> NavigatorInfo {
        self.read(|page| page.navigator.clone())
    }

    fn screen(&self) -> ScreenInfo {
        self.read(|page| page.screen)
    }

    fn viewport(&self) -> Viewport {
        self.read(|page| page.viewport)
    }

    fn timezone(&self) -> String {
        self.read(|page| page.timezone.clone())
    }

    fn navigation_timing(&self) -> NavigationTiming {
        self.read(|page| page.timing)
    }

    fn ready_state(&self) -> ReadyState {
        self.read(|page| page.ready_state)
    }
}
