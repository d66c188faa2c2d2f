//! Page-level listeners: clicks, scroll depth, form submits, visibility and
//! unload. The host forwards raw [`PageEvent`]s; [`PageListeners`] decides
//! what gets tracked.

use serde_json::{json, Map, Value};

use crate::{
    config::BeaconConfig,
    tracker::{data, Tracker},
    transport::DeliveryOutcome,
};

pub const CLICK: &str = "click";
pub const SCROLL_DEPTH: &str = "scroll_depth";
pub const FORM_SUBMIT: &str = "form_submit";
pub const TIME_ON_PAGE: &str = "time_on_page";
pub const PAGE_VISIBLE: &str = "page_visible";
pub const PAGE_EXIT: &str = "page_exit";

#[derive(Debug, Clone, PartialEq)]
pub enum PageEvent {
    Click(ClickTarget),
    Scroll(ScrollPosition),
    Submit(FormTarget),
    VisibilityChange { hidden: bool },
    BeforeUnload,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ClickTarget {
    /// Element tag name as the document reports it, e.g. `A` or `BUTTON`.
    pub tag: String,
    pub text: Option<String>,
    pub href: Option<String>,
}

impl ClickTarget {
    fn is_tracked(&self) -> bool {
        self.tag.eq_ignore_ascii_case("a") || self.tag.eq_ignore_ascii_case("button")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ScrollPosition {
    pub scroll_y: f64,
    pub scroll_height: f64,
    pub viewport_height: f64,
}

impl ScrollPosition {
    /// Rounded percentage of the scrollable range, clamped to 0..=100.
    /// `None` when the page cannot scroll.
    pub fn percent(&self) -> Option<u32> {
        let scrollable = self.scroll_height - self.viewport_height;
        if !scrollable.is_finite() || scrollable <= 0.0 || !self.scroll_y.is_finite() {
            return None;
        }
        let percent = (self.scroll_y / scrollable * 100.0).round().clamp(0.0, 100.0);
        Some(percent as u32)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FormTarget {
    pub id: Option<String>,
    pub action: Option<String>,
}

/// Deepest threshold reached on this page load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScrollDepth {
    step: u32,
    reached: u32,
}

impl ScrollDepth {
    pub fn new(step: u32) -> Self {
        Self {
            step: step.clamp(1, 100),
            reached: 0,
        }
    }

    pub fn reached(&self) -> u32 {
        self.reached
    }

    /// Thresholds newly crossed by moving to `percent`, in ascending order.
    pub fn advance(&mut self, percent: u32) -> Vec<u32> {
        let target = (percent.min(100) / self.step) * self.step;
        if target <= self.reached {
            return Vec::new();
        }

        let crossed: Vec<u32> = (self.reached / self.step + 1..=target / self.step)
            .map(|n| n * self.step)
            .collect();
        self.reached = target;
        crossed
    }
}

pub struct PageListeners {
    scroll: ScrollDepth,
    page_start: i64,
    click_text_limit: usize,
}

impl PageListeners {
    pub fn new(config: &BeaconConfig, now: i64) -> Self {
        Self {
            scroll: ScrollDepth::new(config.scroll_step),
            page_start: now,
            click_text_limit: config.click_text_limit,
        }
    }

    pub fn scroll_depth(&self) -> u32 {
        self.scroll.reached()
    }

    pub fn handle(&mut self, tracker: &Tracker, event: PageEvent) -> Vec<DeliveryOutcome> {
        match event {
            PageEvent::Click(target) => self.on_click(tracker, target).into_iter().collect(),
            PageEvent::Scroll(position) => self.on_scroll(tracker, position),
            PageEvent::Submit(form) => vec![on_submit(tracker, form)],
            PageEvent::VisibilityChange { hidden: true } => vec![self.time_on_page(tracker)],
            PageEvent::VisibilityChange { hidden: false } => {
                self.page_start = tracker.now();
                vec![tracker.track_event(PAGE_VISIBLE, Map::new())]
            }
            PageEvent::BeforeUnload => vec![
                self.time_on_page(tracker),
                tracker.track_event(PAGE_EXIT, Map::new()),
            ],
        }
    }

    fn on_click(&self, tracker: &Tracker, target: ClickTarget) -> Option<DeliveryOutcome> {
        if !target.is_tracked() {
            return None;
        }

        let mut payload = data([("element", json!(target.tag.to_ascii_lowercase()))]);
        if let Some(text) = target.text {
            let truncated: String = text.chars().take(self.click_text_limit).collect();
            payload.insert("text".into(), Value::String(truncated));
        }
        let href = target
            .href
            .filter(|href| !href.is_empty())
            .map(Value::String)
            .unwrap_or(Value::Null);
        payload.insert("href".into(), href);

        Some(tracker.track_event(CLICK, payload))
    }

    fn on_scroll(&mut self, tracker: &Tracker, position: ScrollPosition) -> Vec<DeliveryOutcome> {
        let Some(percent) = position.percent() else {
            return Vec::new();
        };

        self.scroll
            .advance(percent)
            .into_iter()
            .map(|depth| tracker.track_event(SCROLL_DEPTH, data([("depth", json!(depth))])))
            .collect()
    }

    fn time_on_page(&self, tracker: &Tracker) -> DeliveryOutcome {
        let duration = tracker.now() - self.page_start;
        tracker.track_event(TIME_ON_PAGE, data([("duration", json!(duration))]))
    }
}

fn on_submit(tracker: &Tracker, form: FormTarget) -> DeliveryOutcome {
    let or_unknown = |value: Option<String>| {
        value
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| beacon_common::UNKNOWN.to_string())
    };
    let payload = data([
        ("formId", json!(or_unknown(form.id))),
        ("formAction", json!(or_unknown(form.action))),
    ]);
    tracker.track_event(FORM_SUBMIT, payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        clock::{Clock, ManualClock},
        page::{PageSnapshot, StaticPage},
        storage::MemoryStore,
        transport::{Delivery, MemoryTransport},
    };
    use std::{sync::Arc, time::Duration};

    fn fixture() -> (Tracker, PageListeners, Arc<MemoryTransport>, Arc<ManualClock>) {
        let transport = Arc::new(MemoryTransport::new());
        let clock = Arc::new(ManualClock::new(1_000_000));
        let config = BeaconConfig::default();
        let tracker = Tracker::new(
            config.clone(),
            Arc::new(StaticPage::new(PageSnapshot {
                url: "https://site.test/".into(),
                ..PageSnapshot::default()
            })),
            Arc::new(MemoryStore::new()),
            Delivery::new("/api/track", Some(transport.clone()), None),
            clock.clone(),
        );
        let listeners = PageListeners::new(&config, clock.now_millis());
        (tracker, listeners, transport, clock)
    }

    fn scroll_to(percent: f64) -> PageEvent {
        PageEvent::Scroll(ScrollPosition {
            scroll_y: percent * 10.0,
            scroll_height: 1_500.0,
            viewport_height: 500.0,
        })
    }

    #[test]
    fn scroll_depth_fires_each_threshold_once() {
        let mut depth = ScrollDepth::new(25);
        assert_eq!(depth.advance(10), Vec::<u32>::new());
        assert_eq!(depth.advance(40), vec![25]);
        assert_eq!(depth.advance(49), Vec::<u32>::new());
        assert_eq!(depth.advance(30), Vec::<u32>::new());
        assert_eq!(depth.advance(100), vec![50, 75, 100]);
        assert_eq!(depth.advance(100), Vec::<u32>::new());
        assert_eq!(depth.reached(), 100);
    }

    #[test]
    fn scroll_percent_handles_unscrollable_pages() {
        let flat = ScrollPosition {
            scroll_y: 0.0,
            scroll_height: 500.0,
            viewport_height: 500.0,
        };
        assert_eq!(flat.percent(), None);

        let overscrolled = ScrollPosition {
            scroll_y: 2_000.0,
            scroll_height: 1_500.0,
            viewport_height: 500.0,
        };
        assert_eq!(overscrolled.percent(), Some(100));
    }

    #[test]
    fn reaching_forty_percent_reports_only_twenty_five() {
        let (tracker, mut listeners, transport, _) = fixture();
        listeners.handle(&tracker, scroll_to(40.0));
        listeners.handle(&tracker, scroll_to(45.0));

        let records = transport.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["event"], SCROLL_DEPTH);
        assert_eq!(records[0]["data"]["depth"], 25);
        assert_eq!(listeners.scroll_depth(), 25);
    }

    #[test]
    fn clicks_on_links_and_buttons_only() {
        let (tracker, mut listeners, transport, _) = fixture();

        listeners.handle(
            &tracker,
            PageEvent::Click(ClickTarget {
                tag: "DIV".into(),
                text: Some("ignored".into()),
                href: None,
            }),
        );
        listeners.handle(
            &tracker,
            PageEvent::Click(ClickTarget {
                tag: "A".into(),
                text: Some("x".repeat(80)),
                href: Some("https://site.test/pricing".into()),
            }),
        );
        listeners.handle(
            &tracker,
            PageEvent::Click(ClickTarget {
                tag: "BUTTON".into(),
                text: None,
                href: Some(String::new()),
            }),
        );

        let records = transport.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0]["data"]["element"], "a");
        assert_eq!(records[0]["data"]["text"].as_str().unwrap().len(), 50);
        assert_eq!(records[0]["data"]["href"], "https://site.test/pricing");
        assert_eq!(records[1]["data"]["element"], "button");
        assert!(records[1]["data"].get("text").is_none());
        assert!(records[1]["data"]["href"].is_null());
    }

    #[test]
    fn click_text_truncates_on_characters() {
        let (tracker, mut listeners, transport, _) = fixture();
        listeners.handle(
            &tracker,
            PageEvent::Click(ClickTarget {
                tag: "a".into(),
                text: Some("é".repeat(60)),
                href: None,
            }),
        );
        let text = transport.records()[0]["data"]["text"].as_str().unwrap().to_string();
        assert_eq!(text.chars().count(), 50);
    }

    #[test]
    fn form_submit_defaults_to_unknown() {
        let (tracker, mut listeners, transport, _) = fixture();
        listeners.handle(&tracker, PageEvent::Submit(FormTarget::default()));
        listeners.handle(
            &tracker,
            PageEvent::Submit(FormTarget {
                id: Some("signup".into()),
                action: Some("/register".into()),
            }),
        );

        let records = transport.records();
        assert_eq!(records[0]["data"], json!({"formId": "unknown", "formAction": "unknown"}));
        assert_eq!(records[1]["data"], json!({"formId": "signup", "formAction": "/register"}));
    }

    #[test]
    fn visibility_and_unload_report_time_on_page() {
        let (tracker, mut listeners, transport, clock) = fixture();

        clock.advance(Duration::from_secs(5));
        listeners.handle(&tracker, PageEvent::VisibilityChange { hidden: true });
        clock.advance(Duration::from_secs(60));
        listeners.handle(&tracker, PageEvent::VisibilityChange { hidden: false });
        clock.advance(Duration::from_secs(3));
        listeners.handle(&tracker, PageEvent::BeforeUnload);

        assert_eq!(
            transport.event_names(),
            vec![TIME_ON_PAGE, PAGE_VISIBLE, TIME_ON_PAGE, PAGE_EXIT]
        );
        let records = transport.records();
        assert_eq!(records[0]["data"]["duration"], 5_000);
        assert_eq!(records[2]["data"]["duration"], 3_000);
    }
}
