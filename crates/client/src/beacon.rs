use std::sync::{Arc, Mutex, MutexGuard};

use serde_json::Value;
use tokio::{task::JoinHandle, time::MissedTickBehavior};

use crate::{
    global,
    listeners::{PageEvent, PageListeners},
    tracker::{data, Tracker},
    transport::DeliveryOutcome,
};

pub const SESSION_START: &str = "session_start";

/// An installed beacon.
///
/// Installation exposes the tracker through [`global`] immediately. The page
/// view, listeners and session timer wait until the document is interactive.
pub struct Beacon {
    tracker: Arc<Tracker>,
    listeners: Mutex<Option<PageListeners>>,
    timer: Mutex<Option<JoinHandle<()>>>,
}

impl Beacon {
    pub fn install(tracker: Arc<Tracker>) -> Self {
        global::expose(Arc::clone(&tracker));

        let beacon = Self {
            tracker,
            listeners: Mutex::new(None),
            timer: Mutex::new(None),
        };

        if beacon.tracker.page().ready_state().is_interactive() {
            beacon.document_ready();
        } else {
            tracing::debug!("document still loading, deferring beacon init");
        }

        beacon
    }

    /// Host callback for the document becoming interactive. Idempotent, and
    /// concurrent callers initialize only once.
    pub fn document_ready(&self) {
        let mut listeners = lock(&self.listeners);
        if listeners.is_none() {
            self.init(&mut listeners);
        }
    }

    pub fn is_initialized(&self) -> bool {
        lock(&self.listeners).is_some()
    }

    pub fn tracker(&self) -> &Arc<Tracker> {
        &self.tracker
    }

    /// Forwards a page event to the listeners. Events arriving before
    /// initialization are ignored, as no listener is attached yet.
    pub fn dispatch(&self, event: PageEvent) -> Vec<DeliveryOutcome> {
        let mut listeners = lock(&self.listeners);
        match listeners.as_mut() {
            Some(listeners) => listeners.handle(&self.tracker, event),
            None => Vec::new(),
        }
    }

    pub fn track_page_view(&self) -> DeliveryOutcome {
        self.tracker.track_page_view()
    }

    pub fn track_event(&self, name: &str, payload: serde_json::Map<String, Value>) -> DeliveryOutcome {
        self.tracker.track_event(name, payload)
    }

    fn init(&self, listeners: &mut Option<PageListeners>) {
        let tracker = &self.tracker;
        tracker.track_page_view();

        *listeners = Some(PageListeners::new(tracker.config(), tracker.now()));
        *lock(&self.timer) = self.spawn_session_timer();

        let session = tracker.session();
        tracker.track_event(
            SESSION_START,
            data([
                ("sessionStart", Value::from(session.start)),
                ("referrer", Value::from(tracker.page().referrer())),
            ]),
        );
    }

    fn spawn_session_timer(&self) -> Option<JoinHandle<()>> {
        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                tracing::warn!("no async runtime, session timeout checks are disabled");
                return None;
            }
        };

        let tracker = Arc::clone(&self.tracker);
        let period = tracker.config().check_interval();
        Some(handle.spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // the first tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                tracker.check_session();
            }
        }))
    }
}

impl Drop for Beacon {
    fn drop(&mut self) {
        if let Some(timer) = lock(&self.timer).take() {
            timer.abort();
        }
        global::withdraw_tracker(&self.tracker);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
