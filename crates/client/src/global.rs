//! Process-wide entry points for manual tracking, available to page code
//! that has no handle on the installed [`Beacon`](crate::Beacon).

use std::sync::{Arc, RwLock};

use once_cell::sync::Lazy;
use serde_json::{Map, Value};

use crate::{tracker::Tracker, transport::DeliveryOutcome};

static INSTALLED: Lazy<RwLock<Option<Arc<Tracker>>>> = Lazy::new(|| RwLock::new(None));

/// Makes `tracker` the target of [`track_event`] and [`track_page_view`],
/// replacing any previous one.
pub fn expose(tracker: Arc<Tracker>) {
    let mut slot = INSTALLED
        .write()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    *slot = Some(tracker);
}

pub fn withdraw() {
    let mut slot = INSTALLED
        .write()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    *slot = None;
}

/// Withdraws `tracker` only if it is still the installed one.
pub fn withdraw_tracker(tracker: &Arc<Tracker>) {
    let mut slot = INSTALLED
        .write()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    if slot
        .as_ref()
        .is_some_and(|installed| Arc::ptr_eq(installed, tracker))
    {
        *slot = None;
    }
}

fn installed() -> Option<Arc<Tracker>> {
    INSTALLED
        .read()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .clone()
}

/// Emits a named event through the installed tracker. `None` if nothing is installed.
pub fn track_event(name: &str, data: Map<String, Value>) -> Option<DeliveryOutcome> {
    installed().map(|tracker| tracker.track_event(name, data))
}

pub fn track_page_view() -> Option<DeliveryOutcome> {
    installed().map(|tracker| tracker.track_page_view())
}
