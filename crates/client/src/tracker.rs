use std::sync::{Arc, Mutex, MutexGuard};

use beacon_common::{DeviceInfo, EventRecord};
use serde_json::{Map, Value};

use crate::{
    clock::Clock,
    config::BeaconConfig,
    device,
    page::PageContext,
    session::{Session, SessionCheck, SessionManager},
    storage::SessionStore,
    transport::{Delivery, DeliveryOutcome},
};

pub const SESSION_EXPIRED: &str = "session_expired";

/// Builds event records for one page and hands them to [`Delivery`].
///
/// Every emitted event counts as activity for the current session.
pub struct Tracker {
    config: BeaconConfig,
    session: Mutex<SessionManager>,
    page: Arc<dyn PageContext>,
    delivery: Delivery,
    clock: Arc<dyn Clock>,
}

impl Tracker {
    pub fn new(
        config: BeaconConfig,
        page: Arc<dyn PageContext>,
        store: Arc<dyn SessionStore>,
        delivery: Delivery,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let session = SessionManager::load(store, clock.now_millis(), config.session_timeout());
        Self {
            config,
            session: Mutex::new(session),
            page,
            delivery,
            clock,
        }
    }

    pub fn config(&self) -> &BeaconConfig {
        &self.config
    }

    pub fn page(&self) -> &Arc<dyn PageContext> {
        &self.page
    }

    pub fn now(&self) -> i64 {
        self.clock.now_millis()
    }

    pub fn session(&self) -> Session {
        self.lock_session().session().clone()
    }

    pub fn session_id(&self) -> String {
        self.lock_session().id().to_string()
    }

    pub fn device_info(&self) -> DeviceInfo {
        device::snapshot(self.page.as_ref())
    }

    pub fn track_page_view(&self) -> DeliveryOutcome {
        let now = self.now();
        let session_id = self.record_activity(now);
        let record = EventRecord::pageview(
            self.page.url(),
            self.page.title(),
            self.page.referrer(),
            now,
            session_id,
            self.device_info(),
            self.page.navigation_timing().timings(),
        );
        self.delivery.send(&record)
    }

    pub fn track_event(&self, name: &str, data: Map<String, Value>) -> DeliveryOutcome {
        let now = self.now();
        let session_id = self.record_activity(now);
        let record = EventRecord::custom(name, data, now, session_id, self.page.url());
        self.delivery.send(&record)
    }

    /// Periodic check. When the session was idle past the timeout it is
    /// rotated and `session_expired` is emitted under the new id.
    pub fn check_session(&self) -> Option<DeliveryOutcome> {
        let now = self.now();
        let check = self.lock_session().check(now);

        match check {
            SessionCheck::Active => None,
            SessionCheck::Rotated { previous } => {
                tracing::debug!("session {previous} expired");
                Some(self.track_event(SESSION_EXPIRED, Map::new()))
            }
        }
    }

    fn record_activity(&self, now: i64) -> String {
        let mut session = self.lock_session();
        session.touch(now);
        session.id().to_string()
    }

    fn lock_session(&self) -> MutexGuard<'_, SessionManager> {
        self.session
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Builds a data payload from key/value pairs.
pub fn data<I, K>(pairs: I) -> Map<String, Value>
where
    I: IntoIterator<Item = (K, Value)>,
    K: Into<String>,
{
    pairs
        .into_iter()
        .map(|(key, value)| (key.into(), value))
        .collect()
}
