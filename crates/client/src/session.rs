//! Session bookkeeping.
//!
//! A session is identified by a client-generated token and lasts until the
//! visitor has been idle for longer than the configured timeout. State is
//! mirrored into a [`SessionStore`] so it outlives a single page.

use std::{sync::Arc, time::Duration};

use rand::Rng;

use crate::storage::{SessionStore, LAST_ACTIVITY_KEY, SESSION_ID_KEY, SESSION_START_KEY};

pub const SESSION_ID_PREFIX: &str = "session_";
const SUFFIX_LEN: usize = 9;
const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// `session_<epoch millis>_<9 base-36 chars>`.
pub fn generate_session_id(now_millis: i64) -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..SUFFIX_LEN)
        .map(|_| BASE36[rng.gen_range(0..BASE36.len())] as char)
        .collect();
    format!("{SESSION_ID_PREFIX}{now_millis}_{suffix}")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub id: String,
    pub start: i64,
    pub last_activity: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionCheck {
    Active,
    Rotated { previous: String },
}

pub struct SessionManager {
    session: Session,
    timeout_ms: i64,
    store: Arc<dyn SessionStore>,
}

impl SessionManager {
    /// Resumes the stored session id whenever one is present, or starts a new
    /// session. Loading a page counts as activity, so idle time is measured
    /// from `now` and a long absence only rotates on the next [`check`](Self::check).
    pub fn load(store: Arc<dyn SessionStore>, now: i64, timeout: Duration) -> Self {
        let timeout_ms = i64::try_from(timeout.as_millis()).unwrap_or(i64::MAX);
        let stored_start = store
            .get(SESSION_START_KEY)
            .and_then(|value| value.parse::<i64>().ok());
        let stored_id = store.get(SESSION_ID_KEY).filter(|id| !id.is_empty());

        let mut manager = Self {
            session: Session {
                id: String::new(),
                start: now,
                last_activity: now,
            },
            timeout_ms,
            store,
        };

        match stored_id {
            Some(id) => {
                tracing::debug!("resuming session {id}");
                manager.session = Session {
                    id,
                    start: stored_start.unwrap_or(now),
                    last_activity: now,
                };
                manager.write(LAST_ACTIVITY_KEY, &now.to_string());
            }
            None => manager.start_new(now),
        }

        manager
    }

    pub fn id(&self) -> &str {
        &self.session.id
    }

    pub fn start(&self) -> i64 {
        self.session.start
    }

    pub fn last_activity(&self) -> i64 {
        self.session.last_activity
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn is_expired(&self, now: i64) -> bool {
        now.saturating_sub(self.session.last_activity) > self.timeout_ms
    }

    /// Records activity at `now`.
    pub fn touch(&mut self, now: i64) {
        self.session.last_activity = now;
        self.write(LAST_ACTIVITY_KEY, &now.to_string());
    }

    /// Timer hook: rotates an idle session, then records activity.
    pub fn check(&mut self, now: i64) -> SessionCheck {
        let outcome = if self.is_expired(now) {
            let previous = self.session.id.clone();
            self.start_new(now);
            tracing::debug!("session {} expired, rotated to {}", previous, self.session.id);
            SessionCheck::Rotated { previous }
        } else {
            SessionCheck::Active
        };

        self.touch(now);
        outcome
    }

    fn start_new(&mut self, now: i64) {
        self.session = Session {
            id: generate_session_id(now),
            start: now,
            last_activity: now,
        };
        let id = self.session.id.clone();
        self.write(SESSION_ID_KEY, &id);
        self.write(SESSION_START_KEY, &now.to_string());
        self.write(LAST_ACTIVITY_KEY, &now.to_string());
    }

    fn write(&self, key: &str, value: &str) {
        if let Err(err) = self.store.set(key, value) {
            tracing::debug!("session store rejected {key}: {err}");
        }
    }
}
