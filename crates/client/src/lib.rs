//! Page-side analytics beacon.
//!
//! The host embeds a [`Tracker`] built from a [`PageContext`], a
//! [`SessionStore`] and a [`Delivery`], installs it with [`Beacon::install`]
//! and forwards DOM activity as [`PageEvent`]s.

pub mod beacon;
pub mod clock;
pub mod config;
pub mod device;
pub mod global;
pub mod listeners;
pub mod page;
pub mod session;
pub mod storage;
pub mod tracker;
pub mod transport;

pub use beacon::Beacon;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{BeaconConfig, ConfigError};
pub use listeners::{ClickTarget, FormTarget, PageEvent, PageListeners, ScrollPosition};
pub use page::{PageContext, PageSnapshot, ReadyState, StaticPage};
pub use session::{Session, SessionManager};
pub use storage::{FileStore, MemoryStore, SessionStore, StoreError};
pub use tracker::{data, Tracker};
pub use transport::{
    BeaconTransport, Delivery, DeliveryOutcome, FetchTransport, MemoryTransport, Transport,
    TransportError,
};
