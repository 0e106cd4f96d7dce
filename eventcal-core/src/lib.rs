//! Core of eventcal: persisted events, the rules for creating them and the
//! scheduler that delivers due-event notifications.
//!
//! - `store`: whole-collection JSON persistence with a single critical section
//! - `service`: validation, queries, due detection and delivery marking
//! - `scheduler`: periodic due check with sequential, acknowledged delivery

pub mod clock;
pub mod config;
pub mod error;
pub mod event;
pub mod scheduler;
pub mod service;
pub mod store;

pub use clock::{Clock, SystemClock};
pub use error::{ConfigError, EventError, StoreError, ValidationError};
pub use event::{Event, EventId};
pub use scheduler::{DueNotification, Scheduler};
pub use service::EventService;
pub use store::EventStore;
