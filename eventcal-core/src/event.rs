//! The persisted event record.
//!
//! Times are local wall-clock values without an offset. An event scheduled for
//! `2025-03-20T15:00` fires at 15:00 on whatever clock the machine shows.

use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque unique identifier of an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(Uuid);

impl EventId {
    pub fn new() -> Self {
        EventId(Uuid::new_v4())
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for EventId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(EventId)
    }
}

/// A calendar event awaiting (or having received) its notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub description: String,
    pub scheduled_at: NaiveDateTime,
    #[serde(default)]
    pub notified: bool,
}

impl Event {
    /// Build a fresh, not yet notified event with a new id.
    ///
    /// No validation happens here; `EventService::add_event` is the only
    /// place events are created for storage.
    pub fn new(description: impl Into<String>, scheduled_at: NaiveDateTime) -> Self {
        Event {
            id: EventId::new(),
            description: description.into(),
            scheduled_at,
            notified: false,
        }
    }

    /// Whether the event falls on the given local calendar day.
    pub fn is_on(&self, date: NaiveDate) -> bool {
        self.scheduled_at.date() == date
    }

    /// Whether the event is scheduled within the same minute as `now`.
    /// Seconds and sub-seconds are ignored on both sides.
    pub fn is_in_minute_of(&self, now: NaiveDateTime) -> bool {
        truncate_to_minute(self.scheduled_at) == truncate_to_minute(now)
    }

    /// Due: same minute as `now` and not yet delivered.
    pub fn is_due_at(&self, now: NaiveDateTime) -> bool {
        !self.notified && self.is_in_minute_of(now)
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} {}",
            self.scheduled_at.format("%Y-%m-%d %H:%M"),
            self.description
        )
    }
}

fn truncate_to_minute(dt: NaiveDateTime) -> (NaiveDate, u32, u32) {
    (dt.date(), dt.hour(), dt.minute())
}
