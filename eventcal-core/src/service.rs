//! Business rules on top of the event store.
//!
//! This is the surface used by the presentation layer (add/remove/list) and
//! by the scheduler (due detection and delivery marking).

use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime};
use tracing::{debug, info};

use crate::clock::{Clock, SystemClock};
use crate::error::{EventError, EventResult, ValidationError};
use crate::event::{Event, EventId};
use crate::store::EventStore;

pub struct EventService {
    store: EventStore,
    clock: Arc<dyn Clock>,
}

impl EventService {
    pub fn new(store: EventStore) -> Self {
        Self::with_clock(store, Arc::new(SystemClock))
    }

    pub fn with_clock(store: EventStore, clock: Arc<dyn Clock>) -> Self {
        EventService { store, clock }
    }

    pub fn store(&self) -> &EventStore {
        &self.store
    }

    /// Current local wall-clock time as seen by this service.
    pub fn now(&self) -> NaiveDateTime {
        self.clock.now()
    }

    /// Validate and persist a new event, returning its id.
    pub fn add_event(&self, description: &str, scheduled_at: NaiveDateTime) -> EventResult<EventId> {
        if description.trim().is_empty() {
            return Err(ValidationError::EmptyDescription.into());
        }

        if scheduled_at <= self.clock.now() {
            return Err(ValidationError::PastDate(scheduled_at).into());
        }

        let event = Event::new(description, scheduled_at);
        let id = event.id;
        self.store.add(event)?;

        info!(%id, %scheduled_at, "Added event");
        Ok(id)
    }

    /// Remove an existing event. Fails with `NotFound` if `id` is unknown.
    ///
    /// The existence check and the removal happen in the same critical
    /// section, so a concurrent remove cannot make both callers succeed.
    pub fn remove_event(&self, id: EventId) -> EventResult<()> {
        let removed = self.store.modify(|events| {
            let before = events.len();
            events.retain(|e| e.id != id);
            events.len() != before
        })?;

        if !removed {
            return Err(EventError::NotFound(id));
        }

        info!(%id, "Removed event");
        Ok(())
    }

    pub fn find_event(&self, id: EventId) -> Option<Event> {
        self.store.load().into_iter().find(|e| e.id == id)
    }

    /// All events, earliest first. Events at the same time keep insertion order.
    pub fn list_all(&self) -> Vec<Event> {
        chronological(self.store.load())
    }

    /// Events on the given local calendar day, earliest first.
    pub fn list_by_date(&self, date: NaiveDate) -> Vec<Event> {
        chronological(
            self.store
                .load()
                .into_iter()
                .filter(|e| e.is_on(date))
                .collect(),
        )
    }

    /// Undelivered events scheduled within the current minute, earliest first.
    pub fn get_due_events(&self) -> Vec<Event> {
        let now = self.clock.now();
        let due = chronological(
            self.store
                .load()
                .into_iter()
                .filter(|e| e.is_due_at(now))
                .collect(),
        );

        debug!(%now, count = due.len(), "Checked for due events");
        due
    }

    /// Flag an event as delivered. Marking an already notified event is a no-op.
    pub fn mark_notified(&self, id: EventId) -> EventResult<()> {
        self.claim_notification(id).map(|_| ())
    }

    /// Like `mark_notified`, but reports whether this call made the
    /// `false -> true` transition. Only the caller that gets `true` may
    /// deliver the notification.
    pub fn claim_notification(&self, id: EventId) -> EventResult<bool> {
        let claimed = self.store.modify(|events| {
            events.iter_mut().find(|e| e.id == id).map(|event| {
                let first = !event.notified;
                event.notified = true;
                first
            })
        })?;

        match claimed {
            Some(first) => {
                debug!(%id, first, "Marked event as notified");
                Ok(first)
            }
            None => Err(EventError::NotFound(id)),
        }
    }
}

fn chronological(mut events: Vec<Event>) -> Vec<Event> {
    // sort_by_key is stable, so equal times keep file (insertion) order
    events.sort_by_key(|e| e.scheduled_at);
    events
}
