//! Terminal rendering for eventcal types.

use chrono::{NaiveDate, NaiveDateTime};
use eventcal_core::{Event, EventId};
use owo_colors::OwoColorize;

/// Length of the id prefix shown in listings. `eventcal remove` accepts it.
pub const SHORT_ID_LEN: usize = 8;

/// Extension trait for TUI rendering with colors.
pub trait Render {
    fn render(&self) -> String;
}

impl Render for EventId {
    fn render(&self) -> String {
        short_id(*self).dimmed().to_string()
    }
}

/// One line of `eventcal list`: time, description, short id.
impl Render for Event {
    fn render(&self) -> String {
        let time = format_time(self.scheduled_at);

        if self.notified {
            let line = format!("{} {} (notified)", time, self.description);
            format!("{} {}", line.dimmed(), self.id.render())
        } else {
            format!("{} {} {}", time.bold(), self.description, self.id.render())
        }
    }
}

pub fn short_id(id: EventId) -> String {
    id.to_string().chars().take(SHORT_ID_LEN).collect()
}

/// "15:00", right-aligned to line up in listings
pub fn format_time(at: NaiveDateTime) -> String {
    format!("{:>7}", at.format("%H:%M"))
}

/// A date as a human-readable label (e.g. "Today", "Tomorrow", "Wed Feb 25")
pub fn format_date_label(date: NaiveDate, today: NaiveDate) -> String {
    match (date - today).num_days() {
        -1 => "Yesterday".to_string(),
        0 => "Today".to_string(),
        1 => "Tomorrow".to_string(),
        _ => date.format("%a %b %-d %Y").to_string(),
    }
}
