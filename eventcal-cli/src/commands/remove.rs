use anyhow::Result;
use dialoguer::Confirm;
use eventcal_core::{Event, EventId, EventService};
use owo_colors::OwoColorize;

use crate::commands::user_bail;
use crate::render::short_id;

pub fn run(service: &EventService, input: &str, yes: bool) -> Result<()> {
    let events = service.list_all();
    let id = resolve_id(input, &events)?;
    let target = events.iter().find(|e| e.id == id);

    // An id that is not listed goes straight to removal, which reports it missing.
    if let Some(event) = target.filter(|_| !yes) {
        println!("  {}", describe(event));
        let confirmed = Confirm::new()
            .with_prompt("  Remove this event?")
            .default(false)
            .interact()?;

        if !confirmed {
            println!("{}", "  Nothing removed".dimmed());
            return Ok(());
        }
    }

    let description = target.map(|e| e.description.clone());

    service.remove_event(id)?;

    match description {
        Some(d) => println!("{} {}", format!("  Removed: {d}").green(), short_id(id).dimmed()),
        None => println!("{}", format!("  Removed: {id}").green()),
    }

    Ok(())
}

/// "Fri Mar 20 2025 15:00  Dentist"
fn describe(event: &Event) -> String {
    format!(
        "{}  {}",
        event.scheduled_at.format("%a %b %-d %Y %H:%M"),
        event.description
    )
}

/// Turn a full id, or a prefix matching exactly one event, into an id.
///
/// A well-formed full id is returned even when no listed event has it, so
/// removal reports the missing event itself.
fn resolve_id(input: &str, events: &[Event]) -> Result<EventId> {
    if let Ok(id) = input.parse::<EventId>() {
        return Ok(id);
    }

    let prefix = input.trim().to_lowercase();
    if prefix.is_empty() {
        user_bail!("No event id given");
    }

    let matches: Vec<&Event> = events
        .iter()
        .filter(|e| e.id.to_string().starts_with(&prefix))
        .collect();

    match matches.as_slice() {
        [] => user_bail!("No event with id \"{}\"", input.trim()),
        [event] => Ok(event.id),
        _ => user_bail!(
            "\"{}\" matches {} events, use more characters of the id",
            input.trim(),
            matches.len()
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn event(description: &str) -> Event {
        let at = NaiveDate::from_ymd_opt(2030, 1, 1)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap();
        Event::new(description, at)
    }

    #[test]
    fn full_id_is_used_as_is() {
        let events = vec![event("a")];
        let id = events[0].id;

        assert_eq!(resolve_id(&id.to_string(), &events).unwrap(), id);
    }

    #[test]
    fn unknown_full_id_still_resolves() {
        let id = EventId::new();
        assert_eq!(resolve_id(&id.to_string(), &[]).unwrap(), id);
    }

    #[test]
    fn unique_prefix_resolves() {
        let events = vec![event("a"), event("b")];
        let target = events[1].id;
        let prefix = target.to_string();

        // Grow the prefix until it singles out the target.
        let resolved = (1..=prefix.len())
            .find_map(|n| resolve_id(&prefix[..n], &events).ok())
            .unwrap();
        assert_eq!(resolved, target);
    }

    #[test]
    fn prefix_is_case_insensitive() {
        let events = vec![event("a")];
        let id = events[0].id;
        let upper = id.to_string()[..8].to_uppercase();

        assert_eq!(resolve_id(&upper, &events).unwrap(), id);
    }

    #[test]
    fn unmatched_prefix_is_a_user_error() {
        let events = vec![event("a")];
        let err = resolve_id("zzzz", &events).unwrap_err();
        assert!(err.downcast_ref::<crate::commands::UserError>().is_some());
    }

    #[test]
    fn ambiguous_prefix_is_rejected() {
        let mut a = event("a");
        let mut b = event("b");
        a.id = "abcdef01-0000-4000-8000-000000000001".parse().unwrap();
        b.id = "abcdef01-0000-4000-8000-000000000002".parse().unwrap();
        let events = vec![a, b];

        let err = resolve_id("abcdef", &events).unwrap_err();
        assert!(err.to_string().contains("matches 2 events"));
    }

    #[test]
    fn description_shows_when_and_what() {
        let e = event("Dentist");
        assert_eq!(describe(&e), "Tue Jan 1 2030 09:00  Dentist");
    }

    #[test]
    fn blank_input_is_rejected() {
        assert!(resolve_id("  ", &[event("a")]).is_err());
    }
}
