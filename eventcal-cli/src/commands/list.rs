use anyhow::Result;
use chrono::NaiveDate;
use eventcal_core::EventService;
use owo_colors::OwoColorize;

use crate::commands::user_bail;
use crate::render::{Render, format_date_label};

pub fn run(service: &EventService, date: Option<&str>) -> Result<()> {
    let events = match date {
        Some(input) => service.list_by_date(parse_date(input)?),
        None => service.list_all(),
    };

    if events.is_empty() {
        println!("{}", "No events found".dimmed());
        return Ok(());
    }

    let today = chrono::Local::now().date_naive();

    // Group events by day and print
    let mut current_date: Option<NaiveDate> = None;

    for event in &events {
        let day = event.scheduled_at.date();

        if current_date != Some(day) {
            if current_date.is_some() {
                println!();
            }
            println!("{}", format_date_label(day, today).bold());
            current_date = Some(day);
        }

        println!("  {}", event.render());
    }

    Ok(())
}

/// A calendar day: `YYYY-MM-DD` or anything fuzzydate understands ("today", "friday").
fn parse_date(input: &str) -> Result<NaiveDate> {
    let trimmed = input.trim();

    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        return Ok(date);
    }

    match fuzzydate::parse(trimmed) {
        Ok(dt) => Ok(dt.date()),
        Err(_) => user_bail!("Could not parse date: \"{}\"", trimmed),
    }
}
