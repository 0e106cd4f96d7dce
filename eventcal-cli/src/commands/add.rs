use anyhow::Result;
use chrono::NaiveDateTime;
use dialoguer::Input;
use eventcal_core::EventService;
use owo_colors::OwoColorize;

use crate::commands::user_bail;
use crate::render::short_id;

/// Formats tried before falling back to natural language.
const EXACT_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
];

pub fn run(service: &EventService, description: Option<String>, at: Option<String>) -> Result<()> {
    let interactive = description.is_none() || at.is_none();

    // --- Description ---
    let description = match description {
        Some(d) => d,
        None => Input::<String>::new()
            .with_prompt("  What?")
            .interact_text()?,
    };

    // --- When ---
    let scheduled_at = match at {
        Some(s) => parse_when(&s)?,
        None => prompt_with_retry("  When?", parse_when)?,
    };

    let id = service.add_event(&description, scheduled_at)?;

    if interactive {
        println!();
    }
    println!(
        "{} {}",
        format!(
            "  Added: {} at {}",
            description.trim(),
            scheduled_at.format("%Y-%m-%d %H:%M")
        )
        .green(),
        short_id(id).dimmed()
    );

    Ok(())
}

/// Prompt the user with retry on parse errors.
fn prompt_with_retry<F>(prompt: &str, parse: F) -> Result<NaiveDateTime>
where
    F: Fn(&str) -> Result<NaiveDateTime>,
{
    loop {
        let input: String = Input::new().with_prompt(prompt).interact_text()?;
        match parse(&input) {
            Ok(result) => return Ok(result),
            Err(e) => {
                eprintln!("  {}", e.to_string().red());
            }
        }
    }
}

/// Parse when an event happens: an exact `YYYY-MM-DD HH:MM` form, or natural
/// language like "tomorrow 3pm". A time of day is required.
fn parse_when(input: &str) -> Result<NaiveDateTime> {
    let trimmed = input.trim();

    if let Some(dt) = EXACT_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(trimmed, fmt).ok())
    {
        return Ok(dt);
    }

    if !has_time_component(trimmed) {
        user_bail!(
            "\"{}\" has no time of day. Try e.g. \"{} 9am\" or \"2025-03-20 15:00\"",
            trimmed,
            trimmed
        );
    }

    let expanded = expand_abbreviations(trimmed);
    match fuzzydate::parse(&expanded) {
        Ok(dt) => Ok(dt),
        Err(_) => user_bail!("Could not parse date/time: \"{}\"", trimmed),
    }
}

/// Expand common abbreviations that fuzzydate doesn't handle.
fn expand_abbreviations(input: &str) -> String {
    let abbrevs = [
        ("mon", "monday"),
        ("tue", "tuesday"),
        ("tues", "tuesday"),
        ("wed", "wednesday"),
        ("thu", "thursday"),
        ("thur", "thursday"),
        ("thurs", "thursday"),
        ("fri", "friday"),
        ("sat", "saturday"),
        ("sun", "sunday"),
        ("jan", "january"),
        ("feb", "february"),
        ("mar", "march"),
        ("apr", "april"),
        ("jun", "june"),
        ("jul", "july"),
        ("aug", "august"),
        ("sep", "september"),
        ("sept", "september"),
        ("oct", "october"),
        ("nov", "november"),
        ("dec", "december"),
    ];

    let lower = input.to_lowercase();

    lower
        .split_whitespace()
        .map(|word| {
            abbrevs
                .iter()
                .find(|(abbr, _)| *abbr == word)
                .map(|(_, full)| *full)
                .unwrap_or(word)
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Check if the user's input string contains time-related tokens.
fn has_time_component(input: &str) -> bool {
    let lower = input.to_lowercase();

    if lower.contains("noon") || lower.contains("midnight") {
        return true;
    }

    let bytes = lower.as_bytes();

    // am/pm right after a digit, optionally separated by a space ("6pm", "6 pm")
    for (i, window) in bytes.windows(2).enumerate() {
        if (window == b"am" || window == b"pm")
            && ((i > 0 && bytes[i - 1].is_ascii_digit())
                || (i > 1 && bytes[i - 1] == b' ' && bytes[i - 2].is_ascii_digit()))
        {
            return true;
        }
    }

    // HH:MM
    for (i, &b) in bytes.iter().enumerate() {
        if b == b':'
            && i > 0
            && bytes[i - 1].is_ascii_digit()
            && bytes.get(i + 1).is_some_and(u8::is_ascii_digit)
        {
            return true;
        }
    }

    // "at" followed by a digit ("at 3", "friday at 15")
    let after_at = lower
        .find(" at ")
        .map(|pos| &lower[pos + 4..])
        .or_else(|| lower.strip_prefix("at "));

    after_at.is_some_and(|rest| rest.starts_with(|c: char| c.is_ascii_digit()))
}
