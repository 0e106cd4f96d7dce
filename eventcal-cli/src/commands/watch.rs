use std::future::Future;
use std::io::BufRead;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use eventcal_core::{DueNotification, Event, EventService, Scheduler};
use owo_colors::OwoColorize;
use tokio::sync::mpsc;

use crate::singleton;

enum Wait {
    Acknowledged,
    Interrupted,
}

pub async fn run(service: Arc<EventService>, period: Duration, desktop: bool) -> Result<()> {
    let _lock = singleton::acquire_lock(service.store().path())?;

    let (scheduler, mut notifications) = Scheduler::new(service, period);
    scheduler.start();

    println!(
        "{}",
        format!(
            "Watching for due events (checking every {}). Press Ctrl-C to stop.",
            humantime::format_duration(period)
        )
        .dimmed()
    );

    let mut enter = spawn_enter_reader();
    let interrupt = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    tokio::pin!(interrupt);

    let pending = present(&mut notifications, &mut enter, interrupt, desktop).await;

    // Dropping the shown notification would release the next due event, so it
    // is only dropped once the scheduler has stopped.
    scheduler.stop().await;
    drop(pending);

    println!();
    println!("{}", "Stopped watching".dimmed());

    Ok(())
}

/// Show notifications until interrupted. Returns the notification that was on
/// screen when the interrupt came, still unacknowledged.
async fn present<F>(
    notifications: &mut mpsc::Receiver<DueNotification>,
    enter: &mut mpsc::UnboundedReceiver<()>,
    mut interrupt: Pin<&mut F>,
    desktop: bool,
) -> Option<DueNotification>
where
    F: Future<Output = ()>,
{
    loop {
        let notification = tokio::select! {
            _ = interrupt.as_mut() => return None,
            next = notifications.recv() => next?,
        };

        show(notification.event(), desktop);

        match wait_for_enter(enter, interrupt.as_mut()).await {
            Wait::Acknowledged => notification.acknowledge(),
            Wait::Interrupted => return Some(notification),
        }
    }
}

fn show(event: &Event, desktop: bool) {
    println!();
    println!("{}", "Event due".bold().yellow());
    println!(
        "  {} {}",
        event.scheduled_at.format("%Y-%m-%d %H:%M").bold(),
        event.description
    );
    println!("{}", "  Press Enter to dismiss".dimmed());

    if desktop {
        let shown = notify_rust::Notification::new()
            .summary("eventcal")
            .body(&format!(
                "{} {}",
                event.scheduled_at.format("%H:%M"),
                event.description
            ))
            .show();

        if let Err(e) = shown {
            tracing::warn!(error = %e, "Could not show desktop notification");
        }
    }
}

/// Wait for the user to dismiss the current notification. Enter presses made
/// before it was shown do not count. A closed stdin dismisses right away.
async fn wait_for_enter<F>(enter: &mut mpsc::UnboundedReceiver<()>, interrupt: Pin<&mut F>) -> Wait
where
    F: Future<Output = ()>,
{
    while enter.try_recv().is_ok() {}

    tokio::select! {
        _ = interrupt => Wait::Interrupted,
        _ = enter.recv() => Wait::Acknowledged,
    }
}

/// Forward each line read from stdin. The channel closes when stdin does.
///
/// The reader is a detached thread so a pending read does not hold up
/// runtime shutdown.
fn spawn_enter_reader() -> mpsc::UnboundedReceiver<()> {
    let (tx, rx) = mpsc::unbounded_channel();

    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        let mut line = String::new();
        loop {
            line.clear();
            match stdin.lock().read_line(&mut line) {
                Ok(0) | Err(_) => break,
                Ok(_) => {
                    if tx.send(()).is_err() {
                        break;
                    }
                }
            }
        }
    });

    rx
}
