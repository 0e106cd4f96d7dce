//! Background due-event detection and one-at-a-time delivery.
//!
//! The scheduler wakes on a fixed period (first tick immediately on start),
//! asks the service for due events and hands each one to the delivery sink
//! as a [`DueNotification`]. An event is marked notified before its
//! notification is sent, and the next notification is only sent after the
//! receiver acknowledged (or dropped) the current one.
//!
//! Stopping is a hard stop: the current tick abandons the events it has not
//! reached yet, and `stop()` returns only after the background task has
//! exited, so nothing is delivered after it returns.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::{self, JoinError, JoinHandle};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::error::EventResult;
use crate::event::{Event, EventId};
use crate::service::EventService;

/// Default check period, matching the minute granularity of due detection.
pub const DEFAULT_PERIOD: Duration = Duration::from_secs(60);

/// A due event handed to the presentation layer.
///
/// The scheduler waits until this is acknowledged before sending the next
/// one. Dropping it without calling [`acknowledge`](Self::acknowledge)
/// counts as acknowledged.
#[derive(Debug)]
pub struct DueNotification {
    event: Event,
    ack: oneshot::Sender<()>,
}

impl DueNotification {
    pub fn event(&self) -> &Event {
        &self.event
    }

    /// Release the scheduler to deliver the next due event.
    pub fn acknowledge(self) {
        let _ = self.ack.send(());
    }
}

/// What a single tick did.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct TickReport {
    due: usize,
    delivered: usize,
    skipped: usize,
    abandoned: usize,
}

enum Delivery {
    Acknowledged,
    SinkClosed,
    /// Stop arrived before the notification reached the sink.
    NotSent,
    /// Stop arrived while the notification was waiting for acknowledgment.
    Stopped,
}

struct Running {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

pub struct Scheduler {
    ticker: Ticker,
    period: Duration,
    running: Mutex<Option<Running>>,
}

impl Scheduler {
    /// Create a stopped scheduler and the receiving end of its notifications.
    pub fn new(
        service: Arc<EventService>,
        period: Duration,
    ) -> (Self, mpsc::Receiver<DueNotification>) {
        let (sink, notifications) = mpsc::channel(1);

        let scheduler = Scheduler {
            ticker: Ticker { service, sink },
            period,
            running: Mutex::new(None),
        };

        (scheduler, notifications)
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn is_running(&self) -> bool {
        self.running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|r| !r.handle.is_finished())
    }

    /// Start checking for due events. The first check runs immediately.
    /// Starting a running scheduler does nothing.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(&self) {
        let mut running = self.running.lock().unwrap_or_else(PoisonError::into_inner);

        if running.as_ref().is_some_and(|r| !r.handle.is_finished()) {
            debug!("Scheduler already running");
            return;
        }

        let (shutdown, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(run_loop(self.ticker.clone(), self.period, shutdown_rx));

        *running = Some(Running { shutdown, handle });
        info!(period = %humantime::format_duration(self.period), "Scheduler started");
    }

    /// Stop checking for due events and wait for the background task to
    /// exit. Stopping a stopped scheduler does nothing.
    pub async fn stop(&self) {
        let running = self
            .running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        let Some(Running { shutdown, handle }) = running else {
            debug!("Scheduler already stopped");
            return;
        };

        let _ = shutdown.send(true);

        if let Err(e) = handle.await {
            error!(error = %e, "Scheduler task ended abnormally");
        }

        info!("Scheduler stopped");
    }
}

async fn run_loop(ticker: Ticker, period: Duration, mut shutdown: watch::Receiver<bool>) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            _ = interval.tick() => {}
        }

        if stop_requested(&shutdown) {
            break;
        }

        let report = ticker.tick(&mut shutdown).await;

        if report.due > 0 {
            info!(
                due = report.due,
                delivered = report.delivered,
                skipped = report.skipped,
                abandoned = report.abandoned,
                "Processed due events"
            );
        }

        // A stop seen during the tick has already consumed the change
        // notification, so the select above would not wake for it.
        if stop_requested(&shutdown) {
            break;
        }
    }

    debug!("Scheduler loop exited");
}

fn stop_requested(shutdown: &watch::Receiver<bool>) -> bool {
    *shutdown.borrow() || shutdown.has_changed().is_err()
}

#[derive(Clone)]
struct Ticker {
    service: Arc<EventService>,
    sink: mpsc::Sender<DueNotification>,
}

impl Ticker {
    async fn tick(&self, shutdown: &mut watch::Receiver<bool>) -> TickReport {
        // The store already degrades read failures to an empty list; a failed
        // blocking task is treated the same way.
        let due = match self.blocking(EventService::get_due_events).await {
            Ok(due) => due,
            Err(e) => {
                error!(error = %e, "Due-event check failed");
                Vec::new()
            }
        };

        self.deliver_all(due, shutdown).await
    }

    async fn deliver_all(
        &self,
        due: Vec<Event>,
        shutdown: &mut watch::Receiver<bool>,
    ) -> TickReport {
        let mut report = TickReport {
            due: due.len(),
            ..TickReport::default()
        };

        for (index, event) in due.into_iter().enumerate() {
            if stop_requested(shutdown) {
                report.abandoned = report.due - index;
                break;
            }

            let id = event.id;
            match self.claim(id).await {
                Ok(true) => {}
                Ok(false) => {
                    debug!(%id, "Event already notified, skipping");
                    report.skipped += 1;
                    continue;
                }
                Err(e) => {
                    warn!(%id, error = %e, "Could not mark event as notified, skipping it this tick");
                    report.skipped += 1;
                    continue;
                }
            }

            match self.deliver(event, shutdown).await {
                Delivery::Acknowledged => report.delivered += 1,
                Delivery::SinkClosed => {
                    warn!(%id, "Nobody is receiving notifications, dropping delivery");
                    report.skipped += 1;
                }
                Delivery::NotSent => {
                    report.abandoned = report.due - index;
                    break;
                }
                Delivery::Stopped => {
                    report.delivered += 1;
                    report.abandoned = report.due - index - 1;
                    break;
                }
            }
        }

        report
    }

    /// Mark the event notified. `Ok(false)` means it already was.
    async fn claim(&self, id: EventId) -> EventResult<bool> {
        match self.blocking(move |service| service.claim_notification(id)).await {
            Ok(result) => result,
            Err(e) => {
                error!(%id, error = %e, "Marking task failed");
                Ok(false)
            }
        }
    }

    async fn deliver(&self, event: Event, shutdown: &mut watch::Receiver<bool>) -> Delivery {
        let id = event.id;
        let (ack, acknowledged) = oneshot::channel();
        let notification = DueNotification { event, ack };

        tokio::select! {
            biased;
            _ = shutdown.changed() => {
                warn!(%id, "Stopped before the notification could be sent");
                return Delivery::NotSent;
            }
            sent = self.sink.send(notification) => {
                if sent.is_err() {
                    return Delivery::SinkClosed;
                }
            }
        }

        debug!(%id, "Notification sent, waiting for acknowledgment");

        tokio::select! {
            biased;
            _ = shutdown.changed() => Delivery::Stopped,
            // An error here means the notification was dropped, which also releases us.
            _ = acknowledged => Delivery::Acknowledged,
        }
    }

    async fn blocking<T, F>(&self, f: F) -> Result<T, JoinError>
    where
        T: Send + 'static,
        F: FnOnce(&EventService) -> T + Send + 'static,
    {
        let service = Arc::clone(&self.service);
        task::spawn_blocking(move || f(&service)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::testing::{FixedClock, datetime};
    use crate::store::EventStore;
    use tempfile::TempDir;
    use tokio::sync::mpsc::error::TryRecvError;
    use tokio::time::{sleep, timeout};

    const FAST: Duration = Duration::from_millis(20);
    const WAIT: Duration = Duration::from_secs(5);
    const QUIET: Duration = Duration::from_millis(200);

    struct Fixture {
        _dir: TempDir,
        clock: Arc<FixedClock>,
        service: Arc<EventService>,
    }

    /// Clock starts at 2024-01-01 10:00:00.
    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let clock = Arc::new(FixedClock::at(2024, 1, 1, 10, 0, 0));
        let store = EventStore::new(dir.path().join("events.json"));
        let service = Arc::new(EventService::with_clock(store, clock.clone()));
        Fixture {
            _dir: dir,
            clock,
            service,
        }
    }

    impl Fixture {
        fn add_at_1030(&self, description: &str, second: u32) -> EventId {
            self.service
                .add_event(description, datetime(2024, 1, 1, 10, 30, second))
                .unwrap()
        }

        fn enter_1030(&self) {
            self.clock.set(datetime(2024, 1, 1, 10, 30, 30));
        }

        fn is_notified(&self, id: EventId) -> bool {
            self.service.find_event(id).unwrap().notified
        }
    }

    async fn next(rx: &mut mpsc::Receiver<DueNotification>) -> DueNotification {
        timeout(WAIT, rx.recv())
            .await
            .expect("timed out waiting for a notification")
            .expect("notification channel closed")
    }

    #[tokio::test]
    async fn first_tick_fires_immediately_and_marks_before_signaling() {
        let f = fixture();
        let id = f.add_at_1030("standup", 0);
        f.enter_1030();
        let (scheduler, mut rx) = Scheduler::new(f.service.clone(), DEFAULT_PERIOD);

        scheduler.start();
        let notification = next(&mut rx).await;

        assert_eq!(notification.event().id, id);
        assert!(f.is_notified(id));
        notification.acknowledge();
        timeout(WAIT, scheduler.stop())
            .await
            .expect("stop should not wait for the next period");
    }

    #[tokio::test]
    async fn stop_with_pending_notification_returns_before_next_period() {
        let f = fixture();
        f.add_at_1030("held", 0);
        f.enter_1030();
        let (scheduler, mut rx) = Scheduler::new(f.service.clone(), DEFAULT_PERIOD);

        scheduler.start();
        let pending = next(&mut rx).await;

        timeout(WAIT, scheduler.stop())
            .await
            .expect("stop should not wait for the next period");
        assert!(!scheduler.is_running());
        drop(pending);
    }

    #[tokio::test]
    async fn delivers_one_at_a_time_in_time_order() {
        let f = fixture();
        let later = f.add_at_1030("later", 45);
        let earlier = f.add_at_1030("earlier", 5);
        f.enter_1030();
        let (scheduler, mut rx) = Scheduler::new(f.service.clone(), FAST);

        scheduler.start();
        let first = next(&mut rx).await;
        assert_eq!(first.event().id, earlier);

        assert!(timeout(QUIET, rx.recv()).await.is_err());
        assert!(!f.is_notified(later));

        first.acknowledge();
        let second = next(&mut rx).await;
        assert_eq!(second.event().id, later);
        second.acknowledge();

        scheduler.stop().await;
    }

    #[tokio::test]
    async fn dropping_a_notification_releases_the_next_one() {
        let f = fixture();
        f.add_at_1030("a", 1);
        let b = f.add_at_1030("b", 2);
        f.enter_1030();
        let (scheduler, mut rx) = Scheduler::new(f.service.clone(), FAST);

        scheduler.start();
        drop(next(&mut rx).await);

        assert_eq!(next(&mut rx).await.event().id, b);
        scheduler.stop().await;
    }

    #[tokio::test]
    async fn delivered_event_is_not_delivered_again_on_later_ticks() {
        let f = fixture();
        let id = f.add_at_1030("once", 0);
        f.enter_1030();
        let (scheduler, mut rx) = Scheduler::new(f.service.clone(), FAST);

        scheduler.start();
        next(&mut rx).await.acknowledge();
        sleep(QUIET).await;

        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
        assert!(f.service.get_due_events().iter().all(|e| e.id != id));
        scheduler.stop().await;
    }

    #[tokio::test]
    async fn start_and_stop_are_idempotent() {
        let f = fixture();
        let (scheduler, _rx) = Scheduler::new(f.service.clone(), FAST);
        assert!(!scheduler.is_running());

        scheduler.start();
        scheduler.start();
        assert!(scheduler.is_running());

        scheduler.stop().await;
        scheduler.stop().await;
        assert!(!scheduler.is_running());

        scheduler.start();
        assert!(scheduler.is_running());
        scheduler.stop().await;
    }

    #[tokio::test]
    async fn stop_while_awaiting_acknowledgment_abandons_the_rest() {
        let f = fixture();
        let first = f.add_at_1030("first", 1);
        let second = f.add_at_1030("second", 2);
        f.enter_1030();
        let (scheduler, mut rx) = Scheduler::new(f.service.clone(), FAST);

        scheduler.start();
        let pending = next(&mut rx).await;
        assert_eq!(pending.event().id, first);

        timeout(WAIT, scheduler.stop())
            .await
            .expect("stop should not wait for the acknowledgment");
        drop(pending);

        sleep(QUIET).await;
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
        assert!(!f.is_notified(second));
    }

    #[tokio::test]
    async fn nothing_fires_after_stop_returns() {
        let f = fixture();
        let id = f.add_at_1030("after stop", 0);
        let (scheduler, mut rx) = Scheduler::new(f.service.clone(), FAST);

        scheduler.start();
        sleep(QUIET).await;
        scheduler.stop().await;

        f.enter_1030();
        sleep(QUIET).await;

        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
        assert!(!f.is_notified(id));
    }

    #[tokio::test]
    async fn keeps_running_through_a_corrupt_store() {
        let f = fixture();
        std::fs::write(f.service.store().path(), "{{{ definitely not json").unwrap();
        f.enter_1030();
        let (scheduler, mut rx) = Scheduler::new(f.service.clone(), FAST);

        scheduler.start();
        sleep(QUIET).await;
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
        assert!(scheduler.is_running());

        let event = Event::new("recovered", datetime(2024, 1, 1, 10, 30, 0));
        f.service.store().save(std::slice::from_ref(&event)).unwrap();

        let notification = next(&mut rx).await;
        assert_eq!(notification.event().id, event.id);
        notification.acknowledge();
        scheduler.stop().await;
    }

    #[tokio::test]
    async fn failed_mark_does_not_block_remaining_events() {
        let f = fixture();
        let real = f.add_at_1030("real", 10);
        f.enter_1030();
        let phantom = Event::new("removed meanwhile", datetime(2024, 1, 1, 10, 30, 0));
        let (sink, mut rx) = mpsc::channel(1);
        let ticker = Ticker {
            service: f.service.clone(),
            sink,
        };
        let (_shutdown, mut shutdown_rx) = watch::channel(false);

        let due = vec![phantom, f.service.find_event(real).unwrap()];
        let receiver = tokio::spawn(async move {
            let notification = next(&mut rx).await;
            let id = notification.event().id;
            notification.acknowledge();
            id
        });
        let report = ticker.deliver_all(due, &mut shutdown_rx).await;

        assert_eq!(receiver.await.unwrap(), real);
        assert_eq!(
            report,
            TickReport {
                due: 2,
                delivered: 1,
                skipped: 1,
                abandoned: 0
            }
        );
    }

    #[tokio::test]
    async fn closed_sink_still_marks_and_moves_on() {
        let f = fixture();
        let a = f.add_at_1030("a", 1);
        let b = f.add_at_1030("b", 2);
        f.enter_1030();
        let (sink, rx) = mpsc::channel(1);
        drop(rx);
        let ticker = Ticker {
            service: f.service.clone(),
            sink,
        };
        let (_shutdown, mut shutdown_rx) = watch::channel(false);

        let report = ticker.tick(&mut shutdown_rx).await;

        assert_eq!(report.due, 2);
        assert_eq!(report.skipped, 2);
        assert!(f.is_notified(a));
        assert!(f.is_notified(b));
    }

    #[tokio::test]
    async fn stop_before_send_counts_as_abandoned() {
        let f = fixture();
        let id = f.add_at_1030("blocked", 0);
        f.enter_1030();
        let (sink, mut rx) = mpsc::channel(1);
        let (ack, _acknowledged) = oneshot::channel();
        let filler = Event::new("filler", datetime(2024, 1, 1, 10, 30, 0));
        sink.try_send(DueNotification { event: filler, ack }).unwrap();
        let ticker = Ticker {
            service: f.service.clone(),
            sink,
        };
        let (shutdown, mut shutdown_rx) = watch::channel(false);

        let stopper = tokio::spawn(async move {
            sleep(QUIET).await;
            shutdown.send(true).unwrap();
            shutdown
        });
        let due = f.service.get_due_events();
        let report = ticker.deliver_all(due, &mut shutdown_rx).await;
        drop(stopper.await.unwrap());

        assert_eq!(
            report,
            TickReport {
                due: 1,
                delivered: 0,
                skipped: 0,
                abandoned: 1
            }
        );
        assert!(f.is_notified(id));
        assert_eq!(rx.recv().await.unwrap().event().description, "filler");
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test]
    async fn tick_skips_events_already_claimed() {
        let f = fixture();
        let id = f.add_at_1030("raced", 0);
        f.enter_1030();
        let stale = f.service.get_due_events();
        f.service.mark_notified(id).unwrap();
        let (sink, mut rx) = mpsc::channel(1);
        let ticker = Ticker {
            service: f.service.clone(),
            sink,
        };
        let (_shutdown, mut shutdown_rx) = watch::channel(false);

        let report = ticker.deliver_all(stale, &mut shutdown_rx).await;

        assert_eq!(report.skipped, 1);
        assert_eq!(report.delivered, 0);
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
    }
}
