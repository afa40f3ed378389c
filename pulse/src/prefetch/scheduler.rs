use super::orchestrator::{PrefetchOptions, PrefetchOrchestrator};
use crate::domain::PrefetchContext;
use parking_lot::Mutex;
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};

/// Application lifecycle transitions relevant to background refresh
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AppLifecycle {
    Foreground,
    Background,
}

struct Driver {
    context: PrefetchContext,
    handle: JoinHandle<()>,
}

/// Drives the orchestrator for the current session context
///
/// Each context gets one driver task: a forced prefetch on start, then a
/// non-forced one on every interval tick and every foreground transition.
/// Replacing or clearing the context aborts the driver; a batch already in
/// flight is owned by the orchestrator and still completes.
pub struct PrefetchScheduler {
    orchestrator: PrefetchOrchestrator,
    lifecycle: broadcast::Sender<AppLifecycle>,
    interval: Duration,
    driver: Mutex<Option<Driver>>,
}

impl PrefetchScheduler {
    pub fn new(
        orchestrator: PrefetchOrchestrator,
        lifecycle: broadcast::Sender<AppLifecycle>,
    ) -> Self {
        let interval = orchestrator.ttl().as_duration();
        Self {
            orchestrator,
            lifecycle,
            interval,
            driver: Mutex::new(None),
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Switch to `context`; `None` tears the current driver down
    pub fn set_context(&self, context: Option<PrefetchContext>) {
        let mut driver = self.driver.lock();

        if driver.as_ref().map(|d| &d.context) == context.as_ref() {
            return;
        }

        if let Some(previous) = driver.take() {
            debug!("Stopping prefetch driver for user {}", previous.context.user_id);
            previous.handle.abort();
        }

        if let Some(context) = context {
            info!(
                "Starting prefetch driver for user {} every {:?}",
                context.user_id, self.interval
            );
            let handle = tokio::spawn(drive(
                self.orchestrator.clone(),
                context.clone(),
                self.lifecycle.subscribe(),
                self.interval,
            ));
            *driver = Some(Driver { context, handle });
        }
    }

    pub fn current_context(&self) -> Option<PrefetchContext> {
        self.driver.lock().as_ref().map(|d| d.context.clone())
    }

    pub fn shutdown(&self) {
        self.set_context(None);
    }
}

impl Drop for PrefetchScheduler {
    fn drop(&mut self) {
        if let Some(driver) = self.driver.get_mut().take() {
            driver.handle.abort();
        }
    }
}

async fn drive(
    orchestrator: PrefetchOrchestrator,
    context: PrefetchContext,
    mut lifecycle: broadcast::Receiver<AppLifecycle>,
    interval: Duration,
) {
    orchestrator
        .maybe_prefetch(&context, PrefetchOptions::forced())
        .await;

    let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                debug!("Prefetch timer fired for user {}", context.user_id);
                orchestrator.maybe_prefetch(&context, PrefetchOptions::default()).await;
            }
            event = lifecycle.recv() => match event {
                Ok(AppLifecycle::Foreground) => {
                    debug!("App entered foreground, prefetching for user {}", context.user_id);
                    orchestrator.maybe_prefetch(&context, PrefetchOptions::default()).await;
                }
                Ok(AppLifecycle::Background) => {}
                Err(RecvError::Lagged(skipped)) => {
                    debug!("Missed {} lifecycle event(s)", skipped);
                }
                Err(RecvError::Closed) => {
                    debug!("Lifecycle channel closed, continuing on the timer only");
                    break;
                }
            }
        }
    }

    loop {
        ticker.tick().await;
        orchestrator
            .maybe_prefetch(&context, PrefetchOptions::default())
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::events::PrefetchEvent;
    use crate::testing::{MemoryStore, StubSource};
    use std::sync::Arc;
    use std::sync::atomic::Ordering;
    use tokio::time::timeout;

    const WAIT: Duration = Duration::from_secs(5);

    struct Harness {
        orchestrator: PrefetchOrchestrator,
        source: Arc<StubSource>,
        clock: Arc<ManualClock>,
        lifecycle: broadcast::Sender<AppLifecycle>,
    }

    fn harness() -> Harness {
        let source = StubSource::new();
        let clock = Arc::new(ManualClock::new(0));
        let orchestrator = PrefetchOrchestrator::new(
            Arc::new(MemoryStore::default()),
            source.clone(),
            clock.clone(),
        );
        let (lifecycle, _) = broadcast::channel(16);
        Harness {
            orchestrator,
            source,
            clock,
            lifecycle,
        }
    }

    async fn next_event(events: &mut broadcast::Receiver<PrefetchEvent>) -> PrefetchEvent {
        timeout(WAIT, events.recv())
            .await
            .expect("timed out waiting for a prefetch event")
            .expect("event channel closed")
    }

    #[tokio::test]
    async fn test_forced_run_then_foreground_triggers() {
        let h = harness();
        let mut events = h.orchestrator.subscribe_events();
        let scheduler = PrefetchScheduler::new(h.orchestrator.clone(), h.lifecycle.clone())
            .with_interval(Duration::from_secs(3600));

        scheduler.set_context(Some(PrefetchContext::new("42", "t")));

        match next_event(&mut events).await {
            PrefetchEvent::Completed(event) => assert!(event.forced),
            other => panic!("unexpected event {:?}", other),
        }
        assert_eq!(h.source.calls(), 9);

        // Foreground inside the TTL window is throttled
        h.lifecycle.send(AppLifecycle::Foreground).unwrap();
        assert!(matches!(next_event(&mut events).await, PrefetchEvent::Skipped(_)));
        assert_eq!(h.source.calls(), 9);

        h.clock.set(301_000);
        h.lifecycle.send(AppLifecycle::Foreground).unwrap();
        match next_event(&mut events).await {
            PrefetchEvent::Completed(event) => assert!(!event.forced),
            other => panic!("unexpected event {:?}", other),
        }
        assert_eq!(h.source.calls(), 18);
    }

    #[tokio::test]
    async fn test_timer_triggers_non_forced_runs() {
        let h = harness();
        let mut events = h.orchestrator.subscribe_events();
        let scheduler = PrefetchScheduler::new(h.orchestrator.clone(), h.lifecycle.clone())
            .with_interval(Duration::from_millis(20));

        scheduler.set_context(Some(PrefetchContext::new("42", "t")));
        assert!(matches!(next_event(&mut events).await, PrefetchEvent::Completed(_)));

        h.clock.set(301_000);
        loop {
            if let PrefetchEvent::Completed(event) = next_event(&mut events).await {
                assert!(!event.forced);
                break;
            }
        }
        assert_eq!(h.source.calls(), 18);
    }

    #[tokio::test]
    async fn test_clearing_context_stops_driver() {
        let h = harness();
        let mut events = h.orchestrator.subscribe_events();
        let scheduler = PrefetchScheduler::new(h.orchestrator.clone(), h.lifecycle.clone())
            .with_interval(Duration::from_secs(3600));

        scheduler.set_context(Some(PrefetchContext::new("42", "t")));
        next_event(&mut events).await;

        scheduler.shutdown();
        assert!(scheduler.current_context().is_none());

        h.clock.set(301_000);
        let _ = h.lifecycle.send(AppLifecycle::Foreground);
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(h.source.calls(), 9);
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_same_context_is_a_no_op_and_new_context_restarts() {
        let h = harness();
        let mut events = h.orchestrator.subscribe_events();
        let scheduler = PrefetchScheduler::new(h.orchestrator.clone(), h.lifecycle.clone())
            .with_interval(Duration::from_secs(3600));

        let ctx = PrefetchContext::new("42", "t");
        scheduler.set_context(Some(ctx.clone()));
        next_event(&mut events).await;

        scheduler.set_context(Some(ctx.clone()));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(events.try_recv().is_err());

        scheduler.set_context(Some(PrefetchContext::new("7", "t7")));
        let event = next_event(&mut events).await;
        assert_eq!(event.user_id(), "7");
        assert_eq!(scheduler.current_context().map(|c| c.user_id), Some("7".to_string()));
    }

    #[tokio::test]
    async fn test_switching_user_mid_flight_still_prefetches_new_user() {
        let h = harness();
        h.source.delay_ms.store(50, Ordering::SeqCst);
        let mut events = h.orchestrator.subscribe_events();
        let scheduler = PrefetchScheduler::new(h.orchestrator.clone(), h.lifecycle.clone())
            .with_interval(Duration::from_secs(3600));

        scheduler.set_context(Some(PrefetchContext::new("42", "t")));
        while !h.orchestrator.is_prefetching() {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        scheduler.set_context(Some(PrefetchContext::new("7", "t7")));

        let first = next_event(&mut events).await;
        assert_eq!(first.user_id(), "42");
        match next_event(&mut events).await {
            PrefetchEvent::Completed(event) => {
                assert_eq!(event.user_id, "7");
                assert!(event.forced);
            }
            other => panic!("unexpected event {:?}", other),
        }
        assert_eq!(h.source.calls(), 18);
    }
}
