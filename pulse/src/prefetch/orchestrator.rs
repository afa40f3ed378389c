use super::listeners::{ListenerGuard, ListenerRegistry};
use crate::cache::{CacheStore, FetchOutcome, accept_all, fetch_and_cache};
use crate::clock::Clock;
use crate::domain::{CacheKey, Period, PrefetchContext};
use crate::events::{
    PrefetchCompletedEvent, PrefetchEvent, PrefetchReport, PrefetchSkippedEvent, SkipReason,
};
use crate::ports::{AnalyticsSource, KeyValueStore};
use futures::FutureExt;
use futures::future::{Shared, join_all};
use parking_lot::Mutex;
use shared::TtlMs;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, oneshot};
use tracing::{debug, info, warn};

type InFlightRun = Shared<oneshot::Receiver<bool>>;

/// The run currently executing and the user it prefetches for
struct InFlight {
    user_id: String,
    run: InFlightRun,
}

const EVENT_CHANNEL_CAPACITY: usize = 64;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PrefetchOptions {
    /// Run even if the last run is younger than the TTL
    pub force: bool,
}

impl PrefetchOptions {
    pub fn forced() -> Self {
        Self { force: true }
    }
}

/// Runs the prefetch batch for a context, at most once at a time
///
/// One orchestrator is built at startup and shared by cloning; all clones
/// observe the same in-flight run, throttle state and listeners.
#[derive(Clone)]
pub struct PrefetchOrchestrator {
    inner: Arc<Inner>,
}

struct Inner {
    cache: CacheStore,
    store: Arc<dyn KeyValueStore>,
    source: Arc<dyn AnalyticsSource>,
    clock: Arc<dyn Clock>,
    ttl: TtlMs,
    in_flight: Mutex<Option<InFlight>>,
    // user id -> last completed run, `None` once storage had nothing
    last_runs: Mutex<HashMap<String, Option<u64>>>,
    listeners: ListenerRegistry,
    event_broadcaster: broadcast::Sender<PrefetchEvent>,
}

impl PrefetchOrchestrator {
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        source: Arc<dyn AnalyticsSource>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self::with_ttl(store, source, clock, crate::CACHE_TTL)
    }

    pub fn with_ttl(
        store: Arc<dyn KeyValueStore>,
        source: Arc<dyn AnalyticsSource>,
        clock: Arc<dyn Clock>,
        ttl: TtlMs,
    ) -> Self {
        let (event_tx, _event_rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Self {
            inner: Arc::new(Inner {
                cache: CacheStore::new(store.clone(), clock.clone()),
                store,
                source,
                clock,
                ttl,
                in_flight: Mutex::new(None),
                last_runs: Mutex::new(HashMap::new()),
                listeners: ListenerRegistry::new(),
                event_broadcaster: event_tx,
            }),
        }
    }

    /// Cache the batch writes into
    pub fn cache(&self) -> &CacheStore {
        &self.inner.cache
    }

    pub fn ttl(&self) -> TtlMs {
        self.inner.ttl
    }

    /// Run the prefetch batch unless throttled, joining a run already in flight
    /// for the same user. A run for another user is waited out first.
    ///
    /// Resolves to `true` only if a batch ran to completion.
    pub async fn maybe_prefetch(&self, ctx: &PrefetchContext, options: PrefetchOptions) -> bool {
        if ctx.is_empty() {
            debug!("Skipping prefetch: no authenticated context");
            return false;
        }

        loop {
            // No await between the check and the set
            let (run, joined) = {
                let mut in_flight = self.inner.in_flight.lock();
                match in_flight.as_ref() {
                    Some(current) if current.user_id == ctx.user_id => {
                        debug!("Prefetch already in flight, joining it");
                        (current.run.clone(), true)
                    }
                    Some(current) => {
                        debug!(
                            "Prefetch for user {} waiting on the run for user {}",
                            ctx.user_id, current.user_id
                        );
                        (current.run.clone(), false)
                    }
                    None => {
                        let (tx, rx) = oneshot::channel();
                        let run = rx.shared();
                        *in_flight = Some(InFlight {
                            user_id: ctx.user_id.clone(),
                            run: run.clone(),
                        });

                        let inner = Arc::clone(&self.inner);
                        let ctx = ctx.clone();
                        tokio::spawn(async move {
                            let slot = InFlightSlot(Arc::clone(&inner));
                            let completed = inner.run(&ctx, options.force).await;
                            drop(slot);
                            let _ = tx.send(completed);
                        });
                        (run, true)
                    }
                }
            };

            let completed = run.await;
            if joined {
                return completed.unwrap_or_else(|_| {
                    warn!("Prefetch run ended without a result");
                    false
                });
            }
            // Another user's run settled; its result says nothing about ours
        }
    }

    pub fn is_prefetching(&self) -> bool {
        self.inner.in_flight.lock().is_some()
    }

    pub fn add_listener<F>(&self, listener: F) -> ListenerGuard
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.inner.listeners.add(listener)
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<PrefetchEvent> {
        self.inner.event_broadcaster.subscribe()
    }

    /// Last completed run for `user_id`, memoized after the first storage read
    pub async fn last_run(&self, user_id: &str) -> Option<u64> {
        self.inner.last_run(user_id).await
    }

    /// Forget the throttle window of `user_id`, e.g. on logout
    pub async fn reset_throttle(&self, user_id: &str) {
        self.inner.last_runs.lock().insert(user_id.to_string(), None);
        if let Err(e) = self.inner.store.remove(&last_run_key(user_id)).await {
            warn!("Failed to clear last prefetch time for user {}: {}", user_id, e);
        }
    }
}

impl std::fmt::Debug for PrefetchOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrefetchOrchestrator")
            .field("ttl_ms", &self.inner.ttl.as_millis())
            .field("in_flight", &self.is_prefetching())
            .field("listeners", &self.inner.listeners.len())
            .finish()
    }
}

/// Empties the in-flight slot when the run finishes or unwinds
struct InFlightSlot(Arc<Inner>);

impl Drop for InFlightSlot {
    fn drop(&mut self) {
        self.0.in_flight.lock().take();
    }
}

fn last_run_key(user_id: &str) -> String {
    format!("{}:last:{}", crate::namespaces::PREFETCH, user_id)
}

impl Inner {
    async fn run(&self, ctx: &PrefetchContext, force: bool) -> bool {
        let now = self.clock.now_ms();

        if !force {
            if let Some(last_run) = self.last_run(&ctx.user_id).await {
                if now.saturating_sub(last_run) < self.ttl.as_millis() {
                    debug!(
                        "Prefetch for user {} throttled, last run {} ms ago",
                        ctx.user_id,
                        now.saturating_sub(last_run)
                    );
                    self.publish(PrefetchEvent::Skipped(PrefetchSkippedEvent {
                        user_id: ctx.user_id.clone(),
                        reason: SkipReason::Throttled,
                        last_run,
                        timestamp: now,
                    }));
                    return false;
                }
            }
        }

        debug!("Starting prefetch batch for user {} (force: {})", ctx.user_id, force);
        let outcomes = self.run_batch(ctx).await;
        let report = PrefetchReport::from_outcomes(&outcomes);

        let finished = self.clock.now_ms();
        self.record_last_run(&ctx.user_id, finished).await;

        let panicked = self.listeners.notify();
        if panicked > 0 {
            warn!("{} prefetch listener(s) panicked", panicked);
        }

        info!(
            "Prefetch for user {} completed: {} refreshed, {} fresh, {} rejected, {} failed",
            ctx.user_id, report.refreshed, report.fresh, report.rejected, report.failed
        );

        self.publish(PrefetchEvent::Completed(PrefetchCompletedEvent {
            user_id: ctx.user_id.clone(),
            report,
            forced: force,
            timestamp: finished,
        }));

        true
    }

    /// Site metrics and author analytics for every period, plus the article list
    async fn run_batch(&self, ctx: &PrefetchContext) -> Vec<FetchOutcome> {
        let site_metrics = join_all(Period::ALL.map(move |period| async move {
            let key = CacheKey::site_metrics(ctx.site_id.as_deref(), period);
            fetch_and_cache(
                &self.cache,
                &key,
                self.ttl,
                || self.source.site_metrics(ctx, period),
                accept_all,
            )
            .await
        }));

        let author_analytics = join_all(Period::ALL.map(move |period| async move {
            let key = CacheKey::author_analytics(ctx.user_id.as_str(), period);
            fetch_and_cache(
                &self.cache,
                &key,
                self.ttl,
                || self.source.author_analytics(ctx, &ctx.user_id, period),
                accept_all,
            )
            .await
        }));

        let articles_key = CacheKey::author_articles(ctx.user_id.as_str());
        let author_articles = fetch_and_cache(
            &self.cache,
            &articles_key,
            self.ttl,
            || self.source.author_articles(ctx, &ctx.user_id),
            accept_all,
        );

        let (site_metrics, author_analytics, author_articles) =
            futures::join!(site_metrics, author_analytics, author_articles);

        site_metrics
            .into_iter()
            .chain(author_analytics)
            .chain(std::iter::once(author_articles))
            .collect()
    }

    async fn last_run(&self, user_id: &str) -> Option<u64> {
        let memoized = self.last_runs.lock().get(user_id).copied();
        if let Some(last_run) = memoized {
            return last_run;
        }

        let last_run = match self.store.get(&last_run_key(user_id)).await {
            Ok(Some(raw)) => match raw.trim().parse::<u64>() {
                Ok(ts) => Some(ts),
                Err(e) => {
                    warn!("Ignoring malformed last prefetch time '{}': {}", raw, e);
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!("Failed to read last prefetch time for user {}: {}", user_id, e);
                None
            }
        };

        self.last_runs.lock().insert(user_id.to_string(), last_run);
        last_run
    }

    async fn record_last_run(&self, user_id: &str, timestamp: u64) {
        self.last_runs
            .lock()
            .insert(user_id.to_string(), Some(timestamp));

        if let Err(e) = self
            .store
            .set(&last_run_key(user_id), timestamp.to_string())
            .await
        {
            warn!("Failed to persist last prefetch time for user {}: {}", user_id, e);
        }
    }

    fn publish(&self, event: PrefetchEvent) {
        match self.event_broadcaster.send(event) {
            Ok(subscriber_count) => {
                debug!("Broadcasted prefetch event to {} subscriber(s)", subscriber_count);
            }
            Err(_) => {
                debug!("No subscribers for prefetch event");
            }
        }
    }
}
