//! A log sync session: one source, one viewer, one log scope.
//!
//! The session wires the two fetch flows to the synchronizer and owns the
//! polling task. Everything is non-blocking from the caller's side:
//! [`LogSession::on_scroll_to_top`] and every poll tick spawn their fetch and
//! return at once, so a slow request never delays the next tick. Awaitable
//! variants ([`LogSession::load_older`], [`LogSession::poll_newer`], ...)
//! return the outcome, or the fetch error, to callers that want it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::backward::BackwardFetcher;
use crate::config::SyncConfig;
use crate::error::Result;
use crate::forward::ForwardPoller;
use crate::model::{FetchRequest, LogId, LogScope, Window};
use crate::source::LogSource;
use crate::stats::StatsSnapshot;
use crate::synchronizer::{MergeOutcome, Synchronizer};
use crate::viewer::LogViewer;

/// Result of one fetch attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The request went out and its response was merged (or discarded).
    Merged(MergeOutcome),
    /// No request was issued.
    Skipped(SkipReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// That history page, or an older one, was already requested.
    AlreadyRequested,
    /// Nothing loaded yet, so there is nothing to poll after.
    Uninitialized,
    /// The previous poll has not answered yet.
    PollInFlight,
    /// A seed load is already running.
    SeedInFlight,
}

impl FetchOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, FetchOutcome::Merged(outcome) if outcome.is_accepted())
    }
}

/// Follows one log stream.
///
/// Must be used from within a tokio runtime: starting the session and the
/// fire-and-forget entry points spawn tasks.
pub struct LogSession<S, V> {
    inner: Arc<SessionInner<S, V>>,
    poller: Mutex<Option<PollTask>>,
}

struct SessionInner<S, V> {
    scope: LogScope,
    config: SyncConfig,
    source: S,
    sync: Synchronizer<V>,
    backward: BackwardFetcher,
    forward: ForwardPoller,
    poll_in_flight: AtomicBool,
    seed_in_flight: AtomicBool,
}

struct PollTask {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Clears a busy flag when the request holding it finishes, fails or is dropped.
struct InFlight<'a>(&'a AtomicBool);

impl<'a> InFlight<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| InFlight(flag))
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl<S: LogSource, V: LogViewer> LogSession<S, V> {
    pub fn new(source: S, viewer: V, scope: LogScope, config: SyncConfig) -> Result<Self> {
        config.validate()?;
        let inner = SessionInner {
            scope,
            backward: BackwardFetcher::new(scope, config.page_size),
            forward: ForwardPoller::new(scope, config.page_size),
            config,
            source,
            sync: Synchronizer::new(viewer),
            poll_in_flight: AtomicBool::new(false),
            seed_in_flight: AtomicBool::new(false),
        };
        Ok(LogSession {
            inner: Arc::new(inner),
            poller: Mutex::new(None),
        })
    }

    pub fn scope(&self) -> LogScope {
        self.inner.scope
    }

    pub fn config(&self) -> &SyncConfig {
        &self.inner.config
    }

    pub fn window(&self) -> Window {
        self.inner.sync.window()
    }

    pub fn viewer(&self) -> &V {
        self.inner.sync.viewer()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.inner.sync.stats().snapshot()
    }

    pub fn oldest_requested(&self) -> Option<LogId> {
        self.inner.backward.oldest_requested()
    }

    /// Loads the most recent page and seeds the window.
    pub async fn load_initial(&self) -> Result<FetchOutcome> {
        self.inner.load_initial().await
    }

    /// Fetches the page before `oldest_visible_id`, unless already requested.
    pub async fn load_older(&self, oldest_visible_id: LogId) -> Result<FetchOutcome> {
        match self.inner.prepare_older(oldest_visible_id) {
            Some((request, start_id)) => self.inner.fetch_backward(request, Some(start_id)).await,
            None => Ok(FetchOutcome::Skipped(SkipReason::AlreadyRequested)),
        }
    }

    /// Fetches records newer than the window's max.
    pub async fn poll_newer(&self) -> Result<FetchOutcome> {
        self.inner.poll_newer().await
    }

    /// One scheduler tick: a forward poll, or a new seed load while the
    /// window is still empty and `reseed_when_empty` is set.
    pub async fn tick(&self) -> Result<FetchOutcome> {
        self.inner.tick().await
    }

    /// Viewer entry point for scroll-to-top.
    ///
    /// The duplicate guard runs before anything is spawned; the returned
    /// handle is `None` when no fetch was issued.
    pub fn on_scroll_to_top(&self, oldest_visible_id: LogId) -> Option<JoinHandle<()>> {
        let (request, start_id) = self.inner.prepare_older(oldest_visible_id)?;
        let inner = Arc::clone(&self.inner);
        Some(tokio::spawn(async move {
            log_failure(
                "history fetch",
                inner.scope,
                inner.fetch_backward(request, Some(start_id)).await,
            );
        }))
    }

    /// Starts the polling task, plus a seed load unless the window already
    /// holds records. Calling it again while running does nothing.
    pub fn start(&self) {
        let mut poller = self.poller.lock().unwrap_or_else(PoisonError::into_inner);
        if poller.is_some() {
            debug!(scope = %self.inner.scope, "session already running");
            return;
        }

        if !self.inner.sync.window().is_initialized() {
            let inner = Arc::clone(&self.inner);
            tokio::spawn(async move {
                log_failure("seed load", inner.scope, inner.load_initial().await);
            });
        }

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(Arc::clone(&self.inner).run_polling(cancel.clone()));
        *poller = Some(PollTask { cancel, handle });
        info!(
            scope = %self.inner.scope,
            page_size = self.inner.config.page_size,
            interval_ms = self.inner.config.poll_interval_ms,
            "session started"
        );
    }

    pub fn is_running(&self) -> bool {
        self.poller
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Stops ticking and waits for the polling task to exit.
    ///
    /// Requests already in flight are not aborted; whatever they return is
    /// merged like any other response.
    pub async fn stop(&self) {
        let task = self
            .poller
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(task) = task else {
            return;
        };
        task.cancel.cancel();
        if let Err(e) = task.handle.await {
            warn!(scope = %self.inner.scope, error = %e, "polling task ended abnormally");
        }
        info!(scope = %self.inner.scope, window = %self.window(), "session stopped");
    }
}

impl<S, V> Drop for LogSession<S, V> {
    fn drop(&mut self) {
        let poller = self.poller.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(task) = poller.take() {
            task.cancel.cancel();
        }
    }
}

impl<S: LogSource, V: LogViewer> SessionInner<S, V> {
    async fn load_initial(&self) -> Result<FetchOutcome> {
        let Some(_seed) = InFlight::acquire(&self.seed_in_flight) else {
            self.sync.stats().record_skip();
            return Ok(FetchOutcome::Skipped(SkipReason::SeedInFlight));
        };
        debug!(scope = %self.scope, "loading tail");
        self.fetch_backward(self.backward.initial_request(), None).await
    }

    fn prepare_older(&self, oldest_visible_id: LogId) -> Option<(FetchRequest, LogId)> {
        match self.backward.request_older_than(oldest_visible_id) {
            Some(request) => Some((request, self.backward.start_id(oldest_visible_id))),
            None => {
                self.sync.stats().record_skip();
                None
            }
        }
    }

    /// `start_id` is the watermark this request claimed, if any; it is handed
    /// back when the fetch fails so the same page can be asked for again.
    async fn fetch_backward(
        &self,
        request: FetchRequest,
        start_id: Option<LogId>,
    ) -> Result<FetchOutcome> {
        match self.source.fetch(request).await {
            Ok(records) => {
                let outcome = self.sync.merge_backward(records);
                if let MergeOutcome::Accepted { window, .. } = outcome {
                    self.backward.settle(window.min);
                }
                Ok(FetchOutcome::Merged(outcome))
            }
            Err(e) => {
                self.sync.stats().record_failure();
                if let Some(start_id) = start_id {
                    self.backward.release(start_id, self.sync.window().min);
                }
                Err(e)
            }
        }
    }

    async fn poll_newer(&self) -> Result<FetchOutcome> {
        let _poll = if self.config.single_flight_polling {
            match InFlight::acquire(&self.poll_in_flight) {
                Some(guard) => Some(guard),
                None => {
                    self.sync.stats().record_skip();
                    return Ok(FetchOutcome::Skipped(SkipReason::PollInFlight));
                }
            }
        } else {
            None
        };

        let Some(request) = self.forward.tick(self.sync.window()) else {
            self.sync.stats().record_skip();
            return Ok(FetchOutcome::Skipped(SkipReason::Uninitialized));
        };
        match self.source.fetch(request).await {
            Ok(records) => Ok(FetchOutcome::Merged(self.sync.merge_forward(records))),
            Err(e) => {
                self.sync.stats().record_failure();
                Err(e)
            }
        }
    }

    async fn tick(&self) -> Result<FetchOutcome> {
        match self.poll_newer().await? {
            FetchOutcome::Skipped(SkipReason::Uninitialized) if self.config.reseed_when_empty => {
                trace!(scope = %self.scope, "window still empty, reseeding");
                self.load_initial().await
            }
            outcome => Ok(outcome),
        }
    }

    async fn run_polling(self: Arc<Self>, cancel: CancellationToken) {
        let mut ticker = interval(self.config.poll_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // the first tick fires at once; the seed load covers it
        ticker.tick().await;

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let inner = Arc::clone(&self);
                    tokio::spawn(async move {
                        log_failure("poll", inner.scope, inner.tick().await);
                    });
                }
            }
        }
        debug!(scope = %self.scope, "polling task exited");
    }
}

fn log_failure(what: &str, scope: LogScope, result: Result<FetchOutcome>) {
    match result {
        Ok(outcome) => trace!(%scope, ?outcome, "{} finished", what),
        Err(e) => warn!(%scope, error = %e, "{} failed", what),
    }
}
