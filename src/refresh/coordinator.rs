//! Idle/Batching state machine and its idle timer.
//!
//! ```text
//! Idle --start_batch--> Batching --end_batch | idle timeout--> Idle
//!                                  (one coalesced signal)
//! ```
//!
//! The timer runs on its own thread and wakes on a crossbeam channel each
//! time the deadline moves, so callers never block on it. It also clears
//! the sink's pending marker once that marker has outlived its lifetime.

use crossbeam_channel::{unbounded, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::config::RefreshSettings;
use crate::refresh::{
    Mutation, RefreshOptions, RefreshOrigin, RefreshOutcome, RefreshRequest, RefreshSink,
};

const MARKER_RECHECK: Duration = Duration::from_millis(25);

#[derive(Debug)]
enum State {
    Idle,
    Batching {
        queued: Vec<Mutation>,
        deadline: Instant,
    },
}

/// Result of [`RefreshCoordinator::end_batch`] or an idle-timeout flush.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub mutations: usize,
    pub signaled: bool,
}

/// What [`RefreshCoordinator::notify`] did with a mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notified {
    Queued { pending: usize },
    Signaled(RefreshOutcome),
}

struct Shared {
    state: Mutex<State>,
    sink: Arc<dyn RefreshSink>,
    idle_timeout: Duration,
    compiled_extensions: Vec<String>,
    save_assets_on_flush: bool,
    marker_due: Mutex<Option<Instant>>,
}

impl Shared {
    fn send(&self, request: &RefreshRequest) -> RefreshOutcome {
        match self.sink.signal(request) {
            Ok(report) => {
                if let Some(lifetime) = self.sink.marker_lifetime() {
                    *self.marker_due.lock() = Some(Instant::now() + lifetime);
                }
                RefreshOutcome {
                    signaled: true,
                    already_pending: report.already_pending,
                    error: None,
                }
            }
            Err(e) => {
                tracing::warn!(target: "refresh", "refresh signal failed: {e}");
                RefreshOutcome {
                    signaled: false,
                    already_pending: false,
                    error: Some(e.to_string()),
                }
            }
        }
    }

    /// Leave Batching and send the coalesced signal. Returns `None` if idle.
    fn flush(&self, only_if_expired: bool) -> Option<BatchSummary> {
        let queued = {
            let mut state = self.state.lock();
            match &*state {
                State::Idle => return None,
                State::Batching { deadline, .. } if only_if_expired && Instant::now() < *deadline => {
                    return None;
                }
                State::Batching { .. } => {}
            }
            match std::mem::replace(&mut *state, State::Idle) {
                State::Batching { queued, .. } => queued,
                State::Idle => Vec::new(),
            }
        };

        let mutations = queued.len();
        if mutations == 0 {
            tracing::debug!(target: "refresh", "batch ended with no mutations; nothing to signal");
            return Some(BatchSummary {
                mutations,
                signaled: false,
            });
        }

        let request = RefreshRequest::covering(
            RefreshOrigin::Batch,
            queued,
            &self.compiled_extensions,
            self.save_assets_on_flush,
        );
        let outcome = self.send(&request);
        tracing::info!(target: "refresh", "flushed batch of {mutations} mutation(s)");

        Some(BatchSummary {
            mutations,
            signaled: outcome.signaled,
        })
    }

    fn deadline(&self) -> Option<Instant> {
        match &*self.state.lock() {
            State::Idle => None,
            State::Batching { deadline, .. } => Some(*deadline),
        }
    }

    /// Earliest of the batch deadline and the marker expiry.
    fn next_wake(&self) -> Option<Instant> {
        let marker = *self.marker_due.lock();
        match (self.deadline(), marker) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    fn expire_marker(&self) {
        let due = {
            let mut due = self.marker_due.lock();
            match *due {
                Some(at) if at <= Instant::now() => due.take(),
                _ => None,
            }
        };
        if due.is_none() {
            return;
        }
        match self.sink.expire() {
            Ok(true) => tracing::debug!(target: "refresh", "cleared expired refresh lock"),
            // Rewritten since (or clock skew): look again shortly
            Ok(false) if self.sink.pending() => {
                *self.marker_due.lock() = Some(Instant::now() + MARKER_RECHECK);
            }
            Ok(false) => {}
            Err(e) => tracing::warn!(target: "refresh", "failed to clear refresh lock: {e}"),
        }
    }
}

/// Coalesces project mutations into refresh signals.
///
/// Shared by every request handler; all methods take `&self`.
pub struct RefreshCoordinator {
    shared: Arc<Shared>,
    wake: Option<Sender<()>>,
    timer: Option<JoinHandle<()>>,
}

impl RefreshCoordinator {
    pub fn new(sink: Arc<dyn RefreshSink>, settings: &RefreshSettings) -> std::io::Result<Self> {
        let shared = Arc::new(Shared {
            state: Mutex::new(State::Idle),
            sink,
            idle_timeout: Duration::from_millis(settings.idle_timeout_ms),
            compiled_extensions: settings.compiled_extensions.clone(),
            save_assets_on_flush: settings.save_assets_on_flush,
            marker_due: Mutex::new(None),
        });

        let (wake, woken) = unbounded::<()>();
        let timer_shared = Arc::clone(&shared);
        let timer = thread::Builder::new()
            .name("refresh-timer".to_string())
            .spawn(move || loop {
                let received = match timer_shared.next_wake() {
                    None => woken.recv().map_err(|_| RecvTimeoutError::Disconnected),
                    Some(deadline) => {
                        woken.recv_timeout(deadline.saturating_duration_since(Instant::now()))
                    }
                };
                match received {
                    Ok(()) => continue,
                    Err(RecvTimeoutError::Timeout) => {
                        if let Some(summary) = timer_shared.flush(true) {
                            tracing::debug!(
                                target: "refresh",
                                "batch idle timeout: {} mutation(s), signaled={}",
                                summary.mutations,
                                summary.signaled
                            );
                        }
                        timer_shared.expire_marker();
                    }
                    Err(RecvTimeoutError::Disconnected) => break,
                }
            })?;

        Ok(Self {
            shared,
            wake: Some(wake),
            timer: Some(timer),
        })
    }

    fn poke(&self) {
        if let Some(wake) = &self.wake {
            let _ = wake.send(());
        }
    }

    /// Record a mutation: signal now when idle, queue when batching.
    pub fn notify(&self, mutation: Mutation) -> Notified {
        {
            let mut state = self.shared.state.lock();
            if let State::Batching { queued, deadline } = &mut *state {
                queued.push(mutation);
                *deadline = Instant::now() + self.shared.idle_timeout;
                let pending = queued.len();
                drop(state);
                self.poke();
                return Notified::Queued { pending };
            }
        }

        tracing::debug!(target: "refresh", "{} {} while idle; signaling", mutation.kind, mutation.path);
        let request = RefreshRequest::covering(
            RefreshOrigin::Mutation,
            vec![mutation],
            &self.shared.compiled_extensions,
            false,
        );
        let outcome = self.shared.send(&request);
        self.poke();
        Notified::Signaled(outcome)
    }

    /// Enter Batching. Returns true when a session was already active and
    /// this call joined it.
    pub fn start_batch(&self) -> bool {
        let joined = {
            let mut state = self.shared.state.lock();
            let deadline = Instant::now() + self.shared.idle_timeout;
            match &mut *state {
                State::Batching { deadline: d, .. } => {
                    *d = deadline;
                    true
                }
                State::Idle => {
                    *state = State::Batching {
                        queued: Vec::new(),
                        deadline,
                    };
                    false
                }
            }
        };
        self.poke();
        tracing::debug!(target: "refresh", "batch started (joined={joined})");
        joined
    }

    /// Leave Batching, sending one signal if anything was queued.
    pub fn end_batch(&self) -> BatchSummary {
        let summary = self.shared.flush(false).unwrap_or_default();
        self.poke();
        summary
    }

    /// Explicit refresh; always signals.
    pub fn request_refresh(&self, options: RefreshOptions) -> RefreshOutcome {
        let outcome = self.shared.send(&RefreshRequest::explicit(options));
        self.poke();
        outcome
    }

    pub fn is_batching(&self) -> bool {
        matches!(*self.shared.state.lock(), State::Batching { .. })
    }

    pub fn queued(&self) -> usize {
        match &*self.shared.state.lock() {
            State::Idle => 0,
            State::Batching { queued, .. } => queued.len(),
        }
    }

    /// Whether a recent signal may not have been picked up yet.
    pub fn is_pending(&self) -> bool {
        self.shared.sink.pending()
    }
}

impl Drop for RefreshCoordinator {
    fn drop(&mut self) {
        self.wake.take();
        if let Some(timer) = self.timer.take() {
            let _ = timer.join();
        }
    }
}
