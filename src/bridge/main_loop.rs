//! Serial execution context standing in for the host's main loop.
//!
//! Only the host's main loop may touch host-owned project state. Callers
//! hand it closures through a [`SerialExecutor`]. [`run_blocking`] parks
//! the caller on a reply channel; [`run_deferred`] returns at once and
//! hands the result to a callback, with a [`Deadlines`] thread answering
//! for jobs the host has not reached in time. A deadline stops only the
//! wait: the queued job still runs whenever the host next pumps, so a
//! timeout means "outcome unknown", never "rolled back".

use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::io;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::error::BridgeError;

pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// A single serial execution context.
pub trait SerialExecutor: Send + Sync {
    /// Queue `task`; it runs after every previously queued task.
    fn submit(&self, task: Task) -> Result<(), BridgeError>;
}

/// Queue owned by the host thread. Nothing runs until the host pumps.
pub struct MainLoop {
    sender: Sender<Task>,
    receiver: Receiver<Task>,
}

impl Default for MainLoop {
    fn default() -> Self {
        Self::new()
    }
}

impl MainLoop {
    pub fn new() -> Self {
        let (sender, receiver) = unbounded();
        Self { sender, receiver }
    }

    pub fn handle(&self) -> MainLoopHandle {
        MainLoopHandle {
            sender: self.sender.clone(),
        }
    }

    /// Run every task queued right now. Returns how many ran.
    pub fn pump(&self) -> usize {
        let mut ran = 0;
        while let Ok(task) = self.receiver.try_recv() {
            task();
            ran += 1;
        }
        ran
    }

    /// Run tasks as they arrive until `duration` has elapsed.
    pub fn pump_for(&self, duration: Duration) -> usize {
        let deadline = Instant::now() + duration;
        let mut ran = 0;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return ran + self.pump();
            }
            match self.receiver.recv_timeout(remaining) {
                Ok(task) => {
                    task();
                    ran += 1;
                }
                Err(RecvTimeoutError::Timeout) => return ran,
                Err(RecvTimeoutError::Disconnected) => return ran,
            }
        }
    }

    pub fn queued(&self) -> usize {
        self.receiver.len()
    }
}

/// Cloneable submission side of a [`MainLoop`].
#[derive(Clone)]
pub struct MainLoopHandle {
    sender: Sender<Task>,
}

impl SerialExecutor for MainLoopHandle {
    fn submit(&self, task: Task) -> Result<(), BridgeError> {
        self.sender
            .send(task)
            .map_err(|_| BridgeError::internal("main loop is no longer running"))
    }
}

/// Run `job` on `executor` and wait up to `timeout` for its result.
pub fn run_blocking<T, F>(
    executor: &dyn SerialExecutor,
    method: &str,
    timeout: Duration,
    job: F,
) -> Result<T, BridgeError>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    let (reply, result) = bounded::<T>(1);
    let started = Instant::now();

    executor.submit(Box::new(move || {
        // The waiter may have timed out and gone; the job still ran.
        let _ = reply.send(job());
    }))?;

    match result.recv_timeout(timeout) {
        Ok(value) => Ok(value),
        Err(RecvTimeoutError::Timeout) => {
            tracing::warn!(
                target: "bridge",
                "'{method}' still queued on the main loop after {}ms",
                timeout.as_millis()
            );
            Err(BridgeError::timeout(method, started.elapsed().as_millis()))
        }
        Err(RecvTimeoutError::Disconnected) => Err(BridgeError::internal(format!(
            "main loop dropped '{method}' without running it"
        ))),
    }
}

/// Single timer thread running callbacks once their instant has passed.
///
/// Dropping the last handle stops the thread; callbacks not yet due are
/// discarded.
pub struct Deadlines {
    sender: Sender<(Instant, Task)>,
}

impl Deadlines {
    pub fn start(name: &str) -> io::Result<Self> {
        let (sender, receiver) = unbounded::<(Instant, Task)>();
        thread::Builder::new()
            .name(name.to_string())
            .spawn(move || run_deadlines(receiver))?;
        Ok(Self { sender })
    }

    /// Run `task` on the timer thread at `at`.
    pub fn schedule(&self, at: Instant, task: Task) {
        if let Err(e) = self.sender.send((at, task)) {
            // Timer thread is gone; fire now rather than never.
            let (_, task) = e.into_inner();
            task();
        }
    }
}

fn run_deadlines(receiver: Receiver<(Instant, Task)>) {
    let mut due: BTreeMap<(Instant, u64), Task> = BTreeMap::new();
    let mut seq = 0u64;
    loop {
        let incoming = match due.keys().next() {
            Some((at, _)) => receiver.recv_deadline(*at),
            None => receiver.recv().map_err(|_| RecvTimeoutError::Disconnected),
        };
        match incoming {
            Ok((at, task)) => {
                seq += 1;
                due.insert((at, seq), task);
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => return,
        }

        let now = Instant::now();
        while let Some(entry) = due.first_entry() {
            if entry.key().0 > now {
                break;
            }
            entry.remove()();
        }
    }
}

/// Queue `job` on `executor` and hand its result to `reply` without
/// blocking the caller. If the job has not run by `timeout`, `reply`
/// receives a `TimeoutError` instead; `reply` is called exactly once.
pub fn run_deferred<T, F, R>(
    executor: &dyn SerialExecutor,
    deadlines: &Deadlines,
    method: &str,
    timeout: Duration,
    job: F,
    reply: R,
) where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
    R: FnOnce(Result<T, BridgeError>) + Send + 'static,
{
    let slot = Arc::new(Mutex::new(Some(reply)));
    let started = Instant::now();

    let on_main = Arc::clone(&slot);
    let submitted = executor.submit(Box::new(move || {
        let value = job();
        let reply = on_main.lock().take();
        if let Some(reply) = reply {
            reply(Ok(value));
        }
    }));
    if let Err(e) = submitted {
        let reply = slot.lock().take();
        if let Some(reply) = reply {
            reply(Err(e));
        }
        return;
    }

    let method = method.to_string();
    deadlines.schedule(
        started + timeout,
        Box::new(move || {
            let reply = slot.lock().take();
            if let Some(reply) = reply {
                tracing::warn!(
                    target: "bridge",
                    "'{method}' still queued on the main loop after {}ms",
                    timeout.as_millis()
                );
                reply(Err(BridgeError::timeout(&method, started.elapsed().as_millis())));
            }
        }),
    );
}
