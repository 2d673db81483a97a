//! Client side of the bridge.
//!
//! One owned connection per client. Calls are correlated by id through a
//! pending map; a response whose id is no longer pending (completed or
//! expired) is dropped. When the reader sees end of stream, every pending
//! call fails with `ConnectionClosed` and every subscription ends.

use crossbeam_channel::{bounded, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::io::BufReader;
use std::net::{Shutdown, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::bridge::catalog::{affinity_of, Affinity};
use crate::bridge::events::{EventBus, Subscription};
use crate::bridge::protocol::{decode_inbound, read_message, write_message, Inbound, Request, Response};
use crate::config::{matches_requirement, BridgeSettings};
use crate::error::BridgeError;

type Pending = Arc<Mutex<HashMap<u64, Sender<Response>>>>;

pub struct BridgeClient {
    stream: TcpStream,
    writer: Mutex<TcpStream>,
    pending: Pending,
    next_id: AtomicU64,
    closed: Arc<AtomicBool>,
    events: Arc<EventBus>,
    reader: Option<JoinHandle<()>>,
    main_thread_timeout: Duration,
    worker_timeout: Duration,
}

impl BridgeClient {
    /// Connect once. Fails with `ConnectionError` if nothing is listening
    /// or the host's protocol version does not satisfy the configured
    /// requirement.
    pub fn connect(settings: &BridgeSettings) -> Result<Self, BridgeError> {
        let stream = TcpStream::connect(&settings.address).map_err(|e| {
            BridgeError::connection(format!("no bridge listening on {}: {e}", settings.address))
        })?;
        let client = Self::from_stream(stream, settings)?;
        client.check_protocol(settings.protocol_requirement.as_deref())?;
        Ok(client)
    }

    /// [`BridgeClient::connect`] with exponential backoff.
    pub fn connect_with_retry(settings: &BridgeSettings) -> Result<Self, BridgeError> {
        let attempts = settings.connect_retries.max(1);
        let mut delay = Duration::from_millis(settings.connect_backoff_ms);
        let mut last = None;

        for attempt in 1..=attempts {
            match Self::connect(settings) {
                Ok(client) => return Ok(client),
                Err(e) => {
                    tracing::debug!(target: "bridge", "connect attempt {attempt}/{attempts} failed: {e}");
                    last = Some(e);
                }
            }
            if attempt < attempts {
                thread::sleep(delay);
                delay = delay.saturating_mul(2);
            }
        }
        Err(last.unwrap_or_else(|| BridgeError::connection("no connection attempts made")))
    }

    fn from_stream(stream: TcpStream, settings: &BridgeSettings) -> Result<Self, BridgeError> {
        let clone = |s: &TcpStream| {
            s.try_clone()
                .map_err(|e| BridgeError::connection(format!("failed to clone stream: {e}")))
        };
        let writer = clone(&stream)?;
        let read_half = clone(&stream)?;

        let pending: Pending = Arc::new(Mutex::new(HashMap::new()));
        let closed = Arc::new(AtomicBool::new(false));
        let events = Arc::new(EventBus::new());

        let reader = {
            let pending = Arc::clone(&pending);
            let closed = Arc::clone(&closed);
            let events = Arc::clone(&events);
            thread::Builder::new()
                .name("bridge-client-reader".to_string())
                .spawn(move || read_loop(read_half, &pending, &events, &closed))
                .map_err(|e| BridgeError::internal(format!("failed to spawn reader: {e}")))?
        };

        Ok(Self {
            stream,
            writer: Mutex::new(writer),
            pending,
            next_id: AtomicU64::new(0),
            closed,
            events,
            reader: Some(reader),
            main_thread_timeout: settings.main_thread_timeout(),
            worker_timeout: settings.worker_timeout(),
        })
    }

    fn check_protocol(&self, requirement: Option<&str>) -> Result<(), BridgeError> {
        let Some(requirement) = requirement else {
            return Ok(());
        };
        let pong = self.call("ping", Value::Null)?;
        let version = pong
            .get("protocolVersion")
            .and_then(Value::as_str)
            .unwrap_or("0.0.0");
        match matches_requirement(version, Some(requirement)) {
            Ok(true) => Ok(()),
            Ok(false) => Err(BridgeError::connection(format!(
                "host protocol {version} does not satisfy {requirement}"
            ))),
            Err(e) => Err(BridgeError::connection(e.to_string())),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Send one request and wait for its response.
    pub fn call(&self, method: &str, params: Value) -> Result<Value, BridgeError> {
        let timeout = match affinity_of(method) {
            Affinity::Worker => self.worker_timeout,
            Affinity::Main => self.main_thread_timeout,
        };
        self.call_with_timeout(method, params, timeout)
    }

    pub fn call_with_timeout(
        &self,
        method: &str,
        params: Value,
        timeout: Duration,
    ) -> Result<Value, BridgeError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let (reply, response) = bounded(1);
        if !register(&self.pending, &self.closed, id, reply) {
            return Err(BridgeError::closed());
        }

        let request = Request {
            id,
            method: method.to_string(),
            params,
        };
        if let Err(e) = write_message(&mut *self.writer.lock(), &request) {
            self.pending.lock().remove(&id);
            tracing::debug!(target: "bridge", "write of request {id} failed: {e}");
            return Err(BridgeError::closed());
        }

        let started = Instant::now();
        match response.recv_timeout(timeout) {
            Ok(response) => response.into_result(),
            Err(RecvTimeoutError::Timeout) => {
                // Late responses for this id are dropped by the reader
                self.pending.lock().remove(&id);
                Err(BridgeError::timeout(method, started.elapsed().as_millis()))
            }
            Err(RecvTimeoutError::Disconnected) => Err(BridgeError::closed()),
        }
    }

    /// Typed form of [`BridgeClient::call`].
    pub fn call_typed<P, R>(&self, method: &str, params: &P) -> Result<R, BridgeError>
    where
        P: Serialize,
        R: DeserializeOwned,
    {
        let params = serde_json::to_value(params)?;
        let value = self.call(method, params)?;
        serde_json::from_value(value).map_err(|e| {
            BridgeError::new(
                crate::error::ErrorKind::ParseError,
                format!("unexpected '{method}' result: {e}"),
            )
        })
    }

    pub fn subscribe(&self) -> Subscription {
        self.events.subscribe()
    }

    pub fn unsubscribe(&self, id: u64) -> bool {
        self.events.unsubscribe(id)
    }

    /// Calls still waiting for a response.
    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    /// Close the connection and wait for the reader to finish.
    pub fn disconnect(mut self) {
        self.close();
    }

    fn close(&mut self) {
        let _ = self.stream.shutdown(Shutdown::Both);
        if let Some(reader) = self.reader.take() {
            let _ = reader.join();
        }
    }
}

impl Drop for BridgeClient {
    fn drop(&mut self) {
        self.close();
    }
}

fn read_loop(stream: TcpStream, pending: &Pending, events: &EventBus, closed: &AtomicBool) {
    let mut reader = BufReader::new(stream);
    loop {
        let line = match read_message(&mut reader) {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                tracing::debug!(target: "bridge", "client read error: {e}");
                break;
            }
        };

        match decode_inbound(&line) {
            Ok(Inbound::Response(response)) => {
                let waiter = pending.lock().remove(&response.id);
                match waiter {
                    Some(waiter) => {
                        let _ = waiter.send(response);
                    }
                    None => {
                        tracing::debug!(target: "bridge", "discarding response for unknown id {}", response.id);
                    }
                }
            }
            Ok(Inbound::Event(event)) => events.publish(&event),
            Err(e) => {
                tracing::warn!(target: "bridge", "skipping undecodable line from host: {e}");
            }
        }
    }

    fail_pending(pending, closed);
    events.close();
}

/// Add a waiter unless the connection is already closed. `closed` is read
/// under the pending lock so a waiter either lands before the drain in
/// [`fail_pending`] or is refused.
fn register(pending: &Pending, closed: &AtomicBool, id: u64, waiter: Sender<Response>) -> bool {
    let mut pending = pending.lock();
    if closed.load(Ordering::SeqCst) {
        return false;
    }
    pending.insert(id, waiter);
    true
}

/// Mark the connection closed and fail every waiter with `ConnectionClosed`.
fn fail_pending(pending: &Pending, closed: &AtomicBool) {
    let orphaned: Vec<(u64, Sender<Response>)> = {
        let mut pending = pending.lock();
        closed.store(true, Ordering::SeqCst);
        pending.drain().collect()
    };
    if !orphaned.is_empty() {
        tracing::debug!(target: "bridge", "connection closed with {} call(s) pending", orphaned.len());
    }
    for (id, waiter) in orphaned {
        let _ = waiter.send(Response::err(id, BridgeError::closed()));
    }
}
