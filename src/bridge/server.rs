//! Host side of the bridge: accept loop, per-connection readers, and the
//! worker pool every request runs on. Pool threads never wait on the main
//! loop; main-affine replies are written by the main loop itself or by the
//! deadline thread.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::io::{self, BufReader};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::bridge::dispatch::Dispatcher;
use crate::bridge::events::EventSink;
use crate::bridge::main_loop::Deadlines;
use crate::bridge::protocol::{read_message, write_message, Event, Request, Response};
use crate::error::{BridgeError, ErrorKind};
use crate::pool::WorkerPool;

type Writer = Arc<Mutex<TcpStream>>;

/// Live connections' write halves.
#[derive(Default)]
struct Connections {
    next_id: AtomicU64,
    writers: Mutex<HashMap<u64, Writer>>,
}

impl Connections {
    fn add(&self, writer: Writer) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        self.writers.lock().insert(id, writer);
        id
    }

    fn remove(&self, id: u64) {
        self.writers.lock().remove(&id);
    }

    fn shutdown_all(&self) {
        for (_, writer) in self.writers.lock().drain() {
            let _ = writer.lock().shutdown(Shutdown::Both);
        }
    }
}

impl EventSink for Connections {
    fn emit(&self, event: Event) {
        let writers: Vec<(u64, Writer)> = self
            .writers
            .lock()
            .iter()
            .map(|(id, w)| (*id, Arc::clone(w)))
            .collect();

        for (id, writer) in writers {
            if let Err(e) = write_message(&mut *writer.lock(), &event) {
                tracing::debug!(target: "bridge", "dropping connection {id} on event write: {e}");
                self.remove(id);
            }
        }
    }
}

pub struct BridgeServer {
    listener: TcpListener,
    dispatcher: Dispatcher,
    worker_threads: usize,
}

impl BridgeServer {
    /// Bind without accepting yet. Port 0 picks a free port.
    pub fn bind(
        address: impl ToSocketAddrs,
        dispatcher: Dispatcher,
        worker_threads: usize,
    ) -> io::Result<Self> {
        let listener = TcpListener::bind(address)?;
        Ok(Self {
            listener,
            dispatcher,
            worker_threads,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Start accepting on a background thread.
    pub fn start(self) -> io::Result<ServerHandle> {
        let addr = self.listener.local_addr()?;
        let pool = Arc::new(WorkerPool::new(self.worker_threads, "bridge-worker")?);
        let deadlines = Arc::new(Deadlines::start("bridge-deadlines")?);
        let connections = Arc::new(Connections::default());
        let stopping = Arc::new(AtomicBool::new(false));

        self.dispatcher
            .context()
            .set_event_sink(Arc::clone(&connections) as Arc<dyn EventSink>);

        let accept = {
            let connections = Arc::clone(&connections);
            let stopping = Arc::clone(&stopping);
            let pool = Arc::clone(&pool);
            let deadlines = Arc::clone(&deadlines);
            let dispatcher = self.dispatcher;
            let listener = self.listener;
            thread::Builder::new()
                .name("bridge-accept".to_string())
                .spawn(move || {
                    for stream in listener.incoming() {
                        if stopping.load(Ordering::SeqCst) {
                            break;
                        }
                        match stream {
                            Ok(stream) => {
                                if let Err(e) = spawn_reader(
                                    stream,
                                    &connections,
                                    &pool,
                                    &deadlines,
                                    &dispatcher,
                                ) {
                                    tracing::warn!(target: "bridge", "failed to start connection: {e}");
                                }
                            }
                            Err(e) => {
                                tracing::warn!(target: "bridge", "accept failed: {e}");
                            }
                        }
                    }
                    tracing::debug!(target: "bridge", "accept loop stopped");
                })?
        };

        tracing::info!(target: "bridge", "listening on {addr}");

        Ok(ServerHandle {
            addr,
            connections,
            stopping,
            accept: Some(accept),
            _pool: pool,
        })
    }
}

fn spawn_reader(
    stream: TcpStream,
    connections: &Arc<Connections>,
    pool: &Arc<WorkerPool>,
    deadlines: &Arc<Deadlines>,
    dispatcher: &Dispatcher,
) -> io::Result<()> {
    let peer = stream.peer_addr()?;
    let reader = stream.try_clone()?;
    let writer: Writer = Arc::new(Mutex::new(stream));
    let id = connections.add(Arc::clone(&writer));

    let connections = Arc::clone(connections);
    let pool = Arc::clone(pool);
    let deadlines = Arc::clone(deadlines);
    let dispatcher = dispatcher.clone();

    thread::Builder::new()
        .name(format!("bridge-conn-{id}"))
        .spawn(move || {
            tracing::debug!(target: "bridge", "connection {id} from {peer}");
            let mut reader = BufReader::new(reader);
            loop {
                let line = match read_message(&mut reader) {
                    Ok(Some(line)) => line,
                    Ok(None) => break,
                    Err(e) => {
                        tracing::debug!(target: "bridge", "connection {id} read error: {e}");
                        break;
                    }
                };

                let request: Request = match serde_json::from_str(&line) {
                    Ok(request) => request,
                    Err(e) => {
                        let error = BridgeError::new(
                            ErrorKind::ParseError,
                            format!("undecodable request: {e}"),
                        );
                        respond(&writer, &Response::err(0, error));
                        continue;
                    }
                };

                let writer = Arc::clone(&writer);
                let dispatcher = dispatcher.clone();
                let deadlines = Arc::clone(&deadlines);
                let queued = pool.execute(move || {
                    dispatcher.dispatch_deferred(request, &deadlines, move |response| {
                        respond(&writer, &response)
                    });
                });
                if !queued {
                    break;
                }
            }
            connections.remove(id);
            tracing::debug!(target: "bridge", "connection {id} closed");
        })?;
    Ok(())
}

fn respond(writer: &Writer, response: &Response) {
    if let Err(e) = write_message(&mut *writer.lock(), response) {
        // Client is gone; its pending calls already failed on its side.
        tracing::debug!(target: "bridge", "failed to send response {}: {e}", response.id);
    }
}

/// Running server. Dropping it stops accepting and closes every connection.
pub struct ServerHandle {
    addr: SocketAddr,
    connections: Arc<Connections>,
    stopping: Arc<AtomicBool>,
    accept: Option<JoinHandle<()>>,
    _pool: Arc<WorkerPool>,
}

impl ServerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Broadcast an unsolicited event to every live connection.
    pub fn emit(&self, event: Event) {
        self.connections.emit(event);
    }

    pub fn connection_count(&self) -> usize {
        self.connections.writers.lock().len()
    }

    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        if self.stopping.swap(true, Ordering::SeqCst) {
            return;
        }
        // Wake the blocking accept
        let _ = TcpStream::connect(self.addr);
        if let Some(accept) = self.accept.take() {
            let _ = accept.join();
        }
        self.connections.shutdown_all();
        tracing::info!(target: "bridge", "server on {} stopped", self.addr);
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        self.stop();
    }
}
