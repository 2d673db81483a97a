//! Fixed-size worker pool for request handling.
//!
//! The host side runs every inbound request on this pool so a slow
//! main-thread marshal never stalls the connection reader. Jobs are plain
//! closures fed through a crossbeam channel; dropping the pool closes the
//! channel and joins the workers once the queue drains.

use crossbeam_channel::{unbounded, Sender};
use std::thread::{self, JoinHandle};

type Job = Box<dyn FnOnce() + Send + 'static>;

pub struct WorkerPool {
    sender: Option<Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `size` workers (at least one), named `<name>-<n>`.
    pub fn new(size: usize, name: &str) -> std::io::Result<Self> {
        let size = size.max(1);
        let (sender, receiver) = unbounded::<Job>();

        let mut workers = Vec::with_capacity(size);
        for i in 0..size {
            let receiver = receiver.clone();
            let handle = thread::Builder::new()
                .name(format!("{name}-{i}"))
                .spawn(move || {
                    while let Ok(job) = receiver.recv() {
                        job();
                    }
                })?;
            workers.push(handle);
        }

        tracing::debug!(target: "bridge", "worker pool '{name}' started with {size} threads");

        Ok(Self {
            sender: Some(sender),
            workers,
        })
    }

    /// Queue a job. Returns false if the pool is shutting down.
    pub fn execute<F>(&self, job: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        match &self.sender {
            Some(sender) => sender.send(Box::new(job)).is_ok(),
            None => false,
        }
    }

    pub fn size(&self) -> usize {
        self.workers.len()
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.sender.take();
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}
