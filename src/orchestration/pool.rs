//! # Worker Pool
//!
//! Fixed set of OS threads that carry synchronous facade calls over to the
//! scheduler. A worker blocks while the scheduler handles its command, so the
//! pool size bounds how many facade calls are in flight at once.

use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::{Mutex, RwLock};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::thread::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::BridgeError;

type Job = Box<dyn FnOnce() + Send + 'static>;

pub struct WorkerPool {
    sender: RwLock<Option<Sender<Job>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    size: usize,
}

impl WorkerPool {
    pub fn new(size: usize) -> Result<Self, BridgeError> {
        let size = size.max(1);
        let (sender, receiver) = channel::unbounded::<Job>();

        let workers = (0..size)
            .map(|index| {
                let receiver = receiver.clone();
                std::thread::Builder::new()
                    .name(format!("image2sheet-worker-{index}"))
                    .spawn(move || worker_loop(index, receiver))
                    .map_err(|e| BridgeError::Startup(e.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        info!(size, "🏊 POOL: Worker pool started");
        Ok(Self {
            sender: RwLock::new(Some(sender)),
            workers: Mutex::new(workers),
            size,
        })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Run `job` on a worker and block until it returns
    pub fn execute<T, F>(&self, job: F) -> Result<T, BridgeError>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        let sender = self
            .sender
            .read()
            .as_ref()
            .cloned()
            .ok_or(BridgeError::PoolClosed)?;

        let (result_tx, result_rx) = channel::bounded(1);
        sender
            .send(Box::new(move || {
                let _ = result_tx.send(job());
            }))
            .map_err(|_| BridgeError::PoolClosed)?;

        result_rx.recv().map_err(|_| BridgeError::ResponseDropped)
    }

    /// Stop accepting jobs and join every worker. Idempotent.
    pub fn shutdown(&self) {
        if self.sender.write().take().is_none() {
            return;
        }
        let workers: Vec<_> = self.workers.lock().drain(..).collect();
        for worker in workers {
            if worker.join().is_err() {
                warn!("🏊 POOL: Worker thread panicked");
            }
        }
        info!("🏊 POOL: Worker pool stopped");
    }

    pub fn is_shut_down(&self) -> bool {
        self.sender.read().is_none()
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(index: usize, receiver: Receiver<Job>) {
    debug!(worker = index, "🏊 POOL: Worker ready");
    while let Ok(job) = receiver.recv() {
        if catch_unwind(AssertUnwindSafe(job)).is_err() {
            warn!(worker = index, "🏊 POOL: Job panicked");
        }
    }
    debug!(worker = index, "🏊 POOL: Worker exiting");
}
