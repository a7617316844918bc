//! # Scheduler Bridge
//!
//! Hosts the [`TaskScheduler`] on a dedicated OS thread with its own
//! single-threaded runtime, and gives synchronous code a way to submit
//! commands and block for the answer.

use parking_lot::Mutex;
use std::thread::JoinHandle;
use tokio::sync::{mpsc, oneshot};
use tracing::{error, info};

use super::scheduler::{CommandResponder, SchedulerCommand, TaskScheduler};
use crate::error::{BridgeError, Result};

/// Blocking handle for sending commands to the scheduler thread.
///
/// Must not be used from inside an async context; the worker pool threads are
/// the intended callers.
#[derive(Debug, Clone)]
pub struct SchedulerClient {
    sender: mpsc::Sender<SchedulerCommand>,
}

impl SchedulerClient {
    pub fn request<T>(
        &self,
        build: impl FnOnce(CommandResponder<T>) -> SchedulerCommand,
    ) -> Result<T> {
        let (resp, response) = oneshot::channel();
        self.sender
            .blocking_send(build(resp))
            .map_err(|_| BridgeError::SchedulerUnavailable)?;
        response
            .blocking_recv()
            .map_err(|_| BridgeError::ResponseDropped)?
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

/// The scheduler's thread
#[derive(Debug)]
pub struct SchedulerThread {
    client: SchedulerClient,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl SchedulerThread {
    /// Start `scheduler` on a new thread and wait until its runtime is up
    pub fn spawn(
        mut scheduler: TaskScheduler,
        sender: mpsc::Sender<SchedulerCommand>,
    ) -> Result<Self> {
        let (ready_tx, ready_rx) = crossbeam::channel::bounded::<std::result::Result<(), String>>(1);

        let handle = std::thread::Builder::new()
            .name("image2sheet-scheduler".to_string())
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(runtime) => runtime,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e.to_string()));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(()));

                if let Err(e) = runtime.block_on(scheduler.start()) {
                    error!(error = %e, "🗓️ SCHEDULER: Command loop failed");
                }
            })
            .map_err(|e| BridgeError::Startup(e.to_string()))?;

        match ready_rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(reason)) => return Err(BridgeError::Startup(reason).into()),
            Err(_) => {
                return Err(
                    BridgeError::Startup("scheduler thread exited during startup".into()).into(),
                )
            }
        }

        info!("🌉 BRIDGE: Scheduler thread running");
        Ok(Self {
            client: SchedulerClient { sender },
            handle: Mutex::new(Some(handle)),
        })
    }

    pub fn client(&self) -> SchedulerClient {
        self.client.clone()
    }

    /// Wait for the scheduler thread to exit. Idempotent.
    pub fn join(&self) -> Result<()> {
        let Some(handle) = self.handle.lock().take() else {
            return Ok(());
        };
        handle
            .join()
            .map_err(|_| BridgeError::SchedulerPanicked)?;
        info!("🌉 BRIDGE: Scheduler thread stopped");
        Ok(())
    }
}
