//! Background repair worker

use std::thread::{self, JoinHandle};

use tokio::sync::watch;

use crate::core::types::Result;
use super::pipeline::{CancelToken, RepairState, RepairStatus, WorldRepair};

/// A [`WorldRepair`] running on its own thread.
///
/// The worker is the only writer of the status; owners read snapshots
/// through [`status`](Self::status) or a [`subscribe`](Self::subscribe)d
/// receiver, and stop it with [`cancel`](Self::cancel).
pub struct RepairTask {
    cancel: CancelToken,
    status: watch::Receiver<RepairStatus>,
    handle: Option<JoinHandle<RepairStatus>>,
}

impl RepairTask {
    /// Start the run on a new thread
    pub fn spawn(repair: WorldRepair) -> Result<Self> {
        let cancel = CancelToken::new();
        let (status_tx, status_rx) = watch::channel(RepairStatus::default());

        let worker_cancel = cancel.clone();
        let handle = thread::Builder::new()
            .name("world-repair".to_string())
            .spawn(move || repair.run_with_progress(&worker_cancel, &status_tx))?;

        Ok(Self {
            cancel,
            status: status_rx,
            handle: Some(handle),
        })
    }

    /// Ask the worker to stop after the chunk it is on
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Latest published snapshot
    pub fn status(&self) -> RepairStatus {
        self.status.borrow().clone()
    }

    /// Receiver notified on every published snapshot
    pub fn subscribe(&self) -> watch::Receiver<RepairStatus> {
        self.status.clone()
    }

    /// Whether the worker thread has exited
    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().is_none_or(|h| h.is_finished())
    }

    /// Wait for the run to stop without blocking the async runtime
    pub async fn wait(&mut self) -> RepairStatus {
        let terminal = match self.status.wait_for(|s| s.state.is_terminal()).await {
            Ok(status) => Some(status.clone()),
            // Worker gone without a terminal snapshot
            Err(_) => None,
        };
        terminal.unwrap_or_else(|| self.status())
    }

    /// Block until the worker exits and return its final status
    pub fn join(mut self) -> RepairStatus {
        let Some(handle) = self.handle.take() else {
            return self.status();
        };

        match handle.join() {
            Ok(status) => status,
            Err(_) => {
                let mut status = self.status();
                status.state = RepairState::Failed;
                status.error = "Repair worker panicked".to_string();
                status
            }
        }
    }
}
