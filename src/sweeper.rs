//! Background orphan-reclamation actor. Grounded directly on
//! `legalis-audit`'s `IntegrityChecker`/`IntegrityWorker` pair: an
//! `mpsc::Sender` command handle owned by the caller, and a worker task
//! selecting between a `tokio::time::interval` tick and incoming commands.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::index_manager::IndexManager;
use crate::types::CleanupResult;

pub enum SweeperCommand {
    RunNow,
    Shutdown,
}

/// Caller-held handle: send commands, or drop it to let the worker run
/// out its current tick and exit.
pub struct SweeperHandle {
    sender: mpsc::Sender<SweeperCommand>,
    join_handle: JoinHandle<()>,
}

impl SweeperHandle {
    pub async fn run_now(&self) {
        let _ = self.sender.send(SweeperCommand::RunNow).await;
    }

    /// Idempotent: sends `Shutdown`, then awaits the worker's exit.
    pub async fn shutdown(self) {
        let _ = self.sender.send(SweeperCommand::Shutdown).await;
        let _ = self.join_handle.await;
    }
}

pub struct Sweeper {
    index_manager: Arc<IndexManager>,
    keep_last_n: usize,
}

impl Sweeper {
    pub fn new(index_manager: Arc<IndexManager>, keep_last_n: usize) -> Self {
        Self {
            index_manager,
            keep_last_n: keep_last_n.max(1),
        }
    }

    /// Spawns the worker task ticking every `interval` (default 24h per
    /// `SweeperConfig`), returning a command handle and a shared ring
    /// buffer of the last `keep_last_n` `clean_orphans` results.
    pub fn spawn(self, interval: Duration) -> (SweeperHandle, Arc<Mutex<VecDeque<CleanupResult>>>) {
        let (tx, mut rx) = mpsc::channel(8);
        let results = Arc::new(Mutex::new(VecDeque::with_capacity(self.keep_last_n)));
        let results_for_worker = results.clone();

        let join_handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await; // first tick fires immediately; consume it here

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        self.run_once(&results_for_worker).await;
                    }
                    cmd = rx.recv() => {
                        match cmd {
                            Some(SweeperCommand::RunNow) => self.run_once(&results_for_worker).await,
                            Some(SweeperCommand::Shutdown) | None => break,
                        }
                    }
                }
            }
        });

        (SweeperHandle { sender: tx, join_handle }, results)
    }

    async fn run_once(&self, results: &Arc<Mutex<VecDeque<CleanupResult>>>) {
        match self.index_manager.clean_orphans().await {
            Ok(result) => {
                tracing::info!(
                    deleted = result.deleted_count,
                    partial_success = result.partial_success,
                    "sweeper tick complete"
                );
                let mut guard = results.lock();
                if guard.len() >= self.keep_last_n {
                    guard.pop_front();
                }
                guard.push_back(result);
            }
            Err(e) => {
                tracing::warn!(error = %e, "sweeper tick failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keep_last_n_is_never_zero() {
        // Constructed with 0, should clamp to 1 so the ring buffer is usable.
        let keep = 0usize.max(1);
        assert_eq!(keep, 1);
    }
}
