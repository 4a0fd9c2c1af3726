//! Foreground task queue.
//!
//! Everything observers see happens on one thread: store writes may land on
//! whichever thread delivered the update, but the resulting notifications
//! are posted here and executed in order by the loop in
//! [`EntityCache::run_foreground`](crate::EntityCache::run_foreground), or by
//! [`ForegroundQueue::run_pending`] when the host drives the queue itself.

use tokio::sync::mpsc;
use tracing::debug;

type Task = Box<dyn FnOnce() + Send>;

pub enum ForegroundTask {
    Run(Task),
    Shutdown,
}

/// Sending half. Cheap to clone.
#[derive(Clone)]
pub struct Foreground {
    tx: mpsc::UnboundedSender<ForegroundTask>,
}

/// Receiving half, owned by whoever runs the foreground thread.
pub struct ForegroundQueue {
    rx: mpsc::UnboundedReceiver<ForegroundTask>,
}

impl Foreground {
    pub fn channel() -> (Foreground, ForegroundQueue) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Foreground { tx }, ForegroundQueue { rx })
    }

    /// Queue `task`. Returns false once the queue has been dropped.
    pub fn post(&self, task: impl FnOnce() + Send + 'static) -> bool {
        if self.tx.send(ForegroundTask::Run(Box::new(task))).is_err() {
            debug!("foreground queue closed, dropping task");
            return false;
        }
        true
    }

    /// Ask the foreground loop to exit after the tasks already queued.
    pub fn shutdown(&self) {
        let _ = self.tx.send(ForegroundTask::Shutdown);
    }
}

impl ForegroundQueue {
    /// Run every task queued so far. Returns how many ran.
    ///
    /// A queued shutdown request is consumed and ends the batch.
    pub fn run_pending(&mut self) -> usize {
        let mut ran = 0;
        while let Ok(task) = self.rx.try_recv() {
            match task {
                ForegroundTask::Run(task) => {
                    task();
                    ran += 1;
                }
                ForegroundTask::Shutdown => break,
            }
        }
        ran
    }

    pub async fn recv(&mut self) -> Option<ForegroundTask> {
        self.rx.recv().await
    }
}
