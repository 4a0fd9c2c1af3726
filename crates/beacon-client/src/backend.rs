//! Seam toward the backend transport.
//!
//! Requests are fire-and-forget: the cache hands over a [`Request`] together
//! with a one-shot handler and never retries. Handlers may be invoked on any
//! thread.

use beacon_shared::error::BackendError;
use beacon_shared::protocol::{Request, Response};
use tokio::sync::mpsc;
use tracing::warn;

use crate::error::{CacheError, Result};

pub type ResultHandler = Box<dyn FnOnce(Response) + Send>;

pub trait Backend: Send + Sync {
    fn send(&self, request: Request, on_result: ResultHandler);
}

/// A request waiting for the transport, with the handler to answer it.
pub struct BackendCommand {
    pub request: Request,
    pub on_result: ResultHandler,
}

impl BackendCommand {
    pub fn respond(self, response: Response) {
        (self.on_result)(response)
    }
}

/// [`Backend`] that queues requests on a bounded tokio channel for a
/// transport task to consume.
#[derive(Clone)]
pub struct ChannelBackend {
    tx: mpsc::Sender<BackendCommand>,
}

impl ChannelBackend {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<BackendCommand>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    /// Queue without waiting. The command is handed back on failure.
    pub fn try_submit(&self, command: BackendCommand) -> std::result::Result<(), (BackendCommand, CacheError)> {
        self.tx.try_send(command).map_err(|err| match err {
            mpsc::error::TrySendError::Full(command) => (
                command,
                CacheError::BackendUnavailable("request queue full".into()),
            ),
            mpsc::error::TrySendError::Closed(command) => (
                command,
                CacheError::BackendUnavailable("transport stopped".into()),
            ),
        })
    }

    /// Queue a request, waiting for capacity.
    pub async fn submit(&self, request: Request, on_result: ResultHandler) -> Result<()> {
        self.tx
            .send(BackendCommand { request, on_result })
            .await
            .map_err(|_| CacheError::BackendUnavailable("transport stopped".into()))
    }
}

impl Backend for ChannelBackend {
    fn send(&self, request: Request, on_result: ResultHandler) {
        if let Err((command, err)) = self.try_submit(BackendCommand { request, on_result }) {
            warn!(request = ?command.request, error = %err, "dropping backend request");
            command.respond(Response::Error(BackendError::new(-1, err.to_string())));
        }
    }
}
