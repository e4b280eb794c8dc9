//! Execution turn tracking
//!
//! A turn opens when a request is handed to the interpreter and closes when
//! the interpreter publishes `status` with `execution_state: "idle"`. There is
//! no explicit completion message on the wire, so the tracker is the only
//! place that knows how completion is detected.

use super::Message;
use super::error::ProtocolError;
use futures::channel::oneshot;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

struct OpenTurn {
    msg_id: String,
    done: oneshot::Sender<()>,
}

/// At most one open turn at a time
#[derive(Default)]
pub struct TurnTracker {
    open: Option<OpenTurn>,
    closed: u64,
}

impl TurnTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a turn for `request`
    ///
    /// Fails if the previous turn has not been closed by an idle status yet.
    pub fn open(&mut self, request: &Message) -> Result<TurnHandle, ProtocolError> {
        if let Some(turn) = &self.open {
            return Err(ProtocolError::TurnAlreadyOpen {
                open: turn.msg_id.clone(),
                incoming: request.header.msg_id.clone(),
            });
        }

        let (done, rx) = oneshot::channel();
        self.open = Some(OpenTurn {
            msg_id: request.header.msg_id.clone(),
            done,
        });
        tracing::trace!(msg_id = %request.header.msg_id, "turn opened");
        Ok(TurnHandle { rx })
    }

    /// Look at an outgoing message; closes the open turn on an idle status
    ///
    /// Returns true if this message closed a turn.
    pub fn observe(&mut self, msg: &Message) -> bool {
        if !msg.is_idle_status() {
            return false;
        }
        match self.open.take() {
            Some(turn) => {
                tracing::trace!(msg_id = %turn.msg_id, "turn closed");
                // The waiter may have gone away; the turn is closed either way.
                let _ = turn.done.send(());
                self.closed += 1;
                true
            }
            None => false,
        }
    }

    /// Drop the open turn without closing it
    ///
    /// Its handle resolves to `Err(ProtocolError::TurnAbandoned)`.
    pub fn abandon(&mut self) -> bool {
        match self.open.take() {
            Some(turn) => {
                tracing::debug!(msg_id = %turn.msg_id, "turn abandoned");
                true
            }
            None => false,
        }
    }

    pub fn is_open(&self) -> bool {
        self.open.is_some()
    }

    /// Id of the request whose turn is open
    pub fn open_request(&self) -> Option<&str> {
        self.open.as_ref().map(|t| t.msg_id.as_str())
    }

    /// Number of turns closed so far
    pub fn closed_count(&self) -> u64 {
        self.closed
    }
}

/// Resolves when its turn is closed
///
/// Yields `Err(ProtocolError::TurnAbandoned)` if the tracker was dropped with
/// the turn still open.
pub struct TurnHandle {
    rx: oneshot::Receiver<()>,
}

impl Future for TurnHandle {
    type Output = Result<(), ProtocolError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(())) => Poll::Ready(Ok(())),
            Poll::Ready(Err(oneshot::Canceled)) => Poll::Ready(Err(ProtocolError::TurnAbandoned)),
            Poll::Pending => Poll::Pending,
        }
    }
}
