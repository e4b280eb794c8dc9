//! Standard input for the interpreter
//!
//! The interpreter asks for input synchronously and cannot yield while it
//! waits. The worker thread therefore blocks until the controller delivers
//! the matching `input_reply`. How it blocks depends on what the host can do:
//!
//! - [`SharedMemoryStdin`]: wait/notify on a slot shared with the controller
//! - [`RoundTripStdin`]: a blocking request whose response is the reply
//!
//! Both hand the controller an [`InputReplyHandle`] along with the
//! `input_request`; resolving the handle wakes the worker.

use super::error::{KernelError, KernelResult};
use super::{EventSink, WorkerEvent};
use crate::config::StdinMode;
use crate::protocol::{Message, ProtocolError};
use std::sync::mpsc;
use std::sync::{Arc, Condvar, Mutex, PoisonError};

/// Blocks the caller until the reply to `request` arrives
pub trait BlockingReplyChannel: Send {
    fn request(&self, request: Message) -> KernelResult<Message>;
}

/// Build the channel for `mode`
pub fn channel_for(mode: StdinMode, events: EventSink) -> Box<dyn BlockingReplyChannel> {
    match mode {
        StdinMode::SharedMemory => Box::new(SharedMemoryStdin::new(events)),
        StdinMode::RoundTrip => Box::new(RoundTripStdin::new(events)),
    }
}

#[derive(Debug, Default)]
struct SlotState {
    reply: Option<Message>,
    armed: bool,
    closed: bool,
}

/// Single-reply slot shared between the worker and the controller
#[derive(Debug, Default)]
pub struct InputSlot {
    state: Mutex<SlotState>,
    ready: Condvar,
}

impl InputSlot {
    fn arm(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.reply = None;
        state.armed = true;
    }

    fn fulfill(&self, reply: Message) -> Result<(), ProtocolError> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.closed {
            return Err(ProtocolError::InputAbandoned);
        }
        if !state.armed {
            return Err(ProtocolError::UnexpectedInputReply);
        }
        state.armed = false;
        state.reply = Some(reply);
        self.ready.notify_one();
        Ok(())
    }

    fn close(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.closed = true;
        self.ready.notify_all();
    }

    fn wait(&self) -> Result<Message, ProtocolError> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            if let Some(reply) = state.reply.take() {
                return Ok(reply);
            }
            if state.closed {
                return Err(ProtocolError::InputAbandoned);
            }
            state = self
                .ready
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }
}

/// The controller's end of one pending input request
#[derive(Debug)]
pub enum InputReplyHandle {
    Shared(Arc<InputSlot>),
    RoundTrip(mpsc::Sender<Message>),
}

impl InputReplyHandle {
    /// Deliver the reply and wake the worker
    pub fn resolve(self, reply: Message) -> Result<(), ProtocolError> {
        match self {
            InputReplyHandle::Shared(slot) => slot.fulfill(reply),
            InputReplyHandle::RoundTrip(tx) => {
                tx.send(reply).map_err(|_| ProtocolError::InputAbandoned)
            }
        }
    }

    /// Wake the worker without a reply
    pub fn abandon(self) {
        match self {
            InputReplyHandle::Shared(slot) => slot.close(),
            // Dropping the sender disconnects the waiting receiver.
            InputReplyHandle::RoundTrip(_) => {}
        }
    }
}

/// Blocks on a slot shared with the controller
pub struct SharedMemoryStdin {
    slot: Arc<InputSlot>,
    events: EventSink,
}

impl SharedMemoryStdin {
    pub fn new(events: EventSink) -> Self {
        Self {
            slot: Arc::new(InputSlot::default()),
            events,
        }
    }
}

impl BlockingReplyChannel for SharedMemoryStdin {
    fn request(&self, request: Message) -> KernelResult<Message> {
        self.slot.arm();
        tracing::debug!(msg_id = %request.header.msg_id, "waiting for input (shared memory)");
        self.events
            .unbounded_send(WorkerEvent::InputRequest {
                request,
                reply: InputReplyHandle::Shared(Arc::clone(&self.slot)),
            })
            .map_err(|_| KernelError::WorkerGone)?;
        Ok(self.slot.wait()?)
    }
}

/// Blocks on a one-off response channel per request
pub struct RoundTripStdin {
    events: EventSink,
}

impl RoundTripStdin {
    pub fn new(events: EventSink) -> Self {
        Self { events }
    }
}

impl BlockingReplyChannel for RoundTripStdin {
    fn request(&self, request: Message) -> KernelResult<Message> {
        let (tx, rx) = mpsc::channel();
        tracing::debug!(msg_id = %request.header.msg_id, "waiting for input (round trip)");
        self.events
            .unbounded_send(WorkerEvent::InputRequest {
                request,
                reply: InputReplyHandle::RoundTrip(tx),
            })
            .map_err(|_| KernelError::WorkerGone)?;
        rx.recv()
            .map_err(|_| KernelError::Protocol(ProtocolError::InputAbandoned))
    }
}
