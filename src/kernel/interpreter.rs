//! Interpreter contract
//!
//! The native interpreter is an opaque binary. The worker loads it once,
//! creates a kernel object, starts it, and from then on hands it requests.
//! Whatever the interpreter needs from the outside world while handling a
//! request (publishing messages, reading stdin, logging) it gets from the
//! [`InterpreterIo`] passed into [`InterpreterModule::notify`]; there is no
//! ambient interpreter handle.

use super::error::{KernelError, KernelResult};
use super::logger::WorkerLogger;
use super::stdin::BlockingReplyChannel;
use super::{EventSink, WorkerEvent};
use crate::config::KernelOptions;
use crate::protocol::{Message, TurnTracker, WorkerPost};
use futures::future::LocalBoxFuture;
use std::fmt;

/// Failure reported by the interpreter
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InterpreterFailure {
    /// Numeric exception code; the text comes from
    /// [`InterpreterModule::exception_message`]
    Fault(i32),
    Message(String),
}

/// A loaded interpreter binary
pub trait InterpreterModule {
    /// Create the kernel object, with `argv` or without arguments
    fn create_kernel(&mut self, argv: Option<&[String]>) -> Result<(), InterpreterFailure>;

    fn start(&mut self) -> Result<(), InterpreterFailure>;

    /// Hand a request to the kernel's server
    fn notify(&mut self, msg: Message, io: &mut InterpreterIo<'_>) -> Result<(), InterpreterFailure>;

    /// Human-readable text for a numeric fault
    fn exception_message(&self, code: i32) -> String;

    /// Prepare the embedded Python runtime installed under `prefix`
    fn bootstrap_python(&mut self, prefix: &str, version: (u32, u32)) -> Result<(), InterpreterFailure> {
        let _ = (prefix, version);
        Ok(())
    }
}

/// Loads the interpreter binary named by the kernel spec
pub trait InterpreterLoader: Send {
    fn load(
        &self,
        options: &KernelOptions,
    ) -> LocalBoxFuture<'static, KernelResult<Box<dyn InterpreterModule>>>;
}

/// Turn an interpreter failure into a kernel error
pub fn translate(module: &dyn InterpreterModule, failure: InterpreterFailure) -> KernelError {
    match failure {
        InterpreterFailure::Fault(code) => KernelError::InterpreterFault {
            code,
            message: module.exception_message(code),
        },
        InterpreterFailure::Message(message) => KernelError::Interpreter(message),
    }
}

/// Pending top-level asynchronous work left behind by a cell
///
/// Awaited, and its proxy released, before the next message is processed.
pub struct Continuation {
    pending: LocalBoxFuture<'static, ()>,
    release: Option<Box<dyn FnOnce()>>,
}

impl Continuation {
    pub fn new(pending: LocalBoxFuture<'static, ()>) -> Self {
        Self {
            pending,
            release: None,
        }
    }

    /// Run `release` once the continuation has settled
    pub fn with_release(mut self, release: impl FnOnce() + 'static) -> Self {
        self.release = Some(Box::new(release));
        self
    }

    pub async fn settle(self) {
        self.pending.await;
        if let Some(release) = self.release {
            release();
        }
    }
}

impl fmt::Debug for Continuation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Continuation")
            .field("has_release", &self.release.is_some())
            .finish()
    }
}

/// What the interpreter can reach while handling one request
pub struct InterpreterIo<'a> {
    events: &'a EventSink,
    turns: &'a mut TurnTracker,
    stdin: &'a dyn BlockingReplyChannel,
    logger: &'a WorkerLogger,
    continuation: &'a mut Option<Continuation>,
}

impl<'a> InterpreterIo<'a> {
    pub(crate) fn new(
        events: &'a EventSink,
        turns: &'a mut TurnTracker,
        stdin: &'a dyn BlockingReplyChannel,
        logger: &'a WorkerLogger,
        continuation: &'a mut Option<Continuation>,
    ) -> Self {
        Self {
            events,
            turns,
            stdin,
            logger,
            continuation,
        }
    }

    /// Publish a message to the host
    pub fn publish(&mut self, msg: Message) {
        let idle = msg.is_idle_status();
        let probe = if idle { Some(msg.clone()) } else { None };

        if self
            .events
            .unbounded_send(WorkerEvent::Post(WorkerPost::Message(msg)))
            .is_err()
        {
            tracing::debug!("controller gone, dropping published message");
        }
        if let Some(probe) = probe {
            self.turns.observe(&probe);
        }
    }

    /// Block until the host answers `request`
    pub fn input(&self, request: Message) -> KernelResult<Message> {
        self.stdin.request(request)
    }

    pub fn logger(&self) -> &WorkerLogger {
        self.logger
    }

    /// Leave asynchronous work to finish before the next request
    pub fn defer(&mut self, continuation: Continuation) {
        if self.continuation.replace(continuation).is_some() {
            tracing::warn!("replacing an unsettled top-level continuation");
        }
    }
}
