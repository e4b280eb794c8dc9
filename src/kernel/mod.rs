//! The kernel worker
//!
//! Everything that runs on the worker thread: the interpreter contract, the
//! worker state machine, standard input and the log multiplexer.
//!
//! The worker talks back to the controller through a single unbounded
//! channel of [`WorkerEvent`]s. Ordering on that channel is the order the
//! interpreter emitted things in.

pub mod error;
pub mod interpreter;
pub mod logger;
pub mod stdin;
pub mod worker;

pub use error::{KernelError, KernelResult};
pub use interpreter::{
    Continuation, InterpreterFailure, InterpreterIo, InterpreterLoader, InterpreterModule,
};
pub use logger::{LogLevel, LogRecord, LogSink, MemoryLogSink, WorkerLogger};
pub use stdin::{BlockingReplyChannel, InputReplyHandle, RoundTripStdin, SharedMemoryStdin};
pub use worker::{WorkerDeps, WorkerKernel, WorkerState};

use crate::protocol::{Message, WorkerPost};
use futures::channel::mpsc;

/// Something the worker sends to the controller
#[derive(Debug)]
pub enum WorkerEvent {
    /// A published message or a side-channel stream record
    Post(WorkerPost),
    /// The interpreter is blocked until `reply` is resolved
    InputRequest {
        request: Message,
        reply: InputReplyHandle,
    },
}

/// Worker -> controller channel
pub type EventSink = mpsc::UnboundedSender<WorkerEvent>;
