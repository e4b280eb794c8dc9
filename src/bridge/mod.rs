//! Controller half of the kernel
//!
//! Sits between the host (the notebook front end) and the worker. Its job is
//! mostly bookkeeping:
//!
//! - serialize requests so at most one turn is in flight;
//! - remember the parent of the current turn and stamp its session on
//!   everything the worker publishes;
//! - route `input_reply` straight to the blocked worker, bypassing the queue;
//! - turn the worker's side-channel streams into protocol messages.
//!
//! ```text
//! host --dispatch--> [gate] --process_message--> worker thread
//!  ^                                                  |
//!  +------ on_worker_notification <--- WorkerEvent ---+
//! ```
//!
//! The controller is single-threaded; it is shared with [`Rc`](std::rc::Rc)
//! and driven by a local executor.

#[cfg(not(target_arch = "wasm32"))]
pub mod thread;
pub mod transport;

#[cfg(not(target_arch = "wasm32"))]
pub use thread::ThreadWorker;
pub use transport::WorkerRemote;

use crate::config::KernelOptions;
use crate::kernel::{InputReplyHandle, KernelResult, WorkerEvent};
use crate::magic::{InstallDirectives, ListKind, UninstallDirectives};
use crate::pkg::ReconcileReport;
use crate::protocol::{Header, Message, MsgType, ProtocolError, TurnTracker, WorkerPost};
use futures::StreamExt;
use futures::channel::mpsc;
use futures::future::{self, FutureExt, LocalBoxFuture, Shared};
use futures::lock::Mutex;
use std::cell::RefCell;

type ReadyFuture = Shared<LocalBoxFuture<'static, KernelResult<()>>>;

#[derive(Default)]
struct BridgeState {
    /// Header of the request whose turn is current
    parent: Option<Header>,
    pending_input: Option<InputReplyHandle>,
    turns: TurnTracker,
    disposed: bool,
    on_disposed: Vec<Box<dyn FnOnce()>>,
}

/// The host-facing kernel
pub struct KernelController {
    kernel_id: String,
    remote: RefCell<Option<Box<dyn WorkerRemote>>>,
    state: RefCell<BridgeState>,
    /// Held for the whole of a turn
    gate: Mutex<()>,
    host: Box<dyn Fn(&Message)>,
    ready: RefCell<Option<ReadyFuture>>,
}

impl KernelController {
    /// `host` receives every message bound for the front end
    pub fn new(
        kernel_id: impl Into<String>,
        remote: Box<dyn WorkerRemote>,
        host: impl Fn(&Message) + 'static,
    ) -> Self {
        Self {
            kernel_id: kernel_id.into(),
            remote: RefCell::new(Some(remote)),
            state: RefCell::new(BridgeState::default()),
            gate: Mutex::new(()),
            host: Box::new(host),
            ready: RefCell::new(None),
        }
    }

    pub fn kernel_id(&self) -> &str {
        &self.kernel_id
    }

    /// Start initializing the worker
    ///
    /// Only the first call does anything; later calls return the same
    /// readiness future.
    pub fn initialize(&self, options: KernelOptions) -> LocalBoxFuture<'static, KernelResult<()>> {
        if self.ready.borrow().is_none() {
            let kernel_id = self.kernel_id.clone();
            let init = match self.with_remote(|r| r.initialize(options)) {
                Ok(init) => init.boxed_local(),
                Err(e) => future::ready(Err(e.into())).boxed_local(),
            };
            let init = init
                .inspect(move |result| match result {
                    Ok(()) => tracing::info!(kernel = %kernel_id, "kernel ready"),
                    Err(e) => tracing::error!(kernel = %kernel_id, error = %e, "kernel failed to start"),
                })
                .boxed_local()
                .shared();
            *self.ready.borrow_mut() = Some(init);
        }
        self.ready()
    }

    /// Resolves once the worker is initialized
    ///
    /// Fails with the initialization error if it failed, or `NotReady` if
    /// [`initialize`](Self::initialize) was never called.
    pub fn ready(&self) -> LocalBoxFuture<'static, KernelResult<()>> {
        match self.ready.borrow().as_ref() {
            Some(ready) => ready.clone().boxed_local(),
            None => future::ready(Err(ProtocolError::NotReady.into())).boxed_local(),
        }
    }

    /// Handle one message from the host
    ///
    /// Resolves when the interpreter reports idle for it. An `input_reply`
    /// is delivered immediately and resolves at once.
    pub async fn dispatch(&self, msg: Message) -> KernelResult<()> {
        self.check_alive()?;

        if msg.is(&MsgType::InputReply) {
            return Ok(self.deliver_input(msg)?);
        }

        self.ready().await?;
        let _turn = self.gate.lock().await;
        self.check_alive()?;

        let done = {
            let mut state = self.state.borrow_mut();
            state.parent = Some(msg.header.clone());
            state.turns.open(&msg)?
        };
        tracing::debug!(msg_id = %msg.header.msg_id, msg_type = %msg.header.msg_type, "dispatching");

        let forwarded = match self.with_remote(|r| r.process_message(msg)) {
            Ok(forwarded) => forwarded.await,
            Err(e) => Err(e.into()),
        };
        if let Err(e) = forwarded {
            self.state.borrow_mut().turns.abandon();
            return Err(e);
        }

        done.await?;
        Ok(())
    }

    fn deliver_input(&self, reply: Message) -> Result<(), ProtocolError> {
        let handle = self
            .state
            .borrow_mut()
            .pending_input
            .take()
            .ok_or(ProtocolError::UnexpectedInputReply)?;
        tracing::debug!(msg_id = %reply.header.msg_id, "delivering input reply");
        handle.resolve(reply)
    }

    /// Handle one event posted by the worker
    pub fn on_worker_notification(&self, event: WorkerEvent) -> Result<(), ProtocolError> {
        if self.is_disposed() {
            if let WorkerEvent::InputRequest { reply, .. } = event {
                reply.abandon();
            }
            return Err(ProtocolError::Disposed);
        }

        match event {
            WorkerEvent::Post(WorkerPost::Message(msg)) => self.relay(msg),
            WorkerEvent::Post(WorkerPost::Side { stream }) => {
                let parent = self.state.borrow().parent.clone();
                for msg in stream.into_messages(parent.as_ref()) {
                    (self.host)(&msg);
                }
            }
            WorkerEvent::InputRequest { request, reply } => {
                {
                    let mut state = self.state.borrow_mut();
                    if state.pending_input.is_some() {
                        // The first request keeps the slot.
                        drop(reply);
                        return Err(ProtocolError::InputAlreadyPending);
                    }
                    state.pending_input = Some(reply);
                }
                self.relay(request);
            }
        }
        Ok(())
    }

    fn relay(&self, mut msg: Message) {
        let session = self
            .state
            .borrow()
            .parent
            .as_ref()
            .map(|h| h.session.clone())
            .unwrap_or_default();
        msg.stamp_session(&session);

        (self.host)(&msg);

        if self.state.borrow_mut().turns.observe(&msg) {
            tracing::debug!(msg_id = %msg.header.msg_id, "turn complete");
        }
    }

    /// Feed worker events into [`on_worker_notification`](Self::on_worker_notification)
    /// until the worker hangs up
    pub async fn pump(&self, mut events: mpsc::UnboundedReceiver<WorkerEvent>) {
        while let Some(event) = events.next().await {
            if let Err(e) = self.on_worker_notification(event) {
                tracing::warn!(kernel = %self.kernel_id, error = %e, "dropped worker event");
            }
        }
        tracing::debug!(kernel = %self.kernel_id, "worker event stream closed");
    }

    pub async fn install(&self, directives: InstallDirectives) -> KernelResult<ReconcileReport> {
        self.ready().await?;
        let _turn = self.gate.lock().await;
        self.check_alive()?;
        self.with_remote(|r| r.install(directives))?.await
    }

    pub async fn uninstall(&self, directives: UninstallDirectives) -> KernelResult<ReconcileReport> {
        self.ready().await?;
        let _turn = self.gate.lock().await;
        self.check_alive()?;
        self.with_remote(|r| r.uninstall(directives))?.await
    }

    pub async fn list_installed(&self, kind: ListKind) -> KernelResult<String> {
        self.ready().await?;
        let _turn = self.gate.lock().await;
        self.check_alive()?;
        self.with_remote(|r| r.list_installed(kind))?.await
    }

    pub async fn mount(&self, drive_name: &str, mountpoint: &str) -> KernelResult<()> {
        self.ready().await?;
        self.with_remote(|r| r.mount(drive_name.to_string(), mountpoint.to_string()))?
            .await
    }

    pub async fn cd(&self, path: &str) -> KernelResult<()> {
        self.ready().await?;
        self.with_remote(|r| r.cd(path.to_string()))?.await
    }

    pub async fn is_dir(&self, path: &str) -> KernelResult<bool> {
        self.ready().await?;
        self.with_remote(|r| r.is_dir(path.to_string()))?.await
    }

    /// Stop the worker and release everything
    ///
    /// Idempotent. Outstanding turn and input futures are left pending.
    pub fn dispose(&self) {
        let callbacks = {
            let mut state = self.state.borrow_mut();
            if state.disposed {
                return;
            }
            state.disposed = true;
            if let Some(handle) = state.pending_input.take() {
                handle.abandon();
            }
            std::mem::take(&mut state.on_disposed)
        };

        if let Some(remote) = self.remote.borrow_mut().take() {
            remote.terminate();
        }
        tracing::info!(kernel = %self.kernel_id, "kernel disposed");

        for callback in callbacks {
            callback();
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.state.borrow().disposed
    }

    /// Run `callback` once, when the kernel is disposed
    pub fn on_disposed(&self, callback: impl FnOnce() + 'static) {
        let mut state = self.state.borrow_mut();
        if state.disposed {
            drop(state);
            callback();
        } else {
            state.on_disposed.push(Box::new(callback));
        }
    }

    /// Header of the request whose turn is current
    pub fn parent_header(&self) -> Option<Header> {
        self.state.borrow().parent.clone()
    }

    fn check_alive(&self) -> Result<(), ProtocolError> {
        if self.is_disposed() {
            Err(ProtocolError::Disposed)
        } else {
            Ok(())
        }
    }

    fn with_remote<T>(&self, call: impl FnOnce(&dyn WorkerRemote) -> T) -> Result<T, ProtocolError> {
        self.remote
            .borrow()
            .as_deref()
            .map(call)
            .ok_or(ProtocolError::Disposed)
    }
}
