//! Worker on a native OS thread
//!
//! Commands travel over a std channel and are handled one at a time, each
//! driven to completion before the next is read.

use super::transport::WorkerRemote;
use crate::config::KernelOptions;
use crate::kernel::{KernelError, KernelResult, WorkerDeps, WorkerEvent, WorkerKernel};
use crate::magic::{InstallDirectives, ListKind, UninstallDirectives};
use crate::pkg::ReconcileReport;
use crate::protocol::Message;
use futures::FutureExt;
use futures::channel::{mpsc, oneshot};
use futures::executor::block_on;
use futures::future::BoxFuture;
use std::cell::RefCell;
use std::sync::mpsc as std_mpsc;
use std::thread;

type Reply<T> = oneshot::Sender<KernelResult<T>>;

enum WorkerCommand {
    Initialize(KernelOptions, Reply<()>),
    ProcessMessage(Message, Reply<()>),
    Install(InstallDirectives, Reply<ReconcileReport>),
    Uninstall(UninstallDirectives, Reply<ReconcileReport>),
    List(ListKind, Reply<String>),
    Mount {
        drive_name: String,
        mountpoint: String,
        reply: Reply<()>,
    },
    Cd(String, Reply<()>),
    IsDir(String, Reply<bool>),
}

impl WorkerCommand {
    fn name(&self) -> &'static str {
        match self {
            WorkerCommand::Initialize(..) => "initialize",
            WorkerCommand::ProcessMessage(..) => "process_message",
            WorkerCommand::Install(..) => "install",
            WorkerCommand::Uninstall(..) => "uninstall",
            WorkerCommand::List(..) => "list_installed",
            WorkerCommand::Mount { .. } => "mount",
            WorkerCommand::Cd(..) => "cd",
            WorkerCommand::IsDir(..) => "is_dir",
        }
    }
}

/// A worker kernel on a dedicated thread
pub struct ThreadWorker {
    commands: RefCell<Option<std_mpsc::Sender<WorkerCommand>>>,
}

impl ThreadWorker {
    /// Start the worker thread
    ///
    /// Returns the handle and the stream of events the worker posts back.
    pub fn spawn(deps: WorkerDeps) -> KernelResult<(Self, mpsc::UnboundedReceiver<WorkerEvent>)> {
        let (events, event_rx) = mpsc::unbounded();
        let (tx, rx) = std_mpsc::channel();

        thread::Builder::new()
            .name("kernel-worker".to_string())
            .spawn(move || run(WorkerKernel::new(deps, events), rx))
            .map_err(|e| KernelError::Io(format!("failed to spawn worker thread: {}", e)))?;

        Ok((
            Self {
                commands: RefCell::new(Some(tx)),
            },
            event_rx,
        ))
    }

    fn call<T: Send + 'static>(
        &self,
        command: impl FnOnce(Reply<T>) -> WorkerCommand,
    ) -> BoxFuture<'static, KernelResult<T>> {
        let (tx, rx) = oneshot::channel();
        if let Some(commands) = self.commands.borrow().as_ref() {
            let command = command(tx);
            let name = command.name();
            if commands.send(command).is_err() {
                tracing::debug!(command = name, "worker thread has exited");
            }
        }
        // A dropped reply sender means the worker is gone.
        async move { rx.await.unwrap_or(Err(KernelError::WorkerGone)) }.boxed()
    }
}

fn run(mut worker: WorkerKernel, commands: std_mpsc::Receiver<WorkerCommand>) {
    tracing::debug!("worker thread started");
    while let Ok(command) = commands.recv() {
        tracing::trace!(command = command.name(), "worker command");
        block_on(execute(&mut worker, command));
    }
    worker.dispose();
    tracing::debug!("worker thread exiting");
}

async fn execute(worker: &mut WorkerKernel, command: WorkerCommand) {
    // The controller may have stopped waiting; the work is done regardless.
    match command {
        WorkerCommand::Initialize(options, reply) => {
            let _ = reply.send(worker.initialize(options).await);
        }
        WorkerCommand::ProcessMessage(msg, reply) => {
            let _ = reply.send(worker.process_message(msg).await);
        }
        WorkerCommand::Install(directives, reply) => {
            let _ = reply.send(worker.install(&directives).await);
        }
        WorkerCommand::Uninstall(directives, reply) => {
            let _ = reply.send(worker.uninstall(&directives));
        }
        WorkerCommand::List(kind, reply) => {
            let _ = reply.send(worker.list_installed(kind));
        }
        WorkerCommand::Mount {
            drive_name,
            mountpoint,
            reply,
        } => {
            let _ = reply.send(worker.mount(&drive_name, &mountpoint));
        }
        WorkerCommand::Cd(path, reply) => {
            let _ = reply.send(worker.cd(&path));
        }
        WorkerCommand::IsDir(path, reply) => {
            let _ = reply.send(Ok(worker.is_dir(&path)));
        }
    }
}

impl WorkerRemote for ThreadWorker {
    fn initialize(&self, options: KernelOptions) -> BoxFuture<'static, KernelResult<()>> {
        self.call(|reply| WorkerCommand::Initialize(options, reply))
    }

    fn process_message(&self, msg: Message) -> BoxFuture<'static, KernelResult<()>> {
        self.call(|reply| WorkerCommand::ProcessMessage(msg, reply))
    }

    fn install(
        &self,
        directives: InstallDirectives,
    ) -> BoxFuture<'static, KernelResult<ReconcileReport>> {
        self.call(|reply| WorkerCommand::Install(directives, reply))
    }

    fn uninstall(
        &self,
        directives: UninstallDirectives,
    ) -> BoxFuture<'static, KernelResult<ReconcileReport>> {
        self.call(|reply| WorkerCommand::Uninstall(directives, reply))
    }

    fn list_installed(&self, kind: ListKind) -> BoxFuture<'static, KernelResult<String>> {
        self.call(|reply| WorkerCommand::List(kind, reply))
    }

    fn mount(
        &self,
        drive_name: String,
        mountpoint: String,
    ) -> BoxFuture<'static, KernelResult<()>> {
        self.call(|reply| WorkerCommand::Mount {
            drive_name,
            mountpoint,
            reply,
        })
    }

    fn cd(&self, path: String) -> BoxFuture<'static, KernelResult<()>> {
        self.call(|reply| WorkerCommand::Cd(path, reply))
    }

    fn is_dir(&self, path: String) -> BoxFuture<'static, KernelResult<bool>> {
        self.call(|reply| WorkerCommand::IsDir(path, reply))
    }

    fn terminate(&self) {
        if self.commands.borrow_mut().take().is_some() {
            tracing::debug!("terminating worker thread");
        }
    }
}

impl Drop for ThreadWorker {
    fn drop(&mut self) {
        self.terminate();
    }
}
