//! Controller -> worker transport
//!
//! The controller never touches the worker's state directly. It calls a
//! [`WorkerRemote`], whose methods enqueue a command and hand back a future
//! for the worker's answer. Whatever carries the commands must deliver them
//! strictly in arrival order.
//!
//! Native builds get [`ThreadWorker`](super::thread::ThreadWorker). In the
//! browser the worker lives in a Web Worker owned by the host page, which
//! supplies its own implementation to [`Kernel::attach`](crate::Kernel::attach).

use crate::config::KernelOptions;
use crate::kernel::KernelResult;
use crate::magic::{InstallDirectives, ListKind, UninstallDirectives};
use crate::pkg::ReconcileReport;
use crate::protocol::Message;
use futures::future::BoxFuture;

/// The worker, seen from the controller
pub trait WorkerRemote {
    fn initialize(&self, options: KernelOptions) -> BoxFuture<'static, KernelResult<()>>;

    /// Resolves once the interpreter has returned from the request, which
    /// is not necessarily when its turn is over
    fn process_message(&self, msg: Message) -> BoxFuture<'static, KernelResult<()>>;

    fn install(
        &self,
        directives: InstallDirectives,
    ) -> BoxFuture<'static, KernelResult<ReconcileReport>>;

    fn uninstall(
        &self,
        directives: UninstallDirectives,
    ) -> BoxFuture<'static, KernelResult<ReconcileReport>>;

    fn list_installed(&self, kind: ListKind) -> BoxFuture<'static, KernelResult<String>>;

    fn mount(&self, drive_name: String, mountpoint: String)
    -> BoxFuture<'static, KernelResult<()>>;

    fn cd(&self, path: String) -> BoxFuture<'static, KernelResult<()>>;

    fn is_dir(&self, path: String) -> BoxFuture<'static, KernelResult<bool>>;

    /// Stop the worker; outstanding calls fail with `WorkerGone`
    fn terminate(&self);
}
