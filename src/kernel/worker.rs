//! Worker half of the kernel
//!
//! Owns the interpreter, the package environment and the filesystem. Lives
//! on the worker thread and handles one command at a time:
//!
//! ```text
//! Uninitialized -> Initializing -> Ready <-> Busy
//!                                    \        \
//!                                     +--------+--> Disposed
//! ```
//!
//! `Busy` lasts from forwarding an `execute_request` until the interpreter
//! publishes an idle status. A failed initialization leaves the worker in
//! `Initializing`; it never becomes ready.

use super::error::{KernelError, KernelResult};
use super::interpreter::{
    Continuation, InterpreterIo, InterpreterLoader, InterpreterModule, translate,
};
use super::logger::{LogSink, WorkerLogger};
use super::stdin::{self, BlockingReplyChannel};
use super::{EventSink, WorkerEvent};
use crate::config::KernelOptions;
use crate::magic::{self, InstallDirectives, ListKind, MagicCommand, UninstallDirectives};
use crate::pkg::{
    KernelLinkedLibs, ManagedRuntime, ManifestSource, Origin, PkgError, ReconcileReport,
    Reconciler, SolveRequest, Solver, format_package_list,
};
use crate::protocol::{
    ExecuteRequest, ExecutionState, Message, MsgType, ProtocolError, TurnTracker, WorkerPost,
};
use crate::vfs::PackageFs;
use std::fmt;

/// Worker lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Uninitialized,
    Initializing,
    Ready,
    Busy,
    Disposed,
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WorkerState::Uninitialized => "uninitialized",
            WorkerState::Initializing => "initializing",
            WorkerState::Ready => "ready",
            WorkerState::Busy => "busy",
            WorkerState::Disposed => "disposed",
        };
        f.write_str(name)
    }
}

/// External collaborators, handed over to the worker thread
pub struct WorkerDeps {
    pub loader: Box<dyn InterpreterLoader>,
    pub fs: Box<dyn PackageFs + Send>,
    pub solver: Box<dyn Solver>,
    pub manifests: Box<dyn ManifestSource>,
    pub log_sink: Box<dyn LogSink>,
}

pub struct WorkerKernel {
    state: WorkerState,
    loader: Box<dyn InterpreterLoader>,
    fs: Box<dyn PackageFs + Send>,
    solver: Box<dyn Solver>,
    manifests: Box<dyn ManifestSource>,
    events: EventSink,
    logger: WorkerLogger,
    interpreter: Option<Box<dyn InterpreterModule>>,
    stdin: Option<Box<dyn BlockingReplyChannel>>,
    reconciler: Option<Reconciler>,
    /// Channels from the manifest, used when a magic names none
    channels: Vec<String>,
    turns: TurnTracker,
    continuation: Option<Continuation>,
    execution_count: u64,
}

impl WorkerKernel {
    pub fn new(deps: WorkerDeps, events: EventSink) -> Self {
        let logger = WorkerLogger::new(events.clone(), deps.log_sink);
        Self {
            state: WorkerState::Uninitialized,
            loader: deps.loader,
            fs: deps.fs,
            solver: deps.solver,
            manifests: deps.manifests,
            events,
            logger,
            interpreter: None,
            stdin: None,
            reconciler: None,
            channels: Vec::new(),
            turns: TurnTracker::new(),
            continuation: None,
            execution_count: 0,
        }
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    pub fn execution_count(&self) -> u64 {
        self.execution_count
    }

    /// Load the interpreter, bootstrap the environment and start the kernel
    pub async fn initialize(&mut self, options: KernelOptions) -> KernelResult<()> {
        if self.state != WorkerState::Uninitialized {
            return Err(KernelError::AlreadyInitialized);
        }
        self.state = WorkerState::Initializing;
        self.logger.set_kernel_id(options.kernel_id.clone());
        tracing::info!(kernel = %options.kernel_id, spec = %options.kernel_spec.name, "initializing kernel");

        self.stdin = Some(stdin::channel_for(options.stdin_mode(), self.events.clone()));

        match self.bootstrap(&options).await {
            Ok(()) => {
                self.state = WorkerState::Ready;
                self.logger.log("Kernel successfully started!");
                Ok(())
            }
            Err(e) => {
                self.logger.error(&e.to_string());
                Err(e)
            }
        }
    }

    async fn bootstrap(&mut self, options: &KernelOptions) -> KernelResult<()> {
        let mut interpreter = self.loader.load(options).await?;

        let manifest = self.manifests.fetch(&options.manifest_url()).await?;
        let desired = manifest.package_set(&options.package_root_url());
        let runtime = ManagedRuntime::for_kernel(&options.kernel_spec.name);
        let linked = KernelLinkedLibs::new(options.kernel_spec.metadata.shared.values().cloned());
        let mut reconciler = Reconciler::new(manifest.prefix.clone(), linked, runtime);
        self.channels = manifest.channels.clone();

        if self.fs.supports_packages() {
            // Extension modules load only once Python knows its prefix.
            let report = reconciler.reconcile_staged(&mut *self.fs, desired)?;

            if runtime == Some(ManagedRuntime::Python) {
                let version = reconciler
                    .installed()
                    .python_version()
                    .ok_or_else(|| PkgError::MissingRuntime("Python".into()))?;
                self.logger.log("Starting Python");
                interpreter
                    .bootstrap_python(reconciler.prefix(), version)
                    .map_err(|f| translate(&*interpreter, f))?;
            }

            let loaded = reconciler.load_pending(&mut *self.fs)?;
            tracing::info!(
                packages = report.added.len(),
                loaded = loaded.len(),
                deferred = report.deferred.len(),
                "environment bootstrapped"
            );
        } else {
            self.logger.warn(&format!(
                "Cannot initialize the file-system of {} since it wasn't compiled with FS support.",
                options.kernel_spec.dir
            ));
        }
        self.reconciler = Some(reconciler);

        if let Err(failure) = interpreter.create_kernel(Some(options.kernel_spec.argv.as_slice())) {
            tracing::debug!(?failure, "kernel rejected argv, creating it without arguments");
            interpreter
                .create_kernel(None)
                .map_err(|f| translate(&*interpreter, f))?;
        }
        interpreter
            .start()
            .map_err(|f| translate(&*interpreter, f))?;

        self.interpreter = Some(interpreter);
        Ok(())
    }

    /// Handle one request from the controller
    ///
    /// Settles the previous cell's top-level continuation first, so it never
    /// runs alongside the new request. If handling fails while a turn is
    /// open, the turn is closed with an idle status so the controller's gate
    /// is released.
    pub async fn process_message(&mut self, msg: Message) -> KernelResult<()> {
        let request = msg.clone();
        let result = self.handle(msg).await;
        if result.is_err() && self.turns.open_request() == Some(request.header.msg_id.as_str()) {
            self.close_failed_turn(&request);
        }
        result
    }

    async fn handle(&mut self, mut msg: Message) -> KernelResult<()> {
        self.ensure_ready()?;

        if let Some(continuation) = self.continuation.take() {
            tracing::debug!("settling top-level continuation");
            continuation.settle().await;
        }

        match msg.msg_type() {
            MsgType::InputReply => {
                // Replies travel through the stdin channel, never through here.
                return Err(ProtocolError::UnexpectedInputReply.into());
            }
            MsgType::ExecuteRequest => {
                let request: ExecuteRequest =
                    msg.content_as().map_err(|e| ProtocolError::Malformed {
                        msg_type: msg.header.msg_type.clone(),
                        reason: e.to_string(),
                    })?;
                // Dropped handle: the worker only needs to know whether a
                // turn is open, not to wait for it.
                let _turn = self.turns.open(&msg)?;
                self.state = WorkerState::Busy;

                self.execution_count += 1;
                self.logger.set_execution_count(self.execution_count);

                let run = self.process_magics(&request.code).await;
                msg.content["code"] = run.into();
            }
            _ => {}
        }

        self.forward(msg)
    }

    fn close_failed_turn(&mut self, request: &Message) {
        tracing::warn!(msg_id = %request.header.msg_id, "closing turn after failure");
        self.turns.abandon();
        let idle = Message::status(request, ExecutionState::Idle);
        if self
            .events
            .unbounded_send(WorkerEvent::Post(WorkerPost::Message(idle)))
            .is_err()
        {
            tracing::debug!("controller gone, idle status dropped");
        }
        if self.state == WorkerState::Busy {
            self.state = WorkerState::Ready;
        }
    }

    fn forward(&mut self, msg: Message) -> KernelResult<()> {
        let interpreter = self
            .interpreter
            .as_mut()
            .ok_or(ProtocolError::NotReady)?;
        let stdin = self.stdin.as_deref().ok_or(ProtocolError::NotReady)?;

        let mut io = InterpreterIo::new(
            &self.events,
            &mut self.turns,
            stdin,
            &self.logger,
            &mut self.continuation,
        );
        let result = interpreter.notify(msg, &mut io);

        self.state = if self.turns.is_open() {
            WorkerState::Busy
        } else {
            WorkerState::Ready
        };
        result.map_err(|f| translate(&**interpreter, f))
    }

    /// Run a cell's magics; returns the code left to execute
    ///
    /// Package errors are reported to the user and do not stop the cell.
    async fn process_magics(&mut self, code: &str) -> String {
        let cell = match magic::parse(code) {
            Ok(cell) => cell,
            Err(e) => {
                self.logger.error(&e.to_string());
                return String::new();
            }
        };
        if cell.is_plain() {
            return cell.run;
        }

        for command in &cell.commands {
            let result = match command {
                MagicCommand::Install(directives) => self.install(directives).await.map(drop),
                MagicCommand::Uninstall(directives) => self.uninstall(directives).map(drop),
                MagicCommand::List(kind) => self.list_installed(*kind).map(drop),
                MagicCommand::Skipped(line) => {
                    self.logger
                        .warn(&format!("Skipping unsupported pip command: {}", line.trim()));
                    Ok(())
                }
            };
            if let Err(e) = result {
                self.logger.error(&e.to_string());
            }
        }
        cell.run
    }

    /// Solve for the requested specs and reconcile to the result
    pub async fn install(&mut self, directives: &InstallDirectives) -> KernelResult<ReconcileReport> {
        self.ensure_packages()?;
        let reconciler = self.reconciler.as_mut().ok_or(ProtocolError::NotReady)?;

        let channels = if directives.channels.is_empty() {
            self.channels.clone()
        } else {
            directives.channels.clone()
        };
        let request = SolveRequest {
            specs: directives.specs.clone(),
            pip_specs: directives.pip_specs.clone(),
            installed_packages: reconciler.installed().clone(),
            channels,
        };
        tracing::info!(specs = ?request.specs, pip_specs = ?request.pip_specs, "solving environment");

        let desired = self.solver.solve(request).await?;
        let report = reconciler.reconcile(&mut *self.fs, desired)?;
        self.logger.log(&summarize(&report));
        Ok(report)
    }

    /// Remove the named packages, conda-like and pip-like
    pub fn uninstall(&mut self, directives: &UninstallDirectives) -> KernelResult<ReconcileReport> {
        self.ensure_packages()?;
        let reconciler = self.reconciler.as_mut().ok_or(ProtocolError::NotReady)?;

        let desired = reconciler
            .installed()
            .without(Origin::Conda, &directives.specs)?
            .without(Origin::Pip, &directives.pip_specs)?;
        let report = reconciler.reconcile(&mut *self.fs, desired)?;
        self.logger.log(&summarize(&report));
        Ok(report)
    }

    /// Render the installed packages and print them to the cell output
    pub fn list_installed(&self, kind: ListKind) -> KernelResult<String> {
        let reconciler = self.reconciler.as_ref().ok_or(ProtocolError::NotReady)?;
        let table = format_package_list(reconciler.installed(), kind);
        self.logger.log(table.trim_end());
        Ok(table)
    }

    /// Mount the host drive at `mountpoint`
    pub fn mount(&mut self, drive_name: &str, mountpoint: &str) -> KernelResult<()> {
        if !self.fs.supports_packages() {
            return Ok(());
        }
        self.fs
            .mount(drive_name, mountpoint)
            .map_err(|e| KernelError::io(mountpoint, e))?;
        tracing::info!(drive = %drive_name, %mountpoint, "drive mounted");
        Ok(())
    }

    pub fn cd(&mut self, path: &str) -> KernelResult<()> {
        if path.is_empty() || !self.fs.supports_packages() {
            return Ok(());
        }
        self.fs.chdir(path).map_err(|e| KernelError::io(path, e))
    }

    pub fn is_dir(&self, path: &str) -> bool {
        self.fs.is_dir(path)
    }

    /// Drop the interpreter; every later request fails
    pub fn dispose(&mut self) {
        if self.state == WorkerState::Disposed {
            return;
        }
        tracing::info!(state = %self.state, "disposing worker");
        self.state = WorkerState::Disposed;
        self.interpreter = None;
        self.continuation = None;
        self.stdin = None;
    }

    fn ensure_ready(&self) -> KernelResult<()> {
        match self.state {
            WorkerState::Ready | WorkerState::Busy => Ok(()),
            WorkerState::Disposed => Err(ProtocolError::Disposed.into()),
            WorkerState::Uninitialized | WorkerState::Initializing => {
                Err(ProtocolError::NotReady.into())
            }
        }
    }

    fn ensure_packages(&self) -> KernelResult<()> {
        self.ensure_ready()?;
        if !self.fs.supports_packages() {
            return Err(KernelError::Io(
                "filesystem does not support package installation".into(),
            ));
        }
        Ok(())
    }
}

fn summarize(report: &ReconcileReport) -> String {
    if report.is_noop() {
        return "All requested packages already installed".to_string();
    }
    let mut parts = Vec::new();
    if !report.added.is_empty() {
        let names: Vec<String> = report.added.iter().map(ToString::to_string).collect();
        parts.push(format!("Installed {}", names.join(", ")));
    }
    if !report.removed.is_empty() {
        let names: Vec<String> = report.removed.iter().map(ToString::to_string).collect();
        parts.push(format!("Removed {}", names.join(", ")));
    }
    parts.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::KernelSpec;
    use crate::kernel::interpreter::InterpreterFailure;
    use crate::kernel::logger::MemoryLogSink;
    use crate::pkg::{EnvManifest, ManifestPackage, PackageSet, PkgResult, StaticManifest};
    use crate::protocol::StreamName;
    use crate::vfs::{ArchiveEntry, LibHandle, MemoryFs};
    use futures::channel::mpsc;
    use futures::executor::block_on;
    use futures::future::{self, BoxFuture, FutureExt, LocalBoxFuture};
    use std::sync::{Arc, Mutex};

    type Journal = Arc<Mutex<Vec<String>>>;

    /// Echoes the code back on stdout, then goes idle
    ///
    /// The code `fault` goes busy and then traps without ever going idle.
    struct EchoInterpreter {
        seen: Journal,
        journal: Journal,
    }

    impl InterpreterModule for EchoInterpreter {
        fn create_kernel(&mut self, argv: Option<&[String]>) -> Result<(), InterpreterFailure> {
            match argv {
                Some(argv) if argv.iter().any(|a| a == "--bad") => {
                    Err(InterpreterFailure::Message("bad argv".into()))
                }
                _ => Ok(()),
            }
        }

        fn start(&mut self) -> Result<(), InterpreterFailure> {
            Ok(())
        }

        fn notify(&mut self, msg: Message, io: &mut InterpreterIo<'_>) -> Result<(), InterpreterFailure> {
            let code = msg.content["code"].as_str().unwrap_or_default().to_string();
            self.seen.lock().unwrap().push(code.clone());
            io.publish(Message::status(&msg, ExecutionState::Busy));
            if code == "fault" {
                return Err(InterpreterFailure::Fault(11));
            }
            io.publish(Message::stream(&msg, StreamName::Stdout, code));
            io.publish(Message::status(&msg, ExecutionState::Idle));
            Ok(())
        }

        fn exception_message(&self, code: i32) -> String {
            format!("code {}", code)
        }

        fn bootstrap_python(&mut self, prefix: &str, _: (u32, u32)) -> Result<(), InterpreterFailure> {
            self.journal.lock().unwrap().push(format!("bootstrap_python:{}", prefix));
            Ok(())
        }
    }

    struct EchoLoader {
        seen: Journal,
        journal: Journal,
    }

    impl InterpreterLoader for EchoLoader {
        fn load(
            &self,
            _: &KernelOptions,
        ) -> LocalBoxFuture<'static, KernelResult<Box<dyn InterpreterModule>>> {
            let module: Box<dyn InterpreterModule> = Box::new(EchoInterpreter {
                seen: self.seen.clone(),
                journal: self.journal.clone(),
            });
            future::ready(Ok(module)).boxed_local()
        }
    }

    /// Adds every requested spec as version 1.0
    struct AddingSolver;

    impl Solver for AddingSolver {
        fn solve(&self, request: SolveRequest) -> BoxFuture<'static, PkgResult<PackageSet>> {
            let mut set = request.installed_packages.clone();
            for spec in &request.specs {
                let name = spec.split('=').next().unwrap_or(spec);
                set.insert(
                    Origin::Conda,
                    crate::pkg::PackageRecord::new(name, "1.0", "0", format!("{}-1.0-0.tar.bz2", name))
                        .with_repo("conda-forge", "https://repo"),
                );
            }
            if request.specs.iter().any(|s| s == "unsolvable") {
                return future::ready(Err(PkgError::Solve("nothing provides unsolvable".into()))).boxed();
            }
            future::ready(Ok(set)).boxed()
        }
    }

    fn options(name: &str) -> KernelOptions {
        KernelOptions {
            base_url: "https://lite".into(),
            kernel_id: "k-1".into(),
            kernel_spec: KernelSpec {
                name: name.into(),
                argv: vec!["bin/kernel.js".into()],
                dir: name.into(),
                env_name: "default".into(),
                ..KernelSpec::default()
            },
            ..KernelOptions::default()
        }
    }

    fn manifest(with_python: bool) -> EnvManifest {
        let mut packages = Vec::new();
        if with_python {
            packages.push(ManifestPackage {
                name: "python".into(),
                version: "3.11.3".into(),
                build: "h1".into(),
                channel: "conda-forge".into(),
                filename: "python-3.11.3-h1.tar.bz2".into(),
                ..ManifestPackage::default()
            });
        }
        EnvManifest {
            prefix: "/".into(),
            channels: vec!["conda-forge".into()],
            packages,
            ..EnvManifest::default()
        }
    }

    /// Writes library loads into the interpreter's journal
    struct JournalFs {
        inner: MemoryFs,
        journal: Journal,
    }

    impl PackageFs for JournalFs {
        fn cwd(&self) -> String {
            self.inner.cwd()
        }
        fn chdir(&mut self, path: &str) -> std::io::Result<()> {
            self.inner.chdir(path)
        }
        fn exists(&self, path: &str) -> bool {
            self.inner.exists(path)
        }
        fn is_dir(&self, path: &str) -> bool {
            self.inner.is_dir(path)
        }
        fn create_dir_all(&mut self, path: &str) -> std::io::Result<()> {
            self.inner.create_dir_all(path)
        }
        fn install_archive(&mut self, url: &str, dest: &str) -> std::io::Result<Vec<String>> {
            self.inner.install_archive(url, dest)
        }
        fn remove_path(&mut self, path: &str) -> std::io::Result<()> {
            self.inner.remove_path(path)
        }
        fn load_dynamic_library(&mut self, path: &str) -> std::io::Result<LibHandle> {
            self.journal.lock().unwrap().push(format!("load:{}", path));
            self.inner.load_dynamic_library(path)
        }
        fn mount(&mut self, drive_name: &str, mountpoint: &str) -> std::io::Result<()> {
            self.inner.mount(drive_name, mountpoint)
        }
    }

    fn worker(fs: MemoryFs, manifest: EnvManifest) -> (WorkerKernel, mpsc::UnboundedReceiver<WorkerEvent>, Journal) {
        let journal = Arc::new(Mutex::new(Vec::new()));
        worker_with(Box::new(fs), manifest, journal)
    }

    fn worker_with(
        fs: Box<dyn PackageFs + Send>,
        manifest: EnvManifest,
        journal: Journal,
    ) -> (WorkerKernel, mpsc::UnboundedReceiver<WorkerEvent>, Journal) {
        let (tx, rx) = mpsc::unbounded();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let deps = WorkerDeps {
            loader: Box::new(EchoLoader {
                seen: seen.clone(),
                journal,
            }),
            fs,
            solver: Box::new(AddingSolver),
            manifests: Box::new(StaticManifest(manifest)),
            log_sink: Box::new(MemoryLogSink::new()),
        };
        (WorkerKernel::new(deps, tx), rx, seen)
    }

    fn fs_with_python() -> MemoryFs {
        let mut fs = MemoryFs::new();
        fs.publish_archive(
            "https://lite/xeus/default/kernel_packages/python-3.11.3-h1.tar.bz2",
            &[ArchiveEntry::new("bin/python", b"py".to_vec())],
        );
        fs.publish_archive(
            "https://repo/numpy-1.0-0.tar.bz2",
            &[ArchiveEntry::new("lib/numpy.py", b"np".to_vec())],
        );
        fs
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<WorkerEvent>) -> Vec<WorkerEvent> {
        let mut out = Vec::new();
        while let Ok(Some(event)) = rx.try_next() {
            out.push(event);
        }
        out
    }

    fn side_texts(events: &[WorkerEvent]) -> Vec<String> {
        events
            .iter()
            .filter_map(|e| match e {
                WorkerEvent::Post(WorkerPost::Side { stream }) => Some(stream.text.clone()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_initialize_bootstraps_environment() {
        let (mut worker, mut rx, _) = worker(fs_with_python(), manifest(true));
        block_on(worker.initialize(options("xpython"))).unwrap();

        assert_eq!(worker.state(), WorkerState::Ready);
        assert!(worker.is_dir("/bin"));
        let texts = side_texts(&drain(&mut rx));
        assert!(texts.contains(&"Starting Python\n".to_string()));
        assert!(texts.contains(&"Kernel successfully started!\n".to_string()));
    }

    #[test]
    fn test_python_kernel_without_python_fails() {
        let (mut worker, _rx, _) = worker(MemoryFs::new(), manifest(false));
        let err = block_on(worker.initialize(options("xpython"))).unwrap_err();
        assert_eq!(err, KernelError::Package(PkgError::MissingRuntime("Python".into())));
        assert_eq!(worker.state(), WorkerState::Initializing);
    }

    #[test]
    fn test_no_fs_support_still_starts() {
        let (mut worker, mut rx, _) = worker(MemoryFs::without_package_support(), manifest(true));
        block_on(worker.initialize(options("xpython"))).unwrap();
        assert_eq!(worker.state(), WorkerState::Ready);
        let texts = side_texts(&drain(&mut rx));
        assert!(texts[0].starts_with("Cannot initialize the file-system of xpython"));
    }

    #[test]
    fn test_argv_fallback() {
        let (mut worker, _rx, _) = worker(fs_with_python(), manifest(true));
        let mut opts = options("xcpp");
        opts.kernel_spec.argv.push("--bad".into());
        block_on(worker.initialize(opts)).unwrap();
        assert_eq!(worker.state(), WorkerState::Ready);
    }

    #[test]
    fn test_second_initialize_rejected() {
        let (mut worker, _rx, _) = worker(fs_with_python(), manifest(true));
        block_on(worker.initialize(options("xcpp"))).unwrap();
        assert_eq!(
            block_on(worker.initialize(options("xcpp"))),
            Err(KernelError::AlreadyInitialized)
        );
    }

    #[test]
    fn test_execute_runs_magics_first() {
        let (mut worker, mut rx, seen) = worker(fs_with_python(), manifest(true));
        block_on(worker.initialize(options("xpython"))).unwrap();
        drain(&mut rx);

        let request = Message::execute_request("s1", "%mamba install numpy\nimport numpy");
        block_on(worker.process_message(request)).unwrap();

        assert_eq!(worker.state(), WorkerState::Ready);
        assert_eq!(worker.execution_count(), 1);
        assert_eq!(seen.lock().unwrap().as_slice(), ["import numpy".to_string()]);
        assert!(worker.is_dir("/lib"));
        let texts = side_texts(&drain(&mut rx));
        assert_eq!(texts, vec!["Installed numpy-1.0-0\n".to_string()]);
    }

    #[test]
    fn test_solve_failure_does_not_stop_cell() {
        let (mut worker, mut rx, seen) = worker(fs_with_python(), manifest(true));
        block_on(worker.initialize(options("xpython"))).unwrap();
        drain(&mut rx);

        let request = Message::execute_request("s1", "%conda install unsolvable\nprint(1)");
        block_on(worker.process_message(request)).unwrap();

        assert_eq!(seen.lock().unwrap().as_slice(), ["print(1)".to_string()]);
        let errors: Vec<_> = drain(&mut rx)
            .into_iter()
            .filter_map(|e| match e {
                WorkerEvent::Post(WorkerPost::Side { stream }) if stream.name == StreamName::Stderr => {
                    Some(stream)
                }
                _ => None,
            })
            .collect();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].execution_count, Some(1));
        assert!(errors[0].text.contains("nothing provides unsolvable"));
    }

    #[test]
    fn test_mixed_line_runs_nothing() {
        let (mut worker, mut rx, seen) = worker(fs_with_python(), manifest(true));
        block_on(worker.initialize(options("xcpp"))).unwrap();
        drain(&mut rx);

        let request = Message::execute_request("s1", "x = 1; %pip install six");
        block_on(worker.process_message(request)).unwrap();
        assert_eq!(seen.lock().unwrap().as_slice(), [String::new()]);
    }

    #[test]
    fn test_uninstall_and_list() {
        let (mut worker, mut rx, _) = worker(fs_with_python(), manifest(true));
        block_on(worker.initialize(options("xpython"))).unwrap();
        block_on(worker.install(&InstallDirectives {
            specs: vec!["numpy".into()],
            ..InstallDirectives::default()
        }))
        .unwrap();

        let table = worker.list_installed(ListKind::All).unwrap();
        assert!(table.contains("numpy"));

        let report = worker
            .uninstall(&UninstallDirectives {
                specs: vec!["numpy".into()],
                ..UninstallDirectives::default()
            })
            .unwrap();
        assert_eq!(report.removed.len(), 1);
        assert!(!worker.list_installed(ListKind::All).unwrap().contains("numpy"));
        drain(&mut rx);
    }

    #[test]
    fn test_requests_rejected_before_ready_and_after_dispose() {
        let (mut worker, _rx, _) = worker(fs_with_python(), manifest(true));
        let request = Message::execute_request("s1", "1");
        assert_eq!(
            block_on(worker.process_message(request.clone())),
            Err(KernelError::Protocol(ProtocolError::NotReady))
        );

        block_on(worker.initialize(options("xcpp"))).unwrap();
        worker.dispose();
        worker.dispose();
        assert_eq!(
            block_on(worker.process_message(request)),
            Err(KernelError::Protocol(ProtocolError::Disposed))
        );
    }

    #[test]
    fn test_input_reply_is_rejected() {
        let (mut worker, _rx, _) = worker(fs_with_python(), manifest(true));
        block_on(worker.initialize(options("xcpp"))).unwrap();
        assert_eq!(
            block_on(worker.process_message(Message::input_reply("s1", "x"))),
            Err(KernelError::Protocol(ProtocolError::UnexpectedInputReply))
        );
    }

    #[test]
    fn test_mount_and_cd() {
        let (mut worker, _rx, _) = worker(fs_with_python(), manifest(true));
        block_on(worker.initialize(options("xcpp"))).unwrap();
        worker.mount("notebooks", "/drive").unwrap();
        assert!(worker.is_dir("/drive"));
        worker.cd("/drive").unwrap();
        assert!(worker.cd("/nope").is_err());
        worker.cd("").unwrap();
    }

    #[test]
    fn test_extensions_load_after_python_starts() {
        let journal: Journal = Arc::new(Mutex::new(Vec::new()));
        let mut inner = fs_with_python();
        inner.publish_archive(
            "https://lite/xeus/default/kernel_packages/ext-1.0-0.tar.bz2",
            &[ArchiveEntry::new(
                "lib/python3.11/site-packages/_ext.cpython-311-wasm32.so",
                b"so".to_vec(),
            )],
        );
        let fs = JournalFs {
            inner,
            journal: journal.clone(),
        };
        let mut env = manifest(true);
        env.packages.push(ManifestPackage {
            name: "ext".into(),
            version: "1.0".into(),
            build: "0".into(),
            channel: "conda-forge".into(),
            filename: "ext-1.0-0.tar.bz2".into(),
            ..ManifestPackage::default()
        });

        let (mut worker, _rx, _) = worker_with(Box::new(fs), env, journal.clone());
        block_on(worker.initialize(options("xpython"))).unwrap();

        assert_eq!(
            journal.lock().unwrap().as_slice(),
            [
                "bootstrap_python:/".to_string(),
                "load:/lib/python3.11/site-packages/_ext.cpython-311-wasm32.so".to_string(),
            ]
        );
    }

    #[test]
    fn test_interpreter_fault_closes_the_turn() {
        let (mut worker, mut rx, seen) = worker(fs_with_python(), manifest(true));
        block_on(worker.initialize(options("xcpp"))).unwrap();
        drain(&mut rx);

        let err = block_on(worker.process_message(Message::execute_request("s1", "fault"))).unwrap_err();
        assert_eq!(
            err,
            KernelError::InterpreterFault {
                code: 11,
                message: "code 11".into(),
            }
        );
        assert_eq!(worker.state(), WorkerState::Ready);
        let idle = drain(&mut rx).into_iter().any(|e| match e {
            WorkerEvent::Post(WorkerPost::Message(msg)) => msg.is_idle_status(),
            _ => false,
        });
        assert!(idle);

        block_on(worker.process_message(Message::execute_request("s1", "print(2)"))).unwrap();
        assert_eq!(worker.state(), WorkerState::Ready);
        assert_eq!(
            seen.lock().unwrap().as_slice(),
            ["fault".to_string(), "print(2)".to_string()]
        );
    }

    #[test]
    fn test_magics_run_in_cell_order() {
        let (mut worker, mut rx, seen) = worker(fs_with_python(), manifest(true));
        block_on(worker.initialize(options("xpython"))).unwrap();
        drain(&mut rx);

        let request = Message::execute_request("s1", "%conda list\n%mamba install numpy\nimport numpy");
        block_on(worker.process_message(request)).unwrap();

        assert_eq!(seen.lock().unwrap().as_slice(), ["import numpy".to_string()]);
        let texts = side_texts(&drain(&mut rx));
        assert_eq!(texts.len(), 2);
        assert!(texts[0].contains("python"));
        assert!(!texts[0].contains("numpy"));
        assert_eq!(texts[1], "Installed numpy-1.0-0\n");
    }
}
