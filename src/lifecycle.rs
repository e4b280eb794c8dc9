//! Kernel lifecycle
//!
//! Wires a worker to a controller and brings the kernel up:
//!
//! 1. spawn the worker thread ([`Kernel::launch`], native only), or take a
//!    remote the host already runs ([`Kernel::attach`]);
//! 2. start pumping worker events into the controller;
//! 3. initialize the worker (interpreter, environment, packages);
//! 4. once ready, mount the host drive and move into the notebook's
//!    directory.
//!
//! All of it runs on the caller's local executor; nothing here blocks.

#[cfg(not(target_arch = "wasm32"))]
use crate::bridge::ThreadWorker;
use crate::bridge::{KernelController, WorkerRemote};
use crate::config::KernelOptions;
#[cfg(not(target_arch = "wasm32"))]
use crate::kernel::WorkerDeps;
use crate::kernel::{KernelError, KernelResult, WorkerEvent};
use crate::protocol::Message;
use crate::vfs::join_path;
use futures::channel::mpsc;
use futures::future::LocalBoxFuture;
use futures::task::{LocalSpawn, LocalSpawnExt};
use std::ops::Deref;
use std::rc::Rc;

/// Where the host drive is mounted
pub const DRIVE_MOUNTPOINT: &str = "/drive";

/// Preferred working directory, when the environment provides it
pub const FILES_DIR: &str = "/files";

/// A running kernel
pub struct Kernel {
    controller: Rc<KernelController>,
}

impl Kernel {
    /// Start a kernel on a worker thread
    ///
    /// `host` receives every message bound for the front end. Returns as soon
    /// as the background tasks are spawned; await [`KernelController::ready`]
    /// to know when the kernel can take requests.
    #[cfg(not(target_arch = "wasm32"))]
    pub fn launch<S: LocalSpawn>(
        options: KernelOptions,
        deps: WorkerDeps,
        host: impl Fn(&Message) + 'static,
        spawner: &S,
    ) -> KernelResult<Self> {
        let (worker, events) = ThreadWorker::spawn(deps)?;
        Self::attach(options, Box::new(worker), events, host, spawner)
    }

    /// Start a kernel on a worker someone else runs
    ///
    /// `events` must carry everything the worker behind `remote` posts.
    pub fn attach<S: LocalSpawn>(
        options: KernelOptions,
        remote: Box<dyn WorkerRemote>,
        events: mpsc::UnboundedReceiver<WorkerEvent>,
        host: impl Fn(&Message) + 'static,
        spawner: &S,
    ) -> KernelResult<Self> {
        let controller = Rc::new(KernelController::new(options.kernel_id.clone(), remote, host));
        tracing::info!(kernel = %options.kernel_id, spec = %options.kernel_spec.name, "launching kernel");

        let pump = Rc::clone(&controller);
        spawner
            .spawn_local(async move { pump.pump(events).await })
            .map_err(spawn_error)?;

        // Drive initialization even if nobody awaits readiness.
        let ready = controller.initialize(options.clone());
        spawner
            .spawn_local(async move {
                let _ = ready.await;
            })
            .map_err(spawn_error)?;

        if options.mount_drive {
            let fs = Rc::clone(&controller);
            spawner
                .spawn_local(async move {
                    if let Err(e) = init_file_system(&fs, &options).await {
                        tracing::warn!(kernel = %fs.kernel_id(), error = %e, "drive not mounted");
                    }
                })
                .map_err(spawn_error)?;
        }

        Ok(Self { controller })
    }

    pub fn controller(&self) -> &Rc<KernelController> {
        &self.controller
    }

    /// Readiness of the kernel
    pub fn ready(&self) -> LocalBoxFuture<'static, KernelResult<()>> {
        self.controller.ready()
    }
}

impl Deref for Kernel {
    type Target = KernelController;

    fn deref(&self) -> &KernelController {
        &self.controller
    }
}

impl Drop for Kernel {
    fn drop(&mut self) {
        self.controller.dispose();
    }
}

fn spawn_error(e: futures::task::SpawnError) -> KernelError {
    KernelError::Io(format!("failed to spawn kernel task: {}", e))
}

/// Mount the host drive and change into the notebook's directory
///
/// Waits for the kernel to be ready. Prefers [`FILES_DIR`] when it exists,
/// otherwise the notebook's path on the drive.
pub async fn init_file_system(
    controller: &KernelController,
    options: &KernelOptions,
) -> KernelResult<()> {
    let (drive_name, local_path) = options.drive_location();
    controller.ready().await?;
    controller.mount(drive_name, DRIVE_MOUNTPOINT).await?;

    let cwd = if controller.is_dir(FILES_DIR).await? {
        FILES_DIR.to_string()
    } else {
        join_path(DRIVE_MOUNTPOINT, local_path.trim_start_matches('/'))
    };
    tracing::debug!(%cwd, "entering notebook directory");
    controller.cd(&cwd).await
}
