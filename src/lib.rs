//! worker-kernel - runs a WASM-compiled interpreter kernel off the main thread
//!
//! Two halves talk over message passing:
//!
//! - the controller ([`bridge`]) faces the notebook front end. It serializes
//!   requests, routes standard input and stamps sessions on outgoing traffic;
//! - the worker ([`kernel`]) owns the interpreter, the in-memory filesystem
//!   and the package environment, which [`pkg`] keeps in step with the
//!   solver's output without restarting anything.
//!
//! Cell magics (`%pip install ...`) are recognized by [`magic`] and turned
//! into package operations before the rest of the cell reaches the
//! interpreter. [`lifecycle`] puts the pieces together.
//!
//! Platform support:
//! - Browser (wasm32-unknown-unknown): web worker, broadcast log console
//! - Native: a worker thread, used by the test suite

#[cfg(all(target_arch = "wasm32", target_os = "unknown"))]
use wasm_bindgen::prelude::*;

pub mod bridge;
pub mod config;
pub mod kernel;
pub mod lifecycle;
pub mod magic;
pub mod pkg;
pub mod platform;
pub mod protocol;
pub mod vfs;

pub use bridge::KernelController;
pub use config::KernelOptions;
pub use kernel::{KernelError, KernelResult};
pub use lifecycle::Kernel;

/// Initialize panic hook for better error messages in browser console
#[cfg(all(target_arch = "wasm32", target_os = "unknown"))]
fn init_panic_hook() {
    #[cfg(feature = "console_error_panic_hook")]
    console_error_panic_hook::set_once();
}

/// WASM entry point
#[cfg(all(target_arch = "wasm32", target_os = "unknown"))]
#[wasm_bindgen(start)]
pub fn main() {
    init_panic_hook();
}

/// Validate kernel options and return the environment manifest URL
#[cfg(all(target_arch = "wasm32", target_os = "unknown"))]
#[wasm_bindgen(js_name = manifestUrl)]
pub fn manifest_url(options_json: &str) -> Result<String, JsValue> {
    let options = KernelOptions::from_json(options_json).map_err(platform::web::to_js_error)?;
    Ok(options.manifest_url())
}
