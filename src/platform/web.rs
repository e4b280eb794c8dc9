//! Browser platform
//!
//! - log console records go out over a `BroadcastChannel`
//! - kernel tasks run on the page's microtask queue

use super::{LOG_BROADCAST_CHANNEL, PlatformError, PlatformResult};
use crate::kernel::{LogRecord, LogSink};
use futures::task::{LocalFutureObj, LocalSpawn, SpawnError};
use wasm_bindgen::prelude::*;
use web_sys::BroadcastChannel;

/// Posts log records to the log console channel
///
/// Channel handles are not `Send`, so one is opened per record.
#[derive(Debug, Clone)]
pub struct BroadcastLogSink {
    channel: String,
}

impl BroadcastLogSink {
    pub fn new() -> Self {
        Self {
            channel: LOG_BROADCAST_CHANNEL.to_string(),
        }
    }

    fn try_post(&self, record: &LogRecord) -> PlatformResult<()> {
        let json = serde_json::to_string(record).map_err(|e| PlatformError::Encode(e.to_string()))?;
        let value = js_sys::JSON::parse(&json).map_err(host_error)?;
        let channel = BroadcastChannel::new(&self.channel).map_err(host_error)?;
        let posted = channel.post_message(&value).map_err(host_error);
        channel.close();
        posted
    }
}

impl Default for BroadcastLogSink {
    fn default() -> Self {
        Self::new()
    }
}

impl LogSink for BroadcastLogSink {
    fn post(&self, record: &LogRecord) {
        if let Err(e) = self.try_post(record) {
            web_sys::console::warn_1(&format!("log broadcast failed: {}", e).into());
        }
    }
}

fn host_error(value: JsValue) -> PlatformError {
    PlatformError::Host(value.as_string().unwrap_or_else(|| format!("{:?}", value)))
}

/// Spawns kernel tasks with `wasm_bindgen_futures`
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSpawner;

impl LocalSpawn for WebSpawner {
    fn spawn_local_obj(&self, future: LocalFutureObj<'static, ()>) -> Result<(), SpawnError> {
        wasm_bindgen_futures::spawn_local(future);
        Ok(())
    }
}

/// Turn a kernel error into a JS exception
pub fn to_js_error(err: impl std::fmt::Display) -> JsValue {
    js_sys::Error::new(&err.to_string()).into()
}
