//! Kernel options
//!
//! Everything the worker needs to boot a kernel arrives in one
//! [`KernelOptions`] payload with the `initialize` call. Field names are
//! camelCase on the wire.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Options for one kernel instance
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KernelOptions {
    /// Base URL the kernel assets are served under
    pub base_url: String,
    pub kernel_id: String,
    #[serde(default)]
    pub browsing_context_id: String,
    /// Mount the host drive at bootstrap
    #[serde(default = "default_true")]
    pub mount_drive: bool,
    /// Directory holding `empack_env_meta.json`, overriding the kernel dir
    #[serde(default)]
    pub empack_env_meta_link: Option<String>,
    /// Host can share memory with the worker
    #[serde(default)]
    pub cross_origin_isolated: bool,
    /// `drive:path` or a plain path
    #[serde(default)]
    pub location: String,
    pub kernel_spec: KernelSpec,
}

fn default_true() -> bool {
    true
}

/// Kernel spec as published by the kernel extension
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KernelSpec {
    pub name: String,
    #[serde(default)]
    pub display_name: String,
    /// `argv[0]` is the interpreter's JS loader, relative to the base URL
    #[serde(default)]
    pub argv: Vec<String>,
    pub dir: String,
    pub env_name: String,
    #[serde(default)]
    pub metadata: KernelSpecMetadata,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KernelSpecMetadata {
    /// Library name -> prefix-relative path of libraries linked into the
    /// interpreter binary
    #[serde(default)]
    pub shared: BTreeMap<String, String>,
}

impl KernelOptions {
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    /// Where the environment manifest lives
    pub fn manifest_url(&self) -> String {
        let dir = match &self.empack_env_meta_link {
            Some(link) if !link.is_empty() => link.trim_end_matches('/').to_string(),
            _ => url_join(&self.base_url, &["xeus", "kernels", &self.kernel_spec.dir]),
        };
        format!("{}/empack_env_meta.json", dir)
    }

    /// Where package archives without their own URL are served from
    pub fn package_root_url(&self) -> String {
        url_join(
            &self.base_url,
            &["xeus", &self.kernel_spec.env_name, "kernel_packages"],
        )
    }

    /// Split `location` into (drive name, local path)
    pub fn drive_location(&self) -> (&str, &str) {
        match self.location.split_once(':') {
            Some((drive, path)) => (drive, path),
            None => ("", self.location.as_str()),
        }
    }

    pub fn stdin_mode(&self) -> StdinMode {
        StdinMode::detect(self.cross_origin_isolated)
    }
}

/// How the worker blocks for standard input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StdinMode {
    /// Wait/notify on memory shared with the controller
    SharedMemory,
    /// Blocking request answered by the controller
    RoundTrip,
}

impl StdinMode {
    pub fn detect(cross_origin_isolated: bool) -> Self {
        if cross_origin_isolated {
            StdinMode::SharedMemory
        } else {
            StdinMode::RoundTrip
        }
    }
}

fn url_join(base: &str, parts: &[&str]) -> String {
    let mut url = base.trim_end_matches('/').to_string();
    for part in parts.iter().map(|p| p.trim_matches('/')).filter(|p| !p.is_empty()) {
        url.push('/');
        url.push_str(part);
    }
    url
}

#[cfg(test)]
mod tests {
    use super::*;

    const OPTIONS: &str = r#"{
        "baseUrl": "https://lite.example/",
        "kernelId": "k-1",
        "browsingContextId": "ctx",
        "location": "notebooks:work/demo",
        "kernelSpec": {
            "name": "xpython",
            "displayName": "Python (XPython)",
            "argv": ["xpython/bin/xpython.js"],
            "dir": "xpython",
            "envName": "default",
            "metadata": {"shared": {"libpython": "lib/libpython3.11.so"}}
        }
    }"#;

    #[test]
    fn test_parse_camel_case() {
        let options = KernelOptions::from_json(OPTIONS).unwrap();
        assert_eq!(options.kernel_id, "k-1");
        assert!(options.mount_drive);
        assert!(!options.cross_origin_isolated);
        assert_eq!(options.kernel_spec.env_name, "default");
        assert_eq!(
            options.kernel_spec.metadata.shared.get("libpython").map(String::as_str),
            Some("lib/libpython3.11.so")
        );
    }

    #[test]
    fn test_derived_urls() {
        let mut options = KernelOptions::from_json(OPTIONS).unwrap();
        assert_eq!(
            options.manifest_url(),
            "https://lite.example/xeus/kernels/xpython/empack_env_meta.json"
        );
        assert_eq!(
            options.package_root_url(),
            "https://lite.example/xeus/default/kernel_packages"
        );

        options.empack_env_meta_link = Some("https://cdn/env/".into());
        assert_eq!(options.manifest_url(), "https://cdn/env/empack_env_meta.json");
    }

    #[test]
    fn test_drive_location() {
        let mut options = KernelOptions::from_json(OPTIONS).unwrap();
        assert_eq!(options.drive_location(), ("notebooks", "work/demo"));
        options.location = "work".into();
        assert_eq!(options.drive_location(), ("", "work"));
    }

    #[test]
    fn test_stdin_mode() {
        assert_eq!(StdinMode::detect(true), StdinMode::SharedMemory);
        assert_eq!(StdinMode::detect(false), StdinMode::RoundTrip);
    }
}
