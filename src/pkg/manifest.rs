//! Environment manifest
//!
//! The static JSON description of a kernel's preinstalled environment:
//!
//! ```json
//! {
//!   "prefix": "/",
//!   "specs": ["python=3.11", "numpy"],
//!   "channels": ["conda-forge"],
//!   "packages": [
//!     { "name": "numpy", "version": "1.26.0", "build": "py311h1",
//!       "channel": "conda-forge", "filename": "numpy-1.26.0-py311h1.tar.bz2",
//!       "url": null, "subdir": "emscripten-wasm32", "depends": ["python"] }
//!   ]
//! }
//! ```
//!
//! Packages whose channel is `pypi` are pip-like; everything else is
//! conda-like.

use super::error::{PkgError, PkgResult};
use super::{Origin, PackageRecord, PackageSet};
use futures::future::{self, BoxFuture};
use serde::{Deserialize, Serialize};

/// Channel name marking pip-like packages
const PIP_CHANNEL: &str = "pypi";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvManifest {
    #[serde(default = "default_prefix")]
    pub prefix: String,
    #[serde(default)]
    pub specs: Vec<String>,
    #[serde(default)]
    pub channels: Vec<String>,
    #[serde(default)]
    pub packages: Vec<ManifestPackage>,
}

fn default_prefix() -> String {
    super::paths::DEFAULT_PREFIX.to_string()
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestPackage {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub build: String,
    #[serde(default)]
    pub channel: String,
    pub filename: String,
    /// Full archive URL; when absent the package is served from the
    /// kernel's package root
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub subdir: Option<String>,
    #[serde(default)]
    pub depends: Vec<String>,
}

impl EnvManifest {
    pub fn from_json(json: &str) -> PkgResult<Self> {
        let manifest: EnvManifest = serde_json::from_str(json)?;
        manifest.validate()?;
        Ok(manifest)
    }

    fn validate(&self) -> PkgResult<()> {
        for pkg in &self.packages {
            if pkg.name.is_empty() || pkg.filename.is_empty() {
                return Err(PkgError::InvalidManifest(format!(
                    "package entry without name or filename: {:?}",
                    pkg
                )));
            }
        }
        Ok(())
    }

    /// The declared environment as a desired package set
    pub fn package_set(&self, pkg_root_url: &str) -> PackageSet {
        let mut set = PackageSet::new();
        for pkg in &self.packages {
            let origin = if pkg.channel == PIP_CHANNEL {
                Origin::Pip
            } else {
                Origin::Conda
            };
            let repo_url = pkg.url.clone().unwrap_or_else(|| pkg_root_url.to_string());
            set.insert(
                origin,
                PackageRecord {
                    name: pkg.name.clone(),
                    version: pkg.version.clone(),
                    build_string: pkg.build.clone(),
                    repo_name: pkg.channel.clone(),
                    repo_url,
                    filename: pkg.filename.clone(),
                    depends: pkg.depends.clone(),
                },
            );
        }
        set
    }
}

/// Where manifests come from (an HTTP fetch in the browser)
pub trait ManifestSource: Send {
    fn fetch(&self, url: &str) -> BoxFuture<'static, PkgResult<EnvManifest>>;
}

/// A manifest known up front
pub struct StaticManifest(pub EnvManifest);

impl ManifestSource for StaticManifest {
    fn fetch(&self, url: &str) -> BoxFuture<'static, PkgResult<EnvManifest>> {
        tracing::debug!(%url, packages = self.0.packages.len(), "serving static manifest");
        Box::pin(future::ready(Ok(self.0.clone())))
    }
}
