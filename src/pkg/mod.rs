//! Package reconciliation engine
//!
//! Keeps the interpreter's filesystem and its loaded shared libraries in step
//! with a declarative package set. The dependency solver decides *what*
//! should be installed; this module decides what has to change on disk to
//! get there, and does it without restarting the interpreter.
//!
//! # Identity
//!
//! Records are stored by archive filename, but two records describe the same
//! package when their [`PackageIdentity`] (name, version, build) matches.
//! Reconciliation compares identities, never filenames.
//!
//! # Layout
//!
//! ```text
//! <prefix>/                                   conda-like packages
//! <prefix>/lib/pythonX.Y/site-packages/       pip-like packages
//! ```

mod error;
mod listing;
mod manifest;
mod reconcile;
mod registry;
mod shared_libs;
mod solver;

pub use error::{PkgError, PkgResult};
pub use listing::format_package_list;
pub use manifest::{EnvManifest, ManifestPackage, ManifestSource, StaticManifest};
pub use reconcile::{ReconcilePlan, ReconcileReport, Reconciler, with_pinned_cwd};
pub use registry::PathRegistry;
pub use shared_libs::{KernelLinkedLibs, LoadPolicy, ManagedRuntime, SharedLibManifest};
pub use solver::{SolveRequest, Solver};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Package manager paths
pub mod paths {
    /// Directory the working directory is pinned to while packages change
    pub const SAFE_ROOT: &str = "/";
    /// Default environment prefix
    pub const DEFAULT_PREFIX: &str = "/";
    /// Always linked into the interpreter binary
    pub const KERNEL_CORE_LIB: &str = "lib/libxeus.so";
}

/// Name of the package carrying the interpreter's ABI version
pub const EMSCRIPTEN_ABI_PACKAGE: &str = "emscripten-abi";

/// Where a record came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    Conda,
    Pip,
}

/// An installed or desired package
///
/// Replaced wholesale, never edited in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageRecord {
    pub name: String,
    pub version: String,
    pub build_string: String,
    #[serde(default)]
    pub repo_name: String,
    #[serde(default)]
    pub repo_url: String,
    pub filename: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends: Vec<String>,
}

impl PackageRecord {
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        build_string: impl Into<String>,
        filename: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            build_string: build_string.into(),
            repo_name: String::new(),
            repo_url: String::new(),
            filename: filename.into(),
            depends: Vec::new(),
        }
    }

    pub fn with_repo(mut self, repo_name: impl Into<String>, repo_url: impl Into<String>) -> Self {
        self.repo_name = repo_name.into();
        self.repo_url = repo_url.into();
        self
    }

    pub fn with_depends(mut self, depends: &[&str]) -> Self {
        self.depends = depends.iter().map(|d| d.to_string()).collect();
        self
    }

    pub fn identity(&self) -> PackageIdentity {
        PackageIdentity {
            name: self.name.clone(),
            version: self.version.clone(),
            build: self.build_string.clone(),
        }
    }

    /// URL of the package archive
    pub fn archive_url(&self) -> String {
        if self.repo_url.is_empty() {
            return self.filename.clone();
        }
        if self.repo_url.ends_with(&self.filename) {
            return self.repo_url.clone();
        }
        format!("{}/{}", self.repo_url.trim_end_matches('/'), self.filename)
    }

    /// Names of the packages this one depends on (match specs stripped)
    pub fn dependency_names(&self) -> impl Iterator<Item = &str> {
        self.depends
            .iter()
            .filter_map(|spec| spec.split_whitespace().next())
    }
}

/// What makes two records the same package
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PackageIdentity {
    pub name: String,
    pub version: String,
    pub build: String,
}

impl fmt::Display for PackageIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}-{}", self.name, self.version, self.build)
    }
}

/// A complete environment: conda-like and pip-like records by filename
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageSet {
    #[serde(default, rename = "condaPackages")]
    pub conda: BTreeMap<String, PackageRecord>,
    #[serde(default, rename = "pipPackages")]
    pub pip: BTreeMap<String, PackageRecord>,
}

impl PackageSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, origin: Origin, record: PackageRecord) {
        self.origin_mut(origin)
            .insert(record.filename.clone(), record);
    }

    pub fn origin(&self, origin: Origin) -> &BTreeMap<String, PackageRecord> {
        match origin {
            Origin::Conda => &self.conda,
            Origin::Pip => &self.pip,
        }
    }

    fn origin_mut(&mut self, origin: Origin) -> &mut BTreeMap<String, PackageRecord> {
        match origin {
            Origin::Conda => &mut self.conda,
            Origin::Pip => &mut self.pip,
        }
    }

    /// Every record with its origin, conda-like first
    pub fn iter(&self) -> impl Iterator<Item = (Origin, &PackageRecord)> {
        self.conda
            .values()
            .map(|r| (Origin::Conda, r))
            .chain(self.pip.values().map(|r| (Origin::Pip, r)))
    }

    pub fn len(&self) -> usize {
        self.conda.len() + self.pip.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conda.is_empty() && self.pip.is_empty()
    }

    pub fn find(&self, origin: Origin, name: &str) -> Option<&PackageRecord> {
        self.origin(origin).values().find(|r| r.name == name)
    }

    /// A copy without the records named in `names`
    ///
    /// Fails on the first name that is not installed in `origin`.
    pub fn without(&self, origin: Origin, names: &[String]) -> PkgResult<PackageSet> {
        let mut out = self.clone();
        for name in names {
            let filename = self
                .find(origin, name)
                .map(|r| r.filename.clone())
                .ok_or_else(|| PkgError::NotInstalled(name.clone()))?;
            out.origin_mut(origin).remove(&filename);
        }
        Ok(out)
    }

    /// `(major, minor)` of the installed `python` package
    pub fn python_version(&self) -> Option<(u32, u32)> {
        let python = self.find(Origin::Conda, "python")?;
        let mut parts = python.version.split('.');
        let major = parts.next()?.parse().ok()?;
        let minor = parts.next()?.parse().ok()?;
        Some((major, minor))
    }

    /// Major version of the interpreter toolchain ABI, if declared
    pub fn emscripten_major(&self) -> Option<u32> {
        let abi = self.find(Origin::Conda, EMSCRIPTEN_ABI_PACKAGE)?;
        abi.version.split('.').next()?.parse().ok()
    }
}

/// Install root for a record of `origin`
pub fn install_root(origin: Origin, prefix: &str, python: Option<(u32, u32)>) -> PkgResult<String> {
    match origin {
        Origin::Conda => Ok(prefix.to_string()),
        Origin::Pip => {
            let (major, minor) = python.ok_or_else(|| PkgError::MissingRuntime("python".into()))?;
            Ok(crate::vfs::join_path(
                prefix,
                &format!("lib/python{}.{}/site-packages", major, minor),
            ))
        }
    }
}
