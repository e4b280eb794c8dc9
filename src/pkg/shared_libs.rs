//! Shared-library bookkeeping and load policy
//!
//! Two filters decide which of a package's libraries get loaded eagerly:
//!
//! 1. Libraries already linked into the interpreter binary are never loaded
//!    again. That set is fixed when the interpreter starts.
//! 2. Under a managed runtime with its own extension ABI (Python), only
//!    libraries carrying that runtime's ABI tag are loaded up front; the rest
//!    are left to the runtime's own on-demand loading.
//!
//! On top of both, toolchains with ABI major version 4 or later resolve
//! libraries lazily on `dlopen`, so nothing is loaded eagerly there.

use super::PackageSet;
use std::collections::{BTreeMap, BTreeSet};

/// ABI major version from which libraries are resolved lazily
const LAZY_LOADING_ABI_MAJOR: u32 = 4;

/// True for `libfoo.so` and versioned `libfoo.so.1.2`
pub fn is_shared_lib(path: &str) -> bool {
    let name = path.rsplit('/').next().unwrap_or(path);
    name.ends_with(".so") || name.contains(".so.")
}

/// Libraries statically linked into the running interpreter
///
/// Stored relative to the environment prefix (`lib/libxeus.so`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KernelLinkedLibs {
    libs: BTreeSet<String>,
}

impl KernelLinkedLibs {
    /// Seed from the kernel's declared libraries plus the kernel core library
    pub fn new<I, S>(declared: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut libs: BTreeSet<String> = declared
            .into_iter()
            .map(|s| s.into().trim_start_matches('/').to_string())
            .collect();
        libs.insert(super::paths::KERNEL_CORE_LIB.to_string());
        Self { libs }
    }

    /// Whether the absolute `path` under `prefix` is kernel-linked
    pub fn contains(&self, prefix: &str, path: &str) -> bool {
        let rel = path
            .strip_prefix(prefix.trim_end_matches('/'))
            .unwrap_or(path)
            .trim_start_matches('/');
        self.libs.contains(rel)
    }

    pub fn len(&self) -> usize {
        self.libs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.libs.is_empty()
    }
}

/// A language runtime hosted by the interpreter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManagedRuntime {
    Python,
}

impl ManagedRuntime {
    /// Runtime for a kernel spec name, if it hosts one
    pub fn for_kernel(kernel_name: &str) -> Option<Self> {
        match kernel_name {
            "xpython" => Some(ManagedRuntime::Python),
            _ => None,
        }
    }

    /// ABI tag native extensions are built with, e.g. `cpython-311`
    pub fn abi_tag(&self, env: &PackageSet) -> Option<String> {
        match self {
            ManagedRuntime::Python => env
                .python_version()
                .map(|(major, minor)| format!("cpython-{}{}", major, minor)),
        }
    }
}

/// Which libraries to load eagerly after a reconciliation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadPolicy {
    /// False when the toolchain loads everything lazily
    pub eager: bool,
    /// Only libraries whose file name carries this tag are loaded eagerly
    pub abi_tag: Option<String>,
}

impl LoadPolicy {
    pub fn for_environment(env: &PackageSet, runtime: Option<ManagedRuntime>) -> Self {
        let eager = match env.emscripten_major() {
            Some(major) => major < LAZY_LOADING_ABI_MAJOR,
            None => {
                tracing::warn!("failed to detect toolchain ABI version, loading all shared libraries");
                true
            }
        };
        Self {
            eager,
            abi_tag: runtime.and_then(|rt| rt.abi_tag(env)),
        }
    }

    /// Load everything eagerly
    pub fn load_all() -> Self {
        Self {
            eager: true,
            abi_tag: None,
        }
    }

    pub fn loads_eagerly(&self, path: &str) -> bool {
        if !self.eager {
            return false;
        }
        match &self.abi_tag {
            Some(tag) => path.rsplit('/').next().unwrap_or(path).contains(tag.as_str()),
            None => true,
        }
    }
}

/// Package name -> libraries it contributes (kernel-linked ones excluded)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SharedLibManifest {
    libs: BTreeMap<String, Vec<String>>,
}

impl SharedLibManifest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the libraries among `paths` for `package`
    pub fn record<'a, I>(&mut self, package: &str, paths: I, prefix: &str, linked: &KernelLinkedLibs)
    where
        I: IntoIterator<Item = &'a String>,
    {
        let libs: Vec<String> = paths
            .into_iter()
            .filter(|p| is_shared_lib(p) && !linked.contains(prefix, p))
            .cloned()
            .collect();
        if libs.is_empty() {
            self.libs.remove(package);
        } else {
            self.libs.insert(package.to_string(), libs);
        }
    }

    pub fn get(&self, package: &str) -> Option<&[String]> {
        self.libs.get(package).map(Vec::as_slice)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.libs.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.libs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.libs.is_empty()
    }
}
