//! Virtual filesystem contract
//!
//! The kernel's filesystem is owned by the interpreter binary; this crate
//! only needs a handful of operations on it. They are all synchronous from
//! the worker's point of view.
//!
//! [`MemoryFs`] is an in-memory implementation used natively and in tests.

pub mod archive;
pub mod memory;

pub use archive::ArchiveEntry;
pub use memory::MemoryFs;

use std::io;

/// Handle of a loaded dynamic library
pub type LibHandle = usize;

/// Filesystem operations the package engine and the worker rely on
pub trait PackageFs {
    /// Current working directory (absolute)
    fn cwd(&self) -> String;

    /// Change the working directory
    fn chdir(&mut self, path: &str) -> io::Result<()>;

    fn exists(&self, path: &str) -> bool;

    fn is_dir(&self, path: &str) -> bool;

    /// Create a directory and any missing parents
    fn create_dir_all(&mut self, path: &str) -> io::Result<()>;

    /// Fetch the archive at `url` and extract it under `dest`
    ///
    /// Returns the absolute paths of every file written.
    fn install_archive(&mut self, url: &str, dest: &str) -> io::Result<Vec<String>>;

    /// Remove a file, or an empty directory
    fn remove_path(&mut self, path: &str) -> io::Result<()>;

    /// Load a shared library into the running interpreter
    fn load_dynamic_library(&mut self, path: &str) -> io::Result<LibHandle>;

    /// Mount the host drive `drive_name` at `mountpoint`
    fn mount(&mut self, drive_name: &str, mountpoint: &str) -> io::Result<()>;

    /// Whether the interpreter was built with filesystem and dynamic
    /// library support
    fn supports_packages(&self) -> bool {
        true
    }
}

/// Join `rel` onto `base`, resolving `.` and `..`
///
/// An absolute `rel` replaces `base`. The result is always absolute with no
/// trailing slash (except the root itself).
pub fn join_path(base: &str, rel: &str) -> String {
    let start = if rel.starts_with('/') { "" } else { base };
    let mut parts: Vec<&str> = Vec::new();

    for seg in start.split('/').chain(rel.split('/')) {
        match seg {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            seg => parts.push(seg),
        }
    }

    format!("/{}", parts.join("/"))
}

/// Parent directory of an absolute path
pub fn parent_path(path: &str) -> Option<String> {
    let path = join_path("/", path);
    if path == "/" {
        return None;
    }
    match path.rfind('/') {
        Some(0) => Some("/".to_string()),
        Some(idx) => Some(path[..idx].to_string()),
        None => None,
    }
}
