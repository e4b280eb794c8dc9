//! In-memory filesystem implementation
//!
//! Simple, fast, ephemeral. Stands in for the interpreter's filesystem when
//! running natively. Package archives are "fetched" from an in-memory store
//! filled with [`MemoryFs::publish_archive`].

use super::archive::{self, ArchiveEntry};
use super::{LibHandle, PackageFs, join_path, parent_path};
use slab::Slab;
use std::collections::{BTreeMap, HashMap};
use std::io;

/// A stored file or directory
#[derive(Clone)]
enum Node {
    File(Vec<u8>),
    Directory,
}

/// A library loaded with `load_dynamic_library`
struct LoadedLib {
    path: String,
}

/// In-memory filesystem
pub struct MemoryFs {
    /// All files and directories, keyed by absolute path
    nodes: BTreeMap<String, Node>,
    cwd: String,
    /// Archive bytes by URL
    archives: HashMap<String, Vec<u8>>,
    /// Loaded libraries, in load order
    libraries: Slab<LoadedLib>,
    /// (drive name, mountpoint)
    mounts: Vec<(String, String)>,
    supports_packages: bool,
}

impl MemoryFs {
    pub fn new() -> Self {
        let mut nodes = BTreeMap::new();
        // Root directory always exists
        nodes.insert("/".to_string(), Node::Directory);
        Self {
            nodes,
            cwd: "/".to_string(),
            archives: HashMap::new(),
            libraries: Slab::new(),
            mounts: Vec::new(),
            supports_packages: true,
        }
    }

    /// A filesystem reporting no package support, like an interpreter built
    /// without FS or dynamic linking
    pub fn without_package_support() -> Self {
        Self {
            supports_packages: false,
            ..Self::new()
        }
    }

    /// Make an archive available for `install_archive`
    pub fn publish_archive(&mut self, url: impl Into<String>, entries: &[ArchiveEntry]) {
        self.archives.insert(url.into(), archive::encode(entries));
    }

    /// Write a file, creating parent directories
    pub fn write_file(&mut self, path: &str, data: &[u8]) -> io::Result<()> {
        let path = self.resolve(path);
        if let Some(parent) = parent_path(&path) {
            self.create_dir_all(&parent)?;
        }
        if let Some(Node::Directory) = self.nodes.get(&path) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("Is a directory: {}", path),
            ));
        }
        self.nodes.insert(path, Node::File(data.to_vec()));
        Ok(())
    }

    pub fn read_file(&self, path: &str) -> io::Result<Vec<u8>> {
        match self.nodes.get(&self.resolve(path)) {
            Some(Node::File(data)) => Ok(data.clone()),
            Some(Node::Directory) => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "Is a directory",
            )),
            None => Err(io::Error::new(io::ErrorKind::NotFound, "File not found")),
        }
    }

    /// Paths of every file (not directory) currently stored
    pub fn files(&self) -> Vec<String> {
        self.nodes
            .iter()
            .filter(|(_, node)| matches!(node, Node::File(_)))
            .map(|(path, _)| path.clone())
            .collect()
    }

    /// Paths of loaded libraries, in load order
    pub fn loaded_libraries(&self) -> Vec<String> {
        self.libraries.iter().map(|(_, lib)| lib.path.clone()).collect()
    }

    pub fn mounts(&self) -> &[(String, String)] {
        &self.mounts
    }

    fn resolve(&self, path: &str) -> String {
        join_path(&self.cwd, path)
    }
}

impl Default for MemoryFs {
    fn default() -> Self {
        Self::new()
    }
}

impl PackageFs for MemoryFs {
    fn cwd(&self) -> String {
        self.cwd.clone()
    }

    fn chdir(&mut self, path: &str) -> io::Result<()> {
        let path = self.resolve(path);
        match self.nodes.get(&path) {
            Some(Node::Directory) => {
                self.cwd = path;
                Ok(())
            }
            Some(Node::File(_)) => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("Not a directory: {}", path),
            )),
            None => Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("Directory not found: {}", path),
            )),
        }
    }

    fn exists(&self, path: &str) -> bool {
        self.nodes.contains_key(&self.resolve(path))
    }

    fn is_dir(&self, path: &str) -> bool {
        matches!(self.nodes.get(&self.resolve(path)), Some(Node::Directory))
    }

    fn create_dir_all(&mut self, path: &str) -> io::Result<()> {
        let path = self.resolve(path);
        let mut current = String::new();

        for part in path.split('/').filter(|s| !s.is_empty()) {
            current.push('/');
            current.push_str(part);

            match self.nodes.get(&current) {
                Some(Node::Directory) => {}
                Some(Node::File(_)) => {
                    return Err(io::Error::new(
                        io::ErrorKind::AlreadyExists,
                        format!("Not a directory: {}", current),
                    ));
                }
                None => {
                    self.nodes.insert(current.clone(), Node::Directory);
                }
            }
        }

        Ok(())
    }

    fn install_archive(&mut self, url: &str, dest: &str) -> io::Result<Vec<String>> {
        let data = self.archives.get(url).ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, format!("archive not found: {}", url))
        })?;
        let entries = archive::decode(data)?;

        let root = self.resolve(dest);
        self.create_dir_all(&root)?;

        let mut written = Vec::with_capacity(entries.len());
        for entry in entries {
            let path = join_path(&root, &entry.path);
            self.write_file(&path, &entry.content)?;
            written.push(path);
        }

        Ok(written)
    }

    fn remove_path(&mut self, path: &str) -> io::Result<()> {
        let path = self.resolve(path);

        if path == "/" {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "Cannot remove root directory",
            ));
        }

        match self.nodes.get(&path) {
            Some(Node::File(_)) => {
                self.nodes.remove(&path);
                Ok(())
            }
            Some(Node::Directory) => {
                let prefix = format!("{}/", path);
                if self.nodes.keys().any(|p| p.starts_with(&prefix)) {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidInput,
                        format!("Directory not empty: {}", path),
                    ));
                }
                self.nodes.remove(&path);
                Ok(())
            }
            None => Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("Path not found: {}", path),
            )),
        }
    }

    fn load_dynamic_library(&mut self, path: &str) -> io::Result<LibHandle> {
        let path = self.resolve(path);
        match self.nodes.get(&path) {
            Some(Node::File(_)) => Ok(self.libraries.insert(LoadedLib { path })),
            _ => Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("Shared library not found: {}", path),
            )),
        }
    }

    fn mount(&mut self, drive_name: &str, mountpoint: &str) -> io::Result<()> {
        let mountpoint = self.resolve(mountpoint);
        if self.exists(&mountpoint) {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("Mountpoint already exists: {}", mountpoint),
            ));
        }
        self.create_dir_all(&mountpoint)?;
        self.mounts.push((drive_name.to_string(), mountpoint));
        Ok(())
    }

    fn supports_packages(&self) -> bool {
        self.supports_packages
    }
}
