//! Environment reconciliation
//!
//! Moves the filesystem from the installed package set to a desired one with
//! the smallest change: packages whose identity survives are left alone, the
//! rest are removed or extracted. Newly added shared libraries are then
//! loaded in dependency order, either right away or, for a staged pass, once
//! the caller drains the queue with [`Reconciler::load_pending`].
//!
//! A pass is not transactional on the filesystem. If it fails half way the
//! files already touched stay touched, but the installed set, the path
//! registry and the shared-library manifest keep their previous values.

use super::error::{PkgError, PkgResult};
use super::paths::SAFE_ROOT;
use super::registry::PathRegistry;
use super::shared_libs::{KernelLinkedLibs, LoadPolicy, ManagedRuntime, SharedLibManifest};
use super::{Origin, PackageIdentity, PackageRecord, PackageSet, install_root};
use crate::vfs::PackageFs;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::io;
use std::sync::Arc;

/// Run `op` with the working directory set to `dir`
///
/// The previous directory is restored whether or not `op` succeeds. A failed
/// restore is logged and does not mask the result of `op`.
pub fn with_pinned_cwd<F, T>(
    fs: &mut F,
    dir: &str,
    op: impl FnOnce(&mut F) -> PkgResult<T>,
) -> PkgResult<T>
where
    F: PackageFs + ?Sized,
{
    let saved = fs.cwd();
    fs.chdir(dir).map_err(|e| PkgError::io(dir, e))?;

    let result = op(fs);

    if let Err(e) = fs.chdir(&saved) {
        tracing::warn!(cwd = %saved, error = %e, "failed to restore working directory");
    }
    result
}

/// What a reconciliation pass will do
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcilePlan {
    /// Installed records with no counterpart in the desired set
    pub remove: Vec<(Origin, PackageRecord)>,
    /// Desired records with no counterpart in the installed set
    pub install: Vec<(Origin, PackageRecord)>,
    /// Surviving packages: (origin, installed filename, desired record)
    pub keep: Vec<(Origin, String, PackageRecord)>,
}

impl ReconcilePlan {
    /// Compare two sets by identity, origin by origin
    pub fn compute(current: &PackageSet, desired: &PackageSet) -> Self {
        let mut plan = ReconcilePlan::default();

        for origin in [Origin::Conda, Origin::Pip] {
            let have: HashMap<PackageIdentity, &PackageRecord> = current
                .origin(origin)
                .values()
                .map(|r| (r.identity(), r))
                .collect();
            let want: HashMap<PackageIdentity, &PackageRecord> = desired
                .origin(origin)
                .values()
                .map(|r| (r.identity(), r))
                .collect();

            for record in current.origin(origin).values() {
                match want.get(&record.identity()) {
                    Some(target) => {
                        plan.keep
                            .push((origin, record.filename.clone(), (*target).clone()))
                    }
                    None => plan.remove.push((origin, record.clone())),
                }
            }
            for record in desired.origin(origin).values() {
                if !have.contains_key(&record.identity()) {
                    plan.install.push((origin, record.clone()));
                }
            }
        }

        plan
    }

    /// Nothing to add or remove
    pub fn is_noop(&self) -> bool {
        self.remove.is_empty() && self.install.is_empty()
    }
}

/// Outcome of a successful pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub removed: Vec<PackageIdentity>,
    pub added: Vec<PackageIdentity>,
    /// Libraries loaded, in load order
    pub loaded: Vec<String>,
    /// Libraries left for lazy loading
    pub deferred: Vec<String>,
}

impl ReconcileReport {
    pub fn is_noop(&self) -> bool {
        self.removed.is_empty() && self.added.is_empty()
    }
}

/// Owner of the installed environment
pub struct Reconciler {
    prefix: String,
    installed: PackageSet,
    registry: PathRegistry,
    shared_libs: SharedLibManifest,
    linked: KernelLinkedLibs,
    runtime: Option<ManagedRuntime>,
    /// Libraries extracted by a staged pass and not loaded yet
    pending: Vec<String>,
}

impl Reconciler {
    pub fn new(
        prefix: impl Into<String>,
        linked: KernelLinkedLibs,
        runtime: Option<ManagedRuntime>,
    ) -> Self {
        Self {
            prefix: prefix.into(),
            installed: PackageSet::new(),
            registry: PathRegistry::new(),
            shared_libs: SharedLibManifest::new(),
            linked,
            runtime,
            pending: Vec::new(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn installed(&self) -> &PackageSet {
        &self.installed
    }

    pub fn registry(&self) -> &PathRegistry {
        &self.registry
    }

    pub fn shared_libs(&self) -> &SharedLibManifest {
        &self.shared_libs
    }

    /// Libraries queued by [`reconcile_staged`](Self::reconcile_staged)
    pub fn pending_libraries(&self) -> &[String] {
        &self.pending
    }

    /// Bring the filesystem to `desired`
    pub fn reconcile<F>(&mut self, fs: &mut F, desired: PackageSet) -> PkgResult<ReconcileReport>
    where
        F: PackageFs + ?Sized,
    {
        self.run(fs, desired, true)
    }

    /// Bring the filesystem to `desired`, queueing shared libraries instead
    /// of loading them
    ///
    /// Python extension modules must not load before the interpreter knows
    /// its prefix, so a Python kernel stages its first environment, boots
    /// the interpreter, then calls [`load_pending`](Self::load_pending).
    pub fn reconcile_staged<F>(
        &mut self,
        fs: &mut F,
        desired: PackageSet,
    ) -> PkgResult<ReconcileReport>
    where
        F: PackageFs + ?Sized,
    {
        self.run(fs, desired, false)
    }

    /// Load the queued libraries, in the order they were queued
    ///
    /// On failure the library that failed and everything after it stay
    /// queued.
    pub fn load_pending<F>(&mut self, fs: &mut F) -> PkgResult<Vec<String>>
    where
        F: PackageFs + ?Sized,
    {
        let pending = std::mem::take(&mut self.pending);
        let mut loaded = Vec::with_capacity(pending.len());
        for (i, lib) in pending.iter().enumerate() {
            if let Err(e) = fs.load_dynamic_library(lib) {
                self.pending = pending[i..].to_vec();
                return Err(PkgError::SharedLibrary {
                    path: lib.clone(),
                    reason: e.to_string(),
                });
            }
            loaded.push(lib.clone());
        }
        tracing::debug!(loaded = loaded.len(), "loaded queued shared libraries");
        Ok(loaded)
    }

    fn run<F>(&mut self, fs: &mut F, desired: PackageSet, load_now: bool) -> PkgResult<ReconcileReport>
    where
        F: PackageFs + ?Sized,
    {
        let plan = ReconcilePlan::compute(&self.installed, &desired);
        if plan.is_noop() && self.installed == desired {
            tracing::debug!(packages = desired.len(), "environment already up to date");
            return Ok(ReconcileReport::default());
        }

        tracing::info!(
            remove = plan.remove.len(),
            install = plan.install.len(),
            keep = plan.keep.len(),
            "reconciling environment"
        );

        let (registry, shared_libs, report, queued) =
            with_pinned_cwd(fs, SAFE_ROOT, |fs| self.apply(fs, &plan, &desired, load_now))?;

        self.installed = desired;
        self.registry = registry;
        self.shared_libs = shared_libs;
        // Drop queued libraries whose package went away since.
        self.pending.retain(|lib| fs.exists(lib));
        self.pending.extend(queued);
        Ok(report)
    }

    /// Remove the named packages of `origin`
    pub fn uninstall<F>(
        &mut self,
        fs: &mut F,
        origin: Origin,
        names: &[String],
    ) -> PkgResult<ReconcileReport>
    where
        F: PackageFs + ?Sized,
    {
        let desired = self.installed.without(origin, names)?;
        self.reconcile(fs, desired)
    }

    fn apply<F>(
        &self,
        fs: &mut F,
        plan: &ReconcilePlan,
        desired: &PackageSet,
        load_now: bool,
    ) -> PkgResult<(PathRegistry, SharedLibManifest, ReconcileReport, Vec<String>)>
    where
        F: PackageFs + ?Sized,
    {
        let mut report = ReconcileReport::default();
        let mut queued = Vec::new();
        let mut registry = PathRegistry::new();

        for (_, record) in &plan.remove {
            self.remove_files(fs, record)?;
            report.removed.push(record.identity());
        }

        for (_, old_filename, record) in &plan.keep {
            match self.registry.get(old_filename) {
                Some(paths) => registry.insert_shared(record.filename.clone(), Arc::clone(paths)),
                None => registry.insert(record.filename.clone(), Vec::new()),
            }
        }

        let python = desired.python_version();
        for (origin, record) in &plan.install {
            let dest = install_root(*origin, &self.prefix, python)?;
            let url = record.archive_url();
            tracing::debug!(package = %record.identity(), %url, %dest, "extracting package");

            fs.create_dir_all(&dest).map_err(|e| PkgError::io(&dest, e))?;
            let paths = fs
                .install_archive(&url, &dest)
                .map_err(|e| PkgError::from_install(&url, e))?;
            registry.insert(record.filename.clone(), paths);
            report.added.push(record.identity());
        }

        let mut shared_libs = SharedLibManifest::new();
        for (_, record) in desired.iter() {
            if let Some(paths) = registry.get(&record.filename) {
                shared_libs.record(&record.name, paths.iter(), &self.prefix, &self.linked);
            }
        }

        let policy = LoadPolicy::for_environment(desired, self.runtime);
        let added: Vec<&PackageRecord> = plan.install.iter().map(|(_, r)| r).collect();
        for record in load_order(&added) {
            let Some(libs) = shared_libs.get(&record.name) else {
                continue;
            };
            for lib in libs {
                if !policy.loads_eagerly(lib) {
                    report.deferred.push(lib.clone());
                    continue;
                }
                if !load_now {
                    queued.push(lib.clone());
                    continue;
                }
                fs.load_dynamic_library(lib)
                    .map_err(|e| PkgError::SharedLibrary {
                        path: lib.clone(),
                        reason: e.to_string(),
                    })?;
                report.loaded.push(lib.clone());
            }
        }

        tracing::info!(
            removed = report.removed.len(),
            added = report.added.len(),
            loaded = report.loaded.len(),
            deferred = report.deferred.len(),
            queued = queued.len(),
            "environment reconciled"
        );
        Ok((registry, shared_libs, report, queued))
    }

    fn remove_files<F>(&self, fs: &mut F, record: &PackageRecord) -> PkgResult<()>
    where
        F: PackageFs + ?Sized,
    {
        let Some(paths) = self.registry.get(&record.filename) else {
            tracing::warn!(package = %record.identity(), "no recorded files for package");
            return Ok(());
        };

        for path in paths.iter().rev() {
            match fs.remove_path(path) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(PkgError::io(path, e)),
            }
        }
        tracing::debug!(package = %record.identity(), files = paths.len(), "removed package");
        Ok(())
    }
}

/// Order `records` so dependencies come before their dependents
///
/// Only dependencies among `records` count. Cycles are broken at the point
/// they are found.
fn load_order<'a>(records: &[&'a PackageRecord]) -> Vec<&'a PackageRecord> {
    let by_name: BTreeMap<&'a str, &'a PackageRecord> = records
        .iter()
        .map(|&r| (r.name.as_str(), r))
        .collect();

    let mut ordered = Vec::with_capacity(records.len());
    let mut done: BTreeSet<&'a str> = BTreeSet::new();
    let mut visiting: BTreeSet<&'a str> = BTreeSet::new();

    fn visit<'a>(
        record: &'a PackageRecord,
        by_name: &BTreeMap<&'a str, &'a PackageRecord>,
        done: &mut BTreeSet<&'a str>,
        visiting: &mut BTreeSet<&'a str>,
        ordered: &mut Vec<&'a PackageRecord>,
    ) {
        let name = record.name.as_str();
        if done.contains(name) || !visiting.insert(name) {
            return;
        }
        for dep in record.dependency_names() {
            if let Some(&dep_record) = by_name.get(dep) {
                visit(dep_record, by_name, done, visiting, ordered);
            }
        }
        visiting.remove(name);
        done.insert(name);
        ordered.push(record);
    }

    for &record in by_name.values() {
        visit(record, &by_name, &mut done, &mut visiting, &mut ordered);
    }
    ordered
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pkg::EMSCRIPTEN_ABI_PACKAGE;
    use crate::vfs::{ArchiveEntry, LibHandle, MemoryFs};

    const REPO: &str = "https://repo";

    fn rec(name: &str, version: &str, build: &str) -> PackageRecord {
        PackageRecord::new(name, version, build, format!("{}-{}-{}.tar.bz2", name, version, build))
            .with_repo("conda-forge", REPO)
    }

    fn publish(fs: &mut MemoryFs, record: &PackageRecord, files: &[&str]) {
        let entries: Vec<ArchiveEntry> = files
            .iter()
            .map(|f| ArchiveEntry::new(*f, f.as_bytes().to_vec()))
            .collect();
        fs.publish_archive(record.archive_url(), &entries);
    }

    fn set(records: &[&PackageRecord]) -> PackageSet {
        let mut s = PackageSet::new();
        for r in records {
            s.insert(Origin::Conda, (*r).clone());
        }
        s
    }

    fn reconciler() -> Reconciler {
        Reconciler::new("/", KernelLinkedLibs::new(Vec::<String>::new()), None)
    }

    /// Delegates to a MemoryFs and records the cwd seen by each install
    struct RecordingFs {
        inner: MemoryFs,
        install_cwds: Vec<String>,
    }

    impl PackageFs for RecordingFs {
        fn cwd(&self) -> String {
            self.inner.cwd()
        }
        fn chdir(&mut self, path: &str) -> io::Result<()> {
            self.inner.chdir(path)
        }
        fn exists(&self, path: &str) -> bool {
            self.inner.exists(path)
        }
        fn is_dir(&self, path: &str) -> bool {
            self.inner.is_dir(path)
        }
        fn create_dir_all(&mut self, path: &str) -> io::Result<()> {
            self.inner.create_dir_all(path)
        }
        fn install_archive(&mut self, url: &str, dest: &str) -> io::Result<Vec<String>> {
            self.install_cwds.push(self.inner.cwd());
            self.inner.install_archive(url, dest)
        }
        fn remove_path(&mut self, path: &str) -> io::Result<()> {
            self.inner.remove_path(path)
        }
        fn load_dynamic_library(&mut self, path: &str) -> io::Result<LibHandle> {
            self.inner.load_dynamic_library(path)
        }
        fn mount(&mut self, drive_name: &str, mountpoint: &str) -> io::Result<()> {
            self.inner.mount(drive_name, mountpoint)
        }
    }

    #[test]
    fn test_plan_by_identity() {
        let a = rec("a", "1", "0");
        let b = rec("b", "1", "0");
        let b2 = rec("b", "2", "0");
        let plan = ReconcilePlan::compute(&set(&[&a, &b]), &set(&[&a, &b2]));

        assert_eq!(plan.remove, vec![(Origin::Conda, b.clone())]);
        assert_eq!(plan.install, vec![(Origin::Conda, b2.clone())]);
        assert_eq!(plan.keep.len(), 1);
        assert_eq!(plan.keep[0].1, a.filename);
    }

    #[test]
    fn test_install_then_idempotent() {
        let mut fs = MemoryFs::new();
        let a = rec("a", "1", "0");
        publish(&mut fs, &a, &["lib/liba.so", "share/a.txt"]);

        let mut r = reconciler();
        let report = r.reconcile(&mut fs, set(&[&a])).unwrap();
        assert_eq!(report.added, vec![a.identity()]);
        assert_eq!(report.loaded, vec!["/lib/liba.so".to_string()]);
        assert!(fs.exists("/share/a.txt"));
        assert!(r.registry().matches(r.installed()));

        let before = r.registry().clone();
        let report = r.reconcile(&mut fs, set(&[&a])).unwrap();
        assert!(report.is_noop());
        assert_eq!(r.registry(), &before);
        assert_eq!(fs.loaded_libraries().len(), 1);
    }

    #[test]
    fn test_retained_package_keeps_registry_entry() {
        let mut fs = MemoryFs::new();
        let a = rec("a", "1", "0");
        let b = rec("b", "1", "0");
        publish(&mut fs, &a, &["lib/a.py"]);
        publish(&mut fs, &b, &["lib/b.py"]);

        let mut r = reconciler();
        r.reconcile(&mut fs, set(&[&a])).unwrap();
        let entry = Arc::clone(r.registry().get(&a.filename).unwrap());

        r.reconcile(&mut fs, set(&[&a, &b])).unwrap();
        assert!(Arc::ptr_eq(r.registry().get(&a.filename).unwrap(), &entry));
    }

    #[test]
    fn test_renamed_archive_is_not_reinstalled() {
        let mut fs = MemoryFs::new();
        let a = rec("a", "1", "0");
        publish(&mut fs, &a, &["lib/a.py"]);

        let mut r = reconciler();
        r.reconcile(&mut fs, set(&[&a])).unwrap();
        let entry = Arc::clone(r.registry().get(&a.filename).unwrap());

        let mut renamed = a.clone();
        renamed.filename = "a-1-0.conda".into();
        let report = r.reconcile(&mut fs, set(&[&renamed])).unwrap();

        assert!(report.is_noop());
        assert!(!r.registry().contains(&a.filename));
        assert!(Arc::ptr_eq(r.registry().get("a-1-0.conda").unwrap(), &entry));
        assert!(r.registry().matches(r.installed()));
    }

    #[test]
    fn test_removal_deletes_recorded_files_only() {
        let mut fs = MemoryFs::new();
        fs.write_file("/share/user.txt", b"mine").unwrap();
        let a = rec("a", "1", "0");
        publish(&mut fs, &a, &["share/a.txt"]);

        let mut r = reconciler();
        r.reconcile(&mut fs, set(&[&a])).unwrap();
        let report = r.reconcile(&mut fs, PackageSet::new()).unwrap();

        assert_eq!(report.removed, vec![a.identity()]);
        assert!(!fs.exists("/share/a.txt"));
        assert!(fs.exists("/share/user.txt"));
        assert!(r.registry().is_empty());
    }

    #[test]
    fn test_cwd_pinned_and_restored() {
        let mut inner = MemoryFs::new();
        inner.create_dir_all("/home/work").unwrap();
        inner.chdir("/home/work").unwrap();
        let a = rec("a", "1", "0");
        publish(&mut inner, &a, &["lib/a.py"]);
        let mut fs = RecordingFs {
            inner,
            install_cwds: Vec::new(),
        };

        reconciler().reconcile(&mut fs, set(&[&a])).unwrap();
        assert_eq!(fs.install_cwds, vec!["/".to_string()]);
        assert_eq!(fs.cwd(), "/home/work");
    }

    #[test]
    fn test_failure_restores_cwd_and_keeps_previous_state() {
        let mut fs = MemoryFs::new();
        fs.create_dir_all("/home").unwrap();
        fs.chdir("/home").unwrap();
        let a = rec("a", "1", "0");
        let missing = rec("missing", "1", "0");
        publish(&mut fs, &a, &["lib/a.py"]);

        let mut r = reconciler();
        r.reconcile(&mut fs, set(&[&a])).unwrap();
        let installed = r.installed().clone();

        let err = r.reconcile(&mut fs, set(&[&a, &missing])).unwrap_err();
        assert_eq!(err, PkgError::MissingArchive(missing.archive_url()));
        assert_eq!(r.installed(), &installed);
        assert!(r.registry().matches(r.installed()));
        assert_eq!(fs.cwd(), "/home");
    }

    #[test]
    fn test_kernel_linked_libraries_not_loaded() {
        let mut fs = MemoryFs::new();
        let core = rec("xeus", "1", "0");
        publish(&mut fs, &core, &["lib/libxeus.so", "lib/libextra.so"]);

        let mut r = reconciler();
        let report = r.reconcile(&mut fs, set(&[&core])).unwrap();
        assert_eq!(report.loaded, vec!["/lib/libextra.so".to_string()]);
        assert_eq!(
            r.shared_libs().get("xeus"),
            Some(&["/lib/libextra.so".to_string()][..])
        );
    }

    #[test]
    fn test_abi_tag_defers_untagged_libraries() {
        let mut fs = MemoryFs::new();
        let python = rec("python", "3.11.3", "h1");
        let numpy = rec("numpy", "1.26", "py311").with_depends(&["python >=3.11"]);
        publish(&mut fs, &python, &["bin/python"]);
        publish(
            &mut fs,
            &numpy,
            &["lib/libopenblas.so", "lib/python3.11/site-packages/_np.cpython-311-wasm32.so"],
        );

        let mut r = Reconciler::new(
            "/",
            KernelLinkedLibs::new(Vec::<String>::new()),
            Some(ManagedRuntime::Python),
        );
        let report = r.reconcile(&mut fs, set(&[&python, &numpy])).unwrap();
        assert_eq!(
            report.loaded,
            vec!["/lib/python3.11/site-packages/_np.cpython-311-wasm32.so".to_string()]
        );
        assert_eq!(report.deferred, vec!["/lib/libopenblas.so".to_string()]);
    }

    #[test]
    fn test_lazy_toolchain_loads_nothing() {
        let mut fs = MemoryFs::new();
        let abi = rec(EMSCRIPTEN_ABI_PACKAGE, "4.0.1", "h0");
        let z = rec("zlib", "1.3", "h0");
        publish(&mut fs, &abi, &["share/abi.txt"]);
        publish(&mut fs, &z, &["lib/libz.so"]);

        let report = reconciler().reconcile(&mut fs, set(&[&abi, &z])).unwrap();
        assert!(report.loaded.is_empty());
        assert_eq!(report.deferred, vec!["/lib/libz.so".to_string()]);
        assert!(fs.loaded_libraries().is_empty());
    }

    #[test]
    fn test_libraries_load_in_dependency_order() {
        let mut fs = MemoryFs::new();
        let app = rec("app", "1", "0").with_depends(&["mid"]);
        let mid = rec("mid", "1", "0").with_depends(&["zlib >=1"]);
        let z = rec("zlib", "1", "0");
        publish(&mut fs, &app, &["lib/libapp.so"]);
        publish(&mut fs, &mid, &["lib/libmid.so"]);
        publish(&mut fs, &z, &["lib/libz.so"]);

        reconciler().reconcile(&mut fs, set(&[&app, &mid, &z])).unwrap();
        assert_eq!(
            fs.loaded_libraries(),
            vec!["/lib/libz.so", "/lib/libmid.so", "/lib/libapp.so"]
        );
    }

    #[test]
    fn test_staged_pass_loads_nothing_until_drained() {
        let mut fs = MemoryFs::new();
        let app = rec("app", "1", "0").with_depends(&["zlib"]);
        let z = rec("zlib", "1", "0");
        publish(&mut fs, &app, &["lib/libapp.so"]);
        publish(&mut fs, &z, &["lib/libz.so"]);

        let mut r = reconciler();
        let report = r.reconcile_staged(&mut fs, set(&[&app, &z])).unwrap();
        assert!(report.loaded.is_empty());
        assert!(fs.loaded_libraries().is_empty());
        assert_eq!(r.pending_libraries(), ["/lib/libz.so", "/lib/libapp.so"]);

        let loaded = r.load_pending(&mut fs).unwrap();
        assert_eq!(loaded, vec!["/lib/libz.so", "/lib/libapp.so"]);
        assert_eq!(fs.loaded_libraries(), vec!["/lib/libz.so", "/lib/libapp.so"]);
        assert!(r.pending_libraries().is_empty());
        assert!(r.load_pending(&mut fs).unwrap().is_empty());
    }

    #[test]
    fn test_staged_libraries_of_removed_packages_are_dropped() {
        let mut fs = MemoryFs::new();
        let a = rec("a", "1", "0");
        let b = rec("b", "1", "0");
        publish(&mut fs, &a, &["lib/liba.so"]);
        publish(&mut fs, &b, &["lib/libb.so"]);

        let mut r = reconciler();
        r.reconcile_staged(&mut fs, set(&[&a, &b])).unwrap();
        r.reconcile_staged(&mut fs, set(&[&b])).unwrap();
        assert_eq!(r.pending_libraries(), ["/lib/libb.so"]);
    }

    #[test]
    fn test_pip_packages_go_to_site_packages() {
        let mut fs = MemoryFs::new();
        let python = rec("python", "3.11.3", "h1");
        let six = PackageRecord::new("six", "1.16.0", "pypi", "six-1.16.0.whl").with_repo("pypi", REPO);
        publish(&mut fs, &python, &["bin/python"]);
        publish(&mut fs, &six, &["six.py"]);

        let mut desired = set(&[&python]);
        desired.insert(Origin::Pip, six.clone());
        let mut r = reconciler();
        r.reconcile(&mut fs, desired).unwrap();
        assert!(fs.exists("/lib/python3.11/site-packages/six.py"));

        let report = r.uninstall(&mut fs, Origin::Pip, &["six".to_string()]).unwrap();
        assert_eq!(report.removed, vec![six.identity()]);
        assert!(!fs.exists("/lib/python3.11/site-packages/six.py"));
    }

    #[test]
    fn test_uninstall_unknown_package() {
        let mut fs = MemoryFs::new();
        let err = reconciler()
            .uninstall(&mut fs, Origin::Conda, &["ghost".to_string()])
            .unwrap_err();
        assert_eq!(err, PkgError::NotInstalled("ghost".into()));
    }
}
