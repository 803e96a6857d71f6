use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::Context;
use log::{debug, warn};

use crate::core::manifest::Manifest;
use crate::core::{BuildDir, ExtractionQueue, ExtractionUnit, Logger, PackageCmd, World};
use crate::util::paths;
use crate::util::{BuildsysResult, InternedString};

/// A directed dependency edge from a dependent package to one of its
/// dependencies. `locate_only` suppresses build-time side effects: the
/// dependency is still built first, but its install outputs are not staged
/// into the dependent.
#[derive(Clone)]
pub struct PackageDepend {
    package: Arc<Package>,
    locate_only: bool,
}

impl PackageDepend {
    pub fn new(package: Arc<Package>, locate_only: bool) -> PackageDepend {
        PackageDepend {
            package,
            locate_only,
        }
    }

    pub fn package(&self) -> &Arc<Package> {
        &self.package
    }

    pub fn locate_only(&self) -> bool {
        self.locate_only
    }
}

/// Everything a package accumulates while its manifest is evaluated.
/// Frozen once the package transitions to `processed`.
#[derive(Default)]
struct PackageInner {
    depends: Vec<PackageDepend>,
    extraction: ExtractionQueue,
    commands: Vec<PackageCmd>,
    deps_extract: Option<PathBuf>,
    install_file: Option<String>,
    install_output: Option<PathBuf>,
    overlay: Option<PathBuf>,
}

/// One atomic buildable unit: identity, dependency edges, the queued
/// extraction units and shell commands, and the monotonic state flags the
/// scheduler steers by.
pub struct Package {
    ns: InternedString,
    name: InternedString,
    file: PathBuf,
    builddir: BuildDir,
    logger: Logger,
    inner: Mutex<PackageInner>,

    // Monotonic state bits, except `building` which drops back on
    // completion. `visiting` and `loop_checked` are scratch for the
    // dependency-loop DFS that runs between discovery and execution.
    processing_queued: AtomicBool,
    processed: AtomicBool,
    code_updated: AtomicBool,
    building: AtomicBool,
    built: AtomicBool,
    visiting: AtomicBool,
    loop_checked: AtomicBool,
}

impl Package {
    pub fn new(ns: InternedString, name: &str, file: &Path, pwd: &Path) -> Package {
        let name = InternedString::new(name);
        Package {
            ns,
            name,
            file: file.to_path_buf(),
            builddir: BuildDir::new(pwd, ns, name),
            logger: Logger::new(format!("{},{}", ns, name)),
            inner: Mutex::new(PackageInner::default()),
            processing_queued: AtomicBool::new(false),
            processed: AtomicBool::new(false),
            code_updated: AtomicBool::new(false),
            building: AtomicBool::new(false),
            built: AtomicBool::new(false),
            visiting: AtomicBool::new(false),
            loop_checked: AtomicBool::new(false),
        }
    }

    #[cfg(test)]
    pub(crate) fn for_tests(ns: &str, name: &str) -> Arc<Package> {
        Arc::new(Package::new(
            InternedString::new(ns),
            name,
            Path::new("test.toml"),
            Path::new("/tmp"),
        ))
    }

    pub fn ns(&self) -> InternedString {
        self.ns
    }

    pub fn name(&self) -> InternedString {
        self.name
    }

    pub fn file(&self) -> &Path {
        &self.file
    }

    pub fn builddir(&self) -> &BuildDir {
        &self.builddir
    }

    pub fn logger(&self) -> &Logger {
        &self.logger
    }

    pub fn log(&self, msg: impl std::fmt::Display) {
        self.logger.log(msg);
    }

    fn inner(&self) -> MutexGuard<'_, PackageInner> {
        self.inner.lock().unwrap()
    }

    // ------------------------------------------------------------------
    // State flags

    /// One-shot gate for discovery: returns true exactly once, for the
    /// caller that gets to queue this package for processing.
    pub fn set_processing_queued(&self) -> bool {
        !self.processing_queued.swap(true, Ordering::SeqCst)
    }

    pub fn is_processed(&self) -> bool {
        self.processed.load(Ordering::SeqCst)
    }

    pub fn set_code_updated(&self) {
        self.code_updated.store(true, Ordering::SeqCst);
    }

    pub fn is_code_updated(&self) -> bool {
        self.code_updated.load(Ordering::SeqCst)
    }

    pub fn is_building(&self) -> bool {
        self.building.load(Ordering::SeqCst)
    }

    pub fn set_building(&self) {
        self.building.store(true, Ordering::SeqCst);
    }

    pub fn is_built(&self) -> bool {
        self.built.load(Ordering::SeqCst)
    }

    /// Publish a successful build: `built` implies `building` is clear.
    pub fn set_built(&self) {
        self.building.store(false, Ordering::SeqCst);
        self.built.store(true, Ordering::SeqCst);
    }

    // ------------------------------------------------------------------
    // Mutators used by the binding surface during process()

    /// Append a dependency edge. Multi-edges to the same target coalesce;
    /// a repeated registration keeps the stronger (side-effect-carrying)
    /// form of the edge.
    pub fn add_depend(&self, dep: PackageDepend) {
        debug_assert!(!self.is_processed(), "depends are frozen after process()");
        let mut inner = self.inner();
        for existing in &mut inner.depends {
            if Arc::ptr_eq(existing.package(), dep.package()) {
                existing.locate_only = existing.locate_only && dep.locate_only;
                return;
            }
        }
        inner.depends.push(dep);
    }

    pub fn depends(&self) -> Vec<PackageDepend> {
        self.inner().depends.clone()
    }

    pub fn add_command(&self, cmd: PackageCmd) {
        debug_assert!(!self.is_processed(), "commands are frozen after process()");
        self.inner().commands.push(cmd);
    }

    pub fn commands_len(&self) -> usize {
        self.inner().commands.len()
    }

    /// Snapshot of the queued commands in insertion order.
    pub fn commands(&self) -> Vec<PackageCmd> {
        self.inner().commands.clone()
    }

    pub fn add_extraction_unit(&self, unit: ExtractionUnit) {
        debug_assert!(
            !self.is_processed(),
            "the extraction queue is frozen after process()"
        );
        self.inner().extraction.add(unit);
    }

    pub fn extraction_len(&self) -> usize {
        self.inner().extraction.len()
    }

    pub fn set_deps_extract(&self, path: PathBuf) {
        self.inner().deps_extract = Some(path);
    }

    pub fn deps_extract(&self) -> Option<PathBuf> {
        self.inner().deps_extract.clone()
    }

    pub fn set_install_file(&self, name: &str) {
        self.inner().install_file = Some(name.to_string());
    }

    pub fn install_file(&self) -> Option<String> {
        self.inner().install_file.clone()
    }

    /// The package's recorded install artifact, available once built.
    pub fn install_output(&self) -> Option<PathBuf> {
        self.inner().install_output.clone()
    }

    pub fn set_overlay(&self, path: PathBuf) {
        self.inner().overlay = Some(path);
    }

    pub fn overlay(&self) -> Option<PathBuf> {
        self.inner().overlay.clone()
    }

    // ------------------------------------------------------------------
    // Life cycle

    /// Evaluate the package manifest once, populating dependency edges and
    /// the extraction/command queues. After this returns the package is
    /// immutable apart from its scheduler-visible flags.
    pub fn process(&self, world: &World) -> BuildsysResult<()> {
        let manifest = Manifest::load(&world.pwd().join(&self.file))?;
        manifest.evaluate(world, self)?;
        self.processed.store(true, Ordering::SeqCst);
        let (deps, units, commands) = {
            let inner = self.inner();
            (
                inner.depends.len(),
                inner.extraction.len(),
                inner.commands.len(),
            )
        };
        debug!(
            "{},{}: processed ({} deps, {} units, {} commands)",
            self.ns, self.name, deps, units, commands
        );
        Ok(())
    }

    /// Run the package's build pipeline. Returns `Ok(false)` when a queued
    /// command or extraction unit failed; hard errors (filesystem, spawn)
    /// propagate as `Err`.
    pub fn build(&self, world: &World) -> BuildsysResult<bool> {
        // Forced mode: packages outside the forced set succeed without
        // executing anything (their queues were no-ops at discovery too).
        if world.forced_mode() && !world.is_forced(self.name.as_str()) {
            return Ok(true);
        }

        let d = &self.builddir;
        if world.cleaning() {
            for dir in [d.work_build(), d.staging()] {
                if dir.exists() {
                    paths::remove_dir_all(dir)?;
                }
            }
        }
        for dir in [d.path(), d.work_src(), d.work_build(), d.staging()] {
            paths::create_dir_all(dir)?;
        }

        self.stage_dependencies()?;

        let output_logger = if world.output_prefix() {
            self.logger.clone()
        } else {
            Logger::unprefixed()
        };

        let inner = self.inner();
        if let Err(err) = inner.extraction.replay(d, &output_logger) {
            self.log(format!("{:#}", err));
            return Ok(false);
        }
        if world.extract_only() {
            return Ok(true);
        }
        for cmd in &inner.commands {
            if let Err(err) = cmd.execute(&output_logger) {
                self.log(format!("{:#}", err));
                return Ok(false);
            }
        }
        let install_file = inner.install_file.clone();
        drop(inner);

        if let Some(name) = install_file {
            let artifact = d.path().join(&name);
            if !artifact.exists() {
                warn!(
                    "{},{}: install file `{}` was not produced",
                    self.ns,
                    self.name,
                    artifact.display()
                );
            }
            self.inner().install_output = Some(artifact);
        }
        Ok(true)
    }

    /// Materialise dependency install outputs: every non-locate-only
    /// dependency's staging tree lands in this package's staging area, and
    /// recorded install artifacts additionally land in `deps_extract` when
    /// the manifest asked for them there.
    fn stage_dependencies(&self) -> BuildsysResult<()> {
        let (depends, deps_extract) = {
            let inner = self.inner();
            (inner.depends.clone(), inner.deps_extract.clone())
        };
        if let Some(dir) = &deps_extract {
            paths::create_dir_all(dir)?;
        }
        for dep in depends.iter().filter(|dep| !dep.locate_only()) {
            let dep_pkg = dep.package();
            let dep_staging = dep_pkg.builddir().staging();
            if dep_staging.is_dir() {
                paths::copy_tree(dep_staging, self.builddir.staging()).with_context(|| {
                    format!(
                        "failed to stage `{},{}` into `{},{}`",
                        dep_pkg.ns(),
                        dep_pkg.name(),
                        self.ns,
                        self.name
                    )
                })?;
            }
            if let (Some(dir), Some(artifact)) = (&deps_extract, dep_pkg.install_output()) {
                let dest = dir.join(artifact.file_name().unwrap_or_default());
                paths::copy_file(&artifact, &dest)?;
            }
        }
        Ok(())
    }

    /// Depth-first cycle walk: `visiting` is the grey mark, `loop_checked`
    /// the black one. Returns false when a grey package is reached again.
    /// Redundant with the graph-level SCC pass; both must hold.
    pub fn check_for_dependency_loops(&self) -> bool {
        if self.visiting.load(Ordering::SeqCst) {
            return false;
        }
        if self.loop_checked.load(Ordering::SeqCst) {
            return true;
        }
        self.visiting.store(true, Ordering::SeqCst);
        for dep in self.depends() {
            if !dep.package().check_for_dependency_loops() {
                return false;
            }
        }
        self.visiting.store(false, Ordering::SeqCst);
        self.loop_checked.store(true, Ordering::SeqCst);
        true
    }
}
