use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;

use anyhow::Context;
use log::{debug, warn};

use crate::core::{DependencyGraph, Logger, NameSpace, Package, PackageCmd, PackageQueue, TopoGraph};
use crate::util::{BuildsysResult, NoFeatureError};

/// Scheduler state guarded by the single condition variable: the running
/// worker count, the failure flag, and the topo-graph cursor all move
/// together.
#[derive(Default)]
struct Scheduler {
    threads_running: usize,
    failed: bool,
    topo: TopoGraph,
}

/// Process-wide coordinator for one build invocation: the namespace
/// registry, global features, run-mode flags, and the condition variable
/// the execution phase turns on. There is exactly one `World` per
/// invocation and it is passed explicitly everywhere; no global state.
pub struct World {
    pwd: PathBuf,
    app_name: String,

    namespaces: Mutex<Vec<Arc<NameSpace>>>,
    features: Mutex<HashMap<String, String>>,

    forced: Vec<String>,
    cleaning: bool,
    skip_configure: bool,
    output_prefix: bool,
    fetch_from: Option<String>,
    extract_only: bool,
    parse_only: bool,
    keep_going: bool,
    threads_limit: usize,

    sched: Mutex<Scheduler>,
    cond: Condvar,
    logger: Logger,
}

impl World {
    pub fn new(pwd: impl Into<PathBuf>) -> World {
        World {
            pwd: pwd.into(),
            app_name: "buildsys".to_string(),
            namespaces: Mutex::new(Vec::new()),
            features: Mutex::new(HashMap::new()),
            forced: Vec::new(),
            cleaning: false,
            skip_configure: false,
            output_prefix: true,
            fetch_from: None,
            extract_only: false,
            parse_only: false,
            keep_going: false,
            threads_limit: 0,
            sched: Mutex::new(Scheduler::default()),
            cond: Condvar::new(),
            logger: Logger::new("buildsys"),
        }
    }

    // ------------------------------------------------------------------
    // Configuration (set once, before the run)

    pub fn pwd(&self) -> &Path {
        &self.pwd
    }

    pub fn app_name(&self) -> &str {
        &self.app_name
    }

    pub fn set_app_name(&mut self, name: impl Into<String>) {
        self.app_name = name.into();
    }

    /// Adding any forced package switches forced mode on.
    pub fn add_forced(&mut self, name: impl Into<String>) {
        self.forced.push(name.into());
    }

    pub fn forced_mode(&self) -> bool {
        !self.forced.is_empty()
    }

    pub fn is_forced(&self, name: &str) -> bool {
        self.forced.iter().any(|f| f == name)
    }

    /// Append the forced list to a queued command (used when propagating
    /// flags into a recursive invocation).
    pub fn populate_forced_list(&self, cmd: &mut PackageCmd) {
        for name in &self.forced {
            cmd.add_arg(name.clone());
        }
    }

    pub fn set_cleaning(&mut self, on: bool) {
        self.cleaning = on;
    }

    pub fn cleaning(&self) -> bool {
        self.cleaning
    }

    pub fn set_skip_configure(&mut self, on: bool) {
        self.skip_configure = on;
    }

    pub fn skip_configure(&self) -> bool {
        self.skip_configure
    }

    pub fn set_output_prefix(&mut self, on: bool) {
        self.output_prefix = on;
    }

    pub fn output_prefix(&self) -> bool {
        self.output_prefix
    }

    pub fn set_fetch_from(&mut self, source: impl Into<String>) {
        self.fetch_from = Some(source.into());
    }

    pub fn fetch_from(&self) -> Option<&str> {
        self.fetch_from.as_deref()
    }

    pub fn set_extract_only(&mut self, on: bool) {
        self.extract_only = on;
    }

    pub fn extract_only(&self) -> bool {
        self.extract_only
    }

    pub fn set_parse_only(&mut self, on: bool) {
        self.parse_only = on;
    }

    pub fn parse_only(&self) -> bool {
        self.parse_only
    }

    pub fn set_keep_going(&mut self, on: bool) {
        self.keep_going = on;
    }

    pub fn keep_going(&self) -> bool {
        self.keep_going
    }

    /// 0 means unbounded.
    pub fn set_threads_limit(&mut self, limit: usize) {
        self.threads_limit = limit;
    }

    pub fn threads_limit(&self) -> usize {
        self.threads_limit
    }

    // ------------------------------------------------------------------
    // Features

    /// Insert `key -> value`; an existing key is overwritten only when
    /// `overwrite` is set.
    pub fn set_feature(&self, key: &str, value: &str, overwrite: bool) {
        let mut features = self.features.lock().unwrap();
        if overwrite {
            features.insert(key.to_string(), value.to_string());
        } else {
            features.entry(key.to_string()).or_insert_with(|| value.to_string());
        }
    }

    /// Parse a `key=value` spec and set it with overwrite semantics.
    pub fn set_feature_spec(&self, spec: &str) -> BuildsysResult<()> {
        let (key, value) = spec
            .split_once('=')
            .ok_or_else(|| anyhow::format_err!("invalid feature spec `{}` (expected key=value)", spec))?;
        self.set_feature(key, value, true);
        Ok(())
    }

    pub fn feature(&self, key: &str) -> Result<String, NoFeatureError> {
        self.features
            .lock()
            .unwrap()
            .get(key)
            .cloned()
            .ok_or_else(|| NoFeatureError {
                key: key.to_string(),
            })
    }

    // ------------------------------------------------------------------
    // Namespaces

    /// Look up a namespace by name, creating it on a miss. Serialised by
    /// the registry mutex.
    pub fn find_namespace(&self, name: &str) -> Arc<NameSpace> {
        let mut namespaces = self.namespaces.lock().unwrap();
        if let Some(ns) = namespaces.iter().find(|ns| ns.name().as_str() == name) {
            return ns.clone();
        }
        let ns = Arc::new(NameSpace::new(name, &self.pwd));
        namespaces.push(ns.clone());
        ns
    }

    /// Snapshot of the namespaces in insertion order.
    pub fn namespaces(&self) -> Vec<Arc<NameSpace>> {
        self.namespaces.lock().unwrap().clone()
    }

    pub fn print_namespaces(&self) {
        println!();
        println!("----BEGIN NAMESPACES----");
        for ns in self.namespaces() {
            println!("{}", ns.name());
        }
        println!("----END NAMESPACES----");
    }

    // ------------------------------------------------------------------
    // Failure and thread accounting

    pub fn is_failed(&self) -> bool {
        self.sched.lock().unwrap().failed
    }

    pub fn set_failed(&self) {
        let mut sched = self.sched.lock().unwrap();
        sched.failed = true;
        self.cond.notify_all();
    }

    pub fn threads_running(&self) -> usize {
        self.sched.lock().unwrap().threads_running
    }

    fn thread_ended(&self) {
        let mut sched = self.sched.lock().unwrap();
        sched.threads_running -= 1;
        self.cond.notify_all();
    }

    /// Remove a built package from the topo graph, recompute the
    /// ready-set, and wake the dispatcher.
    pub fn package_finished(&self, pkg: &Package) {
        let mut sched = self.sched.lock().unwrap();
        sched.topo.delete_node(pkg);
        sched.topo.topological();
        self.cond.notify_all();
    }

    // ------------------------------------------------------------------
    // The run

    /// Main entry point: evaluate the base manifest, discover the package
    /// graph, check it for cycles, then build it in dependency order.
    /// Returns `Ok(false)` when the run failed.
    pub fn base_package(&self, filename: &Path) -> BuildsysResult<bool> {
        let file = fs::canonicalize(self.pwd.join(filename))
            .with_context(|| format!("base package `{}` does not exist", filename.display()))?;
        let ns_name = file
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| anyhow::format_err!("cannot derive a namespace from `{}`", file.display()))?;

        let ns = self.find_namespace(&ns_name);
        let base = ns.find_package(&ns_name, &file);

        // Discovery
        base.set_processing_queued();
        self.process_packages(&base);
        if self.is_failed() {
            return Ok(false);
        }

        // Cycle check: the global SCC pass and the per-package DFS catch
        // different shapes; both must pass.
        let mut graph = DependencyGraph::new();
        graph.fill(self);
        let cycled = graph.cycled_packages();
        if !cycled.is_empty() {
            self.logger.log("Dependency Loop Detected");
            self.logger.log("Cycled Packages:");
            for pkg in &cycled {
                self.logger.log(format!("    {},{}", pkg.ns(), pkg.name()));
            }
            return Ok(false);
        }
        if !base.check_for_dependency_loops() {
            self.logger.log("Dependency Loop Detected");
            return Ok(false);
        }

        if self.parse_only {
            return Ok(true);
        }

        self.execute(&base);
        Ok(!self.is_failed())
    }

    /// Discovery loop: pop what is available, hand each package to a
    /// worker, and wait. Ends when the queue is drained with no worker in
    /// flight. Worker count is bounded by the same limit as execution.
    fn process_packages(&self, base: &Arc<Package>) {
        let queue = PackageQueue::new();
        queue.push(base.clone());

        thread::scope(|s| {
            while !queue.done() {
                if self.threads_limit > 0 && queue.in_flight() >= self.threads_limit {
                    queue.wait_below(self.threads_limit);
                    continue;
                }
                if let Some(pkg) = queue.pop() {
                    queue.start();
                    let q = &queue;
                    s.spawn(move || self.process_worker(pkg, q));
                }
                queue.wait();
            }
        });
    }

    fn process_worker(&self, pkg: Arc<Package>, queue: &PackageQueue) {
        if let Err(err) = pkg.process(self) {
            pkg.log(format!("{:#}", err));
            pkg.log("Processing failed");
            self.set_failed();
        }
        for dep in pkg.depends() {
            if dep.package().set_processing_queued() {
                queue.push(dep.package().clone());
            }
        }
        queue.finish();
    }

    /// Dispatch loop: snapshot the graph into the topo cursor, then pull
    /// ready packages off it while the thread limit allows, otherwise
    /// sleep on the condition variable. The enclosing scope joins whatever
    /// is still in flight on exit, so this only returns once every worker
    /// has finished.
    pub fn execute(&self, base: &Arc<Package>) {
        {
            let mut sched = self.sched.lock().unwrap();
            sched.topo.fill(self);
            sched.topo.topological();
        }
        thread::scope(|s| {
            let mut sched = self.sched.lock().unwrap();
            loop {
                if base.is_built() {
                    break;
                }
                if sched.failed && !self.keep_going {
                    break;
                }
                if self.threads_limit == 0 || sched.threads_running < self.threads_limit {
                    if let Some(pkg) = sched.topo.topo_next() {
                        if pkg.is_building() {
                            // already owned by a worker; ask the cursor for
                            // the next candidate without sleeping
                            continue;
                        }
                        pkg.set_building();
                        sched.threads_running += 1;
                        debug!("dispatching {},{}", pkg.ns(), pkg.name());
                        s.spawn(move || self.build_worker(pkg));
                        continue;
                    }
                }
                if sched.threads_running == 0 {
                    if sched.failed {
                        // under keep-going everything not poisoned by the
                        // failure has now drained
                        break;
                    }
                    // an acyclic graph with no running work must have a
                    // ready node; bail instead of sleeping forever
                    warn!("dispatcher wedged with nothing running and nothing ready");
                    self.set_failed_locked(&mut sched);
                    break;
                }
                sched = self.cond.wait(sched).unwrap();
            }
        });
    }

    fn set_failed_locked(&self, sched: &mut Scheduler) {
        sched.failed = true;
        self.cond.notify_all();
    }

    fn build_worker(&self, pkg: Arc<Package>) {
        pkg.log("Build Thread");
        pkg.log(format!(
            "Building ({} others running)",
            self.threads_running().saturating_sub(1)
        ));
        match pkg.build(self) {
            Ok(true) => {
                pkg.set_built();
                self.package_finished(&pkg);
            }
            Ok(false) => {
                pkg.log("Building failed");
                self.set_failed();
            }
            Err(err) => {
                pkg.log(format!("{:#}", err));
                pkg.log("Building failed");
                self.set_failed();
            }
        }
        self.thread_ended();
        pkg.log(format!(
            "Finished ({} others running)",
            self.threads_running()
        ));
    }
}
