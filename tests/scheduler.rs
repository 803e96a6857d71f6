//! Execution-phase properties, driven through the typed binding surface
//! rather than manifest files: dependency precedence, bounded parallelism,
//! forced-mode filtering, and keep-going draining.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use buildsys::core::{Package, PackageDepend, World};
use buildsys::ops;

fn manifest_path(name: &str) -> std::path::PathBuf {
    Path::new("package").join(name).join(format!("{}.toml", name))
}

/// Queue a shell command that appends one line to the shared event log.
fn record_event(world: &World, pkg: &Arc<Package>, events: &Path, line: &str) {
    ops::shell(
        world,
        pkg,
        "",
        &format!("echo {} >> {}", line, events.display()),
        &[],
    )
    .unwrap();
}

/// Queue start/end markers around an optional sleep.
fn record_span(world: &World, pkg: &Arc<Package>, events: &Path, name: &str, sleep: Option<&str>) {
    record_event(world, pkg, events, &format!("start-{}", name));
    if let Some(duration) = sleep {
        ops::shell(world, pkg, "", &format!("sleep {}", duration), &[]).unwrap();
    }
    record_event(world, pkg, events, &format!("end-{}", name));
}

fn read_events(events: &Path) -> Vec<String> {
    fs::read_to_string(events)
        .unwrap_or_default()
        .lines()
        .map(|l| l.to_string())
        .collect()
}

fn index_of(events: &[String], line: &str) -> usize {
    events
        .iter()
        .position(|e| e == line)
        .unwrap_or_else(|| panic!("event `{}` missing from {:?}", line, events))
}

#[test]
fn independent_leaves_overlap_and_precede_the_base() {
    // S1: base depends on A and B; with two threads the leaves run
    // together and the base strictly after both.
    let tmp = tempfile::tempdir().unwrap();
    let events = tmp.path().join("events.log");
    let mut world = World::new(tmp.path());
    world.set_threads_limit(2);

    let ns = world.find_namespace("s1");
    let base = ns.find_package("base", Path::new("base.toml"));
    let a = ns.find_package("a", &manifest_path("a"));
    let b = ns.find_package("b", &manifest_path("b"));
    base.add_depend(PackageDepend::new(a.clone(), false));
    base.add_depend(PackageDepend::new(b.clone(), false));

    record_span(&world, &a, &events, "a", Some("0.3"));
    record_span(&world, &b, &events, "b", Some("0.3"));
    record_span(&world, &base, &events, "base", None);

    world.execute(&base);
    assert!(!world.is_failed());
    assert!(base.is_built());

    let log = read_events(&events);
    let starts = [index_of(&log, "start-a"), index_of(&log, "start-b")];
    let ends = [index_of(&log, "end-a"), index_of(&log, "end-b")];
    // both leaves started before either finished: they genuinely overlapped
    assert!(starts.iter().max() < ends.iter().min());
    // the base only runs once both leaves are done
    let base_start = index_of(&log, "start-base");
    assert!(ends.iter().all(|&e| e < base_start));
}

#[test]
fn diamond_builds_bottom_up() {
    // S2: A -> {B, C} -> D. D first, A last, and D is observably built
    // before either middle package starts.
    let tmp = tempfile::tempdir().unwrap();
    let events = tmp.path().join("events.log");
    let mut world = World::new(tmp.path());
    world.set_threads_limit(2);

    let ns = world.find_namespace("s2");
    let a = ns.find_package("a", &manifest_path("a"));
    let b = ns.find_package("b", &manifest_path("b"));
    let c = ns.find_package("c", &manifest_path("c"));
    let d = ns.find_package("d", &manifest_path("d"));
    a.add_depend(PackageDepend::new(b.clone(), false));
    a.add_depend(PackageDepend::new(c.clone(), false));
    b.add_depend(PackageDepend::new(d.clone(), false));
    c.add_depend(PackageDepend::new(d.clone(), false));

    for (pkg, name) in [(&a, "a"), (&b, "b"), (&c, "c"), (&d, "d")] {
        record_span(&world, pkg, &events, name, None);
    }

    world.execute(&a);
    assert!(!world.is_failed());
    for pkg in [&a, &b, &c, &d] {
        assert!(pkg.is_built());
    }

    let log = read_events(&events);
    let end_d = index_of(&log, "end-d");
    assert!(end_d < index_of(&log, "start-b"));
    assert!(end_d < index_of(&log, "start-c"));
    let start_a = index_of(&log, "start-a");
    assert!(index_of(&log, "end-b") < start_a);
    assert!(index_of(&log, "end-c") < start_a);
}

#[test]
fn single_thread_serialises_in_dispatch_order() {
    // With threads_limit=1 execution is a valid topological sort and the
    // dispatch sequence is the deterministic insertion order.
    let tmp = tempfile::tempdir().unwrap();
    let events = tmp.path().join("events.log");
    let mut world = World::new(tmp.path());
    world.set_threads_limit(1);

    let ns = world.find_namespace("serial");
    let base = ns.find_package("base", Path::new("base.toml"));
    let leaves: Vec<_> = ["x", "y", "z"]
        .iter()
        .map(|n| ns.find_package(n, &manifest_path(n)))
        .collect();
    for leaf in &leaves {
        base.add_depend(PackageDepend::new(leaf.clone(), false));
    }
    for (leaf, name) in leaves.iter().zip(["x", "y", "z"]) {
        record_span(&world, leaf, &events, name, None);
    }
    record_span(&world, &base, &events, "base", None);

    world.execute(&base);
    assert!(!world.is_failed());

    let log = read_events(&events);
    assert_eq!(
        log,
        vec![
            "start-x", "end-x", "start-y", "end-y", "start-z", "end-z", "start-base", "end-base",
        ]
    );
}

#[test]
fn forced_mode_builds_only_the_forced_set() {
    // S4: forced set {a}; b's bindings were no-ops and its build succeeds
    // without running anything.
    let tmp = tempfile::tempdir().unwrap();
    let events = tmp.path().join("events.log");
    let mut world = World::new(tmp.path());
    world.add_forced("a");

    let ns = world.find_namespace("s4");
    let base = ns.find_package("base", Path::new("base.toml"));
    let a = ns.find_package("a", &manifest_path("a"));
    let b = ns.find_package("b", &manifest_path("b"));
    base.add_depend(PackageDepend::new(a.clone(), false));
    base.add_depend(PackageDepend::new(b.clone(), false));

    record_span(&world, &a, &events, "a", None);
    record_span(&world, &b, &events, "b", None);

    assert_eq!(a.commands_len(), 2);
    assert_eq!(b.commands_len(), 0);

    world.execute(&base);
    assert!(!world.is_failed());
    assert!(base.is_built());
    assert!(b.is_built());

    let log = read_events(&events);
    assert!(log.contains(&"start-a".to_string()));
    assert!(!log.iter().any(|e| e.contains("-b")));
}

#[test]
fn keep_going_drains_unaffected_work() {
    // S6: x fails, y still completes, and execute() only returns once y's
    // worker has exited. The base never builds.
    let tmp = tempfile::tempdir().unwrap();
    let events = tmp.path().join("events.log");
    let mut world = World::new(tmp.path());
    world.set_keep_going(true);
    world.set_threads_limit(1);

    let ns = world.find_namespace("s6");
    let base = ns.find_package("base", Path::new("base.toml"));
    let x = ns.find_package("x", &manifest_path("x"));
    let y = ns.find_package("y", &manifest_path("y"));
    base.add_depend(PackageDepend::new(x.clone(), false));
    base.add_depend(PackageDepend::new(y.clone(), false));

    ops::shell(&world, &x, "", "exit 1", &[]).unwrap();
    record_span(&world, &y, &events, "y", None);
    record_span(&world, &base, &events, "base", None);

    world.execute(&base);
    assert!(world.is_failed());
    assert!(!base.is_built());
    assert!(y.is_built());

    let log = read_events(&events);
    assert_eq!(index_of(&log, "end-y") + 1, log.len());
    assert!(!log.iter().any(|e| e.contains("base")));
}

#[test]
fn failure_without_keep_going_stops_new_dispatches() {
    // One failing leaf; the base must never start and execute() reports
    // failure after in-flight work drains.
    let tmp = tempfile::tempdir().unwrap();
    let events = tmp.path().join("events.log");
    let mut world = World::new(tmp.path());
    world.set_threads_limit(1);

    let ns = world.find_namespace("fail");
    let base = ns.find_package("base", Path::new("base.toml"));
    let x = ns.find_package("x", &manifest_path("x"));
    base.add_depend(PackageDepend::new(x.clone(), false));

    ops::shell(&world, &x, "", "exit 7", &[]).unwrap();
    record_span(&world, &base, &events, "base", None);

    world.execute(&base);
    assert!(world.is_failed());
    assert!(!base.is_built());
    assert!(read_events(&events).is_empty());
}
