//! Cycle detection is a total barrier: when the graph has any loop the run
//! reports the cycled packages and nothing is ever built.

use std::fs;
use std::path::Path;

use buildsys::core::{DependencyGraph, PackageDepend, World};

fn write_package(root: &Path, name: &str, contents: &str) {
    let dir = root.join("package").join(name);
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join(format!("{}.toml", name)), contents).unwrap();
}

#[test]
fn two_package_cycle_aborts_before_any_build() {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path();
    fs::write(
        root.join("base.toml"),
        r#"
            [[depends]]
            name = "a"
        "#,
    )
    .unwrap();
    write_package(
        root,
        "a",
        r#"
            [[depends]]
            name = "b"

            [[steps]]
            shell = { dir = "", script = "echo built-a > marker" }
        "#,
    );
    write_package(
        root,
        "b",
        r#"
            [[depends]]
            name = "a"
        "#,
    );

    let world = World::new(root);
    assert!(!world.base_package(Path::new("base.toml")).unwrap());

    let ns = world.find_namespace("base");
    let a = ns.find_package("a", Path::new("package/a/a.toml"));
    let b = ns.find_package("b", Path::new("package/b/b.toml"));
    assert!(!a.is_built());
    assert!(!b.is_built());
    // no build() ran: the queued command never produced its marker
    assert!(!root.join("output").exists());

    // the graph-level pass names exactly the two cycled packages
    let mut graph = DependencyGraph::new();
    graph.fill(&world);
    let cycled: Vec<_> = graph
        .cycled_packages()
        .iter()
        .map(|p| p.name().as_str())
        .collect();
    assert_eq!(cycled, vec!["a", "b"]);
}

#[test]
fn self_loop_is_a_cycle() {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path();
    fs::write(
        root.join("base.toml"),
        r#"
            [[depends]]
            name = "selfish"
        "#,
    )
    .unwrap();
    write_package(
        root,
        "selfish",
        r#"
            [[depends]]
            name = "selfish"
        "#,
    );

    let world = World::new(root);
    assert!(!world.base_package(Path::new("base.toml")).unwrap());

    let mut graph = DependencyGraph::new();
    graph.fill(&world);
    let cycled: Vec<_> = graph
        .cycled_packages()
        .iter()
        .map(|p| p.name().as_str())
        .collect();
    assert_eq!(cycled, vec!["selfish"]);
}

#[test]
fn acyclic_graph_reports_no_cycled_packages() {
    let tmp = tempfile::tempdir().unwrap();
    let world = World::new(tmp.path());
    let ns = world.find_namespace("ok");
    let top = ns.find_package("top", Path::new("top.toml"));
    let mid = ns.find_package("mid", Path::new("mid.toml"));
    let leaf = ns.find_package("leaf", Path::new("leaf.toml"));
    top.add_depend(PackageDepend::new(mid.clone(), false));
    mid.add_depend(PackageDepend::new(leaf.clone(), false));
    top.add_depend(PackageDepend::new(leaf.clone(), false));

    let mut graph = DependencyGraph::new();
    graph.fill(&world);
    assert!(graph.cycled_packages().is_empty());
    assert!(top.check_for_dependency_loops());
}
