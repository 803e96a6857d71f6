//! End-to-end runs over real manifest files in a scratch working
//! directory: discovery, staging of dependency outputs, install artifact
//! materialisation, parse-only inspection, and single evaluation.

use std::fs;
use std::path::Path;

use buildsys::core::World;

/// Write a package manifest under `package/<name>/<name>.toml`.
fn write_package(root: &Path, name: &str, contents: &str) {
    let dir = root.join("package").join(name);
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join(format!("{}.toml", name)), contents).unwrap();
}

fn write_base(root: &Path, contents: &str) {
    fs::write(root.join("base.toml"), contents).unwrap();
}

#[test]
fn builds_a_dependency_and_stages_its_outputs() {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path();
    write_base(
        root,
        r#"
            [[depends]]
            name = "lib"

            [[steps]]
            shell = { dir = "", script = "test -f staging/libmarker" }
        "#,
    );
    write_package(
        root,
        "lib",
        r#"
            [[steps]]
            fetch = { location = "payload.txt", method = "copyfile" }

            [[steps]]
            shell = { dir = "staging", script = "echo 1 > libmarker" }
        "#,
    );
    fs::write(root.join("package/lib/payload.txt"), "data\n").unwrap();

    let world = World::new(root);
    assert!(world.base_package(Path::new("base.toml")).unwrap());
    assert!(!world.is_failed());

    // the queued file copy landed the asset in lib's work-src
    assert!(root
        .join("output/base/lib/work/lib/payload.txt")
        .is_file());
    // lib's staging tree was copied into the base package's staging tree
    assert!(root.join("output/base/base/staging/libmarker").is_file());
}

#[test]
fn deps_extract_materialises_install_artifacts() {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path();
    write_base(
        root,
        r#"
            [[depends]]
            name = "firmware"

            [[steps]]
            fetch = { location = "deps", method = "deps" }
        "#,
    );
    write_package(
        root,
        "firmware",
        r#"
            [[steps]]
            shell = { dir = "", script = "echo blob > artifact.bin" }

            [[steps]]
            install-file = "artifact.bin"
        "#,
    );

    let world = World::new(root);
    assert!(world.base_package(Path::new("base.toml")).unwrap());

    assert!(root
        .join("output/base/firmware/artifact.bin")
        .is_file());
    // the dependency's recorded artifact was materialised at deps_extract
    assert!(root.join("output/base/base/deps/artifact.bin").is_file());
}

#[test]
fn shared_dependencies_are_evaluated_once() {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path();
    write_base(
        root,
        r#"
            [[depends]]
            name = "b"
            [[depends]]
            name = "c"
        "#,
    );
    for mid in ["b", "c"] {
        write_package(
            root,
            mid,
            r#"
                [[depends]]
                name = "d"
            "#,
        );
    }
    write_package(
        root,
        "d",
        r#"
            [[steps]]
            shell = { dir = "", script = "true" }
        "#,
    );

    let world = World::new(root);
    assert!(world.base_package(Path::new("base.toml")).unwrap());

    // had d's manifest been evaluated twice its queue would have doubled
    let d = world
        .find_namespace("base")
        .find_package("d", Path::new("package/d/d.toml"));
    assert!(d.is_processed());
    assert_eq!(d.commands_len(), 1);
    assert!(d.is_built());
}

#[test]
fn parse_only_queues_but_never_builds() {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path();
    write_base(
        root,
        r#"
            [[steps]]
            make = { args = ["world"] }
        "#,
    );

    let world = {
        let mut w = World::new(root);
        w.set_parse_only(true);
        w
    };
    world.set_feature("job-limit", "4", true);
    world.set_feature("load-limit", "8", true);
    assert!(world.base_package(Path::new("base.toml")).unwrap());

    let base = world
        .find_namespace("base")
        .find_package("base", Path::new("base.toml"));
    assert!(base.is_processed());
    assert!(!base.is_built());
    // the make binding derived -j/-l from the features, in order
    let argv = base.commands()[0].argv().to_vec();
    assert_eq!(argv, vec!["make", "-j4", "-l8", "world"]);
    // nothing was built, so no output tree appeared
    assert!(!root.join("output").exists());
}

#[test]
fn missing_dependency_manifest_fails_discovery() {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path();
    write_base(
        root,
        r#"
            [[depends]]
            name = "ghost"
        "#,
    );

    let world = World::new(root);
    assert!(!world.base_package(Path::new("base.toml")).unwrap());
    assert!(world.is_failed());
}

#[test]
fn malformed_manifest_fails_discovery() {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path();
    write_base(
        root,
        r#"
            [[steps]]
            make = { arguments = ["world"] }
        "#,
    );

    let world = World::new(root);
    assert!(!world.base_package(Path::new("base.toml")).unwrap());
    assert!(world.is_failed());
}

#[test]
fn cross_namespace_dependencies_resolve() {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path();
    write_base(
        root,
        r#"
            [[depends]]
            name = "tool"
            namespace = "host"
            file = "package/tool/tool.toml"
        "#,
    );
    write_package(
        root,
        "tool",
        r#"
            [[steps]]
            shell = { dir = "", script = "true" }
        "#,
    );

    let world = World::new(root);
    assert!(world.base_package(Path::new("base.toml")).unwrap());

    let names: Vec<_> = world
        .namespaces()
        .iter()
        .map(|ns| ns.name().as_str())
        .collect();
    assert_eq!(names, vec!["base", "host"]);
    // the tool built under its own namespace's output tree
    assert!(root.join("output/host/tool").is_dir());
}
