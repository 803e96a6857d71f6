//! The data-only package manifest.
//!
//! Each package is described by one TOML file: its dependency edges and an
//! ordered list of pipeline steps. Evaluating a manifest replays those
//! steps through the typed binding surface in [`crate::ops`], in authored
//! order, against the package being processed.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Deserialize;

use crate::core::{Package, PackageDepend, World};
use crate::ops;
use crate::util::BuildsysResult;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct Manifest {
    #[serde(default)]
    package: PackageSection,
    #[serde(default)]
    depends: Vec<Dependency>,
    #[serde(default)]
    steps: Vec<Step>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct PackageSection {
    /// Alternate root for this package's asset directory.
    #[serde(default)]
    overlay: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct Dependency {
    name: String,
    /// Defaults to the depender's namespace.
    #[serde(default)]
    namespace: Option<String>,
    /// Defaults to `package/<name>/<name>.toml`.
    #[serde(default)]
    file: Option<PathBuf>,
    /// Suppress build-time side effects (the dependency is still built
    /// first, but nothing of it is staged into the dependent).
    #[serde(default)]
    locate_only: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
enum Step {
    Fetch {
        location: String,
        method: String,
        #[serde(default)]
        decompress: bool,
    },
    Restore {
        location: String,
        method: String,
    },
    Extract(String),
    Cmd {
        dir: String,
        app: String,
        args: Vec<String>,
        #[serde(default)]
        env: Vec<String>,
    },
    Shell {
        dir: String,
        script: String,
        #[serde(default)]
        env: Vec<String>,
    },
    Autoreconf {},
    Configure {
        args: Vec<String>,
        #[serde(default)]
        env: Vec<String>,
        #[serde(default)]
        dir: Option<String>,
    },
    Make {
        #[serde(default)]
        args: Vec<String>,
        #[serde(default)]
        env: Vec<String>,
        #[serde(default)]
        dir: Option<String>,
    },
    Patch {
        dir: String,
        depth: u32,
        patches: Vec<String>,
    },
    InstallFile(String),
    InvokeBuild {
        target: String,
        #[serde(default)]
        buildsys_args: Vec<String>,
        #[serde(default)]
        target_args: Vec<String>,
    },
    Mkdir {
        dir: String,
        paths: Vec<String>,
    },
    Sed {
        dir: String,
        expression: String,
        files: Vec<String>,
    },
}

impl Manifest {
    pub fn load(path: &Path) -> BuildsysResult<Manifest> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read package manifest `{}`", path.display()))?;
        Manifest::parse(&text)
            .with_context(|| format!("invalid package manifest `{}`", path.display()))
    }

    pub fn parse(text: &str) -> BuildsysResult<Manifest> {
        Ok(toml::from_str(text)?)
    }

    /// Register the declared dependencies (creating missing packages in
    /// their namespaces) and replay every step through the binding
    /// surface, in authored order.
    pub fn evaluate(&self, world: &World, pkg: &Package) -> BuildsysResult<()> {
        if let Some(overlay) = &self.package.overlay {
            pkg.set_overlay(overlay.clone());
        }

        for dep in &self.depends {
            let ns_name = dep
                .namespace
                .clone()
                .unwrap_or_else(|| pkg.ns().as_str().to_string());
            let file = dep.file.clone().unwrap_or_else(|| {
                Path::new("package")
                    .join(&dep.name)
                    .join(format!("{}.toml", dep.name))
            });
            let ns = world.find_namespace(&ns_name);
            let target = ns.find_package(&dep.name, &file);
            pkg.add_depend(PackageDepend::new(target, dep.locate_only));
        }

        for step in &self.steps {
            match step {
                Step::Fetch {
                    location,
                    method,
                    decompress,
                } => ops::fetch(world, pkg, location, method, *decompress)?,
                Step::Restore { location, method } => ops::restore(world, pkg, location, method)?,
                Step::Extract(filename) => ops::extract(world, pkg, filename)?,
                Step::Cmd {
                    dir,
                    app,
                    args,
                    env,
                } => ops::cmd(world, pkg, dir, app, args, env)?,
                Step::Shell { dir, script, env } => ops::shell(world, pkg, dir, script, env)?,
                Step::Autoreconf {} => ops::autoreconf(world, pkg)?,
                Step::Configure { args, env, dir } => {
                    ops::configure(world, pkg, args, env, dir.as_deref())?
                }
                Step::Make { args, env, dir } => {
                    ops::make(world, pkg, args, env, dir.as_deref())?
                }
                Step::Patch {
                    dir,
                    depth,
                    patches,
                } => ops::patch(world, pkg, dir, *depth, patches)?,
                Step::InstallFile(name) => ops::install_file(world, pkg, name)?,
                Step::InvokeBuild {
                    target,
                    buildsys_args,
                    target_args,
                } => ops::invoke_build(world, pkg, target, buildsys_args, target_args)?,
                Step::Mkdir { dir, paths } => ops::mkdir(world, pkg, dir, paths)?,
                Step::Sed {
                    dir,
                    expression,
                    files,
                } => ops::sed(world, pkg, dir, expression, files)?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_full_pipeline() {
        let manifest = Manifest::parse(
            r#"
                [[depends]]
                name = "zlib"

                [[depends]]
                name = "toolchain"
                namespace = "host"
                locate-only = true

                [[steps]]
                fetch = { location = "http://example.com/a-1.0.tar.gz", method = "dl" }

                [[steps]]
                extract = "dl/a-1.0.tar.gz"

                [[steps]]
                patch = { dir = "work/a", depth = 1, patches = ["fix.patch"] }

                [[steps]]
                autoreconf = {}

                [[steps]]
                configure = { args = ["--prefix=/usr"] }

                [[steps]]
                make = { args = ["install"], env = ["DESTDIR=staging"] }

                [[steps]]
                install-file = "image.bin"
            "#,
        )
        .unwrap();
        assert_eq!(manifest.depends.len(), 2);
        assert_eq!(manifest.steps.len(), 7);
        assert!(manifest.depends[1].locate_only);
        assert_eq!(manifest.depends[1].namespace.as_deref(), Some("host"));
    }

    #[test]
    fn rejects_unknown_step_fields() {
        let err = Manifest::parse(
            r#"
                [[steps]]
                make = { arsg = ["all"] }
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("arsg") || format!("{:#}", err).contains("unknown"));
    }

    #[test]
    fn empty_manifest_is_valid() {
        let manifest = Manifest::parse("").unwrap();
        assert!(manifest.depends.is_empty());
        assert!(manifest.steps.is_empty());
    }
}
