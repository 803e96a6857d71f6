//! The typed binding surface the manifest layer drives.
//!
//! Every operation takes the `World` and the package being processed
//! explicitly; there is no ambient state. Operations either queue work on
//! the package (extraction units, commands) or, for the fetch family,
//! execute immediately during discovery. In forced mode every operation on
//! a package outside the forced set is a no-op.

use std::path::PathBuf;

use anyhow::Context;
use log::debug;

use crate::core::{ExtractionUnit, Package, PackageCmd, World};
use crate::util::paths::{self, location_basename};
use crate::util::BuildsysResult;

fn forced_no_op(world: &World, pkg: &Package) -> bool {
    world.forced_mode() && !world.is_forced(pkg.name().as_str())
}

fn pkg_env(pkg: &Package) -> String {
    format!("BS_PACKAGE_NAME={}", pkg.name())
}

fn is_anchored(location: &str) -> bool {
    location.starts_with('/') || location.starts_with("dl/") || location.starts_with('.')
}

/// Resolve a fetch location to an absolute path, preferring the package's
/// overlay directory for package-area assets.
fn absolute_fetch(pkg: &Package, location: &str) -> PathBuf {
    if let Some(overlay) = pkg.overlay() {
        if !is_anchored(location) {
            return overlay
                .join("package")
                .join(pkg.name().as_str())
                .join(location);
        }
    }
    pkg.builddir()
        .absolute_fetch(location, pkg.name().as_str())
}

fn relative_fetch(pkg: &Package, location: &str) -> PathBuf {
    if let Some(overlay) = pkg.overlay() {
        if !is_anchored(location) {
            return overlay
                .join("package")
                .join(pkg.name().as_str())
                .join(location);
        }
    }
    pkg.builddir()
        .relative_fetch(location, pkg.name().as_str())
}

/// Bring source material into reach. `dl`, `git`, `link` and `copy` act
/// immediately; `linkgit`, `copygit`, `sm` and `copyfile` queue extraction
/// units; `deps` records where dependency install outputs should land.
pub fn fetch(
    world: &World,
    pkg: &Package,
    location: &str,
    method: &str,
    decompress: bool,
) -> BuildsysResult<()> {
    if forced_no_op(world, pkg) {
        return Ok(());
    }
    let d = pkg.builddir();
    match method {
        "dl" => fetch_dl(world, pkg, location, decompress)?,
        "git" => {
            paths::create_dir_all(d.path())?;
            let mut pc = PackageCmd::new(d.path());
            pc.add_arg("git");
            pc.add_arg("clone");
            pc.add_arg(location);
            pc.execute(pkg.logger())
                .with_context(|| format!("failed to git clone `{}`", location))?;
            pkg.log("Git clone, considering code updated");
            pkg.set_code_updated();
        }
        "linkgit" => {
            let fetch_path = relative_fetch(pkg, location);
            let dst = location_basename(&fetch_path.to_string_lossy()).to_string();
            pkg.add_extraction_unit(ExtractionUnit::GitDir {
                src: PathBuf::from(location),
                dst_subdir: dst,
                link: true,
            });
        }
        "copygit" => {
            let src = relative_fetch(pkg, location);
            pkg.add_extraction_unit(ExtractionUnit::GitDir {
                src,
                dst_subdir: ".".to_string(),
                link: false,
            });
        }
        "sm" => {
            ensure_fresh_dir(d.work_build())?;
            let dst = location_basename(&d.work_src().to_string_lossy()).to_string();
            pkg.add_extraction_unit(ExtractionUnit::GitDir {
                src: PathBuf::from(location),
                dst_subdir: dst,
                link: true,
            });
        }
        "link" => {
            paths::create_dir_all(d.path())?;
            let target = relative_fetch(pkg, location);
            let mut ln = PackageCmd::new(d.path());
            ln.add_arg("ln");
            ln.add_arg("-sf");
            ln.add_arg(target.display().to_string());
            ln.add_arg(".");
            if ln.execute(pkg.logger()).is_err() {
                // a stale entry may be in the way: remove it and relink
                let name = location_basename(&target.to_string_lossy()).to_string();
                let mut rm = PackageCmd::new(d.path());
                rm.add_arg("rm");
                rm.add_arg("-fr");
                rm.add_arg(&name);
                pkg.log(format!("rm -fr {}", name));
                rm.execute(pkg.logger())
                    .context("failed to ln (symbolically), could not remove target first")?;
                ln.execute(pkg.logger())
                    .context("failed to ln (symbolically), even after removing target first")?;
            }
            pkg.log("Linked data in, considering updated");
            pkg.set_code_updated();
        }
        "copy" => {
            paths::create_dir_all(d.path())?;
            let mut pc = PackageCmd::new(d.path());
            pc.add_arg("cp");
            pc.add_arg("-dpRuf");
            pc.add_arg(absolute_fetch(pkg, location).display().to_string());
            pc.add_arg(".");
            pc.execute(pkg.logger())
                .context("failed to copy (recursively)")?;
            pkg.log("Copied data in, considering code updated");
            pkg.set_code_updated();
        }
        "copyfile" => {
            pkg.add_extraction_unit(ExtractionUnit::FileCopy {
                path: relative_fetch(pkg, location),
            });
        }
        "deps" => {
            pkg.set_deps_extract(d.absolute(location, false));
            pkg.log("Will add installed files, considering code updated");
            pkg.set_code_updated();
        }
        other => anyhow::bail!("unsupported fetch method `{}`", other),
    }
    Ok(())
}

/// Download `location` into `<pwd>/dl` unless the file is already there.
fn fetch_dl(
    world: &World,
    pkg: &Package,
    location: &str,
    decompress: bool,
) -> BuildsysResult<()> {
    let dl_dir = world.pwd().join("dl");
    paths::create_dir_all(&dl_dir)?;

    let fname = location_basename(location);
    let final_name = if decompress {
        match fname.rsplit_once('.') {
            Some((stem, _ext)) => stem,
            None => fname,
        }
    } else {
        fname
    };
    if !final_name.is_empty() && dl_dir.join(final_name).exists() {
        debug!("dl/{} already present, skipping fetch", final_name);
        return Ok(());
    }

    let mut wget = PackageCmd::new(&dl_dir);
    wget.add_arg("wget");
    wget.add_arg(location);
    wget.execute(pkg.logger()).context("failed to fetch file")?;

    if decompress {
        let mut pc = PackageCmd::new(&dl_dir);
        match fname.rsplit_once('.').map(|(_, ext)| ext) {
            Some("gz") => {
                pc.add_arg("gunzip");
            }
            Some("bz2") => {
                pc.add_arg("bunzip2");
            }
            _ => {
                pkg.log(format!(
                    "Could not guess decompression based on extension: {}",
                    fname
                ));
                return Ok(());
            }
        }
        pc.add_arg("-d");
        pc.add_arg(fname);
        pc.execute(pkg.logger())
            .with_context(|| format!("failed to decompress `{}`", fname))?;
    }
    Ok(())
}

/// `work_build` must exist before a submodule checkout is queued; a stray
/// file in its place is removed and the directory recreated.
fn ensure_fresh_dir(dir: &std::path::Path) -> BuildsysResult<()> {
    if std::fs::create_dir_all(dir).is_ok() {
        return Ok(());
    }
    if dir.is_file() {
        std::fs::remove_file(dir)
            .with_context(|| format!("failed to remove `{}`", dir.display()))?;
    } else if dir.exists() {
        paths::remove_dir_all(dir)?;
    }
    paths::create_dir_all(dir)
}

/// Queue a command that restores a file from the package asset area into
/// the working tree.
pub fn restore(world: &World, pkg: &Package, location: &str, method: &str) -> BuildsysResult<()> {
    if forced_no_op(world, pkg) {
        return Ok(());
    }
    match method {
        "copyfile" => {
            let d = pkg.builddir();
            let mut pc = PackageCmd::new(d.path());
            pc.add_arg("cp");
            pc.add_arg("-dpRuf");
            pc.add_arg(absolute_fetch(pkg, location).display().to_string());
            pc.add_arg(location_basename(location));
            pc.add_env(pkg_env(pkg));
            pkg.add_command(pc);
        }
        other => anyhow::bail!("unsupported restore method `{}`", other),
    }
    Ok(())
}

/// Queue an archive extraction; `.zip` files get the zip unit, everything
/// else falls through to tar.
pub fn extract(world: &World, pkg: &Package, filename: &str) -> BuildsysResult<()> {
    if forced_no_op(world, pkg) {
        return Ok(());
    }
    let d = pkg.builddir();
    let real = d.relative(filename, true);
    let unit = if filename.contains(".zip") {
        ExtractionUnit::Zip { path: real }
    } else {
        ExtractionUnit::Tar { path: real }
    };
    pkg.add_extraction_unit(unit);
    Ok(())
}

/// Queue an arbitrary command at `dir` (resolved under the package root).
pub fn cmd(
    world: &World,
    pkg: &Package,
    dir: &str,
    app: &str,
    args: &[String],
    env: &[String],
) -> BuildsysResult<()> {
    if forced_no_op(world, pkg) {
        return Ok(());
    }
    let d = pkg.builddir();
    let cwd = d.pwd().join(d.relative(dir, false));
    let mut pc = PackageCmd::new(cwd);
    pc.add_arg(app);
    for arg in args {
        pc.add_arg(arg.clone());
    }
    for kv in env {
        pc.add_env(kv.clone());
    }
    pc.add_env(pkg_env(pkg));
    pkg.add_command(pc);
    Ok(())
}

/// Queue `bash -c <script>` at `dir`.
pub fn shell(
    world: &World,
    pkg: &Package,
    dir: &str,
    script: &str,
    env: &[String],
) -> BuildsysResult<()> {
    if forced_no_op(world, pkg) {
        return Ok(());
    }
    let d = pkg.builddir();
    let mut pc = PackageCmd::new(d.absolute(dir, false));
    pc.add_arg("bash");
    pc.add_arg("-c");
    pc.add_arg(script);
    for kv in env {
        pc.add_env(kv.clone());
    }
    pc.add_env(pkg_env(pkg));
    pkg.add_command(pc);
    Ok(())
}

/// Queue `autoreconf` in the source tree, pointed at the staged aclocal
/// include path. Skipped (queued as a no-op) under `--skip-configure`.
pub fn autoreconf(world: &World, pkg: &Package) -> BuildsysResult<()> {
    if forced_no_op(world, pkg) {
        return Ok(());
    }
    let d = pkg.builddir();
    let mut pc = PackageCmd::new(d.work_src());
    if world.skip_configure() {
        pc.skip();
    }
    let incdir = d.staging().join("usr/local/aclocal");
    pc.add_arg("autoreconf");
    pc.add_arg("-i");
    pc.add_arg("-B");
    pc.add_arg(incdir.display().to_string());
    pc.add_env(pkg_env(pkg));
    pkg.add_command(pc);
    Ok(())
}

/// Queue the out-of-tree `../<pkg>/configure` invocation. Skipped under
/// `--skip-configure`.
pub fn configure(
    world: &World,
    pkg: &Package,
    args: &[String],
    env: &[String],
    dir: Option<&str>,
) -> BuildsysResult<()> {
    if forced_no_op(world, pkg) {
        return Ok(());
    }
    let d = pkg.builddir();
    let path = build_subdir(d.work_build(), dir);
    let mut pc = PackageCmd::new(path);
    if world.skip_configure() {
        pc.skip();
    }
    pc.add_arg(format!("../{}/configure", pkg.name()));
    for arg in args {
        pc.add_arg(arg.clone());
    }
    for kv in env {
        pc.add_env(kv.clone());
    }
    pc.add_env(pkg_env(pkg));
    pkg.add_command(pc);
    Ok(())
}

/// Queue `make`, deriving `-j`/`-l` from the `job-limit` and `load-limit`
/// features when they are set.
pub fn make(
    world: &World,
    pkg: &Package,
    args: &[String],
    env: &[String],
    dir: Option<&str>,
) -> BuildsysResult<()> {
    if forced_no_op(world, pkg) {
        return Ok(());
    }
    let d = pkg.builddir();
    let path = build_subdir(d.work_build(), dir);
    let mut pc = PackageCmd::new(path);
    pc.add_arg("make");
    if let Ok(jobs) = world.feature("job-limit") {
        pc.add_arg(format!("-j{}", jobs));
    }
    if let Ok(load) = world.feature("load-limit") {
        pc.add_arg(format!("-l{}", load));
    }
    for arg in args {
        pc.add_arg(arg.clone());
    }
    for kv in env {
        pc.add_env(kv.clone());
    }
    pc.add_env(pkg_env(pkg));
    pkg.add_command(pc);
    Ok(())
}

/// Queue one patch unit per listed patch, applied at `depth` inside
/// `patch_dir`.
pub fn patch(
    world: &World,
    pkg: &Package,
    patch_dir: &str,
    depth: u32,
    patches: &[String],
) -> BuildsysResult<()> {
    if forced_no_op(world, pkg) {
        return Ok(());
    }
    let d = pkg.builddir();
    let target_dir = d.relative(patch_dir, true);
    for patch in patches {
        pkg.add_extraction_unit(ExtractionUnit::Patch {
            depth,
            target_dir: target_dir.clone(),
            patch_file: relative_fetch(pkg, patch),
        });
    }
    Ok(())
}

/// Record the package's install artifact name.
pub fn install_file(world: &World, pkg: &Package, name: &str) -> BuildsysResult<()> {
    if forced_no_op(world, pkg) {
        return Ok(());
    }
    pkg.set_install_file(name);
    Ok(())
}

/// Queue a recursive invocation of the build system against `target`,
/// propagating the current run-mode flags and the forced list.
pub fn invoke_build(
    world: &World,
    pkg: &Package,
    target: &str,
    buildsys_args: &[String],
    target_args: &[String],
) -> BuildsysResult<()> {
    if forced_no_op(world, pkg) {
        return Ok(());
    }
    let mut pc = PackageCmd::new(world.pwd());
    pc.add_arg(world.app_name());
    pc.add_arg(target);
    for arg in buildsys_args {
        pc.add_arg(arg.clone());
    }
    if world.cleaning() {
        pc.add_arg("--clean");
    }
    if world.skip_configure() {
        pc.add_arg("--skip-configure");
    }
    if !world.output_prefix() {
        pc.add_arg("--nop");
    }
    if let Some(source) = world.fetch_from() {
        pc.add_arg("--ff");
        pc.add_arg(source);
    }
    if world.extract_only() {
        pc.add_arg("--extract-only");
    }
    if world.forced_mode() {
        world.populate_forced_list(&mut pc);
    }
    pc.add_arg("--");
    for arg in target_args {
        pc.add_arg(arg.clone());
    }
    pc.add_env(pkg_env(pkg));
    pkg.add_command(pc);
    Ok(())
}

/// Queue `mkdir -p` for each listed path at `dir`.
pub fn mkdir(world: &World, pkg: &Package, dir: &str, dirs: &[String]) -> BuildsysResult<()> {
    if forced_no_op(world, pkg) {
        return Ok(());
    }
    let d = pkg.builddir();
    let mut pc = PackageCmd::new(d.absolute(dir, false));
    pc.add_arg("mkdir");
    pc.add_arg("-p");
    for path in dirs {
        pc.add_arg(path.clone());
    }
    pc.add_env(pkg_env(pkg));
    pkg.add_command(pc);
    Ok(())
}

/// Queue an in-place `sed` over the listed files at `dir`.
pub fn sed(
    world: &World,
    pkg: &Package,
    dir: &str,
    expression: &str,
    files: &[String],
) -> BuildsysResult<()> {
    if forced_no_op(world, pkg) {
        return Ok(());
    }
    let d = pkg.builddir();
    let mut pc = PackageCmd::new(d.absolute(dir, false));
    pc.add_arg("sed");
    pc.add_arg("-i");
    pc.add_arg("-e");
    pc.add_arg(expression);
    for file in files {
        pc.add_arg(file.clone());
    }
    pc.add_env(pkg_env(pkg));
    pkg.add_command(pc);
    Ok(())
}

fn build_subdir(work_build: &std::path::Path, dir: Option<&str>) -> PathBuf {
    match dir {
        Some(dir) if dir.starts_with('/') => PathBuf::from(dir),
        Some(dir) => work_build.join(dir),
        None => work_build.to_path_buf(),
    }
}
