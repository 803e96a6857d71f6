use std::path::{Path, PathBuf};

use anyhow::Context;

use crate::core::{BuildDir, Logger, PackageCmd};
use crate::util::BuildsysResult;

/// One atomic "bring source into place" action queued on a package. Units
/// are value types; scheduling and ordering belong to the queue.
#[derive(Debug, Clone)]
pub enum ExtractionUnit {
    /// Extract a tar archive (any compression `tar` autodetects) into
    /// `work_src`.
    Tar { path: PathBuf },
    /// Extract a zip archive into `work_src`.
    Zip { path: PathBuf },
    /// Apply a patch at the given strip depth inside `target_dir`.
    Patch {
        depth: u32,
        target_dir: PathBuf,
        patch_file: PathBuf,
    },
    /// Copy a single file into `work_src`.
    FileCopy { path: PathBuf },
    /// Link (or copy) a git working tree into `work_src/<dst_subdir>`.
    GitDir {
        src: PathBuf,
        dst_subdir: String,
        link: bool,
    },
}

impl ExtractionUnit {
    /// Replay this unit for the package owning `d`. The underlying tools
    /// run as subprocesses; their idempotence is theirs, not ours.
    pub fn extract(&self, d: &BuildDir, logger: &Logger) -> BuildsysResult<()> {
        let cmd = match self {
            ExtractionUnit::Tar { path } => {
                let mut cmd = PackageCmd::new(d.work_src());
                cmd.add_arg("tar");
                cmd.add_arg("xf");
                cmd.add_arg(anchor(d, path));
                cmd
            }
            ExtractionUnit::Zip { path } => {
                let mut cmd = PackageCmd::new(d.work_src());
                cmd.add_arg("unzip");
                cmd.add_arg("-o");
                cmd.add_arg(anchor(d, path));
                cmd
            }
            ExtractionUnit::Patch {
                depth,
                target_dir,
                patch_file,
            } => {
                let target = if target_dir.is_absolute() {
                    target_dir.clone()
                } else {
                    d.pwd().join(target_dir)
                };
                let mut cmd = PackageCmd::new(target);
                cmd.add_arg("patch");
                cmd.add_arg(format!("-p{}", depth));
                cmd.add_arg("-stN");
                cmd.add_arg("-i");
                cmd.add_arg(anchor(d, patch_file));
                cmd
            }
            ExtractionUnit::FileCopy { path } => {
                let mut cmd = PackageCmd::new(d.work_src());
                cmd.add_arg("cp");
                cmd.add_arg("-dpRuf");
                cmd.add_arg(anchor(d, path));
                cmd.add_arg(".");
                cmd
            }
            ExtractionUnit::GitDir {
                src,
                dst_subdir,
                link,
            } => {
                let mut cmd = PackageCmd::new(d.work_src());
                if *link {
                    cmd.add_arg("ln");
                    cmd.add_arg("-sfn");
                } else {
                    cmd.add_arg("cp");
                    cmd.add_arg("-dpRuf");
                }
                cmd.add_arg(anchor(d, src));
                cmd.add_arg(dst_subdir.clone());
                cmd
            }
        };
        // work_src doubles as the cwd for most units and must exist even
        // when no archive has created it yet
        crate::util::paths::create_dir_all(d.work_src())?;
        cmd.execute(logger)
            .with_context(|| format!("extraction failed for `{}`", self.describe()))
    }

    fn describe(&self) -> String {
        match self {
            ExtractionUnit::Tar { path } => format!("tar {}", path.display()),
            ExtractionUnit::Zip { path } => format!("zip {}", path.display()),
            ExtractionUnit::Patch { patch_file, .. } => format!("patch {}", patch_file.display()),
            ExtractionUnit::FileCopy { path } => format!("copy {}", path.display()),
            ExtractionUnit::GitDir { src, .. } => format!("gitdir {}", src.display()),
        }
    }
}

/// Paths queued at discovery time may be working-directory-relative;
/// commands replay with an unrelated cwd, so re-anchor them.
fn anchor(d: &BuildDir, path: &Path) -> String {
    let abs = if path.is_absolute() {
        path.to_path_buf()
    } else {
        d.pwd().join(path)
    };
    abs.display().to_string()
}

/// Insertion-ordered queue of extraction units attached to one package,
/// replayed strictly sequentially at the extract phase.
#[derive(Debug, Default)]
pub struct ExtractionQueue {
    units: Vec<ExtractionUnit>,
}

impl ExtractionQueue {
    pub fn new() -> ExtractionQueue {
        ExtractionQueue::default()
    }

    pub fn add(&mut self, unit: ExtractionUnit) {
        self.units.push(unit);
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn units(&self) -> &[ExtractionUnit] {
        &self.units
    }

    /// Replay every unit in insertion order, stopping at the first failure.
    pub fn replay(&self, d: &BuildDir, logger: &Logger) -> BuildsysResult<()> {
        for unit in &self.units {
            unit.extract(d, logger)?;
        }
        Ok(())
    }
}
