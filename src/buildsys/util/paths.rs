use std::fs;
use std::path::{Component, Path, PathBuf};

use anyhow::Context;
use walkdir::WalkDir;

use crate::util::BuildsysResult;

/// Collapse `.` and `..` components without touching the filesystem.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut components = path.components().peekable();
    let mut ret = if let Some(c @ Component::Prefix(..)) = components.peek().cloned() {
        components.next();
        PathBuf::from(c.as_os_str())
    } else {
        PathBuf::new()
    };

    for component in components {
        match component {
            Component::Prefix(..) => unreachable!(),
            Component::RootDir => {
                ret.push(component.as_os_str());
            }
            Component::CurDir => {}
            Component::ParentDir => {
                ret.pop();
            }
            Component::Normal(c) => {
                ret.push(c);
            }
        }
    }
    ret
}

pub fn create_dir_all(p: &Path) -> BuildsysResult<()> {
    fs::create_dir_all(p).with_context(|| format!("failed to create directory `{}`", p.display()))
}

pub fn remove_dir_all(p: &Path) -> BuildsysResult<()> {
    fs::remove_dir_all(p).with_context(|| format!("failed to remove directory `{}`", p.display()))
}

pub fn copy_file(from: &Path, to: &Path) -> BuildsysResult<()> {
    fs::copy(from, to).with_context(|| {
        format!(
            "failed to copy `{}` to `{}`",
            from.display(),
            to.display()
        )
    })?;
    Ok(())
}

/// Recursively copy `from` into `to`, preserving relative layout. Files
/// already present in `to` are overwritten. Symlinks are followed; build
/// staging trees are expected to be plain files and directories.
pub fn copy_tree(from: &Path, to: &Path) -> BuildsysResult<()> {
    for entry in WalkDir::new(from) {
        let entry = entry.with_context(|| format!("failed to walk `{}`", from.display()))?;
        let rel = entry
            .path()
            .strip_prefix(from)
            .expect("walkdir yields children of its root");
        let dest = to.join(rel);
        if entry.file_type().is_dir() {
            create_dir_all(&dest)?;
        } else {
            if let Some(parent) = dest.parent() {
                create_dir_all(parent)?;
            }
            copy_file(entry.path(), &dest)?;
        }
    }
    Ok(())
}

/// The text after the final `/` of `location`, or all of it when there is
/// no `/`. Trailing slashes are stripped first, so `a/b/` yields `b`.
pub fn location_basename(location: &str) -> &str {
    let trimmed = location.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(idx) => &trimmed[idx + 1..],
        None => trimmed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_collapses_dots() {
        assert_eq!(
            normalize_path(Path::new("/a/./b/../c")),
            PathBuf::from("/a/c")
        );
        assert_eq!(normalize_path(Path::new("a/b/./")), PathBuf::from("a/b"));
    }

    #[test]
    fn basename_of_location() {
        assert_eq!(location_basename("a/b/c.tar.gz"), "c.tar.gz");
        assert_eq!(location_basename("plain"), "plain");
        assert_eq!(location_basename("dir/sub/"), "sub");
    }
}
