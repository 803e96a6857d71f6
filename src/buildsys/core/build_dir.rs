use std::path::{Path, PathBuf};

use crate::util::paths::normalize_path;
use crate::util::InternedString;

/// Per-package filesystem layout, derived purely from the process working
/// directory and the package identity. No method here touches the
/// filesystem; directory creation happens at build time.
///
/// Layout under `<pwd>`:
///
/// ```text
/// output/<ns>/<pkg>/            the package root (`path`)
/// output/<ns>/<pkg>/work/<pkg>  unpacked sources (`work_src`)
/// output/<ns>/<pkg>/build       out-of-tree build directory (`work_build`)
/// output/<ns>/<pkg>/staging     install tree consumed by dependents
/// ```
#[derive(Debug, Clone)]
pub struct BuildDir {
    pwd: PathBuf,
    path: PathBuf,
    short_path: PathBuf,
    work_src: PathBuf,
    work_build: PathBuf,
    staging: PathBuf,
}

impl BuildDir {
    pub fn new(pwd: &Path, ns: InternedString, pkg: InternedString) -> BuildDir {
        let short_path = Path::new("output").join(ns.as_str()).join(pkg.as_str());
        let path = pwd.join(&short_path);
        let work_src = path.join("work").join(pkg.as_str());
        let work_build = path.join("build");
        let staging = path.join("staging");
        BuildDir {
            pwd: pwd.to_path_buf(),
            path,
            short_path,
            work_src,
            work_build,
            staging,
        }
    }

    pub fn pwd(&self) -> &Path {
        &self.pwd
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn short_path(&self) -> &Path {
        &self.short_path
    }

    pub fn work_src(&self) -> &Path {
        &self.work_src
    }

    pub fn work_build(&self) -> &Path {
        &self.work_build
    }

    pub fn staging(&self) -> &Path {
        &self.staging
    }

    /// Resolve `rel` to an absolute path. Absolute inputs (and `dl/` inputs
    /// when `allow_dl` is set) pass through verbatim; inputs already phrased
    /// relative to `short_path` are re-anchored at the working directory so
    /// that `absolute` and `relative` compose; everything else is joined
    /// under the package root.
    pub fn absolute(&self, rel: &str, allow_dl: bool) -> PathBuf {
        if rel.starts_with('/') || (allow_dl && rel.starts_with("dl/")) {
            return PathBuf::from(rel);
        }
        if Path::new(rel).starts_with(&self.short_path) {
            return normalize_path(&self.pwd.join(rel));
        }
        normalize_path(&self.path.join(rel))
    }

    /// Resolve `rel` against `short_path`, with the same verbatim rules as
    /// `absolute`. The result is relative to the working directory unless
    /// the input was already absolute.
    pub fn relative(&self, rel: &str, allow_dl: bool) -> PathBuf {
        if rel.starts_with('/') || (allow_dl && rel.starts_with("dl/")) {
            return PathBuf::from(rel);
        }
        normalize_path(&self.short_path.join(rel))
    }

    /// Resolve a fetch `location` to an absolute path. Locations that are
    /// absolute, under `dl/`, or explicitly relative (`.`-prefixed) anchor
    /// at the working directory; anything else names an asset in the
    /// package's `package/<pkg>/` directory.
    pub fn absolute_fetch(&self, location: &str, pkg_name: &str) -> PathBuf {
        if location.starts_with('/') || location.starts_with("dl/") || location.starts_with('.') {
            self.pwd.join(location)
        } else {
            self.pwd.join("package").join(pkg_name).join(location)
        }
    }

    /// The working-directory-relative form of `absolute_fetch`.
    pub fn relative_fetch(&self, location: &str, pkg_name: &str) -> PathBuf {
        if location.starts_with('/') || location.starts_with("dl/") || location.starts_with('.') {
            PathBuf::from(location)
        } else {
            Path::new("package").join(pkg_name).join(location)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builddir() -> BuildDir {
        BuildDir::new(
            Path::new("/tmp/ws"),
            InternedString::new("base"),
            InternedString::new("zlib"),
        )
    }

    #[test]
    fn derives_layout() {
        let d = builddir();
        assert_eq!(d.path(), Path::new("/tmp/ws/output/base/zlib"));
        assert_eq!(d.short_path(), Path::new("output/base/zlib"));
        assert_eq!(d.work_src(), Path::new("/tmp/ws/output/base/zlib/work/zlib"));
        assert_eq!(d.work_build(), Path::new("/tmp/ws/output/base/zlib/build"));
        assert_eq!(d.staging(), Path::new("/tmp/ws/output/base/zlib/staging"));
    }

    #[test]
    fn absolute_passes_through_rooted_paths() {
        let d = builddir();
        assert_eq!(d.absolute("/etc/hosts", false), Path::new("/etc/hosts"));
        assert_eq!(d.absolute("dl/z.tar.gz", true), Path::new("dl/z.tar.gz"));
        assert_eq!(
            d.absolute("dl/z.tar.gz", false),
            Path::new("/tmp/ws/output/base/zlib/dl/z.tar.gz")
        );
    }

    #[test]
    fn absolute_of_relative_composes() {
        let d = builddir();
        for rel in ["src", "a/b/c", "build/sub"] {
            let via_relative = d.relative(rel, false);
            assert_eq!(
                d.absolute(via_relative.to_str().unwrap(), false),
                d.absolute(rel, false)
            );
        }
    }

    #[test]
    fn fetch_paths_anchor_package_assets() {
        let d = builddir();
        assert_eq!(
            d.absolute_fetch("fix.patch", "zlib"),
            Path::new("/tmp/ws/package/zlib/fix.patch")
        );
        assert_eq!(
            d.absolute_fetch("dl/z.tar.gz", "zlib"),
            Path::new("/tmp/ws/dl/z.tar.gz")
        );
        assert_eq!(
            d.relative_fetch("./local/tree", "zlib"),
            Path::new("./local/tree")
        );
        assert_eq!(
            d.relative_fetch("fix.patch", "zlib"),
            Path::new("package/zlib/fix.patch")
        );
    }
}
