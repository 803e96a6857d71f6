use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::core::Package;
use crate::util::InternedString;

/// A named container of packages. Packages are created here and never move
/// between namespaces; lookup is linear since the expected cardinality is
/// small.
pub struct NameSpace {
    name: InternedString,
    pwd: PathBuf,
    packages: Mutex<Vec<Arc<Package>>>,
}

impl NameSpace {
    pub(crate) fn new(name: &str, pwd: &Path) -> NameSpace {
        NameSpace {
            name: InternedString::new(name),
            pwd: pwd.to_path_buf(),
            packages: Mutex::new(Vec::new()),
        }
    }

    pub fn name(&self) -> InternedString {
        self.name
    }

    /// Return the package called `name`, creating it against `file` when
    /// it does not exist yet. The whole list is scanned before creating.
    pub fn find_package(&self, name: &str, file: &Path) -> Arc<Package> {
        let mut packages = self.packages.lock().unwrap();
        if let Some(pkg) = packages.iter().find(|p| p.name().as_str() == name) {
            return pkg.clone();
        }
        let pkg = Arc::new(Package::new(self.name, name, file, &self.pwd));
        packages.push(pkg.clone());
        pkg
    }

    /// Snapshot of the packages in insertion order.
    pub fn packages(&self) -> Vec<Arc<Package>> {
        self.packages.lock().unwrap().clone()
    }
}
