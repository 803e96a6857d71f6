pub use self::build_dir::BuildDir;
pub use self::command::PackageCmd;
pub use self::extraction::{ExtractionQueue, ExtractionUnit};
pub use self::graph::{DependencyGraph, TopoGraph};
pub use self::logger::Logger;
pub use self::manifest::Manifest;
pub use self::namespace::NameSpace;
pub use self::package::{Package, PackageDepend};
pub use self::package_queue::PackageQueue;
pub use self::world::World;

pub mod build_dir;
pub mod command;
pub mod extraction;
pub mod graph;
pub mod logger;
pub mod manifest;
pub mod namespace;
pub mod package;
pub mod package_queue;
pub mod world;
