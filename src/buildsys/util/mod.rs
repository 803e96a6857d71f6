pub use self::errors::{process_error, BuildsysResult, NoFeatureError, ProcessError};
pub use self::interning::InternedString;

pub mod errors;
pub mod interning;
pub mod paths;
