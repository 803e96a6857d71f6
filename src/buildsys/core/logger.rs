use std::fmt;
use std::io::{self, Write};

/// Sink for user-facing build output. Each package owns one whose prefix is
/// its `namespace,name` pair; subprocess output is forwarded line by line
/// through the same sink so interleaved parallel builds stay attributable.
#[derive(Clone)]
pub struct Logger {
    prefix: Option<String>,
}

impl Logger {
    pub fn new(prefix: impl Into<String>) -> Logger {
        Logger {
            prefix: Some(prefix.into()),
        }
    }

    /// A logger that emits lines verbatim (the `--nop` behaviour).
    pub fn unprefixed() -> Logger {
        Logger { prefix: None }
    }

    pub fn log(&self, msg: impl fmt::Display) {
        let stderr = io::stderr();
        let mut out = stderr.lock();
        let _ = match &self.prefix {
            Some(p) => writeln!(out, "{}: {}", p, msg),
            None => writeln!(out, "{}", msg),
        };
    }

    /// Forward one line of subprocess output.
    pub fn forward(&self, line: &str) {
        self.log(line);
    }
}
