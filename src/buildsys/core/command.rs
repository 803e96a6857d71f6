use std::borrow::Cow;
use std::fmt;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;

use anyhow::Context;
use log::debug;

use crate::core::Logger;
use crate::util::{process_error, BuildsysResult};

/// One queued shell command: a working directory, an argv whose first
/// element is the program, and an environment overlay of `KEY=VALUE`
/// strings applied on top of the parent environment.
#[derive(Debug, Clone)]
pub struct PackageCmd {
    cwd: PathBuf,
    argv: Vec<String>,
    env: Vec<String>,
    skip: bool,
}

impl PackageCmd {
    pub fn new(cwd: impl Into<PathBuf>) -> PackageCmd {
        PackageCmd {
            cwd: cwd.into(),
            argv: Vec::new(),
            env: Vec::new(),
            skip: false,
        }
    }

    pub fn add_arg(&mut self, arg: impl Into<String>) -> &mut PackageCmd {
        self.argv.push(arg.into());
        self
    }

    pub fn add_env(&mut self, kv: impl Into<String>) -> &mut PackageCmd {
        self.env.push(kv.into());
        self
    }

    /// Turn the command into a no-op that trivially succeeds at replay.
    pub fn skip(&mut self) {
        self.skip = true;
    }

    pub fn is_skipped(&self) -> bool {
        self.skip
    }

    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    pub fn argv(&self) -> &[String] {
        &self.argv
    }

    pub fn env(&self) -> &[String] {
        &self.env
    }

    /// Spawn the command and wait for it, forwarding both output streams
    /// through `logger` line by line. A non-zero exit is an error carrying
    /// a `ProcessError` with the exit status.
    pub fn execute(&self, logger: &Logger) -> BuildsysResult<()> {
        if self.skip {
            debug!("skipping `{}`", self);
            return Ok(());
        }
        let program = self
            .argv
            .first()
            .ok_or_else(|| anyhow::format_err!("command with empty argv"))?;
        debug!("running `{}` in `{}`", self, self.cwd.display());

        let mut cmd = Command::new(program);
        cmd.args(&self.argv[1..])
            .current_dir(&self.cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        for kv in &self.env {
            match kv.split_once('=') {
                Some((k, v)) => {
                    cmd.env(k, v);
                }
                None => anyhow::bail!("malformed environment entry `{}` (expected KEY=VALUE)", kv),
            }
        }

        let mut child = cmd
            .spawn()
            .with_context(|| format!("could not execute `{}`", self))?;
        let stdout = child.stdout.take().expect("stdout requested piped");
        let stderr = child.stderr.take().expect("stderr requested piped");

        thread::scope(|s| {
            let err_logger = logger.clone();
            s.spawn(move || {
                for line in BufReader::new(stderr).lines() {
                    match line {
                        Ok(line) => err_logger.forward(&line),
                        Err(_) => break,
                    }
                }
            });
            for line in BufReader::new(stdout).lines() {
                match line {
                    Ok(line) => logger.forward(&line),
                    Err(_) => break,
                }
            }
        });

        let status = child
            .wait()
            .with_context(|| format!("could not wait on `{}`", self))?;
        if !status.success() {
            return Err(process_error(&format!("process didn't exit successfully: `{}`", self), Some(status), None).into());
        }
        Ok(())
    }
}

impl fmt::Display for PackageCmd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for arg in &self.argv {
            if !first {
                write!(f, " ")?;
            }
            first = false;
            write!(f, "{}", shell_escape::escape(Cow::Borrowed(arg)))?;
        }
        Ok(())
    }
}
