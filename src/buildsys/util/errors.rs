use std::process::{ExitStatus, Output};
use std::str;

pub type BuildsysResult<T> = anyhow::Result<T>;

/// Error for a subprocess that failed to spawn or exited unsuccessfully.
///
/// The rendered description already embeds the exit status and any captured
/// output; `exit` is kept so callers can distinguish "spawn failed" from
/// "ran and failed".
#[derive(Debug, thiserror::Error)]
#[error("{desc}")]
pub struct ProcessError {
    pub desc: String,
    pub exit: Option<ExitStatus>,
}

/// A feature lookup missed. Consumers that merely derive optional flags
/// (e.g. `make -j`) treat this as "flag absent" rather than an error.
#[derive(Debug, thiserror::Error)]
#[error("no feature `{key}` is set")]
pub struct NoFeatureError {
    pub key: String,
}

// =============================================================================
// Construction helpers

pub fn process_error(
    msg: &str,
    status: Option<ExitStatus>,
    output: Option<&Output>,
) -> ProcessError {
    let exit = match status {
        Some(s) => exit_status_to_string(s),
        None => "never executed".to_string(),
    };
    let mut desc = format!("{} ({})", msg, exit);

    if let Some(out) = output {
        match str::from_utf8(&out.stdout) {
            Ok(s) if !s.trim().is_empty() => {
                desc.push_str("\n--- stdout\n");
                desc.push_str(s);
            }
            Ok(..) | Err(..) => {}
        }
        match str::from_utf8(&out.stderr) {
            Ok(s) if !s.trim().is_empty() => {
                desc.push_str("\n--- stderr\n");
                desc.push_str(s);
            }
            Ok(..) | Err(..) => {}
        }
    }

    ProcessError { desc, exit: status }
}

#[cfg(unix)]
pub fn exit_status_to_string(status: ExitStatus) -> String {
    use std::os::unix::process::ExitStatusExt;

    if let Some(signal) = status.signal() {
        let name = match signal as libc::c_int {
            libc::SIGABRT => ", SIGABRT: process abort signal",
            libc::SIGALRM => ", SIGALRM: alarm clock",
            libc::SIGFPE => ", SIGFPE: erroneous arithmetic operation",
            libc::SIGHUP => ", SIGHUP: hangup",
            libc::SIGILL => ", SIGILL: illegal instruction",
            libc::SIGINT => ", SIGINT: terminal interrupt signal",
            libc::SIGKILL => ", SIGKILL: kill",
            libc::SIGPIPE => ", SIGPIPE: write on a pipe with no one to read",
            libc::SIGQUIT => ", SIGQUIT: terminal quit signal",
            libc::SIGSEGV => ", SIGSEGV: invalid memory reference",
            libc::SIGTERM => ", SIGTERM: termination signal",
            libc::SIGBUS => ", SIGBUS: access to undefined memory",
            libc::SIGSYS => ", SIGSYS: bad system call",
            libc::SIGTRAP => ", SIGTRAP: trace/breakpoint trap",
            _ => "",
        };
        format!("signal: {}{}", signal, name)
    } else {
        status.to_string()
    }
}

#[cfg(windows)]
pub fn exit_status_to_string(status: ExitStatus) -> String {
    status.to_string()
}
