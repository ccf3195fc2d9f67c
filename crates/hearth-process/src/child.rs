//! Child process spawning and termination

use std::io;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};

use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

/// Fully resolved command line for one run
#[derive(Debug, Clone)]
pub(crate) struct LaunchSpec {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub working_dir: PathBuf,
}

impl LaunchSpec {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>, working_dir: &Path) -> Self {
        Self {
            program: program.into(),
            args,
            working_dir: working_dir.to_path_buf(),
        }
    }
}

/// Spawn with all three stdio streams piped
///
/// On unix the child leads its own process group so a kill reaches any
/// helpers it forks, which would otherwise hold the output pipe open.
pub(crate) fn spawn(spec: &LaunchSpec) -> io::Result<Child> {
    debug!(
        program = %spec.program.display(),
        args = ?spec.args,
        dir = %spec.working_dir.display(),
        "Spawning process"
    );

    let mut cmd = Command::new(&spec.program);
    cmd.args(&spec.args)
        .current_dir(&spec.working_dir)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    #[cfg(unix)]
    cmd.process_group(0);

    let child = cmd.spawn()?;
    let pid = child
        .id()
        .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "Failed to get process ID"))?;

    info!(pid = %pid, program = %spec.program.display(), "Process spawned");
    Ok(child)
}

/// Forcefully terminate the child and everything in its process group
pub(crate) fn terminate(child: &mut Child, pid: u32) -> io::Result<()> {
    #[cfg(unix)]
    {
        use nix::sys::signal::{killpg, Signal};
        use nix::unistd::Pid;

        match killpg(Pid::from_raw(pid as i32), Signal::SIGKILL) {
            Ok(()) => {
                debug!(pid = %pid, "Sent SIGKILL to process group");
                return Ok(());
            }
            Err(e) => {
                warn!(pid = %pid, error = %e, "Failed to signal process group, killing process only");
            }
        }
    }

    #[cfg(not(unix))]
    debug!(pid = %pid, "Killing process");

    child.start_kill()
}

/// Exit code of a finished process
///
/// A process ended by a signal reports the negated signal number, so a
/// forced kill reads as `-9`.
pub(crate) fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return -signal;
        }
    }

    -1
}
