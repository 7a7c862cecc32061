//! Launching programs that are not builtins.
//!
//! The child applies its own redirections between `fork` and `exec`, so a
//! bad redirect or a missing program only ever costs the child: it reports
//! on stderr and exits with status 1, which the parent sees as an ordinary
//! wait status.

use crate::command::Status;
use crate::error::ShellError;
use crate::mode;
use crate::parser::ParsedCommand;
use nix::errno::Errno;
use nix::libc::{STDERR_FILENO, STDIN_FILENO, STDOUT_FILENO};
use nix::sys::wait::waitpid;
use nix::unistd::{self, ForkResult, Pid};
use std::ffi::{CString, NulError};
use std::fmt::Display;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::mem::ManuallyDrop;
use std::os::fd::{AsRawFd, FromRawFd, RawFd};
use std::os::unix::fs::OpenOptionsExt;
use tracing::debug;

/// Exit code of a child whose setup or `exec` failed.
const CHILD_FAILURE: i32 = 1;

/// Permissions of files created by `>` (before the umask).
const OUTPUT_MODE: u32 = 0o644;

/// What the parent got back from [`launch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Launched {
    /// The foreground child finished.
    Foreground(Status),
    /// The child runs in the background and has not been waited for.
    Background(Pid),
}

/// Command that is not a builtin, prepared for `execvp`.
struct ExternalCommand<'a> {
    argv: Result<Vec<CString>, NulError>,
    input: Option<&'a str>,
    output: Option<&'a str>,
}

impl<'a> ExternalCommand<'a> {
    fn new(cmd: &'a ParsedCommand) -> Self {
        let argv = cmd
            .argv
            .iter()
            .map(|arg| CString::new(arg.as_bytes()))
            .collect();
        ExternalCommand {
            argv,
            input: cmd.input.as_deref(),
            output: cmd.output.as_deref(),
        }
    }

    /// Runs in the forked child; never returns.
    fn exec(self) -> ! {
        if let Err(err) = mode::reset_for_child() {
            child_fail("signal setup", err);
        }
        if let Some(path) = self.input {
            let file = File::open(path).unwrap_or_else(|err| child_fail(path, err));
            redirect(file, STDIN_FILENO, path);
        }
        if let Some(path) = self.output {
            let file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .mode(OUTPUT_MODE)
                .open(path)
                .unwrap_or_else(|err| child_fail(path, err));
            redirect(file, STDOUT_FILENO, path);
        }
        let argv = match self.argv {
            Ok(argv) if !argv.is_empty() => argv,
            Ok(_) => child_fail("exec", "empty command"),
            Err(err) => child_fail("exec", err),
        };
        let err = match unistd::execvp(&argv[0], &argv) {
            Ok(never) => match never {},
            Err(err) => err,
        };
        child_fail(&argv[0].to_string_lossy(), err)
    }
}

/// Makes `target` refer to `file`. The original descriptor is closed when
/// `file` is dropped.
fn redirect(file: File, target: RawFd, path: &str) {
    if let Err(err) = unistd::dup2(file.as_raw_fd(), target) {
        child_fail(path, err);
    }
}

/// Reports a setup failure from inside the child and exits without running
/// any of the parent's cleanup.
fn child_fail(what: &str, err: impl Display) -> ! {
    // Unlocked write to fd 2; std's stderr lock may be held by a thread that no longer exists.
    // SAFETY: fd 2 stays open for the life of the process and is never closed here.
    let mut stderr = ManuallyDrop::new(unsafe { File::from_raw_fd(STDERR_FILENO) });
    let _ = writeln!(stderr, "{what}: {err}");
    // SAFETY: `_exit` skips atexit handlers and stdio flushing, neither of
    // which may run in a forked child of a possibly multithreaded parent.
    unsafe { nix::libc::_exit(CHILD_FAILURE) }
}

/// Forks and runs `cmd` as an external program.
///
/// Foreground commands are waited for; background commands return at once
/// with the child's pid. Only a failed `fork` is an error.
pub fn launch(cmd: &ParsedCommand) -> Result<Launched, ShellError> {
    let prepared = ExternalCommand::new(cmd);
    io::stdout().flush()?;

    // SAFETY: the child only opens files, duplicates descriptors, writes to
    // fd 2 and then execs or exits.
    match unsafe { unistd::fork() }.map_err(ShellError::Fork)? {
        ForkResult::Child => prepared.exec(),
        ForkResult::Parent { child } => {
            debug!(pid = %child, argv = ?cmd.argv, background = cmd.background, "spawned");
            if cmd.background {
                Ok(Launched::Background(child))
            } else {
                wait_foreground(child).map(Launched::Foreground)
            }
        }
    }
}

/// Blocks until `pid` exits or is killed.
pub fn wait_foreground(pid: Pid) -> Result<Status, ShellError> {
    loop {
        match waitpid(pid, None) {
            Ok(status) => {
                if let Some(done) = Status::from_wait(status) {
                    debug!(%pid, status = %done, "foreground child finished");
                    return Ok(done);
                }
            }
            Err(Errno::EINTR) => continue,
            Err(source) => {
                return Err(ShellError::Wait {
                    pid: pid.as_raw(),
                    source,
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::try_reap;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use std::thread;
    use std::time::{Duration, Instant};

    fn command(argv: &[&str]) -> ParsedCommand {
        ParsedCommand {
            name: argv[0].to_string(),
            argv: argv.iter().map(|s| s.to_string()).collect(),
            input: None,
            output: None,
            background: false,
        }
    }

    fn foreground_status(cmd: &ParsedCommand) -> Status {
        match launch(cmd).unwrap() {
            Launched::Foreground(status) => status,
            other => panic!("expected a foreground result, got {other:?}"),
        }
    }

    #[test]
    fn foreground_keeps_exact_exit_code() {
        assert_eq!(foreground_status(&command(&["true"])), Status::Exited(0));
        assert_eq!(
            foreground_status(&command(&["sh", "-c", "exit 7"])),
            Status::Exited(7)
        );
    }

    #[test]
    fn foreground_reports_signal_termination() {
        let status = foreground_status(&command(&["sh", "-c", "kill -TERM $$"]));
        assert_eq!(status, Status::Signaled(15));
    }

    #[test]
    fn missing_program_exits_child_with_one() {
        let status = foreground_status(&command(&["minish-no-such-program-xyz"]));
        assert_eq!(status, Status::Exited(1));
    }

    #[test]
    fn missing_input_file_never_runs_the_program() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("ran");
        let script = format!("touch {}", marker.display());

        let mut cmd = command(&["sh", "-c", &script]);
        cmd.input = Some(dir.path().join("absent").to_string_lossy().to_string());

        assert_eq!(foreground_status(&cmd), Status::Exited(1));
        assert!(!marker.exists());
    }

    #[test]
    fn redirects_input_and_output() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.txt");
        let output = dir.path().join("out.txt");
        fs::write(&input, "banana\napple\n").unwrap();
        fs::write(&output, "stale contents that must be truncated\n").unwrap();

        let mut cmd = command(&["sort"]);
        cmd.input = Some(input.to_string_lossy().to_string());
        cmd.output = Some(output.to_string_lossy().to_string());

        assert_eq!(foreground_status(&cmd), Status::Exited(0));
        assert_eq!(fs::read_to_string(&output).unwrap(), "apple\nbanana\n");
    }

    #[test]
    fn output_file_is_created_without_exec_bits() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("created.txt");

        let mut cmd = command(&["echo", "hi"]);
        cmd.output = Some(output.to_string_lossy().to_string());

        assert_eq!(foreground_status(&cmd), Status::Exited(0));
        assert_eq!(fs::read_to_string(&output).unwrap(), "hi\n");
        let mode = fs::metadata(&output).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode & 0o111, 0);
        assert_eq!(mode & 0o600, 0o600);
    }

    #[test]
    fn background_returns_immediately() {
        let mut cmd = command(&["sh", "-c", "exit 4"]);
        cmd.background = true;

        let pid = match launch(&cmd).unwrap() {
            Launched::Background(pid) => pid,
            other => panic!("expected a background result, got {other:?}"),
        };

        let deadline = Instant::now() + Duration::from_secs(10);
        let status = loop {
            if let Some(status) = try_reap(pid).unwrap() {
                break status;
            }
            assert!(Instant::now() < deadline, "background child never finished");
            thread::sleep(Duration::from_millis(20));
        };
        assert_eq!(status, Status::Exited(4));
    }
}
