use crate::env::Environment;
use anyhow::Result;
use nix::sys::wait::WaitStatus;
use std::fmt;
use std::io::Write;

/// Conventional process exit code type used by this crate.
///
/// A value of 0 indicates success; any non-zero value indicates failure.
pub type ExitCode = i32;

/// How a child process finished.
///
/// Keeps the exact exit code or signal number instead of folding every
/// failure into a single integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// Exited normally with the given code.
    Exited(ExitCode),
    /// Killed by the given signal number.
    Signaled(i32),
}

impl Status {
    /// Decodes a terminal wait status. Stops, continues and "still alive"
    /// are not completions and yield `None`.
    pub fn from_wait(status: WaitStatus) -> Option<Status> {
        match status {
            WaitStatus::Exited(_, code) => Some(Status::Exited(code)),
            WaitStatus::Signaled(_, signal, _) => Some(Status::Signaled(signal as i32)),
            _ => None,
        }
    }

    pub fn success(&self) -> bool {
        matches!(self, Status::Exited(0))
    }
}

impl Default for Status {
    fn default() -> Self {
        Status::Exited(0)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Exited(code) => write!(f, "exit value {code}"),
            Status::Signaled(signal) => write!(f, "terminated by signal {signal}"),
        }
    }
}

/// Object-safe trait for any command the shell runs in-process.
///
/// Built-ins implement this through a blanket impl. Output goes to `stdout`,
/// diagnostics to `stderr`.
pub trait ExecutableCommand {
    /// Executes the command.
    fn execute(
        self: Box<Self>,
        stdout: &mut dyn Write,
        stderr: &mut dyn Write,
        env: &mut Environment,
    ) -> Result<()>;
}

/// Factory that tries to create a command from a name and its arguments.
///
/// Returns `None` when the factory doesn't recognize the `name`; the
/// interpreter then hands the command to the process launcher.
pub trait CommandFactory {
    /// Attempt to create a command instance for the provided name and arguments.
    fn try_create(&self, name: &str, args: &[&str]) -> Option<Box<dyn ExecutableCommand>>;
}
