use std::io;

/// Errors surfaced by the interpreter core.
///
/// [`ShellError::Fork`], [`ShellError::Signal`] and [`ShellError::Io`] end the
/// session. The interpreter reports the rest and keeps prompting.
#[derive(Debug, thiserror::Error)]
pub enum ShellError {
    /// `fork(2)` failed, no child exists.
    #[error("fork failed: {0}")]
    Fork(#[source] nix::Error),

    /// Waiting on a foreground child failed for a reason other than EINTR.
    #[error("waiting for pid {pid} failed: {source}")]
    Wait {
        pid: i32,
        #[source]
        source: nix::Error,
    },

    /// Every background slot is occupied.
    #[error("too many background jobs (limit is {capacity})")]
    JobTableFull { capacity: usize },

    /// Installing or masking the suspend signal failed.
    #[error("signal setup failed: {0}")]
    Signal(#[source] nix::Error),

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl ShellError {
    /// Whether the session must end after this error.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ShellError::Fork(_) | ShellError::Io(_) | ShellError::Signal(_))
    }
}
