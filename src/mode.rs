//! Foreground-only mode, toggled by SIGTSTP.
//!
//! The signal handler does nothing but bump a counter. The interpreter loop
//! compares that counter with what it has already seen, flips the mode once
//! per unseen toggle and prints the notices itself. SIGTSTP stays blocked
//! except while the shell waits for input, so forking and waiting are never
//! interrupted. [`wait_readable`] unblocks it atomically with the wait itself,
//! so a toggle sent just after the prompt still cuts the wait short.

use crate::error::ShellError;
use nix::errno::Errno;
use nix::libc::c_int;
use nix::poll::{self, PollFd, PollFlags};
use nix::sys::signal::{self, SaFlags, SigAction, SigHandler, SigSet, Signal};
use std::io::{self, Write};
use std::os::fd::BorrowedFd;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, warn};

/// The signal that toggles foreground-only mode.
pub const SUSPEND_SIGNAL: Signal = Signal::SIGTSTP;

static TOGGLES: AtomicUsize = AtomicUsize::new(0);

extern "C" fn handle_suspend(_signo: c_int) {
    TOGGLES.fetch_add(1, Ordering::SeqCst);
}

/// Records a toggle from outside the signal handler, e.g. a key binding
/// in the line editor.
pub fn request_toggle() {
    TOGGLES.fetch_add(1, Ordering::SeqCst);
}

fn suspend_set() -> SigSet {
    let mut set = SigSet::empty();
    set.add(SUSPEND_SIGNAL);
    set
}

/// Installs the toggle handler and blocks the signal for the process.
///
/// The handler is installed without `SA_RESTART` so a blocking read returns
/// `EINTR` and the loop gets a chance to announce the change.
pub fn install() -> Result<(), ShellError> {
    let action = SigAction::new(
        SigHandler::Handler(handle_suspend),
        SaFlags::empty(),
        SigSet::empty(),
    );
    // SAFETY: the handler only performs an atomic increment.
    unsafe { signal::sigaction(SUSPEND_SIGNAL, &action) }.map_err(ShellError::Signal)?;
    suspend_set().thread_block().map_err(ShellError::Signal)
}

/// Restores a freshly forked child: the toggle signal is ignored there and
/// no longer masked. The ignored disposition survives `exec`.
pub fn reset_for_child() -> nix::Result<()> {
    // SAFETY: installing SIG_IGN does not run any code in signal context.
    unsafe { signal::signal(SUSPEND_SIGNAL, SigHandler::SigIgn) }?;
    suspend_set().thread_unblock()
}

/// Blocks until `fd` is readable, with the toggle signal unblocked only for
/// the duration of the wait.
///
/// Returns `Ok(false)` when a signal cut the wait short. Hang-ups count as
/// readable so that end of input is seen by the following `read`.
pub fn wait_readable(fd: BorrowedFd<'_>) -> nix::Result<bool> {
    let mut during = SigSet::thread_get_mask()?;
    during.remove(SUSPEND_SIGNAL);
    let mut fds = [PollFd::new(fd, PollFlags::POLLIN)];
    match poll::ppoll(&mut fds, None, Some(during)) {
        Ok(_) => Ok(true),
        Err(Errno::EINTR) => Ok(false),
        Err(err) => Err(err),
    }
}

/// Unblocks the toggle signal for as long as it is alive. Used around line
/// readers that cannot wait through [`wait_readable`].
#[must_use = "the signal is blocked again as soon as the window is dropped"]
pub struct SuspendWindow {
    _private: (),
}

impl SuspendWindow {
    pub fn open() -> nix::Result<Self> {
        suspend_set().thread_unblock()?;
        Ok(SuspendWindow { _private: () })
    }
}

impl Drop for SuspendWindow {
    fn drop(&mut self) {
        if let Err(err) = suspend_set().thread_block() {
            warn!(%err, "failed to re-block SIGTSTP");
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    BackgroundEnabled,
    ForegroundOnly,
}

impl Mode {
    fn toggled(self) -> Mode {
        match self {
            Mode::BackgroundEnabled => Mode::ForegroundOnly,
            Mode::ForegroundOnly => Mode::BackgroundEnabled,
        }
    }

    /// Text printed when the shell enters this mode.
    pub fn notice(self) -> &'static str {
        match self {
            Mode::ForegroundOnly => "\nEntering foreground-only mode (& is now ignored)\n",
            Mode::BackgroundEnabled => "\nExiting foreground-only mode\n",
        }
    }
}

/// Main-loop side of the mode toggle.
#[derive(Debug)]
pub struct ModeController {
    source: &'static AtomicUsize,
    seen: usize,
    mode: Mode,
}

impl ModeController {
    /// Follows the process-wide counter driven by [`SUSPEND_SIGNAL`].
    pub fn new() -> Self {
        Self::with_source(&TOGGLES)
    }

    /// Follows an arbitrary counter. Toggles recorded before this call are
    /// not replayed; the controller starts in [`Mode::BackgroundEnabled`].
    pub fn with_source(source: &'static AtomicUsize) -> Self {
        ModeController {
            source,
            seen: source.load(Ordering::SeqCst),
            mode: Mode::BackgroundEnabled,
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn is_foreground_only(&self) -> bool {
        self.mode == Mode::ForegroundOnly
    }

    /// Whether a toggle arrived that [`observe`](Self::observe) has not handled yet.
    pub fn has_pending(&self) -> bool {
        self.source.load(Ordering::SeqCst) != self.seen
    }

    /// Applies every unseen toggle, writing one notice per toggle, and
    /// returns the resulting mode.
    pub fn observe(&mut self, out: &mut dyn Write) -> io::Result<Mode> {
        let current = self.source.load(Ordering::SeqCst);
        if current == self.seen {
            return Ok(self.mode);
        }
        while self.seen != current {
            self.seen = self.seen.wrapping_add(1);
            self.mode = self.mode.toggled();
            debug!(mode = ?self.mode, "mode toggled");
            out.write_all(self.mode.notice().as_bytes())?;
        }
        out.flush()?;
        Ok(self.mode)
    }
}

impl Default for ModeController {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::os::fd::AsFd;

    fn bump(counter: &AtomicUsize) {
        counter.fetch_add(1, Ordering::SeqCst);
    }

    #[test]
    fn starts_with_background_enabled() {
        static COUNTER: AtomicUsize = AtomicUsize::new(7);
        let controller = ModeController::with_source(&COUNTER);
        assert_eq!(controller.mode(), Mode::BackgroundEnabled);
        assert!(!controller.has_pending());
    }

    #[test]
    fn one_toggle_enters_foreground_only() {
        static COUNTER: AtomicUsize = AtomicUsize::new(0);
        let mut controller = ModeController::with_source(&COUNTER);

        bump(&COUNTER);
        assert!(controller.has_pending());

        let mut out = Vec::new();
        assert_eq!(controller.observe(&mut out).unwrap(), Mode::ForegroundOnly);
        assert!(controller.is_foreground_only());
        assert!(!controller.has_pending());
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "\nEntering foreground-only mode (& is now ignored)\n"
        );
    }

    #[test]
    fn two_toggles_restore_the_original_mode() {
        static COUNTER: AtomicUsize = AtomicUsize::new(0);
        let mut controller = ModeController::with_source(&COUNTER);

        bump(&COUNTER);
        bump(&COUNTER);

        let mut out = Vec::new();
        assert_eq!(controller.observe(&mut out).unwrap(), Mode::BackgroundEnabled);
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "\nEntering foreground-only mode (& is now ignored)\n\nExiting foreground-only mode\n"
        );
    }

    #[test]
    fn wait_readable_returns_once_data_is_buffered() {
        let (read_end, write_end) = nix::unistd::pipe().unwrap();
        let mut writer = std::fs::File::from(write_end);
        writer.write_all(b"ls\n").unwrap();

        assert!(wait_readable(read_end.as_fd()).unwrap());
    }

    #[test]
    fn wait_readable_treats_hang_up_as_ready() {
        let (read_end, write_end) = nix::unistd::pipe().unwrap();
        drop(write_end);

        assert!(wait_readable(read_end.as_fd()).unwrap());
    }

    #[test]
    fn observe_without_toggles_prints_nothing() {
        static COUNTER: AtomicUsize = AtomicUsize::new(0);
        let mut controller = ModeController::with_source(&COUNTER);
        let mut out = Vec::new();
        assert_eq!(controller.observe(&mut out).unwrap(), Mode::BackgroundEnabled);
        assert!(out.is_empty());
    }
}
