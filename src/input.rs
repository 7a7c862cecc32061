//! Sources of command lines.
//!
//! [`PlainLines`] reads raw chunks from any reader and is what the shell uses
//! when stdin is not a terminal. When it watches a descriptor it waits for
//! input through [`mode::wait_readable`], the only place the toggle signal
//! can interrupt it. [`EditorLines`] wraps `rustyline` for
//! interactive sessions. Both surface an interrupted read as
//! [`ReadOutcome::Interrupted`] instead of retrying, so the interpreter can
//! react to a mode toggle before prompting again.

use crate::mode;
use nix::libc::{EINTR, STDIN_FILENO};
use nix::unistd;
use rustyline::error::ReadlineError;
use rustyline::{
    Cmd, ConditionalEventHandler, DefaultEditor, Event, EventContext, EventHandler, KeyEvent,
    RepeatCount,
};
use std::io::{self, ErrorKind, Read, Write};
use std::os::fd::BorrowedFd;

const READ_CHUNK: usize = 2048;

/// Result of asking a [`LineSource`] for the next line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    /// A complete line without its trailing newline.
    Line(String),
    /// The read was cut short by a signal; prompt again.
    Interrupted,
    /// No more input.
    Eof,
}

pub trait LineSource {
    /// Shows `prompt` and reads one line.
    fn read_line(&mut self, prompt: &str) -> io::Result<ReadOutcome>;
}

/// Line reader over plain byte streams.
pub struct PlainLines<R, W> {
    reader: R,
    prompt_out: W,
    pending: Vec<u8>,
    eof: bool,
    watch: Option<BorrowedFd<'static>>,
}

impl<R: Read, W: Write> PlainLines<R, W> {
    pub fn new(reader: R, prompt_out: W) -> Self {
        PlainLines {
            reader,
            prompt_out,
            pending: Vec::new(),
            eof: false,
            watch: None,
        }
    }

    /// Waits for `fd` to become readable before every read, so a pending
    /// toggle interrupts the wait instead of a blocked `read`. `fd` must be
    /// the descriptor `reader` reads from, without buffering in between.
    pub fn watching(mut self, fd: BorrowedFd<'static>) -> Self {
        self.watch = Some(fd);
        self
    }

    fn take_line(&mut self) -> Option<String> {
        let end = self.pending.iter().position(|&b| b == b'\n')?;
        let line: Vec<u8> = self.pending.drain(..=end).collect();
        Some(String::from_utf8_lossy(&line[..end]).into_owned())
    }
}

/// Unbuffered reads from fd 0.
pub struct RawStdin;

impl Read for RawStdin {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        unistd::read(STDIN_FILENO, buf).map_err(io::Error::from)
    }
}

impl PlainLines<RawStdin, io::Stdout> {
    /// Reads from the process's stdin and prompts on its stdout.
    pub fn stdio() -> Self {
        // SAFETY: fd 0 is never closed by the shell.
        let stdin = unsafe { BorrowedFd::borrow_raw(STDIN_FILENO) };
        Self::new(RawStdin, io::stdout()).watching(stdin)
    }
}

impl<R: Read, W: Write> LineSource for PlainLines<R, W> {
    fn read_line(&mut self, prompt: &str) -> io::Result<ReadOutcome> {
        self.prompt_out.write_all(prompt.as_bytes())?;
        self.prompt_out.flush()?;

        let mut chunk = [0u8; READ_CHUNK];
        loop {
            if let Some(line) = self.take_line() {
                return Ok(ReadOutcome::Line(line));
            }
            if self.eof {
                if self.pending.is_empty() {
                    return Ok(ReadOutcome::Eof);
                }
                let rest = std::mem::take(&mut self.pending);
                return Ok(ReadOutcome::Line(String::from_utf8_lossy(&rest).into_owned()));
            }
            if let Some(fd) = self.watch {
                if !mode::wait_readable(fd).map_err(io::Error::from)? {
                    return Ok(ReadOutcome::Interrupted);
                }
            }
            match self.reader.read(&mut chunk) {
                Ok(0) => self.eof = true,
                Ok(n) => self.pending.extend_from_slice(&chunk[..n]),
                Err(err) if err.kind() == ErrorKind::Interrupted => {
                    return Ok(ReadOutcome::Interrupted);
                }
                Err(err) => return Err(err),
            }
        }
    }
}

/// Ctrl-Z in the editor: raw mode keeps the terminal from sending SIGTSTP,
/// so the key records the toggle itself and abandons the current line.
struct SuspendKey;

impl ConditionalEventHandler for SuspendKey {
    fn handle(
        &self,
        _evt: &Event,
        _n: RepeatCount,
        _positive: bool,
        _ctx: &EventContext,
    ) -> Option<Cmd> {
        mode::request_toggle();
        Some(Cmd::Interrupt)
    }
}

/// Interactive line editor. Entries are not added to history.
pub struct EditorLines {
    editor: DefaultEditor,
}

impl EditorLines {
    pub fn new() -> rustyline::Result<Self> {
        let mut editor = DefaultEditor::new()?;
        editor.bind_sequence(
            KeyEvent::ctrl('Z'),
            EventHandler::Conditional(Box::new(SuspendKey)),
        );
        Ok(EditorLines { editor })
    }
}

impl LineSource for EditorLines {
    fn read_line(&mut self, prompt: &str) -> io::Result<ReadOutcome> {
        let _window = mode::SuspendWindow::open().map_err(io::Error::from)?;
        match self.editor.readline(prompt) {
            Ok(line) => Ok(ReadOutcome::Line(line)),
            // Ctrl-C and Ctrl-Z both land here.
            Err(ReadlineError::Interrupted) => Ok(ReadOutcome::Interrupted),
            Err(ReadlineError::Eof) => Ok(ReadOutcome::Eof),
            Err(ReadlineError::Io(err)) if err.kind() == ErrorKind::Interrupted => {
                Ok(ReadOutcome::Interrupted)
            }
            Err(ReadlineError::Io(err)) => Err(err),
            Err(ReadlineError::Errno(errno)) if errno as i32 == EINTR => {
                Ok(ReadOutcome::Interrupted)
            }
            Err(err) => Err(io::Error::other(err.to_string())),
        }
    }
}
