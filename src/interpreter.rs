use crate::command::{CommandFactory, Status};
use crate::env::Environment;
use crate::error::ShellError;
use crate::external::{self, Launched};
use crate::input::{LineSource, ReadOutcome};
use crate::jobs::{DEFAULT_CAPACITY, JobTable};
use crate::lexer;
use crate::mode::ModeController;
use crate::parser::{self, ParsedCommand};
use std::io::{self, Write};
use tracing::debug;

/// Factory allows creating instances of ExecutableCommand.
///
/// Only supports the builtins defined in this crate; anything else goes to
/// the process launcher.
pub(crate) struct Factory<T> {
    _phantom: std::marker::PhantomData<T>,
}

impl<T> Default for Factory<T> {
    fn default() -> Self {
        Self {
            _phantom: std::marker::PhantomData,
        }
    }
}

/// What the loop should do after a line has been handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Exit,
}

/// The interactive command interpreter.
///
/// Holds the [`Environment`], the background [`JobTable`], the
/// foreground-only [`ModeController`] and the builtin factories. Each call
/// to [`execute_line`](Interpreter::execute_line) is one cycle of the shell:
/// expand, parse, dispatch, then report finished background jobs.
///
/// Example
/// ```no_run
/// use minish::Interpreter;
/// let mut sh = Interpreter::default();
/// sh.execute_line("echo hello $$", &mut std::io::stdout()).unwrap();
/// assert!(sh.last_status().success());
/// ```
pub struct Interpreter {
    env: Environment,
    jobs: JobTable,
    mode: ModeController,
    builtins: Vec<Box<dyn CommandFactory>>,
}

impl Interpreter {
    /// Create an interpreter that tracks up to `max_jobs` background jobs.
    pub fn new(max_jobs: usize) -> Self {
        Self::with_mode(max_jobs, ModeController::new())
    }

    /// Like [`new`](Self::new) with an explicit mode controller.
    pub fn with_mode(max_jobs: usize, mode: ModeController) -> Self {
        use crate::builtin::*;
        Self {
            env: Environment::new(),
            jobs: JobTable::with_capacity(max_jobs),
            mode,
            builtins: vec![
                Box::new(Factory::<Exit>::default()),
                Box::new(Factory::<Cd>::default()),
                Box::new(Factory::<ShowStatus>::default()),
            ],
        }
    }

    pub fn environment(&self) -> &Environment {
        &self.env
    }

    pub fn environment_mut(&mut self) -> &mut Environment {
        &mut self.env
    }

    pub fn jobs(&self) -> &JobTable {
        &self.jobs
    }

    /// How the most recent foreground command finished.
    pub fn last_status(&self) -> Status {
        self.env.last_status
    }

    pub fn is_foreground_only(&self) -> bool {
        self.mode.is_foreground_only()
    }

    /// Prints a notice for every mode toggle received since the last call.
    pub fn announce_mode_changes(&mut self, out: &mut dyn Write) -> io::Result<()> {
        self.mode.observe(out).map(|_| ())
    }

    /// Runs the prompt loop until `exit` or end of input.
    ///
    /// Background jobs still running at that point are killed, also when the
    /// loop ends with an error. Returns an error only for failures the shell
    /// cannot continue after.
    pub fn run(&mut self, input: &mut dyn LineSource, prompt: &str) -> Result<(), ShellError> {
        let result = self.prompt_loop(input, prompt);
        self.shutdown();
        result
    }

    fn prompt_loop(&mut self, input: &mut dyn LineSource, prompt: &str) -> Result<(), ShellError> {
        let mut stdout = io::stdout();
        loop {
            self.announce_mode_changes(&mut stdout)?;

            let outcome = if self.mode.has_pending() {
                ReadOutcome::Interrupted
            } else {
                input.read_line(prompt)?
            };

            let line = match outcome {
                ReadOutcome::Line(line) => line,
                ReadOutcome::Interrupted => continue,
                ReadOutcome::Eof => {
                    debug!("end of input");
                    return Ok(());
                }
            };

            match self.execute_line(&line, &mut stdout) {
                Ok(Flow::Continue) => {}
                Ok(Flow::Exit) => return Ok(()),
                Err(err) if err.is_fatal() => return Err(err),
                Err(err) => eprintln!("{err}"),
            }
        }
    }

    /// Runs one line: expansion, parsing, builtin or external dispatch, then
    /// a non-blocking poll of background jobs.
    ///
    /// Blank lines and comments return immediately without touching the job
    /// table or the status.
    pub fn execute_line(&mut self, line: &str, out: &mut dyn Write) -> Result<Flow, ShellError> {
        let expanded = lexer::expand_pid(line, self.env.pid);
        let tokens = lexer::split_into_tokens(&expanded);
        // A toggle that landed while the line was being read applies to it.
        self.mode.observe(out)?;
        let Some(command) = parser::construct_command(&tokens, self.mode.is_foreground_only())
        else {
            return Ok(Flow::Continue);
        };
        debug!(?command, "parsed");

        let dispatched = self.dispatch(&command, out);
        self.report_finished_jobs(out)?;
        dispatched?;

        if self.env.should_exit {
            return Ok(Flow::Exit);
        }
        Ok(Flow::Continue)
    }

    fn dispatch(&mut self, command: &ParsedCommand, out: &mut dyn Write) -> Result<(), ShellError> {
        let args: Vec<&str> = command.argv[1..].iter().map(String::as_str).collect();
        for factory in &self.builtins {
            if let Some(builtin) = factory.try_create(&command.name, &args) {
                builtin
                    .execute(out, &mut io::stderr(), &mut self.env)
                    .map_err(|err| io::Error::other(format!("{err:#}")))?;
                return Ok(());
            }
        }

        if command.background && self.jobs.is_full() {
            return Err(ShellError::JobTableFull {
                capacity: self.jobs.capacity(),
            });
        }

        match external::launch(command)? {
            Launched::Foreground(status) => self.env.last_status = status,
            Launched::Background(pid) => {
                self.jobs.insert(pid)?;
                writeln!(out, "background pid is {pid}")?;
                out.flush()?;
            }
        }
        Ok(())
    }

    fn report_finished_jobs(&mut self, out: &mut dyn Write) -> io::Result<()> {
        let finished = self.jobs.poll();
        for report in &finished {
            writeln!(out, "{report}")?;
        }
        if !finished.is_empty() {
            out.flush()?;
        }
        Ok(())
    }

    /// Kills every tracked background job without waiting for it.
    pub fn shutdown(&mut self) {
        if !self.jobs.is_empty() {
            debug!(jobs = self.jobs.len(), "terminating background jobs");
        }
        self.jobs.terminate_all();
    }
}

impl Default for Interpreter {
    /// An interpreter with the default job limit following the process-wide
    /// SIGTSTP toggle.
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
