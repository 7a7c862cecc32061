use crate::command::{CommandFactory, ExecutableCommand};
use crate::env::Environment;
use crate::interpreter::Factory;
use anyhow::{Context, Result};
use argh::{EarlyExit, FromArgs};
use std::env;
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use tracing::debug;

/// Built-in commands known to the shell at compile time.
///
/// Builtins are parsed using the [`argh`] crate (`FromArgs`) and executed directly
/// in-process without spawning a child process. They ignore redirections and `&`.
pub(crate) trait BuiltinCommand: Sized + FromArgs {
    /// Canonical name of the command, e.g. "cd" or "status".
    fn name() -> &'static str;

    /// Executes the command using the shell's stdout and environment.
    ///
    /// An error is reported on stderr and otherwise ignored: builtins never
    /// change the last foreground status.
    fn execute(self, stdout: &mut dyn Write, env: &mut Environment) -> Result<()>;

    /// Instance to run when `argh` rejects the arguments. `None` reports the
    /// argument error instead; builtins that ignore their operands return
    /// `Some`.
    fn ignoring_args() -> Option<Self> {
        None
    }
}

impl<T: BuiltinCommand> ExecutableCommand for T {
    fn execute(
        self: Box<Self>,
        stdout: &mut dyn Write,
        stderr: &mut dyn Write,
        env: &mut Environment,
    ) -> Result<()> {
        if let Err(e) = <T as BuiltinCommand>::execute(*self, stdout, env) {
            writeln!(stderr, "{e:#}")?;
        }
        Ok(())
    }
}

/// Usage or argument errors produced by `argh` instead of a command.
struct InvalidArgs {
    output: String,
    is_error: bool,
}

impl ExecutableCommand for InvalidArgs {
    fn execute(
        self: Box<Self>,
        stdout: &mut dyn Write,
        stderr: &mut dyn Write,
        _env: &mut Environment,
    ) -> Result<()> {
        let sink: &mut dyn Write = if self.is_error {
            &mut *stderr
        } else {
            &mut *stdout
        };
        writeln!(sink, "{}", self.output.trim_end())?;
        Ok(())
    }
}

impl<T: BuiltinCommand + 'static> CommandFactory for Factory<T> {
    fn try_create(&self, name: &str, args: &[&str]) -> Option<Box<dyn ExecutableCommand>> {
        if name != T::name() {
            return None;
        }
        Some(match T::from_args(&[name], args) {
            Ok(cmd) => Box::new(cmd),
            Err(EarlyExit { output, status }) => match T::ignoring_args() {
                Some(cmd) => {
                    debug!(builtin = name, ?args, "ignoring arguments");
                    Box::new(cmd)
                }
                None => Box::new(InvalidArgs {
                    output,
                    is_error: status.is_err(),
                }),
            },
        })
    }
}

#[derive(FromArgs)]
/// Leave the shell, killing any background jobs still running.
pub struct Exit {
    #[argh(positional, greedy)]
    /// ignored; the shell always exits with status 0.
    pub _args: Vec<String>,
}

impl BuiltinCommand for Exit {
    fn name() -> &'static str {
        "exit"
    }

    fn ignoring_args() -> Option<Self> {
        Some(Exit { _args: Vec::new() })
    }

    fn execute(self, _stdout: &mut dyn Write, env: &mut Environment) -> Result<()> {
        env.should_exit = true;
        Ok(())
    }
}

#[derive(FromArgs)]
/// Change the current working directory.
/// If no target is provided, changes to the directory specified by the HOME environment variable.
pub struct Cd {
    #[argh(positional)]
    /// directory to switch to; absolute or relative to the current directory. Defaults to $HOME when omitted.
    pub target: Option<String>,
}

impl BuiltinCommand for Cd {
    fn name() -> &'static str {
        "cd"
    }

    fn execute(self, _stdout: &mut dyn Write, env: &mut Environment) -> Result<()> {
        let target = match &self.target {
            Some(t) if !t.is_empty() => PathBuf::from(t),
            _ => match env.get_var("HOME") {
                Some(home) => PathBuf::from(home),
                None => anyhow::bail!("cd: no target and HOME not set"),
            },
        };

        let new_dir = if target.is_absolute() {
            target
        } else {
            env.current_dir.join(target)
        };

        let canonical = fs::canonicalize(&new_dir)
            .with_context(|| format!("cd: {}", new_dir.display()))?;

        env::set_current_dir(&canonical)
            .with_context(|| format!("cd: can't chdir to {}", canonical.display()))?;
        env.current_dir = canonical;
        Ok(())
    }
}

#[derive(FromArgs)]
/// Print how the last foreground command finished.
pub struct ShowStatus {}

impl BuiltinCommand for ShowStatus {
    fn name() -> &'static str {
        "status"
    }

    fn ignoring_args() -> Option<Self> {
        Some(ShowStatus {})
    }

    fn execute(self, stdout: &mut dyn Write, env: &mut Environment) -> Result<()> {
        writeln!(stdout, "{}", env.last_status)?;
        stdout.flush()?;
        Ok(())
    }
}
