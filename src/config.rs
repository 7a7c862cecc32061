use crate::jobs::DEFAULT_CAPACITY;
use argh::FromArgs;

/// Environment variable holding the log filter, e.g. `MINISH_LOG=debug`.
pub const LOG_ENV: &str = "MINISH_LOG";

/// Filter used when `MINISH_LOG` is unset or invalid.
pub const DEFAULT_LOG_FILTER: &str = "warn";

#[derive(FromArgs, Debug)]
/// A small interactive shell with background jobs and I/O redirection.
pub struct Config {
    #[argh(option, default = "String::from(\": \")")]
    /// text printed before each command line.
    pub prompt: String,

    #[argh(option, default = "DEFAULT_CAPACITY")]
    /// maximum number of background jobs tracked at once.
    pub max_jobs: usize,

    #[argh(switch)]
    /// read plain lines from stdin even when it is a terminal.
    pub no_editor: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            prompt: String::from(": "),
            max_jobs: DEFAULT_CAPACITY,
            no_editor: false,
        }
    }
}
