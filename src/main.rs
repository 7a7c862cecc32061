use minish::Interpreter;
use minish::config::{Config, DEFAULT_LOG_FILTER, LOG_ENV};
use minish::input::{EditorLines, LineSource, PlainLines};
use minish::mode;
use std::io::{self, IsTerminal};
use std::process::ExitCode;
use tracing::{debug, warn};
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::prelude::*;

fn init_logging() {
    let env_filter = EnvFilter::try_from_env(LOG_ENV)
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(io::stderr)
        .with_target(true)
        .with_ansi(false)
        .with_filter(env_filter);

    tracing_subscriber::registry().with(stderr_layer).init();
}

fn line_source(config: &Config) -> Box<dyn LineSource> {
    if config.no_editor || !io::stdin().is_terminal() {
        return Box::new(PlainLines::stdio());
    }
    match EditorLines::new() {
        Ok(editor) => Box::new(editor),
        Err(err) => {
            warn!(%err, "line editor unavailable, reading plain lines");
            Box::new(PlainLines::stdio())
        }
    }
}

fn run(config: Config) -> anyhow::Result<()> {
    mode::install()?;
    let mut input = line_source(&config);
    let mut shell = Interpreter::new(config.max_jobs);
    debug!(pid = shell.environment().pid, max_jobs = config.max_jobs, "starting");
    shell.run(input.as_mut(), &config.prompt)?;
    Ok(())
}

fn main() -> ExitCode {
    let config: Config = argh::from_env();
    init_logging();

    match run(config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("minish: {err:#}");
            ExitCode::FAILURE
        }
    }
}
