//! A small interactive shell.
//!
//! Each input line has `$$` replaced with the shell's pid, is split on
//! whitespace and is then either handled by one of three builtins (`exit`,
//! `cd`, `status`) or forked and exec'd as an external program, optionally
//! with `<`/`>` redirection and a trailing `&` to run it in the background.
//! Finished background jobs are reported before the next prompt, and SIGTSTP
//! toggles a foreground-only mode in which `&` is ignored.
//!
//! The main entry point is [`Interpreter`]; [`input`] provides the line
//! sources it reads from and [`mode::install`] must be called once before
//! [`Interpreter::run`] so the toggle signal is handled.

mod builtin;
pub mod command;
pub mod config;
pub mod env;
pub mod error;
mod external;
pub mod input;
pub mod interpreter;
pub mod jobs;
pub mod lexer;
pub mod mode;
pub mod parser;

pub use error::ShellError;
pub use interpreter::{Flow, Interpreter};
