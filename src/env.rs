use crate::command::Status;
use std::collections::HashMap;
use std::env as stdenv;
use std::path::PathBuf;

/// Mutable, user-level view of the shell's process state.
///
/// The environment contains:
/// - `vars`: a snapshot of environment variables used for lookups (e.g. `HOME`).
///   Children still inherit the real process environment unmodified.
/// - `current_dir`: the working directory, kept in sync by `cd`.
/// - `pid`: the shell's own process id, substituted for `$$`.
/// - `last_status`: how the most recent foreground child finished.
/// - `should_exit`: set by `exit`; the interpreter loop checks it after each command.
#[derive(Debug, Clone)]
pub struct Environment {
    pub vars: HashMap<String, String>,
    pub current_dir: PathBuf,
    pub pid: u32,
    pub last_status: Status,
    pub should_exit: bool,
}

impl Environment {
    /// Capture the current process state into a new `Environment` instance.
    pub fn new() -> Self {
        let vars = stdenv::vars().collect();
        let current_dir = stdenv::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self {
            vars,
            current_dir,
            pid: std::process::id(),
            last_status: Status::default(),
            should_exit: false,
        }
    }

    /// Get the value of an environment variable.
    ///
    /// Looks up the key in `self.vars` first, falling back to `std::env::var`.
    pub fn get_var(&self, key: &str) -> Option<String> {
        self.vars
            .get(key)
            .cloned()
            .or_else(|| stdenv::var(key).ok())
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_vars_shadow_process_env() {
        let mut env = Environment::new();
        assert_eq!(env.get_var("MINISH_TEST_UNSET_VAR_98765"), None);

        env.vars
            .insert("MINISH_TEST_UNSET_VAR_98765".to_string(), "value".to_string());
        assert_eq!(
            env.get_var("MINISH_TEST_UNSET_VAR_98765"),
            Some("value".to_string())
        );
    }

    #[test]
    fn starts_with_clean_status_and_own_pid() {
        let env = Environment::new();
        assert_eq!(env.pid, std::process::id());
        assert_eq!(env.last_status, Status::Exited(0));
        assert!(!env.should_exit);
        assert!(env.get_var("PATH").is_some());
    }
}
