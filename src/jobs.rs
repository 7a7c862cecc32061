use crate::command::Status;
use crate::error::ShellError;
use nix::errno::Errno;
use nix::sys::signal::{self, Signal};
use nix::sys::wait::{WaitPidFlag, WaitStatus, waitpid};
use nix::unistd::Pid;
use std::fmt;
use tracing::{debug, warn};

/// Number of background jobs tracked when no limit is configured.
pub const DEFAULT_CAPACITY: usize = 5;

/// A background job that finished since the last poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobReport {
    pub pid: Pid,
    pub status: Status,
}

impl fmt::Display for JobReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "background pid {} is done: {}", self.pid, self.status)
    }
}

/// Fixed-size arena of background process ids.
///
/// Slots are never reordered; a finished job's slot is emptied in place and
/// handed out again by a later [`insert`](JobTable::insert).
#[derive(Debug)]
pub struct JobTable {
    slots: Vec<Option<Pid>>,
}

impl JobTable {
    pub fn with_capacity(capacity: usize) -> Self {
        JobTable {
            slots: vec![None; capacity],
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of jobs currently tracked.
    pub fn len(&self) -> usize {
        self.slots.iter().flatten().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_full(&self) -> bool {
        self.slots.iter().all(Option::is_some)
    }

    /// Tracked pids in slot order.
    pub fn pids(&self) -> impl Iterator<Item = Pid> + '_ {
        self.slots.iter().flatten().copied()
    }

    /// Stores `pid` in the first empty slot and returns its index.
    pub fn insert(&mut self, pid: Pid) -> Result<usize, ShellError> {
        let capacity = self.capacity();
        let (index, slot) = self
            .slots
            .iter_mut()
            .enumerate()
            .find(|(_, slot)| slot.is_none())
            .ok_or(ShellError::JobTableFull { capacity })?;
        *slot = Some(pid);
        debug!(%pid, slot = index, "tracking background job");
        Ok(index)
    }

    /// Checks every tracked job without blocking and returns those that finished.
    pub fn poll(&mut self) -> Vec<JobReport> {
        self.poll_with(try_reap)
    }

    /// Like [`poll`](Self::poll) with a custom non-blocking reaper.
    ///
    /// `reap` returns `Ok(None)` while the job is still running. A job the
    /// reaper fails on is no longer ours to wait for and is dropped.
    pub fn poll_with<F>(&mut self, mut reap: F) -> Vec<JobReport>
    where
        F: FnMut(Pid) -> nix::Result<Option<Status>>,
    {
        let mut finished = Vec::new();
        for slot in &mut self.slots {
            let Some(pid) = *slot else { continue };
            match reap(pid) {
                Ok(None) => {}
                Ok(Some(status)) => {
                    debug!(%pid, %status, "background job finished");
                    finished.push(JobReport { pid, status });
                    *slot = None;
                }
                Err(err) => {
                    warn!(%pid, %err, "lost track of background job");
                    *slot = None;
                }
            }
        }
        finished
    }

    /// Sends SIGKILL to every tracked job and forgets them. Does not wait.
    pub fn terminate_all(&mut self) {
        for slot in &mut self.slots {
            if let Some(pid) = slot.take() {
                debug!(%pid, "killing background job");
                if let Err(err) = signal::kill(pid, Signal::SIGKILL) {
                    warn!(%pid, %err, "failed to kill background job");
                }
            }
        }
    }
}

impl Default for JobTable {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

/// Non-blocking wait on one child.
pub fn try_reap(pid: Pid) -> nix::Result<Option<Status>> {
    loop {
        match waitpid(pid, Some(WaitPidFlag::WNOHANG)) {
            Ok(WaitStatus::StillAlive) => return Ok(None),
            Ok(status) => {
                if let Some(done) = Status::from_wait(status) {
                    return Ok(Some(done));
                }
                // Stopped or continued; it is still a live job.
                return Ok(None);
            }
            Err(Errno::EINTR) => continue,
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::process::Command;
    use std::thread;
    use std::time::{Duration, Instant};

    fn pid(raw: i32) -> Pid {
        Pid::from_raw(raw)
    }

    #[test]
    fn insert_takes_first_free_slot() {
        let mut jobs = JobTable::with_capacity(3);
        assert!(jobs.is_empty());
        assert_eq!(jobs.insert(pid(10)).unwrap(), 0);
        assert_eq!(jobs.insert(pid(11)).unwrap(), 1);
        assert_eq!(jobs.len(), 2);

        jobs.poll_with(|p| Ok((p == pid(10)).then_some(Status::Exited(0))));
        assert_eq!(jobs.pids().collect::<Vec<_>>(), vec![pid(11)]);
        assert_eq!(jobs.insert(pid(12)).unwrap(), 0);
        assert_eq!(jobs.pids().collect::<Vec<_>>(), vec![pid(12), pid(11)]);
    }

    #[test]
    fn full_table_is_an_explicit_error() {
        let mut jobs = JobTable::with_capacity(2);
        jobs.insert(pid(1)).unwrap();
        jobs.insert(pid(2)).unwrap();
        assert!(jobs.is_full());

        let err = jobs.insert(pid(3)).unwrap_err();
        assert!(matches!(err, ShellError::JobTableFull { capacity: 2 }));
        assert_eq!(jobs.len(), 2);
    }

    #[test]
    fn poll_reports_and_clears_finished_jobs_only() {
        let mut jobs = JobTable::default();
        jobs.insert(pid(100)).unwrap();
        jobs.insert(pid(200)).unwrap();
        jobs.insert(pid(300)).unwrap();

        let reports = jobs.poll_with(|p| match p.as_raw() {
            100 => Ok(Some(Status::Exited(0))),
            300 => Ok(Some(Status::Signaled(15))),
            _ => Ok(None),
        });

        assert_eq!(
            reports,
            vec![
                JobReport { pid: pid(100), status: Status::Exited(0) },
                JobReport { pid: pid(300), status: Status::Signaled(15) },
            ]
        );
        assert_eq!(jobs.pids().collect::<Vec<_>>(), vec![pid(200)]);
        assert_eq!(
            reports[0].to_string(),
            "background pid 100 is done: exit value 0"
        );
        assert_eq!(
            reports[1].to_string(),
            "background pid 300 is done: terminated by signal 15"
        );
    }

    #[test]
    fn unreapable_jobs_are_dropped_silently() {
        let mut jobs = JobTable::default();
        jobs.insert(pid(42)).unwrap();
        let reports = jobs.poll_with(|_| Err(Errno::ECHILD));
        assert!(reports.is_empty());
        assert!(jobs.is_empty());
    }

    fn poll_until_done(jobs: &mut JobTable) -> Vec<JobReport> {
        let deadline = Instant::now() + Duration::from_secs(10);
        loop {
            let reports = jobs.poll();
            if !reports.is_empty() || Instant::now() > deadline {
                return reports;
            }
            thread::sleep(Duration::from_millis(20));
        }
    }

    #[test]
    fn reaps_a_real_child_exit_code() {
        let child = Command::new("/bin/sh").args(["-c", "exit 3"]).spawn().unwrap();
        let child_pid = pid(child.id() as i32);

        let mut jobs = JobTable::default();
        jobs.insert(child_pid).unwrap();
        let reports = poll_until_done(&mut jobs);

        assert_eq!(
            reports,
            vec![JobReport { pid: child_pid, status: Status::Exited(3) }]
        );
        assert!(jobs.is_empty());
    }

    #[test]
    fn terminate_all_kills_running_children() {
        let child = Command::new("/bin/sh").args(["-c", "sleep 30"]).spawn().unwrap();
        let child_pid = pid(child.id() as i32);

        let mut jobs = JobTable::default();
        jobs.insert(child_pid).unwrap();
        jobs.terminate_all();
        assert!(jobs.is_empty());

        let status = waitpid(child_pid, None).unwrap();
        assert_eq!(Status::from_wait(status), Some(Status::Signaled(9)));
    }
}
