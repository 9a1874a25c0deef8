//! Table of background jobs and their asynchronous reaping.
//!
//! A job is a single child started with a trailing `&`. The table owns the
//! [`Child`] handle so that every background process is eventually waited for
//! by [`JobTable::reap`] instead of lingering as a zombie.

use crate::command::ExitCode;
use crate::external;
use std::io;
use std::process::Child;

/// A running background job.
#[derive(Debug)]
pub struct Job {
    /// Number shown as `[N]`. The smallest unused id is assigned.
    pub id: usize,
    /// The command line, without the trailing `&`.
    pub command: String,
    child: Child,
}

impl Job {
    /// Process id of the job's child.
    pub fn pid(&self) -> u32 {
        self.child.id()
    }
}

/// A job that [`JobTable::reap`] found finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinishedJob {
    pub id: usize,
    pub pid: u32,
    pub command: String,
    pub status: ExitCode,
}

/// The background jobs of one interpreter.
#[derive(Debug, Default)]
pub struct JobTable {
    jobs: Vec<Job>,
}

impl JobTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a job and returns the id assigned to it.
    pub fn insert(&mut self, child: Child, command: String) -> usize {
        let id = (1..)
            .find(|id| !self.jobs.iter().any(|j| j.id == *id))
            .unwrap_or(1);
        tracing::info!(id, pid = child.id(), %command, "started background job");
        self.jobs.push(Job { id, command, child });
        id
    }

    /// Polls every job without blocking and removes those that have terminated.
    ///
    /// A job whose status cannot be queried is dropped from the table and reported
    /// with status -1.
    pub fn reap(&mut self) -> Vec<FinishedJob> {
        let mut finished = Vec::new();
        self.jobs.retain_mut(|job| {
            let status = match job.child.try_wait() {
                Ok(Some(status)) => external::exit_code(status),
                Ok(None) => return true,
                Err(err) => {
                    tracing::warn!(id = job.id, %err, "failed to poll background job");
                    -1
                }
            };
            tracing::debug!(id = job.id, pid = job.pid(), status, "reaped background job");
            finished.push(FinishedJob {
                id: job.id,
                pid: job.pid(),
                command: std::mem::take(&mut job.command),
                status,
            });
            false
        });
        finished
    }

    /// Blocks until every job has terminated.
    pub fn wait_all(&mut self) -> io::Result<Vec<FinishedJob>> {
        self.jobs
            .drain(..)
            .map(|mut job| -> io::Result<FinishedJob> {
                let status = external::exit_code(job.child.wait()?);
                Ok(FinishedJob {
                    id: job.id,
                    pid: job.child.id(),
                    command: job.command,
                    status,
                })
            })
            .collect()
    }

    /// Iterates over the jobs that have not been reaped yet.
    pub fn iter(&self) -> impl Iterator<Item = &Job> {
        self.jobs.iter()
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}
