//! Background rollback worker.
//!
//! Rollbacks run on a dedicated thread with its own connection. `submit`
//! validates on the caller's side and returns the rollback id at once;
//! callers poll `get_rollback` for progress. A submitted rollback can be
//! cancelled until the worker picks it up. Each job carries a `RequestId`
//! minted at submission; both sides log it.

#![allow(clippy::result_large_err)]

use pitr_core::errors::{ExError, ExErrorKind};
use pitr_core::{EngineConfig, RollbackRecord};
use pitr_core_types::RequestId;
use pitr_store::errors::Result;
use rusqlite::Connection;
use std::collections::HashMap;
use std::path::Path;
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use crate::commands::rollback::{cancel_rollback, prepare_rollback, PreparedRollback, RollbackRequest};
use crate::open_database;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JobState {
    Queued,
    Running,
}

type JobTable = Arc<Mutex<HashMap<String, JobState>>>;

struct Job {
    request_id: RequestId,
    prepared: PreparedRollback,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct RollbackWorker {
    conn: Mutex<Connection>,
    jobs: JobTable,
    sender: Option<Sender<Job>>,
    handle: Option<JoinHandle<()>>,
}

impl RollbackWorker {
    /// Open two connections to `db_path` (caller side and worker side) and
    /// start the worker thread.
    pub fn spawn<P: AsRef<Path>>(db_path: P, config: EngineConfig) -> Result<Self> {
        let path = db_path.as_ref();
        let conn = open_database(path, &config)?;
        let mut worker_conn = open_database(path, &config)?;

        let (sender, receiver) = mpsc::channel::<Job>();
        let jobs: JobTable = Arc::new(Mutex::new(HashMap::new()));
        let thread_jobs = Arc::clone(&jobs);

        let handle = thread::Builder::new()
            .name("pitr-rollback-worker".to_string())
            .spawn(move || {
                for Job { request_id, prepared } in receiver {
                    let rollback_id = prepared.rollback_id().to_string();
                    if !claim(&thread_jobs, &rollback_id) {
                        tracing::debug!(
                            request_id = %request_id,
                            rollback_id = %rollback_id,
                            "Skipping cancelled rollback"
                        );
                        continue;
                    }

                    match prepared.run(&mut worker_conn, &config) {
                        Ok(record) => tracing::debug!(
                            request_id = %request_id,
                            rollback_id = %rollback_id,
                            status = %record.status,
                            "Worker finished rollback"
                        ),
                        Err(e) => {
                            let e = e.with_request_id(request_id.clone());
                            tracing::error!(
                                request_id = %request_id,
                                rollback_id = %rollback_id,
                                err.code = e.code(),
                                error = %e,
                                "Worker could not finish rollback"
                            )
                        }
                    }
                    lock(&thread_jobs).remove(&rollback_id);
                }
            })
            .map_err(|e| {
                ExError::new(ExErrorKind::Io)
                    .with_op("spawn_rollback_worker")
                    .with_message(e.to_string())
            })?;

        Ok(Self {
            conn: Mutex::new(conn),
            jobs,
            sender: Some(sender),
            handle: Some(handle),
        })
    }

    /// Validate and queue a rollback; returns its id.
    ///
    /// Rejections (`ERR_NOT_FOUND`, `ERR_CONCURRENCY`,
    /// `ERR_EXPIRED_SNAPSHOT`, ...) are returned here, before queuing.
    pub fn submit(&self, request: &RollbackRequest) -> Result<String> {
        let prepared = {
            let mut conn = lock(&self.conn);
            prepare_rollback(&mut conn, request)?
        };
        let rollback_id = prepared.rollback_id().to_string();
        let request_id = RequestId::new();

        lock(&self.jobs).insert(rollback_id.clone(), JobState::Queued);

        let job = Job {
            request_id: request_id.clone(),
            prepared,
        };
        let sent = self
            .sender
            .as_ref()
            .map(|sender| sender.send(job).is_ok())
            .unwrap_or(false);
        if !sent {
            lock(&self.jobs).remove(&rollback_id);
            // Leave no record stuck in validating
            cancel_rollback(&lock(&self.conn), &rollback_id)?;
            return Err(ExError::new(ExErrorKind::Internal)
                .with_op("submit_rollback")
                .with_rollback_id(rollback_id)
                .with_request_id(request_id)
                .with_message("rollback worker has stopped"));
        }

        tracing::debug!(request_id = %request_id, rollback_id = %rollback_id, "Rollback queued");

        Ok(rollback_id)
    }

    /// Cancel a rollback that is still queued.
    ///
    /// # Errors
    ///
    /// `ERR_VALIDATION` once the worker has started it.
    pub fn cancel(&self, rollback_id: &str) -> Result<RollbackRecord> {
        let mut jobs = lock(&self.jobs);
        if jobs.get(rollback_id) == Some(&JobState::Running) {
            return Err(ExError::new(ExErrorKind::Validation)
                .with_op("cancel_rollback")
                .with_rollback_id(rollback_id.to_string())
                .with_message("rollback is already running"));
        }

        let record = cancel_rollback(&lock(&self.conn), rollback_id)?;
        jobs.remove(rollback_id);
        Ok(record)
    }

    pub fn get_rollback(&self, rollback_id: &str) -> Result<RollbackRecord> {
        crate::commands::rollback::get_rollback(&lock(&self.conn), rollback_id)
    }

    /// Stop accepting work and wait for queued rollbacks to finish.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        self.sender.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::error!("Rollback worker thread panicked");
            }
        }
    }
}

impl Drop for RollbackWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Move a queued job to running; false if it was cancelled meanwhile.
fn claim(jobs: &JobTable, rollback_id: &str) -> bool {
    let mut jobs = lock(jobs);
    match jobs.get_mut(rollback_id) {
        Some(state @ JobState::Queued) => {
            *state = JobState::Running;
            true
        }
        _ => false,
    }
}
