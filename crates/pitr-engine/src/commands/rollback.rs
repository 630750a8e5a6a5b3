//! Rollback executor.
//!
//! ## State machine
//!
//! ```text
//! requested → validating → constraints_disabled → restoring → reenabling
//!           → validating_integrity → completed
//! ```
//!
//! 1. `prepare_rollback` checks the snapshot and the in-flight rollbacks and
//!    persists the record as `validating`. Rejections leave no record.
//! 2. `PreparedRollback::run` plans the order, leases every constraint of
//!    the affected tables at once, restores table by table (snapshot rows
//!    plus change-log replay up to the target), then always re-enables the
//!    leases before finishing.
//! 3. A failure after leasing still passes through `reenabling`; the record
//!    ends `failed` with `current_step` naming where it stopped.
//!
//! The record is persisted after every transition so callers on other
//! connections can poll it.

#![allow(clippy::result_large_err)]

use chrono::{DateTime, Utc};
use pitr_core::errors::{ExError, ExErrorKind};
use pitr_core::integrity::compare_payloads;
use pitr_core::model::{RollbackSummary, StepOutcome};
use pitr_core::planner::restoration_order;
use pitr_core::replay::replay_table;
use pitr_core::{log_op_end, log_op_error, log_op_start};
use pitr_core::{
    ChangeLogEntry, EngineConfig, PitrError, PitrSnapshot, PitrStats, RollbackRecord,
    RollbackStatus, SchemaRegistry, TypedRow,
};
use pitr_store::errors::{from_rusqlite, Result};
use pitr_store::{ChangeLogQuery, RollbackRepo, RowRepo, SchemaRepo, SnapshotRepo};
use rusqlite::{Connection, TransactionBehavior};
use std::collections::BTreeMap;
use std::time::Instant;

use super::constraints;
use super::stats::window_stats;
use super::{elapsed_ms, new_id};

/// Parameters of a rollback
#[derive(Debug, Clone, PartialEq)]
pub struct RollbackRequest {
    pub tenant_id: String,
    pub snapshot_id: String,
    pub initiated_by: String,
    pub reason: String,
    /// Replay logged changes up to this instant after restoring the snapshot
    pub target_timestamp: Option<DateTime<Utc>>,
}

impl RollbackRequest {
    pub fn new(
        tenant_id: impl Into<String>,
        snapshot_id: impl Into<String>,
        initiated_by: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            snapshot_id: snapshot_id.into(),
            initiated_by: initiated_by.into(),
            reason: reason.into(),
            target_timestamp: None,
        }
    }

    pub fn target(mut self, target: DateTime<Utc>) -> Self {
        self.target_timestamp = Some(target);
        self
    }
}

/// Result of `execute_rollback`
#[derive(Debug, Clone)]
pub enum RollbackOutcome {
    /// Change statistics for the window the rollback would undo
    DryRun(PitrStats),
    /// The finished record, `completed` or `failed`
    Executed(RollbackRecord),
}

impl RollbackOutcome {
    pub fn record(&self) -> Option<&RollbackRecord> {
        match self {
            RollbackOutcome::Executed(record) => Some(record),
            RollbackOutcome::DryRun(_) => None,
        }
    }

    pub fn into_record(self) -> Option<RollbackRecord> {
        match self {
            RollbackOutcome::Executed(record) => Some(record),
            RollbackOutcome::DryRun(_) => None,
        }
    }
}

/// Roll a tenant back to a snapshot.
///
/// With `dry_run` the request is validated and the change statistics of the
/// window `(snapshot.created_at, target or now]` are returned; nothing is
/// written.
///
/// A rollback that starts and then fails is returned as `Ok` with
/// `status = failed`; `Err` means it was rejected before any mutation or
/// its record could not be persisted.
///
/// # Errors
///
/// - `ERR_NOT_FOUND` if the snapshot is absent or belongs to another tenant
/// - `ERR_CONCURRENCY` if the snapshot was already rolled back or an
///   in-flight rollback uses the same snapshot or an overlapping table
/// - `ERR_EXPIRED_SNAPSHOT` past the snapshot's `expires_at`
pub fn execute_rollback(
    conn: &mut Connection,
    config: &EngineConfig,
    request: &RollbackRequest,
    dry_run: bool,
) -> Result<RollbackOutcome> {
    log_op_start!(
        "execute_rollback",
        tenant_id = %request.tenant_id,
        snapshot_id = %request.snapshot_id,
        dry_run = dry_run
    );
    let start = Instant::now();

    let result = if dry_run {
        dry_run_impl(conn, config, request).map(RollbackOutcome::DryRun)
    } else {
        prepare_impl(conn, request)
            .and_then(|prepared| prepared.run_impl(conn, config))
            .map(RollbackOutcome::Executed)
    };

    match &result {
        Ok(RollbackOutcome::Executed(record)) => {
            log_op_end!(
                "execute_rollback",
                duration_ms = elapsed_ms(start),
                rollback_id = %record.id,
                status = %record.status,
                rows_restored = record.rows_restored
            );
        }
        Ok(RollbackOutcome::DryRun(stats)) => {
            log_op_end!(
                "execute_rollback",
                duration_ms = elapsed_ms(start),
                total_operations = stats.total_operations
            );
        }
        Err(e) => {
            log_op_error!("execute_rollback", e.clone(), duration_ms = elapsed_ms(start));
        }
    }
    result
}

/// A rollback that passed validation and is recorded as `validating`.
///
/// Nothing has been mutated yet: it can still be cancelled.
#[derive(Debug, Clone)]
pub struct PreparedRollback {
    record: RollbackRecord,
    snapshot: PitrSnapshot,
}

/// Perform `requested → validating` and persist the record.
pub fn prepare_rollback(conn: &mut Connection, request: &RollbackRequest) -> Result<PreparedRollback> {
    log_op_start!(
        "prepare_rollback",
        tenant_id = %request.tenant_id,
        snapshot_id = %request.snapshot_id
    );
    let start = Instant::now();

    let prepared = prepare_impl(conn, request).map_err(|e| {
        log_op_error!("prepare_rollback", e.clone(), duration_ms = elapsed_ms(start));
        e
    })?;

    log_op_end!(
        "prepare_rollback",
        duration_ms = elapsed_ms(start),
        rollback_id = %prepared.record.id
    );
    Ok(prepared)
}

fn validate_request(request: &RollbackRequest) -> Result<()> {
    for (field, value) in [
        ("tenant_id", &request.tenant_id),
        ("snapshot_id", &request.snapshot_id),
        ("initiated_by", &request.initiated_by),
    ] {
        if value.trim().is_empty() {
            return Err(ExError::new(ExErrorKind::Validation)
                .with_op("validate_rollback")
                .with_message(format!("{} is required", field)));
        }
    }
    Ok(())
}

/// Checks shared by real and dry runs; `rollback_id` is excluded from the
/// in-flight scan.
fn check_preconditions(
    conn: &Connection,
    request: &RollbackRequest,
    rollback_id: &str,
    now: DateTime<Utc>,
) -> Result<PitrSnapshot> {
    let snapshot = SnapshotRepo::get(conn, &request.tenant_id, &request.snapshot_id)?;

    if snapshot.is_rolled_back {
        return Err(ExError::new(ExErrorKind::Concurrency)
            .with_op("validate_rollback")
            .with_entity_id(snapshot.id.clone())
            .with_message(format!(
                "snapshot already rolled back by {}",
                snapshot.rolled_back_by.as_deref().unwrap_or("unknown")
            )));
    }
    if snapshot.is_expired(now) {
        return Err(ExError::new(ExErrorKind::ExpiredSnapshot)
            .with_op("validate_rollback")
            .with_entity_id(snapshot.id.clone())
            .with_message(format!("snapshot expired at {}", snapshot.expires_at)));
    }

    SchemaRepo::ensure_granted(conn, &request.tenant_id, &snapshot.affected_tables)?;

    if let Some(other) = RollbackRepo::find_conflicting(
        conn,
        rollback_id,
        &snapshot.id,
        &snapshot.affected_tables,
    )? {
        return Err(ExError::new(ExErrorKind::Concurrency)
            .with_op("validate_rollback")
            .with_entity_id(snapshot.id.clone())
            .with_rollback_id(other.id.clone())
            .with_message(format!(
                "rollback {} is in flight ({}) on an overlapping snapshot or table",
                other.id, other.status
            )));
    }

    Ok(snapshot)
}

fn prepare_impl(conn: &mut Connection, request: &RollbackRequest) -> Result<PreparedRollback> {
    validate_request(request)?;

    let mut record = RollbackRecord::new(
        new_id(),
        request.tenant_id.clone(),
        request.snapshot_id.clone(),
        request.initiated_by.clone(),
        request.reason.clone(),
        request.target_timestamp,
    );

    // The in-flight scan and the insert must not interleave with another prepare
    let tx = conn
        .transaction_with_behavior(TransactionBehavior::Immediate)
        .map_err(from_rusqlite)?;

    let snapshot = check_preconditions(&tx, request, &record.id, Utc::now())?;

    record.tables_affected = snapshot.affected_tables.clone();
    record
        .transition(RollbackStatus::Validating)
        .map_err(|e| internal(&record.id, e))?;
    RollbackRepo::save(&tx, &record)?;

    tx.commit().map_err(from_rusqlite)?;

    tracing::debug!(rollback_id = %record.id, status = %record.status, "Rollback transition");
    Ok(PreparedRollback { record, snapshot })
}

fn dry_run_impl(
    conn: &Connection,
    config: &EngineConfig,
    request: &RollbackRequest,
) -> Result<PitrStats> {
    validate_request(request)?;
    let now = Utc::now();
    let snapshot = check_preconditions(conn, request, "", now)?;

    window_stats(
        conn,
        config,
        &request.tenant_id,
        request.target_timestamp.unwrap_or(now),
        Some(snapshot.created_at),
    )
}

fn internal(rollback_id: &str, err: PitrError) -> ExError {
    ExError::from(err)
        .with_op("run_rollback")
        .with_rollback_id(rollback_id.to_string())
}

impl PreparedRollback {
    pub fn rollback_id(&self) -> &str {
        &self.record.id
    }

    pub fn record(&self) -> &RollbackRecord {
        &self.record
    }

    pub fn snapshot(&self) -> &PitrSnapshot {
        &self.snapshot
    }

    /// Finalize as `failed` with `ERR_CANCELLED`; nothing else is touched.
    pub fn cancel(self, conn: &Connection) -> Result<RollbackRecord> {
        cancel_record(conn, self.record)
    }

    /// Drive the rollback to `completed` or `failed`.
    pub fn run(self, conn: &mut Connection, config: &EngineConfig) -> Result<RollbackRecord> {
        let rollback_id = self.record.id.clone();
        log_op_start!("run_rollback", rollback_id = %rollback_id);
        let start = Instant::now();

        let record = self.run_impl(conn, config).map_err(|e| {
            log_op_error!(
                "run_rollback",
                e.clone(),
                duration_ms = elapsed_ms(start),
                rollback_id = %rollback_id
            );
            e
        })?;

        log_op_end!(
            "run_rollback",
            duration_ms = elapsed_ms(start),
            rollback_id = %rollback_id,
            status = %record.status
        );
        Ok(record)
    }

    fn run_impl(self, conn: &mut Connection, config: &EngineConfig) -> Result<RollbackRecord> {
        let mut exec = Execution {
            conn,
            config,
            record: self.record,
            snapshot: self.snapshot,
            expected: BTreeMap::new(),
            claimed: false,
        };

        // Cancelled from another connection while queued
        if let Some(stored) = exec.superseded()? {
            return Ok(stored);
        }

        let plan = match exec.plan() {
            Ok(plan) => plan,
            Err(e) => {
                exec.record.push_error(&e);
                return exec.finish_failed(RollbackStatus::Validating.as_str());
            }
        };

        match constraints::disable_all(exec.conn, &exec.record.id, &plan.order) {
            Ok(leases) => exec.record.fk_constraints_handled = leases,
            Err(e) => {
                exec.record.push_error(&e);
                return exec.finish_failed(RollbackStatus::Validating.as_str());
            }
        }

        match exec.claim() {
            Ok(true) => {}
            Ok(false) => return exec.abandon(&plan),
            Err(e) => {
                exec.record.push_error(&e);
                exec.claimed = true;
                exec.reenable_phase(&plan);
                return exec.finish_failed(RollbackStatus::ConstraintsDisabled.as_str());
            }
        }

        // Leases are held from here on; every path below re-enables them
        let failed_step = exec.restore_phase(&plan);
        exec.reenable_phase(&plan);

        match failed_step {
            Some(step) => exec.finish_failed(&step),
            None => exec.finish_verified(&plan),
        }
    }
}

/// Cancel a rollback that is still `validating`.
///
/// # Errors
///
/// - `ERR_NOT_FOUND` for an unknown rollback
/// - `ERR_VALIDATION` once the rollback has moved past `validating`
pub fn cancel_rollback(conn: &Connection, rollback_id: &str) -> Result<RollbackRecord> {
    let record = RollbackRepo::get(conn, rollback_id)?;
    if record.status != RollbackStatus::Validating {
        return Err(ExError::new(ExErrorKind::Validation)
            .with_op("cancel_rollback")
            .with_rollback_id(rollback_id.to_string())
            .with_message(format!(
                "rollback is {} and can no longer be cancelled",
                record.status
            )));
    }
    cancel_record(conn, record)
}

fn cancel_record(conn: &Connection, mut record: RollbackRecord) -> Result<RollbackRecord> {
    log_op_start!("cancel_rollback", rollback_id = %record.id);
    let start = Instant::now();

    let cancelled = ExError::new(ExErrorKind::Cancelled)
        .with_op("cancel_rollback")
        .with_rollback_id(record.id.clone())
        .with_message("cancelled before any mutation");
    record.push_error(&cancelled);
    record
        .transition(RollbackStatus::Failed)
        .map_err(|e| internal(&record.id, e))?;

    let saved = RollbackRepo::save_if_status(conn, &record, RollbackStatus::Validating)
        .and_then(|saved| {
            if saved {
                Ok(())
            } else {
                Err(ExError::new(ExErrorKind::Validation)
                    .with_op("cancel_rollback")
                    .with_rollback_id(record.id.clone())
                    .with_message("rollback is already running"))
            }
        });
    saved.map_err(|e| {
        log_op_error!("cancel_rollback", e.clone(), duration_ms = elapsed_ms(start));
        e
    })?;

    tracing::debug!(rollback_id = %record.id, status = %record.status, "Rollback transition");
    log_op_end!("cancel_rollback", duration_ms = elapsed_ms(start));
    Ok(record)
}

struct Plan {
    registry: SchemaRegistry,
    order: Vec<String>,
}

/// Mutable state of one running rollback
struct Execution<'a> {
    conn: &'a mut Connection,
    config: &'a EngineConfig,
    record: RollbackRecord,
    snapshot: PitrSnapshot,
    /// Post-restore rows per table, compared during integrity validation
    expected: BTreeMap<String, Vec<TypedRow>>,
    /// Set once the record left `validating` under our compare-and-set
    claimed: bool,
}

impl Execution<'_> {
    /// Move to `next` and persist the record.
    fn enter(&mut self, next: RollbackStatus) -> Result<()> {
        self.record
            .transition(next)
            .map_err(|e| internal(&self.record.id, e))?;
        tracing::debug!(rollback_id = %self.record.id, status = %next, "Rollback transition");
        RollbackRepo::save(self.conn, &self.record)
    }

    /// The stored record, if it is no longer `validating`.
    fn superseded(&self) -> Result<Option<RollbackRecord>> {
        let stored = RollbackRepo::get(self.conn, &self.record.id)?;
        if stored.status == RollbackStatus::Validating {
            return Ok(None);
        }
        tracing::debug!(
            rollback_id = %stored.id,
            status = %stored.status,
            "Rollback no longer pending, not running"
        );
        Ok(Some(stored))
    }

    /// `validating → constraints_disabled`, only if nobody finalized the
    /// record in the meantime.
    fn claim(&mut self) -> Result<bool> {
        self.record
            .transition(RollbackStatus::ConstraintsDisabled)
            .map_err(|e| internal(&self.record.id, e))?;
        let claimed =
            RollbackRepo::save_if_status(self.conn, &self.record, RollbackStatus::Validating)?;
        if claimed {
            self.claimed = true;
            tracing::debug!(
                rollback_id = %self.record.id,
                status = %self.record.status,
                "Rollback transition"
            );
        }
        Ok(claimed)
    }

    /// Lost the race to a cancel: hand the leases back and report the
    /// stored record untouched.
    fn abandon(self, plan: &Plan) -> Result<RollbackRecord> {
        let report = constraints::reenable_all(self.conn, &self.record.id, &plan.order);
        for e in &report.errors {
            tracing::error!(rollback_id = %self.record.id, error = %e, "Lease release failed");
        }
        RollbackRepo::get(self.conn, &self.record.id)
    }

    fn plan(&mut self) -> Result<Plan> {
        let tables = self.snapshot.affected_tables.clone();
        let registry = SchemaRepo::load_registry(self.conn)?;

        let order = match restoration_order(&registry, &tables) {
            Ok(order) => order,
            Err(PitrError::SchemaCycle { tables: cycle }) => {
                tracing::warn!(
                    rollback_id = %self.record.id,
                    cycle = %cycle.join(","),
                    "Foreign key cycle, restoring in name order"
                );
                self.record.push_step(
                    None,
                    StepOutcome::Skipped,
                    0,
                    format!(
                        "foreign key cycle across {}; all constraints disabled, name order",
                        cycle.join(", ")
                    ),
                );
                let mut order = tables;
                order.sort();
                order
            }
            Err(e) => return Err(ExError::from(e).with_op("plan_rollback")),
        };

        Ok(Plan { registry, order })
    }

    /// Returns the step to report as `current_step` if restoring stopped.
    fn restore_phase(&mut self, plan: &Plan) -> Option<String> {
        let leased = self.record.fk_constraints_handled.len() as u64;
        self.record.push_step(
            None,
            StepOutcome::Ok,
            leased,
            format!("disabled {} constraints", leased),
        );

        if let Err(e) = self.enter(RollbackStatus::Restoring) {
            self.record.push_error(&e);
            return Some(RollbackStatus::Restoring.to_string());
        }

        for table in &plan.order {
            match self.restore_table(plan, table) {
                Ok((rows, replayed)) => {
                    self.record.tables_restored.push(table.clone());
                    self.record.rows_restored += rows;
                    self.record.push_step(
                        Some(table),
                        StepOutcome::Ok,
                        rows,
                        format!("restored {} rows, replayed {} changes", rows, replayed),
                    );
                    if let Err(e) = RollbackRepo::save(self.conn, &self.record) {
                        self.record.push_error(&e);
                        return Some(format!("restoring:{}", table));
                    }
                }
                Err(e) => {
                    tracing::warn!(
                        rollback_id = %self.record.id,
                        table_name = %table,
                        error = %e,
                        "Table restore failed"
                    );
                    self.record
                        .push_step(Some(table), StepOutcome::Failed, 0, e.message());
                    self.record.push_error(&e);
                    return Some(format!("restoring:{}", table));
                }
            }
        }
        None
    }

    /// Restore one table in its own transaction; returns the restored row
    /// count and the number of replayed changes.
    fn restore_table(&mut self, plan: &Plan, table: &str) -> Result<(u64, usize)> {
        let deadline = Instant::now() + self.config.table_timeout();
        let as_restore_error = |e: ExError| match e.kind() {
            ExErrorKind::Restore | ExErrorKind::Timeout => {
                e.with_rollback_id(self.record.id.clone())
            }
            _ => ExError::new(ExErrorKind::Restore)
                .with_op("restore_table")
                .with_table(table.to_string())
                .with_rollback_id(self.record.id.clone())
                .with_message(format!("cannot restore table {}", table))
                .with_source(e),
        };

        let schema = plan
            .registry
            .get(table)
            .map_err(|e| as_restore_error(ExError::from(e)))?;
        let entries = self.replay_entries(table).map_err(as_restore_error)?;
        let rows = replay_table(schema, self.snapshot.rows_for(table), &entries)
            .map_err(|e| as_restore_error(ExError::from(e).with_table(table.to_string())))?;

        let restored = {
            let tx = self
                .conn
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .map_err(|e| as_restore_error(from_rusqlite(e)))?;
            let restored = RowRepo::replace_table(
                &tx,
                &self.snapshot.tenant_id,
                schema,
                &rows,
                Some(deadline),
            )
            .map_err(as_restore_error)?;
            tx.commit().map_err(|e| as_restore_error(from_rusqlite(e)))?;
            restored
        };

        self.expected.insert(table.to_string(), rows);
        Ok((restored, entries.len()))
    }

    /// Logged changes to replay on top of the snapshot rows of `table`.
    fn replay_entries(&self, table: &str) -> Result<Vec<ChangeLogEntry>> {
        let target = match self.record.target_timestamp {
            Some(target) if target > self.snapshot.created_at => target,
            _ => return Ok(Vec::new()),
        };
        ChangeLogQuery::new(self.snapshot.tenant_id.clone())
            .table(table)
            .after_sequence(self.snapshot.log_sequence)
            .to(target)
            .page_size(self.config.changelog_page_size)
            .collect(self.conn)
    }

    /// Release every lease and re-check the re-enabled constraints. Failures
    /// are recorded next to whatever error came before.
    fn reenable_phase(&mut self, plan: &Plan) {
        if let Err(e) = self.enter(RollbackStatus::Reenabling) {
            self.record.push_error(&e);
        }

        let report = constraints::reenable_all(self.conn, &self.record.id, &plan.order);
        for released in &report.released {
            if let Some(lease) = self.record.fk_constraints_handled.iter_mut().find(|l| {
                l.table_name == released.table_name && l.constraint_name == released.constraint_name
            }) {
                *lease = released.clone();
            }
        }
        for e in &report.errors {
            self.record
                .push_step(e.table(), StepOutcome::Failed, 0, e.message());
            self.record.push_error(e);
        }
        self.record.push_step(
            None,
            StepOutcome::Ok,
            report.released.len() as u64,
            format!("re-enabled {} constraints", report.released.len()),
        );

        match constraints::find_violations(self.conn, &self.record.tenant_id, &plan.order) {
            Ok(violations) => {
                if !violations.is_empty() {
                    self.record.integrity_valid = Some(false);
                }
                for orphan in &violations {
                    let err = constraints::violation_error(&self.record.id, orphan);
                    self.record.push_error(&err);
                }
            }
            Err(e) => self.record.push_error(&e),
        }

        if let Err(e) = RollbackRepo::save(self.conn, &self.record) {
            self.record.push_error(&e);
        }
    }

    /// Compare the restored tables with the expected state, consume the
    /// snapshot and complete.
    fn finish_verified(mut self, plan: &Plan) -> Result<RollbackRecord> {
        if let Err(e) = self.enter(RollbackStatus::ValidatingIntegrity) {
            self.record.push_error(&e);
            return self.finish_failed(RollbackStatus::ValidatingIntegrity.as_str());
        }

        if let Err(e) = self.verify(plan) {
            self.record.push_error(&e);
            return self.finish_failed(RollbackStatus::ValidatingIntegrity.as_str());
        }

        self.record
            .transition(RollbackStatus::Completed)
            .map_err(|e| internal(&self.record.id, e))?;
        tracing::debug!(rollback_id = %self.record.id, status = %self.record.status, "Rollback transition");
        RollbackRepo::save(self.conn, &self.record)?;
        Ok(self.record)
    }

    fn verify(&mut self, plan: &Plan) -> Result<()> {
        let actual = RowRepo::list_tables(self.conn, &self.record.tenant_id, &plan.order)?;
        let report = compare_payloads(&self.expected, &actual)
            .map_err(|e| internal(&self.record.id, e))?;

        // Orphans found while re-enabling already invalidated the restore
        let orphaned = self.record.integrity_valid == Some(false);
        self.record.integrity_valid = Some(report.valid && !orphaned);
        let outcome = if report.valid && !orphaned {
            StepOutcome::Ok
        } else if report.valid {
            StepOutcome::Failed
        } else {
            self.record.push_error(
                &ExError::new(ExErrorKind::Integrity)
                    .with_op("validate_integrity")
                    .with_rollback_id(self.record.id.clone())
                    .with_message(report.issues.join("; ")),
            );
            StepOutcome::Failed
        };
        self.record.push_step(
            None,
            outcome,
            report.actual_rows,
            format!(
                "expected {} rows, found {}",
                report.expected_rows, report.actual_rows
            ),
        );

        SnapshotRepo::mark_rolled_back(self.conn, &self.snapshot.id, &self.record.id)
    }

    fn finish_failed(mut self, step: &str) -> Result<RollbackRecord> {
        self.record
            .transition(RollbackStatus::Failed)
            .map_err(|e| internal(&self.record.id, e))?;
        self.record.current_step = Some(step.to_string());
        tracing::debug!(
            rollback_id = %self.record.id,
            status = %self.record.status,
            current_step = step,
            "Rollback transition"
        );
        if self.claimed {
            RollbackRepo::save(self.conn, &self.record)?;
        } else if !RollbackRepo::save_if_status(self.conn, &self.record, RollbackStatus::Validating)? {
            return RollbackRepo::get(self.conn, &self.record.id);
        }
        Ok(self.record)
    }
}

/// Fetch a rollback record by id.
pub fn get_rollback(conn: &Connection, rollback_id: &str) -> Result<RollbackRecord> {
    RollbackRepo::get(conn, rollback_id)
}

/// Most recent rollbacks of a tenant, newest first.
///
/// `limit` defaults to `history_limit` from the configuration.
pub fn get_rollback_history(
    conn: &Connection,
    config: &EngineConfig,
    tenant_id: &str,
    limit: Option<usize>,
) -> Result<Vec<RollbackSummary>> {
    log_op_start!("get_rollback_history", tenant_id = tenant_id);
    let start = Instant::now();

    let records = RollbackRepo::history(conn, tenant_id, limit.unwrap_or(config.history_limit))
        .map_err(|e| {
            log_op_error!(
                "get_rollback_history",
                e.clone(),
                duration_ms = elapsed_ms(start)
            );
            e
        })?;

    log_op_end!(
        "get_rollback_history",
        duration_ms = elapsed_ms(start),
        count = records.len()
    );
    Ok(records.iter().map(RollbackRecord::summary).collect())
}

/// Order in which `tables` would be restored: parents before children.
///
/// # Errors
///
/// - `ERR_VALIDATION` for an unregistered table
/// - `ERR_SCHEMA_CYCLE` when the foreign keys form a cycle across tables
pub fn get_restoration_order(conn: &Connection, tables: &[String]) -> Result<Vec<String>> {
    log_op_start!("get_restoration_order", tables = tables.len());
    let start = Instant::now();

    let result = SchemaRepo::load_registry(conn).and_then(|registry| {
        restoration_order(&registry, tables)
            .map_err(|e| ExError::from(e).with_op("get_restoration_order"))
    });

    match &result {
        Ok(_) => {
            log_op_end!("get_restoration_order", duration_ms = elapsed_ms(start));
        }
        Err(e) => {
            log_op_error!(
                "get_restoration_order",
                e.clone(),
                duration_ms = elapsed_ms(start)
            );
        }
    }
    result
}
