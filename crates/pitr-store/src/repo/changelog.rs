//! Append-only change log with a lazy, keyset-paginated cursor

#![allow(clippy::result_large_err)]

use crate::convert::{core_err, from_millis, opt_from_json, to_json, to_millis};
use crate::errors::{from_rusqlite, Result};
use chrono::{DateTime, Utc};
use pitr_core::errors::ExError;
use pitr_core::stats::PitrStats;
use pitr_core::{ChangeLogEntry, ChangeOperation, NewChangeLogEntry};
use rusqlite::types::Value as SqlValue;
use rusqlite::Connection;
use std::collections::VecDeque;

pub struct ChangeLogRepo;

impl ChangeLogRepo {
    /// Append an entry and return its sequence.
    ///
    /// # Errors
    ///
    /// `ERR_VALIDATION` if the tenant, table or record id is empty, or an
    /// insert/update carries no row image.
    pub fn append(conn: &Connection, entry: &NewChangeLogEntry) -> Result<i64> {
        entry.validate().map_err(core_err("append_change"))?;

        conn.execute(
            "INSERT INTO change_log (
                tenant_id, table_name, record_id, operation,
                old_data, new_data, changed_at, backup_job_id
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            rusqlite::params![
                entry.tenant_id,
                entry.table_name,
                entry.record_id,
                entry.operation.as_str(),
                entry
                    .old_data
                    .as_ref()
                    .map(|d| to_json("append_change", d))
                    .transpose()?,
                entry
                    .new_data
                    .as_ref()
                    .map(|d| to_json("append_change", d))
                    .transpose()?,
                to_millis(entry.changed_at),
                entry.backup_job_id,
            ],
        )
        .map_err(from_rusqlite)?;

        Ok(conn.last_insert_rowid())
    }

    /// Highest sequence assigned so far, 0 for an empty log.
    pub fn max_sequence(conn: &Connection) -> Result<i64> {
        conn.query_row(
            "SELECT COALESCE(MAX(sequence), 0) FROM change_log",
            [],
            |row| row.get(0),
        )
        .map_err(from_rusqlite)
    }

    /// Earliest change at or before `to` for the tenant's tables.
    pub fn earliest(
        conn: &Connection,
        tenant_id: &str,
        tables: &[String],
        to: DateTime<Utc>,
    ) -> Result<Option<DateTime<Utc>>> {
        Self::bound(conn, "MIN", tenant_id, tables, to)
    }

    /// Latest change at or before `to` for the tenant's tables.
    pub fn latest(
        conn: &Connection,
        tenant_id: &str,
        tables: &[String],
        to: DateTime<Utc>,
    ) -> Result<Option<DateTime<Utc>>> {
        Self::bound(conn, "MAX", tenant_id, tables, to)
    }

    fn bound(
        conn: &Connection,
        aggregate: &str,
        tenant_id: &str,
        tables: &[String],
        to: DateTime<Utc>,
    ) -> Result<Option<DateTime<Utc>>> {
        let mut params = vec![
            SqlValue::Text(tenant_id.to_string()),
            SqlValue::Integer(to_millis(to)),
        ];
        let mut sql = format!(
            "SELECT {}(changed_at) FROM change_log WHERE tenant_id = ?1 AND changed_at <= ?2",
            aggregate
        );
        push_table_filter(&mut sql, &mut params, Some(tables));

        let ms: Option<i64> = conn
            .query_row(&sql, rusqlite::params_from_iter(params), |row| row.get(0))
            .map_err(from_rusqlite)?;
        ms.map(from_millis).transpose()
    }

    /// Fold every entry of `query` into change counts.
    pub fn stats(conn: &Connection, query: &ChangeLogQuery) -> Result<PitrStats> {
        let mut stats = PitrStats::default();
        for entry in query.cursor(conn) {
            stats.record(&entry?);
        }
        Ok(stats)
    }
}

/// Filter over the change log of one tenant.
///
/// The window is `(from, to]` on `changed_at`; `after_sequence` further
/// restricts to entries appended after a snapshot's watermark.
#[derive(Debug, Clone)]
pub struct ChangeLogQuery {
    tenant_id: String,
    tables: Option<Vec<String>>,
    from: Option<DateTime<Utc>>,
    to: Option<DateTime<Utc>>,
    after_sequence: Option<i64>,
    page_size: usize,
}

impl ChangeLogQuery {
    pub fn new(tenant_id: impl Into<String>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            tables: None,
            from: None,
            to: None,
            after_sequence: None,
            page_size: 500,
        }
    }

    pub fn table(mut self, table_name: impl Into<String>) -> Self {
        self.tables = Some(vec![table_name.into()]);
        self
    }

    pub fn tables(mut self, tables: &[String]) -> Self {
        self.tables = Some(tables.to_vec());
        self
    }

    /// Exclusive lower bound
    pub fn from(mut self, from: DateTime<Utc>) -> Self {
        self.from = Some(from);
        self
    }

    /// Inclusive upper bound
    pub fn to(mut self, to: DateTime<Utc>) -> Self {
        self.to = Some(to);
        self
    }

    pub fn after_sequence(mut self, sequence: i64) -> Self {
        self.after_sequence = Some(sequence);
        self
    }

    pub fn page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Start a fresh pass over the matching entries.
    pub fn cursor<'c>(&self, conn: &'c Connection) -> ChangeLogCursor<'c> {
        ChangeLogCursor {
            conn,
            query: self.clone(),
            last: None,
            buffer: VecDeque::new(),
            done: false,
        }
    }

    /// All matching entries in order
    pub fn collect(&self, conn: &Connection) -> Result<Vec<ChangeLogEntry>> {
        self.cursor(conn).collect()
    }
}

/// Lazy iterator over change-log entries in `(changed_at, sequence)` order.
///
/// Fetches one page at a time and resumes after the last key it returned,
/// so appends during iteration never shift pages. After an error it yields
/// nothing more.
pub struct ChangeLogCursor<'c> {
    conn: &'c Connection,
    query: ChangeLogQuery,
    last: Option<(i64, i64)>,
    buffer: VecDeque<ChangeLogEntry>,
    done: bool,
}

impl ChangeLogCursor<'_> {
    fn fetch_page(&mut self) -> Result<()> {
        let q = &self.query;
        let mut params = vec![SqlValue::Text(q.tenant_id.clone())];
        let mut sql = String::from(
            "SELECT sequence, tenant_id, table_name, record_id, operation,
                    old_data, new_data, changed_at, backup_job_id
             FROM change_log WHERE tenant_id = ?1",
        );
        push_table_filter(&mut sql, &mut params, q.tables.as_deref());
        if let Some(from) = q.from {
            params.push(SqlValue::Integer(to_millis(from)));
            sql.push_str(&format!(" AND changed_at > ?{}", params.len()));
        }
        if let Some(to) = q.to {
            params.push(SqlValue::Integer(to_millis(to)));
            sql.push_str(&format!(" AND changed_at <= ?{}", params.len()));
        }
        if let Some(seq) = q.after_sequence {
            params.push(SqlValue::Integer(seq));
            sql.push_str(&format!(" AND sequence > ?{}", params.len()));
        }
        if let Some((ts, seq)) = self.last {
            params.push(SqlValue::Integer(ts));
            let ts_idx = params.len();
            params.push(SqlValue::Integer(seq));
            sql.push_str(&format!(
                " AND (changed_at > ?{ts} OR (changed_at = ?{ts} AND sequence > ?{seq}))",
                ts = ts_idx,
                seq = params.len()
            ));
        }
        params.push(SqlValue::Integer(q.page_size as i64));
        sql.push_str(&format!(
            " ORDER BY changed_at, sequence LIMIT ?{}",
            params.len()
        ));

        let mut stmt = self.conn.prepare(&sql).map_err(from_rusqlite)?;
        let raw = stmt
            .query_map(rusqlite::params_from_iter(params), |row| {
                Ok(RawEntry {
                    sequence: row.get(0)?,
                    tenant_id: row.get(1)?,
                    table_name: row.get(2)?,
                    record_id: row.get(3)?,
                    operation: row.get(4)?,
                    old_data: row.get(5)?,
                    new_data: row.get(6)?,
                    changed_at: row.get(7)?,
                    backup_job_id: row.get(8)?,
                })
            })
            .map_err(from_rusqlite)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(from_rusqlite)?;

        if raw.len() < q.page_size {
            self.done = true;
        }
        if let Some(tail) = raw.last() {
            self.last = Some((tail.changed_at, tail.sequence));
        }
        for entry in raw {
            self.buffer.push_back(entry.decode()?);
        }
        Ok(())
    }
}

impl Iterator for ChangeLogCursor<'_> {
    type Item = Result<ChangeLogEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.buffer.is_empty() && !self.done {
            if let Err(e) = self.fetch_page() {
                self.done = true;
                self.buffer.clear();
                return Some(Err(e));
            }
        }
        self.buffer.pop_front().map(Ok)
    }
}

struct RawEntry {
    sequence: i64,
    tenant_id: String,
    table_name: String,
    record_id: String,
    operation: String,
    old_data: Option<String>,
    new_data: Option<String>,
    changed_at: i64,
    backup_job_id: Option<String>,
}

impl RawEntry {
    fn decode(self) -> std::result::Result<ChangeLogEntry, ExError> {
        Ok(ChangeLogEntry {
            sequence: self.sequence,
            tenant_id: self.tenant_id,
            table_name: self.table_name,
            record_id: self.record_id,
            operation: ChangeOperation::parse(&self.operation).map_err(core_err("read_change"))?,
            old_data: opt_from_json("read_change", self.old_data)?,
            new_data: opt_from_json("read_change", self.new_data)?,
            changed_at: from_millis(self.changed_at)?,
            backup_job_id: self.backup_job_id,
        })
    }
}

fn push_table_filter(sql: &mut String, params: &mut Vec<SqlValue>, tables: Option<&[String]>) {
    let Some(tables) = tables else {
        return;
    };
    if tables.is_empty() {
        sql.push_str(" AND 0");
        return;
    }
    let placeholders: Vec<String> = tables
        .iter()
        .map(|t| {
            params.push(SqlValue::Text(t.clone()));
            format!("?{}", params.len())
        })
        .collect();
    sql.push_str(&format!(" AND table_name IN ({})", placeholders.join(", ")));
}
