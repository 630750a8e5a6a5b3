//! Column encodings shared by the repositories.
//!
//! Timestamps are stored as Unix milliseconds, structured values as JSON
//! text.

#![allow(clippy::result_large_err)]

use crate::errors::{serialization_error, Result};
use chrono::{DateTime, TimeZone, Utc};
use pitr_core::errors::{ExError, ExErrorKind};
use serde::de::DeserializeOwned;
use serde::Serialize;

pub fn to_millis(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_millis()
}

pub fn from_millis(ms: i64) -> Result<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms).single().ok_or_else(|| {
        ExError::new(ExErrorKind::Serialization)
            .with_op("from_millis")
            .with_message(format!("timestamp out of range: {}", ms))
    })
}

pub fn opt_from_millis(ms: Option<i64>) -> Result<Option<DateTime<Utc>>> {
    ms.map(from_millis).transpose()
}

pub fn to_json<T: Serialize + ?Sized>(op: &str, value: &T) -> Result<String> {
    serde_json::to_string(value).map_err(|e| serialization_error(op, e))
}

pub fn from_json<T: DeserializeOwned>(op: &str, text: &str) -> Result<T> {
    serde_json::from_str(text).map_err(|e| serialization_error(op, e))
}

pub fn opt_from_json<T: DeserializeOwned>(op: &str, text: Option<String>) -> Result<Option<T>> {
    text.map(|t| from_json(op, &t)).transpose()
}

/// Core parse failures on stored tags become serialization errors here.
pub fn core_err(op: &str) -> impl Fn(pitr_core::PitrError) -> ExError + '_ {
    move |e| ExError::from(e).with_op(op.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_millis_round_trip_keeps_precision() {
        let ts = Utc.timestamp_millis_opt(1_700_000_000_123).unwrap();
        assert_eq!(from_millis(to_millis(ts)).unwrap(), ts);
    }
}
