//! Operation lifecycle macros.
//!
//! Every event carries `component` (the calling module), `op` and `event`.
//! Extra `key = value` fields pass straight through to `tracing`.

/// Operation started.
///
/// ```
/// # use pitr_core::log_op_start;
/// log_op_start!("create_snapshot", tenant_id = "t1");
/// ```
#[macro_export]
macro_rules! log_op_start {
    ($op:expr $(, $($field:tt)*)?) => {
        tracing::info!(
            component = module_path!(),
            op = $op,
            event = $crate::pitr_core_types::schema::EVENT_START,
            $($($field)*)?
        )
    };
}

/// Operation finished; `duration_ms` is required.
///
/// ```
/// # use pitr_core::log_op_end;
/// log_op_end!("create_snapshot", duration_ms = 42, snapshot_id = "s1");
/// ```
#[macro_export]
macro_rules! log_op_end {
    ($op:expr, duration_ms = $duration:expr $(, $($field:tt)*)?) => {
        tracing::info!(
            component = module_path!(),
            op = $op,
            event = $crate::pitr_core_types::schema::EVENT_END,
            duration_ms = $duration,
            $($($field)*)?
        )
    };
}

/// Operation failed. `$err` is anything convertible into `ExError`; its
/// stable code lands in `err.code`.
///
/// ```
/// # use pitr_core::log_op_error;
/// # use pitr_core::errors::{ExError, ExErrorKind};
/// let err = ExError::new(ExErrorKind::NotFound);
/// log_op_error!("get_snapshot", err, duration_ms = 10);
/// ```
#[macro_export]
macro_rules! log_op_error {
    ($op:expr, $err:expr, duration_ms = $duration:expr $(, $($field:tt)*)?) => {{
        let failure: $crate::errors::ExError = $err.into();
        tracing::error!(
            component = module_path!(),
            op = $op,
            event = $crate::pitr_core_types::schema::EVENT_END_ERROR,
            duration_ms = $duration,
            err.code = failure.code(),
            err.message = failure.message(),
            $($($field)*)?
        );
    }};
}
