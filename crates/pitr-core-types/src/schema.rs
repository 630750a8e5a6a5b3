//! Field keys and event markers shared by the logging macros, the test
//! capture layer and the worker.

/// Module that emitted the event
pub const FIELD_COMPONENT: &str = "component";
/// Public operation name, e.g. `execute_rollback`
pub const FIELD_OP: &str = "op";
/// Lifecycle marker, one of the `EVENT_*` values
pub const FIELD_EVENT: &str = "event";
pub const FIELD_DURATION_MS: &str = "duration_ms";
pub const FIELD_REQUEST_ID: &str = "request_id";

pub const FIELD_TENANT_ID: &str = "tenant_id";
pub const FIELD_SNAPSHOT_ID: &str = "snapshot_id";
pub const FIELD_ROLLBACK_ID: &str = "rollback_id";
/// Executor state after a transition
pub const FIELD_STATUS: &str = "status";

pub const FIELD_ERR_CODE: &str = "err.code";
pub const FIELD_ERR_MESSAGE: &str = "err.message";

pub const EVENT_START: &str = "start";
pub const EVENT_END: &str = "end";
pub const EVENT_END_ERROR: &str = "end_error";
