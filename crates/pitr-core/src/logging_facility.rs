//! Structured logging for the engine.
//!
//! `init(profile)` installs the process-wide subscriber once. Public engine
//! operations report through `log_op_start!`, `log_op_end!` and
//! `log_op_error!`; tests assert on events via `test_capture`.
//!
//! ```rust
//! use pitr_core::logging_facility::{init, Profile};
//!
//! init(Profile::Production);
//! ```

pub mod init;
pub mod macros;
pub mod test_capture;

pub use init::{init, Profile};
pub use test_capture::{init_test_capture, CapturedEvent, TestCapture};
