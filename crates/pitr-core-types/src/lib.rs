//! Core types shared across PITR facilities
//!
//! Used by both the error and logging facilities:
//!
//! - **Correlation**: `RequestId`
//! - **Schema constants**: canonical field keys and event names

pub mod correlation;
pub mod schema;

pub use correlation::RequestId;
