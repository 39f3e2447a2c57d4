//! Traits the port mapping service is written against.
//!
//! `primary` ports are driven by callers (CLI, runtime), `secondary` ports
//! are the collaborators the service drives (rule engine, allocation table,
//! metrics).
#![forbid(unsafe_code)]

pub mod primary;
pub mod secondary;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
