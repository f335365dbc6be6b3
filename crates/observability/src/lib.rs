//! Tracing/logging setup shared by the ERP client binaries.

pub mod tracing;

pub use crate::tracing::{LogFormat, init, init_with};
