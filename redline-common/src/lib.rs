//! # Redline Common Library
//!
//! Shared code for the Redline reconciliation engine:
//! - Field value and record payload data model
//! - Common error types
//! - Configuration loading and data directory resolution
//! - Timestamp utilities and local-time conversion

pub mod config;
pub mod error;
pub mod fields;
pub mod time;

pub use error::{Error, Result};
pub use fields::{FieldEntry, FieldKind, FieldValue, RecordPayload};
