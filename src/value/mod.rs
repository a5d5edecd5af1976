//! Typed result values
//!
//! This module defines the closed set of logical value kinds used by every
//! exporter, the column schema of a result set, and the coercion that
//! narrows raw driver values into that set.

pub mod coercion;
pub mod schema;
pub mod types;

pub use coercion::{DriverType, TypeClass, coerce, resolve_type};
pub use schema::{Column, ColumnSchema, Row};
pub use types::{Decimal, LogicalType, Temporal, Value};
