//! formvis-interchange: typed inputs for the visibility engine.
//!
//! Provides the form schema types (fields, options, option groups) and the
//! heading-baseline record type, with lenient deserialization from
//! `serde_json::Value`. The evaluator depends on this crate for initial
//! JSON parsing and builds its own indexes on top.

pub mod deserialize;
pub mod types;

pub use deserialize::{
    parse_form_schema, parse_heading_records, scalar_to_string, stable_index, InterchangeError,
};
pub use types::*;
