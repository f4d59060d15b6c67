//! Context interpolation and field-type model shared across the flux workspace.
//!
//! A workflow specification's parameters are plain JSON trees sprinkled with
//! `${dotted.path}` references into a run-time [`Context`]. This crate owns
//! the interpolation walk and the typed field descriptors used to validate a
//! request's form schema.

mod context;
mod field;
mod interpolate;

pub use context::{merge_values, Context};
pub use field::FieldKind;
pub use interpolate::{interpolate_value, InterpolationError};

pub use serde_json::Value;
