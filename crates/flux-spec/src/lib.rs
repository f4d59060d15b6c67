//! Workflow specification DSL: parsing, structural verification, and the
//! linear-chain generator consumed by the `Workflow — generate` resource.

mod action;
mod error;
mod generate;
mod rule;
mod spec;

pub use action::Action;
pub use error::{SpecError, ValidationError};
pub use generate::GenerateStep;
pub use rule::{Rule, RuleList};
pub use spec::{Layout, LayoutElement, ProductSpec, StepSpec, WorkflowSpec};
