//! Request engine: the human-in-the-loop form state machine that parallels
//! the workflow engine's Run state machine.

mod error;
mod notify;
mod reassign;
mod slots;
mod state;
mod subject;

pub use error::OperationError;
pub use notify::{
    EmailNotifier, EmailSender, ExternalUrlMinter, NoopEmailSender, NullUrlMinter, RequestNotifier,
    StaticSubjectDirectory,
};
pub use reassign::{dispatch_reassignment_effects, reassign_assignee};
pub use slots::{
    construct_product, generate_entities, generate_form, setup_slots, EntityDirectory, FormSpec,
    NullEntityDirectory, SlotSpec, SlotTypeDescriptor,
};
pub use state::{update_status, ProposedMessage};
pub use subject::{Subject, SubjectDirectory};
