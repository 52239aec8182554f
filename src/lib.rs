//! Reactive form-state engine: wraps arbitrary model objects in forms that
//! track dirtiness, validity, submission progress, and error visibility, and
//! aggregate the same state recursively from connected sub-models.

mod binding;
mod config;
mod delegation;
mod field;
mod form;
mod registry;
mod scheduler;
mod signal;
mod submit;


pub use binding::{BindTarget, Binding, BindingContext, BindingId};
pub use config::{DEFAULT_VALIDATION_DEBOUNCE, FormOptions};
pub use delegation::{
    ConnectFn, Connected, Delegation, FormModel, SubjectRef, SubmitFn, SubmitFuture, ValidateFn,
    ValidationFuture, ValidationReport, resolve_delegation,
};
pub use field::FormField;
pub use form::{FieldKey, Form, FormError, FormId, FormResult, FormSnapshot};
pub use registry::{FormKey, FormRegistry};
pub use scheduler::ValidateStatus;
pub use signal::ChangeSignal;
pub use submit::SubmitOptions;
