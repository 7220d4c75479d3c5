//! `steps` crate: the `ExecutableStep` trait, the step-scoped context view,
//! step errors, and structural contracts.
//!
//! Every step must implement [`ExecutableStep`]. The engine crate dispatches
//! execution through this trait object.

pub mod contract;
pub mod error;
pub mod mock;
pub mod traits;

pub use contract::{Contract, ContractViolation, Field};
pub use error::{StepError, StepErrorKind};
pub use traits::{to_output, ExecutableStep, StepContext, TRIGGER};
