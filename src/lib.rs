pub mod checkout;
pub mod config;
pub mod observer;
pub mod progress;
pub mod recover_command;
pub mod refs;
pub mod remote;
pub mod report;
pub mod traverse;
pub mod verify;
pub mod verify_command;

pub use report::{Outcome, RecoveryReport};
pub use traverse::{CancelHandle, Traversal, TraversalOptions, VisitedSet};
