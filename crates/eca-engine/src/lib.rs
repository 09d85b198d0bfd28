//! Rule execution for the ECA engine
//!
//! This crate hosts everything that runs rules once they have matched:
//!
//! - [`Service`] - the injected side-effect collaborator boundary
//! - [`ActionExecutor`] - sequential interpretation of a rule's action tree
//!   with cooperative cancellation
//! - [`RuleScheduler`] - per-rule run state and concurrency modes
//! - [`Engine`] - the composition root and event-consumption loop
//!
//! The declarative rule model and the pure matching machinery live in
//! `eca-automation`; this crate is the side that spawns tasks.

pub mod engine;
pub mod executor;
pub mod scheduler;
pub mod service;

pub use engine::Engine;
pub use executor::{ActionExecutor, RunOutcome};
pub use scheduler::RuleScheduler;
pub use service::{NullService, Service, ServiceError, ServiceResult, SharedService};
