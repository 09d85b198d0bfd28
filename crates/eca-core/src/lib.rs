//! Core types shared across the ECA engine
//!
//! This crate provides the fundamental types used throughout the engine:
//! events carried on the event bus, the payload value model, and the
//! injected clock that makes all timing deterministic in tests.

pub mod clock;
pub mod event;
pub mod value;

pub use clock::{Clock, SharedClock, SystemClock};
pub use event::{Event, EventName};
pub use value::Value;
