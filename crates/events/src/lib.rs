//! Event system for the orchestration engine
//!
//! This crate provides the event bus and event types used to stream job and
//! step progress to observers.

mod bus;
mod types;

pub use bus::{ClientHandle, CloseFn, EventBus, SendError, Subscription, DEFAULT_CAPACITY};
pub use types::*;
