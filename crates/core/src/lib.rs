//! Domain types shared by every stackforge crate: jobs, steps, commands and
//! the default build plan.

pub mod domain;
pub mod error;
pub mod plan;

pub use domain::*;
pub use error::{validate_description, CoreError};
