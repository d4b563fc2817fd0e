mod health;
mod jobs;
pub mod sse;

pub use health::*;
pub use jobs::*;
