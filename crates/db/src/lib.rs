mod error;
mod pool;
pub mod repositories;
pub mod store;

pub use error::*;
pub use pool::*;
pub use repositories::*;
pub use store::{KeyValueStore, MemoryStore, SqliteStore};
