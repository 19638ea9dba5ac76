pub mod cache;
mod queue;
mod shutdown;

pub use cache::{CacheData, CacheEffect, CacheEvent, Cached, QueryCache};
pub use queue::{BroadcastQueue, Queue};
pub use shutdown::Shutdown;
