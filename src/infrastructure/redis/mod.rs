//! Redis infrastructure for the preference store backend.

pub mod pool;

pub use pool::RedisPool;
