// SQLite-backed key-value cache
// Holds recent release lists and the weekly summaries

pub mod cache;

pub use cache::{CacheError, CacheManager, Result};
