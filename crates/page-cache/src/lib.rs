//! In-memory response cache for the page proxy.
//!
//! Entries live for a fixed TTL measured from insertion and are evicted in
//! insertion order once the store is full. [`FifoStore`] is the single-owner
//! store; [`PageCache`] wraps it in a mutex for use from request handlers.

pub mod entry;
pub mod fifo;
pub mod shared;
pub mod stats;

pub use entry::CachedPage;
pub use fifo::FifoStore;
pub use shared::PageCache;
pub use stats::CacheStats;
