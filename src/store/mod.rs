//! Counter store adapters.
//!
//! The store is the only serialization point between concurrent callers,
//! possibly spread over many stateless processes. Its increment must be
//! atomic; everything above it is stateless.

mod memory;
mod redis_store;
#[cfg(test)]
pub(crate) mod testing;

pub use self::memory::MemoryStore;
pub use self::redis_store::RedisStore;

use async_trait::async_trait;
use std::time::Duration;

use crate::error::Result;

/// Counts read back from one increment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BucketCounts {
    /// Count of the current bucket, including the event just recorded
    pub current: u64,
    /// Count of the bucket immediately before it
    pub previous: u64,
}

/// Trait for counter store implementations.
///
/// Every failure (network, timeout, protocol) is reported as
/// [`GuardError::StoreUnavailable`](crate::error::GuardError::StoreUnavailable);
/// an implementation never substitutes a default count.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Increment `current_key` by one and read `previous_key`.
    ///
    /// When the increment creates `current_key`, its expiry is set to
    /// `expiry`. Increment and expiry are indivisible.
    async fn increment(
        &self,
        current_key: &str,
        previous_key: &str,
        expiry: Duration,
    ) -> Result<BucketCounts>;

    /// Remove a key outright.
    async fn delete(&self, key: &str) -> Result<()>;

    /// Round-trip to the store without touching any counter.
    async fn ping(&self) -> Result<()>;
}
