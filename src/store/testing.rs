//! Store doubles for exercising failure handling.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use super::{BucketCounts, CounterStore, MemoryStore};
use crate::error::{GuardError, Result};

/// Fails every call.
#[derive(Debug, Default)]
pub(crate) struct FailingStore {
    pub calls: AtomicUsize,
}

#[async_trait]
impl CounterStore for FailingStore {
    async fn increment(&self, _: &str, _: &str, _: Duration) -> Result<BucketCounts> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(GuardError::StoreUnavailable("connection refused".to_string()))
    }

    async fn delete(&self, _: &str) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(GuardError::StoreUnavailable("connection refused".to_string()))
    }

    async fn ping(&self) -> Result<()> {
        Err(GuardError::StoreUnavailable("connection refused".to_string()))
    }
}

/// Delegates to a [`MemoryStore`] but never answers for keys containing
/// `stall_on`.
#[derive(Debug)]
pub(crate) struct StallingStore {
    pub inner: MemoryStore,
    pub stall_on: String,
}

impl StallingStore {
    pub fn new(stall_on: &str) -> Self {
        Self {
            inner: MemoryStore::new(),
            stall_on: stall_on.to_string(),
        }
    }
}

#[async_trait]
impl CounterStore for StallingStore {
    async fn increment(
        &self,
        current_key: &str,
        previous_key: &str,
        expiry: Duration,
    ) -> Result<BucketCounts> {
        if current_key.contains(&self.stall_on) {
            std::future::pending::<()>().await;
        }
        self.inner.increment(current_key, previous_key, expiry).await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.inner.delete(key).await
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}
