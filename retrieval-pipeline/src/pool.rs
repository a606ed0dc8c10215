use std::{
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use common::error::AppError;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::debug;

/// Fixed-size set of shared resources with checkout/return discipline.
///
/// Each [`PoolLease`] owns one slot exclusively until it is dropped, on any path (success,
/// error, cancelled future). The semaphore counts free slots, so the number of concurrent
/// leases and the number of resources are the same thing.
pub struct ResourcePool<T> {
    resources: Vec<Arc<T>>,
    free: Arc<Mutex<Vec<usize>>>,
    semaphore: Arc<Semaphore>,
    checkout_timeout: Duration,
    label: &'static str,
}

impl<T> ResourcePool<T> {
    pub fn new(
        label: &'static str,
        resources: Vec<T>,
        checkout_timeout: Duration,
    ) -> Result<Self, AppError> {
        if resources.is_empty() {
            return Err(AppError::Validation(format!(
                "{label} pool size must be greater than zero"
            )));
        }

        let size = resources.len();
        Ok(Self {
            resources: resources.into_iter().map(Arc::new).collect(),
            // popped from the back, so slot 0 goes out first
            free: Arc::new(Mutex::new((0..size).rev().collect())),
            semaphore: Arc::new(Semaphore::new(size)),
            checkout_timeout,
            label,
        })
    }

    /// A pool of `size` default resources (at least one).
    pub fn filled(label: &'static str, size: usize, checkout_timeout: Duration) -> Self
    where
        T: Default,
    {
        let size = size.max(1);
        Self {
            resources: (0..size).map(|_| Arc::new(T::default())).collect(),
            free: Arc::new(Mutex::new((0..size).rev().collect())),
            semaphore: Arc::new(Semaphore::new(size)),
            checkout_timeout,
            label,
        }
    }

    pub fn size(&self) -> usize {
        self.resources.len()
    }

    /// Slots not currently checked out.
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Waits for a free slot, up to the configured checkout timeout.
    pub async fn checkout(&self) -> Result<PoolLease<T>, AppError> {
        let permit = tokio::time::timeout(
            self.checkout_timeout,
            self.semaphore.clone().acquire_owned(),
        )
        .await
        .map_err(|_| AppError::Timeout(format!("waiting for a {} connection", self.label)))?
        .map_err(|_| AppError::InternalError(format!("{} pool closed", self.label)))?;

        // A permit guarantees a free slot.
        let slot = self
            .free
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop()
            .ok_or_else(|| AppError::InternalError(format!("{} pool has no free slot", self.label)))?;
        let resource = self
            .resources
            .get(slot)
            .cloned()
            .ok_or_else(|| AppError::InternalError(format!("{} pool is empty", self.label)))?;
        debug!(pool = self.label, slot, "checked out pooled resource");

        Ok(PoolLease {
            slot,
            free: self.free.clone(),
            resource,
            _permit: permit,
        })
    }
}

/// Exclusive lease on one pooled resource.
pub struct PoolLease<T> {
    slot: usize,
    free: Arc<Mutex<Vec<usize>>>,
    resource: Arc<T>,
    // Dropped after the slot is back on the free list.
    _permit: OwnedSemaphorePermit,
}

impl<T> PoolLease<T> {
    pub fn slot(&self) -> usize {
        self.slot
    }
}

impl<T> std::ops::Deref for PoolLease<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.resource
    }
}

impl<T> Drop for PoolLease<T> {
    fn drop(&mut self) {
        self.free
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(self.slot);
    }
}
