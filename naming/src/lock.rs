//! Per-node reader/writer locks and the path-level acquisition protocol.
//!
//! Each tree node owns a [`NodeLock`]: a binary resource semaphore held by
//! the active writer or, collectively, by concurrent readers (the first
//! reader takes the permit, the last returns it), plus a reader-counter
//! mutex. Late readers queue on the counter mutex behind a first reader that
//! is still waiting for the resource, so a node's readers and writers never
//! interleave incorrectly.
//!
//! A [`LockChain`] is a resolved path: every strict ancestor's lock plus the
//! target's. Acquisition takes the ancestors in shared mode top-down and
//! then the target in the requested mode; release is the exact reverse. A
//! failure mid-acquisition releases whatever was already taken.

use common::DfsError;
use std::sync::Arc;
use tokio::sync::{Mutex, Semaphore};
use tracing::warn;

pub struct NodeLock {
    resource: Semaphore,
    readers: Mutex<usize>,
}

impl NodeLock {
    pub fn new() -> Self {
        NodeLock { resource: Semaphore::new(1), readers: Mutex::new(0) }
    }

    pub async fn acquire(&self, exclusive: bool) -> Result<(), DfsError> {
        if exclusive {
            return self.take_resource().await;
        }

        let mut readers = self.readers.lock().await;
        *readers += 1;
        if *readers == 1 {
            if let Err(err) = self.take_resource().await {
                *readers -= 1;
                return Err(err);
            }
        }
        Ok(())
    }

    pub async fn release(&self, exclusive: bool) {
        if exclusive {
            self.resource.add_permits(1);
            return;
        }

        let mut readers = self.readers.lock().await;
        if *readers == 0 {
            warn!("shared unlock with no readers; ignoring");
            return;
        }
        *readers -= 1;
        if *readers == 0 {
            self.resource.add_permits(1);
        }
    }

    pub async fn reader_count(&self) -> usize {
        *self.readers.lock().await
    }

    async fn take_resource(&self) -> Result<(), DfsError> {
        match self.resource.acquire().await {
            Ok(permit) => {
                permit.forget();
                Ok(())
            }
            Err(_) => Err(DfsError::IllegalState("node lock closed".to_string())),
        }
    }
}

impl Default for NodeLock {
    fn default() -> Self {
        NodeLock::new()
    }
}

/// The locks along one resolved path: strict ancestors (root first) and the
/// target itself.
pub struct LockChain {
    pub ancestors: Vec<Arc<NodeLock>>,
    pub target: Arc<NodeLock>,
}

impl LockChain {
    /// Ancestors shared top-down, then the target in the requested mode.
    pub async fn acquire(&self, exclusive: bool) -> Result<(), DfsError> {
        for (taken, ancestor) in self.ancestors.iter().enumerate() {
            if let Err(err) = ancestor.acquire(false).await {
                release_shared(&self.ancestors[..taken]).await;
                return Err(err);
            }
        }
        if let Err(err) = self.target.acquire(exclusive).await {
            release_shared(&self.ancestors).await;
            return Err(err);
        }
        Ok(())
    }

    /// Target first, then ancestors bottom-up.
    pub async fn release(&self, exclusive: bool) {
        self.target.release(exclusive).await;
        release_shared(&self.ancestors).await;
    }
}

async fn release_shared(locks: &[Arc<NodeLock>]) {
    for lock in locks.iter().rev() {
        lock.release(false).await;
    }
}
