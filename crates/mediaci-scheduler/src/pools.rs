//! Worker-pool leasing.
//!
//! Each pool admits as many concurrent leases as the sum of its workers'
//! `max_builds`. A lease names the worker its commands run on and gives the
//! slot back when dropped.

use mediaci_core::registry::Registry;
use mediaci_core::{Error, Result};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::debug;

#[derive(Debug)]
struct Pool {
    name: String,
    capacity: usize,
    semaphore: Arc<Semaphore>,
    slots: Mutex<VecDeque<String>>,
}

impl Pool {
    fn push_slot(&self, worker: String) {
        self.slots
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(worker);
    }

    fn pop_slot(&self) -> Option<String> {
        self.slots
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
    }
}

/// Exclusive use of one worker slot.
#[derive(Debug)]
pub struct WorkerLease {
    worker: String,
    pool: Arc<Pool>,
    _permit: OwnedSemaphorePermit,
}

impl WorkerLease {
    pub fn worker(&self) -> &str {
        &self.worker
    }

    pub fn pool(&self) -> &str {
        &self.pool.name
    }
}

impl Drop for WorkerLease {
    fn drop(&mut self) {
        debug!(pool = %self.pool.name, worker = %self.worker, "Releasing worker");
        self.pool.push_slot(self.worker.clone());
    }
}

/// Leasable worker pools, built from the registry.
#[derive(Debug, Clone, Default)]
pub struct WorkerPools {
    pools: HashMap<String, Arc<Pool>>,
}

impl WorkerPools {
    pub fn from_registry(registry: &Registry) -> Self {
        let pools = registry
            .pools()
            .map(|(name, workers)| {
                // Interleave so the first leases spread across workers.
                let rounds = workers.iter().map(|w| w.max_builds).max().unwrap_or(0);
                let mut slots = VecDeque::new();
                for round in 0..rounds {
                    for worker in workers.iter().filter(|w| w.max_builds > round) {
                        slots.push_back(worker.name.clone());
                    }
                }
                let capacity = slots.len();
                let pool = Pool {
                    name: name.to_string(),
                    capacity,
                    semaphore: Arc::new(Semaphore::new(capacity)),
                    slots: Mutex::new(slots),
                };
                (name.to_string(), Arc::new(pool))
            })
            .collect();
        Self { pools }
    }

    fn pool(&self, name: &str) -> Result<&Arc<Pool>> {
        self.pools
            .get(name)
            .ok_or_else(|| Error::UnknownPool(name.to_string()))
    }

    /// Wait for a free worker slot in `pool`.
    pub async fn acquire(&self, pool: &str) -> Result<WorkerLease> {
        let pool = self.pool(pool)?.clone();
        let permit = pool
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| Error::Internal(format!("worker pool {} closed", pool.name)))?;
        let worker = pool
            .pop_slot()
            .ok_or_else(|| Error::Internal(format!("worker pool {} has no free slot", pool.name)))?;
        debug!(pool = %pool.name, worker = %worker, "Leased worker");
        Ok(WorkerLease {
            worker,
            pool,
            _permit: permit,
        })
    }

    /// Total concurrent leases a pool admits.
    pub fn capacity(&self, pool: &str) -> Result<usize> {
        Ok(self.pool(pool)?.capacity)
    }

    /// Leases currently available without waiting.
    pub fn available(&self, pool: &str) -> Result<usize> {
        Ok(self.pool(pool)?.semaphore.available_permits())
    }
}
