//! Fixed-capacity object pools
//!
//! The hub sizes its entry and sample pools once at startup. A pool does not
//! own the objects it accounts for: each allocation takes a [`PoolLease`]
//! which is stored inside the object and gives its slot back when dropped.
//!
//! What happens on exhaustion is decided by [`ExhaustionPolicy`]:
//! - `Recoverable`: the allocation fails with [`HubError::OutOfMemory`]
//! - `Fatal`: the process is brought down, since a host sized for the
//!   workload only runs out of slots when something leaks

use serde::{Deserialize, Serialize};
use std::cell::Cell;
use std::fmt;
use std::rc::Rc;
use tracing::{error, warn};

use crate::error::{HubError, Result};

/// What an allocation does when its pool is full
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExhaustionPolicy {
    /// Return `OutOfMemory` to the caller
    Recoverable,
    /// Log and panic
    Fatal,
}

impl Default for ExhaustionPolicy {
    fn default() -> Self {
        Self::Fatal
    }
}

/// A counting pool with a hard capacity
#[derive(Clone)]
pub struct Pool {
    name: &'static str,
    capacity: usize,
    policy: ExhaustionPolicy,
    in_use: Rc<Cell<usize>>,
}

impl Pool {
    pub fn new(name: &'static str, capacity: usize, policy: ExhaustionPolicy) -> Self {
        Self {
            name,
            capacity,
            policy,
            in_use: Rc::new(Cell::new(0)),
        }
    }

    /// Take one slot from the pool
    pub fn acquire(&self) -> Result<PoolLease> {
        let used = self.in_use.get();
        if used >= self.capacity {
            match self.policy {
                ExhaustionPolicy::Recoverable => {
                    warn!(pool = self.name, capacity = self.capacity, "Pool exhausted");
                    return Err(HubError::OutOfMemory(self.name));
                }
                ExhaustionPolicy::Fatal => {
                    error!(pool = self.name, capacity = self.capacity, "Pool exhausted");
                    panic!("{} pool exhausted ({} objects)", self.name, self.capacity);
                }
            }
        }
        self.in_use.set(used + 1);
        Ok(PoolLease {
            in_use: self.in_use.clone(),
        })
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn in_use(&self) -> usize {
        self.in_use.get()
    }

    pub fn policy(&self) -> ExhaustionPolicy {
        self.policy
    }
}

impl fmt::Debug for Pool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("name", &self.name)
            .field("capacity", &self.capacity)
            .field("in_use", &self.in_use.get())
            .field("policy", &self.policy)
            .finish()
    }
}

/// One occupied pool slot, released on drop
pub struct PoolLease {
    in_use: Rc<Cell<usize>>,
}

impl Drop for PoolLease {
    fn drop(&mut self) {
        self.in_use.set(self.in_use.get().saturating_sub(1));
    }
}

impl fmt::Debug for PoolLease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PoolLease")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lease_returns_slot_on_drop() {
        let pool = Pool::new("test", 2, ExhaustionPolicy::Recoverable);
        let a = pool.acquire().unwrap();
        let _b = pool.acquire().unwrap();
        assert_eq!(pool.in_use(), 2);

        drop(a);
        assert_eq!(pool.in_use(), 1);
        assert!(pool.acquire().is_ok());
    }

    #[test]
    fn test_recoverable_exhaustion() {
        let pool = Pool::new("test", 1, ExhaustionPolicy::Recoverable);
        let _a = pool.acquire().unwrap();
        assert_eq!(pool.acquire().unwrap_err(), HubError::OutOfMemory("test"));
    }

    #[test]
    #[should_panic(expected = "test pool exhausted")]
    fn test_fatal_exhaustion() {
        let pool = Pool::new("test", 1, ExhaustionPolicy::Fatal);
        let _a = pool.acquire().unwrap();
        let _ = pool.acquire();
    }
}
