//! Object pools for short-lived props.
//!
//! Pools recycle instances instead of reallocating them. Each pool has a
//! prewarmed capacity and a maximum number of instances it keeps; releases
//! beyond that drop the instance.

use glam::Vec3;
use std::collections::{BTreeMap, VecDeque};
use thiserror::Error;
use tracing::{debug, error};

use warden_common::{PoolKey, PooledHandle};

/// Pool operation errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PoolError {
    /// Handle does not belong to this pool
    #[error("handle {0:?} belongs to another pool")]
    WrongPool(PooledHandle),
    /// Slot index is out of range
    #[error("handle {0:?} has no slot")]
    InvalidSlot(PooledHandle),
    /// Slot was already free
    #[error("handle {0:?} was already released")]
    AlreadyReleased(PooledHandle),
}

/// Result type for pool operations.
pub type PoolResult<T> = Result<T, PoolError>;

#[derive(Debug)]
struct Slot<T> {
    value: Option<T>,
    active: bool,
}

/// Pool of reusable `T` instances.
pub struct ObjectPool<T> {
    key: PoolKey,
    slots: Vec<Slot<T>>,
    free: VecDeque<u32>,
    max_size: usize,
    factory: Box<dyn Fn() -> T>,
    active_count: usize,
}

impl<T> std::fmt::Debug for ObjectPool<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectPool")
            .field("key", &self.key)
            .field("active", &self.active_count)
            .field("inactive", &self.inactive_count())
            .field("max_size", &self.max_size)
            .finish_non_exhaustive()
    }
}

impl<T> ObjectPool<T> {
    /// Creates a pool prewarmed with `capacity` instances.
    pub fn new(
        key: PoolKey,
        capacity: usize,
        max_size: usize,
        factory: impl Fn() -> T + 'static,
    ) -> Self {
        let max_size = max_size.max(capacity).max(1);
        let mut pool = Self {
            key,
            slots: Vec::with_capacity(max_size),
            free: VecDeque::with_capacity(max_size),
            max_size,
            factory: Box::new(factory),
            active_count: 0,
        };
        for _ in 0..capacity {
            let index = pool.slots.len() as u32;
            pool.slots.push(Slot {
                value: Some((pool.factory)()),
                active: false,
            });
            pool.free.push_back(index);
        }
        pool
    }

    /// Pool key.
    #[must_use]
    pub const fn key(&self) -> PoolKey {
        self.key
    }

    /// Instances currently checked out.
    #[must_use]
    pub const fn active_count(&self) -> usize {
        self.active_count
    }

    /// Instances kept for reuse.
    #[must_use]
    pub fn inactive_count(&self) -> usize {
        self.free
            .iter()
            .filter(|i| self.slots[**i as usize].value.is_some())
            .count()
    }

    /// Checks out an instance, reusing a free one when possible.
    pub fn get(&mut self) -> PooledHandle {
        let index = match self.free.pop_front() {
            Some(index) => index,
            None => {
                self.slots.push(Slot {
                    value: None,
                    active: false,
                });
                (self.slots.len() - 1) as u32
            },
        };
        let slot = &mut self.slots[index as usize];
        if slot.value.is_none() {
            slot.value = Some((self.factory)());
        }
        slot.active = true;
        self.active_count += 1;
        PooledHandle {
            pool: self.key,
            slot: index,
        }
    }

    /// Checked-out instance behind `handle`.
    #[must_use]
    pub fn get_mut(&mut self, handle: PooledHandle) -> Option<&mut T> {
        if handle.pool != self.key {
            return None;
        }
        let slot = self.slots.get_mut(handle.slot as usize)?;
        if !slot.active {
            return None;
        }
        slot.value.as_mut()
    }

    /// Returns an instance to the pool. Instances beyond the max size are dropped.
    pub fn release(&mut self, handle: PooledHandle) -> PoolResult<()> {
        if handle.pool != self.key {
            return Err(PoolError::WrongPool(handle));
        }
        let kept = self.inactive_count();
        let slot = self
            .slots
            .get_mut(handle.slot as usize)
            .ok_or(PoolError::InvalidSlot(handle))?;
        if !slot.active {
            return Err(PoolError::AlreadyReleased(handle));
        }
        slot.active = false;
        if kept >= self.max_size {
            slot.value = None;
        }
        self.active_count -= 1;
        self.free.push_back(handle.slot);
        Ok(())
    }
}

/// Pools by key.
#[derive(Debug)]
pub struct PoolRegistry<T> {
    pools: BTreeMap<PoolKey, ObjectPool<T>>,
}

impl<T> Default for PoolRegistry<T> {
    fn default() -> Self {
        Self {
            pools: BTreeMap::new(),
        }
    }
}

impl<T> PoolRegistry<T> {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a pool under its key, replacing any previous one.
    pub fn insert(&mut self, pool: ObjectPool<T>) {
        debug!(key = ?pool.key(), "Registered object pool");
        self.pools.insert(pool.key(), pool);
    }

    /// Builder form of [`Self::insert`].
    #[must_use]
    pub fn with_pool(mut self, pool: ObjectPool<T>) -> Self {
        self.insert(pool);
        self
    }

    /// Pool for `key`.
    #[must_use]
    pub fn pool(&self, key: PoolKey) -> Option<&ObjectPool<T>> {
        self.pools.get(&key)
    }

    /// Checks out an instance from the pool for `key`.
    pub fn get(&mut self, key: PoolKey) -> Option<PooledHandle> {
        let Some(pool) = self.pools.get_mut(&key) else {
            error!(?key, "No pool registered for key");
            return None;
        };
        Some(pool.get())
    }

    /// Checked-out instance behind `handle`.
    pub fn get_mut(&mut self, handle: PooledHandle) -> Option<&mut T> {
        self.pools.get_mut(&handle.pool)?.get_mut(handle)
    }

    /// Returns an instance to its pool. Returns false if nothing was released.
    pub fn release(&mut self, handle: PooledHandle) -> bool {
        let Some(pool) = self.pools.get_mut(&handle.pool) else {
            error!(key = ?handle.pool, "No pool registered for key");
            return false;
        };
        match pool.release(handle) {
            Ok(()) => true,
            Err(e) => {
                error!(error = %e, "Pool release failed");
                false
            },
        }
    }
}

/// Spent shell casing ejected by a firearm.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ShellCasing {
    /// Ejection point
    pub position: Vec3,
    /// Initial velocity
    pub velocity: Vec3,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn casings(capacity: usize, max_size: usize) -> ObjectPool<ShellCasing> {
        ObjectPool::new(PoolKey::CASING, capacity, max_size, ShellCasing::default)
    }

    #[test]
    fn test_pool_prewarms_and_reuses() {
        let mut pool = casings(2, 4);
        assert_eq!(pool.inactive_count(), 2);

        let a = pool.get();
        assert_eq!(pool.active_count(), 1);
        assert_eq!(pool.inactive_count(), 1);

        pool.release(a).expect("release");
        let b = pool.get();
        assert_eq!(b.slot, 1);
        let c = pool.get();
        assert_eq!(c.slot, a.slot);
    }

    #[test]
    fn test_pool_grows_and_trims_to_max() {
        let mut pool = casings(1, 2);
        let handles: Vec<_> = (0..4).map(|_| pool.get()).collect();
        assert_eq!(pool.active_count(), 4);
        for h in handles {
            pool.release(h).expect("release");
        }
        assert_eq!(pool.active_count(), 0);
        assert_eq!(pool.inactive_count(), 2);
    }

    #[test]
    fn test_double_release_rejected() {
        let mut pool = casings(1, 1);
        let h = pool.get();
        pool.release(h).expect("release");
        assert_eq!(pool.release(h), Err(PoolError::AlreadyReleased(h)));
    }

    #[test]
    fn test_checked_out_instance_is_mutable() {
        let mut pool = casings(1, 1);
        let h = pool.get();
        if let Some(casing) = pool.get_mut(h) {
            casing.position = Vec3::ONE;
        }
        assert_eq!(pool.get_mut(h).map(|c| c.position), Some(Vec3::ONE));
        pool.release(h).expect("release");
        assert!(pool.get_mut(h).is_none());
    }

    #[test]
    fn test_registry_unknown_key() {
        let mut registry: PoolRegistry<ShellCasing> = PoolRegistry::new();
        assert!(registry.get(PoolKey::new(42)).is_none());
        let stray = PooledHandle {
            pool: PoolKey::new(42),
            slot: 0,
        };
        assert!(!registry.release(stray));

        registry.insert(casings(1, 1));
        let h = registry.get(PoolKey::CASING).expect("casing pool");
        assert!(registry.release(h));
        assert!(!registry.release(h));
    }
}
