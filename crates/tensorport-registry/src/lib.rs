//! Lifetime registry for objects reachable from the host side.
//!
//! The host never sees a native pointer; every object it can reach is owned
//! here and addressed by an opaque [`Handle`]. Resolution is a validated
//! lookup, so a stale or fabricated handle is a reportable error instead of
//! undefined behavior.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use thiserror::Error;
use tracing::trace;

/// Opaque, boundary-stable identifier for one registry-owned object.
///
/// Carries no type information visible to the host. Zero is never issued.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct Handle(pub u64);

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("invalid handle {0}: unknown, already released, or of a different type")]
    InvalidHandle(Handle),
}

/// Maps handles to shared-owned objects of arbitrary type.
///
/// Injectable rather than global: the boundary crate holds one per-process
/// instance, tests construct their own.
pub struct Registry {
    entries: RwLock<HashMap<u64, Arc<dyn Any + Send + Sync>>>,
    next_id: AtomicU64,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Takes ownership of a newly created object and returns a fresh handle.
    /// Once this returns, the handle resolves from any thread.
    pub fn add<T: Send + Sync + 'static>(&self, object: T) -> Handle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.entries
            .write()
            .unwrap()
            .insert(id, Arc::new(object));
        trace!(handle = id, "registered object");
        Handle(id)
    }

    /// Resolves a handle for shared read access.
    pub fn access<T: Send + Sync + 'static>(&self, handle: Handle) -> Result<Arc<T>, RegistryError> {
        let entries = self.entries.read().unwrap();
        let entry = entries
            .get(&handle.0)
            .ok_or(RegistryError::InvalidHandle(handle))?;
        Arc::clone(entry)
            .downcast::<T>()
            .map_err(|_| RegistryError::InvalidHandle(handle))
    }

    /// Erases the mapping. Outstanding `Arc` clones handed out by `access`
    /// keep the object alive until they drop; the handle itself is dead
    /// immediately, and releasing it again is `InvalidHandle`.
    pub fn release(&self, handle: Handle) -> Result<(), RegistryError> {
        self.entries
            .write()
            .unwrap()
            .remove(&handle.0)
            .map(|_| ())
            .ok_or(RegistryError::InvalidHandle(handle))?;
        trace!(handle = handle.0, "released object");
        Ok(())
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.entries.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_then_access_round_trips() {
        let registry = Registry::new();
        let handle = registry.add(String::from("payload"));
        let value = registry.access::<String>(handle).unwrap();
        assert_eq!(*value, "payload");
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn never_issued_handle_is_invalid() {
        let registry = Registry::new();
        let err = registry.access::<String>(Handle(42)).unwrap_err();
        assert_eq!(err, RegistryError::InvalidHandle(Handle(42)));
        assert!(registry.is_empty());
    }

    #[test]
    fn wrong_type_access_is_invalid() {
        let registry = Registry::new();
        let handle = registry.add(7u64);
        let err = registry.access::<String>(handle).unwrap_err();
        assert_eq!(err, RegistryError::InvalidHandle(handle));
        // The entry itself is untouched.
        assert_eq!(*registry.access::<u64>(handle).unwrap(), 7);
    }

    #[test]
    fn release_erases_and_double_release_fails() {
        let registry = Registry::new();
        let handle = registry.add(vec![1, 2, 3]);
        registry.release(handle).unwrap();
        assert!(registry.is_empty());
        assert_eq!(
            registry.release(handle).unwrap_err(),
            RegistryError::InvalidHandle(handle)
        );
        assert!(registry.access::<Vec<i32>>(handle).is_err());
    }

    #[test]
    fn outstanding_access_survives_release() {
        let registry = Registry::new();
        let handle = registry.add(String::from("kept alive"));
        let held = registry.access::<String>(handle).unwrap();
        registry.release(handle).unwrap();
        assert_eq!(*held, "kept alive");
    }

    #[test]
    fn concurrent_adds_yield_distinct_resolvable_handles() {
        let registry = std::sync::Arc::new(Registry::new());
        let mut workers = Vec::new();
        for worker in 0..8 {
            let registry = std::sync::Arc::clone(&registry);
            workers.push(std::thread::spawn(move || {
                (0..100)
                    .map(|i| (registry.add(worker * 1000 + i), worker * 1000 + i))
                    .collect::<Vec<_>>()
            }));
        }

        let mut seen = std::collections::HashSet::new();
        for worker in workers {
            for (handle, expected) in worker.join().unwrap() {
                assert!(seen.insert(handle), "duplicate handle {handle}");
                assert_eq!(*registry.access::<i32>(handle).unwrap(), expected);
            }
        }
        assert_eq!(registry.len(), 800);
    }
}
