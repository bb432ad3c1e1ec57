use std::{
    fmt,
    ops::Deref,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use serde::{Deserialize, Serialize};

use crate::error::StorageError;

/// Lifecycle every persister and keeper moves through, in order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleState {
    #[default]
    Uninitialized,
    Ready,
    Closed,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            LifecycleState::Uninitialized => "uninitialized",
            LifecycleState::Ready => "ready",
            LifecycleState::Closed => "closed",
        };
        f.write_str(label)
    }
}

/// Typed handle to the resource backing a storage entity.
///
/// Handles are cheap clones of a shared reference. The resource is dropped once the
/// owning [`ConnectionSlot`] is closed and the last outstanding handle goes away.
#[derive(Debug)]
pub struct Connection<C> {
    inner: Arc<C>,
}

impl<C> Connection<C> {
    /// Number of live references to the resource, including the slot's own.
    pub fn ref_count(this: &Self) -> usize {
        Arc::strong_count(&this.inner)
    }
}

impl<C> Clone for Connection<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C> Deref for Connection<C> {
    type Target = C;

    fn deref(&self) -> &C {
        &self.inner
    }
}

#[derive(Debug)]
enum Slot<C> {
    Uninitialized,
    Ready(Arc<C>),
    Closed,
}

/// Lifecycle state plus the resource it guards. Shared by every backend so that
/// init/close/connection behave identically across implementations.
#[derive(Debug)]
pub struct ConnectionSlot<C> {
    inner: Mutex<Slot<C>>,
}

impl<C> Default for ConnectionSlot<C> {
    fn default() -> Self {
        Self {
            inner: Mutex::new(Slot::Uninitialized),
        }
    }
}

impl<C> ConnectionSlot<C> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> LifecycleState {
        match &*self.lock() {
            Slot::Uninitialized => LifecycleState::Uninitialized,
            Slot::Ready(_) => LifecycleState::Ready,
            Slot::Closed => LifecycleState::Closed,
        }
    }

    /// Fail unless the slot can still be opened. Backends call this before doing
    /// expensive setup so a closed entity never touches its backing store again.
    pub fn check_openable(&self) -> Result<(), StorageError> {
        match &*self.lock() {
            Slot::Closed => Err(StorageError::Closed),
            _ => Ok(()),
        }
    }

    /// Move to `Ready` holding `resource`. Already-ready slots keep their current
    /// resource and drop the new one; closed slots cannot be reopened.
    pub fn open(&self, resource: C) -> Result<(), StorageError> {
        let mut slot = self.lock();
        match &*slot {
            Slot::Uninitialized => {
                *slot = Slot::Ready(Arc::new(resource));
                Ok(())
            }
            Slot::Ready(_) => Ok(()),
            Slot::Closed => Err(StorageError::Closed),
        }
    }

    pub fn acquire(&self) -> Result<Connection<C>, StorageError> {
        match &*self.lock() {
            Slot::Ready(resource) => Ok(Connection {
                inner: Arc::clone(resource),
            }),
            Slot::Uninitialized => Err(StorageError::NotInitialized),
            Slot::Closed => Err(StorageError::Closed),
        }
    }

    /// Move to `Closed` from any state, returning the resource if one was held.
    pub fn close(&self) -> Option<Connection<C>> {
        let mut slot = self.lock();
        match std::mem::replace(&mut *slot, Slot::Closed) {
            Slot::Ready(inner) => Some(Connection { inner }),
            _ => None,
        }
    }

    // A panic while holding the lock cannot leave the enum half-written.
    fn lock(&self) -> MutexGuard<'_, Slot<C>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
