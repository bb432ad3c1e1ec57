//! Core contracts for Stowage: persisters for named file content and keepers for secrets.
//! Concrete disk and keychain backends live in `stowage-storage`; this crate only carries
//! the traits, the shared lifecycle/error types, and in-memory doubles.

pub mod error;
pub mod identity;
pub mod lifecycle;
pub mod paths;
pub mod persister;
pub mod secrets;

pub use error::StorageError;
pub use identity::{Identifiable, Identity};
pub use lifecycle::{Connection, ConnectionSlot, LifecycleState};
