//! Object store boundary for finished recordings
//!
//! The engine only ever calls `put`; retries, lifecycle rules and access
//! control belong to the store itself.

mod keys;
mod store;

pub use keys::{
    sanitize_segment, ArtifactKind, OutputKeys, KEY_PREFIX, UNAUTHENTICATED_PROVIDER,
    UNKNOWN_EMPLOYEE,
};
pub use store::{FsObjectStore, MemoryObjectStore, ObjectStore, StoredObject};
