//! Versioned key-value storage and optimistic read-modify-write.

mod backend;
mod error;
mod memory;
mod occ;

pub use backend::{Generation, KvBackend, Versioned};
pub use error::{Result, StoreError};
pub use memory::MemoryKvBackend;
pub use occ::OccStore;
