pub mod backend;
pub mod error;
pub mod memory;

#[cfg(feature = "rocksdb")]
pub mod rocks;

pub use backend::AdjudicationStore;
pub use error::{Result, StorageError};
pub use memory::MemoryBackend;

#[cfg(feature = "rocksdb")]
pub use rocks::RocksBackend;
