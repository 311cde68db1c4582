pub mod config;
pub mod engine;
pub mod memory;
pub mod persistence;

pub use config::StoreConfig;
pub use engine::{KvRead, KvWrite};
pub use memory::MemoryBuckets;
pub use persistence::{DurabilityMode, PersistenceManager, WalRecord};
