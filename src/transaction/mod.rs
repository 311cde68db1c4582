// ============================================================================
// Transaction Management Module
// ============================================================================
//
// Single-writer, multi-reader transactions with snapshot isolation over
// the bucket store.
//
// ============================================================================

pub mod change;
pub mod manager;
pub mod state;

pub use change::Change;
pub use manager::Store;
pub use state::{ReadTxn, TransactionId, WriteTxn};
