pub mod error;
pub mod id;
pub mod sorted_ids;
pub mod types;

pub use error::{Conflict, Result, RingError, StoreError, StoreResult};
pub use id::generate_id;
pub use sorted_ids::SortedIds;
pub use types::EntryKind;
