use crate::core::StoreResult;

/// Read side of the keyed store contract.
///
/// Everything the registry and entry layers need from a transaction:
/// point lookups and key enumeration inside a named bucket.
pub trait KvRead {
    /// Fetch the value stored under `key` in `bucket`
    fn get(&self, bucket: &str, key: &str) -> StoreResult<Option<Vec<u8>>>;

    /// Check whether `key` exists in `bucket`
    fn contains(&self, bucket: &str, key: &str) -> StoreResult<bool> {
        Ok(self.get(bucket, key)?.is_some())
    }

    /// All keys of `bucket`, in key order
    fn keys(&self, bucket: &str) -> StoreResult<Vec<String>>;

    /// Check if a bucket exists
    fn has_bucket(&self, bucket: &str) -> bool;
}

/// Write side of the keyed store contract.
///
/// Writes are staged in the transaction and become visible to other
/// transactions only on commit.
pub trait KvWrite: KvRead {
    /// Store `value` under `key`, replacing any previous value
    fn put(&mut self, bucket: &str, key: &str, value: Vec<u8>) -> StoreResult<()>;

    /// Remove `key`; returns whether it existed
    fn delete(&mut self, bucket: &str, key: &str) -> StoreResult<bool>;

    /// Create `bucket` unless it already exists; returns whether it was created
    fn create_bucket_if_missing(&mut self, bucket: &str) -> StoreResult<bool>;
}
