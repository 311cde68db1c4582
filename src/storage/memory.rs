use crate::core::{StoreError, StoreResult};
use crate::transaction::Change;
use im::OrdMap;
use serde::{Deserialize, Serialize};

type Bucket = OrdMap<String, Vec<u8>>;

/// Named buckets of ordered key/value pairs.
///
/// Backed by persistent maps, so `clone` is O(1) and shares structure:
/// every transaction gets its own copy without copying the data.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryBuckets {
    buckets: OrdMap<String, Bucket>,
}

impl MemoryBuckets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_bucket(&self, name: &str) -> bool {
        self.buckets.contains_key(name)
    }

    /// Create an empty bucket; returns `false` if it already existed
    pub fn create_bucket(&mut self, name: &str) -> bool {
        if self.buckets.contains_key(name) {
            return false;
        }
        self.buckets.insert(name.to_string(), Bucket::new());
        true
    }

    pub fn get(&self, bucket: &str, key: &str) -> StoreResult<Option<&Vec<u8>>> {
        Ok(self.bucket(bucket)?.get(key))
    }

    pub fn keys(&self, bucket: &str) -> StoreResult<Vec<String>> {
        Ok(self.bucket(bucket)?.keys().cloned().collect())
    }

    pub fn put(&mut self, bucket: &str, key: &str, value: Vec<u8>) -> StoreResult<()> {
        self.bucket_mut(bucket)?.insert(key.to_string(), value);
        Ok(())
    }

    pub fn delete(&mut self, bucket: &str, key: &str) -> StoreResult<bool> {
        Ok(self.bucket_mut(bucket)?.remove(key).is_some())
    }

    /// Apply a committed change (WAL replay)
    pub fn apply(&mut self, change: &Change) -> StoreResult<()> {
        match change {
            Change::CreateBucket { bucket } => {
                self.create_bucket(bucket);
            }
            Change::Put { bucket, key, value } => self.put(bucket, key, value.clone())?,
            Change::Delete { bucket, key } => {
                self.delete(bucket, key)?;
            }
        }
        Ok(())
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    pub fn key_count(&self) -> usize {
        self.buckets.values().map(|b| b.len()).sum()
    }

    fn bucket(&self, name: &str) -> StoreResult<&Bucket> {
        self.buckets
            .get(name)
            .ok_or_else(|| StoreError::BucketNotFound(name.to_string()))
    }

    fn bucket_mut(&mut self, name: &str) -> StoreResult<&mut Bucket> {
        self.buckets
            .get_mut(name)
            .ok_or_else(|| StoreError::BucketNotFound(name.to_string()))
    }
}
