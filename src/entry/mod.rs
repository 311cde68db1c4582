//! Entry persistence shared by every entity kind.
//!
//! An entity is stored as one MessagePack blob under its id in the bucket
//! of its kind. Registration, loading, saving and guarded deletion are
//! default methods of [`Entry`]; the concrete kinds only describe their
//! id, business key and children.

use crate::core::{Conflict, EntryKind, Result, RingError, SortedIds, StoreResult};
use crate::registry::{self, RegisterOutcome, RegistryKey};
use crate::storage::{KvRead, KvWrite};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::warn;

pub trait Entry: Serialize + DeserializeOwned + Sized {
    const KIND: EntryKind;

    fn id(&self) -> &str;

    /// Business key enforced by the registry, if this kind has one
    fn registry_key(&self) -> Option<RegistryKey> {
        None
    }

    /// Child ids, for kinds that have children
    fn child_ids(&self) -> Option<&SortedIds> {
        None
    }

    fn marshal(&self) -> StoreResult<Vec<u8>> {
        Ok(rmp_serde::to_vec_named(self)?)
    }

    fn unmarshal(bytes: &[u8]) -> StoreResult<Self> {
        Ok(rmp_serde::from_slice(bytes)?)
    }

    /// Persist the full state under the entity id.
    ///
    /// # Panics
    /// Panics if the id is empty.
    fn save<T: KvWrite>(&self, tx: &mut T) -> Result<()> {
        assert!(!self.id().is_empty(), "cannot save a {} without an id", Self::KIND);
        let blob = self.marshal()?;
        tx.put(Self::KIND.bucket(), self.id(), blob)?;
        Ok(())
    }

    fn load<T: KvRead>(tx: &T, id: &str) -> Result<Self> {
        match tx.get(Self::KIND.bucket(), id)? {
            Some(blob) => Ok(Self::unmarshal(&blob)?),
            None => Err(RingError::not_found(Self::KIND, id)),
        }
    }

    fn exists<T: KvRead>(tx: &T, id: &str) -> Result<bool> {
        Ok(tx.contains(Self::KIND.bucket(), id)?)
    }

    /// Ids of every stored entity of this kind
    fn list<T: KvRead>(tx: &T) -> Result<Vec<String>> {
        Ok(tx.keys(Self::KIND.bucket())?)
    }

    /// Claim this entity's business key.
    ///
    /// A key held by another live entity is a [`Conflict::KeyInUse`].
    fn register<T: KvWrite>(&self, tx: &mut T) -> Result<RegisterOutcome> {
        let Some(key) = self.registry_key() else {
            return Ok(RegisterOutcome::Registered);
        };
        match registry::register(tx, &key, self.id())? {
            RegisterOutcome::Conflict { existing_id } => {
                Err(RingError::Conflict(Conflict::KeyInUse {
                    kind: Self::KIND,
                    key: key.description().to_string(),
                    existing_id,
                }))
            }
            outcome => Ok(outcome),
        }
    }

    fn deregister<T: KvWrite>(&self, tx: &mut T) -> Result<()> {
        if let Some(key) = self.registry_key() {
            registry::deregister(tx, &key)?;
        }
        Ok(())
    }

    /// Remove the registry record and the blob.
    ///
    /// Refused while the entity still has children; nothing is touched then.
    fn delete<T: KvWrite>(&self, tx: &mut T) -> Result<()> {
        if let (Some(children), Some(child_kind)) = (self.child_ids(), Self::KIND.child_kind()) {
            if !children.is_empty() {
                let conflict = Conflict::HasChildren {
                    kind: Self::KIND,
                    id: self.id().to_string(),
                    child_kind,
                    count: children.len(),
                };
                warn!("{conflict}");
                return Err(RingError::Conflict(conflict));
            }
        }

        self.deregister(tx)?;
        tx.delete(Self::KIND.bucket(), self.id())?;
        Ok(())
    }
}

/// An entry that links to its children by id.
pub trait ParentEntry: Entry {
    fn child_ids_mut(&mut self) -> &mut SortedIds;

    /// Link a child.
    ///
    /// Linking an id twice is a caller bug: it asserts in debug builds and
    /// is ignored otherwise.
    fn add_child(&mut self, id: &str) {
        let inserted = self.child_ids_mut().insert(id);
        debug_assert!(inserted, "{} {} already links {id}", Self::KIND, self.id());
    }

    /// Unlink a child; unknown ids are ignored
    fn remove_child(&mut self, id: &str) {
        self.child_ids_mut().remove(id);
    }

    fn has_child(&self, id: &str) -> bool {
        self.child_ids().is_some_and(|children| children.contains(id))
    }
}
