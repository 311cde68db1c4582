use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Sorted, duplicate-free set of entity ids.
///
/// Membership, insertion and removal all go through binary search.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SortedIds {
    ids: Vec<String>,
}

impl SortedIds {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.search(id).is_ok()
    }

    /// Insert `id`, returning `false` if it was already present.
    pub fn insert(&mut self, id: impl Into<String>) -> bool {
        let id = id.into();
        match self.search(&id) {
            Ok(_) => false,
            Err(pos) => {
                self.ids.insert(pos, id);
                true
            }
        }
    }

    /// Remove `id`, returning `false` if it was absent.
    pub fn remove(&mut self, id: &str) -> bool {
        match self.search(id) {
            Ok(pos) => {
                self.ids.remove(pos);
                true
            }
            Err(_) => false,
        }
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, String> {
        self.ids.iter()
    }

    pub fn as_slice(&self) -> &[String] {
        &self.ids
    }

    pub fn to_vec(&self) -> Vec<String> {
        self.ids.clone()
    }

    fn search(&self, id: &str) -> std::result::Result<usize, usize> {
        self.ids.binary_search_by(|probe| probe.as_str().cmp(id))
    }
}

impl<S: Into<String>> FromIterator<S> for SortedIds {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut ids: Vec<String> = iter.into_iter().map(Into::into).collect();
        ids.sort();
        ids.dedup();
        Self { ids }
    }
}

impl<'a> IntoIterator for &'a SortedIds {
    type Item = &'a String;
    type IntoIter = std::slice::Iter<'a, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.ids.iter()
    }
}

impl Serialize for SortedIds {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.ids.serialize(serializer)
    }
}

// Nil and unsorted collections from older blobs are normalized on the way in.
impl<'de> Deserialize<'de> for SortedIds {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let ids: Option<Vec<String>> = Option::deserialize(deserializer)?;
        Ok(ids.unwrap_or_default().into_iter().collect())
    }
}
