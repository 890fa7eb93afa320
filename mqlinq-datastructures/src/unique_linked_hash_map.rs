use linked_hash_map::LinkedHashMap;
use std::{fmt::Display, hash::Hash, iter::IntoIterator};
use thiserror::Error;

/// An insertion-ordered map that refuses to overwrite keys. Synthesized
/// documents and projections are built with it so that two members mapping
/// to the same output field surface as an error instead of silently
/// dropping one of them.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct UniqueLinkedHashMap<K, V>(LinkedHashMap<K, V>)
where
    K: Hash + Eq + Display;

#[derive(Debug, Error, PartialEq, Eq, Clone)]
#[error("duplicate key found: {0}")]
pub struct DuplicateKeyError(pub String);

impl DuplicateKeyError {
    pub fn key(&self) -> &str {
        &self.0
    }
}

impl<K, V> UniqueLinkedHashMap<K, V>
where
    K: Hash + Eq + Display,
{
    pub fn new() -> Self {
        Self(LinkedHashMap::new())
    }

    /// Builds a map from ordered pairs, failing on the first repeated key.
    pub fn try_from_iter(
        pairs: impl IntoIterator<Item = (K, V)>,
    ) -> Result<Self, DuplicateKeyError> {
        let mut out = Self::new();
        for (k, v) in pairs {
            out.insert(k, v)?;
        }
        Ok(out)
    }

    pub fn insert(&mut self, k: K, v: V) -> Result<(), DuplicateKeyError> {
        // checked first so the rejected key can be reported without
        // requiring K: Clone
        if self.0.contains_key(&k) {
            return Err(DuplicateKeyError(k.to_string()));
        }
        self.0.insert(k, v);
        Ok(())
    }

    pub fn get(&self, k: &K) -> Option<&V> {
        self.0.get(k)
    }

    pub fn contains_key(&self, k: &K) -> bool {
        self.0.contains_key(k)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.0.keys()
    }

    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.0.values()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.0.iter()
    }

    /// Rewrites every value in place order. Keys are untouched, so the
    /// uniqueness invariant carries over without re-checking.
    pub fn map_values<W>(self, mut f: impl FnMut(V) -> W) -> UniqueLinkedHashMap<K, W> {
        UniqueLinkedHashMap(self.0.into_iter().map(|(k, v)| (k, f(v))).collect())
    }

    /// Like [`UniqueLinkedHashMap::map_values`], with access to each key.
    pub fn map_with_key<W>(self, mut f: impl FnMut(&K, V) -> W) -> UniqueLinkedHashMap<K, W> {
        UniqueLinkedHashMap(
            self.0
                .into_iter()
                .map(|(k, v)| {
                    let w = f(&k, v);
                    (k, w)
                })
                .collect(),
        )
    }

    /// Fallible variant of [`UniqueLinkedHashMap::map_values`].
    pub fn try_map_values<W, E>(
        self,
        mut f: impl FnMut(V) -> Result<W, E>,
    ) -> Result<UniqueLinkedHashMap<K, W>, E> {
        let mut out = LinkedHashMap::new();
        for (k, v) in self.0 {
            out.insert(k, f(v)?);
        }
        Ok(UniqueLinkedHashMap(out))
    }
}

impl<K, V> IntoIterator for UniqueLinkedHashMap<K, V>
where
    K: Hash + Eq + Display,
{
    type Item = (K, V);
    type IntoIter = linked_hash_map::IntoIter<K, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<K, V> From<UniqueLinkedHashMap<K, V>> for LinkedHashMap<K, V>
where
    K: Hash + Eq + Display,
{
    fn from(ulhm: UniqueLinkedHashMap<K, V>) -> Self {
        ulhm.0
    }
}
