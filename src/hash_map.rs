//! A fixed-capacity map over the grouped-probing [`HashTable`].
//!
//! [`HashMap<K, V, S>`] pairs the low-level table with a configurable
//! [`BuildHasher`], hiding the hash-and-predicate plumbing behind a
//! conventional keyed interface. Everything the table refuses — the size
//! cap, probe exhaustion — surfaces here as a `false` from
//! [`insert`](HashMap::insert).

use std::fmt::Debug;
use std::hash::BuildHasher;
use std::hash::Hash;

use crate::hash_table;
use crate::hash_table::DEFAULT_DELTA;
use crate::hash_table::Entry;
use crate::hash_table::Error;
use crate::hash_table::HashTable;

/// A fixed-capacity hash map backed by the grouped-probing [`HashTable`].
///
/// `HashMap<K, V, S>` stores key-value pairs where keys implement
/// `Hash + Eq`, hashing them through the hasher builder `S`. Capacity and
/// the spare-capacity fraction δ are fixed at construction: the map holds
/// at most [`max_inserts`](HashMap::max_inserts) entries, never resizes,
/// and has no removal operation.
#[derive(Clone)]
pub struct HashMap<K, V, S> {
    table: HashTable<(K, V)>,
    hash_builder: S,
}

impl<K, V, S> Debug for HashMap<K, V, S>
where
    K: Debug + Hash + Eq,
    V: Debug,
    S: BuildHasher,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut map = f.debug_map();
        for (k, v) in self.iter() {
            map.entry(k, v);
        }
        map.finish()
    }
}

impl<K, V, S> HashMap<K, V, S>
where
    K: Hash + Eq,
    S: BuildHasher,
{
    /// Creates a map with the given capacity and the default δ of 0.1.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ZeroCapacity`] if `capacity` is zero.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use std::collections::hash_map::RandomState;
    ///
    /// use elastic_hash::HashMap;
    ///
    /// let map: HashMap<u64, &str, RandomState> = HashMap::new(64).unwrap();
    /// assert!(map.is_empty());
    /// assert_eq!(map.capacity(), 64);
    /// ```
    pub fn new(capacity: usize) -> Result<Self, Error>
    where
        S: Default,
    {
        Self::with_hasher(capacity, DEFAULT_DELTA, S::default())
    }

    /// Creates a map with the given capacity and spare-capacity fraction.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ZeroCapacity`] if `capacity` is zero, or
    /// [`Error::DeltaOutOfRange`] if `delta` is not in (0, 1).
    pub fn with_delta(capacity: usize, delta: f64) -> Result<Self, Error>
    where
        S: Default,
    {
        Self::with_hasher(capacity, delta, S::default())
    }

    /// Creates a map with an explicit hasher builder.
    pub fn with_hasher(capacity: usize, delta: f64, hash_builder: S) -> Result<Self, Error> {
        Ok(Self {
            table: HashTable::with_capacity_and_delta(capacity, delta)?,
            hash_builder,
        })
    }

    /// Creates a map with an explicit hasher builder and table salt, for
    /// reproducible layouts.
    pub fn with_hasher_and_salt(
        capacity: usize,
        delta: f64,
        hash_builder: S,
        salt: u64,
    ) -> Result<Self, Error> {
        Ok(Self {
            table: HashTable::with_salt(capacity, delta, salt)?,
            hash_builder,
        })
    }

    /// Returns the number of entries in the map.
    pub fn len(&self) -> usize {
        self.table.len()
    }

    /// Returns `true` if the map contains no entries.
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Total number of slots, fixed at construction.
    pub fn capacity(&self) -> usize {
        self.table.capacity()
    }

    /// Current fill ratio, `len() / capacity()`.
    pub fn load_factor(&self) -> f64 {
        self.table.load_factor()
    }

    /// Number of entries the map admits before refusing insertions.
    pub fn max_inserts(&self) -> usize {
        self.table.max_inserts()
    }

    /// Highest probe-group index any insertion has used.
    pub fn max_group_used(&self) -> usize {
        self.table.max_group_used()
    }

    /// Per-key probe budget in slots, derived from δ at construction.
    pub fn max_probe_limit(&self) -> usize {
        self.table.max_probe_limit()
    }

    /// Worst-case probe offset reached so far, in slots.
    pub fn max_probe_used(&self) -> usize {
        self.table.max_probe_used()
    }

    /// Inserts a key-value pair, overwriting the value if the key is
    /// already present.
    ///
    /// Returns `true` on success. Returns `false` without mutating the map
    /// when no admissible slot exists: at the size cap (which is checked
    /// before the key lookup, so updates of present keys are refused too),
    /// or on probe exhaustion under a pathological hash distribution.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use std::collections::hash_map::RandomState;
    ///
    /// use elastic_hash::HashMap;
    ///
    /// let mut map: HashMap<u64, &str, RandomState> = HashMap::new(64).unwrap();
    /// assert!(map.insert(37, "a"));
    /// assert!(map.insert(37, "b"));
    /// assert_eq!(map.len(), 1);
    /// assert_eq!(map.get(&37), Some(&"b"));
    /// ```
    pub fn insert(&mut self, key: K, value: V) -> bool {
        let hash = self.hash_builder.hash_one(&key);
        match self.table.entry(hash, |(k, _)| k == &key) {
            Ok(Entry::Occupied(mut entry)) => {
                entry.get_mut().1 = value;
                true
            }
            Ok(Entry::Vacant(entry)) => {
                entry.insert((key, value));
                true
            }
            Err(_) => false,
        }
    }

    /// Returns a reference to the value for `key`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use std::collections::hash_map::RandomState;
    ///
    /// use elastic_hash::HashMap;
    ///
    /// let mut map: HashMap<u64, &str, RandomState> = HashMap::new(64).unwrap();
    /// map.insert(1, "one");
    /// assert_eq!(map.get(&1), Some(&"one"));
    /// assert_eq!(map.get(&2), None);
    /// ```
    pub fn get(&self, key: &K) -> Option<&V> {
        let hash = self.hash_builder.hash_one(key);
        self.table.find(hash, |(k, _)| k == key).map(|(_, v)| v)
    }

    /// Returns a mutable reference to the value for `key`.
    pub fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        let hash = self.hash_builder.hash_one(key);
        self.table.find_mut(hash, |(k, _)| k == key).map(|(_, v)| v)
    }

    /// Returns `true` if the map contains `key`.
    pub fn contains_key(&self, key: &K) -> bool {
        self.get(key).is_some()
    }

    /// Returns a mutable reference to the value for `key`, inserting
    /// `V::default()` first if the key is absent.
    ///
    /// The lookup runs before the insertion path, so a present key is
    /// served even when the map is at its size cap. Returns `None` only
    /// when the key is absent and the map refuses the insertion.
    ///
    /// This is the map's defaulting index operation. No `Index`
    /// implementation is provided: bracket syntax could neither insert the
    /// default through a shared reference nor report a refused insertion.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use std::collections::hash_map::RandomState;
    ///
    /// use elastic_hash::HashMap;
    ///
    /// let mut map: HashMap<u64, u32, RandomState> = HashMap::new(64).unwrap();
    /// *map.get_or_insert_default(5).unwrap() += 1;
    /// *map.get_or_insert_default(5).unwrap() += 1;
    /// assert_eq!(map.get(&5), Some(&2));
    /// ```
    pub fn get_or_insert_default(&mut self, key: K) -> Option<&mut V>
    where
        V: Default,
    {
        let hash = self.hash_builder.hash_one(&key);
        if self.table.find(hash, |(k, _)| k == &key).is_some() {
            return self.table.find_mut(hash, |(k, _)| k == &key).map(|(_, v)| v);
        }

        match self.table.entry(hash, |(k, _)| k == &key) {
            Ok(Entry::Occupied(entry)) => Some(&mut entry.into_mut().1),
            Ok(Entry::Vacant(entry)) => Some(&mut entry.insert((key, V::default())).1),
            Err(_) => None,
        }
    }

    /// Returns an iterator over key-value pairs, in no particular order.
    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            inner: self.table.iter(),
        }
    }

    /// Returns an iterator over the keys, in no particular order.
    pub fn keys(&self) -> Keys<'_, K, V> {
        Keys { inner: self.iter() }
    }

    /// Returns an iterator over the values, in no particular order.
    pub fn values(&self) -> Values<'_, K, V> {
        Values { inner: self.iter() }
    }
}

/// Iterator over the key-value pairs of a [`HashMap`].
pub struct Iter<'a, K, V> {
    inner: hash_table::Iter<'a, (K, V)>,
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(k, v)| (k, v))
    }
}

/// Iterator over the keys of a [`HashMap`].
pub struct Keys<'a, K, V> {
    inner: Iter<'a, K, V>,
}

impl<'a, K, V> Iterator for Keys<'a, K, V> {
    type Item = &'a K;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(k, _)| k)
    }
}

/// Iterator over the values of a [`HashMap`].
pub struct Values<'a, K, V> {
    inner: Iter<'a, K, V>,
}

impl<'a, K, V> Iterator for Values<'a, K, V> {
    type Item = &'a V;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(_, v)| v)
    }
}

#[cfg(test)]
mod tests {
    use std::hash::BuildHasher;
    use std::hash::Hasher;

    use rand::TryRngCore;
    use rand::rngs::OsRng;
    use siphasher::sip::SipHasher;

    use super::*;

    #[derive(Clone)]
    struct SipHashBuilder {
        k0: u64,
        k1: u64,
    }

    impl BuildHasher for SipHashBuilder {
        type Hasher = SipHasher;

        fn build_hasher(&self) -> Self::Hasher {
            SipHasher::new_with_keys(self.k0, self.k1)
        }
    }

    impl Default for SipHashBuilder {
        fn default() -> Self {
            let mut rng = OsRng;
            Self {
                k0: rng.try_next_u64().unwrap_or(0),
                k1: rng.try_next_u64().unwrap_or(0),
            }
        }
    }

    // Passes u64 keys straight through, so a zero-salt map places key k's
    // first group at slot k mod capacity.
    struct IdentityHasher(u64);

    impl Hasher for IdentityHasher {
        fn write(&mut self, bytes: &[u8]) {
            for &byte in bytes {
                self.0 = (self.0 << 8) | u64::from(byte);
            }
        }

        fn write_u64(&mut self, n: u64) {
            self.0 = n;
        }

        fn finish(&self) -> u64 {
            self.0
        }
    }

    #[derive(Clone, Default)]
    struct IdentityBuildHasher;

    impl BuildHasher for IdentityBuildHasher {
        type Hasher = IdentityHasher;

        fn build_hasher(&self) -> Self::Hasher {
            IdentityHasher(0)
        }
    }

    #[test]
    fn new_and_constructor_errors() {
        let map: HashMap<u64, String, SipHashBuilder> = HashMap::new(64).unwrap();
        assert!(map.is_empty());
        assert_eq!(map.len(), 0);
        assert_eq!(map.capacity(), 64);

        assert!(HashMap::<u64, String, SipHashBuilder>::new(0).is_err());
        assert!(HashMap::<u64, String, SipHashBuilder>::with_delta(64, 1.0).is_err());
    }

    #[test]
    fn insert_get_and_overwrite() {
        let mut map: HashMap<u64, String, SipHashBuilder> = HashMap::new(64).unwrap();

        assert!(map.insert(1, "hello".to_string()));
        assert_eq!(map.len(), 1);
        assert_eq!(map.get(&1), Some(&"hello".to_string()));
        assert_eq!(map.get(&2), None);

        assert!(map.insert(1, "world".to_string()));
        assert_eq!(map.len(), 1);
        assert_eq!(map.get(&1), Some(&"world".to_string()));
    }

    #[test]
    fn get_mut_modifies_value() {
        let mut map: HashMap<u64, String, SipHashBuilder> = HashMap::new(64).unwrap();
        assert!(map.insert(1, "hello".to_string()));

        if let Some(value) = map.get_mut(&1) {
            value.push_str(" world");
        }

        assert_eq!(map.get(&1), Some(&"hello world".to_string()));
        assert_eq!(map.get_mut(&2), None);
    }

    #[test]
    fn contains_key_tracks_inserts() {
        let mut map: HashMap<u64, u64, SipHashBuilder> = HashMap::new(64).unwrap();
        assert!(!map.contains_key(&1));
        assert!(map.insert(1, 10));
        assert!(map.contains_key(&1));
        assert!(!map.contains_key(&2));
    }

    #[test]
    fn many_keys_round_trip() {
        let mut map: HashMap<u64, u64, SipHashBuilder> = HashMap::new(1000).unwrap();

        for key in 0..100u64 {
            assert!(map.insert(key, key * 3));
        }
        assert_eq!(map.len(), 100);
        for key in 0..100u64 {
            assert_eq!(map.get(&key), Some(&(key * 3)));
        }
        assert!(!map.contains_key(&1000));
    }

    #[test]
    fn refuses_inserts_at_size_cap() {
        let mut map: HashMap<u64, u64, IdentityBuildHasher> =
            HashMap::with_hasher_and_salt(100, 0.1, IdentityBuildHasher, 0).unwrap();
        assert_eq!(map.max_inserts(), 90);

        for key in 0..90u64 {
            assert!(map.insert(key, key));
        }
        assert_eq!(map.len(), 90);

        // New key refused at the cap; update of a present key refused too,
        // since the gate runs before the lookup.
        assert!(!map.insert(90, 90));
        assert!(!map.insert(0, 99));
        assert_eq!(map.get(&0), Some(&0));
        assert_eq!(map.len(), 90);

        for key in 0..90u64 {
            assert_eq!(map.get(&key), Some(&key));
        }
    }

    #[test]
    fn get_or_insert_default_counts() {
        let mut map: HashMap<u64, u64, SipHashBuilder> = HashMap::new(64).unwrap();

        *map.get_or_insert_default(5).unwrap() += 1;
        *map.get_or_insert_default(5).unwrap() += 1;
        *map.get_or_insert_default(6).unwrap() += 1;

        assert_eq!(map.get(&5), Some(&2));
        assert_eq!(map.get(&6), Some(&1));
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn get_or_insert_default_at_size_cap() {
        let mut map: HashMap<u64, u64, IdentityBuildHasher> =
            HashMap::with_hasher_and_salt(100, 0.1, IdentityBuildHasher, 0).unwrap();

        for key in 0..90u64 {
            assert!(map.insert(key, key));
        }

        // Present keys are still served through the lookup path...
        assert_eq!(map.get_or_insert_default(10), Some(&mut 10));
        // ...but an absent key cannot be defaulted in.
        assert_eq!(map.get_or_insert_default(90), None);
        assert_eq!(map.len(), 90);
    }

    #[test]
    fn iteration_covers_all_pairs() {
        let mut map: HashMap<u64, u64, SipHashBuilder> = HashMap::new(128).unwrap();
        for key in 0..20u64 {
            assert!(map.insert(key, key + 100));
        }

        let mut pairs: Vec<(u64, u64)> = map.iter().map(|(k, v)| (*k, *v)).collect();
        pairs.sort_unstable();
        assert_eq!(
            pairs,
            (0..20u64).map(|k| (k, k + 100)).collect::<Vec<_>>()
        );

        let mut keys: Vec<u64> = map.keys().copied().collect();
        keys.sort_unstable();
        assert_eq!(keys, (0..20u64).collect::<Vec<_>>());

        assert_eq!(map.values().count(), 20);
    }

    #[test]
    fn clone_is_independent() {
        let mut map: HashMap<u64, u64, SipHashBuilder> = HashMap::new(64).unwrap();
        assert!(map.insert(1, 10));

        let mut copy = map.clone();
        assert!(copy.insert(2, 20));

        assert_eq!(copy.len(), 2);
        assert_eq!(map.len(), 1);
        assert!(!map.contains_key(&2));
    }

    #[test]
    fn probe_stats_accessors() {
        let map: HashMap<u64, u64, SipHashBuilder> = HashMap::with_delta(100, 0.1).unwrap();
        assert_eq!(map.max_inserts(), 90);
        assert_eq!(map.max_probe_limit(), 16);
        assert_eq!(map.max_group_used(), 0);
        assert_eq!(map.max_probe_used(), 15);
        assert_eq!(map.load_factor(), 0.0);
    }
}
