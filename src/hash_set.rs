//! A fixed-capacity set over the grouped-probing [`HashTable`].

use std::fmt::Debug;
use std::hash::BuildHasher;
use std::hash::Hash;

use crate::hash_table;
use crate::hash_table::DEFAULT_DELTA;
use crate::hash_table::Entry;
use crate::hash_table::Error;
use crate::hash_table::HashTable;

/// A fixed-capacity hash set backed by the grouped-probing [`HashTable`].
///
/// Stores values of type `T: Hash + Eq`, hashed through the hasher builder
/// `S`. Like the table underneath, the set never resizes and has no removal
/// operation; insertions are refused once the size cap is reached.
#[derive(Clone)]
pub struct HashSet<T, S> {
    table: HashTable<T>,
    hash_builder: S,
}

impl<T, S> Debug for HashSet<T, S>
where
    T: Debug + Hash + Eq,
    S: BuildHasher,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl<T, S> HashSet<T, S>
where
    T: Hash + Eq,
    S: BuildHasher,
{
    /// Creates a set with the given capacity and the default δ of 0.1.
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
    /// use elastic_hash::HashSet;
    ///
    /// let mut set: HashSet<u64, RandomState> = HashSet::new(64).unwrap();
    /// assert!(set.insert(3));
    /// assert!(!set.insert(3));
    /// assert!(set.contains(&3));
    /// ```
    pub fn new(capacity: usize) -> Result<Self, Error>
    where
        S: Default,
    {
        Self::with_hasher(capacity, DEFAULT_DELTA, S::default())
    }

    /// Creates a set with an explicit hasher builder.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ZeroCapacity`] if `capacity` is zero, or
    /// [`Error::DeltaOutOfRange`] if `delta` is not in (0, 1).
    pub fn with_hasher(capacity: usize, delta: f64, hash_builder: S) -> Result<Self, Error> {
        Ok(Self {
            table: HashTable::with_capacity_and_delta(capacity, delta)?,
            hash_builder,
        })
    }

    /// Returns the number of values in the set.
    pub fn len(&self) -> usize {
        self.table.len()
    }

    /// Returns `true` if the set contains no values.
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

    /// Number of values the set admits before refusing insertions.
    pub fn max_inserts(&self) -> usize {
        self.table.max_inserts()
    }

    /// Adds a value to the set.
    ///
    /// Returns `true` if the value was newly inserted. Returns `false`
    /// when the value was already present, or when the set refuses the
    /// insertion (at the size cap — which is checked before the presence
    /// lookup — or on probe exhaustion); [`contains`](HashSet::contains)
    /// distinguishes the two.
    pub fn insert(&mut self, value: T) -> bool {
        let hash = self.hash_builder.hash_one(&value);
        match self.table.entry(hash, |stored| stored == &value) {
            Ok(Entry::Occupied(_)) => false,
            Ok(Entry::Vacant(entry)) => {
                entry.insert(value);
                true
            }
            Err(_) => false,
        }
    }

    /// Returns `true` if the set contains `value`.
    pub fn contains(&self, value: &T) -> bool {
        self.get(value).is_some()
    }

    /// Returns a reference to the stored value equal to `value`.
    pub fn get(&self, value: &T) -> Option<&T> {
        let hash = self.hash_builder.hash_one(value);
        self.table.find(hash, |stored| stored == value)
    }

    /// Returns an iterator over the values, in no particular order.
    pub fn iter(&self) -> Iter<'_, T> {
        Iter {
            inner: self.table.iter(),
        }
    }
}

/// Iterator over the values of a [`HashSet`].
pub struct Iter<'a, T> {
    inner: hash_table::Iter<'a, T>,
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }
}
