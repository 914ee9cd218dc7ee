//! A fixed-capacity hash table with grouped SIMD metadata scans and elastic
//! placement.
//!
//! The table is backed by two parallel arrays of equal length: a metadata
//! array of one byte per slot, and an entry array holding the values. A
//! metadata byte is either `0x00` (empty) or `0x80 | fingerprint`, where the
//! fingerprint is the top 7 bits of the salted hash. Keeping the empty
//! encoding all-zero means a bulk zero-fill initialises the table, and
//! reserving the high bit for occupancy keeps the two encodings disjoint so
//! a byte compare against a broadcast target answers "could this slot hold
//! the key?" without touching the entry array. Fingerprints come from the
//! top of the hash rather than the bottom: the low bits already picked the
//! slot, so deriving the fingerprint from them would correlate it with its
//! position in the table and inflate false matches.
//!
//! ## Probing
//!
//! Probing is organised in groups of 16 contiguous slots, sized to one SSE2
//! register of metadata bytes. A salted hash `h` maps to group bases
//! `h + 16·j mod capacity` for `j = 0, 1, 2, …` (linear jumps between
//! groups; the `quadratic-probe` feature switches to `h + 16·j²`). A group
//! whose 16 slots fit without wrapping past the end of the array is scanned
//! with a single unaligned 16-byte load and two byte-equality compares,
//! packed into an empty-slot mask and a fingerprint-match mask. Groups that
//! straddle the wrap are inspected one byte at a time; the scalar path has
//! identical semantics and also serves as the fallback on targets without
//! SSE2.
//!
//! ## Insertion
//!
//! Insertion is greedy in the first group and elastic afterwards. If the
//! first group has an empty slot, the entry takes the lowest one. Otherwise
//! the inserter collects empty-slot candidates from a small window of
//! subsequent groups (a wider window once the table is over 80% full) and
//! places the entry at the earliest `(group, offset)` across the window,
//! which shortens later lookups of the same key at the cost of a little
//! extra scanning now. If the window is bare, a scalar sweep covers the
//! remaining probe budget. The budget is derived from the spare-capacity
//! fraction δ: the table refuses insertions once fewer than `⌈δ·C⌉` slots
//! would remain empty, and in exchange probes at most
//! `max(16, min(C, ⌈4·log₂(1/δ)⌉))` slots per key.
//!
//! The table records the highest group index any insertion has used. Since
//! slots never revert to empty (there is no removal), a lookup that reaches
//! an empty slot before finding its key can stop: the key, had it been
//! inserted, would have taken that slot or an earlier one. Together with
//! the high-water group index this bounds every lookup.
//!
//! ## Safety invariants
//!
//! The implementation relies on the following:
//!
//! 1. **Index bounds**: every slot index handed to the unchecked accessors
//!    is produced by `group_base`/`slot_in_group`, which reduce modulo the
//!    capacity, or by `base + offset` where `base + 16 <= capacity` was
//!    checked first.
//! 2. **Initialisation**: a non-`EMPTY` metadata byte proves the entry at
//!    the same index was initialised, and it stays initialised for the
//!    table's lifetime because slots are never vacated.
//! 3. **Raw loads**: the 16-byte unaligned load is only issued for bases
//!    with `base + 16 <= capacity`, so it never reads outside the metadata
//!    allocation.
//!
//! [`HashMap<K, V, S>`]: crate::hash_map::HashMap
//! [`HashSet<T, S>`]: crate::hash_set::HashSet

#[cfg(all(target_arch = "x86", target_feature = "sse2"))]
use core::arch::x86::*;
#[cfg(all(target_arch = "x86_64", target_feature = "sse2"))]
use core::arch::x86_64::*;
use std::alloc::Layout;
use std::alloc::handle_alloc_error;
use std::fmt::Debug;
use std::marker::PhantomData;
use std::mem::MaybeUninit;
use std::ptr::NonNull;

use cfg_if::cfg_if;
use thiserror::Error;

/// Spare-capacity fraction used by the convenience constructors.
pub const DEFAULT_DELTA: f64 = 0.1;

/// Metadata byte marking an unoccupied slot.
///
/// Chosen as 0x00 so the freshly zeroed allocation is already a valid
/// all-empty metadata array, and so occupied bytes (high bit set) can never
/// collide with it.
const EMPTY: u8 = 0x00;

/// High bit of an occupied metadata byte; the low 7 bits hold the
/// fingerprint.
const OCCUPIED_BIT: u8 = 0x80;

/// Slots scanned per probe group; one SSE2 register of metadata bytes.
const GROUP_SIZE: usize = 16;

/// Scale applied to `log2(1/delta)` when sizing the probe budget.
const PROBE_LIMIT_SCALE: f64 = 4.0;

/// Upper bound on empty-slot candidates collected per insertion.
///
/// Not load-bearing for correctness (the fallback sweep covers everything
/// the window would have); it caps the working set of a single insertion.
const MAX_CANDIDATES: usize = 128;

#[inline(always)]
fn fingerprint(h: u64) -> u8 {
    ((h >> 57) & 0x7F) as u8
}

#[inline(always)]
fn occupied_tag(h: u64) -> u8 {
    OCCUPIED_BIT | fingerprint(h)
}

cfg_if! {
    if #[cfg(feature = "quadratic-probe")] {
        // Group j starts at h + 16*j^2.
        #[inline(always)]
        fn group_step(group: usize) -> u64 {
            (GROUP_SIZE as u64).wrapping_mul((group as u64).wrapping_mul(group as u64))
        }
    } else {
        // Group j starts at h + 16*j.
        #[inline(always)]
        fn group_step(group: usize) -> u64 {
            (GROUP_SIZE as u64).wrapping_mul(group as u64)
        }
    }
}

/// Errors reported at construction.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum Error {
    /// The requested capacity was zero.
    #[error("capacity must be at least one slot")]
    ZeroCapacity,
    /// The spare-capacity fraction was outside the open interval (0, 1).
    #[error("delta must lie in (0, 1), got {delta}")]
    DeltaOutOfRange {
        /// The rejected value.
        delta: f64,
    },
}

/// Error returned when the table cannot admit a new entry.
///
/// Two conditions produce it and are deliberately indistinguishable: the
/// size cap (`len() == max_inserts()`), and probe exhaustion, where every
/// group in the probe budget is fully occupied by other keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("table cannot admit additional entries")]
pub struct CapacityError;

#[derive(Clone, Copy)]
struct Candidate {
    group: usize,
    offset: usize,
    index: usize,
}

#[derive(Debug, Clone, Copy)]
struct DataLayout {
    layout: Layout,
    tags_offset: usize,
    entries_offset: usize,
}

impl DataLayout {
    fn new<V>(capacity: usize) -> Self {
        let tags_layout = Layout::array::<u8>(capacity).expect("allocation size overflow");
        let entries_layout =
            Layout::array::<MaybeUninit<V>>(capacity).expect("allocation size overflow");

        let (layout, tags_offset) = Layout::new::<()>().extend(tags_layout).unwrap();
        let (layout, entries_offset) = layout.extend(entries_layout).unwrap();

        DataLayout {
            layout,
            tags_offset,
            entries_offset,
        }
    }
}

/// A fixed-capacity hash table storing bare values of type `V`.
///
/// This is the low-level engine: every operation takes the value's 64-bit
/// hash and an equality predicate, in the style of `hashbrown::HashTable`.
/// Prefer [`HashMap<K, V, S>`] or [`HashSet<T, S>`] for a keyed interface.
///
/// Capacity and the spare-capacity fraction δ are fixed at construction.
/// The table holds at most `capacity - floor(delta * capacity)` entries and
/// never resizes; [`entry`](Self::entry) reports a [`CapacityError`] once
/// no admissible slot remains. There is no removal.
///
/// A per-table salt, mixed into every caller-supplied hash, decorrelates
/// layouts across tables so one adversarial key set cannot degrade every
/// table in a process.
///
/// [`HashMap<K, V, S>`]: crate::hash_map::HashMap
/// [`HashSet<T, S>`]: crate::hash_set::HashSet
pub struct HashTable<V> {
    layout: DataLayout,
    alloc: NonNull<u8>,

    capacity: usize,
    populated: usize,
    max_inserts: usize,
    max_probe_limit: usize,
    max_group_used: usize,
    salt: u64,

    _phantom: PhantomData<V>,
}

impl<V> HashTable<V> {
    /// Creates a table with the given capacity and the default δ of 0.1.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ZeroCapacity`] if `capacity` is zero.
    pub fn with_capacity(capacity: usize) -> Result<Self, Error> {
        Self::with_capacity_and_delta(capacity, DEFAULT_DELTA)
    }

    /// Creates a table with the given capacity and spare-capacity fraction.
    ///
    /// The salt is drawn from the thread-local generator; two tables built
    /// from the same inputs will lay their entries out differently.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ZeroCapacity`] if `capacity` is zero, or
    /// [`Error::DeltaOutOfRange`] if `delta` is not in the open interval
    /// (0, 1).
    pub fn with_capacity_and_delta(capacity: usize, delta: f64) -> Result<Self, Error> {
        Self::with_salt(capacity, delta, rand::random())
    }

    /// Creates a table with an explicit salt.
    ///
    /// Layouts become a pure function of (capacity, delta, salt, hashes),
    /// which is what tests and replay tooling want. Production callers
    /// should prefer
    /// [`with_capacity_and_delta`](Self::with_capacity_and_delta) and keep
    /// the salt nondeterministic.
    pub fn with_salt(capacity: usize, delta: f64, salt: u64) -> Result<Self, Error> {
        if capacity == 0 {
            return Err(Error::ZeroCapacity);
        }
        if !(delta > 0.0 && delta < 1.0) {
            return Err(Error::DeltaOutOfRange { delta });
        }

        let layout = DataLayout::new::<V>(capacity);
        // SAFETY: capacity >= 1, so the layout has non-zero size. Allocation
        // failure is handled, and zeroing the tag region makes every slot
        // EMPTY before the table is visible to anyone.
        let alloc = unsafe {
            let raw = std::alloc::alloc(layout.layout);
            if raw.is_null() {
                handle_alloc_error(layout.layout);
            }
            std::ptr::write_bytes(raw.add(layout.tags_offset), EMPTY, capacity);
            NonNull::new_unchecked(raw)
        };

        let max_inserts = capacity - (delta * capacity as f64) as usize;
        let probes = (PROBE_LIMIT_SCALE * (1.0 / delta).log2()).ceil() as usize;
        let max_probe_limit = probes.min(capacity).max(GROUP_SIZE);

        Ok(Self {
            layout,
            alloc,
            capacity,
            populated: 0,
            max_inserts,
            max_probe_limit,
            max_group_used: 0,
            salt,
            _phantom: PhantomData,
        })
    }

    fn tags_ptr(&self) -> NonNull<[u8]> {
        // SAFETY: `self.alloc` points to a live allocation described by
        // `self.layout`; the tag region is `capacity` bytes starting at
        // `tags_offset`.
        unsafe {
            NonNull::slice_from_raw_parts(
                self.alloc.add(self.layout.tags_offset).cast(),
                self.capacity,
            )
        }
    }

    fn entries_ptr(&self) -> NonNull<[MaybeUninit<V>]> {
        // SAFETY: `self.alloc` points to a live allocation described by
        // `self.layout`; the entry region is `capacity` records starting at
        // `entries_offset`.
        unsafe {
            NonNull::slice_from_raw_parts(
                self.alloc.add(self.layout.entries_offset).cast(),
                self.capacity,
            )
        }
    }

    /// Read the metadata byte at `index`.
    ///
    /// # Safety
    ///
    /// The caller must ensure `index < capacity`.
    #[inline(always)]
    unsafe fn tag_at(&self, index: usize) -> u8 {
        // SAFETY: Caller ensures `index` is within the tag array.
        unsafe { *self.tags_ptr().as_ref().get_unchecked(index) }
    }

    /// Write the metadata byte at `index`.
    ///
    /// # Safety
    ///
    /// The caller must ensure `index < capacity`.
    #[inline(always)]
    unsafe fn set_tag(&mut self, index: usize, tag: u8) {
        // SAFETY: Caller ensures `index` is within the tag array.
        unsafe {
            *self.tags_ptr().as_mut().get_unchecked_mut(index) = tag;
        }
    }

    /// Borrow the entry at `index`.
    ///
    /// # Safety
    ///
    /// The caller must ensure `index < capacity` and that the slot's
    /// metadata byte is not `EMPTY`.
    #[inline(always)]
    unsafe fn entry_ref(&self, index: usize) -> &V {
        // SAFETY: Caller ensures the index is in bounds and the slot is
        // occupied, which implies the entry is initialised.
        unsafe {
            self.entries_ptr()
                .as_ref()
                .get_unchecked(index)
                .assume_init_ref()
        }
    }

    /// Mutably borrow the entry at `index`.
    ///
    /// # Safety
    ///
    /// The caller must ensure `index < capacity` and that the slot's
    /// metadata byte is not `EMPTY`.
    #[inline(always)]
    unsafe fn entry_mut(&mut self, index: usize) -> &mut V {
        // SAFETY: Caller ensures the index is in bounds and the slot is
        // occupied, which implies the entry is initialised.
        unsafe {
            self.entries_ptr()
                .as_mut()
                .get_unchecked_mut(index)
                .assume_init_mut()
        }
    }

    /// Base slot of probe group `group` for the salted hash `h`.
    #[inline(always)]
    fn group_base(&self, h: u64, group: usize) -> usize {
        (h.wrapping_add(group_step(group)) % self.capacity as u64) as usize
    }

    /// Slot at `offset` within the group starting at `base`, wrapping at
    /// the end of the array.
    #[inline(always)]
    fn slot_in_group(&self, base: usize, offset: usize) -> usize {
        (base + offset) % self.capacity
    }

    /// Number of groups the probe budget permits.
    #[inline(always)]
    fn total_groups(&self) -> usize {
        self.max_probe_limit
            .div_ceil(GROUP_SIZE)
            .min(self.capacity.div_ceil(GROUP_SIZE))
    }

    /// Scan the 16 metadata bytes of the contiguous group at `base`.
    ///
    /// Returns `(empty_mask, match_mask)`: bit `k` of the first is set iff
    /// slot `base + k` is empty, bit `k` of the second iff its metadata
    /// byte equals `tag`.
    ///
    /// # Safety
    ///
    /// The caller must ensure `base + 16 <= capacity`.
    #[cfg(all(
        any(target_arch = "x86", target_arch = "x86_64"),
        target_feature = "sse2"
    ))]
    #[inline(always)]
    unsafe fn scan_group(&self, base: usize, tag: u8) -> (u16, u16) {
        // SAFETY: SSE2 is confirmed at compile time; bounds per caller.
        unsafe { self.scan_group_sse2(base, tag) }
    }

    /// Scalar implementation of the group scan, selected at compile time on
    /// targets without a 16-wide byte compare. Produces masks identical to
    /// the SSE2 path.
    ///
    /// # Safety
    ///
    /// The caller must ensure `base + 16 <= capacity`.
    #[cfg(not(all(
        any(target_arch = "x86", target_arch = "x86_64"),
        target_feature = "sse2"
    )))]
    #[inline(always)]
    unsafe fn scan_group(&self, base: usize, tag: u8) -> (u16, u16) {
        let tags = self.tags_ptr();
        let mut empty_mask: u16 = 0;
        let mut match_mask: u16 = 0;
        for offset in 0..GROUP_SIZE {
            // SAFETY: `base + offset < base + 16 <= capacity` per caller.
            let byte = unsafe { *tags.as_ref().get_unchecked(base + offset) };
            if byte == EMPTY {
                empty_mask |= 1 << offset;
            }
            if byte == tag {
                match_mask |= 1 << offset;
            }
        }
        (empty_mask, match_mask)
    }

    /// SSE2 implementation of [`scan_group`](Self::scan_group).
    ///
    /// # Safety
    ///
    /// The caller must ensure `base + 16 <= capacity` and that the CPU
    /// supports SSE2. The load is unaligned by design; the bounds
    /// requirement keeps it inside the tag allocation.
    #[cfg(all(
        any(target_arch = "x86", target_arch = "x86_64"),
        target_feature = "sse2"
    ))]
    #[inline(always)]
    unsafe fn scan_group_sse2(&self, base: usize, tag: u8) -> (u16, u16) {
        // SAFETY: The caller guarantees 16 readable bytes at `base`.
        unsafe {
            let tags_ptr = self.tags_ptr().as_ref().as_ptr().add(base);
            let data = _mm_loadu_si128(tags_ptr as *const __m128i);

            let empty_cmp = _mm_cmpeq_epi8(data, _mm_setzero_si128());
            let match_cmp = _mm_cmpeq_epi8(data, _mm_set1_epi8(tag as i8));

            (
                _mm_movemask_epi8(empty_cmp) as u16,
                _mm_movemask_epi8(match_cmp) as u16,
            )
        }
    }

    /// Finds a value by hash and equality predicate.
    ///
    /// Consults at most `max_group_used() + 1` probe groups and stops early
    /// at the first empty slot in the probe sequence, which proves the
    /// value absent.
    #[inline]
    pub fn find(&self, hash: u64, eq: impl Fn(&V) -> bool) -> Option<&V> {
        if self.populated == 0 {
            return None;
        }

        let h = hash ^ self.salt;
        let tag = occupied_tag(h);

        for group in 0..=self.max_group_used {
            let base = self.group_base(h, group);

            if base + GROUP_SIZE <= self.capacity {
                // SAFETY: The bounds check above admits the 16-byte scan.
                let (empty_mask, match_mask) = unsafe { self.scan_group(base, tag) };

                let mut matches = match_mask;
                while matches != 0 {
                    let offset = matches.trailing_zeros() as usize;
                    matches &= matches - 1;

                    // SAFETY: `base + offset` is in bounds and its tag
                    // matched an occupied encoding, so the entry is
                    // initialised.
                    let candidate = unsafe { self.entry_ref(base + offset) };
                    if eq(candidate) {
                        return Some(candidate);
                    }
                }

                if empty_mask != 0 {
                    return None;
                }
            } else {
                for offset in 0..GROUP_SIZE {
                    let index = self.slot_in_group(base, offset);
                    // SAFETY: `slot_in_group` reduces modulo the capacity.
                    let byte = unsafe { self.tag_at(index) };

                    if byte == EMPTY {
                        return None;
                    }
                    if byte == tag {
                        // SAFETY: Occupied tag implies an initialised entry.
                        let candidate = unsafe { self.entry_ref(index) };
                        if eq(candidate) {
                            return Some(candidate);
                        }
                    }
                }
            }
        }

        None
    }

    /// Finds a value by hash and equality predicate, returning a mutable
    /// reference.
    #[inline]
    pub fn find_mut(&mut self, hash: u64, eq: impl Fn(&V) -> bool) -> Option<&mut V> {
        if self.populated == 0 {
            return None;
        }

        let h = hash ^ self.salt;
        let tag = occupied_tag(h);

        for group in 0..=self.max_group_used {
            let base = self.group_base(h, group);

            if base + GROUP_SIZE <= self.capacity {
                // SAFETY: The bounds check above admits the 16-byte scan.
                let (empty_mask, match_mask) = unsafe { self.scan_group(base, tag) };

                let mut matches = match_mask;
                while matches != 0 {
                    let offset = matches.trailing_zeros() as usize;
                    matches &= matches - 1;

                    let index = base + offset;
                    // SAFETY: In bounds; occupied tag implies initialised.
                    if eq(unsafe { self.entry_ref(index) }) {
                        // SAFETY: Same index as the successful probe above.
                        return Some(unsafe { self.entry_mut(index) });
                    }
                }

                if empty_mask != 0 {
                    return None;
                }
            } else {
                for offset in 0..GROUP_SIZE {
                    let index = self.slot_in_group(base, offset);
                    // SAFETY: `slot_in_group` reduces modulo the capacity.
                    let byte = unsafe { self.tag_at(index) };

                    if byte == EMPTY {
                        return None;
                    }
                    // SAFETY: Occupied tag implies an initialised entry.
                    if byte == tag && eq(unsafe { self.entry_ref(index) }) {
                        // SAFETY: Same index as the successful probe above.
                        return Some(unsafe { self.entry_mut(index) });
                    }
                }
            }
        }

        None
    }

    /// Returns `true` if a value matching the hash and predicate is stored.
    pub fn contains(&self, hash: u64, eq: impl Fn(&V) -> bool) -> bool {
        self.find(hash, eq).is_some()
    }

    /// Locates the slot for a value: the occupied slot holding an equal
    /// value, or the empty slot the placement policy selects for it.
    ///
    /// The size cap is enforced before anything else, so once the table
    /// holds `max_inserts()` entries this returns [`CapacityError`] even
    /// for values that are already present; lookups and in-place updates of
    /// a full table must go through [`find`](Self::find) /
    /// [`find_mut`](Self::find_mut).
    ///
    /// # Errors
    ///
    /// [`CapacityError`] at the size cap, or when every group in the probe
    /// budget is fully occupied by other values.
    pub fn entry(
        &mut self,
        hash: u64,
        eq: impl Fn(&V) -> bool,
    ) -> Result<Entry<'_, V>, CapacityError> {
        if self.populated >= self.max_inserts {
            return Err(CapacityError);
        }

        let h = hash ^ self.salt;
        let tag = occupied_tag(h);

        // Greedy pass over the first group: the overwhelming majority of
        // insertions end here at sane load factors.
        let base0 = self.group_base(h, 0);
        if base0 + GROUP_SIZE <= self.capacity {
            // SAFETY: The bounds check above admits the 16-byte scan.
            let (empty_mask, match_mask) = unsafe { self.scan_group(base0, tag) };

            let mut matches = match_mask;
            while matches != 0 {
                let offset = matches.trailing_zeros() as usize;
                matches &= matches - 1;

                let index = base0 + offset;
                // SAFETY: In bounds; occupied tag implies initialised.
                if eq(unsafe { self.entry_ref(index) }) {
                    return Ok(Entry::Occupied(OccupiedEntry { table: self, index }));
                }
            }

            if empty_mask != 0 {
                let offset = empty_mask.trailing_zeros() as usize;
                return Ok(Entry::Vacant(VacantEntry {
                    table: self,
                    index: base0 + offset,
                    group: 0,
                    tag,
                }));
            }
        } else {
            for offset in 0..GROUP_SIZE {
                let index = self.slot_in_group(base0, offset);
                // SAFETY: `slot_in_group` reduces modulo the capacity.
                let byte = unsafe { self.tag_at(index) };

                if byte == EMPTY {
                    return Ok(Entry::Vacant(VacantEntry {
                        table: self,
                        index,
                        group: 0,
                        tag,
                    }));
                }
                // SAFETY: Occupied tag implies an initialised entry.
                if byte == tag && eq(unsafe { self.entry_ref(index) }) {
                    return Ok(Entry::Occupied(OccupiedEntry { table: self, index }));
                }
            }
        }

        // The first group is full of other keys. Collect empty-slot
        // candidates from a window of subsequent groups and take the
        // earliest, rather than grabbing the first empty seen; the window
        // widens once the table is dense.
        let load = self.populated as f64 / self.capacity as f64;
        let total_groups = self.total_groups();
        let wide = if load > 0.8 { 8 } else { 4 };
        let window = usize::min(wide, total_groups);

        let mut candidates = [Candidate {
            group: 0,
            offset: 0,
            index: 0,
        }; MAX_CANDIDATES];
        let mut found = 0usize;

        for group in 1..window {
            if found >= MAX_CANDIDATES {
                break;
            }
            let base = self.group_base(h, group);

            if base + GROUP_SIZE <= self.capacity {
                // SAFETY: The bounds check above admits the 16-byte scan.
                let (empty_mask, match_mask) = unsafe { self.scan_group(base, tag) };

                let mut matches = match_mask;
                while matches != 0 {
                    let offset = matches.trailing_zeros() as usize;
                    matches &= matches - 1;

                    let index = base + offset;
                    // SAFETY: In bounds; occupied tag implies initialised.
                    if eq(unsafe { self.entry_ref(index) }) {
                        return Ok(Entry::Occupied(OccupiedEntry { table: self, index }));
                    }
                }

                let mut empties = empty_mask;
                while empties != 0 && found < MAX_CANDIDATES {
                    let offset = empties.trailing_zeros() as usize;
                    empties &= empties - 1;

                    candidates[found] = Candidate {
                        group,
                        offset,
                        index: base + offset,
                    };
                    found += 1;
                }
            } else {
                for offset in 0..GROUP_SIZE {
                    let index = self.slot_in_group(base, offset);
                    // SAFETY: `slot_in_group` reduces modulo the capacity.
                    let byte = unsafe { self.tag_at(index) };

                    if byte == EMPTY {
                        if found < MAX_CANDIDATES {
                            candidates[found] = Candidate {
                                group,
                                offset,
                                index,
                            };
                            found += 1;
                        }
                    } else if byte == tag {
                        // SAFETY: Occupied tag implies an initialised entry.
                        if eq(unsafe { self.entry_ref(index) }) {
                            return Ok(Entry::Occupied(OccupiedEntry { table: self, index }));
                        }
                    }
                }
            }
        }

        if found > 0 {
            let mut best = 0;
            for i in 1..found {
                if (candidates[i].group, candidates[i].offset)
                    < (candidates[best].group, candidates[best].offset)
                {
                    best = i;
                }
            }

            let chosen = candidates[best];
            return Ok(Entry::Vacant(VacantEntry {
                table: self,
                index: chosen.index,
                group: chosen.group,
                tag,
            }));
        }

        // Bare window: sweep the rest of the probe budget slot by slot.
        for group in window..total_groups {
            let base = self.group_base(h, group);

            for offset in 0..GROUP_SIZE {
                let index = self.slot_in_group(base, offset);
                // SAFETY: `slot_in_group` reduces modulo the capacity.
                let byte = unsafe { self.tag_at(index) };

                if byte == EMPTY {
                    return Ok(Entry::Vacant(VacantEntry {
                        table: self,
                        index,
                        group,
                        tag,
                    }));
                }
                // SAFETY: Occupied tag implies an initialised entry.
                if byte == tag && eq(unsafe { self.entry_ref(index) }) {
                    return Ok(Entry::Occupied(OccupiedEntry { table: self, index }));
                }
            }
        }

        Err(CapacityError)
    }

    /// Returns `true` if the table contains no entries.
    pub fn is_empty(&self) -> bool {
        self.populated == 0
    }

    /// Returns the number of entries in the table.
    pub fn len(&self) -> usize {
        self.populated
    }

    /// Total number of slots, fixed at construction.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Current fill ratio, `len() / capacity()`.
    pub fn load_factor(&self) -> f64 {
        self.populated as f64 / self.capacity as f64
    }

    /// Number of entries the table admits before refusing insertions,
    /// `capacity - floor(delta * capacity)`.
    pub fn max_inserts(&self) -> usize {
        self.max_inserts
    }

    /// Highest probe-group index any insertion has placed an entry at.
    ///
    /// Monotonically non-decreasing; lookups consult at most
    /// `max_group_used() + 1` groups.
    pub fn max_group_used(&self) -> usize {
        self.max_group_used
    }

    /// Per-key probe budget in slots, derived from δ at construction.
    pub fn max_probe_limit(&self) -> usize {
        self.max_probe_limit
    }

    /// Worst-case probe offset reached so far, in slots.
    pub fn max_probe_used(&self) -> usize {
        self.max_group_used * GROUP_SIZE + (GROUP_SIZE - 1)
    }

    /// Returns an iterator over all values, in no particular order.
    pub fn iter(&self) -> Iter<'_, V> {
        Iter {
            table: self,
            index: 0,
        }
    }
}

impl<V> Debug for HashTable<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // SAFETY: The tag array is initialised for the table's lifetime.
        let tags = unsafe { self.tags_ptr().as_ref() };
        let metadata = tags
            .chunks(GROUP_SIZE)
            .map(|chunk| {
                chunk
                    .iter()
                    .map(|byte| {
                        if *byte == EMPTY {
                            "..".to_string()
                        } else {
                            format!("{byte:02x}")
                        }
                    })
                    .collect::<Vec<_>>()
                    .join(" ")
            })
            .collect::<Vec<_>>();

        f.debug_struct("HashTable")
            .field("metadata", &metadata)
            .field("populated", &self.populated)
            .field("max_inserts", &self.max_inserts)
            .field("max_group_used", &self.max_group_used)
            .finish()
    }
}

impl<V> Clone for HashTable<V>
where
    V: Clone,
{
    fn clone(&self) -> Self {
        // SAFETY: The fresh allocation matches `self.layout`. Copying the
        // tag region wholesale marks exactly the occupied slots, and each
        // occupied entry is cloned into place before the new table is
        // returned.
        unsafe {
            let raw = std::alloc::alloc(self.layout.layout);
            if raw.is_null() {
                handle_alloc_error(self.layout.layout);
            }
            std::ptr::copy_nonoverlapping(self.alloc.as_ptr(), raw, self.layout.entries_offset);

            let new_table = Self {
                layout: self.layout,
                alloc: NonNull::new_unchecked(raw),
                capacity: self.capacity,
                populated: self.populated,
                max_inserts: self.max_inserts,
                max_probe_limit: self.max_probe_limit,
                max_group_used: self.max_group_used,
                salt: self.salt,
                _phantom: PhantomData,
            };

            let src_tags = self.tags_ptr().as_ref();
            let src_entries = self.entries_ptr().as_ref();
            let dst_entries = new_table.entries_ptr().as_mut();
            for index in 0..src_tags.len() {
                if *src_tags.get_unchecked(index) != EMPTY {
                    dst_entries
                        .get_unchecked_mut(index)
                        .write(src_entries.get_unchecked(index).assume_init_ref().clone());
                }
            }

            new_table
        }
    }
}

impl<V> Drop for HashTable<V> {
    fn drop(&mut self) {
        // SAFETY: Occupied tags mark initialised entries; the allocation is
        // live until the dealloc below.
        unsafe {
            if std::mem::needs_drop::<V>() && self.populated > 0 {
                for index in 0..self.capacity {
                    if self.tag_at(index) != EMPTY {
                        self.entries_ptr()
                            .as_mut()
                            .get_unchecked_mut(index)
                            .assume_init_drop();
                    }
                }
            }

            std::alloc::dealloc(self.alloc.as_ptr(), self.layout.layout);
        }
    }
}

/// A slot located by [`HashTable::entry`].
pub enum Entry<'a, V> {
    /// The table already holds an equal value at this slot.
    Occupied(OccupiedEntry<'a, V>),
    /// The placement policy selected this empty slot for the value.
    Vacant(VacantEntry<'a, V>),
}

/// An occupied slot; grants access to the stored value.
pub struct OccupiedEntry<'a, V> {
    table: &'a mut HashTable<V>,
    index: usize,
}

impl<'a, V> OccupiedEntry<'a, V> {
    /// Borrows the stored value.
    pub fn get(&self) -> &V {
        // SAFETY: The entry was located through an occupied tag at a
        // validated index.
        unsafe { self.table.entry_ref(self.index) }
    }

    /// Mutably borrows the stored value.
    pub fn get_mut(&mut self) -> &mut V {
        // SAFETY: The entry was located through an occupied tag at a
        // validated index.
        unsafe { self.table.entry_mut(self.index) }
    }

    /// Converts the entry into a mutable borrow tied to the table.
    pub fn into_mut(self) -> &'a mut V {
        // SAFETY: The entry was located through an occupied tag at a
        // validated index.
        unsafe {
            self.table
                .entries_ptr()
                .as_mut()
                .get_unchecked_mut(self.index)
                .assume_init_mut()
        }
    }
}

/// An empty slot selected by the placement policy.
pub struct VacantEntry<'a, V> {
    table: &'a mut HashTable<V>,
    index: usize,
    group: usize,
    tag: u8,
}

impl<'a, V> VacantEntry<'a, V> {
    /// Writes `value` into the slot and returns a mutable borrow of it.
    ///
    /// Placements outside the first probe group raise the table's
    /// high-water group index, extending the range later lookups scan.
    pub fn insert(self, value: V) -> &'a mut V {
        let VacantEntry {
            table,
            index,
            group,
            tag,
        } = self;

        // SAFETY: `index` was validated by the probe that produced this
        // entry and its slot was observed empty; the exclusive borrow held
        // here kept it that way.
        unsafe {
            table.set_tag(index, tag);
            table
                .entries_ptr()
                .as_mut()
                .get_unchecked_mut(index)
                .write(value);
        }

        table.populated += 1;
        if group > table.max_group_used {
            table.max_group_used = group;
        }

        // SAFETY: The slot was initialised just above.
        unsafe {
            table
                .entries_ptr()
                .as_mut()
                .get_unchecked_mut(index)
                .assume_init_mut()
        }
    }
}

/// Iterator over the values of a [`HashTable`].
pub struct Iter<'a, V> {
    table: &'a HashTable<V>,
    index: usize,
}

impl<'a, V> Iterator for Iter<'a, V> {
    type Item = &'a V;

    fn next(&mut self) -> Option<Self::Item> {
        while self.index < self.table.capacity {
            let index = self.index;
            self.index += 1;

            // SAFETY: `index < capacity`; an occupied tag implies an
            // initialised entry.
            unsafe {
                if self.table.tag_at(index) != EMPTY {
                    return Some(self.table.entry_ref(index));
                }
            }
        }

        None
    }
}
