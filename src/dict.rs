//! The dictionary core: dual tables, the incremental rehash engine, and the
//! key/value operations.

use std::cell::Cell;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crate::entry::Entry;
use crate::error::{ExpandError, InsertError};
use crate::table::{next_power, Table, INITIAL_SIZE};
use crate::types::DictType;

/// Load factor at or above which expansion proceeds even while resizing is
/// disabled process-wide.
const FORCE_RESIZE_RATIO: usize = 5;

/// Empty buckets visited per requested rehash bucket before yielding.
const EMPTY_VISITS_PER_STEP: usize = 10;

/// Buckets migrated per clock poll in [`Dict::rehash_for`].
const REHASH_BATCH: usize = 100;

static RESIZE_ENABLED: AtomicBool = AtomicBool::new(true);

/// Re-enables automatic resizing (the default).
pub fn enable_resize() {
    RESIZE_ENABLED.store(true, Ordering::Relaxed);
}

/// Disables automatic resizing process-wide. Long-lived snapshot routines
/// use this to keep table shapes stable; a table whose load factor reaches
/// the forced ratio still expands regardless.
pub fn disable_resize() {
    RESIZE_ENABLED.store(false, Ordering::Relaxed);
}

pub(crate) fn resize_enabled() -> bool {
    RESIZE_ENABLED.load(Ordering::Relaxed)
}

/// Progress of the old-to-new table migration.
///
/// While `Rehashing { index }`, every bucket of the first table below
/// `index` has already been migrated and is empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RehashState {
    Idle,
    Rehashing { index: usize },
}

/// Outcome of [`Dict::replace`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Replaced {
    /// The key was new; an entry was inserted.
    Inserted,
    /// The key existed; its value was overwritten (and the old value
    /// dropped after the new one was installed).
    Updated,
}

/// A chained hash table that spreads resize work across subsequent
/// operations.
///
/// Two bucket arrays coexist: all entries live in the first until an
/// expansion arms the migration, after which every insert lands in the
/// second array and each mutating operation moves one old bucket across.
/// Lookups probe both. When the first array drains, the second takes its
/// place.
///
/// The structure assumes a single mutator; it is deliberately `!Sync`.
pub struct Dict<T: DictType> {
    pub(crate) dtype: T,
    pub(crate) ht: [Table<T::Key, T::Val>; 2],
    pub(crate) rehash: RehashState,
    /// Nonzero while automatic rehash steps are suspended.
    pub(crate) pause: Cell<usize>,
}

impl<T: DictType + Default> Dict<T> {
    pub fn new() -> Self {
        Self::with_type(T::default())
    }
}

impl<T: DictType + Default> Default for Dict<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: DictType> Dict<T> {
    /// Creates an empty dictionary with the given type policy. No bucket
    /// array is allocated until the first insertion.
    pub fn with_type(dtype: T) -> Self {
        Dict {
            dtype,
            ht: [Table::unallocated(), Table::unallocated()],
            rehash: RehashState::Idle,
            pause: Cell::new(0),
        }
    }

    pub fn len(&self) -> usize {
        self.ht[0].used + self.ht[1].used
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total bucket slots across both tables.
    pub fn slots(&self) -> usize {
        self.ht[0].size() + self.ht[1].size()
    }

    pub fn is_rehashing(&self) -> bool {
        self.rehash != RehashState::Idle
    }

    /// The hash of `key` under this table's type policy.
    pub fn hash_key(&self, key: &T::Key) -> u64 {
        self.dtype.hash(key)
    }

    // ---- sizing -----------------------------------------------------------

    /// Grows (or initially allocates) the bucket array to the smallest
    /// power of two covering `size`. With entries present this only arms
    /// the migration; the actual moves happen incrementally.
    ///
    /// Allocation failure aborts the process; see [`Dict::try_expand`] for
    /// the reporting variant.
    pub fn expand(&mut self, size: usize) -> Result<(), ExpandError> {
        let new_size = self.expand_precheck(size)?;
        self.install(Table::with_size(new_size));
        Ok(())
    }

    /// Like [`Dict::expand`], but reports allocation failure instead of
    /// aborting.
    pub fn try_expand(&mut self, size: usize) -> Result<(), ExpandError> {
        let new_size = self.expand_precheck(size)?;
        self.install(Table::try_with_size(new_size)?);
        Ok(())
    }

    fn expand_precheck(&self, size: usize) -> Result<usize, ExpandError> {
        if self.is_rehashing() {
            return Err(ExpandError::Rehashing);
        }
        let new_size = next_power(size);
        if new_size < self.ht[0].used {
            return Err(ExpandError::TooSmall {
                used: self.ht[0].used,
            });
        }
        if new_size == self.ht[0].size() {
            return Err(ExpandError::SameSize);
        }
        Ok(new_size)
    }

    fn install(&mut self, table: Table<T::Key, T::Val>) {
        if self.ht[0].is_unallocated() {
            self.ht[0] = table;
        } else {
            self.ht[1] = table;
            self.rehash = RehashState::Rehashing { index: 0 };
        }
    }

    /// Shrinks the bucket array to the smallest power of two covering the
    /// live entries. Refused while rehashing or while resizing is disabled.
    pub fn shrink_to_fit(&mut self) -> Result<(), ExpandError> {
        if !resize_enabled() {
            return Err(ExpandError::ResizeDisabled);
        }
        if self.is_rehashing() {
            return Err(ExpandError::Rehashing);
        }
        self.expand(self.ht[0].used.max(INITIAL_SIZE))
    }

    /// Expansion policy consulted before every insert: allocate the first
    /// array lazily, then double once the load factor reaches 1 (or refuse
    /// until the forced ratio when resizing is disabled).
    fn expand_if_needed(&mut self) {
        if self.is_rehashing() {
            return;
        }
        if self.ht[0].is_unallocated() {
            let _ = self.expand(INITIAL_SIZE);
            return;
        }
        let used = self.ht[0].used;
        let size = self.ht[0].size();
        if used >= size
            && (resize_enabled() || used / size >= FORCE_RESIZE_RATIO)
            && self.type_expand_allowed()
        {
            let _ = self.expand(used + 1);
        }
    }

    fn type_expand_allowed(&self) -> bool {
        let new_size = next_power(self.ht[0].used + 1);
        let more_mem = new_size * std::mem::size_of::<Option<Box<Entry<T::Key, T::Val>>>>();
        let used_ratio = self.ht[0].used as f64 / self.ht[0].size() as f64;
        self.dtype.expand_allowed(more_mem, used_ratio)
    }

    // ---- rehash engine ----------------------------------------------------

    /// Migrates up to `n` non-empty buckets from the old table to the new
    /// one, visiting at most `10 * n` empty buckets before yielding so a
    /// sparse old table cannot stall the caller. Returns `true` while more
    /// work remains.
    pub fn rehash(&mut self, n: usize) -> bool {
        let RehashState::Rehashing { mut index } = self.rehash else {
            return false;
        };
        let mut empty_visits = n * EMPTY_VISITS_PER_STEP;
        let mut remaining = n;
        while remaining > 0 && self.ht[0].used != 0 {
            debug_assert!(index < self.ht[0].size());
            while self.ht[0].buckets[index].is_none() {
                index += 1;
                empty_visits -= 1;
                if empty_visits == 0 {
                    self.rehash = RehashState::Rehashing { index };
                    return true;
                }
            }
            let mut chain = self.ht[0].buckets[index].take();
            while let Some(mut e) = chain {
                chain = e.next.take();
                let slot = (self.dtype.hash(&e.key) as usize) & self.ht[1].sizemask;
                e.next = self.ht[1].buckets[slot].take();
                self.ht[1].buckets[slot] = Some(e);
                self.ht[0].used -= 1;
                self.ht[1].used += 1;
            }
            index += 1;
            remaining -= 1;
        }
        if self.ht[0].used == 0 {
            self.ht[0] = std::mem::replace(&mut self.ht[1], Table::unallocated());
            self.rehash = RehashState::Idle;
            return false;
        }
        self.rehash = RehashState::Rehashing { index };
        true
    }

    /// Migrates buckets until roughly `budget` wall-clock time has elapsed,
    /// in batches of 100 per clock poll. Returns the number of batches
    /// completed times the batch size.
    pub fn rehash_for(&mut self, budget: Duration) -> usize {
        let start = Instant::now();
        let mut migrated = 0;
        while self.rehash(REHASH_BATCH) {
            migrated += REHASH_BATCH;
            if start.elapsed() >= budget {
                break;
            }
        }
        migrated
    }

    /// The automatic hook run by the mutating operations: one bucket per
    /// operation, and nothing at all while paused.
    pub(crate) fn rehash_step(&mut self) {
        if self.pause.get() == 0 {
            self.rehash(1);
        }
    }

    /// Suspends automatic rehash steps and mints a token for the pause.
    /// Nests; the table shape is pinned while any token is outstanding,
    /// and every token must come back via [`Dict::resume_rehashing`].
    pub fn pause_rehashing(&self) -> RehashPause {
        self.pause_raw();
        RehashPause {
            owner: self as *const Dict<T> as *const (),
            armed: true,
        }
    }

    /// Returns (consumes) a pause token, resuming automatic rehash steps
    /// once the last outstanding token is back.
    pub fn resume_rehashing(&self, mut pause: RehashPause) {
        // Disarm before the identity check so a failed assert unwinds
        // cleanly instead of panicking again from the token's Drop.
        pause.armed = false;
        assert!(
            std::ptr::eq(pause.owner, self as *const Dict<T> as *const ()),
            "pause token returned to a different dictionary"
        );
        self.resume_raw();
    }

    pub(crate) fn pause_raw(&self) {
        self.pause.set(self.pause.get() + 1);
    }

    pub(crate) fn resume_raw(&self) {
        let p = self.pause.get();
        assert!(p > 0, "rehash pause underflow");
        self.pause.set(p - 1);
    }

    // ---- lookups ----------------------------------------------------------

    /// Read-only lookup. Does not advance the rehash; see [`Dict::find`]
    /// for the stepping variant.
    pub fn get(&self, key: &T::Key) -> Option<&T::Val> {
        if self.len() == 0 {
            return None;
        }
        let hash = self.dtype.hash(key);
        self.lookup_entry(key, hash).map(|e| &e.val)
    }

    pub fn contains_key(&self, key: &T::Key) -> bool {
        self.get(key).is_some()
    }

    /// Looks up the entry for `key`, advancing the rehash by one bucket
    /// first when a migration is in progress.
    pub fn find(&mut self, key: &T::Key) -> Option<&Entry<T::Key, T::Val>> {
        if self.is_rehashing() {
            self.rehash_step();
        }
        if self.len() == 0 {
            return None;
        }
        let hash = self.dtype.hash(key);
        self.lookup_entry(key, hash)
    }

    /// Mutable value lookup; advances the rehash like [`Dict::find`].
    pub fn get_mut(&mut self, key: &T::Key) -> Option<&mut T::Val> {
        if self.is_rehashing() {
            self.rehash_step();
        }
        if self.len() == 0 {
            return None;
        }
        let hash = self.dtype.hash(key);
        let (t, slot) = self.locate_bucket(key, hash)?;
        let Dict { dtype, ht, .. } = self;
        chain_find_mut(dtype, &mut ht[t].buckets[slot], key).map(|e| &mut e.val)
    }

    fn lookup_entry(&self, key: &T::Key, hash: u64) -> Option<&Entry<T::Key, T::Val>> {
        for t in 0..2 {
            let table = &self.ht[t];
            if table.size() == 0 {
                if self.is_rehashing() {
                    continue;
                }
                break;
            }
            let slot = (hash as usize) & table.sizemask;
            let mut cur = table.buckets[slot].as_deref();
            while let Some(e) = cur {
                if self.dtype.key_eq(&e.key, key) {
                    return Some(e);
                }
                cur = e.next.as_deref();
            }
            if !self.is_rehashing() {
                break;
            }
        }
        None
    }

    /// Finds which table and bucket hold `key`, probing the second table
    /// only while a migration is in progress.
    fn locate_bucket(&self, key: &T::Key, hash: u64) -> Option<(usize, usize)> {
        for t in 0..2 {
            let table = &self.ht[t];
            if table.size() == 0 {
                if self.is_rehashing() {
                    continue;
                }
                break;
            }
            let slot = (hash as usize) & table.sizemask;
            let mut cur = table.buckets[slot].as_deref();
            while let Some(e) = cur {
                if self.dtype.key_eq(&e.key, key) {
                    return Some((t, slot));
                }
                cur = e.next.as_deref();
            }
            if !self.is_rehashing() {
                break;
            }
        }
        None
    }

    /// Looks up an entry by address identity within the chains selected by
    /// `hash`. `ptr` is only compared, never dereferenced, so a stale
    /// pointer is safe to pass; a vanished entry just comes back `None`.
    /// Meant for secondary indices keyed on the entry itself.
    pub fn find_entry_by_ptr(
        &self,
        hash: u64,
        ptr: *const Entry<T::Key, T::Val>,
    ) -> Option<&Entry<T::Key, T::Val>> {
        if self.len() == 0 {
            return None;
        }
        for t in 0..2 {
            let table = &self.ht[t];
            if table.size() == 0 {
                if self.is_rehashing() {
                    continue;
                }
                break;
            }
            let slot = (hash as usize) & table.sizemask;
            let mut cur = table.buckets[slot].as_deref();
            while let Some(e) = cur {
                if std::ptr::eq(e, ptr) {
                    return Some(e);
                }
                cur = e.next.as_deref();
            }
            if !self.is_rehashing() {
                break;
            }
        }
        None
    }

    // ---- insertion --------------------------------------------------------

    /// Inserts a new key, rejecting duplicates.
    pub fn insert(&mut self, key: T::Key, val: T::Val) -> Result<(), InsertError> {
        self.insert_with(key, || val).map(|_| ())
    }

    /// Inserts a new key with a lazily built value, rejecting duplicates.
    /// `default` only runs when the insertion happens.
    pub fn insert_with<F>(
        &mut self,
        key: T::Key,
        default: F,
    ) -> Result<&mut Entry<T::Key, T::Val>, InsertError>
    where
        F: FnOnce() -> T::Val,
    {
        if self.is_rehashing() {
            self.rehash_step();
        }
        self.expand_if_needed();
        let hash = self.dtype.hash(&key);
        if self.locate_bucket(&key, hash).is_some() {
            return Err(InsertError::DuplicateKey);
        }
        Ok(self.prepend(key, default(), hash))
    }

    /// Returns the entry for `key`, inserting one built from `default` if
    /// the key is absent. The existing value wins on a hit and `default`
    /// does not run.
    pub fn add_or_find<F>(&mut self, key: T::Key, default: F) -> &mut Entry<T::Key, T::Val>
    where
        F: FnOnce() -> T::Val,
    {
        if self.is_rehashing() {
            self.rehash_step();
        }
        self.expand_if_needed();
        let hash = self.dtype.hash(&key);
        match self.locate_bucket(&key, hash) {
            Some((t, slot)) => {
                let Dict { dtype, ht, .. } = self;
                chain_find_mut(dtype, &mut ht[t].buckets[slot], &key)
                    .expect("bucket was located for this key")
            }
            None => self.prepend(key, default(), hash),
        }
    }

    /// Insert-or-overwrite. On overwrite the new value is installed before
    /// the old one is dropped, so replacing a value with something derived
    /// from itself behaves like a plain store.
    pub fn replace(&mut self, key: T::Key, val: T::Val) -> Replaced {
        if self.is_rehashing() {
            self.rehash_step();
        }
        self.expand_if_needed();
        let hash = self.dtype.hash(&key);
        match self.locate_bucket(&key, hash) {
            Some((t, slot)) => {
                let Dict { dtype, ht, .. } = self;
                let entry = chain_find_mut(dtype, &mut ht[t].buckets[slot], &key)
                    .expect("bucket was located for this key");
                entry.set_value(val);
                Replaced::Updated
            }
            None => {
                self.prepend(key, val, hash);
                Replaced::Inserted
            }
        }
    }

    /// Head insertion into the target table: the second array while a
    /// migration is in progress, the first otherwise.
    fn prepend(&mut self, key: T::Key, val: T::Val, hash: u64) -> &mut Entry<T::Key, T::Val> {
        let t = if self.is_rehashing() { 1 } else { 0 };
        let table = &mut self.ht[t];
        let slot = (hash as usize) & table.sizemask;
        let head = &mut table.buckets[slot];
        *head = Some(Entry::new(key, val, head.take()));
        table.used += 1;
        head.as_deref_mut().expect("chain head was just installed")
    }

    // ---- removal ----------------------------------------------------------

    /// Removes `key`, dropping its entry in place. Returns whether a
    /// removal happened.
    pub fn delete(&mut self, key: &T::Key) -> bool {
        self.unlink(key).is_some()
    }

    /// Removes `key` and hands the owned pair back to the caller, who can
    /// keep using the value without a second lookup. Dropping the pair is
    /// what frees it.
    pub fn take(&mut self, key: &T::Key) -> Option<(T::Key, T::Val)> {
        self.unlink(key).map(|e| {
            let Entry { key, val, next: _ } = *e;
            (key, val)
        })
    }

    fn unlink(&mut self, key: &T::Key) -> Option<Box<Entry<T::Key, T::Val>>> {
        if self.is_rehashing() {
            self.rehash_step();
        }
        if self.len() == 0 {
            return None;
        }
        let hash = self.dtype.hash(key);
        let (t, slot) = self.locate_bucket(key, hash)?;
        let Dict { dtype, ht, .. } = self;
        let removed = chain_remove(dtype, &mut ht[t].buckets[slot], key);
        if removed.is_some() {
            ht[t].used -= 1;
        }
        removed
    }

    /// Drops every entry and returns both tables to the unallocated state.
    pub fn clear(&mut self) {
        self.ht[0].reset();
        self.ht[1].reset();
        self.rehash = RehashState::Idle;
    }

    /// Like [`Dict::clear`], handing each evicted pair to `f`.
    pub fn clear_with<F>(&mut self, mut f: F)
    where
        F: FnMut(T::Key, T::Val),
    {
        for table in &mut self.ht {
            for slot in &mut table.buckets {
                let mut chain = slot.take();
                while let Some(e) = chain {
                    let Entry { key, val, next } = *e;
                    chain = next;
                    f(key, val);
                }
            }
        }
        self.clear();
    }

    // ---- iterator support -------------------------------------------------

    /// A 64-bit digest of the observable table shape: both backing-array
    /// base addresses, sizes, and used counts. Any insert, delete, or
    /// resize perturbs it. The arrays are only ever replaced wholesale
    /// (never reallocated in place), so base addresses are stable between
    /// structural changes.
    pub(crate) fn fingerprint(&self) -> u64 {
        let ints = [
            self.ht[0].base_ptr() as u64,
            self.ht[0].size() as u64,
            self.ht[0].used as u64,
            self.ht[1].base_ptr() as u64,
            self.ht[1].size() as u64,
            self.ht[1].used as u64,
        ];
        let mut hash: u64 = 0;
        for v in ints {
            // Thomas Wang's 64 bit integer mix, once per field.
            hash = hash.wrapping_add(v);
            hash = (!hash).wrapping_add(hash << 21);
            hash ^= hash >> 24;
            hash = hash.wrapping_add(hash << 3).wrapping_add(hash << 8);
            hash ^= hash >> 14;
            hash = hash.wrapping_add(hash << 2).wrapping_add(hash << 4);
            hash ^= hash >> 28;
            hash = hash.wrapping_add(hash << 31);
        }
        hash
    }
}

/// Proof that rehashing was paused. Linear: the only valid way to dispose
/// of it is [`Dict::resume_rehashing`], because the token cannot reach the
/// dictionary from `Drop` to release the pause itself.
#[must_use]
pub struct RehashPause {
    owner: *const (),
    armed: bool,
}

impl Drop for RehashPause {
    fn drop(&mut self) {
        // Intentional fail-fast on misuse: an unreturned token would pin
        // the table shape forever.
        if self.armed {
            panic!("RehashPause dropped without resume");
        }
    }
}

/// Walks a chain to the node matching `key`.
fn chain_find_mut<'a, T: DictType>(
    dtype: &T,
    head: &'a mut Option<Box<Entry<T::Key, T::Val>>>,
    key: &T::Key,
) -> Option<&'a mut Entry<T::Key, T::Val>> {
    let mut cur = head;
    loop {
        match cur {
            Some(node) => {
                if dtype.key_eq(&node.key, key) {
                    return Some(&mut **node);
                }
                cur = &mut node.next;
            }
            None => return None,
        }
    }
}

/// Unlinks and returns the node matching `key`, splicing its successor into
/// its place.
fn chain_remove<T: DictType>(
    dtype: &T,
    head: &mut Option<Box<Entry<T::Key, T::Val>>>,
    key: &T::Key,
) -> Option<Box<Entry<T::Key, T::Val>>> {
    let mut cur = head;
    loop {
        match cur {
            Some(node) if dtype.key_eq(&node.key, key) => {
                let next = node.next.take();
                return std::mem::replace(cur, next);
            }
            Some(node) => cur = &mut node.next,
            None => return None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Dict, RehashState, Replaced};
    use crate::error::{ExpandError, InsertError};
    use crate::types::DictType;

    /// Policy with a transparent hash so tests can steer keys into known
    /// buckets.
    #[derive(Default)]
    struct IdentityType;

    impl DictType for IdentityType {
        type Key = u64;
        type Val = u64;

        fn hash(&self, key: &u64) -> u64 {
            *key
        }

        fn key_eq(&self, a: &u64, b: &u64) -> bool {
            a == b
        }
    }

    /// Policy that refuses automatic expansion.
    #[derive(Default)]
    struct NoGrowType;

    impl DictType for NoGrowType {
        type Key = u64;
        type Val = u64;

        fn hash(&self, key: &u64) -> u64 {
            *key
        }

        fn key_eq(&self, a: &u64, b: &u64) -> bool {
            a == b
        }

        fn expand_allowed(&self, _more_mem: usize, _used_ratio: f64) -> bool {
            false
        }
    }

    #[test]
    fn create_is_fully_empty() {
        let d: Dict<IdentityType> = Dict::new();
        assert_eq!(d.len(), 0);
        assert!(d.is_empty());
        assert_eq!(d.slots(), 0);
        assert!(!d.is_rehashing());
    }

    #[test]
    fn first_expand_installs_directly() {
        let mut d: Dict<IdentityType> = Dict::new();
        d.expand(10).expect("expand empty dict");
        assert_eq!(d.rehash, RehashState::Idle);
        assert_eq!(d.slots(), 16);
    }

    #[test]
    fn expand_with_entries_arms_rehash() {
        let mut d: Dict<IdentityType> = Dict::new();
        for k in 0..4 {
            d.insert(k, k).unwrap();
        }
        d.expand(32).expect("grow");
        assert_eq!(d.rehash, RehashState::Rehashing { index: 0 });
        assert_eq!(d.ht[1].size(), 32);
        assert_eq!(d.ht[0].used, 4);
    }

    #[test]
    fn expand_prechecks() {
        let mut d: Dict<IdentityType> = Dict::new();
        for k in 0..8 {
            d.insert(k, k).unwrap();
        }
        while d.rehash(100) {}
        assert!(matches!(
            d.expand(2),
            Err(ExpandError::TooSmall { used: 8 })
        ));
        assert!(matches!(d.expand(8), Err(ExpandError::SameSize)));
        d.expand(64).unwrap();
        assert!(matches!(d.expand(128), Err(ExpandError::Rehashing)));
    }

    #[test]
    fn try_expand_succeeds_on_reasonable_sizes() {
        let mut d: Dict<IdentityType> = Dict::new();
        d.try_expand(16).expect("allocatable");
        assert_eq!(d.slots(), 16);
    }

    #[test]
    fn rehash_state_machine_runs_to_completion() {
        let mut d: Dict<IdentityType> = Dict::new();
        d.expand(4).unwrap();
        // One key per bucket of the small table.
        for k in 0..4 {
            d.insert(k, k * 10).unwrap();
        }
        d.expand(8).unwrap();
        assert_eq!(d.rehash, RehashState::Rehashing { index: 0 });

        // Each step moves exactly one (non-empty) bucket forward.
        assert!(d.rehash(1));
        assert_eq!(d.rehash, RehashState::Rehashing { index: 1 });
        assert_eq!(d.ht[0].used, 3);
        assert_eq!(d.ht[1].used, 1);

        assert!(d.rehash(1));
        assert!(d.rehash(1));
        // The step that drains the last bucket also swaps the tables.
        assert!(!d.rehash(1));
        assert_eq!(d.rehash, RehashState::Idle);
        assert_eq!(d.ht[0].size(), 8);
        assert_eq!(d.ht[1].size(), 0);
        assert_eq!(d.len(), 4);
        for k in 0..4 {
            assert_eq!(d.get(&k), Some(&(k * 10)));
        }
    }

    #[test]
    fn rehash_yields_after_empty_visit_budget() {
        let mut d: Dict<IdentityType> = Dict::new();
        d.expand(64).unwrap();
        d.insert(50, 0).unwrap();
        d.insert(51, 0).unwrap();
        d.expand(128).unwrap();

        // Buckets 0..=9 are empty; the budget for n = 1 is exactly 10
        // empty visits, so nothing migrates on the first step.
        assert!(d.rehash(1));
        assert_eq!(d.rehash, RehashState::Rehashing { index: 10 });
        assert_eq!(d.ht[0].used, 2);

        // A big batch finishes the job.
        assert!(!d.rehash(100));
        assert_eq!(d.rehash, RehashState::Idle);
        assert_eq!(d.get(&50), Some(&0));
        assert_eq!(d.get(&51), Some(&0));
    }

    #[test]
    fn delete_everything_mid_rehash_still_finalizes() {
        let mut d: Dict<IdentityType> = Dict::new();
        for k in 0..4 {
            d.insert(k, k).unwrap();
        }
        d.expand(16).unwrap();
        for k in 0..4 {
            assert!(d.delete(&k));
        }
        assert_eq!(d.len(), 0);
        // Even with nothing left to move, a step must retire the state.
        d.rehash(1);
        assert!(!d.is_rehashing());
    }

    #[test]
    fn auto_expand_consults_the_type_policy() {
        let mut d: Dict<NoGrowType> = Dict::new();
        for k in 0..32 {
            d.insert(k, k).unwrap();
        }
        // Load factor 8 on a 4-slot table: the policy veto held.
        assert_eq!(d.slots(), 4);
        assert!(!d.is_rehashing());
        for k in 0..32 {
            assert_eq!(d.get(&k), Some(&k));
        }
    }

    #[test]
    fn insert_rejects_duplicates() {
        let mut d: Dict<IdentityType> = Dict::new();
        d.insert(7, 1).unwrap();
        assert_eq!(d.insert(7, 2), Err(InsertError::DuplicateKey));
        assert_eq!(d.get(&7), Some(&1));
        assert_eq!(d.len(), 1);
    }

    #[test]
    fn insert_with_is_lazy() {
        let mut d: Dict<IdentityType> = Dict::new();
        d.insert(1, 10).unwrap();
        let mut ran = false;
        let res = d.insert_with(1, || {
            ran = true;
            99
        });
        assert!(res.is_err());
        assert!(!ran, "default must not run on duplicate");
    }

    #[test]
    fn add_or_find_keeps_existing() {
        let mut d: Dict<IdentityType> = Dict::new();
        let e = d.add_or_find(5, || 100);
        assert_eq!(*e.value(), 100);
        let e = d.add_or_find(5, || 200);
        assert_eq!(*e.value(), 100);
        *e.value_mut() = 300;
        assert_eq!(d.get(&5), Some(&300));
        assert_eq!(d.len(), 1);
    }

    #[test]
    fn replace_reports_insert_vs_update() {
        let mut d: Dict<IdentityType> = Dict::new();
        assert_eq!(d.replace(3, 30), Replaced::Inserted);
        assert_eq!(d.replace(3, 33), Replaced::Updated);
        assert_eq!(d.get(&3), Some(&33));
        assert_eq!(d.len(), 1);
    }

    #[test]
    fn take_returns_the_owned_pair() {
        let mut d: Dict<IdentityType> = Dict::new();
        d.insert(9, 90).unwrap();
        assert_eq!(d.take(&9), Some((9, 90)));
        assert_eq!(d.take(&9), None);
        assert_eq!(d.len(), 0);
    }

    #[test]
    fn lookups_probe_both_tables_mid_rehash() {
        let mut d: Dict<IdentityType> = Dict::new();
        for k in 0..4 {
            d.insert(k, k).unwrap();
        }
        d.expand(16).unwrap();
        d.rehash(1);
        // Key 0 migrated, key 3 has not; a fresh key lands in the new table.
        d.insert(100, 100).unwrap();
        for k in [0, 1, 2, 3, 100] {
            assert!(d.contains_key(&k));
        }
        assert!(d.delete(&2));
        assert!(!d.contains_key(&2));
        assert_eq!(d.len(), 4);
    }

    #[test]
    fn pause_blocks_automatic_steps_only() {
        let mut d: Dict<IdentityType> = Dict::new();
        for k in 0..4 {
            d.insert(k, k).unwrap();
        }
        d.expand(16).unwrap();
        let pause = d.pause_rehashing();
        let before = d.rehash;
        // find() would normally advance the migration.
        let _ = d.find(&0);
        let _ = d.find(&1);
        assert_eq!(d.rehash, before);
        d.resume_rehashing(pause);

        let before = d.rehash;
        let _ = d.find(&0);
        assert_ne!(d.rehash, before);
    }

    #[test]
    fn pause_nests() {
        let d: Dict<IdentityType> = Dict::new();
        let t1 = d.pause_rehashing();
        let t2 = d.pause_rehashing();
        assert_eq!(d.pause.get(), 2);
        d.resume_rehashing(t2);
        assert_eq!(d.pause.get(), 1);
        d.resume_rehashing(t1);
        assert_eq!(d.pause.get(), 0);
    }

    #[test]
    fn dropped_pause_token_panics() {
        let d: Dict<IdentityType> = Dict::new();
        let res = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _token = d.pause_rehashing();
            // dropped here without resume
        }));
        assert!(res.is_err(), "an unreturned pause token must be detected");
        // The counter is deliberately left raised; release it by hand.
        d.resume_raw();
    }

    #[test]
    fn pause_token_is_bound_to_its_dictionary() {
        let d1: Dict<IdentityType> = Dict::new();
        let d2: Dict<IdentityType> = Dict::new();
        let token = d1.pause_rehashing();
        let res = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            d2.resume_rehashing(token);
        }));
        assert!(res.is_err(), "owner identity must be enforced");
        d1.resume_raw();
    }

    #[test]
    fn resume_without_pause_panics() {
        let d: Dict<IdentityType> = Dict::new();
        let res = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            d.resume_raw();
        }));
        assert!(res.is_err(), "pause underflow must be detected");
    }

    #[test]
    fn fingerprint_tracks_every_structural_change() {
        let mut d: Dict<IdentityType> = Dict::new();
        let f0 = d.fingerprint();
        d.insert(1, 1).unwrap();
        let f1 = d.fingerprint();
        assert_ne!(f0, f1);
        d.insert(2, 2).unwrap();
        let f2 = d.fingerprint();
        assert_ne!(f1, f2);
        d.delete(&2);
        let f3 = d.fingerprint();
        assert_ne!(f2, f3);
        d.expand(64).unwrap();
        assert_ne!(f3, d.fingerprint());
    }

    #[test]
    fn fingerprint_is_stable_across_reads() {
        let mut d: Dict<IdentityType> = Dict::new();
        for k in 0..16 {
            d.insert(k, k).unwrap();
        }
        let f = d.fingerprint();
        let _ = d.get(&3);
        let _ = d.contains_key(&9);
        assert_eq!(f, d.fingerprint());
    }

    #[test]
    fn clear_with_hands_back_every_pair() {
        let mut d: Dict<IdentityType> = Dict::new();
        for k in 0..10 {
            d.insert(k, k * 2).unwrap();
        }
        let mut seen = Vec::new();
        d.clear_with(|k, v| seen.push((k, v)));
        seen.sort_unstable();
        assert_eq!(seen.len(), 10);
        for (i, (k, v)) in seen.into_iter().enumerate() {
            assert_eq!(k, i as u64);
            assert_eq!(v, k * 2);
        }
        assert!(d.is_empty());
        assert_eq!(d.slots(), 0);
    }

    #[test]
    fn find_entry_by_ptr_matches_identity() {
        let mut d: Dict<IdentityType> = Dict::new();
        for k in 0..8 {
            d.insert(k, k).unwrap();
        }
        while d.rehash(100) {}
        let hash = d.hash_key(&5);
        let ptr = d.find(&5).expect("present") as *const _;
        let found = d.find_entry_by_ptr(hash, ptr).expect("same entry");
        assert!(std::ptr::eq(found, ptr));
        // A pointer that is not in the selected chain is not found.
        assert!(d.find_entry_by_ptr(d.hash_key(&6), ptr).is_none());
    }

    #[test]
    fn shrink_to_fit_requests_minimal_size() {
        let mut d: Dict<IdentityType> = Dict::new();
        for k in 0..100 {
            d.insert(k, k).unwrap();
        }
        while d.rehash(100) {}
        for k in 10..100 {
            d.delete(&k);
        }
        d.shrink_to_fit().expect("shrink arms a migration");
        assert!(d.is_rehashing());
        assert_eq!(d.ht[1].size(), 16);
        while d.rehash(100) {}
        assert_eq!(d.slots(), 16);
        for k in 0..10 {
            assert_eq!(d.get(&k), Some(&k));
        }
    }
}
