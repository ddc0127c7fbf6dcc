//! Table type policies: hashing, key equality, and expansion consent.

use core::hash::{BuildHasher, Hash};
use core::marker::PhantomData;

use siphasher::sip::SipHasher;

use crate::dict::Dict;
use crate::hash::seed_keys;

/// Per-table policy bundle. The implementing value is owned by the
/// dictionary and plays the role of the classic function-pointer vtable plus
/// its private data: hashing, key comparison, and the optional consent hook
/// for automatic expansion.
pub trait DictType {
    type Key;
    type Val;

    fn hash(&self, key: &Self::Key) -> u64;

    fn key_eq(&self, a: &Self::Key, b: &Self::Key) -> bool;

    /// Consulted before an automatic expansion. `more_mem` is the size in
    /// bytes of the bucket array about to be allocated, `used_ratio` the
    /// current load factor. Declining skips the expansion without failing
    /// the triggering operation.
    fn expand_allowed(&self, more_mem: usize, used_ratio: f64) -> bool {
        let _ = (more_mem, used_ratio);
        true
    }
}

/// `BuildHasher` over the process-seeded SipHash. The seed is captured at
/// construction time, so tables keep hashing consistently even if the
/// embedder re-seeds later.
#[derive(Debug, Clone, Copy)]
pub struct SipHashState {
    k0: u64,
    k1: u64,
}

impl SipHashState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_keys(k0: u64, k1: u64) -> Self {
        SipHashState { k0, k1 }
    }
}

impl Default for SipHashState {
    fn default() -> Self {
        let (k0, k1) = seed_keys();
        SipHashState { k0, k1 }
    }
}

impl BuildHasher for SipHashState {
    type Hasher = SipHasher;

    fn build_hasher(&self) -> SipHasher {
        SipHasher::new_with_keys(self.k0, self.k1)
    }
}

/// The stock policy: hash with any `BuildHasher`, compare with `Eq`.
pub struct HashType<K, V, S = SipHashState> {
    hasher: S,
    _marker: PhantomData<fn(K, V)>,
}

impl<K, V, S> HashType<K, V, S> {
    pub fn with_hasher(hasher: S) -> Self {
        HashType {
            hasher,
            _marker: PhantomData,
        }
    }
}

impl<K, V> HashType<K, V> {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<K, V, S: Default> Default for HashType<K, V, S> {
    fn default() -> Self {
        Self::with_hasher(S::default())
    }
}

impl<K, V, S> DictType for HashType<K, V, S>
where
    K: Hash + Eq,
    S: BuildHasher,
{
    type Key = K;
    type Val = V;

    fn hash(&self, key: &K) -> u64 {
        self.hasher.hash_one(key)
    }

    fn key_eq(&self, a: &K, b: &K) -> bool {
        a == b
    }
}

/// Dictionary over the stock policy.
pub type HashDict<K, V, S = SipHashState> = Dict<HashType<K, V, S>>;
