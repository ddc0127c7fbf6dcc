//! Keyed byte-buffer hashing and the process-wide hash seed.
//!
//! The table itself hashes through its [`DictType`](crate::DictType); these
//! helpers exist for embedders that key their own structures the same way.

use std::hash::Hasher;
use std::sync::atomic::{AtomicU64, Ordering};

use siphasher::sip::SipHasher;

static SEED_K0: AtomicU64 = AtomicU64::new(0);
static SEED_K1: AtomicU64 = AtomicU64::new(0);

/// Installs the 16-byte seed used by [`gen_hash`], [`gen_case_hash`] and by
/// [`SipHashState`](crate::SipHashState) values created afterwards. Intended
/// to be called once at startup, before any table exists.
pub fn set_hash_seed(seed: [u8; 16]) {
    let mut k0 = [0u8; 8];
    let mut k1 = [0u8; 8];
    k0.copy_from_slice(&seed[..8]);
    k1.copy_from_slice(&seed[8..]);
    SEED_K0.store(u64::from_le_bytes(k0), Ordering::Relaxed);
    SEED_K1.store(u64::from_le_bytes(k1), Ordering::Relaxed);
}

/// Returns the current process-wide hash seed.
pub fn hash_seed() -> [u8; 16] {
    let (k0, k1) = seed_keys();
    let mut seed = [0u8; 16];
    seed[..8].copy_from_slice(&k0.to_le_bytes());
    seed[8..].copy_from_slice(&k1.to_le_bytes());
    seed
}

pub(crate) fn seed_keys() -> (u64, u64) {
    (
        SEED_K0.load(Ordering::Relaxed),
        SEED_K1.load(Ordering::Relaxed),
    )
}

/// Hashes a byte buffer with the seeded SipHash.
pub fn gen_hash(data: &[u8]) -> u64 {
    let (k0, k1) = seed_keys();
    let mut h = SipHasher::new_with_keys(k0, k1);
    h.write(data);
    h.finish()
}

/// Case-insensitive variant of [`gen_hash`]: ASCII bytes are lowercased
/// before mixing, so `b"Key"` and `b"kEY"` collide on purpose.
pub fn gen_case_hash(data: &[u8]) -> u64 {
    let (k0, k1) = seed_keys();
    let mut h = SipHasher::new_with_keys(k0, k1);
    let mut buf = [0u8; 64];
    for chunk in data.chunks(buf.len()) {
        let lowered = &mut buf[..chunk.len()];
        lowered.copy_from_slice(chunk);
        lowered.make_ascii_lowercase();
        h.write(lowered);
    }
    h.finish()
}
