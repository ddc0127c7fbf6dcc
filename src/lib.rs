//! incr-hashmap: a chained hash table with incremental rehashing.
//!
//! The dictionary keeps two power-of-two bucket arrays. All entries live
//! in the first until growth (or shrinking) arms a migration; from then on
//! every mutating operation moves one old bucket across, inserts land in
//! the new array, and lookups probe both. No operation ever pays for a
//! full resize at once, which is the point: the structure is meant to sit
//! inside a latency-sensitive single-threaded event loop.
//!
//! Per-table behavior (hashing, key equality, expansion consent) comes
//! from a [`DictType`] policy the dictionary is generic over; [`HashDict`]
//! is the stock instantiation for `K: Hash + Eq` over a process-seeded
//! SipHash.
//!
//! Traversal comes in three shapes:
//! - [`Dict::iter`], a plain borrowing iterator;
//! - detached cursors ([`Dict::cursor`], [`Dict::safe_cursor`]) that allow
//!   or detect mutation while iterating;
//! - [`Dict::scan`], a stateless reversed-bit cursor walk that tolerates
//!   the table being resized between steps.

mod dict;
mod dict_proptest;
mod entry;
mod error;
pub mod hash;
mod iter;
mod sample;
mod scan;
mod stats;
mod table;
mod types;

pub use dict::{disable_resize, enable_resize, Dict, RehashPause, Replaced};
pub use entry::Entry;
pub use error::{ExpandError, InsertError};
pub use hash::{gen_case_hash, gen_hash, hash_seed, set_hash_seed};
pub use iter::{Cursor, Iter, SafeCursor};
pub use scan::Bucket;
pub use types::{DictType, HashDict, HashType, SipHashState};
