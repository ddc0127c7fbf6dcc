//! Random sampling over buckets and chains.
//!
//! All sampling draws from a caller-supplied [`RngCore`], so embedders
//! control seeding and determinism.

use rand_core::RngCore;

use crate::dict::{Dict, RehashState};
use crate::entry::Entry;
use crate::types::DictType;

/// How many entries `fair_random_entry` samples before choosing.
const FAIR_SAMPLE: usize = 15;

/// Empty-bucket run length after which the sampling window jumps to a
/// fresh random offset.
const EMPTY_RUN_LIMIT: usize = 5;

impl<T: DictType> Dict<T> {
    /// Returns a random entry, or `None` when empty. Advances the rehash
    /// by one bucket first when a migration is in progress.
    ///
    /// The distribution is only roughly uniform: buckets are drawn
    /// uniformly, then a position along the found chain, so entries in
    /// short chains are somewhat favored. See
    /// [`Dict::fair_random_entry`] when that bias matters.
    pub fn random_entry<R: RngCore>(&mut self, rng: &mut R) -> Option<&Entry<T::Key, T::Val>> {
        if self.is_rehashing() {
            self.rehash_step();
        }
        self.random_pick(rng)
    }

    /// Random entry with reduced chain-length bias: draws a window of
    /// [`FAIR_SAMPLE`] entries and picks uniformly among them, falling
    /// back to [`Dict::random_entry`]'s strategy when the window comes up
    /// empty.
    pub fn fair_random_entry<R: RngCore>(
        &mut self,
        rng: &mut R,
    ) -> Option<&Entry<T::Key, T::Val>> {
        if self.is_rehashing() {
            self.rehash_step();
        }
        let sampled = self.sample_window(rng, FAIR_SAMPLE);
        if sampled.is_empty() {
            return self.random_pick(rng);
        }
        let idx = (rng.next_u64() as usize) % sampled.len();
        Some(sampled[idx])
    }

    /// Collects up to `count` entries from a window of consecutive buckets
    /// starting at a random offset, across both tables as appropriate.
    /// Meant for sampling, not exhaustive enumeration: the walk gives up
    /// after a bounded number of steps, so fewer than `count` entries may
    /// come back even when the table holds more.
    pub fn some_entries<R: RngCore>(
        &mut self,
        rng: &mut R,
        count: usize,
    ) -> Vec<&Entry<T::Key, T::Val>> {
        for _ in 0..count {
            if self.is_rehashing() {
                self.rehash_step();
            } else {
                break;
            }
        }
        self.sample_window(rng, count)
    }

    fn random_pick<R: RngCore>(&self, rng: &mut R) -> Option<&Entry<T::Key, T::Val>> {
        if self.len() == 0 {
            return None;
        }
        let first = if let RehashState::Rehashing { index } = self.rehash {
            // Buckets below the migration cursor are guaranteed empty, so
            // draw from the remaining span of both tables.
            let s0 = self.ht[0].size();
            loop {
                let h = index + (rng.next_u64() as usize) % (self.slots() - index);
                let bucket = if h >= s0 {
                    self.ht[1].buckets[h - s0].as_deref()
                } else {
                    self.ht[0].buckets[h].as_deref()
                };
                if let Some(e) = bucket {
                    break e;
                }
            }
        } else {
            loop {
                let h = (rng.next_u64() as usize) & self.ht[0].sizemask;
                if let Some(e) = self.ht[0].buckets[h].as_deref() {
                    break e;
                }
            }
        };

        // Uniform position along the found chain.
        let mut len = 0usize;
        let mut cur = Some(first);
        while let Some(e) = cur {
            len += 1;
            cur = e.next_entry();
        }
        let mut steps = (rng.next_u64() as usize) % len;
        let mut pick = first;
        while steps > 0 {
            pick = pick.next_entry().expect("offset is within the chain");
            steps -= 1;
        }
        Some(pick)
    }

    fn sample_window<R: RngCore>(
        &self,
        rng: &mut R,
        count: usize,
    ) -> Vec<&Entry<T::Key, T::Val>> {
        let count = count.min(self.len());
        if count == 0 {
            return Vec::new();
        }
        let mut out = Vec::with_capacity(count);
        let tables = if self.is_rehashing() { 2 } else { 1 };
        let maxmask = if tables == 2 {
            self.ht[0].sizemask.max(self.ht[1].sizemask)
        } else {
            self.ht[0].sizemask
        };
        let rehash_index = match self.rehash {
            RehashState::Rehashing { index } => index,
            RehashState::Idle => 0,
        };

        let mut i = (rng.next_u64() as usize) & maxmask;
        let mut emptylen = 0usize;
        let mut maxsteps = count * 10;
        while out.len() < count && maxsteps > 0 {
            maxsteps -= 1;
            for j in 0..tables {
                // The migrated prefix of the first table holds nothing;
                // skip it, or fold the index back onto it when the larger
                // table has been exhausted.
                if tables == 2 && j == 0 && i < rehash_index {
                    if i >= self.ht[1].size() {
                        i = rehash_index;
                    } else {
                        continue;
                    }
                }
                if i >= self.ht[j].size() {
                    continue;
                }
                match self.ht[j].buckets[i].as_deref() {
                    None => {
                        emptylen += 1;
                        if emptylen >= EMPTY_RUN_LIMIT && emptylen > count {
                            i = (rng.next_u64() as usize) & maxmask;
                            emptylen = 0;
                        }
                    }
                    Some(head) => {
                        emptylen = 0;
                        let mut cur = Some(head);
                        while let Some(e) = cur {
                            out.push(e);
                            if out.len() == count {
                                return out;
                            }
                            cur = e.next_entry();
                        }
                    }
                }
            }
            i = (i + 1) & maxmask;
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use rand_core::SeedableRng;
    use rand_pcg::Lcg128Xsl64 as Pcg;

    use crate::dict::Dict;
    use crate::types::DictType;

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

    fn filled(n: u64) -> Dict<IdentityType> {
        let mut d = Dict::new();
        for k in 0..n {
            d.insert(k, k).unwrap();
        }
        d
    }

    #[test]
    fn random_entry_on_empty_dict_is_none() {
        let mut d: Dict<IdentityType> = Dict::new();
        let mut rng = Pcg::seed_from_u64(1);
        assert!(d.random_entry(&mut rng).is_none());
        assert!(d.fair_random_entry(&mut rng).is_none());
        assert!(d.some_entries(&mut rng, 10).is_empty());
    }

    #[test]
    fn random_entry_returns_live_entries() {
        let mut d = filled(64);
        let mut rng = Pcg::seed_from_u64(2);
        let mut seen = BTreeSet::new();
        for _ in 0..256 {
            let e = d.random_entry(&mut rng).expect("dict not empty");
            let k = *e.key();
            assert!(k < 64);
            seen.insert(k);
        }
        // 256 draws over 64 keys: a healthy spread, not one hot key.
        assert!(seen.len() > 16, "only {} distinct keys drawn", seen.len());
    }

    #[test]
    fn random_entry_works_mid_rehash() {
        let mut d = filled(32);
        while d.rehash(100) {}
        d.expand(128).unwrap();
        d.rehash(2);
        let mut rng = Pcg::seed_from_u64(3);
        for _ in 0..100 {
            let e = d.random_entry(&mut rng).expect("dict not empty");
            assert!(*e.key() < 32);
        }
    }

    #[test]
    fn some_entries_respects_count_and_validity() {
        let mut d = filled(100);
        let mut rng = Pcg::seed_from_u64(4);
        let picked = d.some_entries(&mut rng, 10);
        assert!(picked.len() <= 10);
        assert!(!picked.is_empty());
        for e in &picked {
            assert!(*e.key() < 100);
        }
        // Asking for more than the dictionary holds caps at its size.
        let all = d.some_entries(&mut rng, 1000);
        assert!(all.len() <= 100);
    }

    #[test]
    fn fair_random_entry_returns_live_entries() {
        let mut d = filled(50);
        let mut rng = Pcg::seed_from_u64(5);
        let mut seen = BTreeSet::new();
        for _ in 0..200 {
            let e = d.fair_random_entry(&mut rng).expect("dict not empty");
            seen.insert(*e.key());
        }
        assert!(seen.len() > 10);
    }
}
