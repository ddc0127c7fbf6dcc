//! The cursor-based scan protocol.
//!
//! `scan` performs one step of a full traversal that tolerates the table
//! being resized and rehashed between steps. The opaque cursor is a
//! reversed-bit counter: after visiting bucket `v & mask` the bits above
//! the mask are set and the cursor is incremented on its *high* bits
//! (reverse, add one, reverse back). Because bucket indices of a smaller
//! table are suffixes of the corresponding indices in any larger table,
//! every logical slot is visited exactly once across both table sizes, and
//! a scan that started before a resize still covers everything that was
//! present throughout.
//!
//! Guarantee: every entry present for the whole scan is reported at least
//! once; entries added or removed mid-scan may or may not be seen; nothing
//! is reported more than a bounded number of times.

use crate::dict::Dict;
use crate::entry::Entry;
use crate::types::DictType;

/// One reversed-bit increment of the cursor over the given mask.
fn advance_cursor(v: u64, mask: u64) -> u64 {
    let mut v = v | !mask;
    v = v.reverse_bits();
    v = v.wrapping_add(1);
    v.reverse_bits()
}

impl<T: DictType> Dict<T> {
    /// One scan step: reports every entry of the bucket(s) selected by
    /// `cursor` to `f` and returns the next cursor. Start at 0; the
    /// traversal is complete when 0 comes back.
    pub fn scan<F>(&self, cursor: u64, mut f: F) -> u64
    where
        F: FnMut(&Entry<T::Key, T::Val>),
    {
        if self.len() == 0 {
            return 0;
        }
        let mut v = cursor;
        if !self.is_rehashing() {
            let t0 = &self.ht[0];
            let m0 = t0.sizemask as u64;
            emit_chain(t0.buckets[(v & m0) as usize].as_deref(), &mut f);
            return advance_cursor(v, m0);
        }

        // Mid-rehash both tables are live. Visit the small-table bucket,
        // then every large-table bucket whose index has it as a suffix;
        // advancing on the larger mask keeps the interleave consistent
        // even if the rehash finishes (or another one starts) between
        // steps.
        let (t0, t1) = if self.ht[0].size() > self.ht[1].size() {
            (&self.ht[1], &self.ht[0])
        } else {
            (&self.ht[0], &self.ht[1])
        };
        let m0 = t0.sizemask as u64;
        let m1 = t1.sizemask as u64;
        emit_chain(t0.buckets[(v & m0) as usize].as_deref(), &mut f);
        loop {
            emit_chain(t1.buckets[(v & m1) as usize].as_deref(), &mut f);
            v = advance_cursor(v, m1);
            if v & (m0 ^ m1) == 0 {
                return v;
            }
        }
    }

    /// Like [`Dict::scan`], but hands `f` each visited bucket as a whole,
    /// with mutable access, so a sweep can rewrite or prune a bucket in
    /// one go (active expiration being the classic use).
    pub fn scan_buckets<F>(&mut self, cursor: u64, mut f: F) -> u64
    where
        F: FnMut(&mut Bucket<'_, T::Key, T::Val>),
    {
        if self.len() == 0 {
            return 0;
        }
        let mut v = cursor;
        if !self.is_rehashing() {
            let m0 = self.ht[0].sizemask as u64;
            let table = &mut self.ht[0];
            let mut bucket = Bucket {
                head: &mut table.buckets[(v & m0) as usize],
                used: &mut table.used,
            };
            f(&mut bucket);
            return advance_cursor(v, m0);
        }

        let (small, large) = if self.ht[0].size() > self.ht[1].size() {
            (1, 0)
        } else {
            (0, 1)
        };
        let m0 = self.ht[small].sizemask as u64;
        let m1 = self.ht[large].sizemask as u64;
        {
            let table = &mut self.ht[small];
            let mut bucket = Bucket {
                head: &mut table.buckets[(v & m0) as usize],
                used: &mut table.used,
            };
            f(&mut bucket);
        }
        loop {
            {
                let table = &mut self.ht[large];
                let mut bucket = Bucket {
                    head: &mut table.buckets[(v & m1) as usize],
                    used: &mut table.used,
                };
                f(&mut bucket);
            }
            v = advance_cursor(v, m1);
            if v & (m0 ^ m1) == 0 {
                return v;
            }
        }
    }
}

fn emit_chain<K, V, F: FnMut(&Entry<K, V>)>(head: Option<&Entry<K, V>>, f: &mut F) {
    let mut cur = head;
    while let Some(e) = cur {
        f(e);
        cur = e.next_entry();
    }
}

/// A whole collision chain handed out by [`Dict::scan_buckets`].
pub struct Bucket<'a, K, V> {
    head: &'a mut Option<Box<Entry<K, V>>>,
    used: &'a mut usize,
}

impl<K, V> Bucket<'_, K, V> {
    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    pub fn entries(&self) -> impl Iterator<Item = (&K, &V)> {
        let mut cur = self.head.as_deref();
        std::iter::from_fn(move || {
            let e = cur?;
            cur = e.next_entry();
            Some((&e.key, &e.val))
        })
    }

    /// Keeps only the entries for which `pred` returns true, unlinking the
    /// rest. The table's live count tracks the removals.
    pub fn retain<F>(&mut self, mut pred: F)
    where
        F: FnMut(&K, &mut V) -> bool,
    {
        let mut cur: &mut Option<Box<Entry<K, V>>> = self.head;
        loop {
            let keep = match cur {
                None => return,
                Some(e) => pred(&e.key, &mut e.val),
            };
            if keep {
                cur = match cur {
                    Some(e) => &mut e.next,
                    None => unreachable!("matched Some above"),
                };
            } else {
                let mut removed = cur.take().expect("matched Some above");
                *cur = removed.next.take();
                *self.used -= 1;
            }
        }
    }
}
