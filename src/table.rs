//! Power-of-two bucket arrays.

use std::collections::TryReserveError;

use crate::entry::Entry;

/// Smallest allocated bucket-array size.
pub(crate) const INITIAL_SIZE: usize = 4;

/// One bucket array: chain heads, the index mask, and the live-entry count.
/// A dictionary owns two of these so entries can migrate incrementally from
/// the old array to the new one.
pub(crate) struct Table<K, V> {
    pub(crate) buckets: Vec<Option<Box<Entry<K, V>>>>,
    pub(crate) sizemask: usize,
    pub(crate) used: usize,
}

impl<K, V> Table<K, V> {
    /// A table with no backing array. `sizemask` is 0 by convention.
    pub(crate) fn unallocated() -> Self {
        Table {
            buckets: Vec::new(),
            sizemask: 0,
            used: 0,
        }
    }

    pub(crate) fn with_size(size: usize) -> Self {
        debug_assert!(size.is_power_of_two());
        let mut buckets = Vec::with_capacity(size);
        buckets.resize_with(size, || None);
        Table {
            buckets,
            sizemask: size - 1,
            used: 0,
        }
    }

    /// Fallible-allocation variant of [`Table::with_size`].
    pub(crate) fn try_with_size(size: usize) -> Result<Self, TryReserveError> {
        debug_assert!(size.is_power_of_two());
        let mut buckets = Vec::new();
        buckets.try_reserve_exact(size)?;
        buckets.resize_with(size, || None);
        Ok(Table {
            buckets,
            sizemask: size - 1,
            used: 0,
        })
    }

    pub(crate) fn size(&self) -> usize {
        self.buckets.len()
    }

    pub(crate) fn is_unallocated(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Returns the table to the unallocated state, dropping all entries.
    pub(crate) fn reset(&mut self) {
        self.buckets = Vec::new();
        self.sizemask = 0;
        self.used = 0;
    }

    pub(crate) fn base_ptr(&self) -> *const Option<Box<Entry<K, V>>> {
        self.buckets.as_ptr()
    }
}

impl<K, V> Drop for Table<K, V> {
    fn drop(&mut self) {
        // Unlink chains iteratively so deep collision chains cannot recurse
        // the drop glue off the stack.
        for slot in &mut self.buckets {
            let mut chain = slot.take();
            while let Some(mut e) = chain {
                chain = e.next.take();
            }
        }
    }
}

/// The smallest power of two that is `>= size`, never below
/// [`INITIAL_SIZE`].
pub(crate) fn next_power(size: usize) -> usize {
    size.max(INITIAL_SIZE).next_power_of_two()
}
