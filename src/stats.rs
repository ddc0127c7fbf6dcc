//! Human-readable table statistics.

use std::fmt::Write;

use crate::dict::Dict;
use crate::table::Table;
use crate::types::DictType;

/// Chain-length histogram bins; the last bin aggregates everything longer.
const STATS_VECTLEN: usize = 50;

impl<T: DictType> Dict<T> {
    /// Renders a summary of both tables: sizes, load, how many slots are
    /// in use, and the chain-length distribution with the longest chain.
    pub fn stats(&self) -> String {
        let mut out = String::new();
        table_stats(&mut out, &self.ht[0], 0);
        if self.is_rehashing() {
            out.push_str("-- Rehashing into ht[1]:\n");
            table_stats(&mut out, &self.ht[1], 1);
        }
        out
    }
}

fn table_stats<K, V>(out: &mut String, table: &Table<K, V>, id: usize) {
    if table.used == 0 {
        let _ = writeln!(out, "Hash table {id} stats: No stats available for empty tables");
        return;
    }

    let mut slots_used = 0usize;
    let mut max_chain = 0usize;
    let mut total_chain = 0usize;
    let mut histogram = [0usize; STATS_VECTLEN];
    for bucket in &table.buckets {
        let mut chain_len = 0usize;
        let mut cur = bucket.as_deref();
        while let Some(e) = cur {
            chain_len += 1;
            cur = e.next_entry();
        }
        if chain_len == 0 {
            histogram[0] += 1;
            continue;
        }
        slots_used += 1;
        histogram[chain_len.min(STATS_VECTLEN - 1)] += 1;
        max_chain = max_chain.max(chain_len);
        total_chain += chain_len;
    }

    let _ = writeln!(out, "Hash table {id} stats:");
    let _ = writeln!(out, " table size: {}", table.size());
    let _ = writeln!(out, " number of elements: {}", table.used);
    let _ = writeln!(out, " different slots: {slots_used}");
    let _ = writeln!(out, " max chain length: {max_chain}");
    let _ = writeln!(
        out,
        " avg chain length (counted): {:.2}",
        total_chain as f64 / slots_used as f64
    );
    let _ = writeln!(
        out,
        " avg chain length (computed): {:.2}",
        table.used as f64 / slots_used as f64
    );
    let _ = writeln!(out, " Chain length distribution:");
    for (len, &n) in histogram.iter().enumerate() {
        if n == 0 {
            continue;
        }
        let _ = writeln!(
            out,
            "   {}{}: {} ({:.2}%)",
            len,
            if len == STATS_VECTLEN - 1 { "+" } else { "" },
            n,
            n as f64 * 100.0 / table.size() as f64
        );
    }
}
