//! Greedy longest-match differencing.
//!
//! Indexes every seed of the reference under its full fingerprint, keeping
//! all offsets that share one, then scans the version and takes the longest
//! verified match at each position. Optimal in the number of commands
//! emitted; O(|V| * |R|) worst-case time, O(|R|) space.

use std::collections::HashMap;

use tracing::debug;

use crate::hash::FingerprintCursor;
use crate::splay::SplayTree;
use crate::types::{Command, DiffOptions};

/// Offset lists keyed by full fingerprint, so backing choice cannot change
/// which matches exist: both retain every reference offset.
enum OffsetIndex {
    Map(HashMap<u64, Vec<usize>>),
    Splay(SplayTree<Vec<usize>>),
}

impl OffsetIndex {
    fn new(use_splay: bool) -> Self {
        if use_splay {
            OffsetIndex::Splay(SplayTree::new())
        } else {
            OffsetIndex::Map(HashMap::new())
        }
    }

    fn record(&mut self, fp: u64, offset: usize) {
        match self {
            OffsetIndex::Map(m) => m.entry(fp).or_default().push(offset),
            OffsetIndex::Splay(t) => t.insert_or_get(fp, Vec::new()).push(offset),
        }
    }

    fn candidates(&mut self, fp: u64) -> Option<&[usize]> {
        match self {
            OffsetIndex::Map(m) => m.get(&fp).map(|v| v.as_slice()),
            OffsetIndex::Splay(t) => t.find(fp).map(|v| v.as_slice()),
        }
    }
}

pub fn diff(r: &[u8], v: &[u8], opts: &DiffOptions) -> Vec<Command> {
    let p = opts.seed_len;
    let mut commands = Vec::new();
    if v.is_empty() {
        return commands;
    }

    // Index every seed of R under its full fingerprint.
    let mut index = OffsetIndex::new(opts.use_splay);
    if let Some(mut cursor) = FingerprintCursor::new(r, p) {
        for a in 0..=(r.len() - p) {
            index.record(cursor.at(a), a);
        }
    }

    if opts.verbose {
        debug!(
            backing = if opts.use_splay { "splay" } else { "table" },
            r_len = r.len(),
            v_len = v.len(),
            seed_len = p,
            "greedy"
        );
    }

    let mut v_c = 0usize; // scan cursor
    let mut v_s = 0usize; // emitted-through cursor
    let mut cursor_v = FingerprintCursor::new(v, p);

    while v_c + p <= v.len() {
        let fp_v = match cursor_v.as_mut() {
            Some(c) => c.at(v_c),
            None => break,
        };

        // Longest verified match among all candidates sharing the
        // fingerprint; candidate order fixes ties at the first-indexed
        // (lowest) reference offset.
        let mut best_offset = 0usize;
        let mut best_len = 0usize;
        if let Some(candidates) = index.candidates(fp_v) {
            for &r_cand in candidates {
                if r[r_cand..r_cand + p] != v[v_c..v_c + p] {
                    continue; // fingerprint collision
                }
                let mut ml = p;
                while v_c + ml < v.len() && r_cand + ml < r.len() && v[v_c + ml] == r[r_cand + ml] {
                    ml += 1;
                }
                if ml > best_len {
                    best_len = ml;
                    best_offset = r_cand;
                }
            }
        }

        if best_len < p {
            v_c += 1;
            continue;
        }

        if v_s < v_c {
            commands.push(Command::Add {
                data: v[v_s..v_c].to_vec(),
            });
        }
        commands.push(Command::Copy {
            offset: best_offset,
            length: best_len,
        });
        v_s = v_c + best_len;
        v_c += best_len;
    }

    if v_s < v.len() {
        commands.push(Command::Add {
            data: v[v_s..].to_vec(),
        });
    }

    if opts.verbose {
        super::log_command_stats(&commands);
    }

    commands
}
