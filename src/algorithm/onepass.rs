//! One-pass differencing.
//!
//! Scans reference and version concurrently, fingerprinting the seed under
//! each cursor into its own table and cross-checking the other string's
//! table for a meeting point. Tables hold one offset per fingerprint
//! (first-found) and are logically flushed after every emitted copy by
//! bumping a shared epoch counter; stale entries read as absent without
//! touching the slots. O(|R| + |V|) time, O(q) space.
//!
//! Transposed blocks defeat the single forward pass: material that appears
//! in a different order in the two strings is encoded as literals.

use tracing::debug;

use crate::hash::{next_prime, FingerprintCursor};
use crate::index::DirectTable;
use crate::splay::SplayTree;
use crate::types::{Command, DiffOptions};

/// A recorded seed: where it starts and which scan epoch recorded it.
#[derive(Clone, Copy)]
struct SeedSlot {
    offset: usize,
    epoch: u64,
}

/// Epoch-validated index over one string's seeds.
enum EpochIndex {
    Table(DirectTable<SeedSlot>),
    Splay(SplayTree<SeedSlot>),
}

impl EpochIndex {
    fn new(use_splay: bool, capacity: usize) -> Self {
        if use_splay {
            EpochIndex::Splay(SplayTree::new())
        } else {
            EpochIndex::Table(DirectTable::new(capacity))
        }
    }

    /// Record a seed under the current epoch. An entry already recorded in
    /// this epoch is retained (first-found); entries from earlier epochs
    /// are logically absent and may be replaced.
    fn record(&mut self, fp: u64, offset: usize, epoch: u64) {
        match self {
            EpochIndex::Table(t) => {
                let bucket = t.home_bucket(fp);
                match t.slot(bucket) {
                    Some((_, slot)) if slot.epoch == epoch => {}
                    _ => t.insert_overwrite(bucket, fp, SeedSlot { offset, epoch }),
                }
            }
            EpochIndex::Splay(t) => {
                let slot = t.insert_or_get(fp, SeedSlot { offset, epoch });
                if slot.epoch != epoch {
                    *slot = SeedSlot { offset, epoch };
                }
            }
        }
    }

    /// Offset recorded for `fp` in the current epoch, if any. The stored
    /// fingerprint is checked against the query: the slot holds whatever
    /// fingerprint claimed it, not necessarily ours.
    fn lookup(&mut self, fp: u64, epoch: u64) -> Option<usize> {
        match self {
            EpochIndex::Table(t) => {
                let bucket = t.home_bucket(fp);
                t.find(bucket, fp)
                    .filter(|slot| slot.epoch == epoch)
                    .map(|slot| slot.offset)
            }
            EpochIndex::Splay(t) => t
                .find(fp)
                .filter(|slot| slot.epoch == epoch)
                .map(|slot| slot.offset),
        }
    }
}

pub fn diff(r: &[u8], v: &[u8], opts: &DiffOptions) -> Vec<Command> {
    let p = opts.seed_len;
    let mut commands = Vec::new();
    if v.is_empty() {
        return commands;
    }

    // Capacity scales with the number of reference seeds, never below the
    // caller's floor.
    let num_seeds = if r.len() >= p { r.len() - p + 1 } else { 0 };
    let q = next_prime(opts.table_size.max(num_seeds / p));

    if opts.verbose {
        debug!(
            backing = if opts.use_splay { "splay" } else { "table" },
            q,
            r_len = r.len(),
            v_len = v.len(),
            seed_len = p,
            "onepass"
        );
    }

    let mut h_r = EpochIndex::new(opts.use_splay, q);
    let mut h_v = EpochIndex::new(opts.use_splay, q);
    let mut epoch: u64 = 0;

    let mut r_c = 0usize;
    let mut v_c = 0usize;
    let mut v_s = 0usize;

    let mut cursor_r = FingerprintCursor::new(r, p);
    let mut cursor_v = FingerprintCursor::new(v, p);

    loop {
        let can_r = r_c + p <= r.len();
        let can_v = v_c + p <= v.len();
        if !can_r && !can_v {
            break;
        }

        let fp_r = match (can_r, cursor_r.as_mut()) {
            (true, Some(c)) => Some(c.at(r_c)),
            _ => None,
        };
        let fp_v = match (can_v, cursor_v.as_mut()) {
            (true, Some(c)) => Some(c.at(v_c)),
            _ => None,
        };

        if let Some(fp) = fp_v {
            h_v.record(fp, v_c, epoch);
        }
        if let Some(fp) = fp_r {
            h_r.record(fp, r_c, epoch);
        }

        // Cross-lookup: the reference seed against the version table first,
        // then the other direction. Every fingerprint hit is byte-verified.
        let mut matched: Option<(usize, usize)> = None; // (r_m, v_m)
        if let Some(fp) = fp_r {
            if let Some(v_cand) = h_v.lookup(fp, epoch) {
                if r[r_c..r_c + p] == v[v_cand..v_cand + p] {
                    matched = Some((r_c, v_cand));
                }
            }
        }
        if matched.is_none() {
            if let Some(fp) = fp_v {
                if let Some(r_cand) = h_r.lookup(fp, epoch) {
                    if v[v_c..v_c + p] == r[r_cand..r_cand + p] {
                        matched = Some((r_cand, v_c));
                    }
                }
            }
        }

        let (r_m, v_m) = match matched {
            Some(m) => m,
            None => {
                v_c += 1;
                r_c += 1;
                continue;
            }
        };

        // Forward-only extension from the meeting point.
        let mut ml = 0usize;
        while v_m + ml < v.len() && r_m + ml < r.len() && v[v_m + ml] == r[r_m + ml] {
            ml += 1;
        }
        if ml < p {
            // Cannot happen after byte verification; kept as a guard.
            v_c += 1;
            r_c += 1;
            continue;
        }

        if v_s < v_m {
            commands.push(Command::Add {
                data: v[v_s..v_m].to_vec(),
            });
        }
        commands.push(Command::Copy {
            offset: r_m,
            length: ml,
        });
        v_s = v_m + ml;
        v_c = v_m + ml;
        r_c = r_m + ml;
        epoch += 1; // logical flush of both tables
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
