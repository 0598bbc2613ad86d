//! Correcting 1.5-pass differencing with fingerprint checkpointing.
//!
//! Pass one indexes the reference; the half pass scans the version,
//! extending each match both forward and backward from the seed and fixing
//! up provisional commands through the lookback buffer when a backward
//! extension overlaps them.
//!
//! Checkpointing keeps the index bounded for any reference size: seeds are
//! admitted only when their footprint (fingerprint reduced into a universe
//! of about twice the seed count) falls into one stride class, chosen from
//! the version itself. Roughly half the table fills no matter how large the
//! reference is; matches shorter than the stride may be missed, longer ones
//! are recovered by backward extension.

use tracing::debug;

use crate::hash::{fingerprint, next_prime, FingerprintCursor};
use crate::index::DirectTable;
use crate::lookback::{LookbackBuffer, LookbackEntry};
use crate::splay::SplayTree;
use crate::types::{Command, DiffOptions};

/// Derived checkpoint geometry.
struct Checkpoint {
    /// Hash table capacity, |C|.
    capacity: usize,
    /// Footprint universe size, |F|.
    universe: u64,
    /// Stride between admitted footprint classes, m.
    stride: u64,
    /// The admitted class, k.
    class: u64,
}

impl Checkpoint {
    /// Geometry for a given reference/version pair.
    ///
    /// The class is taken from the fingerprint of the version's middle seed
    /// so the reference index admits seeds the version scan will actually
    /// probe; a version shorter than one seed pins the class to zero.
    fn derive(r: &[u8], v: &[u8], p: usize, q_floor: usize) -> Self {
        let num_seeds = if r.len() >= p { r.len() - p + 1 } else { 0 };
        let capacity = next_prime(q_floor.max(2 * num_seeds / p));
        let universe = if num_seeds == 0 {
            1
        } else {
            next_prime(2 * num_seeds) as u64
        };
        let stride = (universe + capacity as u64 - 1) / capacity as u64;
        let class = if v.len() < p {
            0
        } else {
            let mid = (v.len() - p) / 2;
            (fingerprint(v, mid, p) % universe) % stride
        };
        Checkpoint {
            capacity,
            universe,
            stride,
            class,
        }
    }

    /// Footprint of a fingerprint.
    #[inline]
    fn footprint(&self, fp: u64) -> u64 {
        fp % self.universe
    }

    /// Whether a seed with this fingerprint is admitted to the index.
    #[inline]
    fn admits(&self, fp: u64) -> bool {
        self.footprint(fp) % self.stride == self.class
    }

    /// Table bucket of an admitted fingerprint.
    #[inline]
    fn bucket(&self, fp: u64) -> usize {
        (self.footprint(fp) / self.stride) as usize
    }
}

/// Reference index over checkpoint seeds.
///
/// The table backing buckets by footprint class position, so two distinct
/// fingerprints can contend for one bucket and the later loses
/// (first-found). The splay backing keys on the full fingerprint and cannot
/// collide, so it finds strictly more matches. The two are therefore NOT
/// output-identical for this engine; both behaviors are deliberate.
enum RefIndex {
    Table(DirectTable<usize>),
    Splay(SplayTree<usize>),
}

impl RefIndex {
    fn record(&mut self, ckpt: &Checkpoint, fp: u64, offset: usize) {
        match self {
            RefIndex::Table(t) => {
                t.insert_first(ckpt.bucket(fp), fp, offset);
            }
            RefIndex::Splay(t) => {
                t.insert_or_get(fp, offset);
            }
        }
    }

    fn lookup(&mut self, ckpt: &Checkpoint, fp: u64) -> Option<usize> {
        match self {
            RefIndex::Table(t) => t.find(ckpt.bucket(fp), fp).copied(),
            RefIndex::Splay(t) => t.find(fp).copied(),
        }
    }
}

/// Reclaim buffered commands superseded by a match over `v_m..match_end`.
///
/// Walks the buffer from the newest entry: entries wholly inside the match
/// are absorbed; a literal straddling `v_m` is trimmed to end there; a copy
/// straddling `v_m` stops the walk unreclaimed. Returns the version offset
/// from which the new copy must actually encode: the smallest absorbed
/// start, or `v_s` when nothing was reclaimed.
fn reclaim_tail(
    buf: &mut LookbackBuffer,
    v: &[u8],
    v_m: usize,
    match_end: usize,
    v_s: usize,
) -> usize {
    let mut effective_start = v_s;
    while let Some(tail) = buf.back() {
        if tail.v_start >= v_m && tail.v_end <= match_end {
            // Wholly inside the new match: absorb it.
            effective_start = effective_start.min(tail.v_start);
            buf.pop_back();
            continue;
        }
        if tail.v_start < v_m && tail.v_end > v_m {
            if matches!(tail.cmd, Command::Add { .. }) {
                // Straddling literal: keep only its prefix.
                let tail = match buf.back_mut() {
                    Some(t) => t,
                    None => break,
                };
                tail.cmd = Command::Add {
                    data: v[tail.v_start..v_m].to_vec(),
                };
                tail.v_end = v_m;
                effective_start = effective_start.min(v_m);
            }
            // A straddling copy is never reclaimed.
        }
        break;
    }
    effective_start
}

pub fn diff(r: &[u8], v: &[u8], opts: &DiffOptions) -> Vec<Command> {
    let p = opts.seed_len;
    let mut commands = Vec::new();
    if v.is_empty() {
        return commands;
    }

    let ckpt = Checkpoint::derive(r, v, p, opts.table_size);

    if opts.verbose {
        debug!(
            backing = if opts.use_splay { "splay" } else { "table" },
            capacity = ckpt.capacity,
            universe = ckpt.universe,
            stride = ckpt.stride,
            class = ckpt.class,
            r_len = r.len(),
            v_len = v.len(),
            seed_len = p,
            buf_cap = opts.buf_cap,
            "correcting"
        );
    }

    // Pass 1: index the reference's checkpoint seeds, first-found.
    let mut index = if opts.use_splay {
        RefIndex::Splay(SplayTree::new())
    } else {
        RefIndex::Table(DirectTable::new(ckpt.capacity))
    };
    if let Some(mut cursor) = FingerprintCursor::new(r, p) {
        for a in 0..=(r.len() - p) {
            let fp = cursor.at(a);
            if ckpt.admits(fp) {
                index.record(&ckpt, fp, a);
            }
        }
    }

    // Half pass: scan the version, correcting through the lookback buffer.
    let mut buf = LookbackBuffer::new(opts.buf_cap);
    let mut v_c = 0usize;
    let mut v_s = 0usize;
    let mut cursor_v = FingerprintCursor::new(v, p);

    while v_c + p <= v.len() {
        let fp_v = match cursor_v.as_mut() {
            Some(c) => c.at(v_c),
            None => break,
        };
        if !ckpt.admits(fp_v) {
            v_c += 1;
            continue;
        }
        let r_cand = match index.lookup(&ckpt, fp_v) {
            Some(off) if r[off..off + p] == v[v_c..v_c + p] => off,
            _ => {
                v_c += 1;
                continue;
            }
        };

        // Extend forward, then backward past the seed.
        let mut fwd = p;
        while v_c + fwd < v.len() && r_cand + fwd < r.len() && v[v_c + fwd] == r[r_cand + fwd] {
            fwd += 1;
        }
        let mut bwd = 0usize;
        while v_c > bwd && r_cand > bwd && v[v_c - bwd - 1] == r[r_cand - bwd - 1] {
            bwd += 1;
        }
        let v_m = v_c - bwd;
        let r_m = r_cand - bwd;
        let ml = bwd + fwd;
        let match_end = v_m + ml;
        if ml < p {
            v_c += 1;
            continue;
        }

        if v_s <= v_m {
            // The match lies in the unencoded suffix: buffer a literal for
            // the gap, then the copy.
            if v_s < v_m {
                buf.push(
                    LookbackEntry::new(
                        v_s,
                        v_m,
                        Command::Add {
                            data: v[v_s..v_m].to_vec(),
                        },
                    ),
                    &mut commands,
                );
            }
            buf.push(
                LookbackEntry::new(
                    v_m,
                    match_end,
                    Command::Copy {
                        offset: r_m,
                        length: ml,
                    },
                ),
                &mut commands,
            );
        } else {
            // Tail correction: the backward extension reaches into already
            // buffered encodings.
            let effective_start = reclaim_tail(&mut buf, v, v_m, match_end, v_s);
            let adj = effective_start - v_m;
            let length = match_end - effective_start;
            if length > 0 {
                buf.push(
                    LookbackEntry::new(
                        effective_start,
                        match_end,
                        Command::Copy {
                            offset: r_m + adj,
                            length,
                        },
                    ),
                    &mut commands,
                );
            }
        }
        v_s = match_end;
        v_c = match_end;
    }

    buf.flush(&mut commands);
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apply::apply_delta;
    use crate::types::TABLE_SIZE;

    fn opts(seed_len: usize, table_size: usize) -> DiffOptions {
        DiffOptions {
            seed_len,
            table_size,
            ..DiffOptions::default()
        }
    }

    #[test]
    fn checkpoint_geometry_small_reference() {
        // 320-byte reference, p=16: 305 seeds, capacity from the q=7 floor.
        let r = b"ABCDEFGHIJKLMNOP".repeat(20);
        let v = r.clone();
        let ckpt = Checkpoint::derive(&r, &v, 16, 7);
        assert_eq!(ckpt.capacity, next_prime(2 * 305 / 16));
        assert_eq!(ckpt.universe, next_prime(2 * 305) as u64);
        assert_eq!(
            ckpt.stride,
            (ckpt.universe + ckpt.capacity as u64 - 1) / ckpt.capacity as u64
        );
        assert!(ckpt.class < ckpt.stride);
    }

    #[test]
    fn stride_one_admits_every_seed() {
        // Large floor vs tiny reference: |F| <= |C| forces m = 1, and the
        // general formulas must hold with every seed a checkpoint seed.
        let r = b"0123456789abcdefghij";
        let ckpt = Checkpoint::derive(r, r, 4, TABLE_SIZE);
        assert_eq!(ckpt.stride, 1);
        assert_eq!(ckpt.class, 0);
        let mut cursor = FingerprintCursor::new(&r[..], 4).unwrap();
        for a in 0..=(r.len() - 4) {
            assert!(ckpt.admits(cursor.at(a)));
        }
    }

    #[test]
    fn short_version_pins_class_to_zero() {
        let r = b"ABCDEFGHIJKLMNOPQRSTUVWX";
        let ckpt = Checkpoint::derive(r, b"abc", 16, 7);
        assert_eq!(ckpt.class, 0);
    }

    #[test]
    fn empty_reference_is_one_add() {
        let v = b"brand new data";
        let cmds = diff(b"", v, &opts(4, TABLE_SIZE));
        assert_eq!(cmds, vec![Command::Add { data: v.to_vec() }]);
    }

    #[test]
    fn tiny_table_still_roundtrips() {
        // 320-byte reference diffed through a 7-slot floor exercises real
        // checkpoint filtering.
        let r = b"ABCDEFGHIJKLMNOP".repeat(20);
        let mut v = r[..160].to_vec();
        v.extend_from_slice(b"XXXXYYYY");
        v.extend_from_slice(&r[160..]);
        let cmds = diff(&r, &v, &opts(16, 7));
        assert_eq!(apply_delta(&r, &cmds), v);
    }

    #[test]
    fn backward_extension_recovers_match_starts() {
        // The version shifts a long run by two bytes; whichever checkpoint
        // seed hits inside the run, backward extension must walk to its
        // true start so only the junk prefix stays a literal.
        let run: Vec<u8> = (0..=255u8).cycle().take(1200).collect();
        let mut r = vec![b'_'; 4];
        r.extend_from_slice(&run);
        let mut v = vec![b'*'; 2];
        v.extend_from_slice(&run);
        let cmds = diff(&r, &v, &opts(16, 101));
        assert_eq!(apply_delta(&r, &cmds), v);
        let copied: usize = cmds
            .iter()
            .filter_map(|c| match c {
                Command::Copy { length, .. } => Some(*length),
                _ => None,
            })
            .sum();
        assert!(copied >= run.len() - 32, "copied only {} bytes", copied);
    }

    #[test]
    fn tail_correction_merges_a_broken_copy() {
        // The reference carries a corrupted copy of the version's prefix
        // ahead of a pristine copy of the whole version. The scan first
        // matches the corrupted region (stopping at the bad byte), then the
        // pristine region's match extends backward over that provisional
        // copy; correction must absorb it and emit one full-length copy.
        let a: Vec<u8> = (0..100u8).collect();
        let b: Vec<u8> = (100..200u8).collect();
        let mut v = a.clone();
        v.extend_from_slice(&b);

        let mut corrupt = a.clone();
        corrupt[99] ^= 0xFF;
        let mut r = corrupt;
        r.extend_from_slice(&[b'#'; 20]);
        r.extend_from_slice(&v);

        let cmds = diff(&r, &v, &opts(16, 1009));
        assert_eq!(apply_delta(&r, &cmds), v);
        assert_eq!(
            cmds,
            vec![Command::Copy {
                offset: 120,
                length: 200
            }]
        );
    }

    #[test]
    fn reclaim_absorbs_and_trims_literals() {
        let v: Vec<u8> = (0..60u8).collect();
        let mut buf = LookbackBuffer::new(8);
        let mut committed = Vec::new();
        buf.push(
            LookbackEntry::new(0, 20, Command::Add { data: v[0..20].to_vec() }),
            &mut committed,
        );
        buf.push(
            LookbackEntry::new(20, 40, Command::Copy { offset: 0, length: 20 }),
            &mut committed,
        );

        // Match over 15..45: the copy is absorbed, the literal is trimmed
        // to 0..15, and encoding must restart at 15.
        let eff = reclaim_tail(&mut buf, &v, 15, 45, 40);
        assert_eq!(eff, 15);
        let tail = buf.back().unwrap();
        assert_eq!((tail.v_start, tail.v_end), (0, 15));
        assert!(matches!(&tail.cmd, Command::Add { data } if data.len() == 15));
        assert!(committed.is_empty());
    }

    #[test]
    fn reclaim_stops_at_a_straddling_copy() {
        let v: Vec<u8> = (0..60u8).collect();
        let mut buf = LookbackBuffer::new(8);
        let mut committed = Vec::new();
        buf.push(
            LookbackEntry::new(0, 20, Command::Copy { offset: 100, length: 20 }),
            &mut committed,
        );
        buf.push(
            LookbackEntry::new(20, 40, Command::Copy { offset: 200, length: 20 }),
            &mut committed,
        );

        let eff = reclaim_tail(&mut buf, &v, 15, 45, 40);
        // The newer copy is absorbed; the straddling one stays whole, so
        // the new copy encodes from its end.
        assert_eq!(eff, 20);
        let tail = buf.back().unwrap();
        assert_eq!((tail.v_start, tail.v_end), (0, 20));
        assert!(matches!(tail.cmd, Command::Copy { offset: 100, .. }));
    }

    #[test]
    fn splay_backing_roundtrips() {
        let r: Vec<u8> = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ".repeat(40);
        let mut v = r[100..600].to_vec();
        v.extend_from_slice(b"@@@@@@@@");
        v.extend_from_slice(&r[300..900]);
        let o = DiffOptions {
            seed_len: 8,
            table_size: 101,
            use_splay: true,
            ..DiffOptions::default()
        };
        let cmds = diff(&r, &v, &o);
        assert_eq!(apply_delta(&r, &cmds), v);
    }

    #[test]
    fn small_lookback_capacity_roundtrips() {
        // Force constant eviction through a 4-entry buffer.
        let r: Vec<u8> = (0..=255u8).cycle().take(4000).collect();
        let mut v = Vec::new();
        for chunk in r.chunks(100) {
            v.extend_from_slice(chunk);
            v.push(0xEE);
        }
        let o = DiffOptions {
            seed_len: 8,
            table_size: 1009,
            buf_cap: 4,
            ..DiffOptions::default()
        };
        let cmds = diff(&r, &v, &o);
        assert_eq!(apply_delta(&r, &cmds), v);
    }
}
