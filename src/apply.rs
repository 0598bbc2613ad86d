//! Command placement and delta application.
//!
//! Placement turns engine output into commands with explicit destinations;
//! application replays placed commands against a reference. Placed
//! commands decoded from untrusted bytes are range-checked here; an
//! out-of-bounds copy or add is a malformed delta, not a panic.

use crate::error::DeltaError;
use crate::types::{Command, PlacedCommand};

/// Total output size produced by a command sequence.
pub fn output_size(commands: &[Command]) -> usize {
    commands.iter().map(Command::span).sum()
}

/// Assign sequential destinations: each command writes where the previous
/// one ended, starting at zero.
pub fn place_commands(commands: &[Command]) -> Vec<PlacedCommand> {
    let mut placed = Vec::with_capacity(commands.len());
    let mut dst = 0usize;
    for cmd in commands {
        match cmd {
            Command::Copy { offset, length } => {
                placed.push(PlacedCommand::Copy {
                    src: *offset,
                    dst,
                    length: *length,
                });
                dst += length;
            }
            Command::Add { data } => {
                placed.push(PlacedCommand::Add {
                    dst,
                    data: data.clone(),
                });
                dst += data.len();
            }
        }
    }
    placed
}

/// Strip destinations, restoring version order.
///
/// Sorts by destination first: in-place conversion reorders copies, so a
/// decoded delta's command order need not be version order.
pub fn unplace_commands(commands: &[PlacedCommand]) -> Vec<Command> {
    let mut by_dst: Vec<&PlacedCommand> = commands.iter().collect();
    by_dst.sort_by_key(|cmd| cmd.dst());
    by_dst
        .into_iter()
        .map(|cmd| match cmd {
            PlacedCommand::Copy { src, length, .. } => Command::Copy {
                offset: *src,
                length: *length,
            },
            PlacedCommand::Add { data, .. } => Command::Add { data: data.clone() },
        })
        .collect()
}

/// Apply placed commands in standard mode, writing into `out`.
///
/// Reads come from the reference, writes go to `out`; the two never
/// overlap. Every range is validated against the buffers first.
pub fn apply_placed_to(
    r: &[u8],
    commands: &[PlacedCommand],
    out: &mut [u8],
) -> Result<(), DeltaError> {
    for cmd in commands {
        match cmd {
            PlacedCommand::Copy { src, dst, length } => {
                if src + length > r.len() {
                    return Err(DeltaError::malformed(
                        *dst,
                        format!(
                            "copy source {}..{} within reference of {} bytes",
                            src,
                            src + length,
                            r.len()
                        ),
                    ));
                }
                if dst + length > out.len() {
                    return Err(DeltaError::malformed(
                        *dst,
                        format!(
                            "copy destination {}..{} within output of {} bytes",
                            dst,
                            dst + length,
                            out.len()
                        ),
                    ));
                }
                out[*dst..dst + length].copy_from_slice(&r[*src..src + length]);
            }
            PlacedCommand::Add { dst, data } => {
                if dst + data.len() > out.len() {
                    return Err(DeltaError::malformed(
                        *dst,
                        format!(
                            "add destination {}..{} within output of {} bytes",
                            dst,
                            dst + data.len(),
                            out.len()
                        ),
                    ));
                }
                out[*dst..dst + data.len()].copy_from_slice(data);
            }
        }
    }
    Ok(())
}

/// Reconstruct the version from a reference and placed commands.
pub fn apply_placed(
    r: &[u8],
    commands: &[PlacedCommand],
    version_size: usize,
) -> Result<Vec<u8>, DeltaError> {
    let mut out = vec![0u8; version_size];
    apply_placed_to(r, commands, &mut out)?;
    Ok(out)
}

/// Apply in-place commands inside one working buffer.
///
/// Copies use `copy_within` (memmove semantics) because source and
/// destination may overlap; the conversion's topological order guarantees
/// each read happens before anything overwrites it.
pub fn apply_placed_inplace_to(
    commands: &[PlacedCommand],
    buf: &mut [u8],
) -> Result<(), DeltaError> {
    for cmd in commands {
        match cmd {
            PlacedCommand::Copy { src, dst, length } => {
                if src + length > buf.len() || dst + length > buf.len() {
                    return Err(DeltaError::malformed(
                        *dst,
                        format!(
                            "in-place copy {}..{} -> {}..{} within buffer of {} bytes",
                            src,
                            src + length,
                            dst,
                            dst + length,
                            buf.len()
                        ),
                    ));
                }
                buf.copy_within(*src..src + length, *dst);
            }
            PlacedCommand::Add { dst, data } => {
                if dst + data.len() > buf.len() {
                    return Err(DeltaError::malformed(
                        *dst,
                        format!(
                            "in-place add {}..{} within buffer of {} bytes",
                            dst,
                            dst + data.len(),
                            buf.len()
                        ),
                    ));
                }
                buf[*dst..dst + data.len()].copy_from_slice(data);
            }
        }
    }
    Ok(())
}

/// Reconstruct the version in-place: one buffer of
/// `max(|R|, version_size)` bytes seeded with the reference, truncated to
/// the version size afterwards.
pub fn apply_placed_inplace(
    r: &[u8],
    commands: &[PlacedCommand],
    version_size: usize,
) -> Result<Vec<u8>, DeltaError> {
    let mut buf = vec![0u8; r.len().max(version_size)];
    buf[..r.len()].copy_from_slice(r);
    apply_placed_inplace_to(commands, &mut buf)?;
    buf.truncate(version_size);
    Ok(buf)
}

/// Replay engine output directly, destinations implied by order.
///
/// Engine commands satisfy the copy invariant by construction, so this is
/// infallible; it backs the engines' own tests and the encode summary.
pub fn apply_delta(r: &[u8], commands: &[Command]) -> Vec<u8> {
    let mut out = Vec::with_capacity(output_size(commands));
    for cmd in commands {
        match cmd {
            Command::Copy { offset, length } => out.extend_from_slice(&r[*offset..offset + length]),
            Command::Add { data } => out.extend_from_slice(data),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placement_is_contiguous_from_zero() {
        let cmds = vec![
            Command::Add { data: vec![1, 2] },
            Command::Copy { offset: 9, length: 5 },
            Command::Add { data: vec![3] },
        ];
        let placed = place_commands(&cmds);
        let dsts: Vec<usize> = placed.iter().map(|c| c.dst()).collect();
        assert_eq!(dsts, vec![0, 2, 7]);
        assert_eq!(placed.iter().map(|c| c.span()).sum::<usize>(), 8);
    }

    #[test]
    fn unplace_restores_version_order() {
        let placed = vec![
            PlacedCommand::Copy { src: 50, dst: 10, length: 4 },
            PlacedCommand::Add { dst: 0, data: vec![7; 10] },
            PlacedCommand::Copy { src: 0, dst: 14, length: 6 },
        ];
        let cmds = unplace_commands(&placed);
        assert_eq!(
            cmds,
            vec![
                Command::Add { data: vec![7; 10] },
                Command::Copy { offset: 50, length: 4 },
                Command::Copy { offset: 0, length: 6 },
            ]
        );
        // Re-placing reproduces the original destinations.
        let replaced = place_commands(&cmds);
        assert_eq!(replaced.iter().map(|c| c.dst()).collect::<Vec<_>>(), vec![0, 10, 14]);
    }

    #[test]
    fn standard_apply_reconstructs() {
        let r = b"0123456789";
        let placed = vec![
            PlacedCommand::Copy { src: 5, dst: 0, length: 5 },
            PlacedCommand::Add { dst: 5, data: b"xy".to_vec() },
            PlacedCommand::Copy { src: 0, dst: 7, length: 3 },
        ];
        let out = apply_placed(r, &placed, 10).unwrap();
        assert_eq!(&out, b"56789xy012");
    }

    #[test]
    fn copy_past_reference_is_malformed() {
        let r = b"short";
        let placed = vec![PlacedCommand::Copy { src: 3, dst: 0, length: 10 }];
        let err = apply_placed(r, &placed, 10).unwrap_err();
        assert!(matches!(err, DeltaError::Malformed { pos: 0, .. }));
    }

    #[test]
    fn write_past_output_is_malformed() {
        let r = b"0123456789";
        let placed = vec![PlacedCommand::Add { dst: 8, data: vec![0; 4] }];
        let err = apply_placed(r, &placed, 10).unwrap_err();
        assert!(matches!(err, DeltaError::Malformed { pos: 8, .. }));
    }

    #[test]
    fn inplace_apply_handles_overlapping_moves() {
        // Shift a run left by two inside the buffer.
        let r = b"..ABCDEFGH";
        let placed = vec![
            PlacedCommand::Copy { src: 2, dst: 0, length: 8 },
            PlacedCommand::Add { dst: 8, data: b"!!".to_vec() },
        ];
        let out = apply_placed_inplace(r, &placed, 10).unwrap();
        assert_eq!(&out, b"ABCDEFGH!!");
    }

    #[test]
    fn inplace_buffer_covers_growth_and_shrink() {
        let r = b"AAAA";
        let grow = vec![
            PlacedCommand::Copy { src: 0, dst: 4, length: 4 },
            PlacedCommand::Add { dst: 0, data: b"BBBB".to_vec() },
        ];
        assert_eq!(apply_placed_inplace(r, &grow, 8).unwrap(), b"BBBBAAAA");

        let shrink = vec![PlacedCommand::Copy { src: 2, dst: 0, length: 2 }];
        assert_eq!(apply_placed_inplace(r, &shrink, 2).unwrap(), b"AA");
    }

    #[test]
    fn apply_delta_walks_in_order() {
        let r = b"abcdef";
        let cmds = vec![
            Command::Copy { offset: 3, length: 3 },
            Command::Add { data: b"-".to_vec() },
            Command::Copy { offset: 0, length: 2 },
        ];
        assert_eq!(apply_delta(r, &cmds), b"def-ab");
    }
}
