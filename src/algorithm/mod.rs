pub mod correcting;
pub mod greedy;
pub mod onepass;

use tracing::debug;

use crate::error::DeltaError;
use crate::types::{Algorithm, Command, DiffOptions};

/// Run the selected differencing engine.
///
/// The only rejected input is `seed_len == 0`, surfaced before any work;
/// with valid options differencing never fails, it just encodes whatever
/// it is given.
pub fn diff(
    algorithm: Algorithm,
    r: &[u8],
    v: &[u8],
    opts: &DiffOptions,
) -> Result<Vec<Command>, DeltaError> {
    if opts.seed_len == 0 {
        return Err(DeltaError::InvalidArgument(
            "seed_len must be >= 1".into(),
        ));
    }
    Ok(match algorithm {
        Algorithm::Greedy => greedy::diff(r, v, opts),
        Algorithm::Onepass => onepass::diff(r, v, opts),
        Algorithm::Correcting => correcting::diff(r, v, opts),
    })
}

/// Dispatch with default options.
pub fn diff_default(
    algorithm: Algorithm,
    r: &[u8],
    v: &[u8],
) -> Result<Vec<Command>, DeltaError> {
    diff(algorithm, r, v, &DiffOptions::default())
}

/// Shared verbose statistics over an engine's output.
pub(crate) fn log_command_stats(commands: &[Command]) {
    let mut copy_lens: Vec<usize> = Vec::new();
    let mut total_copy = 0usize;
    let mut total_add = 0usize;
    let mut num_adds = 0usize;
    for cmd in commands {
        match cmd {
            Command::Copy { length, .. } => {
                total_copy += length;
                copy_lens.push(*length);
            }
            Command::Add { data } => {
                total_add += data.len();
                num_adds += 1;
            }
        }
    }
    let total_out = total_copy + total_add;
    let copy_pct = if total_out > 0 {
        total_copy as f64 / total_out as f64 * 100.0
    } else {
        0.0
    };
    debug!(
        copies = copy_lens.len(),
        copy_bytes = total_copy,
        adds = num_adds,
        add_bytes = total_add,
        coverage_pct = copy_pct,
        output_bytes = total_out,
        "diff result"
    );
    if !copy_lens.is_empty() {
        copy_lens.sort_unstable();
        let mean = total_copy as f64 / copy_lens.len() as f64;
        debug!(
            regions = copy_lens.len(),
            min = copy_lens[0],
            max = copy_lens[copy_lens.len() - 1],
            mean,
            median = copy_lens[copy_lens.len() / 2],
            "copy length distribution"
        );
    }
}
