//! Differential compression: compact deltas between byte sequences, with
//! optional in-place reconstruction.
//!
//! Given a reference `R` and a version `V`, a differencing engine emits an
//! ordered list of commands (copy a run from `R`, or add literal bytes)
//! whose outputs concatenate to `V`. Three engines trade time and space
//! for delta quality: [`algorithm::greedy`] (optimal, quadratic worst
//! case), [`algorithm::onepass`] (linear, order-sensitive), and
//! [`algorithm::correcting`] (linear with bounded memory via fingerprint
//! checkpointing, plus tail correction). [`inplace::make_inplace`]
//! reorders a delta so the version can be rebuilt inside the buffer
//! holding the reference, and [`encoding`] fixes the portable container
//! format.

pub mod algorithm;
pub mod apply;
pub mod encoding;
pub mod error;
pub mod hash;
pub mod index;
pub mod inplace;
pub mod lookback;
pub mod splay;
pub mod types;

pub use algorithm::{diff, diff_default};
pub use apply::{
    apply_delta, apply_placed, apply_placed_inplace, apply_placed_inplace_to, apply_placed_to,
    output_size, place_commands, unplace_commands,
};
pub use encoding::{decode_delta, encode_delta, is_inplace_delta};
pub use error::DeltaError;
pub use hash::{fingerprint, is_prime, mod_mersenne, next_prime, RollingHash};
pub use inplace::{make_inplace, InplaceStats};
pub use types::{
    delta_summary, placed_summary, Algorithm, Command, CyclePolicy, DeltaSummary, DiffOptions,
    PlacedCommand, DELTA_FLAG_INPLACE, DELTA_MAGIC, HASH_BASE, HASH_MOD, LOOKBACK_CAP, SEED_LEN,
    TABLE_SIZE,
};
