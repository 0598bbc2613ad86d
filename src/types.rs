use std::fmt;

// Compatibility-bearing constants. Changing any of these changes the bytes
// a delta encodes to, or the commands an engine emits, for some inputs.
//
//   SEED_LEN     minimum match length / fingerprint window
//   HASH_BASE    polynomial base for the Karp-Rabin fingerprint
//   HASH_MOD     Mersenne prime 2^61-1 for fingerprint arithmetic
//   TABLE_SIZE   floor for the fingerprint table capacity; correcting fits
//                any reference into a bounded table via checkpointing
//   LOOKBACK_CAP correction buffer capacity; entries older than this are
//                committed and can no longer be corrected

pub const SEED_LEN: usize = 16;
pub const TABLE_SIZE: usize = 1_048_573; // largest prime < 2^20
pub const HASH_BASE: u64 = 263;
pub const HASH_MOD: u64 = (1 << 61) - 1;
pub const LOOKBACK_CAP: usize = 256;

pub const DELTA_MAGIC: &[u8; 4] = b"DLT\x01";
pub const DELTA_FLAG_INPLACE: u8 = 0x01;
pub const DELTA_CMD_END: u8 = 0x00;
pub const DELTA_CMD_COPY: u8 = 0x01;
pub const DELTA_CMD_ADD: u8 = 0x02;
pub const DELTA_HEADER_SIZE: usize = 9; // magic(4) + flags(1) + version_size(4)
pub const DELTA_COPY_PAYLOAD: usize = 12; // src(4) + dst(4) + len(4)
pub const DELTA_ADD_HEADER: usize = 8; // dst(4) + len(4)

/// Engine output: copy a run from the reference, or add literal bytes.
///
/// Applied in order against a running output cursor, the command sequence
/// reproduces the version exactly.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    Copy { offset: usize, length: usize },
    Add { data: Vec<u8> },
}

impl Command {
    /// Number of version bytes this command produces.
    pub fn span(&self) -> usize {
        match self {
            Command::Copy { length, .. } => *length,
            Command::Add { data } => data.len(),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Copy { offset, length } => write!(f, "COPY(off={}, len={})", offset, length),
            Command::Add { data } => {
                if data.len() <= 20 {
                    write!(f, "ADD({:?})", data)
                } else {
                    write!(f, "ADD(len={})", data.len())
                }
            }
        }
    }
}

/// A command with an explicit destination offset.
///
/// For standard deltas `Copy::src` indexes the reference and `dst` the
/// output buffer. For in-place deltas both index the single working buffer
/// that starts out holding the reference.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PlacedCommand {
    Copy { src: usize, dst: usize, length: usize },
    Add { dst: usize, data: Vec<u8> },
}

impl PlacedCommand {
    pub fn dst(&self) -> usize {
        match self {
            PlacedCommand::Copy { dst, .. } => *dst,
            PlacedCommand::Add { dst, .. } => *dst,
        }
    }

    /// Number of output bytes this command writes.
    pub fn span(&self) -> usize {
        match self {
            PlacedCommand::Copy { length, .. } => *length,
            PlacedCommand::Add { data, .. } => data.len(),
        }
    }
}

impl fmt::Display for PlacedCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlacedCommand::Copy { src, dst, length } => {
                write!(f, "COPY(src={}, dst={}, len={})", src, dst, length)
            }
            PlacedCommand::Add { dst, data } => {
                if data.len() <= 20 {
                    write!(f, "ADD(dst={}, {:?})", dst, data)
                } else {
                    write!(f, "ADD(dst={}, len={})", dst, data.len())
                }
            }
        }
    }
}

/// Differencing engine selector.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Algorithm {
    Greedy,
    Onepass,
    Correcting,
}

/// Cycle-breaking policy for in-place conversion.
///
/// `LocalMin` converts the shortest copy of each broken cycle; `Constant`
/// converts an arbitrary (but deterministic) live vertex.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CyclePolicy {
    LocalMin,
    Constant,
}

/// Per-call differencing options. There is no process-wide configuration.
#[derive(Clone, Debug)]
pub struct DiffOptions {
    /// Minimum match length and fingerprint window (`p`). Must be >= 1.
    pub seed_len: usize,
    /// Floor for the fingerprint table capacity (`q`); engines derive the
    /// actual capacity from this and the reference length.
    pub table_size: usize,
    /// Lookback buffer capacity (correcting only).
    pub buf_cap: usize,
    /// Use the splay-tree index backing instead of the direct table.
    pub use_splay: bool,
    /// Emit diagnostics to stderr. Never changes the emitted commands.
    pub verbose: bool,
}

impl Default for DiffOptions {
    fn default() -> Self {
        Self {
            seed_len: SEED_LEN,
            table_size: TABLE_SIZE,
            buf_cap: LOOKBACK_CAP,
            use_splay: false,
            verbose: false,
        }
    }
}

/// Aggregate command statistics, shared by the CLI summary and diagnostics.
#[derive(Debug, Default)]
pub struct DeltaSummary {
    pub num_commands: usize,
    pub num_copies: usize,
    pub num_adds: usize,
    pub copy_bytes: usize,
    pub add_bytes: usize,
    pub total_output_bytes: usize,
}

impl DeltaSummary {
    fn tally(&mut self, is_copy: bool, span: usize) {
        self.num_commands += 1;
        if is_copy {
            self.num_copies += 1;
            self.copy_bytes += span;
        } else {
            self.num_adds += 1;
            self.add_bytes += span;
        }
        self.total_output_bytes += span;
    }
}

pub fn delta_summary(commands: &[Command]) -> DeltaSummary {
    let mut s = DeltaSummary::default();
    for cmd in commands {
        s.tally(matches!(cmd, Command::Copy { .. }), cmd.span());
    }
    s
}

pub fn placed_summary(commands: &[PlacedCommand]) -> DeltaSummary {
    let mut s = DeltaSummary::default();
    for cmd in commands {
        s.tally(matches!(cmd, PlacedCommand::Copy { .. }), cmd.span());
    }
    s
}
