//! The binary delta container.
//!
//! Fixed layout, multi-byte integers big-endian:
//!
//! ```text
//! offset 0..4   magic        'D' 'L' 'T' 0x01
//! offset 4      flags        bit 0 = in-place
//! offset 5..9   version_size u32
//! offset 9..    command stream, ended by the first END byte
//! ```
//!
//! Commands: `END` (0x00), `COPY` (0x01; src, dst, len as u32), `ADD`
//! (0x02; dst, len as u32, then `len` literal bytes). The format is a
//! cross-implementation contract: identical commands and flags must encode
//! to identical bytes everywhere.

use crate::error::DeltaError;
use crate::types::{
    PlacedCommand, DELTA_CMD_ADD, DELTA_CMD_COPY, DELTA_CMD_END, DELTA_FLAG_INPLACE,
    DELTA_HEADER_SIZE, DELTA_MAGIC,
};

/// Serialize placed commands in caller order, then one END byte.
pub fn encode_delta(commands: &[PlacedCommand], inplace: bool, version_size: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(DELTA_HEADER_SIZE + 1);
    out.extend_from_slice(DELTA_MAGIC);
    out.push(if inplace { DELTA_FLAG_INPLACE } else { 0 });
    out.extend_from_slice(&(version_size as u32).to_be_bytes());

    for cmd in commands {
        match cmd {
            PlacedCommand::Copy { src, dst, length } => {
                out.push(DELTA_CMD_COPY);
                out.extend_from_slice(&(*src as u32).to_be_bytes());
                out.extend_from_slice(&(*dst as u32).to_be_bytes());
                out.extend_from_slice(&(*length as u32).to_be_bytes());
            }
            PlacedCommand::Add { dst, data } => {
                out.push(DELTA_CMD_ADD);
                out.extend_from_slice(&(*dst as u32).to_be_bytes());
                out.extend_from_slice(&(data.len() as u32).to_be_bytes());
                out.extend_from_slice(data);
            }
        }
    }
    out.push(DELTA_CMD_END);
    out
}

/// Position-tracking reader over the delta bytes.
struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn u8(&mut self, what: &str) -> Result<u8, DeltaError> {
        let byte = *self
            .data
            .get(self.pos)
            .ok_or_else(|| DeltaError::malformed(self.pos, what.to_string()))?;
        self.pos += 1;
        Ok(byte)
    }

    fn u32(&mut self, what: &str) -> Result<usize, DeltaError> {
        if self.pos + 4 > self.data.len() {
            return Err(DeltaError::malformed(self.pos, what.to_string()));
        }
        let b = &self.data[self.pos..self.pos + 4];
        self.pos += 4;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]) as usize)
    }

    fn bytes(&mut self, len: usize, what: &str) -> Result<&'a [u8], DeltaError> {
        if self.pos + len > self.data.len() {
            return Err(DeltaError::malformed(
                self.pos,
                format!("{} ({} bytes)", what, len),
            ));
        }
        let slice = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    fn at_end(&self) -> bool {
        self.pos >= self.data.len()
    }
}

/// Parse a delta container into `(commands, inplace, version_size)`.
///
/// Fails with a malformed-delta error on a short header, wrong magic,
/// truncated command payload, or unknown command byte; the error names the
/// offending offset. The stream ends at the first END byte, or at the end
/// of the buffer after a complete command.
pub fn decode_delta(data: &[u8]) -> Result<(Vec<PlacedCommand>, bool, usize), DeltaError> {
    if data.len() < DELTA_HEADER_SIZE {
        return Err(DeltaError::malformed(
            data.len(),
            format!("{}-byte delta header", DELTA_HEADER_SIZE),
        ));
    }
    if &data[..DELTA_MAGIC.len()] != DELTA_MAGIC {
        return Err(DeltaError::malformed(0, "delta magic \"DLT\\x01\""));
    }

    let mut reader = Reader {
        data,
        pos: DELTA_MAGIC.len(),
    };
    let flags = reader.u8("flags byte")?;
    let inplace = flags & DELTA_FLAG_INPLACE != 0;
    let version_size = reader.u32("version size")?;

    let mut commands = Vec::new();
    while !reader.at_end() {
        let pos = reader.pos;
        let tag = reader.u8("command byte")?;
        match tag {
            DELTA_CMD_END => break,
            DELTA_CMD_COPY => {
                let src = reader.u32("copy source offset")?;
                let dst = reader.u32("copy destination offset")?;
                let length = reader.u32("copy length")?;
                commands.push(PlacedCommand::Copy { src, dst, length });
            }
            DELTA_CMD_ADD => {
                let dst = reader.u32("add destination offset")?;
                let length = reader.u32("add length")?;
                let data = reader.bytes(length, "add payload")?;
                commands.push(PlacedCommand::Add {
                    dst,
                    data: data.to_vec(),
                });
            }
            other => {
                return Err(DeltaError::malformed(
                    pos,
                    format!("command byte 0x00/0x01/0x02, found {:#04x}", other),
                ));
            }
        }
    }

    Ok((commands, inplace, version_size))
}

/// Whether `data` carries an in-place delta: long enough for the flags
/// byte, correct magic, and the in-place bit set.
pub fn is_inplace_delta(data: &[u8]) -> bool {
    data.len() > DELTA_MAGIC.len()
        && &data[..DELTA_MAGIC.len()] == DELTA_MAGIC
        && data[DELTA_MAGIC.len()] & DELTA_FLAG_INPLACE != 0
}
