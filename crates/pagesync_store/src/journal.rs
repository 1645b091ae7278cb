//! Commit journal framing and replay.
//!
//! Frame layout (little endian):
//!
//! ```text
//! | magic "PGSJ" (4) | payload_len u32 (4) | CBOR payload | crc32 u32 (4) |
//! ```
//!
//! The CRC covers magic, length and payload. A frame that is cut short, or
//! whose checksum fails while it is the last frame of the log, is a torn
//! write from an interrupted commit and is dropped on replay. A bad frame
//! followed by further frames is corruption.

use crate::error::{StoreError, StoreResult};
use crate::transaction::TableWrite;
use serde::{Deserialize, Serialize};

/// Magic bytes opening every journal frame.
pub const JOURNAL_MAGIC: [u8; 4] = *b"PGSJ";

const HEADER_SIZE: usize = 8;
const CRC_SIZE: usize = 4;

/// One committed transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct JournalEntry {
    /// Commit number, starting at 1.
    pub commit: u64,
    /// Writes in application order.
    pub writes: Vec<TableWrite>,
}

impl JournalEntry {
    /// Returns true if the entry empties both tables before writing
    /// anything, which makes every earlier frame dead.
    pub fn resets_tables(&self) -> bool {
        let mut records = false;
        let mut remote_keys = false;
        for write in &self.writes {
            match write {
                TableWrite::ClearRecords => records = true,
                TableWrite::ClearRemoteKeys => remote_keys = true,
                _ => break,
            }
        }
        records && remote_keys
    }
}

/// Outcome of replaying a journal.
#[derive(Debug, Default)]
pub(crate) struct Replay {
    pub entries: Vec<JournalEntry>,
    /// Length of the prefix made of complete, valid frames.
    pub valid_len: u64,
}

impl Replay {
    /// Returns true if bytes past the last valid frame must be dropped.
    pub fn has_torn_tail(&self, total_len: u64) -> bool {
        self.valid_len < total_len
    }
}

/// Encodes an entry as one journal frame.
pub(crate) fn encode_frame(entry: &JournalEntry) -> StoreResult<Vec<u8>> {
    let mut payload = Vec::new();
    ciborium::into_writer(entry, &mut payload).map_err(|e| StoreError::codec(e.to_string()))?;

    let size = payload.len();
    let len = u32::try_from(size)
        .map_err(|_| StoreError::codec(format!("journal entry too large: {size} bytes")))?;

    let mut frame = Vec::with_capacity(HEADER_SIZE + payload.len() + CRC_SIZE);
    frame.extend_from_slice(&JOURNAL_MAGIC);
    frame.extend_from_slice(&len.to_le_bytes());
    frame.extend_from_slice(&payload);
    let crc = compute_crc32(&frame);
    frame.extend_from_slice(&crc.to_le_bytes());
    Ok(frame)
}

/// Decodes every complete frame in `bytes`.
pub(crate) fn replay(bytes: &[u8]) -> StoreResult<Replay> {
    let mut replay = Replay::default();
    let mut pos = 0usize;

    while pos < bytes.len() {
        let offset = pos as u64;
        let remaining = bytes.len() - pos;
        if remaining < HEADER_SIZE {
            break;
        }

        if bytes[pos..pos + 4] != JOURNAL_MAGIC {
            return Err(StoreError::corruption(offset, "bad frame magic"));
        }

        let len = u32::from_le_bytes([
            bytes[pos + 4],
            bytes[pos + 5],
            bytes[pos + 6],
            bytes[pos + 7],
        ]) as usize;
        let payload_end = pos + HEADER_SIZE + len;
        let frame_end = payload_end + CRC_SIZE;
        if frame_end > bytes.len() {
            break;
        }

        let stored = u32::from_le_bytes([
            bytes[payload_end],
            bytes[payload_end + 1],
            bytes[payload_end + 2],
            bytes[payload_end + 3],
        ]);
        let computed = compute_crc32(&bytes[pos..payload_end]);
        if stored != computed {
            if frame_end == bytes.len() {
                break;
            }
            return Err(StoreError::corruption(
                offset,
                format!("checksum mismatch: expected {stored:08x}, got {computed:08x}"),
            ));
        }

        let entry: JournalEntry = ciborium::from_reader(&bytes[pos + HEADER_SIZE..payload_end])
            .map_err(|e| StoreError::corruption(offset, e.to_string()))?;
        replay.entries.push(entry);
        pos = frame_end;
        replay.valid_len = pos as u64;
    }

    Ok(replay)
}

/// Computes a CRC32 (IEEE polynomial) checksum.
#[must_use]
pub fn compute_crc32(data: &[u8]) -> u32 {
    const TABLE: [u32; 256] = {
        let mut table = [0u32; 256];
        let mut i = 0;
        while i < 256 {
            let mut crc = i as u32;
            let mut j = 0;
            while j < 8 {
                if crc & 1 != 0 {
                    crc = (crc >> 1) ^ 0xEDB8_8320;
                } else {
                    crc >>= 1;
                }
                j += 1;
            }
            table[i] = crc;
            i += 1;
        }
        table
    };

    let mut crc = 0xFFFF_FFFF_u32;
    for &byte in data {
        let index = ((crc ^ u32::from(byte)) & 0xFF) as usize;
        crc = (crc >> 8) ^ TABLE[index];
    }
    !crc
}
