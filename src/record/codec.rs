//! Frame encoding and decoding
//!
//! `length(4) ‖ crc(4) ‖ lsn(8) ‖ txn_id(16) ‖ state(1) ‖ payload`

use bytes::{Buf, BufMut, Bytes, BytesMut};
use uuid::Uuid;

use crate::error::{Result, WalError};

use super::{LogRecord, Payload, TxnState};

/// Size of the length prefix
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Size of the CRC field
pub const CRC_SIZE: usize = 4;

/// Length prefix + CRC
pub const HEADER_SIZE: usize = LENGTH_PREFIX_SIZE + CRC_SIZE;

/// LSN (8) + transaction id (16) + state (1)
pub const FIXED_FRAME_SIZE: usize = 8 + 16 + 1;

/// Smallest legal value of the length prefix
pub const MIN_RECORD_LEN: usize = CRC_SIZE + FIXED_FRAME_SIZE;

impl LogRecord {
    /// Encode into a complete, length-prefixed frame
    pub fn encode(&self) -> Result<Bytes> {
        let payload = self.payload.to_bytes()?;
        let frame_len = FIXED_FRAME_SIZE + payload.len();
        let record_len = u32::try_from(CRC_SIZE + frame_len).map_err(|_| {
            WalError::Serialization(format!("record of {} bytes exceeds u32 length", frame_len))
        })?;

        let mut buf = BytesMut::with_capacity(HEADER_SIZE + frame_len);
        buf.put_u32(record_len);
        buf.put_u32(0); // CRC placeholder, patched below
        buf.put_u64(self.lsn);
        buf.put_slice(self.transaction_id.as_bytes());
        buf.put_u8(self.state.as_u8());
        buf.put_slice(&payload);

        let crc = crc32fast::hash(&buf[HEADER_SIZE..]);
        buf[LENGTH_PREFIX_SIZE..HEADER_SIZE].copy_from_slice(&crc.to_be_bytes());

        Ok(buf.freeze())
    }

    /// Total encoded size of this record, header included
    pub fn encoded_len(&self) -> Result<usize> {
        Ok(HEADER_SIZE + FIXED_FRAME_SIZE + self.payload.to_bytes()?.len())
    }
}

/// Decode one frame from the start of `bytes`
///
/// Exactly as many bytes as the length prefix declares are consumed; anything
/// after that is ignored.
pub fn decode(bytes: &[u8]) -> Result<LogRecord> {
    if bytes.len() < LENGTH_PREFIX_SIZE {
        return Err(WalError::Truncated {
            expected: LENGTH_PREFIX_SIZE,
            actual: bytes.len(),
        });
    }

    let declared = read_length(bytes, 0)?;
    let total = LENGTH_PREFIX_SIZE + declared;
    if bytes.len() < total {
        return Err(WalError::Truncated {
            expected: total,
            actual: bytes.len(),
        });
    }

    decode_body(&bytes[LENGTH_PREFIX_SIZE..total], 0)
}

/// Read and sanity-check a length prefix
///
/// `offset` is only used for error reporting.
pub(crate) fn read_length(prefix: &[u8], offset: u64) -> Result<usize> {
    let mut buf = prefix;
    let declared = buf.get_u32() as usize;
    if declared < MIN_RECORD_LEN {
        return Err(WalError::corruption(
            offset,
            format!(
                "declared length {} below minimum {}",
                declared, MIN_RECORD_LEN
            ),
        ));
    }
    Ok(declared)
}

/// Verify and parse `crc ‖ frame`
pub(crate) fn decode_body(body: &[u8], offset: u64) -> Result<LogRecord> {
    let mut buf = body;
    let stored_crc = buf.get_u32();

    let computed_crc = crc32fast::hash(buf);
    if computed_crc != stored_crc {
        return Err(WalError::corruption(
            offset,
            format!(
                "CRC mismatch: stored {:#010x}, computed {:#010x}",
                stored_crc, computed_crc
            ),
        ));
    }

    let lsn = buf.get_u64();

    let mut id = [0u8; 16];
    buf.copy_to_slice(&mut id);
    let transaction_id = Uuid::from_bytes(id);

    let tag = buf.get_u8();
    let state = TxnState::from_u8(tag)
        .ok_or_else(|| WalError::corruption(offset, format!("unknown state tag {}", tag)))?;

    let payload = Payload::from_bytes(buf)
        .map_err(|e| WalError::corruption(offset, format!("undecodable payload: {}", e)))?;

    Ok(LogRecord {
        lsn,
        transaction_id,
        state,
        payload,
    })
}
