//! The efivarfs record format.
//!
//! Every variable file holds a little-endian `u32` attribute word followed by
//! the payload bytes:
//!
//! ```text
//! +-------------+---------------------------------+
//! | attrs (LE)  | payload (zero padded to 8)      |
//! |   4 bytes   |   n * 8 bytes                   |
//! +-------------+---------------------------------+
//! ```
//!
//! Padding is applied when a record is encoded and is never stripped on
//! decode. The kernel does not know the original length, so neither do we.
//!
//! The format itself has no alignment rule: variables created by firmware
//! carry payloads of any length and decode as they are. Padding on encode
//! is the only alignment this crate applies, so encoding cannot fail.

use std::io::Read;

use crate::attributes::VariableAttributes;
use crate::error::{Error, Result};

/// Size of the attribute header.
pub const HEADER_LEN: usize = 4;

/// Payloads are zero padded to a multiple of this many bytes.
pub const PAYLOAD_ALIGNMENT: usize = 8;

/// Length of `len` bytes after padding.
pub fn padded_len(len: usize) -> usize {
    len.div_ceil(PAYLOAD_ALIGNMENT) * PAYLOAD_ALIGNMENT
}

/// Build the on-disk record for `attrs` and `payload`.
pub fn encode(attrs: VariableAttributes, payload: &[u8]) -> Vec<u8> {
    let padded = padded_len(payload.len());
    let mut record = Vec::with_capacity(HEADER_LEN + padded);
    record.extend_from_slice(&attrs.bits().to_le_bytes());
    record.extend_from_slice(payload);
    record.resize(HEADER_LEN + padded, 0);
    debug_assert_eq!((record.len() - HEADER_LEN) % PAYLOAD_ALIGNMENT, 0);
    record
}

/// Split a record into its attributes and payload.
///
/// Anything shorter than the header is an absent variable, which covers
/// the zero-length tombstones efivarfs leaves behind.
pub fn decode(record: &[u8]) -> Result<(VariableAttributes, &[u8])> {
    if record.len() < HEADER_LEN {
        return Err(Error::VariableNotFound);
    }
    let (header, payload) = record.split_at(HEADER_LEN);
    let mut word = [0u8; HEADER_LEN];
    word.copy_from_slice(header);
    Ok((VariableAttributes::from_bits_retain(u32::from_le_bytes(word)), payload))
}

/// Read a whole record from `reader` and decode it.
pub fn read_record(reader: &mut impl Read) -> Result<(VariableAttributes, Vec<u8>)> {
    let mut record = Vec::new();
    reader.read_to_end(&mut record)?;
    let (attrs, payload) = decode(&record)?;
    Ok((attrs, payload.to_vec()))
}
