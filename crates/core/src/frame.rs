//! WAL frame encoding
//!
//! A frame is `payload || CRC32_BE(payload)` with the IEEE polynomial.
//! There is no length prefix; replay tooling knows the batching discipline
//! from its configuration. The synchronous path seals one frame per record,
//! the asynchronous path one frame per drained batch.

use bytes::{BufMut, BytesMut};

/// Size of the trailing checksum in bytes
pub const CHECKSUM_SIZE: usize = 4;

/// CRC32 (IEEE) over a payload
#[inline]
pub fn checksum(payload: &[u8]) -> u32 {
    crc32fast::hash(payload)
}

/// Seal a payload into a freshly allocated frame
pub fn seal(payload: &[u8]) -> BytesMut {
    let mut frame = BytesMut::with_capacity(payload.len() + CHECKSUM_SIZE);
    frame.put_slice(payload);
    frame.put_u32(checksum(payload));
    frame
}

/// Seal in place: compute the CRC over everything currently in `frame` and
/// append it big-endian.
///
/// The scratch buffer must already hold the complete payload.
pub fn seal_in_place(frame: &mut BytesMut) {
    let crc = checksum(&frame[..]);
    frame.put_u32(crc);
}

/// Split a frame into payload and stored checksum.
///
/// Returns `None` when the slice is too short to carry a checksum.
pub fn split(frame: &[u8]) -> Option<(&[u8], u32)> {
    if frame.len() < CHECKSUM_SIZE {
        return None;
    }
    let (payload, tail) = frame.split_at(frame.len() - CHECKSUM_SIZE);
    let stored = u32::from_be_bytes([tail[0], tail[1], tail[2], tail[3]]);
    Some((payload, stored))
}

/// Verify a frame's stored checksum against its payload
pub fn verify(frame: &[u8]) -> bool {
    match split(frame) {
        Some((payload, stored)) => checksum(payload) == stored,
        None => false,
    }
}
