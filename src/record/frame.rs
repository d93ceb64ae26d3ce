//! Frame codec
//!
//! Length-prefixed, CRC-protected frames shared by the record log and the
//! station log.

use bytes::{Buf, BufMut, BytesMut};

/// Frame header: Len (4) + CRC (4)
pub const FRAME_HEADER_SIZE: usize = 8;

/// Upper bound on a single frame payload (16 MB)
const MAX_FRAME_SIZE: u32 = 16 * 1024 * 1024;

/// Outcome of decoding a frame from the front of a buffer
#[derive(Debug, PartialEq)]
pub enum FrameRead {
    /// A complete, valid frame; `consumed` bytes were used
    Frame { payload: Vec<u8>, consumed: usize },
    /// Not enough bytes yet (end of data or a frame still being written)
    Incomplete,
    /// Length or checksum mismatch
    Corrupt(String),
}

/// Wrap a payload in a frame
pub fn encode_frame(payload: &[u8]) -> Vec<u8> {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(payload);
    let crc = hasher.finalize();

    let mut buf = BytesMut::with_capacity(FRAME_HEADER_SIZE + payload.len());
    buf.put_u32_le(payload.len() as u32);
    buf.put_u32_le(crc);
    buf.put_slice(payload);
    buf.to_vec()
}

/// Decode one frame from the front of `bytes`
pub fn decode_frame(bytes: &[u8]) -> FrameRead {
    if bytes.len() < FRAME_HEADER_SIZE {
        return FrameRead::Incomplete;
    }

    let mut header = &bytes[..FRAME_HEADER_SIZE];
    let len = header.get_u32_le();
    let crc = header.get_u32_le();

    if len > MAX_FRAME_SIZE {
        return FrameRead::Corrupt(format!("frame length {} exceeds {}", len, MAX_FRAME_SIZE));
    }

    let total = FRAME_HEADER_SIZE + len as usize;
    if bytes.len() < total {
        return FrameRead::Incomplete;
    }

    let payload = &bytes[FRAME_HEADER_SIZE..total];
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(payload);
    let actual = hasher.finalize();
    if actual != crc {
        return FrameRead::Corrupt(format!(
            "CRC mismatch: stored {:08x}, computed {:08x}",
            crc, actual
        ));
    }

    FrameRead::Frame {
        payload: payload.to_vec(),
        consumed: total,
    }
}
