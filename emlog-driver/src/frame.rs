//! Wire frame header and framing helpers
//!
//! Every frame on the link is `SENTINEL, stuffed(body), SENTINEL`. For port
//! frames the body starts with the header byte `(port << 2) | kind`; log
//! records occupy the header position with their prefix-pointer byte instead,
//! whose low two bits (the record kind, 0 or 1) distinguish them from
//! [`FrameKind::Data`] port traffic on the host side.

use emlog_core::{FrameKind, Port};

use crate::cobs;

/// Header byte of a port frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FrameHeader {
    pub port: Port,
    pub kind: FrameKind,
}

impl FrameHeader {
    pub const fn new(port: Port, kind: FrameKind) -> Self {
        Self { port, kind }
    }

    pub const fn data(port: Port) -> Self {
        Self::new(port, FrameKind::Data)
    }

    pub const fn into_u8(self) -> u8 {
        (self.port.into_u8() << 2) | self.kind.into_u8()
    }

    pub const fn from_u8(byte: u8) -> Self {
        Self {
            port: Port::from_u8_truncating(byte >> 2),
            kind: FrameKind::from_u8_truncating(byte),
        }
    }
}

impl From<FrameHeader> for u8 {
    fn from(value: FrameHeader) -> Self {
        value.into_u8()
    }
}

impl From<u8> for FrameHeader {
    fn from(value: u8) -> Self {
        Self::from_u8(value)
    }
}

/// Worst-case framed size for an `n`-byte body: stuffing plus two sentinels.
pub const fn max_framed_len(n: usize) -> usize {
    cobs::max_encoded_len(n) + 2
}

/// Stuffs `body` into `dst` between two sentinels, returning the frame
/// length. `dst` must hold [`max_framed_len`]`(body.len())` bytes.
///
/// Back-to-back frames may share a sentinel on the wire; keeping both here
/// lets a transmitter resynchronise after a partial write without ever
/// introducing a spurious frame (two sentinels decode as an empty frame,
/// which receivers ignore).
pub fn encode_frame(body: &[u8], dst: &mut [u8]) -> usize {
    dst[0] = cobs::SENTINEL;
    let n = cobs::encode(body, &mut dst[1..]);
    dst[1 + n] = cobs::SENTINEL;
    n + 2
}
