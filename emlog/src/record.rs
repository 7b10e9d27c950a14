//! Log record building
//!
//! A record is the port-0 product of the emitter: a 4-byte little-endian
//! reference to a host-side descriptor string (its two lowest bits replaced
//! by the record kind), followed by argument slots in call-site order. The
//! host recovers the slot types from the descriptor, so only the payloads
//! travel; the slot tag characters are a build-time contract.
//!
//! The whole frame is bounded by [`config::RECORD_BUF_SIZE`]. A text
//! argument that does not fit is cut to the remaining space; a fixed-width
//! argument that does not fit ends the slot stream.

use emlog_core::config;
use emlog_driver::frame;

/// Record kind carried in the two lowest bits of the descriptor reference.
pub(crate) const KIND_FORMATTED: u8 = 0;
pub(crate) const KIND_MEMORY_DUMP: u8 = 1;

/// Frame overhead: two sentinels plus the stuffing length byte (a record
/// payload is well below one stuffing run).
const FRAME_OVERHEAD: usize = 3;

/// Largest record payload, descriptor reference included.
pub(crate) const MAX_PAYLOAD: usize = config::RECORD_BUF_SIZE - FRAME_OVERHEAD;

/// Largest memory-dump data length (payload minus descriptor and address).
pub const MAX_DUMP_LEN: usize = MAX_PAYLOAD - 8;

/// Reference to a host-side descriptor string (`level:file:line:format`),
/// interned by [`log_str!`](crate::log_str). Opaque to the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LogStr(u32);

impl LogStr {
    pub const fn new(addr: u32) -> Self {
        Self(addr)
    }

    pub fn from_ptr(p: *const u8) -> Self {
        Self(p as usize as u32)
    }

    pub const fn into_u32(self) -> u32 {
        self.0
    }
}

/// Interns `s` into a fixed-size array, for descriptor statics.
pub const fn str_to_array<const N: usize>(s: &str) -> [u8; N] {
    let bytes = s.as_bytes();
    let mut out = [0u8; N];
    let mut i = 0;
    while i < N {
        out[i] = bytes[i];
        i += 1;
    }
    out
}

/// One typed record argument.
///
/// The variants mirror the wire slot tags: `'0'` 4-byte integer (everything
/// smaller promotes to it), `'1'` 8-byte integer, `'2'` double, `'3'`
/// extended float image, `'4'` NUL-terminated text, `'5'` pointer.
#[derive(Debug, Clone, Copy)]
pub enum Arg<'a> {
    Int(u32),
    Long(u64),
    Double(f64),
    Extended([u8; 16]),
    Text(&'a str),
    Ptr(u32),
}

impl Arg<'_> {
    /// Pointer argument from a raw address.
    pub fn ptr<T>(p: *const T) -> Self {
        Arg::Ptr(p as usize as u32)
    }
}

impl From<bool> for Arg<'_> {
    fn from(v: bool) -> Self {
        Arg::Int(v as u32)
    }
}

impl From<char> for Arg<'_> {
    fn from(v: char) -> Self {
        Arg::Int(v as u32)
    }
}

macro_rules! arg_from_int {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Arg<'_> {
                fn from(v: $ty) -> Self {
                    Arg::Int(v as u32)
                }
            }
        )*
    };
}

arg_from_int!(u8, i8, u16, i16, u32, i32);

impl From<u64> for Arg<'_> {
    fn from(v: u64) -> Self {
        Arg::Long(v)
    }
}

impl From<i64> for Arg<'_> {
    fn from(v: i64) -> Self {
        Arg::Long(v as u64)
    }
}

impl From<f32> for Arg<'_> {
    fn from(v: f32) -> Self {
        Arg::Double(v as f64)
    }
}

impl From<f64> for Arg<'_> {
    fn from(v: f64) -> Self {
        Arg::Double(v)
    }
}

impl<'a> From<&'a str> for Arg<'a> {
    fn from(v: &'a str) -> Self {
        Arg::Text(v)
    }
}

/// Builds record payloads and frames them, all within one bounded buffer.
pub(crate) struct RecordBuf {
    payload: [u8; MAX_PAYLOAD],
    len: usize,
}

impl RecordBuf {
    fn new() -> Self {
        Self {
            payload: [0; MAX_PAYLOAD],
            len: 0,
        }
    }

    fn remaining(&self) -> usize {
        MAX_PAYLOAD - self.len
    }

    fn push(&mut self, bytes: &[u8]) {
        self.payload[self.len..self.len + bytes.len()].copy_from_slice(bytes);
        self.len += bytes.len();
    }

    fn push_descriptor(&mut self, prefix: LogStr, kind: u8) {
        let mut le = prefix.into_u32().to_le_bytes();
        le[0] = (le[0] & 0xfc) | (kind & 0x3);
        self.push(&le);
    }

    /// Appends one slot; returns false once the buffer is full (the record
    /// is then emitted short, per the truncation contract).
    fn push_arg(&mut self, arg: &Arg) -> bool {
        match arg {
            Arg::Int(v) => self.push_fixed(&v.to_le_bytes()),
            Arg::Long(v) => self.push_fixed(&v.to_le_bytes()),
            Arg::Double(v) => self.push_fixed(&v.to_bits().to_le_bytes()),
            Arg::Extended(image) => self.push_fixed(image),
            Arg::Ptr(v) => self.push_fixed(&v.to_le_bytes()),
            Arg::Text(s) => {
                if self.remaining() < 1 {
                    return false;
                }
                let bytes = s.as_bytes();
                let stop = bytes
                    .iter()
                    .position(|&b| b == 0)
                    .unwrap_or(bytes.len());
                let n = stop.min(self.remaining() - 1);
                self.push(&bytes[..n]);
                self.push(&[0]);
                true
            }
        }
    }

    fn push_fixed(&mut self, bytes: &[u8]) -> bool {
        if self.remaining() < bytes.len() {
            return false;
        }
        self.push(bytes);
        true
    }

    /// The framed wire image of the record.
    fn frame(&self) -> ([u8; config::RECORD_BUF_SIZE], usize) {
        let mut framed = [0u8; config::RECORD_BUF_SIZE];
        let n = frame::encode_frame(&self.payload[..self.len], &mut framed);
        (framed, n)
    }
}

/// Frames a formatted record. Arguments past the buffer bound are dropped
/// from the argument that no longer fits.
pub(crate) fn build_formatted(
    prefix: LogStr,
    args: &[Arg],
) -> ([u8; config::RECORD_BUF_SIZE], usize) {
    let mut rec = RecordBuf::new();
    rec.push_descriptor(prefix, KIND_FORMATTED);
    for arg in args {
        if !rec.push_arg(arg) {
            break;
        }
    }
    rec.frame()
}

/// Frames a memory-dump record; `data` is cut to [`MAX_DUMP_LEN`].
pub(crate) fn build_memory_dump(
    prefix: LogStr,
    addr: u32,
    data: &[u8],
) -> ([u8; config::RECORD_BUF_SIZE], usize) {
    let mut rec = RecordBuf::new();
    rec.push_descriptor(prefix, KIND_MEMORY_DUMP);
    rec.push(&addr.to_le_bytes());
    let n = data.len().min(MAX_DUMP_LEN);
    rec.push(&data[..n]);
    rec.frame()
}
