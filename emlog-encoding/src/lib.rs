//! Self-describing binary item codec
//!
//! The codec reads and writes the CBOR data item model (RFC 8949) over plain
//! byte slices, with no allocation. It backs both the device-discovery
//! handshake of the transport and application payloads.
//!
//! Support is geared to what the device and host decoders can represent.
//! Recommendations for producers:
//! * Limit map keys to integers or text strings, and avoid mixing keys that
//!   are the same "value" in both forms (`1` and `"1"`).
//! * Prefer text keys without embedded NUL characters.
//!
//! Encoder details:
//! * Integers and length prefixes are as short as possible.
//! * Floats shrink to the smallest width that round-trips exactly;
//!   NaN and infinities always compact to half precision.
//! * Keys are not sorted, so the output is not canonical at the document
//!   level; the application orders keys if it needs that.
//! * Definite and indefinite forms are both available
//!   ([`Writer::array`] vs [`Writer::array_start`] / [`Writer::end`]).
//! * Datetimes use the epoch form (tag 1), decimals tag 4, embedded
//!   documents tag 24, rationals tag 30, the self-describe marker tag 55799.
//!
//! Decoder details:
//! * Not strict: duplicate map keys are accepted (lookups return the first
//!   match), as are integers and lengths that are not minimally encoded.
//! * Tags 0, 1, 4, 24 and 30 convert inline to their semantic item; the
//!   self-describe tag is silently unwrapped. Unrecognised tags come back as
//!   [`Item::Tag`] for the application to inspect.
//! * Text is validated as UTF-8 chunk by chunk (feature `validate-utf8`).
//! * Nesting depth is bounded by [`MAX_RECURSION`].
#![no_std]

mod half;
mod item;
mod lookup;
mod pack;
mod read;
mod stream;
mod write;

pub use item::{Item, Span};
pub use pack::{pack, unpack, Arg, Out};
pub use stream::{Stream, Writer};

/// Depth bound for nested reads, keeping stack use bounded on decode.
pub const MAX_RECURSION: usize = 4;

pub type Result<T> = core::result::Result<T, Error>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// Ran past the end of the buffer. Sticky on the reading stream; the
    /// caller may retry after refilling.
    EndOfStream,
    /// Additional-information encoding 28..=30, or 31 where it is not legal.
    InvalidAi,
    /// An indefinite-length string chunk of a different major type.
    IndefMismatch,
    /// An indefinite-length chunk inside an indefinite-length string.
    IndefNesting,
    InvalidUtf8,
    /// Output shorter than the value; the caller sizes the buffer and
    /// retries.
    BufferTooSmall,
    /// The item is not of the requested type.
    BadType,
    /// Nesting deeper than [`MAX_RECURSION`].
    Recursion,
    /// Indefinite-length map with an odd number of items.
    MapLength,
    /// Simple value encoded with an extension byte below 32.
    BadSimpleValue,
    /// BREAK outside an indefinite-length item.
    UnexpectedBreak,
    /// Definite length too large for this platform.
    ItemTooLong,
    /// Numeric value outside the requested range.
    Range,
    KeyNotFound,
    IndexOutOfRange,
    /// Tag 4 content that is not a two-element integer array.
    BadDecimal,
    /// Tag 30 content that is not `[num, den]` with a non-zero denominator.
    BadRational,
    /// Tag 24 content that is not a byte string.
    BadEncoded,
    /// The item has no numeric interpretation.
    CannotConvert,
    /// Pack/unpack format string misuse.
    Fmt,
    /// Unpack format names more array elements than the array holds.
    ArrayTooLarge,
}
