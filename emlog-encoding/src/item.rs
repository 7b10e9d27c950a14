//! The decoded item model and its conversions

use crate::half::f32_to_f16;
use crate::read::walk_string;
use crate::stream::Stream;
use crate::{Error, Result};

/// One self-describing value.
///
/// Container variants carry a sub-stream bounded to their content, so the
/// caller can descend lazily; nothing is copied out of the parent buffer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Item<'a> {
    UInt(u64),
    /// Negative integer `-(n + 1)`.
    NInt(u64),
    Bytes(Span<'a>),
    Text(Span<'a>),
    /// Entry region and element count.
    Array(Stream<'a>, usize),
    /// Entry region and pair count.
    Map(Stream<'a>, usize),
    /// Unrecognised tag: content stream positioned at the tagged item.
    Tag(Stream<'a>, u64),
    /// Unrecognised simple value.
    Simple(u8),
    Bool(bool),
    Null,
    Undefined,
    /// Half-precision payload, widened for arithmetic.
    F16(f32),
    F32(f32),
    F64(f64),
    /// Seconds since the epoch.
    Datetime(f64),
    Decimal { mant: i64, exp: i64 },
    Rational { num: i64, den: u64 },
    /// Nested self-describing document (tag 24 byte string).
    Encoded(Span<'a>),
}

/// A byte- or text-string region.
///
/// Holds the raw encoding (possibly several indefinite-length chunks) and
/// the expanded length. Content is materialised with [`Span::copy_to`] or
/// compared in place with [`Span::eq_bytes`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Span<'a> {
    pub(crate) raw: Stream<'a>,
    pub(crate) len: usize,
}

impl<'a> Span<'a> {
    /// Expanded content length in bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Copies the content into `out`, returning the length.
    pub fn copy_to(&self, out: &mut [u8]) -> Result<usize> {
        if out.len() < self.len {
            return Err(Error::BufferTooSmall);
        }
        let mut off = 0;
        self.walk(|chunk| {
            out[off..off + chunk.len()].copy_from_slice(chunk);
            off += chunk.len();
            Ok(())
        })?;
        Ok(off)
    }

    /// Compares the content against `other` without copying.
    pub fn eq_bytes(&self, other: &[u8]) -> bool {
        if other.len() != self.len {
            return false;
        }
        let mut off = 0;
        let mut equal = true;
        let walked = self.walk(|chunk| {
            equal &= &other[off..off + chunk.len()] == chunk;
            off += chunk.len();
            Ok(())
        });
        walked.is_ok() && equal
    }

    /// The content as one slice, available when it is a single
    /// definite-length chunk (always the case for data this stack writes).
    pub fn as_contiguous(&self) -> Option<&'a [u8]> {
        let mut s = self.raw;
        let (_, ai, n) = s.read_head().ok()?;
        if ai == 31 {
            return None;
        }
        s.take(n as usize).ok()
    }

    fn walk(&self, mut f: impl FnMut(&'a [u8]) -> Result<()>) -> Result<()> {
        let mut s = self.raw;
        let (mt, ai, n) = s.read_head()?;
        walk_string(&mut s, mt, ai, n, &mut f)?;
        Ok(())
    }
}

impl<'a> Item<'a> {
    pub fn as_u64(&self) -> Result<u64> {
        match *self {
            Item::UInt(v) => Ok(v),
            _ => Err(Error::CannotConvert),
        }
    }

    pub fn as_u32(&self) -> Result<u32> {
        self.as_u64()?.try_into().map_err(|_| Error::Range)
    }

    pub fn as_u16(&self) -> Result<u16> {
        self.as_u64()?.try_into().map_err(|_| Error::Range)
    }

    pub fn as_u8(&self) -> Result<u8> {
        self.as_u64()?.try_into().map_err(|_| Error::Range)
    }

    pub fn as_i64(&self) -> Result<i64> {
        match *self {
            Item::UInt(v) => i64::try_from(v).map_err(|_| Error::Range),
            Item::NInt(v) => {
                if v > i64::MAX as u64 {
                    return Err(Error::Range);
                }
                Ok(-(v as i64) - 1)
            }
            _ => Err(Error::CannotConvert),
        }
    }

    pub fn as_i32(&self) -> Result<i32> {
        self.as_i64()?.try_into().map_err(|_| Error::Range)
    }

    pub fn as_i16(&self) -> Result<i16> {
        self.as_i64()?.try_into().map_err(|_| Error::Range)
    }

    pub fn as_i8(&self) -> Result<i8> {
        self.as_i64()?.try_into().map_err(|_| Error::Range)
    }

    pub fn as_bool(&self) -> Result<bool> {
        match *self {
            Item::Bool(v) => Ok(v),
            _ => Err(Error::CannotConvert),
        }
    }

    pub fn as_null(&self) -> Result<()> {
        match *self {
            Item::Null => Ok(()),
            _ => Err(Error::CannotConvert),
        }
    }

    pub fn as_undefined(&self) -> Result<()> {
        match *self {
            Item::Undefined => Ok(()),
            _ => Err(Error::CannotConvert),
        }
    }

    pub fn as_simple(&self) -> Result<u8> {
        match *self {
            Item::Simple(v) => Ok(v),
            _ => Err(Error::CannotConvert),
        }
    }

    /// Widens any numeric form to f64.
    ///
    /// Decimal corner cases: zero mantissa yields zero regardless of the
    /// exponent; exponents beyond ±3000 saturate before the power is
    /// evaluated.
    pub fn as_f64(&self) -> Result<f64> {
        match *self {
            Item::UInt(v) => Ok(v as f64),
            Item::NInt(v) => Ok(-1.0 - v as f64),
            Item::F16(v) => Ok(v as f64),
            Item::F32(v) => Ok(v as f64),
            Item::F64(v) => Ok(v),
            Item::Decimal { mant, exp } => {
                if mant == 0 {
                    Ok(0.0)
                } else if exp > 3000 {
                    Ok(f64::INFINITY)
                } else if exp < -3000 {
                    Ok(mant as f64 * 0.0)
                } else {
                    Ok(mant as f64 * pow10(exp as i32))
                }
            }
            Item::Rational { num, den } => Ok(num as f64 / den as f64),
            _ => Err(Error::CannotConvert),
        }
    }

    pub fn as_f32(&self) -> Result<f32> {
        Ok(self.as_f64()? as f32)
    }

    /// Narrows to half precision, rounding through the f16 format.
    pub fn as_f16(&self) -> Result<f32> {
        Ok(crate::half::f16_to_f32(f32_to_f16(self.as_f64()? as f32)))
    }

    pub fn as_datetime(&self) -> Result<f64> {
        match *self {
            Item::Datetime(v) => Ok(v),
            _ => Err(Error::CannotConvert),
        }
    }

    pub fn as_decimal(&self) -> Result<(i64, i64)> {
        match *self {
            Item::Decimal { mant, exp } => Ok((mant, exp)),
            _ => Err(Error::CannotConvert),
        }
    }

    pub fn as_rational(&self) -> Result<(i64, u64)> {
        match *self {
            Item::Rational { num, den } => Ok((num, den)),
            _ => Err(Error::CannotConvert),
        }
    }

    pub fn as_text(&self) -> Result<Span<'a>> {
        match *self {
            Item::Text(span) => Ok(span),
            _ => Err(Error::CannotConvert),
        }
    }

    pub fn as_bytes(&self) -> Result<Span<'a>> {
        match *self {
            Item::Bytes(span) => Ok(span),
            _ => Err(Error::CannotConvert),
        }
    }

    pub fn as_array(&self) -> Result<(Stream<'a>, usize)> {
        match *self {
            Item::Array(s, n) => Ok((s, n)),
            _ => Err(Error::CannotConvert),
        }
    }

    pub fn as_map(&self) -> Result<(Stream<'a>, usize)> {
        match *self {
            Item::Map(s, n) => Ok((s, n)),
            _ => Err(Error::CannotConvert),
        }
    }

    pub fn as_tag(&self) -> Result<(Stream<'a>, u64)> {
        match *self {
            Item::Tag(s, tag) => Ok((s, tag)),
            _ => Err(Error::CannotConvert),
        }
    }

    pub fn as_encoded(&self) -> Result<Span<'a>> {
        match *self {
            Item::Encoded(span) => Ok(span),
            _ => Err(Error::CannotConvert),
        }
    }
}

/// 10^exp by binary exponentiation; |exp| <= 3000 by the caller.
fn pow10(exp: i32) -> f64 {
    let mut result = 1.0f64;
    let mut base = 10.0f64;
    let mut e = exp.unsigned_abs();
    while e > 0 {
        if e & 1 != 0 {
            result *= base;
        }
        base *= base;
        e >>= 1;
    }
    if exp < 0 {
        1.0 / result
    } else {
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_int_conversions() {
        assert_eq!(Item::UInt(300).as_u16().unwrap(), 300);
        assert_eq!(Item::UInt(300).as_u8(), Err(Error::Range));
        assert_eq!(Item::NInt(0).as_i64().unwrap(), -1);
        assert_eq!(Item::NInt(0x7fff_ffff_ffff_ffff).as_i64().unwrap(), i64::MIN);
        assert_eq!(Item::NInt(0x8000_0000_0000_0000).as_i64(), Err(Error::Range));
        assert_eq!(Item::NInt(0).as_u64(), Err(Error::CannotConvert));
        assert_eq!(Item::UInt(u64::MAX).as_i64(), Err(Error::Range));
    }

    #[test]
    fn test_float_conversions() {
        assert_eq!(Item::UInt(4).as_f64().unwrap(), 4.0);
        assert_eq!(Item::NInt(3).as_f64().unwrap(), -4.0);
        assert_eq!(
            Item::Decimal { mant: 1234, exp: 2 }.as_f64().unwrap(),
            123400.0
        );
        let approx = Item::Decimal { mant: 1234, exp: -2 }.as_f64().unwrap();
        assert!((approx - 12.34).abs() < 1e-9);
        assert_eq!(Item::Decimal { mant: 0, exp: 9999 }.as_f64().unwrap(), 0.0);
        assert_eq!(
            Item::Decimal { mant: 1, exp: 3001 }.as_f64().unwrap(),
            f64::INFINITY
        );
        assert_eq!(
            Item::Decimal { mant: -1, exp: -3001 }.as_f64().unwrap(),
            -0.0
        );
        assert_eq!(
            Item::Rational { num: 1, den: 4 }.as_f64().unwrap(),
            0.25
        );
        assert_eq!(Item::Bool(true).as_f64(), Err(Error::CannotConvert));
    }

    #[test]
    fn test_pow10() {
        assert_eq!(pow10(0), 1.0);
        assert_eq!(pow10(3), 1000.0);
        assert_eq!(pow10(-2), 0.01);
        assert!(pow10(400).is_infinite());
    }
}
