//! Streaming item reader

use crate::item::{Item, Span};
use crate::stream::Stream;
use crate::{Error, Result, MAX_RECURSION};

const BREAK_AI: u8 = 31;
const SELF_DESCRIBE_TAG: u64 = 55799;

impl<'a> Stream<'a> {
    /// Initial byte plus any extension bytes: major type, additional info,
    /// inlined value (zero for indefinite-length markers).
    pub(crate) fn read_head(&mut self) -> Result<(u8, u8, u64)> {
        let initial = self.take_byte()?;
        let mt = initial >> 5;
        let ai = initial & 0x1f;
        let v = if ai < 24 {
            ai as u64
        } else if ai < 28 {
            let ext = self.take(1usize << (ai - 24))?;
            let mut v = 0u64;
            for &b in ext {
                v = (v << 8) | b as u64;
            }
            v
        } else if ai == BREAK_AI && mt != 0 && mt != 1 && mt != 6 {
            // Indefinite length: legal for strings, containers and BREAK.
            0
        } else {
            return Err(self.fail(Error::InvalidAi));
        };
        Ok((mt, ai, v))
    }

    /// Consumes one top-level item.
    pub fn read_any(&mut self) -> Result<Item<'a>> {
        self.check()?;
        self.read_item(0)
    }

    /// Consumes and drops `n` items.
    pub fn skip_items(&mut self, n: usize) -> Result<()> {
        for _ in 0..n {
            self.read_any()?;
        }
        Ok(())
    }

    fn read_item(&mut self, depth: usize) -> Result<Item<'a>> {
        if depth > MAX_RECURSION {
            return Err(self.fail(Error::Recursion));
        }

        loop {
            let start = self.position();
            let (mt, ai, n) = self.read_head()?;

            return match mt {
                0 => Ok(Item::UInt(n)),
                1 => Ok(Item::NInt(n)),

                2 | 3 => {
                    let is_text = mt == 3;
                    let mut check = |chunk: &'a [u8]| -> Result<()> {
                        #[cfg(feature = "validate-utf8")]
                        {
                            if is_text && core::str::from_utf8(chunk).is_err() {
                                return Err(Error::InvalidUtf8);
                            }
                        }
                        #[cfg(not(feature = "validate-utf8"))]
                        let _ = (is_text, chunk);
                        Ok(())
                    };
                    let len = walk_string(self, mt, ai, n, &mut check)?;
                    let span = Span {
                        raw: self.sub(start, self.position()),
                        len,
                    };
                    Ok(if is_text {
                        Item::Text(span)
                    } else {
                        Item::Bytes(span)
                    })
                }

                4 | 5 => self.read_container(mt == 5, ai, n, depth),

                6 => {
                    if n == SELF_DESCRIBE_TAG {
                        continue;
                    }
                    let content = *self;
                    let inner = self.read_item(depth + 1)?;
                    match n {
                        0 => convert_datetime_text(&inner),
                        1 => Ok(Item::Datetime(inner.as_f64()?)),
                        4 => convert_decimal(&inner),
                        24 => match inner {
                            Item::Bytes(span) => Ok(Item::Encoded(span)),
                            _ => Err(Error::BadEncoded),
                        },
                        30 => convert_rational(&inner),
                        _ => Ok(Item::Tag(content, n)),
                    }
                }

                _ => match ai {
                    20 | 21 => Ok(Item::Bool(ai == 21)),
                    22 => Ok(Item::Null),
                    23 => Ok(Item::Undefined),
                    24 => {
                        if n < 32 {
                            Err(self.fail(Error::BadSimpleValue))
                        } else {
                            Ok(Item::Simple(n as u8))
                        }
                    }
                    25 => Ok(Item::F16(crate::half::f16_to_f32(n as u16))),
                    26 => Ok(Item::F32(f32::from_bits(n as u32))),
                    27 => Ok(Item::F64(f64::from_bits(n))),
                    28..=30 => Err(self.fail(Error::BadSimpleValue)),
                    31 => Err(self.fail(Error::UnexpectedBreak)),
                    _ => Ok(Item::Simple(ai)),
                },
            };
        }
    }

    fn read_container(
        &mut self,
        is_map: bool,
        ai: u8,
        n: u64,
        depth: usize,
    ) -> Result<Item<'a>> {
        if ai == BREAK_AI {
            let start = self.position();
            let mut count = 0usize;
            while self.peek_byte()? != 0xff {
                self.read_item(depth + 1)?;
                count += 1;
            }
            let end = self.position();
            self.take_byte()?;
            if is_map {
                if count % 2 != 0 {
                    return Err(self.fail(Error::MapLength));
                }
                count /= 2;
            }
            let sub = self.sub(start, end);
            Ok(if is_map {
                Item::Map(sub, count)
            } else {
                Item::Array(sub, count)
            })
        } else {
            let count = match usize::try_from(n) {
                Ok(count) => count,
                Err(_) => return Err(self.fail(Error::ItemTooLong)),
            };
            let entries = if is_map {
                match count.checked_mul(2) {
                    Some(entries) => entries,
                    None => return Err(self.fail(Error::ItemTooLong)),
                }
            } else {
                count
            };
            let start = self.position();
            for _ in 0..entries {
                self.read_item(depth + 1)?;
            }
            let sub = self.sub(start, self.position());
            Ok(if is_map {
                Item::Map(sub, count)
            } else {
                Item::Array(sub, count)
            })
        }
    }
}

macro_rules! typed_read {
    ($($(#[$meta:meta])* $name:ident => $as:ident -> $ty:ty;)*) => {
        impl<'a> Stream<'a> {
            $(
                $(#[$meta])*
                pub fn $name(&mut self) -> Result<$ty> {
                    self.read_any()?.$as()
                }
            )*
        }
    };
}

typed_read! {
    u8 => as_u8 -> u8;
    u16 => as_u16 -> u16;
    u32 => as_u32 -> u32;
    u64 => as_u64 -> u64;
    i8 => as_i8 -> i8;
    i16 => as_i16 -> i16;
    i32 => as_i32 -> i32;
    i64 => as_i64 -> i64;
    bool => as_bool -> bool;
    null => as_null -> ();
    undefined => as_undefined -> ();
    simple => as_simple -> u8;
    /// Reads a half-precision value, widened to f32.
    f16 => as_f16 -> f32;
    f32 => as_f32 -> f32;
    f64 => as_f64 -> f64;
    datetime => as_datetime -> f64;
    decimal => as_decimal -> (i64, i64);
    rational => as_rational -> (i64, u64);
    text => as_text -> Span<'a>;
    bytes => as_bytes -> Span<'a>;
    array => as_array -> (Stream<'a>, usize);
    map => as_map -> (Stream<'a>, usize);
    tag => as_tag -> (Stream<'a>, u64);
    encoded => as_encoded -> Span<'a>;
}

/// Walks the chunk(s) of a byte- or text-string item whose head has already
/// been consumed, feeding each content chunk to `visit`. Returns the
/// expanded length.
pub(crate) fn walk_string<'a>(
    s: &mut Stream<'a>,
    mt: u8,
    ai: u8,
    n: u64,
    visit: &mut impl FnMut(&'a [u8]) -> Result<()>,
) -> Result<usize> {
    let indefinite = ai == BREAK_AI;
    let mut total = 0usize;
    loop {
        let chunk_len = if indefinite {
            let (cmt, cai, cn) = s.read_head()?;
            if cmt == 7 && cai == BREAK_AI {
                break;
            }
            if cmt != mt {
                return Err(s.fail(Error::IndefMismatch));
            }
            if cai == BREAK_AI {
                return Err(s.fail(Error::IndefNesting));
            }
            cn
        } else {
            n
        };
        let chunk_len = match usize::try_from(chunk_len) {
            Ok(len) => len,
            Err(_) => return Err(s.fail(Error::ItemTooLong)),
        };
        let chunk = s.take(chunk_len)?;
        visit(chunk).map_err(|e| s.fail(e))?;
        total += chunk_len;
        if !indefinite {
            break;
        }
    }
    Ok(total)
}

fn convert_decimal<'a>(inner: &Item<'a>) -> Result<Item<'a>> {
    let (mut s, count) = inner.as_array().map_err(|_| Error::BadDecimal)?;
    if count != 2 {
        return Err(Error::BadDecimal);
    }
    let exp = s.read_any()?.as_i64()?;
    let mant = s.read_any()?.as_i64()?;
    Ok(Item::Decimal { mant, exp })
}

fn convert_rational<'a>(inner: &Item<'a>) -> Result<Item<'a>> {
    let (mut s, count) = inner.as_array().map_err(|_| Error::BadRational)?;
    if count != 2 {
        return Err(Error::BadRational);
    }
    let num = s.read_any()?.as_i64()?;
    let den = s.read_any()?.as_u64()?;
    if den == 0 {
        return Err(Error::BadRational);
    }
    Ok(Item::Rational { num, den })
}

fn convert_datetime_text<'a>(inner: &Item<'a>) -> Result<Item<'a>> {
    let span = inner.as_text()?;
    let mut buf = [0u8; 40];
    if span.len() >= buf.len() {
        return Err(Error::Range);
    }
    let n = span.copy_to(&mut buf)?;
    Ok(Item::Datetime(parse_rfc3339(&buf[..n])?))
}

struct TextCursor<'t> {
    s: &'t [u8],
    i: usize,
}

impl<'t> TextCursor<'t> {
    fn digits(&mut self, count: usize) -> Result<u32> {
        let mut v = 0u32;
        for _ in 0..count {
            let b = *self.s.get(self.i).ok_or(Error::Range)?;
            if !b.is_ascii_digit() {
                return Err(Error::Range);
            }
            v = v * 10 + (b - b'0') as u32;
            self.i += 1;
        }
        Ok(v)
    }

    fn byte(&mut self) -> Result<u8> {
        let b = *self.s.get(self.i).ok_or(Error::Range)?;
        self.i += 1;
        Ok(b)
    }

    fn eat(&mut self, expected: u8) -> Result<()> {
        if self.byte()? != expected {
            return Err(Error::Range);
        }
        Ok(())
    }

    fn peek(&self) -> Option<u8> {
        self.s.get(self.i).copied()
    }
}

/// `YYYY-MM-DDTHH:MM:SS[.frac](Z|±HH:MM)` to seconds since the epoch (UTC).
fn parse_rfc3339(text: &[u8]) -> Result<f64> {
    let mut p = TextCursor { s: text, i: 0 };

    let year = p.digits(4)?;
    p.eat(b'-')?;
    let month = p.digits(2)?;
    p.eat(b'-')?;
    let day = p.digits(2)?;
    p.eat(b'T')?;
    let hour = p.digits(2)?;
    p.eat(b':')?;
    let min = p.digits(2)?;
    p.eat(b':')?;
    let mut sec = p.digits(2)? as f64;

    if p.peek() == Some(b'.') {
        p.byte()?;
        let mut scale = 0.1f64;
        let mut any = false;
        while let Some(b) = p.peek() {
            if !b.is_ascii_digit() {
                break;
            }
            sec += (b - b'0') as f64 * scale;
            scale *= 0.1;
            p.byte()?;
            any = true;
        }
        if !any {
            return Err(Error::Range);
        }
    }

    let tz_offset = match p.byte()? {
        b'Z' => 0i64,
        sign @ (b'+' | b'-') => {
            let tzh = p.digits(2)?;
            p.eat(b':')?;
            let tzm = p.digits(2)?;
            if tzh > 23 || tzm > 59 {
                return Err(Error::Range);
            }
            let off = (tzh * 3600 + tzm * 60) as i64;
            if sign == b'+' {
                off
            } else {
                -off
            }
        }
        _ => return Err(Error::Range),
    };

    if p.i != text.len() {
        return Err(Error::Range);
    }
    if !(1900..=9999).contains(&year)
        || !(1..=12).contains(&month)
        || !(1..=31).contains(&day)
        || hour > 23
        || min > 59
        || sec > 60.0
    {
        return Err(Error::Range);
    }

    let days = days_from_civil(year as i64, month as i64, day as i64);
    Ok(days as f64 * 86400.0
        + (hour * 3600 + min * 60) as f64
        + sec
        - tz_offset as f64)
}

/// Days since 1970-01-01 in the proleptic Gregorian calendar.
fn days_from_civil(y: i64, m: i64, d: i64) -> i64 {
    let y = if m <= 2 { y - 1 } else { y };
    let era = if y >= 0 { y } else { y - 399 } / 400;
    let yoe = y - era * 400;
    let mp = if m > 2 { m - 3 } else { m + 9 };
    let doy = (153 * mp + 2) / 5 + d - 1;
    let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
    era * 146097 + doe - 719468
}

#[cfg(test)]
mod tests {
    extern crate std;
    use super::*;

    fn read_one(bytes: &[u8]) -> Result<Item<'_>> {
        Stream::new(bytes).read_any()
    }

    #[test]
    fn test_uint_boundaries() {
        let cases: &[(&[u8], u64)] = &[
            (&[0x00], 0),
            (&[0x17], 23),
            (&[0x18, 0x18], 24),
            (&[0x18, 0xff], 255),
            (&[0x19, 0x01, 0x00], 256),
            (&[0x19, 0xff, 0xff], 65535),
            (&[0x1a, 0x00, 0x01, 0x00, 0x00], 65536),
            (&[0x1a, 0xff, 0xff, 0xff, 0xff], 0xffff_ffff),
            (
                &[0x1b, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00],
                1 << 32,
            ),
            (
                &[0x1b, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01],
                (1 << 32) + 1,
            ),
            (
                &[0x1b, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff],
                u64::MAX,
            ),
        ];
        for (bytes, expected) in cases {
            assert_eq!(read_one(bytes).unwrap().as_u64().unwrap(), *expected);
        }
    }

    #[test]
    fn test_nint() {
        // -1, -256, i64::MIN
        assert_eq!(read_one(&[0x20]).unwrap().as_i64().unwrap(), -1);
        assert_eq!(read_one(&[0x38, 0xff]).unwrap().as_i64().unwrap(), -256);
        assert_eq!(
            read_one(&[0x3b, 0x7f, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff])
                .unwrap()
                .as_i64()
                .unwrap(),
            i64::MIN
        );
    }

    #[test]
    fn test_invalid_ai() {
        for b in [0x1cu8, 0x1d, 0x1e] {
            assert_eq!(read_one(&[b]), Err(Error::InvalidAi));
        }
        // Indefinite markers on integer and tag majors.
        assert_eq!(read_one(&[0x1f]), Err(Error::InvalidAi));
        assert_eq!(read_one(&[0x3f]), Err(Error::InvalidAi));
        assert_eq!(read_one(&[0xdf]), Err(Error::InvalidAi));
    }

    #[test]
    fn test_text_and_bytes() {
        let item = read_one(&[0x64, b't', b'e', b's', b't']).unwrap();
        let span = item.as_text().unwrap();
        assert_eq!(span.len(), 4);
        assert!(span.eq_bytes(b"test"));
        assert_eq!(span.as_contiguous(), Some(&b"test"[..]));

        let item = read_one(&[0x43, 1, 2, 3]).unwrap();
        let mut out = [0u8; 3];
        assert_eq!(item.as_bytes().unwrap().copy_to(&mut out).unwrap(), 3);
        assert_eq!(out, [1, 2, 3]);

        let mut small = [0u8; 2];
        assert_eq!(
            item.as_bytes().unwrap().copy_to(&mut small),
            Err(Error::BufferTooSmall)
        );
    }

    #[test]
    fn test_indefinite_strings() {
        // Zero chunks.
        let item = read_one(&[0x7f, 0xff]).unwrap();
        assert_eq!(item.as_text().unwrap().len(), 0);

        // One chunk.
        let item = read_one(&[0x5f, 0x42, 0xaa, 0xbb, 0xff]).unwrap();
        let span = item.as_bytes().unwrap();
        assert_eq!(span.len(), 2);
        assert!(span.eq_bytes(&[0xaa, 0xbb]));
        assert_eq!(span.as_contiguous(), None);

        // Two chunks joined by copy_to.
        let item = read_one(&[0x7f, 0x62, b'h', b'i', 0x61, b'!', 0xff]).unwrap();
        let span = item.as_text().unwrap();
        let mut out = [0u8; 3];
        span.copy_to(&mut out).unwrap();
        assert_eq!(&out, b"hi!");

        // Chunk of the wrong major type.
        assert_eq!(
            read_one(&[0x5f, 0x61, b'x', 0xff]),
            Err(Error::IndefMismatch)
        );
        // Nested indefinite chunk.
        assert_eq!(read_one(&[0x5f, 0x5f, 0xff, 0xff]), Err(Error::IndefNesting));
    }

    #[cfg(feature = "validate-utf8")]
    #[test]
    fn test_invalid_utf8() {
        assert_eq!(read_one(&[0x62, 0xc3, 0x28]), Err(Error::InvalidUtf8));
        // The same bytes are fine as a byte string.
        assert!(read_one(&[0x42, 0xc3, 0x28]).is_ok());
    }

    #[test]
    fn test_containers() {
        // [1, 2, 3]
        let item = read_one(&[0x83, 0x01, 0x02, 0x03]).unwrap();
        let (mut s, n) = item.as_array().unwrap();
        assert_eq!(n, 3);
        assert_eq!(s.u64().unwrap(), 1);
        assert_eq!(s.u64().unwrap(), 2);
        assert_eq!(s.u64().unwrap(), 3);
        assert_eq!(s.remaining(), 0);

        // {1: 2} indefinite
        let item = read_one(&[0xbf, 0x01, 0x02, 0xff]).unwrap();
        let (mut s, n) = item.as_map().unwrap();
        assert_eq!(n, 1);
        assert_eq!(s.u64().unwrap(), 1);
        assert_eq!(s.u64().unwrap(), 2);

        // Odd indefinite map.
        assert_eq!(read_one(&[0xbf, 0x01, 0xff]), Err(Error::MapLength));
    }

    #[test]
    fn test_recursion_bound() {
        // Four levels of nesting succeed; five exceed the bound.
        assert!(read_one(&[0x81, 0x81, 0x81, 0x81, 0x00]).is_ok());
        assert_eq!(
            read_one(&[0x81, 0x81, 0x81, 0x81, 0x81, 0x00]),
            Err(Error::Recursion)
        );
    }

    #[test]
    fn test_self_describe_unwrap() {
        let item = read_one(&[0xd9, 0xd9, 0xf7, 0x64, b't', b'e', b's', b't']).unwrap();
        assert!(item.as_text().unwrap().eq_bytes(b"test"));
    }

    #[test]
    fn test_simple_and_float() {
        assert_eq!(read_one(&[0xf4]).unwrap().as_bool().unwrap(), false);
        assert_eq!(read_one(&[0xf5]).unwrap().as_bool().unwrap(), true);
        assert!(read_one(&[0xf6]).unwrap().as_null().is_ok());
        assert!(read_one(&[0xf7]).unwrap().as_undefined().is_ok());
        assert_eq!(read_one(&[0xf0]).unwrap().as_simple().unwrap(), 16);
        assert_eq!(read_one(&[0xf8, 0xe0]).unwrap().as_simple().unwrap(), 224);
        assert_eq!(read_one(&[0xf8, 0x10]), Err(Error::BadSimpleValue));
        assert_eq!(read_one(&[0xff]), Err(Error::UnexpectedBreak));

        assert_eq!(read_one(&[0xf9, 0x3c, 0x00]).unwrap().as_f64().unwrap(), 1.0);
        assert_eq!(
            read_one(&[0xfa, 0x40, 0x49, 0x0f, 0xdb])
                .unwrap()
                .as_f32()
                .unwrap(),
            core::f32::consts::PI
        );
        assert_eq!(
            read_one(&[0xfb, 0x40, 0x09, 0x21, 0xfb, 0x54, 0x44, 0x2d, 0x18])
                .unwrap()
                .as_f64()
                .unwrap(),
            core::f64::consts::PI
        );
    }

    #[test]
    fn test_known_tags() {
        // Tag 1, numeric epoch.
        let item = read_one(&[0xc1, 0x1a, 0x51, 0x4b, 0x67, 0xb0]).unwrap();
        assert_eq!(item.as_datetime().unwrap(), 1363896240.0);

        // Tag 4, decimal [-2, 27315].
        let item = read_one(&[0xc4, 0x82, 0x21, 0x19, 0x6a, 0xb3]).unwrap();
        assert_eq!(item.as_decimal().unwrap(), (27315, -2));

        // Tag 30, rational [1, 2].
        let item = read_one(&[0xd8, 0x1e, 0x82, 0x01, 0x02]).unwrap();
        assert_eq!(item.as_rational().unwrap(), (1, 2));
        assert_eq!(item.as_f64().unwrap(), 0.5);
        // Zero denominator rejected.
        assert_eq!(
            read_one(&[0xd8, 0x1e, 0x82, 0x01, 0x00]),
            Err(Error::BadRational)
        );

        // Tag 24, embedded document holding uint 5.
        let item = read_one(&[0xd8, 0x18, 0x41, 0x05]).unwrap();
        let span = item.as_encoded().unwrap();
        let inner = span.as_contiguous().unwrap();
        assert_eq!(Stream::new(inner).u64().unwrap(), 5);
    }

    #[test]
    fn test_unknown_tag() {
        let item = read_one(&[0xd8, 0x2a, 0x63, b'f', b'o', b'o']).unwrap();
        let (mut content, tag) = item.as_tag().unwrap();
        assert_eq!(tag, 42);
        assert!(content.text().unwrap().eq_bytes(b"foo"));
    }

    #[test]
    fn test_datetime_text() {
        let mut bytes = std::vec![0xc0, 0x74];
        bytes.extend_from_slice(b"2013-03-21T20:04:00Z");
        let item = read_one(&bytes).unwrap();
        assert_eq!(item.as_datetime().unwrap(), 1363896240.0);

        // Offset form.
        let mut bytes = std::vec![0xc0, 0x79, 0x00, 0x19];
        bytes.extend_from_slice(b"2013-03-21T21:04:00+01:00");
        assert_eq!(read_one(&bytes).unwrap().as_datetime().unwrap(), 1363896240.0);

        // Fractional seconds.
        let mut bytes = std::vec![0xc0, 0x76];
        bytes.extend_from_slice(b"2013-03-21T20:04:00.5Z");
        assert_eq!(read_one(&bytes).unwrap().as_datetime().unwrap(), 1363896240.5);

        // Garbage rejected.
        let mut bytes = std::vec![0xc0, 0x64];
        bytes.extend_from_slice(b"soon");
        assert_eq!(read_one(&bytes), Err(Error::Range));
    }

    #[test]
    fn test_end_of_stream_is_sticky() {
        let mut s = Stream::new(&[0x19, 0x01]);
        assert_eq!(s.read_any(), Err(Error::EndOfStream));
        assert_eq!(s.read_any(), Err(Error::EndOfStream));
        assert_eq!(s.error(), Some(Error::EndOfStream));
    }

    #[test]
    fn test_days_from_civil() {
        assert_eq!(days_from_civil(1970, 1, 1), 0);
        assert_eq!(days_from_civil(1970, 1, 2), 1);
        assert_eq!(days_from_civil(1969, 12, 31), -1);
        assert_eq!(days_from_civil(2000, 3, 1), 11017);
    }
}
