//! Structural item writer
//!
//! Integers and length prefixes take the shortest representation. Key order
//! is the caller's; the writer does not canonicalise documents.

use crate::half::{f16_to_f32, f32_to_f16};
use crate::stream::Writer;
use crate::Result;

const MAJOR_UINT: u8 = 0;
const MAJOR_NINT: u8 = 1;
const MAJOR_BYTES: u8 = 2;
const MAJOR_TEXT: u8 = 3;
const MAJOR_ARRAY: u8 = 4;
const MAJOR_MAP: u8 = 5;
const MAJOR_TAG: u8 = 6;
const MAJOR_SIMPLE: u8 = 7;

const TAG_DATETIME_EPOCH: u64 = 1;
const TAG_DECIMAL: u64 = 4;
const TAG_ENCODED: u64 = 24;
const TAG_RATIONAL: u64 = 30;
const TAG_SELF_DESCRIBE: u64 = 55799;

impl<'a> Writer<'a> {
    fn head(&mut self, mt: u8, v: u64) -> Result<()> {
        if v < 24 {
            self.put_byte((mt << 5) | v as u8)
        } else if v < 0x100 {
            self.put(&[(mt << 5) | 24, v as u8])
        } else if v < 0x1_0000 {
            self.put(&[(mt << 5) | 25, (v >> 8) as u8, v as u8])
        } else if v < 0x1_0000_0000 {
            self.put_byte((mt << 5) | 26)?;
            self.put(&(v as u32).to_be_bytes())
        } else {
            self.put_byte((mt << 5) | 27)?;
            self.put(&v.to_be_bytes())
        }
    }

    fn head_ai(&mut self, mt: u8, ai: u8) -> Result<()> {
        self.put_byte((mt << 5) | ai)
    }

    pub fn u64(&mut self, v: u64) -> Result<()> {
        self.head(MAJOR_UINT, v)
    }

    pub fn i64(&mut self, v: i64) -> Result<()> {
        if v >= 0 {
            self.head(MAJOR_UINT, v as u64)
        } else {
            self.head(MAJOR_NINT, !(v as u64))
        }
    }

    pub fn bool(&mut self, v: bool) -> Result<()> {
        self.head_ai(MAJOR_SIMPLE, if v { 21 } else { 20 })
    }

    pub fn null(&mut self) -> Result<()> {
        self.head_ai(MAJOR_SIMPLE, 22)
    }

    pub fn undefined(&mut self) -> Result<()> {
        self.head_ai(MAJOR_SIMPLE, 23)
    }

    pub fn simple(&mut self, v: u8) -> Result<()> {
        self.head(MAJOR_SIMPLE, v as u64)
    }

    pub fn text(&mut self, v: &str) -> Result<()> {
        self.head(MAJOR_TEXT, v.len() as u64)?;
        self.put(v.as_bytes())
    }

    pub fn text_start(&mut self) -> Result<()> {
        self.head_ai(MAJOR_TEXT, 31)
    }

    pub fn bytes(&mut self, v: &[u8]) -> Result<()> {
        self.head(MAJOR_BYTES, v.len() as u64)?;
        self.put(v)
    }

    pub fn bytes_start(&mut self) -> Result<()> {
        self.head_ai(MAJOR_BYTES, 31)
    }

    pub fn array(&mut self, n: usize) -> Result<()> {
        self.head(MAJOR_ARRAY, n as u64)
    }

    pub fn array_start(&mut self) -> Result<()> {
        self.head_ai(MAJOR_ARRAY, 31)
    }

    pub fn map(&mut self, n: usize) -> Result<()> {
        self.head(MAJOR_MAP, n as u64)
    }

    pub fn map_start(&mut self) -> Result<()> {
        self.head_ai(MAJOR_MAP, 31)
    }

    /// Closes the innermost indefinite-length item.
    pub fn end(&mut self) -> Result<()> {
        self.head_ai(MAJOR_SIMPLE, 31)
    }

    pub fn tag(&mut self, tag: u64) -> Result<()> {
        self.head(MAJOR_TAG, tag)
    }

    /// The self-describe marker a document may open with.
    pub fn self_describe(&mut self) -> Result<()> {
        self.head(MAJOR_TAG, TAG_SELF_DESCRIBE)
    }

    /// Embeds an already-encoded document (tag 24 byte string).
    pub fn encoded(&mut self, doc: &[u8]) -> Result<()> {
        self.head(MAJOR_TAG, TAG_ENCODED)?;
        self.bytes(doc)
    }

    /// Writes the half-precision image of `v` (rounding through f16).
    pub fn f16(&mut self, v: f32) -> Result<()> {
        self.head_ai(MAJOR_SIMPLE, 25)?;
        self.put(&f32_to_f16(v).to_be_bytes())
    }

    /// Writes `v` at half precision when that round-trips exactly, single
    /// precision otherwise. NaN and infinities always compact to f16.
    pub fn f32(&mut self, v: f32) -> Result<()> {
        if v.is_nan() || v.is_infinite() {
            return self.f16(v);
        }
        let half = f32_to_f16(v);
        if f16_to_f32(half) == v {
            return self.f16(v);
        }
        self.head_ai(MAJOR_SIMPLE, 26)?;
        self.put(&v.to_bits().to_be_bytes())
    }

    /// Writes `v` at the smallest width that round-trips exactly.
    pub fn f64(&mut self, v: f64) -> Result<()> {
        if v.is_nan() || v.is_infinite() {
            return self.f16(v as f32);
        }
        let single = v as f32;
        if single as f64 == v {
            return self.f32(single);
        }
        self.head_ai(MAJOR_SIMPLE, 27)?;
        self.put(&v.to_bits().to_be_bytes())
    }

    /// Epoch datetime (tag 1); whole-second values go as integers.
    pub fn datetime(&mut self, epoch: f64) -> Result<()> {
        self.head(MAJOR_TAG, TAG_DATETIME_EPOCH)?;
        let whole = epoch as i64;
        if whole as f64 == epoch {
            self.i64(whole)
        } else {
            self.f64(epoch)
        }
    }

    /// Decimal fraction `mant * 10^exp` (tag 4).
    pub fn decimal(&mut self, mant: i64, exp: i64) -> Result<()> {
        self.head(MAJOR_TAG, TAG_DECIMAL)?;
        self.array(2)?;
        self.i64(exp)?;
        self.i64(mant)
    }

    /// Rational `num / den` (tag 30).
    pub fn rational(&mut self, num: i64, den: u64) -> Result<()> {
        self.head(MAJOR_TAG, TAG_RATIONAL)?;
        self.array(2)?;
        self.i64(num)?;
        self.u64(den)
    }
}
