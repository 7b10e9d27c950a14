//! Random-access lookups over map and array entry regions
//!
//! Lookups take the entry stream a container item carries (see
//! [`Item::as_map`](crate::Item::as_map)) and scan linearly without
//! disturbing it. The decoder is not strict about duplicate keys: the first
//! match wins. The scan is precisely "read key, compare, on match return the
//! value, otherwise skip one value item", so each non-matching pair advances
//! the cursor exactly once.

use crate::item::{Item, Span};
use crate::stream::Stream;
use crate::{Error, Result};

impl<'a> Stream<'a> {
    /// Finds `key` among `pairs` key/value pairs, comparing text keys only.
    pub fn get_any(&self, pairs: usize, key: &str) -> Result<Item<'a>> {
        let mut s = *self;
        for _ in 0..pairs {
            let k = s.read_any()?;
            let matched = matches!(k, Item::Text(span) if span.eq_bytes(key.as_bytes()));
            let v = s.read_any()?;
            if matched {
                return Ok(v);
            }
        }
        Err(Error::KeyNotFound)
    }

    /// Returns the `idx`-th of `count` items.
    pub fn idx_any(&self, count: usize, idx: usize) -> Result<Item<'a>> {
        if idx >= count {
            return Err(Error::IndexOutOfRange);
        }
        let mut s = *self;
        s.skip_items(idx)?;
        s.read_any()
    }

    pub fn get_u64(&self, pairs: usize, key: &str) -> Result<u64> {
        self.get_any(pairs, key)?.as_u64()
    }

    pub fn get_i64(&self, pairs: usize, key: &str) -> Result<i64> {
        self.get_any(pairs, key)?.as_i64()
    }

    pub fn get_u32(&self, pairs: usize, key: &str) -> Result<u32> {
        self.get_any(pairs, key)?.as_u32()
    }

    pub fn get_i32(&self, pairs: usize, key: &str) -> Result<i32> {
        self.get_any(pairs, key)?.as_i32()
    }

    pub fn get_bool(&self, pairs: usize, key: &str) -> Result<bool> {
        self.get_any(pairs, key)?.as_bool()
    }

    pub fn get_f64(&self, pairs: usize, key: &str) -> Result<f64> {
        self.get_any(pairs, key)?.as_f64()
    }

    pub fn get_text(&self, pairs: usize, key: &str) -> Result<Span<'a>> {
        self.get_any(pairs, key)?.as_text()
    }

    pub fn get_bytes(&self, pairs: usize, key: &str) -> Result<Span<'a>> {
        self.get_any(pairs, key)?.as_bytes()
    }

    pub fn get_array(&self, pairs: usize, key: &str) -> Result<(Stream<'a>, usize)> {
        self.get_any(pairs, key)?.as_array()
    }

    pub fn get_map(&self, pairs: usize, key: &str) -> Result<(Stream<'a>, usize)> {
        self.get_any(pairs, key)?.as_map()
    }

    pub fn idx_u64(&self, count: usize, idx: usize) -> Result<u64> {
        self.idx_any(count, idx)?.as_u64()
    }

    pub fn idx_i64(&self, count: usize, idx: usize) -> Result<i64> {
        self.idx_any(count, idx)?.as_i64()
    }

    pub fn idx_text(&self, count: usize, idx: usize) -> Result<Span<'a>> {
        self.idx_any(count, idx)?.as_text()
    }

    /// Positions a fresh cursor at the value of a text `key`, scanning to the
    /// end of the entry region. End-of-stream means the key is absent.
    pub(crate) fn seek_text_key(&self, key: &[u8]) -> Result<Stream<'a>> {
        let mut s = *self;
        loop {
            let k = match s.read_any() {
                Ok(item) => item,
                Err(Error::EndOfStream) => return Err(Error::KeyNotFound),
                Err(e) => return Err(e),
            };
            if matches!(k, Item::Text(span) if span.eq_bytes(key)) {
                return Ok(s);
            }
            s.read_any()?;
        }
    }

    /// Like [`Self::seek_text_key`] for integer keys.
    pub(crate) fn seek_int_key(&self, key: i64) -> Result<Stream<'a>> {
        let mut s = *self;
        loop {
            let k = match s.read_any() {
                Ok(item) => item,
                Err(Error::EndOfStream) => return Err(Error::KeyNotFound),
                Err(e) => return Err(e),
            };
            if matches!(k, Item::UInt(_) | Item::NInt(_)) && k.as_i64() == Ok(key) {
                return Ok(s);
            }
            s.read_any()?;
        }
    }
}
