//! Format-string pack/unpack facade
//!
//! A single pass over a printf-style format drives argument consumption:
//!
//! ```text
//! {<key>:<value>, ...}   map (indefinite on pack, both forms on unpack)
//! [<value>, ...]         array
//! <key>     .NAME        literal text key, ends at ':'
//!           s            text key taken from the arguments
//!           i            integer key taken from the arguments
//! <value>   i I q Q      32/64-bit signed/unsigned integer
//!           ?            bool
//!           s            text       b  byte string
//!           d f e        float64 / float32 / float16
//!           R  D  t      rational / decimal / datetime
//!           v            capture a sub-stream for deferred parsing (unpack)
//! ```
//!
//! On unpack a value may be marked optional with `:?`; the matching
//! [`Out::Present`] flag reports whether the key was found. Unpacking a map
//! reads the whole map first, then performs a keyed lookup per field in
//! format order; missing required keys fail with
//! [`Error::KeyNotFound`](crate::Error::KeyNotFound).

use crate::stream::{Stream, Writer};
use crate::{Error, Result, MAX_RECURSION};

/// One pack argument.
#[derive(Debug, Clone, Copy)]
pub enum Arg<'a> {
    I32(i32),
    U32(u32),
    I64(i64),
    U64(u64),
    Bool(bool),
    Text(&'a str),
    Bytes(&'a [u8]),
    F32(f32),
    F64(f64),
    /// `(num, den)`
    Rational(i64, u64),
    /// `(mant, exp)`
    Decimal(i64, i64),
    /// Seconds since the epoch.
    Datetime(f64),
}

/// One unpack destination (or key input).
pub enum Out<'v, 'a> {
    I32(&'v mut i32),
    U32(&'v mut u32),
    I64(&'v mut i64),
    U64(&'v mut u64),
    Bool(&'v mut bool),
    /// Text copied NUL-terminated; the buffer is the capacity (including the
    /// NUL), the length out includes the NUL. On overflow the length out is
    /// the required capacity.
    Text(&'v mut [u8], &'v mut usize),
    /// Bytes copied; on overflow the length out is the required size.
    Bytes(&'v mut [u8], &'v mut usize),
    F16(&'v mut f32),
    F32(&'v mut f32),
    F64(&'v mut f64),
    Rational(&'v mut i64, &'v mut u64),
    Decimal(&'v mut i64, &'v mut i64),
    Datetime(&'v mut f64),
    /// `v`: receives a stream positioned at the value.
    Capture(&'v mut Stream<'a>),
    /// `:?`: receives the key-presence flag.
    Present(&'v mut bool),
    /// `s:` key input.
    KeyText(&'v str),
    /// `i:` key input.
    KeyInt(i64),
}

struct Fmt<'f> {
    bytes: &'f [u8],
    pos: usize,
}

impl<'f> Fmt<'f> {
    fn new(fmt: &'f str) -> Self {
        Self {
            bytes: fmt.as_bytes(),
            pos: 0,
        }
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn bump(&mut self) {
        self.pos += 1;
    }

    fn next(&mut self) -> Result<u8> {
        let b = self.peek().ok_or(Error::Fmt)?;
        self.pos += 1;
        Ok(b)
    }

    fn expect(&mut self, b: u8) -> Result<()> {
        if self.next()? != b {
            return Err(Error::Fmt);
        }
        Ok(())
    }

    /// Literal key text after '.', ending at (and not consuming) ':'.
    fn literal_key(&mut self) -> Result<&'f str> {
        let start = self.pos;
        while !matches!(self.peek(), None | Some(b':')) {
            self.bump();
        }
        if self.pos == start {
            return Err(Error::Fmt);
        }
        core::str::from_utf8(&self.bytes[start..self.pos]).map_err(|_| Error::Fmt)
    }
}

struct ArgList<'s, 'a> {
    items: &'s [Arg<'a>],
    pos: usize,
}

impl<'s, 'a> ArgList<'s, 'a> {
    fn next(&mut self) -> Result<Arg<'a>> {
        let arg = *self.items.get(self.pos).ok_or(Error::Fmt)?;
        self.pos += 1;
        Ok(arg)
    }
}

struct OutList<'o, 'v, 'a> {
    items: &'o mut [Out<'v, 'a>],
    pos: usize,
}

impl<'o, 'v, 'a> OutList<'o, 'v, 'a> {
    fn next(&mut self) -> Result<&mut Out<'v, 'a>> {
        let out = self.items.get_mut(self.pos).ok_or(Error::Fmt)?;
        self.pos += 1;
        Ok(out)
    }
}

/// Encodes values per `fmt`, consuming `args` left to right.
pub fn pack(w: &mut Writer, fmt: &str, args: &[Arg]) -> Result<()> {
    let mut f = Fmt::new(fmt);
    let mut a = ArgList {
        items: args,
        pos: 0,
    };
    while f.peek().is_some() {
        pack_one(w, &mut f, &mut a, 0)?;
    }
    Ok(())
}

fn pack_one(w: &mut Writer, f: &mut Fmt, a: &mut ArgList, level: usize) -> Result<()> {
    if level > MAX_RECURSION {
        return Err(Error::Recursion);
    }
    match f.next()? {
        b'}' | b']' => Err(Error::Fmt),

        b'{' => {
            w.map_start()?;
            while !matches!(f.peek(), None | Some(b'}')) {
                match f.peek() {
                    Some(b'.') => {
                        f.bump();
                        let key = f.literal_key()?;
                        w.text(key)?;
                    }
                    Some(b's') | Some(b'i') => pack_one(w, f, a, level + 1)?,
                    _ => return Err(Error::Fmt),
                }
                f.expect(b':')?;
                pack_one(w, f, a, level + 1)?;
                if f.peek() == Some(b'}') {
                    break;
                }
                f.expect(b',')?;
            }
            w.end()?;
            f.expect(b'}')
        }

        b'[' => {
            w.array_start()?;
            while !matches!(f.peek(), None | Some(b']')) {
                pack_one(w, f, a, level + 1)?;
                if f.peek() == Some(b',') {
                    f.bump();
                }
            }
            w.end()?;
            f.expect(b']')
        }

        b'i' => match a.next()? {
            Arg::I32(v) => w.i64(v as i64),
            _ => Err(Error::Fmt),
        },
        b'I' => match a.next()? {
            Arg::U32(v) => w.u64(v as u64),
            _ => Err(Error::Fmt),
        },
        b'q' => match a.next()? {
            Arg::I64(v) => w.i64(v),
            _ => Err(Error::Fmt),
        },
        b'Q' => match a.next()? {
            Arg::U64(v) => w.u64(v),
            _ => Err(Error::Fmt),
        },
        b's' => match a.next()? {
            Arg::Text(v) => w.text(v),
            _ => Err(Error::Fmt),
        },
        b'b' => match a.next()? {
            Arg::Bytes(v) => w.bytes(v),
            _ => Err(Error::Fmt),
        },
        b'?' => match a.next()? {
            Arg::Bool(v) => w.bool(v),
            _ => Err(Error::Fmt),
        },
        b'R' => match a.next()? {
            Arg::Rational(num, den) => w.rational(num, den),
            _ => Err(Error::Fmt),
        },
        b'D' => match a.next()? {
            Arg::Decimal(mant, exp) => w.decimal(mant, exp),
            _ => Err(Error::Fmt),
        },
        b'd' => match a.next()? {
            Arg::F64(v) => w.f64(v),
            _ => Err(Error::Fmt),
        },
        b'f' => match a.next()? {
            Arg::F32(v) => w.f32(v),
            _ => Err(Error::Fmt),
        },
        b'e' => match a.next()? {
            Arg::F32(v) => w.f16(v),
            _ => Err(Error::Fmt),
        },
        b't' => match a.next()? {
            Arg::F64(v) | Arg::Datetime(v) => w.datetime(v),
            _ => Err(Error::Fmt),
        },

        _ => Err(Error::CannotConvert),
    }
}

/// Decodes values per `fmt`, filling `outs` left to right.
pub fn unpack<'a>(s: &mut Stream<'a>, fmt: &str, outs: &mut [Out<'_, 'a>]) -> Result<()> {
    let mut f = Fmt::new(fmt);
    let mut o = OutList {
        items: outs,
        pos: 0,
    };
    while f.peek().is_some() {
        unpack_one(s, &mut f, &mut o, 0)?;
    }
    Ok(())
}

fn unpack_one<'a>(
    s: &mut Stream<'a>,
    f: &mut Fmt,
    o: &mut OutList<'_, '_, 'a>,
    level: usize,
) -> Result<()> {
    if level > MAX_RECURSION {
        return Err(Error::Recursion);
    }
    match f.next()? {
        b'}' | b']' => Err(Error::Fmt),

        b'{' => {
            let (entries, _pairs) = s.map()?;
            while f.peek().is_some() {
                let found = match f.peek() {
                    Some(b'.') => {
                        f.bump();
                        let key = f.literal_key()?;
                        entries.seek_text_key(key.as_bytes())
                    }
                    Some(b's') => {
                        f.bump();
                        match o.next()? {
                            Out::KeyText(key) => entries.seek_text_key(key.as_bytes()),
                            _ => return Err(Error::Fmt),
                        }
                    }
                    Some(b'i') => {
                        f.bump();
                        match o.next()? {
                            Out::KeyInt(key) => entries.seek_int_key(*key),
                            _ => return Err(Error::Fmt),
                        }
                    }
                    _ => return Err(Error::Fmt),
                };
                if let Err(e) = &found {
                    if *e != Error::KeyNotFound {
                        return Err(*e);
                    }
                }

                f.expect(b':')?;
                let mut required = true;
                if f.peek() == Some(b'?') {
                    f.bump();
                    required = false;
                    match o.next()? {
                        Out::Present(flag) => **flag = found.is_ok(),
                        _ => return Err(Error::Fmt),
                    }
                }

                match found {
                    Ok(mut value) => unpack_one(&mut value, f, o, level + 1)?,
                    Err(_) if required => return Err(Error::KeyNotFound),
                    Err(_) => skip_fmt(f, o)?,
                }

                if f.peek() == Some(b'}') {
                    break;
                }
                f.expect(b',')?;
            }
            f.expect(b'}')
        }

        b'[' => {
            let (mut elements, mut left) = s.array()?;
            while !matches!(f.peek(), None | Some(b']')) {
                if left == 0 {
                    return Err(Error::ArrayTooLarge);
                }
                left -= 1;
                unpack_one(&mut elements, f, o, level + 1)?;
                if f.peek() == Some(b',') {
                    f.bump();
                }
            }
            f.expect(b']')
        }

        b'i' => match o.next()? {
            Out::I32(v) => {
                **v = s.i32()?;
                Ok(())
            }
            _ => Err(Error::Fmt),
        },
        b'I' => match o.next()? {
            Out::U32(v) => {
                **v = s.u32()?;
                Ok(())
            }
            _ => Err(Error::Fmt),
        },
        b'q' => match o.next()? {
            Out::I64(v) => {
                **v = s.i64()?;
                Ok(())
            }
            _ => Err(Error::Fmt),
        },
        b'Q' => match o.next()? {
            Out::U64(v) => {
                **v = s.u64()?;
                Ok(())
            }
            _ => Err(Error::Fmt),
        },
        b'?' => match o.next()? {
            Out::Bool(v) => {
                **v = s.bool()?;
                Ok(())
            }
            _ => Err(Error::Fmt),
        },
        b's' => match o.next()? {
            Out::Text(buf, len_out) => {
                let span = s.text()?;
                let text_len = span.len();
                let usable = buf.len().saturating_sub(1);
                if text_len > usable {
                    **len_out = text_len + 1;
                    return Err(Error::BufferTooSmall);
                }
                buf[..text_len + 1].fill(0);
                span.copy_to(&mut buf[..text_len])?;
                **len_out = text_len + 1;
                Ok(())
            }
            _ => Err(Error::Fmt),
        },
        b'b' => match o.next()? {
            Out::Bytes(buf, len_out) => {
                let span = s.bytes()?;
                if span.len() > buf.len() {
                    **len_out = span.len();
                    return Err(Error::BufferTooSmall);
                }
                span.copy_to(&mut buf[..span.len()])?;
                **len_out = span.len();
                Ok(())
            }
            _ => Err(Error::Fmt),
        },
        b'R' => match o.next()? {
            Out::Rational(num, den) => {
                let (n, d) = s.rational()?;
                **num = n;
                **den = d;
                Ok(())
            }
            _ => Err(Error::Fmt),
        },
        b'D' => match o.next()? {
            Out::Decimal(mant, exp) => {
                let (m, e) = s.decimal()?;
                **mant = m;
                **exp = e;
                Ok(())
            }
            _ => Err(Error::Fmt),
        },
        b'd' => match o.next()? {
            Out::F64(v) => {
                **v = s.f64()?;
                Ok(())
            }
            _ => Err(Error::Fmt),
        },
        b'f' => match o.next()? {
            Out::F32(v) => {
                **v = s.f32()?;
                Ok(())
            }
            _ => Err(Error::Fmt),
        },
        b'e' => match o.next()? {
            Out::F16(v) => {
                **v = s.f16()?;
                Ok(())
            }
            _ => Err(Error::Fmt),
        },
        b't' => match o.next()? {
            Out::Datetime(v) => {
                **v = s.datetime()?;
                Ok(())
            }
            _ => Err(Error::Fmt),
        },
        b'v' => match o.next()? {
            Out::Capture(slot) => {
                **slot = *s;
                s.read_any()?;
                Ok(())
            }
            _ => Err(Error::Fmt),
        },

        _ => Err(Error::Fmt),
    }
}

/// Consumes one value's worth of format and outs without touching the
/// stream, for optional fields whose key is absent.
fn skip_fmt(f: &mut Fmt, o: &mut OutList) -> Result<()> {
    match f.next()? {
        b'}' | b']' => Err(Error::Fmt),

        b'{' => {
            while !matches!(f.peek(), None | Some(b'}')) {
                match f.peek() {
                    Some(b'.') => {
                        f.bump();
                        f.literal_key()?;
                    }
                    Some(b's') | Some(b'i') => {
                        f.bump();
                        o.next()?;
                    }
                    _ => return Err(Error::Fmt),
                }
                f.expect(b':')?;
                if f.peek() == Some(b'?') {
                    f.bump();
                    o.next()?;
                }
                skip_fmt(f, o)?;
                if f.peek() == Some(b'}') {
                    break;
                }
                f.expect(b',')?;
            }
            f.expect(b'}')
        }

        b'[' => {
            while !matches!(f.peek(), None | Some(b']')) {
                skip_fmt(f, o)?;
                if f.peek() == Some(b',') {
                    f.bump();
                }
            }
            f.expect(b']')
        }

        b'i' | b'I' | b'q' | b'Q' | b'?' | b's' | b'b' | b'R' | b'D' | b'd' | b'f' | b'e'
        | b't' | b'v' => {
            o.next()?;
            Ok(())
        }

        _ => Err(Error::Fmt),
    }
}
