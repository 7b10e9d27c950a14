//! Consistent-overhead byte stuffing
//!
//! Frames on the wire are delimited by [`SENTINEL`] bytes; stuffing
//! guarantees the sentinel never occurs inside a frame body. Each group of
//! non-sentinel bytes is prefixed with a length byte giving the distance to
//! the next sentinel-or-end. The encoder drops the final group when the
//! payload ends exactly on a 254-byte run, and the decoder restores it, so
//! maximal runs cost no trailing byte.

/// Frame delimiter; never present inside a stuffed body.
pub const SENTINEL: u8 = 0x00;

/// Worst-case stuffed size for an `n`-byte payload.
pub const fn max_encoded_len(n: usize) -> usize {
    n + n.div_ceil(254) + 1
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// A length byte of zero inside the stuffed body.
    UnexpectedSentinel,
    /// A length byte pointing past the end of the body.
    Truncated,
}

/// Stuffs `src` into `dst`, returning the stuffed length.
///
/// `dst` must hold at least [`max_encoded_len`]`(src.len())` bytes.
pub fn encode(src: &[u8], dst: &mut [u8]) -> usize {
    let mut out = 0;
    let mut start = 0;
    loop {
        let rest = &src[start..];
        // Distance to the next sentinel, or to the virtual one at the end.
        let i = rest
            .iter()
            .position(|&b| b == SENTINEL)
            .unwrap_or(rest.len());
        if i >= 254 {
            dst[out] = 0xff;
            dst[out + 1..out + 255].copy_from_slice(&rest[..254]);
            out += 255;
            start += 254;
            if start == src.len() {
                // Only the virtual sentinel remains; the receiver infers it.
                break;
            }
        } else {
            dst[out] = (i + 1) as u8;
            dst[out + 1..out + 1 + i].copy_from_slice(&rest[..i]);
            out += i + 1;
            start += i + 1;
            if start > src.len() {
                break;
            }
        }
    }
    out
}

/// Unstuffs a frame body in place, returning the payload length.
///
/// The payload is always shorter than the body, so the rewrite never
/// overtakes the scan. An empty body yields an empty payload.
pub fn decode_in_place(buf: &mut [u8]) -> Result<usize, Error> {
    let len = buf.len();
    let mut rd = 0;
    let mut wr = 0;
    while rd < len {
        let code = buf[rd] as usize;
        if code == 0 {
            return Err(Error::UnexpectedSentinel);
        }
        rd += 1;
        let n = code - 1;
        if rd + n > len {
            return Err(Error::Truncated);
        }
        buf.copy_within(rd..rd + n, wr);
        rd += n;
        wr += n;
        if rd < len && code < 0xff {
            buf[wr] = SENTINEL;
            wr += 1;
        }
    }
    Ok(wr)
}
