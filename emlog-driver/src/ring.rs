//! Fixed-capacity byte queue shared between the stack and link drivers
//!
//! The queue keeps read/write indices into inline storage: no pointers, so a
//! static instance placed in no-init memory stays structurally valid across a
//! soft reset. One slot is always left unused, which makes `read == write`
//! unambiguously mean empty.
//!
//! No operation reports an error. Preconditions are the caller's
//! responsibility, including the overflow policy on [`RingBuffer::write`]:
//! producers that cannot lose data must check [`RingBuffer::write_avail`]
//! first and drop, wait or flush on their own terms.
//!
//! [`RingBuffer::peek`] and [`RingBuffer::space`] expose contiguous regions
//! that never wrap, for consumers (DMA engines in particular) that require
//! linear buffers. Draining everything queued can take two peek/skip rounds.

/// Byte ring with `N`-byte storage and `N - 1` usable capacity.
pub struct RingBuffer<const N: usize> {
    buf: [u8; N],
    read: usize,
    write: usize,
}

impl<const N: usize> RingBuffer<N> {
    pub const fn new() -> Self {
        Self {
            buf: [0; N],
            read: 0,
            write: 0,
        }
    }

    pub fn reset(&mut self) {
        self.read = 0;
        self.write = 0;
    }

    /// Zeroes indices and storage, for bringing up a region whose previous
    /// contents are untrusted.
    pub fn clear(&mut self) {
        self.buf.fill(0);
        self.reset();
    }

    /// Total bytes queued for reading.
    pub fn read_avail(&self) -> usize {
        if self.read <= self.write {
            self.write - self.read
        } else {
            N - self.read + self.write
        }
    }

    /// Copies `out.len()` bytes out, advancing the read index.
    ///
    /// The caller guarantees `out.len() <= read_avail()`.
    pub fn read(&mut self, out: &mut [u8]) {
        let n = out.len();
        let n1 = n.min(N - self.read);
        out[..n1].copy_from_slice(&self.buf[self.read..self.read + n1]);
        if n1 < n {
            out[n1..].copy_from_slice(&self.buf[..n - n1]);
        }
        self.read = Self::wrap(self.read + n);
    }

    /// Contiguous queued bytes starting at the read index. Never wraps; may
    /// be shorter than [`Self::read_avail`].
    pub fn peek(&self) -> &[u8] {
        let n = if self.read <= self.write {
            self.write - self.read
        } else {
            N - self.read
        };
        &self.buf[self.read..self.read + n]
    }

    /// Advances the read index by `n` (wrapping), consuming a peek.
    ///
    /// The caller guarantees `n <= read_avail()`.
    pub fn skip(&mut self, n: usize) {
        self.read = Self::wrap(self.read + n);
    }

    /// Free space, counting the reserved slot out.
    pub fn write_avail(&self) -> usize {
        (if self.read > self.write {
            self.read - self.write
        } else {
            N - self.write + self.read
        }) - 1
    }

    /// Appends `src`, advancing the write index.
    ///
    /// Does not check [`Self::write_avail`]: on overflow the write index runs
    /// past the read index and unread data is silently overwritten. The
    /// overflow policy belongs to the caller.
    pub fn write(&mut self, src: &[u8]) {
        let n = src.len();
        let n1 = n.min(N - self.write);
        self.buf[self.write..self.write + n1].copy_from_slice(&src[..n1]);
        if n1 < n {
            self.buf[..n - n1].copy_from_slice(&src[n1..]);
        }
        self.write = Self::wrap(self.write + n);
    }

    /// Contiguous free bytes starting at the write index. Never wraps; at
    /// most [`Self::write_avail`] because of the reserved slot.
    pub fn space(&mut self) -> &mut [u8] {
        let n = self.space_avail();
        &mut self.buf[self.write..self.write + n]
    }

    fn space_avail(&self) -> usize {
        (if self.read > self.write {
            self.read - self.write
        } else {
            N - self.write + if self.read > 0 { 1 } else { 0 }
        }) - 1
    }

    /// Advances the write index after a direct write into [`Self::space`].
    pub fn commit(&mut self, n: usize) {
        self.write = Self::wrap(self.write + n);
    }

    const fn wrap(idx: usize) -> usize {
        if idx >= N {
            idx - N
        } else {
            idx
        }
    }

    /// Structural validity of indices, for no-init memory checks after reset.
    pub fn indices_valid(&self) -> bool {
        self.read < N && self.write < N
    }
}

impl<const N: usize> Default for RingBuffer<N> {
    fn default() -> Self {
        Self::new()
    }
}
