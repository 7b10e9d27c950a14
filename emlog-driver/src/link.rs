//! Contract between a byte-stream link driver and the Emlog stack
//!
//! The stack owns a [`TxQueue`] and hands the driver a reference at attach
//! time, the way a console driver is handed its transmit queue. Producers
//! append under a short critical section; the driver is the single consumer
//! and drains linear chunks suitable for DMA.
//!
//! The receive side stays inside the driver. The server worker pulls through
//! [`LinkRx`], and the driver also owns the event wait, timeout included,
//! which keeps the stack free of any timer dependency.

use core::cell::RefCell;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;

use crate::ring::RingBuffer;
use crate::time::Duration;

/// Outcome of [`LinkRx::wait`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RxWait {
    /// Receive activity was signalled. Stale signals are possible: a prior
    /// pull may already have drained the bytes, so callers re-check `avail`.
    Activity,
    TimedOut,
}

/// Transmit half of a link, driven by the stack.
pub trait LinkTx: Sync {
    /// Kicks transmission of queued bytes.
    ///
    /// Must be idempotent and non-blocking: when a transfer is already
    /// running, return immediately; fresh bytes are picked up as the current
    /// chunk drains.
    fn schedule(&self);

    /// Switches to panic mode and synchronously drains the TX queue.
    /// Called on the fatal path only; never returns an error.
    fn panic_flush(&self);
}

/// Receive half of a link, pulled by the server worker.
pub trait LinkRx {
    fn start(&mut self);
    fn stop(&mut self);

    /// Bytes queued for reading.
    fn avail(&self) -> usize;

    /// Contiguous view of queued bytes. May be shorter than [`Self::avail`];
    /// draining everything can take two peek/skip rounds.
    fn peek(&self) -> &[u8];

    /// Consumes `n` peeked bytes.
    fn skip(&mut self, n: usize);

    /// Waits for receive activity or `timeout`, whichever first.
    async fn wait(&mut self, timeout: Duration) -> RxWait;
}

/// Shared transmit ring: multi-producer behind a critical section, single
/// consumer (the link driver).
///
/// The critical section is the mutual exclusion the producers rely on; it is
/// held only for the duration of a copy. The consumer side takes the same
/// lock, so `peek_with` closures must stay short.
pub struct TxQueue<const N: usize> {
    ring: Mutex<CriticalSectionRawMutex, RefCell<&'static mut RingBuffer<N>>>,
}

impl<const N: usize> TxQueue<N> {
    pub fn new(ring: &'static mut RingBuffer<N>) -> Self {
        Self {
            ring: Mutex::new(RefCell::new(ring)),
        }
    }

    /// Appends framed bytes. Unchecked like [`RingBuffer::write`]: the
    /// overflow policy is the producer's, and an overwritten tail is
    /// recovered on the host by resynchronising on the next sentinel.
    pub fn write(&self, bytes: &[u8]) {
        self.ring.lock(|ring| ring.borrow_mut().write(bytes));
    }

    pub fn write_avail(&self) -> usize {
        self.ring.lock(|ring| ring.borrow().write_avail())
    }

    pub fn read_avail(&self) -> usize {
        self.ring.lock(|ring| ring.borrow().read_avail())
    }

    pub fn is_empty(&self) -> bool {
        self.read_avail() == 0
    }

    /// Runs `f` over the contiguous queued chunk. Pair with [`Self::skip`]
    /// once the chunk (or part of it) is on the wire.
    pub fn peek_with<R>(&self, f: impl FnOnce(&[u8]) -> R) -> R {
        self.ring.lock(|ring| f(ring.borrow().peek()))
    }

    /// Consumes `n` bytes previously observed through [`Self::peek_with`].
    pub fn skip(&self, n: usize) {
        self.ring.lock(|ring| ring.borrow_mut().skip(n));
    }

    /// Copies up to `out.len()` queued bytes into `out`, consuming them.
    pub fn pop_into(&self, out: &mut [u8]) -> usize {
        self.ring.lock(|ring| {
            let mut ring = ring.borrow_mut();
            let n = ring.read_avail().min(out.len());
            ring.read(&mut out[..n]);
            n
        })
    }
}

#[cfg(test)]
mod tests {
    extern crate std;
    use std::boxed::Box;

    use super::*;

    fn make_queue() -> TxQueue<64> {
        TxQueue::new(Box::leak(Box::new(RingBuffer::new())))
    }

    #[test]
    fn test_write_then_drain() {
        let q = make_queue();
        q.write(&[1, 2, 3]);
        q.write(&[4, 5]);
        assert_eq!(q.read_avail(), 5);

        let n = q.peek_with(|chunk| {
            assert_eq!(chunk, &[1, 2, 3, 4, 5]);
            chunk.len()
        });
        q.skip(n);
        assert!(q.is_empty());
    }

    #[test]
    fn test_pop_into() {
        let q = make_queue();
        q.write(&[9, 8, 7, 6]);
        let mut out = [0u8; 3];
        assert_eq!(q.pop_into(&mut out), 3);
        assert_eq!(out, [9, 8, 7]);
        assert_eq!(q.read_avail(), 1);
    }
}
