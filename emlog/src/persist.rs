//! Crash persistence: the pre-reset log tail survives into a saved region
//!
//! The TX ring and the application fingerprint live in a [`Retained`] block
//! the integrator places in memory the runtime does not initialise at boot
//! (a `.uninit`-style section). Because the ring stores indices into inline
//! storage, nothing in it is address-dependent; the fingerprint equality is
//! the sole judge of whether the contents belong to this firmware build.
//!
//! [`pre_init`] must run before any emitter call: it snapshots a valid
//! retained ring into the saved region, then hands the (reset) ring to the
//! transport.

use crate::core::{config, AppHash};
use crate::ring::RingBuffer;

/// Reset-surviving block: the TX ring and the hash it was written under.
///
/// Place a `static` of this in a no-init section and pass it to
/// [`pre_init`] exactly once, before any record is emitted.
pub struct Retained {
    ring: RingBuffer<{ config::TX_BUF_SIZE }>,
    app_hash: AppHash,
}

impl Retained {
    pub const fn new() -> Self {
        Self {
            ring: RingBuffer::new(),
            app_hash: [0; config::APP_HASH_SIZE],
        }
    }

    /// The contents are trusted when the indices are structurally sound and
    /// the code that wrote them is byte-identical to the code reading them.
    fn valid(&self, current_hash: &AppHash) -> bool {
        self.ring.indices_valid() && self.app_hash == *current_hash
    }
}

impl Default for Retained {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of the pre-reset log, in ordinarily initialised memory.
pub struct SavedLog {
    buf: [u8; config::TX_BUF_SIZE],
    len: usize,
    app_hash: AppHash,
}

impl SavedLog {
    pub const fn new() -> Self {
        Self {
            buf: [0; config::TX_BUF_SIZE],
            len: 0,
            app_hash: [0; config::APP_HASH_SIZE],
        }
    }

    /// The saved byte stream. Empty when the last reset had nothing valid.
    ///
    /// When the ring was valid but fully drained at reset time, the whole
    /// buffer is dumped instead and the first byte of this span may be
    /// garbage; consumers resynchronise on the first sentinel anyway.
    pub fn log(&self) -> &[u8] {
        &self.buf[..self.len]
    }

    /// The fingerprint of the build that wrote [`Self::log`].
    pub fn app_hash(&self) -> &AppHash {
        &self.app_hash
    }
}

impl Default for SavedLog {
    fn default() -> Self {
        Self::new()
    }
}

/// Boot-time recovery. Copies a valid retained ring into `saved`, then
/// resets the ring, stamps the current hash and returns the ring for
/// [`Transport::new`](crate::transport::Transport::new).
pub fn pre_init(
    retained: &'static mut Retained,
    current_hash: &AppHash,
    saved: &mut SavedLog,
) -> &'static mut RingBuffer<{ config::TX_BUF_SIZE }> {
    saved.len = 0;
    if retained.valid(current_hash) {
        snapshot(&mut retained.ring, saved, &retained.app_hash);
    }

    retained.app_hash = *current_hash;
    retained.ring.clear();
    &mut retained.ring
}

fn snapshot(
    ring: &mut RingBuffer<{ config::TX_BUF_SIZE }>,
    saved: &mut SavedLog,
    hash: &AppHash,
) {
    let mut avail = ring.read_avail();
    // An empty-but-valid ring is a clean reboot: force a dump of the whole
    // buffer by stepping over one byte. The head byte of the snapshot is
    // sacrificed for a full history.
    if avail == 0 {
        ring.skip(1);
        avail = ring.read_avail();
    }
    let total = avail.min(saved.buf.len());

    // Wrapped content takes two peek rounds.
    let mut off = 0;
    for _ in 0..2 {
        let chunk = ring.peek();
        let take = chunk.len().min(total - off);
        saved.buf[off..off + take].copy_from_slice(&chunk[..take]);
        ring.skip(take);
        off += take;
    }
    saved.len = off;
    saved.app_hash = *hash;
}
