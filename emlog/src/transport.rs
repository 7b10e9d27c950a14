//! Port multiplexer and TX-side link glue
//!
//! The transport owns the transmit ring. Producers append framed packets
//! under a short critical section and the attached link driver drains them;
//! every append kicks [`LinkTx::schedule`], which must tolerate being called
//! while a transfer is already running.
//!
//! Appends do not wait for room: an overwritten tail costs the host a
//! resynchronisation on the next sentinel, which is the documented
//! best-effort delivery model. Producers that must not lose data check
//! [`Transport::tx_avail`] and flush-wait on their own terms.

use core::cell::{Cell, RefCell};
use core::sync::atomic::{AtomicBool, Ordering};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;

use crate::core::{config, AppHash, Port};
use crate::link::{LinkTx, TxQueue};
use crate::ring::RingBuffer;
use emlog_driver::frame::{self, FrameHeader};

/// What the device answers the host's discovery with.
#[derive(Clone, Copy)]
pub struct Identity {
    pub app_hash: &'static AppHash,
    pub board: &'static str,
}

const BODY_BUF: usize = config::MAX_PACKET_SIZE + 1;
const FRAME_BUF: usize = frame::max_framed_len(BODY_BUF);

/// Framing scratch, kept inside the transport object rather than on the
/// emitting thread's stack.
struct Scratch {
    body: [u8; BODY_BUF],
    framed: [u8; FRAME_BUF],
}

pub struct Transport {
    queue: TxQueue<{ config::TX_BUF_SIZE }>,
    link: Mutex<CriticalSectionRawMutex, Cell<Option<&'static dyn LinkTx>>>,
    scratch: Mutex<CriticalSectionRawMutex, RefCell<Scratch>>,
    tx_enabled: AtomicBool,
    identity: Identity,
}

impl Transport {
    /// Starts suspended and detached; records buffer in the ring until a
    /// link is attached.
    pub fn new(
        ring: &'static mut RingBuffer<{ config::TX_BUF_SIZE }>,
        identity: Identity,
    ) -> Self {
        Self {
            queue: TxQueue::new(ring),
            link: Mutex::new(Cell::new(None)),
            scratch: Mutex::new(RefCell::new(Scratch {
                body: [0; BODY_BUF],
                framed: [0; FRAME_BUF],
            })),
            tx_enabled: AtomicBool::new(false),
            identity,
        }
    }

    /// The shared TX ring handle to wire into the link driver.
    pub fn queue(&self) -> &TxQueue<{ config::TX_BUF_SIZE }> {
        &self.queue
    }

    pub fn identity(&self) -> Identity {
        self.identity
    }

    /// Attaches the link and resumes transmission (which also announces the
    /// application hash).
    pub fn attach(&'static self, link: &'static dyn LinkTx) {
        self.link.lock(|cell| cell.set(Some(link)));
        self.resume();
    }

    /// Wraps `payload` for `port` and queues it. Payloads above the packet
    /// bound are a fatal integration error.
    pub fn tx(&self, port: Port, payload: &[u8]) {
        if payload.len() > config::MAX_PACKET_SIZE {
            self.fatal_flush();
            panic!("tx payload over packet bound");
        }
        self.scratch.lock(|cell| {
            let scratch = &mut *cell.borrow_mut();
            scratch.body[0] = FrameHeader::data(port).into_u8();
            scratch.body[1..1 + payload.len()].copy_from_slice(payload);
            let n = frame::encode_frame(&scratch.body[..1 + payload.len()], &mut scratch.framed);
            self.queue.write(&scratch.framed[..n]);
        });
        self.schedule();
    }

    /// Queues an already-framed record image.
    pub(crate) fn tx_framed(&self, framed: &[u8]) {
        self.queue.write(framed);
        self.schedule();
    }

    /// Free TX ring bytes, for producers with a no-loss policy.
    pub fn tx_avail(&self) -> usize {
        self.queue.write_avail()
    }

    /// Gates link scheduling off. Queued and newly appended bytes stay in
    /// the ring.
    pub fn suspend(&self) {
        self.tx_enabled.store(false, Ordering::Relaxed);
    }

    /// Resumes link scheduling and emits the application-hash beacon so the
    /// host can match its symbol database before decoding the backlog.
    pub fn resume(&self) {
        self.tx_enabled.store(true, Ordering::Relaxed);
        self.tx(Port::APP_HASH, self.identity.app_hash);
    }

    /// Sends the device identification map.
    pub fn send_device_info(&self) {
        let mut payload = [0u8; 160];
        match crate::device_info::encode(&mut payload, self.identity.app_hash, self.identity.board)
        {
            Ok(n) => self.tx(Port::DEVICE_INFO, &payload[..n]),
            Err(_) => {
                self.fatal_flush();
                panic!("device info encode failed");
            }
        }
    }

    fn schedule(&self) {
        if !self.tx_enabled.load(Ordering::Relaxed) {
            return;
        }
        if let Some(link) = self.link.lock(|cell| cell.get()) {
            link.schedule();
        }
    }

    /// Synchronously drains the queue on the fatal path.
    pub fn fatal_flush(&self) {
        if let Some(link) = self.link.lock(|cell| cell.get()) {
            link.panic_flush();
        }
    }
}
