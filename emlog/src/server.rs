//! RX-side server: frame reassembly, port dispatch, blocking receive
//!
//! One worker task pulls bytes from the link, recovers frame boundaries on
//! the sentinel, unstuffs each body and routes it: to the blocking-receive
//! slot if one is armed for the port, otherwise to the registered handler.
//! Every transport error is recoverable by resynchronising on the next
//! sentinel.
//!
//! When no bytes arrive for the idle window the worker enters a paused
//! phase: TX scheduling is suspended and already-queued RX bytes are
//! dropped, so a host that reconnects later does not see stale buffered
//! output mixed with fresh output. The first byte ends the pause.

use core::cell::{Cell, RefCell};

use embassy_futures::select::{select, Either};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::signal::Signal;
use embassy_time::Timer;

use crate::cobs;
use crate::core::{config, FrameKind, Port};
use crate::link::{LinkRx, RxWait};
use crate::time::{Duration, Instant};
use crate::transport::Transport;
use emlog_driver::frame::FrameHeader;

/// Idle window: feeds the watchdog and triggers pause/resume.
const IDLE_TIMEOUT: Duration = Duration::from_millis(1000);
/// Mid-frame gap tolerated before giving up on the frame.
const FRAME_TIMEOUT: Duration = Duration::from_millis(100);
/// Blocking-receive wakeup period while waiting, to keep feeding the
/// watchdog.
const WATCHDOG_PERIOD: Duration = Duration::from_millis(1000);

/// Per-port frame consumer. Handlers run on the server worker and must not
/// block indefinitely.
pub trait PortHandler: Sync {
    fn on_frame(&self, payload: &[u8]);
}

/// Watchdog feed hook; the default integration has none.
pub trait Watchdog: Sync {
    fn feed(&self);
}

struct RxSlot {
    /// Armed port; `None` means idle.
    port: Option<Port>,
    /// Caller capacity recorded at claim time.
    cap: usize,
    /// Bytes actually staged (payload cut to capacity).
    copied: usize,
    /// Full payload length, which the caller compares against its capacity
    /// to detect truncation.
    len: usize,
    done: bool,
    truncated: bool,
    buf: [u8; config::MAX_PACKET_SIZE],
}

/// Shared server state: the port table and the blocking-receive slot.
///
/// Lives in a static; the worker and any firmware thread reach it through
/// short critical sections.
pub struct ServerState {
    ports: Mutex<
        CriticalSectionRawMutex,
        RefCell<[Option<&'static dyn PortHandler>; config::IN_PORT_COUNT]>,
    >,
    rx_slot: Mutex<CriticalSectionRawMutex, RefCell<RxSlot>>,
    rx_event: Signal<CriticalSectionRawMutex, ()>,
    watchdog: Mutex<CriticalSectionRawMutex, Cell<Option<&'static dyn Watchdog>>>,
}

impl ServerState {
    pub const fn new() -> Self {
        Self {
            ports: Mutex::new(RefCell::new([None; config::IN_PORT_COUNT])),
            rx_slot: Mutex::new(RefCell::new(RxSlot {
                port: None,
                cap: 0,
                copied: 0,
                len: 0,
                done: false,
                truncated: false,
                buf: [0; config::MAX_PACKET_SIZE],
            })),
            rx_event: Signal::new(),
            watchdog: Mutex::new(Cell::new(None)),
        }
    }

    /// Sets the per-port handler. Registration is expected at startup; the
    /// table is read by the worker without further coordination.
    pub fn register(&self, port: Port, handler: &'static dyn PortHandler) {
        if usize::from(port) >= config::IN_PORT_COUNT {
            crate::log_fatal!("port out of range: %d", u8::from(port));
        }
        self.ports
            .lock(|table| table.borrow_mut()[usize::from(port)] = Some(handler));
    }

    pub fn unregister(&self, port: Port) {
        if usize::from(port) >= config::IN_PORT_COUNT {
            return;
        }
        self.ports
            .lock(|table| table.borrow_mut()[usize::from(port)] = None);
    }

    pub fn set_watchdog(&self, watchdog: &'static dyn Watchdog) {
        self.watchdog.lock(|cell| cell.set(Some(watchdog)));
    }

    fn feed_watchdog(&self) {
        if let Some(w) = self.watchdog.lock(|cell| cell.get()) {
            w.feed();
        }
    }

    fn handler(&self, port: Port) -> Option<&'static dyn PortHandler> {
        self.ports.lock(|table| table.borrow()[usize::from(port)])
    }

    /// Blocks the calling task until a frame for `port` arrives; returns the
    /// full payload length (compare with `out.len()` to detect truncation).
    ///
    /// At most one receive may be armed at a time; a second concurrent call
    /// is fatal.
    pub async fn rx(&self, port: Port, out: &mut [u8]) -> usize {
        self.claim(port, out.len());
        loop {
            if let Some(n) = self.try_collect(out) {
                return n;
            }
            match select(self.rx_event.wait(), Timer::after(WATCHDOG_PERIOD)).await {
                Either::First(()) | Either::Second(()) => self.feed_watchdog(),
            }
        }
    }

    /// Like [`Self::rx`] with a deadline; `None` when it elapses first.
    pub async fn rx_until(
        &self,
        port: Port,
        out: &mut [u8],
        deadline: Instant,
    ) -> Option<usize> {
        self.claim(port, out.len());
        loop {
            if let Some(n) = self.try_collect(out) {
                return Some(n);
            }
            let now = Instant::now();
            if now >= deadline {
                return self.abandon(out);
            }
            let slice = (deadline - now).min(WATCHDOG_PERIOD);
            match select(self.rx_event.wait(), Timer::after(slice)).await {
                Either::First(()) | Either::Second(()) => self.feed_watchdog(),
            }
        }
    }

    fn claim(&self, port: Port, cap: usize) {
        let clash = self.rx_slot.lock(|slot| {
            let mut slot = slot.borrow_mut();
            if slot.port.is_some() {
                return true;
            }
            slot.port = Some(port);
            slot.cap = cap;
            slot.copied = 0;
            slot.len = 0;
            slot.done = false;
            slot.truncated = false;
            false
        });
        if clash {
            crate::log_fatal!("blocking rx armed twice");
        }
    }

    fn try_collect(&self, out: &mut [u8]) -> Option<usize> {
        self.rx_slot.lock(|slot| {
            let mut slot = slot.borrow_mut();
            if !slot.done {
                return None;
            }
            let n = slot.copied.min(out.len());
            out[..n].copy_from_slice(&slot.buf[..n]);
            let len = slot.len;
            slot.port = None;
            slot.done = false;
            Some(len)
        })
    }

    /// Disarms the slot after a deadline, unless delivery won the race.
    fn abandon(&self, out: &mut [u8]) -> Option<usize> {
        if let Some(n) = self.try_collect(out) {
            return Some(n);
        }
        self.rx_slot.lock(|slot| slot.borrow_mut().port = None);
        None
    }

    /// Worker side: stages `payload` for an armed receive. True when the
    /// frame was consumed; `truncated` reported separately so the caller
    /// can warn outside the critical section.
    fn try_deliver(&self, port: Port, payload: &[u8]) -> (bool, bool) {
        let staged = self.rx_slot.lock(|slot| {
            let mut slot = slot.borrow_mut();
            match slot.port {
                Some(armed) if armed == port && !slot.done => {
                    let n = payload.len().min(slot.cap).min(slot.buf.len());
                    slot.buf[..n].copy_from_slice(&payload[..n]);
                    slot.copied = n;
                    slot.len = payload.len();
                    slot.truncated = payload.len() > slot.cap;
                    slot.done = true;
                    Some(slot.truncated)
                }
                _ => None,
            }
        });
        match staged {
            Some(truncated) => {
                self.rx_event.signal(());
                (true, truncated)
            }
            None => (false, false),
        }
    }
}

impl Default for ServerState {
    fn default() -> Self {
        Self::new()
    }
}

const ASSEMBLY_SIZE: usize = cobs::max_encoded_len(config::MAX_PACKET_SIZE + 1) + 3;

struct Assembly {
    buf: [u8; ASSEMBLY_SIZE],
    len: usize,
    overrun: bool,
}

impl Assembly {
    fn reset(&mut self) {
        self.len = 0;
        self.overrun = false;
    }

    fn push(&mut self, bytes: &[u8]) {
        let room = ASSEMBLY_SIZE - self.len;
        if bytes.len() > room {
            self.overrun = true;
        }
        let n = bytes.len().min(room);
        self.buf[self.len..self.len + n].copy_from_slice(&bytes[..n]);
        self.len += n;
    }
}

/// The RX worker. Run [`Server::run`] on a dedicated task.
pub struct Server<R: LinkRx> {
    link: R,
    state: &'static ServerState,
    transport: &'static Transport,
    assembly: Assembly,
    host_seen: bool,
}

impl<R: LinkRx> Server<R> {
    pub fn new(link: R, state: &'static ServerState, transport: &'static Transport) -> Self {
        Self {
            link,
            state,
            transport,
            assembly: Assembly {
                buf: [0; ASSEMBLY_SIZE],
                len: 0,
                overrun: false,
            },
            host_seen: false,
        }
    }

    pub async fn run(&mut self) -> ! {
        crate::log_info!("log server starting");
        loop {
            self.pause().await;
            while self.process_frame().await {}
        }
    }

    /// Idle phase: suspend TX, drop stale RX bytes, wait for the next byte,
    /// then resume (announcing the application hash).
    async fn pause(&mut self) {
        self.transport.suspend();
        self.host_seen = false;
        self.link.stop();

        let n = self.link.avail();
        self.link.skip(n);
        let n = self.link.avail();
        self.link.skip(n);

        while self.link.avail() == 0 {
            let wait = self.link.wait(IDLE_TIMEOUT).await;
            self.state.feed_watchdog();
            if wait == RxWait::Activity {
                break;
            }
        }

        self.link.start();
        self.transport.resume();
    }

    /// Reassembles and routes one frame. False on an idle timeout, which
    /// sends the worker back to the paused phase.
    async fn process_frame(&mut self) -> bool {
        // Seek start of frame: drop leading sentinels.
        loop {
            if self.link.avail() == 0 {
                let wait = self.link.wait(IDLE_TIMEOUT).await;
                self.state.feed_watchdog();
                if wait == RxWait::TimedOut {
                    return false;
                }
                // Stale events happen when a prior round already drained
                // the bytes; just look again.
                continue;
            }
            if self.link.peek()[0] != cobs::SENTINEL {
                break;
            }
            self.link.skip(1);
        }

        // Assemble the stuffed body up to the closing sentinel.
        self.assembly.reset();
        loop {
            if self.link.avail() == 0 {
                let wait = self.link.wait(FRAME_TIMEOUT).await;
                self.state.feed_watchdog();
                if wait == RxWait::TimedOut {
                    return false;
                }
                continue;
            }
            let chunk = self.link.peek();
            match chunk.iter().position(|&b| b == cobs::SENTINEL) {
                Some(end) => {
                    self.assembly.push(&chunk[..end]);
                    // Leave the terminator; the next seek consumes it.
                    self.link.skip(end);
                    self.dispatch();
                    return true;
                }
                None => {
                    let n = chunk.len();
                    self.assembly.push(chunk);
                    self.link.skip(n);
                }
            }
        }
    }

    fn dispatch(&mut self) {
        let decoded = cobs::decode_in_place(&mut self.assembly.buf[..self.assembly.len]);
        let body_len = match decoded {
            Ok(n) if !self.assembly.overrun => n,
            _ => {
                crate::log_error!(
                    "frame unstuffing failed, overrun: %d",
                    self.assembly.overrun
                );
                return;
            }
        };
        if body_len == 0 {
            // Empty frame: a resynchronisation sentinel, not data.
            return;
        }

        let header = FrameHeader::from_u8(self.assembly.buf[0]);
        if header.kind != FrameKind::Data {
            crate::log_error!("unexpected frame kind: %d", u8::from(header.kind));
            return;
        }
        let payload = &self.assembly.buf[1..body_len];

        // A decodable data frame proves the host is listening; answer the
        // discovery once per connection.
        if !self.host_seen {
            self.host_seen = true;
            self.transport.send_device_info();
        }

        let (consumed, truncated) = self.state.try_deliver(header.port, payload);
        if consumed {
            if truncated {
                crate::log_warn!("blocking rx buffer too small");
            }
            return;
        }

        if usize::from(header.port) >= config::IN_PORT_COUNT {
            crate::log_error!("invalid port: %d", u8::from(header.port));
            return;
        }
        match self.state.handler(header.port) {
            Some(handler) => handler.on_frame(payload),
            None => {
                crate::log_error!("no handler for port: %d", u8::from(header.port));
                crate::log_mem_error!("dropped payload: %m", payload);
            }
        }
    }
}
