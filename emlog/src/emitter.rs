//! In-firmware record emitting
//!
//! The emitter is the one piece of process-wide state in the stack: the
//! record macros have no object to hang off, so [`init`] parks a transport
//! reference in a global the way the original console is attached at boot.
//! Emits before [`init`] are dropped; emits before the link attaches buffer
//! in the ring and go out once transmission resumes.
//!
//! Emitter calls never block: a record is built in a bounded buffer on the
//! caller's stack and appended under a short critical section.

use core::cell::Cell;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;

use crate::core::Port;
use crate::record::{build_formatted, build_memory_dump, Arg, LogStr};
use crate::transport::Transport;

static TRANSPORT: Mutex<CriticalSectionRawMutex, Cell<Option<&'static Transport>>> =
    Mutex::new(Cell::new(None));

/// Attaches the emitter to its transport. Must run before any record macro
/// is worth anything; safe to call again (last attach wins).
pub fn init(transport: &'static Transport) {
    TRANSPORT.lock(|cell| cell.set(Some(transport)));
}

fn transport() -> Option<&'static Transport> {
    TRANSPORT.lock(|cell| cell.get())
}

/// No-argument record.
pub fn log1(prefix: LogStr) {
    let Some(t) = transport() else { return };
    let (framed, n) = build_formatted(prefix, &[]);
    t.tx_framed(&framed[..n]);
}

/// Record with typed argument slots.
pub fn logn(prefix: LogStr, args: &[Arg]) {
    let Some(t) = transport() else { return };
    let (framed, n) = build_formatted(prefix, args);
    t.tx_framed(&framed[..n]);
}

/// Memory-dump record: `addr` names the source, `data` is the bytes read
/// there (cut to the record bound).
pub fn log_mem(prefix: LogStr, addr: u32, data: &[u8]) {
    let Some(t) = transport() else { return };
    let (framed, n) = build_memory_dump(prefix, addr, data);
    t.tx_framed(&framed[..n]);
}

/// Forwards an arbitrary payload to a port, for bridge collaborators (a
/// shell backend feeds its console bytes through here on port 0).
pub fn raw(port: Port, payload: &[u8]) {
    if let Some(t) = transport() {
        t.tx(port, payload);
    }
}

/// Free TX ring bytes, so no-loss producers can flush-wait.
pub fn tx_avail() -> usize {
    transport().map_or(0, |t| t.tx_avail())
}

pub fn suspend_tx() {
    if let Some(t) = transport() {
        t.suspend();
    }
}

pub fn resume_tx() {
    if let Some(t) = transport() {
        t.resume();
    }
}

/// Terminal record: emit, synchronously flush the link, then panic. On
/// embedded targets the panic handler breaks to a debugger or resets.
pub fn fatal(prefix: LogStr, args: &[Arg]) -> ! {
    if let Some(t) = transport() {
        let (framed, n) = build_formatted(prefix, args);
        t.tx_framed(&framed[..n]);
        t.fatal_flush();
    }
    panic!("fatal log record");
}
