//! # Emlog
//!
//! Binary log transport for embedded devices: firmware emits structured
//! records, typed binary payloads and bidirectional port messages over one
//! byte-stream link (UART or USB-CDC) to a host decoder. No allocation, no
//! RTOS assumptions; concurrency is expressed with embassy-sync primitives
//! and an async link contract.
//!
//! ## Architecture
//!
//! ```text
//!  record macros ──► emitter ──► frame builder ─┐
//!  emit_raw / bridges ──► transport ────────────┤
//!                                               ▼
//!                                           TX ring ──► link driver ──► wire
//!
//!  wire ──► link driver ──► server worker ──► de-framer ──► port dispatch
//!                                                   │              │
//!                                          blocking-rx slot   port handlers
//! ```
//!
//! Components:
//! * _Transport_ owns the TX ring, wraps port payloads into sentinel-framed
//!   packets and kicks the link scheduler. Ports 0 (records), 62 (device
//!   info) and 63 (application-hash beacon) are spoken for.
//! * _Emitter_ is the record side: `log_info!` and friends build bounded
//!   records whose format strings stay on the host (only a 4-byte
//!   descriptor reference travels).
//! * _Server_ is the RX worker: it recovers frame boundaries, dispatches
//!   per-port handlers and services blocking request/response receives.
//! * _Persist_ snapshots the TX ring across a soft reset when the
//!   application fingerprint proves the contents trustworthy.
//! * The payload codec lives in [`emlog_encoding`] and is re-exported as
//!   [`encoding`].
//!
//! ## Bring-up order
//!
//! 1. [`persist::pre_init`] (when persistence is used), before any emit.
//! 2. [`transport::Transport::new`] + [`emitter::init`].
//! 3. Wire the driver: give it [`transport::Transport::queue`], then
//!    [`transport::Transport::attach`] its TX handle.
//! 4. Spawn [`server::Server::run`] on its own task.
#![no_std]

// This mod MUST go first, so that the others see its macros.
pub(crate) mod fmt;

pub use emlog_core as core;
pub use emlog_driver::{cobs, frame, link, ring, time};
pub use emlog_encoding as encoding;

pub mod device_info;
pub mod emitter;
mod macros;
pub mod persist;
pub mod record;
pub mod server;
pub mod transport;
