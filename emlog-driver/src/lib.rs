//! Emlog driver interface
//!
//! The crate provides the interface between a byte-stream link driver (UART,
//! USB-CDC) and the Emlog stack. Limited scope facilitates compatibility
//! across versions. Driver crates should depend on this crate. Emlog stack
//! users should depend on the `emlog` crate instead.
//!
//! A link consists of two halves:
//! * [`link::TxQueue`] is the shared transmit ring the stack appends framed
//!   bytes to; the driver drains it chunk-wise through `peek_with`/`skip`,
//!   which never wrap so the chunks suit DMA engines that require linear
//!   buffers.
//! * [`link::LinkRx`] is the receive side the server worker pulls from. The
//!   driver owns the RX staging ring and the event wait, including its
//!   timeout, so the stack itself never needs a timer.
//!
//! [`link::LinkTx::schedule`] must be idempotent: the stack calls it after
//! every append, including from contexts that cannot block.

#![no_std]

// This mod MUST go first, so that the others see its macros.
pub(crate) mod fmt;

pub mod cobs;
pub mod frame;
pub mod link;
pub mod ring;

pub mod time {
    pub use embassy_time::{Duration, Instant};
}
