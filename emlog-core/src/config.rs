//! Compile-time configuration
//!
//! Sizes shared across the stack. Integrations that need different values
//! use the const-generic forms of the underlying types
//! (`RingBuffer<N>`, `TxQueue<N>`) directly.

/// TX ring capacity in bytes. Also the saved-log snapshot size.
pub const TX_BUF_SIZE: usize = 8192;

/// Largest port payload accepted by the transport; exceeding it is fatal.
pub const MAX_PACKET_SIZE: usize = 1500;

/// Number of ports covered by the RX dispatch table.
pub const IN_PORT_COUNT: usize = 8;

/// Length of the application fingerprint.
pub const APP_HASH_SIZE: usize = 64;

/// Record build buffer. Load-bearing for argument truncation: a record
/// (including its frame overhead) never exceeds this, so text arguments
/// get cut and fixed-width arguments stop the slot stream when it fills.
pub const RECORD_BUF_SIZE: usize = 100;
