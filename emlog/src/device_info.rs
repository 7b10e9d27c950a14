//! Device identification handshake payload (port 62)
//!
//! A self-describing map with the application hash and the board name. The
//! host uses the hash to load the matching symbol database before decoding
//! anything else.

use emlog_encoding::{pack, unpack, Arg, Out, Result, Stream, Writer};

use crate::core::{config, AppHash};

const FORMAT: &str = "{.app_hash:b,.board:s}";

/// Encodes the identification map into `out`, returning the length.
pub fn encode(out: &mut [u8], app_hash: &AppHash, board: &str) -> Result<usize> {
    let mut w = Writer::new(out);
    pack(
        &mut w,
        FORMAT,
        &[Arg::Bytes(app_hash), Arg::Text(board)],
    )?;
    Ok(w.position())
}

/// Decoded identification map, as a host-side consumer sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub app_hash: AppHash,
    pub board: heapless::Vec<u8, 64>,
}

impl DeviceInfo {
    pub fn decode(payload: &[u8]) -> Result<Self> {
        let mut hash = [0u8; config::APP_HASH_SIZE];
        let mut hash_len = 0usize;
        let mut board_buf = [0u8; 65];
        let mut board_len = 0usize;
        unpack(
            &mut Stream::new(payload),
            FORMAT,
            &mut [
                Out::Bytes(&mut hash, &mut hash_len),
                Out::Text(&mut board_buf, &mut board_len),
            ],
        )?;

        let mut board = heapless::Vec::new();
        // Drop the terminating NUL the text unpack adds.
        let _ = board.extend_from_slice(&board_buf[..board_len.saturating_sub(1)]);
        Ok(Self {
            app_hash: hash,
            board,
        })
    }
}
