//! Record emit macros
//!
//! `log_str!` interns a `level:file:line:format` descriptor; on embedded
//! targets the bytes land in the `.logstr` link section, which the host
//! extracts from the ELF to decode records by address. Only the 4-byte
//! reference travels on the wire.
//!
//! The level prefix is numeric: 0 debug, 1 info, 2 warn, 3 error, 4 fatal.
//!
//! Format text may contain colons, but file paths must not: the decoder
//! splits the descriptor on the first three colons.

/// Interns a descriptor string and yields its [`LogStr`](crate::record::LogStr) reference.
#[macro_export]
macro_rules! log_str {
    ($lvl:literal, $fmt:literal) => {{
        const TEXT: &str = concat!($lvl, ":", file!(), ":", line!(), ":", $fmt);
        #[cfg_attr(target_os = "none", link_section = ".logstr")]
        #[used]
        static DESCRIPTOR: [u8; TEXT.len()] = $crate::record::str_to_array(TEXT);
        $crate::record::LogStr::from_ptr(DESCRIPTOR.as_ptr())
    }};
}

#[macro_export]
macro_rules! log_debug {
    ($fmt:literal $(,)?) => {
        $crate::emitter::log1($crate::log_str!(0, $fmt))
    };
    ($fmt:literal, $($arg:expr),+ $(,)?) => {
        $crate::emitter::logn(
            $crate::log_str!(0, $fmt),
            &[$($crate::record::Arg::from($arg)),+],
        )
    };
}

#[macro_export]
macro_rules! log_info {
    ($fmt:literal $(,)?) => {
        $crate::emitter::log1($crate::log_str!(1, $fmt))
    };
    ($fmt:literal, $($arg:expr),+ $(,)?) => {
        $crate::emitter::logn(
            $crate::log_str!(1, $fmt),
            &[$($crate::record::Arg::from($arg)),+],
        )
    };
}

#[macro_export]
macro_rules! log_warn {
    ($fmt:literal $(,)?) => {
        $crate::emitter::log1($crate::log_str!(2, $fmt))
    };
    ($fmt:literal, $($arg:expr),+ $(,)?) => {
        $crate::emitter::logn(
            $crate::log_str!(2, $fmt),
            &[$($crate::record::Arg::from($arg)),+],
        )
    };
}

#[macro_export]
macro_rules! log_error {
    ($fmt:literal $(,)?) => {
        $crate::emitter::log1($crate::log_str!(3, $fmt))
    };
    ($fmt:literal, $($arg:expr),+ $(,)?) => {
        $crate::emitter::logn(
            $crate::log_str!(3, $fmt),
            &[$($crate::record::Arg::from($arg)),+],
        )
    };
}

/// Emit, flush the link synchronously, then panic. Never returns.
#[macro_export]
macro_rules! log_fatal {
    ($fmt:literal $(, $arg:expr)* $(,)?) => {
        $crate::emitter::fatal(
            $crate::log_str!(4, $fmt),
            &[$($crate::record::Arg::from($arg)),*],
        )
    };
}

/// Memory-dump records at each level.
#[macro_export]
macro_rules! log_mem_debug {
    ($fmt:literal, $data:expr) => {{
        let data: &[u8] = $data;
        $crate::emitter::log_mem(
            $crate::log_str!(0, $fmt),
            data.as_ptr() as usize as u32,
            data,
        )
    }};
}

#[macro_export]
macro_rules! log_mem_info {
    ($fmt:literal, $data:expr) => {{
        let data: &[u8] = $data;
        $crate::emitter::log_mem(
            $crate::log_str!(1, $fmt),
            data.as_ptr() as usize as u32,
            data,
        )
    }};
}

#[macro_export]
macro_rules! log_mem_warn {
    ($fmt:literal, $data:expr) => {{
        let data: &[u8] = $data;
        $crate::emitter::log_mem(
            $crate::log_str!(2, $fmt),
            data.as_ptr() as usize as u32,
            data,
        )
    }};
}

#[macro_export]
macro_rules! log_mem_error {
    ($fmt:literal, $data:expr) => {{
        let data: &[u8] = $data;
        $crate::emitter::log_mem(
            $crate::log_str!(3, $fmt),
            data.as_ptr() as usize as u32,
            data,
        )
    }};
}
