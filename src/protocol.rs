//! Chunk stamping, log record splitting and write encoding.
//!
//! All functions are pure (no I/O), fully unit-testable.

use std::time::{SystemTime, UNIX_EPOCH};

/// Line terminator appended by `/writecf/` and WebSocket `input` messages.
pub const CRLF: &str = "\r\n";

/// Current wall-clock time in milliseconds since the Unix epoch.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Decode serial bytes one byte per char (Latin-1).
///
/// Never fails; every byte maps to exactly one char so buffer capacity
/// counts bytes received.
pub fn decode_chunk(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}

/// Format a millisecond timestamp as fractional seconds.
///
/// Uses the shortest decimal form: `1700000000500` becomes `1700000000.5`,
/// whole seconds carry no fraction, and `0` stays `0`.
pub fn format_timestamp(millis: u64) -> String {
    let secs = millis as f64 / 1000.0;
    format!("{secs}")
}

/// Prefix a chunk with its arrival time: `"<seconds>,<chunk>"`.
pub fn stamp_chunk(millis: u64, chunk: &str) -> String {
    format!("{},{chunk}", format_timestamp(millis))
}

/// Split a stamped chunk into log fields.
///
/// Only the first literal CRLF is removed. No validation of field count or
/// numeric content is done.
pub fn split_record(stamped: &str) -> Vec<String> {
    stamped
        .replacen(CRLF, "", 1)
        .split(',')
        .map(str::to_string)
        .collect()
}

/// Encode a payload for the serial port as-is.
pub fn encode_write(payload: &str) -> Vec<u8> {
    payload.as_bytes().to_vec()
}

/// Encode a payload with a CRLF terminator appended.
pub fn encode_write_crlf(payload: &str) -> Vec<u8> {
    format!("{payload}{CRLF}").into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_chunk_ascii() {
        assert_eq!(decode_chunk(b"12,34\r\n"), "12,34\r\n");
    }

    #[test]
    fn test_decode_chunk_high_bytes() {
        let s = decode_chunk(&[0x41, 0xE9, 0xFF]);
        assert_eq!(s.chars().count(), 3);
        assert_eq!(s, "A\u{e9}\u{ff}");
    }

    #[test]
    fn test_format_timestamp() {
        assert_eq!(format_timestamp(0), "0");
        assert_eq!(format_timestamp(1_700_000_000_000), "1700000000");
        assert_eq!(format_timestamp(1_700_000_000_500), "1700000000.5");
        assert_eq!(format_timestamp(1_700_000_000_123), "1700000000.123");
    }

    #[test]
    fn test_stamp_chunk() {
        assert_eq!(stamp_chunk(1_500, "1,2\r\n"), "1.5,1,2\r\n");
    }

    #[test]
    fn test_split_record() {
        assert_eq!(
            split_record("1.5,10,20,300,400\r\n"),
            vec!["1.5", "10", "20", "300", "400"]
        );
    }

    #[test]
    fn test_split_record_strips_first_crlf_only() {
        assert_eq!(split_record("1,a\r\nb\r\n"), vec!["1", "ab\r\n"]);
    }

    #[test]
    fn test_split_record_malformed_passes_through() {
        assert_eq!(split_record("1,garbage"), vec!["1", "garbage"]);
        assert_eq!(split_record("1,"), vec!["1", ""]);
    }

    #[test]
    fn test_encode_write() {
        assert_eq!(encode_write("hello world"), b"hello world");
        assert_eq!(encode_write(""), b"");
    }

    #[test]
    fn test_encode_write_crlf() {
        assert_eq!(encode_write_crlf("abc"), b"abc\r\n");
        assert_eq!(encode_write_crlf(""), b"\r\n");
    }
}
