//! Little-endian integer pack/unpack, fixed-width ASCII helpers, the 12-byte
//! MDX numeric key encoding, and a bounded buffered read that never returns
//! a short read silently.

use crate::error::{DbaseError, DbaseResult};
use std::convert::TryInto;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};

pub fn read_u16_le(bytes: &[u8]) -> u16 {
    u16::from_le_bytes(bytes[0..2].try_into().unwrap())
}

pub fn read_u32_le(bytes: &[u8]) -> u32 {
    u32::from_le_bytes(bytes[0..4].try_into().unwrap())
}

pub fn write_u16_le(dst: &mut [u8], value: u16) {
    dst[0..2].copy_from_slice(&value.to_le_bytes());
}

pub fn write_u32_le(dst: &mut [u8], value: u32) {
    dst[0..4].copy_from_slice(&value.to_le_bytes());
}

/// Read exactly `length` bytes starting at `position` in `file`, retrying
/// partial reads until the buffer is filled. Reaching EOF before `length`
/// bytes have been read is fatal (`DbaseError::TruncatedFile`).
pub fn buffered_read(file: &mut File, position: u64, length: usize) -> DbaseResult<Vec<u8>> {
    file.seek(SeekFrom::Start(position))?;
    let mut buf = vec![0u8; length];
    let mut filled = 0;
    while filled < length {
        let n = file.read(&mut buf[filled..])?;
        if n == 0 {
            return Err(DbaseError::truncated(position, length, filled));
        }
        filled += n;
    }
    Ok(buf)
}

/// Trim a fixed-width ASCII field: strip a trailing NUL run, then trailing
/// ASCII spaces, returning the remaining text. Used for names and other
/// null-padded fields; `C`-field trimming is governed separately by
/// `Config::auto_trim_enabled`.
pub fn trim_padded_ascii(bytes: &[u8]) -> &[u8] {
    let without_nul = match bytes.iter().position(|&b| b == 0) {
        Some(i) => &bytes[..i],
        None => bytes,
    };
    let end = without_nul
        .iter()
        .rposition(|&b| b != b' ')
        .map(|i| i + 1)
        .unwrap_or(0);
    &without_nul[..end]
}

pub fn ascii_string(bytes: &[u8]) -> String {
    String::from_utf8_lossy(trim_padded_ascii(bytes)).into_owned()
}

/// Right-justify `value` as ASCII digits into a field of `width` bytes,
/// left-padding with spaces, as the DBF memo column (10 ASCII bytes) and the
/// MDX/NDX record-number columns require.
pub fn right_justify_ascii(value: u64, width: usize) -> Vec<u8> {
    let digits = value.to_string();
    let mut out = vec![b' '; width];
    let start = width.saturating_sub(digits.len());
    out[start..].copy_from_slice(&digits.as_bytes()[digits.len().saturating_sub(width)..]);
    out
}

/// Decode the 12-byte MDX "BCD-like" numeric key encoding described in
/// §4.8. Returns `None` only when the encoding's size byte is outside the
/// documented range; every documented sign byte is handled explicitly.
pub fn decode_mdx_bcd12(bytes: &[u8]) -> Option<f64> {
    if bytes.len() < 12 {
        return None;
    }
    if bytes[1] == 0x10 {
        return Some(0.0);
    }
    let digits_left_of_decimal = bytes[0].checked_sub(0x34)? as i32;
    let negative = match bytes[1] {
        0x51 | 0x29 => false,
        0xD1 | 0xA9 => true,
        _ => return None,
    };

    let mut lv: i128 = 0;
    for &byte in &bytes[2..11] {
        let hi = (byte >> 4) as i128;
        let lo = (byte & 0x0F) as i128;
        lv = lv * 100 + hi * 10 + lo;
    }

    let exponent = 18 - digits_left_of_decimal;
    let mut value = lv as f64 / 10f64.powi(exponent);
    if negative {
        value = -value;
    }
    Some(value)
}
