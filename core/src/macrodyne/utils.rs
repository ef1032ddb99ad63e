//! # Macrodyne Frame Utilities
//!
//! This module provides the single-byte XOR checksum used by every Macrodyne frame and
//! the BCD timestamp block carried by data frames.
//!
//! A Macrodyne frame is `sync · payload · checksum`, where the checksum is the XOR of
//! every byte after the leading sync byte and before the checksum itself.

use super::common::{ClockStatusFlags, FrameError};
use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Timelike, Utc};

/// Size in bytes of the data frame timestamp block.
pub const TIMESTAMP_BLOCK_SIZE: usize = 6;

/// Calculates the XOR checksum of `length` bytes starting at `offset`.
///
/// # Parameters
///
/// * `buffer`: The frame bytes.
/// * `offset`: Index of the first byte to include.
/// * `length`: Number of bytes to include.
///
/// # Returns
///
/// * `Ok(u8)`: The XOR of the span.
/// * `Err(FrameError::OutOfRange)`: If the span runs past the end of the buffer.
pub fn checksum(buffer: &[u8], offset: usize, length: usize) -> Result<u8, FrameError> {
    let span = offset
        .checked_add(length)
        .and_then(|end| buffer.get(offset..end))
        .ok_or_else(|| FrameError::OutOfRange {
            message: format!(
                "checksum span {}+{} exceeds {}-byte buffer",
                offset,
                length,
                buffer.len()
            ),
        })?;
    Ok(span.iter().fold(0u8, |acc, byte| acc ^ byte))
}

/// XOR of the payload region `buffer[1..len-1]`. Buffers shorter than two bytes have an
/// empty payload.
fn payload_checksum(buffer: &[u8]) -> u8 {
    if buffer.len() < 2 {
        return 0;
    }
    buffer[1..buffer.len() - 1]
        .iter()
        .fold(0u8, |acc, byte| acc ^ byte)
}

/// Returns true when the last byte equals the XOR of `buffer[1..len-1]`.
pub fn validate_checksum(buffer: &[u8]) -> bool {
    match buffer.last() {
        Some(last) if buffer.len() >= 2 => *last == payload_checksum(buffer),
        _ => false,
    }
}

/// Like `validate_checksum`, but reports the expected and received values on mismatch.
pub fn verify_checksum(buffer: &[u8]) -> Result<(), FrameError> {
    if buffer.len() < 2 {
        return Err(FrameError::TruncatedFrame {
            message: format!("{} bytes cannot hold a sync byte and checksum", buffer.len()),
        });
    }
    let expected = payload_checksum(buffer);
    let actual = buffer[buffer.len() - 1];
    if expected == actual {
        Ok(())
    } else {
        Err(FrameError::ChecksumMismatch { expected, actual })
    }
}

/// Writes the payload checksum into the final byte of `buffer`.
pub fn append_checksum(buffer: &mut [u8]) -> Result<(), FrameError> {
    if buffer.len() < 2 {
        return Err(FrameError::OutOfRange {
            message: format!("{} bytes leave no room for a checksum", buffer.len()),
        });
    }
    let value = payload_checksum(buffer);
    let last = buffer.len() - 1;
    buffer[last] = value;
    Ok(())
}

/// Pushes the checksum of `buffer[1..]` onto the end of a frame under construction.
pub fn push_checksum(buffer: &mut Vec<u8>) {
    let value = buffer.iter().skip(1).fold(0u8, |acc, byte| acc ^ byte);
    buffer.push(value);
}

/// Decodes one packed BCD byte (two digits).
pub fn bcd_to_u8(byte: u8) -> Result<u8, FrameError> {
    let high = byte >> 4;
    let low = byte & 0x0F;
    if high > 9 || low > 9 {
        return Err(FrameError::InvalidBcd {
            message: format!("0x{:02X} is not a packed BCD byte", byte),
        });
    }
    Ok(high * 10 + low)
}

/// Encodes a value below 100 as packed BCD.
pub fn u8_to_bcd(value: u8) -> u8 {
    ((value / 10) % 10) << 4 | (value % 10)
}

/// Decodes a big-endian BCD word of up to four digits.
pub fn bcd_to_u16(bytes: [u8; 2]) -> Result<u16, FrameError> {
    Ok(u16::from(bcd_to_u8(bytes[0])?) * 100 + u16::from(bcd_to_u8(bytes[1])?))
}

pub fn u16_to_bcd(value: u16) -> [u8; 2] {
    [
        u8_to_bcd(((value / 100) % 100) as u8),
        u8_to_bcd((value % 100) as u8),
    ]
}

/// Decodes a 6-byte timestamp block.
///
/// The block is a clock status byte, a BCD day-of-year word and BCD hour, minute and
/// second bytes. The device does not send the year; it is taken from `receive_time`. A
/// day-of-year later than the receive date is placed in the previous year, and day 1
/// received on the last day of a year is placed in the next one.
///
/// # Returns
///
/// * `Ok((ClockStatusFlags, DateTime<Utc>))`: The clock status and the absolute time.
/// * `Err(FrameError::InvalidBcd)`: On a non-decimal nibble or an impossible date/time.
pub fn decode_timestamp(
    bytes: &[u8],
    receive_time: DateTime<Utc>,
) -> Result<(ClockStatusFlags, DateTime<Utc>), FrameError> {
    if bytes.len() < TIMESTAMP_BLOCK_SIZE {
        return Err(FrameError::OutOfRange {
            message: format!("timestamp block needs 6 bytes, got {}", bytes.len()),
        });
    }
    let clock = ClockStatusFlags(bytes[0]);
    let day = bcd_to_u16([bytes[1], bytes[2]])?;
    let hour = bcd_to_u8(bytes[3])?;
    let minute = bcd_to_u8(bytes[4])?;
    let second = bcd_to_u8(bytes[5])?;

    let mut year = receive_time.year();
    let received_on = receive_time.ordinal();
    if day == 1 && received_on >= 365 {
        year += 1;
    } else if u32::from(day) > received_on + 1 {
        year -= 1;
    }
    let invalid = || FrameError::InvalidBcd {
        message: format!(
            "day {} {:02}:{:02}:{:02} is not a valid time in {}",
            day, hour, minute, second, year
        ),
    };
    let naive = NaiveDate::from_yo_opt(year, u32::from(day))
        .and_then(|date| date.and_hms_opt(u32::from(hour), u32::from(minute), u32::from(second)))
        .ok_or_else(invalid)?;
    Ok((clock, Utc.from_utc_datetime(&naive)))
}

/// Encodes a timestamp block. Sub-second precision is dropped.
pub fn encode_timestamp(clock: ClockStatusFlags, time: &DateTime<Utc>) -> [u8; TIMESTAMP_BLOCK_SIZE] {
    let day = u16_to_bcd(time.ordinal() as u16);
    [
        clock.0,
        day[0],
        day[1],
        u8_to_bcd(time.hour() as u8),
        u8_to_bcd(time.minute() as u8),
        u8_to_bcd(time.second() as u8),
    ]
}

/// Truncates a time to whole seconds, the resolution of the timestamp block.
pub fn truncate_to_second(time: DateTime<Utc>) -> DateTime<Utc> {
    time - Duration::nanoseconds(i64::from(time.nanosecond()))
}
