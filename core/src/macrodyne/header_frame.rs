//! # Macrodyne Header and Status Responses
//!
//! The response to `RequestUnitIDBufferValue` (`0xBB48`): the echoed request code, the
//! device's 8-character ASCII unit ID and a checksum. The unit ID serves as the station
//! name of a 1690M device.
//!
//! The response to `RequestStatus1Flags` (`0xBB20`) carries the status-1 byte of a 1690M
//! unit. It is not one of the frames the classifier recognizes; a caller that sent the
//! request hands the reply to `FrameParser::parse_status_response`.

use super::commands::DeviceCommand;
use super::common::{FrameError, StatusFlags};
use super::frame_header::RESPONSE_SYNC;
use super::utils::push_checksum;
use serde::{Deserialize, Serialize};

/// Width of the unit ID field.
pub const UNIT_ID_LENGTH: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderFrame {
    pub unit_id: String,
}

impl HeaderFrame {
    /// Encoded size: echo code, unit ID and checksum.
    pub const LENGTH: usize = 2 + UNIT_ID_LENGTH + 1;

    pub fn new(unit_id: impl Into<String>) -> Self {
        HeaderFrame {
            unit_id: unit_id.into(),
        }
    }

    /// Parses a header frame. The checksum is not verified here.
    ///
    /// Trailing spaces and NUL padding are removed from the unit ID; non-ASCII bytes are
    /// rejected.
    pub fn from_hex(bytes: &[u8]) -> Result<Self, FrameError> {
        if bytes.len() != Self::LENGTH {
            return Err(FrameError::TruncatedFrame {
                message: format!(
                    "header frame is {} bytes, got {}",
                    Self::LENGTH,
                    bytes.len()
                ),
            });
        }
        let raw = &bytes[2..2 + UNIT_ID_LENGTH];
        if !raw.is_ascii() {
            return Err(FrameError::InvalidFormat {
                message: format!("unit ID {:02X?} is not ASCII", raw),
            });
        }
        let unit_id = String::from_utf8_lossy(raw)
            .trim_end_matches(&['\0', ' '][..])
            .trim_start()
            .to_string();
        Ok(HeaderFrame { unit_id })
    }

    /// Serializes the frame, space-padding or truncating the unit ID to 8 characters.
    pub fn to_hex(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::LENGTH);
        out.extend_from_slice(&[RESPONSE_SYNC, 0x48]);
        let mut unit_id: Vec<u8> = self
            .unit_id
            .chars()
            .filter(char::is_ascii)
            .take(UNIT_ID_LENGTH)
            .map(|c| c as u8)
            .collect();
        unit_id.resize(UNIT_ID_LENGTH, b' ');
        out.extend_from_slice(&unit_id);
        push_checksum(&mut out);
        out
    }
}

/// Reply to `RequestStatus1Flags`: echo code, status-1 byte and checksum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusFrame {
    pub status_flags: StatusFlags,
}

impl StatusFrame {
    pub const LENGTH: usize = 4;

    pub fn new(status_flags: StatusFlags) -> Self {
        StatusFrame { status_flags }
    }

    /// Parses a status reply. The checksum is not verified here.
    pub fn from_hex(bytes: &[u8]) -> Result<Self, FrameError> {
        if bytes.len() != Self::LENGTH {
            return Err(FrameError::TruncatedFrame {
                message: format!("status frame is {} bytes, got {}", Self::LENGTH, bytes.len()),
            });
        }
        let code = u16::from_be_bytes([bytes[0], bytes[1]]);
        if code != DeviceCommand::RequestStatus1Flags.code() {
            return Err(FrameError::UnrecognizedSyncByte {
                message: format!("expected a status-1 reply, found echo 0x{:04X}", code),
            });
        }
        Ok(StatusFrame {
            status_flags: StatusFlags(bytes[2]),
        })
    }

    pub fn to_hex(&self) -> Vec<u8> {
        let mut out = DeviceCommand::RequestStatus1Flags.code().to_be_bytes().to_vec();
        out.push(self.status_flags.0);
        push_checksum(&mut out);
        out
    }
}
