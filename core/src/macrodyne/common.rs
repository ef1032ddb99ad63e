//! # Macrodyne Common Types
//!
//! This module defines the types shared by every Macrodyne 1690M/1690G frame: the error
//! enumeration returned by all decode and encode paths, the protocol sub-version, frame
//! types, and the packed flag words the device reports (online data format, clock status
//! and status-2).
//!
//! ## Key Components
//!
//! - `FrameError`: Typed failures for malformed input, integrity faults, unsupported
//!   commands and configuration problems.
//! - `ProtocolVersion`: The 1690M or 1690G sub-protocol spoken by a device.
//! - `FrameType`: Data, configuration, header or (send-only) command frame.
//! - `OnlineDataFormatFlags`: The 16-bit bitmask selecting which optional fields a data
//!   frame carries.
//! - `ClockStatusFlags` and `Status2Flags`: Per-frame status bytes, with decoders for the
//!   trigger reason and GPS status sub-fields.
//! - `StatusFlags`: The 1690M status-1 byte reported on request.
//!
//! ## Usage
//!
//! Every other module in `macrodyne` depends on these types. They carry no state and are
//! cheap to copy.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Maximum number of phasors a 1690G frame may carry.
pub const MAXIMUM_PHASOR_VALUES: usize = 40;

/// Maximum number of phasors a 1690M frame may carry.
pub const MAXIMUM_M_PHASOR_VALUES: usize = 10;

/// Maximum number of 16-bit digital words in a data frame.
pub const MAXIMUM_DIGITAL_VALUES: usize = 2;

/// Errors produced while decoding or encoding Macrodyne frames.
///
/// # Variants
///
/// * `OutOfRange`: A primitive read or write would run past the end of the buffer.
/// * `TruncatedFrame`: The buffer length does not match the length implied by the layout.
/// * `ChecksumMismatch`: The trailing XOR checksum does not match the frame contents.
/// * `UnrecognizedSyncByte`: The leading byte or command echo is not a known frame type.
/// * `UnsupportedSubVersion`: The sub-version marker or name is not 1690M/1690G.
/// * `InvalidBcd`: A timestamp field holds a nibble above 9 or an impossible value.
/// * `InvalidFormat`: A frame or record is structurally inconsistent.
/// * `UnsupportedCommand`: The command has no native code for this device.
/// * `MissingConfiguration`: A data frame was seen before the device format was known.
/// * `InvalidDefinition`: A device-description entry could not be parsed.
/// * `InvalidParameter`: A connection parameter is missing or malformed.
/// * `SourceUnavailable`: The device-description source could not be read.
#[derive(Debug, Clone, PartialEq)]
pub enum FrameError {
    OutOfRange { message: String },
    TruncatedFrame { message: String },
    ChecksumMismatch { expected: u8, actual: u8 },
    UnrecognizedSyncByte { message: String },
    UnsupportedSubVersion { message: String },
    InvalidBcd { message: String },
    InvalidFormat { message: String },
    UnsupportedCommand { message: String },
    MissingConfiguration { message: String },
    InvalidDefinition { message: String },
    InvalidParameter { message: String },
    SourceUnavailable { message: String },
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            FrameError::OutOfRange { message } => write!(f, "Out of range: {}", message),
            FrameError::TruncatedFrame { message } => write!(f, "Truncated frame: {}", message),
            FrameError::ChecksumMismatch { expected, actual } => write!(
                f,
                "Checksum mismatch: expected 0x{:02X}, found 0x{:02X}",
                expected, actual
            ),
            FrameError::UnrecognizedSyncByte { message } => {
                write!(f, "Unrecognized sync byte: {}", message)
            }
            FrameError::UnsupportedSubVersion { message } => {
                write!(f, "Unsupported sub-version: {}", message)
            }
            FrameError::InvalidBcd { message } => write!(f, "Invalid BCD: {}", message),
            FrameError::InvalidFormat { message } => write!(f, "Invalid format: {}", message),
            FrameError::UnsupportedCommand { message } => {
                write!(f, "Unsupported command: {}", message)
            }
            FrameError::MissingConfiguration { message } => {
                write!(f, "Missing configuration: {}", message)
            }
            FrameError::InvalidDefinition { message } => {
                write!(f, "Invalid definition: {}", message)
            }
            FrameError::InvalidParameter { message } => {
                write!(f, "Invalid parameter: {}", message)
            }
            FrameError::SourceUnavailable { message } => {
                write!(f, "Source unavailable: {}", message)
            }
        }
    }
}

impl std::error::Error for FrameError {}

/// The Macrodyne sub-protocol spoken by a device.
///
/// 1690M frames carry a fixed `0x02` marker after the data sync byte and interleave the
/// frequency and reference fields after phasor 5. 1690G frames carry a sample number,
/// always include a timestamp and place frequency after all phasors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ProtocolVersion {
    #[default]
    M,
    G,
}

impl ProtocolVersion {
    /// Largest phasor count a frame of this sub-version can carry.
    pub fn maximum_phasors(&self) -> usize {
        match self {
            ProtocolVersion::M => MAXIMUM_M_PHASOR_VALUES,
            ProtocolVersion::G => MAXIMUM_PHASOR_VALUES,
        }
    }
}

impl FromStr for ProtocolVersion {
    type Err = FrameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "M" | "1690M" => Ok(ProtocolVersion::M),
            "G" | "1690G" => Ok(ProtocolVersion::G),
            other => Err(FrameError::UnsupportedSubVersion {
                message: format!("'{}' is not a Macrodyne protocol version", other),
            }),
        }
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ProtocolVersion::M => write!(f, "1690M"),
            ProtocolVersion::G => write!(f, "1690G"),
        }
    }
}

/// Macrodyne frame types. Command frames are only ever sent to the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FrameType {
    DataFrame,
    ConfigurationFrame,
    HeaderFrame,
    CommandFrame,
}

impl fmt::Display for FrameType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            FrameType::DataFrame => write!(f, "Data Frame"),
            FrameType::ConfigurationFrame => write!(f, "Configuration Frame"),
            FrameType::HeaderFrame => write!(f, "Header Frame"),
            FrameType::CommandFrame => write!(f, "Command Frame"),
        }
    }
}

/// The 16-bit online data format word returned by the `0xBB24` request.
///
/// Bit 0 enables the status-2 byte, bit 1 the timestamp block, bits 2-5 phasors 2-5,
/// bit 6 the reference phasor, bit 7 digital word 1, bits 8-12 phasors 6-10 and bit 13
/// digital word 2. Bits 14 and 15 are unused. Phasor 1 is always present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct OnlineDataFormatFlags(pub u16);

impl OnlineDataFormatFlags {
    pub const STATUS2_BYTE_ENABLED: u16 = 0x0001;
    pub const TIMESTAMP_ENABLED: u16 = 0x0002;
    pub const PHASOR2_ENABLED: u16 = 0x0004;
    pub const PHASOR3_ENABLED: u16 = 0x0008;
    pub const PHASOR4_ENABLED: u16 = 0x0010;
    pub const PHASOR5_ENABLED: u16 = 0x0020;
    pub const REFERENCE_ENABLED: u16 = 0x0040;
    pub const DIGITAL1_ENABLED: u16 = 0x0080;
    pub const PHASOR6_ENABLED: u16 = 0x0100;
    pub const PHASOR7_ENABLED: u16 = 0x0200;
    pub const PHASOR8_ENABLED: u16 = 0x0400;
    pub const PHASOR9_ENABLED: u16 = 0x0800;
    pub const PHASOR10_ENABLED: u16 = 0x1000;
    pub const DIGITAL2_ENABLED: u16 = 0x2000;
    pub const UNUSED_BITS: u16 = 0xC000;

    /// Masks for phasors 2 through 10, in slot order.
    pub const PHASOR_BITS: [u16; 9] = [
        Self::PHASOR2_ENABLED,
        Self::PHASOR3_ENABLED,
        Self::PHASOR4_ENABLED,
        Self::PHASOR5_ENABLED,
        Self::PHASOR6_ENABLED,
        Self::PHASOR7_ENABLED,
        Self::PHASOR8_ENABLED,
        Self::PHASOR9_ENABLED,
        Self::PHASOR10_ENABLED,
    ];

    pub fn from_bits(bits: u16) -> Self {
        OnlineDataFormatFlags(bits)
    }

    pub fn bits(&self) -> u16 {
        self.0
    }

    pub fn contains(&self, mask: u16) -> bool {
        self.0 & mask == mask
    }

    pub fn insert(&mut self, mask: u16) {
        self.0 |= mask;
    }

    pub fn remove(&mut self, mask: u16) {
        self.0 &= !mask;
    }

    pub fn set(&mut self, mask: u16, enabled: bool) {
        if enabled {
            self.insert(mask);
        } else {
            self.remove(mask);
        }
    }

    pub fn status2_included(&self) -> bool {
        self.contains(Self::STATUS2_BYTE_ENABLED)
    }

    pub fn timestamp_included(&self) -> bool {
        self.contains(Self::TIMESTAMP_ENABLED)
    }

    pub fn reference_included(&self) -> bool {
        self.contains(Self::REFERENCE_ENABLED)
    }

    pub fn digital1_included(&self) -> bool {
        self.contains(Self::DIGITAL1_ENABLED)
    }

    pub fn digital2_included(&self) -> bool {
        self.contains(Self::DIGITAL2_ENABLED)
    }

    /// Returns whether phasor slot `index` (1-based) is present. Slot 1 always is.
    pub fn phasor_enabled(&self, index: usize) -> bool {
        match index {
            1 => true,
            2..=10 => self.contains(Self::PHASOR_BITS[index - 2]),
            _ => false,
        }
    }

    /// Number of phasors selected by the bitmask (1 to 10).
    pub fn phasor_count(&self) -> usize {
        1 + Self::PHASOR_BITS
            .iter()
            .filter(|mask| self.contains(**mask))
            .count()
    }

    /// Number of digital words selected by the bitmask (0 to 2).
    pub fn digital_count(&self) -> usize {
        usize::from(self.digital1_included()) + usize::from(self.digital2_included())
    }

    /// Builds a format word for `count` phasors with the timestamp enabled.
    ///
    /// Counts above ten still select all ten bitmask phasors; 1690G devices carry the
    /// remainder as additional channels.
    pub fn from_phasor_count(count: usize) -> Self {
        let mut flags = OnlineDataFormatFlags(Self::TIMESTAMP_ENABLED);
        for (slot, mask) in Self::PHASOR_BITS.iter().enumerate() {
            if count > slot + 1 {
                flags.insert(*mask);
            }
        }
        flags
    }

    /// Replaces only the phasor selection bits, keeping every other flag.
    pub fn with_phasor_count(&self, count: usize) -> Self {
        let phasor_mask: u16 = Self::PHASOR_BITS.iter().fold(0, |acc, mask| acc | mask);
        let phasors = Self::from_phasor_count(count).0 & phasor_mask;
        OnlineDataFormatFlags((self.0 & !phasor_mask) | phasors)
    }
}

impl fmt::Display for OnlineDataFormatFlags {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "0x{:04X} ({} phasors, status2={}, timestamp={}, reference={}, digitals={})",
            self.0,
            self.phasor_count(),
            self.status2_included(),
            self.timestamp_included(),
            self.reference_included(),
            self.digital_count()
        )
    }
}

/// Clock status byte leading the timestamp block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ClockStatusFlags(pub u8);

impl ClockStatusFlags {
    pub const DAC_BEYOND_LIMITS: u8 = 0x01;
    pub const GPS_COM_ISSUE: u8 = 0x02;
    pub const GPS_UNLOCKED: u8 = 0x04;
    pub const GPS_TIME_INVALID: u8 = 0x08;
    pub const RESYNCHRONIZATION_PENDING: u8 = 0x10;
    pub const ERROR_CONDITION: u8 = 0x20;
    pub const USING_LOCAL_TIME: u8 = 0x40;
    pub const CLOCK_AND_RECEIVER_OUT_OF_SYNC: u8 = 0x80;

    pub fn contains(&self, mask: u8) -> bool {
        self.0 & mask == mask
    }

    /// True when the clock reports a GPS-disciplined time.
    pub fn time_is_locked(&self) -> bool {
        self.0 & (Self::GPS_UNLOCKED | Self::GPS_TIME_INVALID | Self::USING_LOCAL_TIME) == 0
    }
}

/// Status-1 byte of a 1690M unit, returned by `RequestStatus1Flags`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StatusFlags(pub u8);

impl StatusFlags {
    pub const TRIGGER_DETECTED: u8 = 0x01;
    pub const OPERATIONAL_LIMIT_REACHED: u8 = 0x02;
    pub const RESET_OCCURRED: u8 = 0x04;
    pub const TIME_ERROR: u8 = 0x08;
    pub const REFERENCE_LOST: u8 = 0x10;
    pub const INPUT_REFERENCE_ENABLED: u8 = 0x20;
    pub const OUTPUT_REFERENCE_ENABLED: u8 = 0x40;
    pub const TRIGGER_DETECTED_MEMORY_FULL: u8 = 0x80;

    pub fn contains(&self, mask: u8) -> bool {
        self.0 & mask == mask
    }

    pub fn trigger_detected(&self) -> bool {
        self.contains(Self::TRIGGER_DETECTED)
    }

    /// GPS time or time tag error.
    pub fn time_error(&self) -> bool {
        self.contains(Self::TIME_ERROR)
    }

    /// A reference was expected but not received.
    pub fn reference_lost(&self) -> bool {
        self.contains(Self::REFERENCE_LOST)
    }
}

impl fmt::Display for StatusFlags {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        const NAMES: [(u8, &str); 8] = [
            (StatusFlags::TRIGGER_DETECTED, "TRG"),
            (StatusFlags::OPERATIONAL_LIMIT_REACHED, "OP"),
            (StatusFlags::RESET_OCCURRED, "UR"),
            (StatusFlags::TIME_ERROR, "TTE"),
            (StatusFlags::REFERENCE_LOST, "RL"),
            (StatusFlags::INPUT_REFERENCE_ENABLED, "RI"),
            (StatusFlags::OUTPUT_REFERENCE_ENABLED, "RO"),
            (StatusFlags::TRIGGER_DETECTED_MEMORY_FULL, "TRGFULL"),
        ];
        let set: Vec<&str> = NAMES
            .iter()
            .filter(|(mask, _)| self.contains(*mask))
            .map(|(_, name)| *name)
            .collect();
        write!(f, "0x{:02X} [{}]", self.0, set.join(" "))
    }
}

/// Reason for the most recent trigger, bits 0-2 of the status-2 byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TriggerReason {
    UserDefined,
    MinimumMagnitude,
    MaximumMagnitude,
    AngleDifference,
    Frequency,
    DfDt,
    LinearCombination,
    DigitalChannel,
}

/// GPS receiver status, bits 3-4 of the status-2 byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GpsStatus {
    Good,
    NoStatus1,
    NoStatus2,
    Bad,
}

/// The optional status-2 byte of a data frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Status2Flags(pub u8);

impl Status2Flags {
    pub const TRIGGER_REASON_MASK: u8 = 0x07;
    pub const GPS_STATUS_MASK: u8 = 0x18;
    pub const REFERENCE_INPUT_PORT: u8 = 0x20;
    pub const REFERENCE_OUTPUT_PORT: u8 = 0x40;
    pub const GPS_SYNCHRONIZATION: u8 = 0x80;

    pub fn trigger_reason(&self) -> TriggerReason {
        match self.0 & Self::TRIGGER_REASON_MASK {
            0b111 => TriggerReason::DigitalChannel,
            0b110 => TriggerReason::LinearCombination,
            0b101 => TriggerReason::DfDt,
            0b100 => TriggerReason::Frequency,
            0b011 => TriggerReason::AngleDifference,
            0b010 => TriggerReason::MaximumMagnitude,
            0b001 => TriggerReason::MinimumMagnitude,
            _ => TriggerReason::UserDefined,
        }
    }

    pub fn gps_status(&self) -> GpsStatus {
        match self.0 & Self::GPS_STATUS_MASK {
            0x00 => GpsStatus::Good,
            0x08 => GpsStatus::NoStatus1,
            0x10 => GpsStatus::NoStatus2,
            _ => GpsStatus::Bad,
        }
    }

    pub fn reference_input_port(&self) -> bool {
        self.0 & Self::REFERENCE_INPUT_PORT != 0
    }

    pub fn reference_output_port(&self) -> bool {
        self.0 & Self::REFERENCE_OUTPUT_PORT != 0
    }

    pub fn gps_synchronized(&self) -> bool {
        self.0 & Self::GPS_SYNCHRONIZATION != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_version_from_str() {
        assert_eq!("m".parse::<ProtocolVersion>().unwrap(), ProtocolVersion::M);
        assert_eq!(
            "1690G".parse::<ProtocolVersion>().unwrap(),
            ProtocolVersion::G
        );
        assert!(matches!(
            "1690X".parse::<ProtocolVersion>(),
            Err(FrameError::UnsupportedSubVersion { .. })
        ));
        assert_eq!(ProtocolVersion::G.to_string(), "1690G");
    }

    #[test]
    fn test_phasor_count_tracks_bits() {
        let none = OnlineDataFormatFlags::default();
        assert_eq!(none.phasor_count(), 1);
        assert!(none.phasor_enabled(1));
        assert!(!none.phasor_enabled(2));
        assert!(!none.phasor_enabled(11));

        let mut flags = OnlineDataFormatFlags::default();
        flags.insert(OnlineDataFormatFlags::PHASOR2_ENABLED);
        flags.insert(OnlineDataFormatFlags::PHASOR10_ENABLED);
        assert_eq!(flags.phasor_count(), 3);
        assert!(flags.phasor_enabled(10));

        let all = OnlineDataFormatFlags(0x3FFF);
        assert_eq!(all.phasor_count(), 10);
        assert_eq!(all.digital_count(), 2);
    }

    #[test]
    fn test_from_phasor_count() {
        for count in 1..=10 {
            let flags = OnlineDataFormatFlags::from_phasor_count(count);
            assert!(flags.timestamp_included());
            assert_eq!(flags.phasor_count(), count);
        }
        assert_eq!(OnlineDataFormatFlags::from_phasor_count(40).phasor_count(), 10);
        assert_eq!(OnlineDataFormatFlags::from_phasor_count(0).phasor_count(), 1);
    }

    #[test]
    fn test_with_phasor_count_keeps_other_flags() {
        let flags = OnlineDataFormatFlags(
            OnlineDataFormatFlags::STATUS2_BYTE_ENABLED
                | OnlineDataFormatFlags::DIGITAL2_ENABLED
                | OnlineDataFormatFlags::PHASOR9_ENABLED,
        );
        let rebound = flags.with_phasor_count(3);
        assert!(rebound.status2_included());
        assert!(rebound.digital2_included());
        assert!(!rebound.timestamp_included());
        assert_eq!(rebound.phasor_count(), 3);
        assert!(!rebound.phasor_enabled(9));
    }

    #[test]
    fn test_status2_decoding() {
        let status = Status2Flags(0b1011_0101);
        assert_eq!(status.trigger_reason(), TriggerReason::DfDt);
        assert_eq!(status.gps_status(), GpsStatus::NoStatus2);
        assert!(status.reference_input_port());
        assert!(!status.reference_output_port());
        assert!(status.gps_synchronized());

        for bits in 0..8u8 {
            // every trigger encoding maps to a reason
            let _ = Status2Flags(bits).trigger_reason();
        }
        assert_eq!(Status2Flags(0x18).gps_status(), GpsStatus::Bad);
        assert_eq!(Status2Flags(0x00).trigger_reason(), TriggerReason::UserDefined);
    }

    #[test]
    fn test_clock_status_lock() {
        assert!(ClockStatusFlags(0).time_is_locked());
        assert!(ClockStatusFlags(ClockStatusFlags::DAC_BEYOND_LIMITS).time_is_locked());
        assert!(!ClockStatusFlags(ClockStatusFlags::GPS_UNLOCKED).time_is_locked());
        assert!(!ClockStatusFlags(ClockStatusFlags::USING_LOCAL_TIME).time_is_locked());
    }

    #[test]
    fn test_status1_flags() {
        let status = StatusFlags(0x19);
        assert!(status.trigger_detected());
        assert!(status.time_error());
        assert!(status.reference_lost());
        assert!(!status.contains(StatusFlags::RESET_OCCURRED));
        assert_eq!(status.to_string(), "0x19 [TRG TTE RL]");
        assert_eq!(StatusFlags::default().to_string(), "0x00 []");
    }

    #[test]
    fn test_error_display() {
        let err = FrameError::ChecksumMismatch {
            expected: 0xF6,
            actual: 0x00,
        };
        assert_eq!(
            err.to_string(),
            "Checksum mismatch: expected 0xF6, found 0x00"
        );
    }
}
