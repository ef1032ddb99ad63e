//! # Macrodyne Command Frames
//!
//! This module builds the 3-byte command frames sent to a Macrodyne device: a big-endian
//! 16-bit native command code followed by the XOR checksum of both code bytes.
//!
//! ## Key Components
//!
//! - `DeviceCommand`: The native command table, set commands (`0xCCxx`), request
//!   commands (`0xBBxx`) and `Undefined`.
//! - `DataInputCommand`: Single-byte commands preceding data written to the device.
//! - `CommandType`: Protocol-neutral commands issued by a phasor data concentrator.
//! - `CommandFrame`: A native command ready for transmission.
//!
//! ## Usage
//!
//! `CommandFrame::new` translates a `CommandType` and fails with
//! `FrameError::UnsupportedCommand` before any bytes exist when the device has no
//! equivalent. `CommandFrame::from_device_command` sends a native code directly.

use super::common::{FrameError, ProtocolVersion};
use super::endian::EndianOrder;
use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! device_commands {
    ($($name:ident = $code:literal,)*) => {
        /// Native Macrodyne command codes.
        #[allow(clippy::enum_variant_names)]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum DeviceCommand {
            $($name,)*
        }

        impl DeviceCommand {
            /// Every known command, in code order within each group.
            pub const ALL: &'static [DeviceCommand] = &[$(DeviceCommand::$name,)*];

            pub fn code(&self) -> u16 {
                match self {
                    $(DeviceCommand::$name => $code,)*
                }
            }

            pub fn name(&self) -> &'static str {
                match self {
                    $(DeviceCommand::$name => stringify!($name),)*
                }
            }
        }

        impl TryFrom<u16> for DeviceCommand {
            type Error = FrameError;

            fn try_from(value: u16) -> Result<Self, Self::Error> {
                match value {
                    $($code => Ok(DeviceCommand::$name),)*
                    other => Err(FrameError::UnsupportedCommand {
                        message: format!("0x{:04X} is not a Macrodyne command code", other),
                    }),
                }
            }
        }
    };
}

device_commands! {
    SelectEvent1 = 0xCC20,
    SelectEvent2 = 0xCC21,
    SelectEvent3 = 0xCC22,
    SelectEvent4 = 0xCC23,
    SelectEvent5 = 0xCC24,
    SelectEvent6 = 0xCC25,
    SelectEvent7 = 0xCC26,
    SelectEvent8 = 0xCC27,
    SelectEvent9 = 0xCC28,
    SelectEvent10 = 0xCC29,
    SelectEvent11 = 0xCC2A,
    SelectEvent12 = 0xCC2B,
    SelectEvent13 = 0xCC2C,
    SelectEvent14 = 0xCC2D,
    SelectEvent15 = 0xCC2E,
    SelectEvent16 = 0xCC2F,
    EraseSelectedEvent = 0xCC30,
    ForceEvent = 0xCC32,
    SetOneSecondPreTriggerValue = 0xCC34,
    SetExtendedPreTriggerValue = 0xCC36,
    SetUnitID = 0xCC38,
    StartOnlineData = 0xCC3A,
    StopOnlineData = 0xCC3C,
    StartSendingReferencePort1 = 0xCC3E,
    StartSendingReferencePort2 = 0xCC40,
    StopSendingReference = 0xCC42,
    EnableReferenceReception = 0xCC44,
    DisableReferenceReception = 0xCC46,
    RebootUnit = 0xCC48,
    ResetUnitAndFlags = 0xCC4A,
    Set2CycleOutputRate = 0xCC4C,
    Set5CycleOutputRate = 0xCC4E,
    Set10CycleOutputRate = 0xCC50,
    Use5Phasors = 0xCC52,
    Use4Phasors = 0xCC54,
    Use3Phasors = 0xCC56,
    Use2Phasors = 0xCC58,
    Use1Phasor = 0xCC5A,
    SetMScaleValue = 0xCC5C,
    EnableAllTriggers = 0xCC5E,
    DisableAllTriggers = 0xCC60,
    SetVMinTrigger = 0xCC62,
    SetVMaxTrigger = 0xCC64,
    SetAngdTrigger = 0xCC66,
    SetFreqTrigger = 0xCC68,
    SetDfDtTrigger = 0xCC6A,
    SetLncmTrigger = 0xCC6C,
    SetVCoefValue = 0xCC6E,
    SetFCoefValue = 0xCC70,
    SetDCoefValue = 0xCC72,
    SetNrmDigState = 0xCC74,
    SetDigEnbTrigger = 0xCC76,
    ResetOnlineDataFormat = 0xCC78,
    AddSecondStatus = 0xCC7A,
    AddTimeStamp = 0xCC7C,
    AddSecondPhasor = 0xCC7E,
    AddThirdPhasor = 0xCC80,
    AddFourthPhasor = 0xCC82,
    AddFifthPhasor = 0xCC84,
    AddReferencePhasor = 0xCC86,
    SetVMinOperationalLimit = 0xCC88,
    SetVMaxOperationalLimit = 0xCC8A,
    SetAngdOperationalLimit = 0xCC8C,
    SetFreqOperationalLimit = 0xCC8E,
    SetDfDtOperationalLimit = 0xCC90,
    SetLncmOperationalLimit = 0xCC92,
    SetDigitalOperationalLimit = 0xCC94,
    ResetOperationalLimitCounters = 0xCC96,
    AddDigitals = 0xCC98,
    SetPhasorType = 0xCC9A,
    SetGpsTransparentMode = 0xCC9C,
    SendCommandToSecondBoard = 0xCC9E,
    SetDigitalsTo16 = 0xCCA0,
    SetDigitalsTo32 = 0xCCA2,
    SetRawPreTriggerValue = 0xCCA4,
    StartDebugMode = 0xCCA6,
    RequestStatus1Flags = 0xBB20,
    RequestStatus2Flags = 0xBB22,
    RequestOnlineDataFormat = 0xBB24,
    RequestOperationalLimitFlags = 0xBB26,
    RequestWordBufferValue = 0xBB28,
    RequestByteBufferValue = 0xBB2A,
    RequestTimeTagValue = 0xBB2C,
    RequestUnitStatus = 0xBB2E,
    RequestAnalogTriggerValues = 0xBB30,
    RequestVMinTriggerValue = 0xBB32,
    RequestVMaxTriggerValue = 0xBB34,
    RequestAngdTriggerValue = 0xBB36,
    RequestFreqTriggerValue = 0xBB38,
    RequestDfDtTriggerValue = 0xBB3A,
    RequestLncmTriggerValue = 0xBB3C,
    RequestVCoefTriggerValue = 0xBB3E,
    RequestFCoefTriggerValue = 0xBB40,
    RequestDCoefTriggerValue = 0xBB42,
    RequestDigitalsNormalState = 0xBB44,
    RequestDigitalsTriggerEnabledState = 0xBB46,
    RequestUnitIDBufferValue = 0xBB48,
    RequestPhasorType = 0xBB4A,
    RequestOneSecondTableLine = 0xBB4C,
    RequestExtendedTableLine = 0xBB4E,
    RequestPreviousTableLine = 0xBB50,
    RequestTableTimeInformation = 0xBB52,
    RequestTableTriggerInformation = 0xBB54,
    RequestTableWithFreezeReason = 0xBB56,
    RequestTimeOfFreezeTableSize = 0xBB58,
    RequestTimeOfFreezeTables = 0xBB5A,
    RequestOperationalLimitsValue = 0xBB5C,
    RequestOperationalCountersValue = 0xBB5E,
    RequestOperationalDigitalCountsValue = 0xBB60,
    RequestRawTableLine = 0xBB62,
    RequestRawTableInformation = 0xBB64,
    RequestCurrentRawTablePreTrigger = 0xBB66,
    Undefined = 0x0000,
}

impl DeviceCommand {
    /// True for `0xBBxx` commands, which the device answers with an echoed response.
    pub fn is_request(&self) -> bool {
        self.code() >> 8 == 0xBB
    }
}

impl fmt::Display for DeviceCommand {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} (0x{:04X})", self.name(), self.code())
    }
}

/// Single-byte commands announcing data written to the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataInputCommand {
    SendReferencePhasor = 0xA0,
    SendWordData = 0xA2,
    SendUnitIDData = 0xA4,
    SendByteData = 0xA6,
}

impl TryFrom<u8> for DataInputCommand {
    type Error = FrameError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0xA0 => Ok(DataInputCommand::SendReferencePhasor),
            0xA2 => Ok(DataInputCommand::SendWordData),
            0xA4 => Ok(DataInputCommand::SendUnitIDData),
            0xA6 => Ok(DataInputCommand::SendByteData),
            other => Err(FrameError::UnsupportedCommand {
                message: format!("0x{:02X} is not a data input command", other),
            }),
        }
    }
}

/// Protocol-neutral commands a concentrator issues to any device.
///
/// # Variants
///
/// * `DisableRealTimeData`: Stop the data stream.
/// * `EnableRealTimeData`: Start the data stream.
/// * `SendHeaderFrame`: Request the header (unit ID).
/// * `SendConfigurationFrame1`: Request configuration frame 1.
/// * `SendConfigurationFrame2`: Request configuration frame 2.
/// * `SendConfigurationFrame3`: Request configuration frame 3.
/// * `SendLatestConfigurationFrameVersion`: Request the newest configuration frame.
/// * `ExtendedFrame`: Send an extended command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommandType {
    DisableRealTimeData,
    EnableRealTimeData,
    SendHeaderFrame,
    SendConfigurationFrame1,
    SendConfigurationFrame2,
    SendConfigurationFrame3,
    SendLatestConfigurationFrameVersion,
    ExtendedFrame,
}

impl fmt::Display for CommandType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            CommandType::DisableRealTimeData => "Disable real-time data",
            CommandType::EnableRealTimeData => "Enable real-time data",
            CommandType::SendHeaderFrame => "Send header frame",
            CommandType::SendConfigurationFrame1 => "Send configuration frame 1",
            CommandType::SendConfigurationFrame2 => "Send configuration frame 2",
            CommandType::SendConfigurationFrame3 => "Send configuration frame 3",
            CommandType::SendLatestConfigurationFrameVersion => {
                "Send latest configuration frame version"
            }
            CommandType::ExtendedFrame => "Extended frame",
        };
        write!(f, "{}", name)
    }
}

/// Translates a neutral command into a native code.
///
/// A 1690M device reports its unit ID before its data format, so configuration requests
/// made while the unit ID is still unknown ask for the unit ID first. 1690G devices take
/// their identity from the description file and have no header request.
///
/// # Parameters
///
/// * `command`: The neutral command.
/// * `version`: Sub-protocol of the target device.
/// * `unit_id_known`: Whether a header frame has already been received.
pub fn map_command(
    command: CommandType,
    version: ProtocolVersion,
    unit_id_known: bool,
) -> Result<DeviceCommand, FrameError> {
    match (command, version) {
        (CommandType::EnableRealTimeData, _) => Ok(DeviceCommand::StartOnlineData),
        (CommandType::DisableRealTimeData, _) => Ok(DeviceCommand::StopOnlineData),
        (CommandType::SendHeaderFrame, ProtocolVersion::M) => {
            Ok(DeviceCommand::RequestUnitIDBufferValue)
        }
        (
            CommandType::SendConfigurationFrame1 | CommandType::SendConfigurationFrame2,
            ProtocolVersion::M,
        ) if !unit_id_known => Ok(DeviceCommand::RequestUnitIDBufferValue),
        (CommandType::SendConfigurationFrame1 | CommandType::SendConfigurationFrame2, _) => {
            Ok(DeviceCommand::RequestOnlineDataFormat)
        }
        (other, version) => Err(FrameError::UnsupportedCommand {
            message: format!("{} is not supported by {} devices", other, version),
        }),
    }
}

/// A native command ready to send.
///
/// # Fields
///
/// * `command`: The native command.
/// * `protocol_version`: Sub-protocol of the target device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandFrame {
    pub command: DeviceCommand,
    pub protocol_version: ProtocolVersion,
}

impl CommandFrame {
    /// Encoded size: two code bytes and the checksum.
    pub const LENGTH: usize = 3;

    /// Builds a frame for a neutral command, assuming the unit ID is already known.
    pub fn new(command: CommandType, protocol_version: ProtocolVersion) -> Result<Self, FrameError> {
        Self::for_session(command, protocol_version, true)
    }

    /// Builds a frame for a neutral command given the handshake progress.
    pub fn for_session(
        command: CommandType,
        protocol_version: ProtocolVersion,
        unit_id_known: bool,
    ) -> Result<Self, FrameError> {
        Ok(CommandFrame {
            command: map_command(command, protocol_version, unit_id_known)?,
            protocol_version,
        })
    }

    /// Builds a frame for a native command. `Undefined` is rejected.
    pub fn from_device_command(
        command: DeviceCommand,
        protocol_version: ProtocolVersion,
    ) -> Result<Self, FrameError> {
        if command == DeviceCommand::Undefined {
            return Err(FrameError::UnsupportedCommand {
                message: "the undefined command cannot be sent".to_string(),
            });
        }
        Ok(CommandFrame {
            command,
            protocol_version,
        })
    }

    /// Parses a command frame, as a device or test harness would receive it.
    pub fn from_hex(bytes: &[u8], protocol_version: ProtocolVersion) -> Result<Self, FrameError> {
        if bytes.len() != Self::LENGTH {
            return Err(FrameError::TruncatedFrame {
                message: format!("command frame is 3 bytes, got {}", bytes.len()),
            });
        }
        let code: u16 = EndianOrder::BigEndian.decode(bytes, 0)?;
        let expected = bytes[0] ^ bytes[1];
        if bytes[2] != expected {
            return Err(FrameError::ChecksumMismatch {
                expected,
                actual: bytes[2],
            });
        }
        Self::from_device_command(DeviceCommand::try_from(code)?, protocol_version)
    }

    /// Serializes the frame: big-endian code followed by the XOR of both code bytes.
    pub fn to_hex(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::LENGTH);
        EndianOrder::BigEndian.put(self.command.code(), &mut out);
        let chk = out.iter().fold(0u8, |acc, byte| acc ^ byte);
        out.push(chk);
        out
    }
}
