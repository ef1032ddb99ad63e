//! # Macrodyne Frame Classification
//!
//! Identifies the type of a contiguous candidate frame from its first bytes and builds
//! the transient `CommonFrameHeader` handed to the type-specific decoder.
//!
//! Data frames start with `0xAA` (1690M frames follow it with the fixed marker `0x02`).
//! Responses to request commands start with `0xBB` and echo the 16-bit request code:
//! `0xBB24` for the online data format and `0xBB48` for the unit ID. Anything else is
//! rejected; the classifier never retains partial state between calls.

use super::commands::DeviceCommand;
use super::common::{FrameError, FrameType, ProtocolVersion, StatusFlags};
use super::config::ResolvedView;
use super::endian::EndianOrder;
use std::sync::Arc;

/// Leading byte of every data frame.
pub const DATA_SYNC: u8 = 0xAA;

/// Leading byte of every request response.
pub const RESPONSE_SYNC: u8 = 0xBB;

/// Fixed byte following `DATA_SYNC` in 1690M data frames.
pub const M_DATA_MARKER: u8 = 0x02;

/// Outcome of classifying a candidate buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassifierState {
    AwaitingSync,
    DataFrame,
    ConfigurationFrame,
    HeaderFrame,
    Error,
}

impl ClassifierState {
    pub fn frame_type(&self) -> Option<FrameType> {
        match self {
            ClassifierState::DataFrame => Some(FrameType::DataFrame),
            ClassifierState::ConfigurationFrame => Some(FrameType::ConfigurationFrame),
            ClassifierState::HeaderFrame => Some(FrameType::HeaderFrame),
            ClassifierState::AwaitingSync | ClassifierState::Error => None,
        }
    }
}

/// Classifies a buffer without building any parsing state.
///
/// Empty buffers stay in `AwaitingSync`; every unrecognized prefix is `Error`.
pub fn classify(buffer: &[u8], version: ProtocolVersion) -> ClassifierState {
    match buffer.first() {
        None => ClassifierState::AwaitingSync,
        Some(&DATA_SYNC) => match version {
            ProtocolVersion::M => match buffer.get(1) {
                Some(&M_DATA_MARKER) => ClassifierState::DataFrame,
                _ => ClassifierState::Error,
            },
            ProtocolVersion::G => ClassifierState::DataFrame,
        },
        Some(&RESPONSE_SYNC) => match EndianOrder::BigEndian.decode::<u16>(buffer, 0) {
            Ok(code) if code == DeviceCommand::RequestOnlineDataFormat.code() => {
                ClassifierState::ConfigurationFrame
            }
            Ok(code) if code == DeviceCommand::RequestUnitIDBufferValue.code() => {
                ClassifierState::HeaderFrame
            }
            _ => ClassifierState::Error,
        },
        Some(_) => ClassifierState::Error,
    }
}

/// Per-frame parsing state shared by all Macrodyne frame types.
///
/// # Fields
///
/// * `frame_type`: Detected or constructed frame type.
/// * `protocol_version`: Sub-protocol the frame belongs to.
/// * `data_marker`: The byte following the data sync on 1690M frames.
/// * `status_flags`: Status-1 byte of the unit for 1690M data frames, once reported.
/// * `configuration`: Snapshot of the device configuration, absent until the device
///   format is known.
#[derive(Debug, Clone)]
pub struct CommonFrameHeader {
    pub frame_type: FrameType,
    pub protocol_version: ProtocolVersion,
    pub data_marker: Option<u8>,
    pub status_flags: Option<StatusFlags>,
    pub configuration: Option<Arc<ResolvedView>>,
}

impl CommonFrameHeader {
    /// Builds a header for an outbound frame.
    pub fn new(
        frame_type: FrameType,
        protocol_version: ProtocolVersion,
        configuration: Option<Arc<ResolvedView>>,
    ) -> Self {
        let m_data = frame_type == FrameType::DataFrame && protocol_version == ProtocolVersion::M;
        let status_flags = configuration
            .as_ref()
            .and_then(|view| view.status_flags)
            .filter(|_| m_data);
        CommonFrameHeader {
            frame_type,
            protocol_version,
            data_marker: m_data.then_some(M_DATA_MARKER),
            status_flags,
            configuration,
        }
    }

    /// Classifies `bytes` and builds the header for the detected frame type.
    ///
    /// # Returns
    ///
    /// * `Ok(CommonFrameHeader)`: Header for a data, configuration or header frame.
    /// * `Err(FrameError::UnrecognizedSyncByte)`: Unknown leading byte or echo code.
    /// * `Err(FrameError::UnsupportedSubVersion)`: A 1690M data frame without its marker.
    pub fn from_hex(
        bytes: &[u8],
        protocol_version: ProtocolVersion,
        configuration: Option<Arc<ResolvedView>>,
    ) -> Result<Self, FrameError> {
        match classify(bytes, protocol_version) {
            ClassifierState::AwaitingSync => Err(FrameError::TruncatedFrame {
                message: "empty buffer".to_string(),
            }),
            ClassifierState::Error => Err(Self::classification_error(bytes, protocol_version)),
            state => {
                let frame_type = state
                    .frame_type()
                    .ok_or_else(|| Self::classification_error(bytes, protocol_version))?;
                Ok(CommonFrameHeader::new(frame_type, protocol_version, configuration))
            }
        }
    }

    /// Bytes preceding the payload for this frame type.
    pub fn to_hex(&self) -> Vec<u8> {
        match self.frame_type {
            FrameType::DataFrame => {
                let mut out = vec![DATA_SYNC];
                out.extend(self.data_marker);
                out
            }
            FrameType::ConfigurationFrame => DeviceCommand::RequestOnlineDataFormat
                .code()
                .to_be_bytes()
                .to_vec(),
            FrameType::HeaderFrame => DeviceCommand::RequestUnitIDBufferValue
                .code()
                .to_be_bytes()
                .to_vec(),
            FrameType::CommandFrame => Vec::new(),
        }
    }

    /// Number of bytes `to_hex` produces.
    pub fn length(&self) -> usize {
        match self.frame_type {
            FrameType::DataFrame => 1 + usize::from(self.data_marker.is_some()),
            FrameType::ConfigurationFrame | FrameType::HeaderFrame => 2,
            FrameType::CommandFrame => 0,
        }
    }

    fn classification_error(bytes: &[u8], version: ProtocolVersion) -> FrameError {
        match bytes {
            [DATA_SYNC, rest @ ..] => FrameError::UnsupportedSubVersion {
                message: format!(
                    "{} data frame marker {:02X?} is not 0x{:02X}",
                    version,
                    rest.first(),
                    M_DATA_MARKER
                ),
            },
            [RESPONSE_SYNC, rest @ ..] => FrameError::UnrecognizedSyncByte {
                message: format!("unknown response echo 0xBB{:02X?}", rest.first()),
            },
            [first, ..] => FrameError::UnrecognizedSyncByte {
                message: format!("0x{:02X} does not start a Macrodyne frame", first),
            },
            [] => FrameError::TruncatedFrame {
                message: "empty buffer".to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_prefixes() {
        assert_eq!(
            classify(&[0xAA, 0x02, 0x00], ProtocolVersion::M),
            ClassifierState::DataFrame
        );
        assert_eq!(
            classify(&[0xAA, 0x13], ProtocolVersion::G),
            ClassifierState::DataFrame
        );
        assert_eq!(
            classify(&[0xBB, 0x24, 0x00, 0x02, 0x26], ProtocolVersion::M),
            ClassifierState::ConfigurationFrame
        );
        assert_eq!(
            classify(&[0xBB, 0x48], ProtocolVersion::G),
            ClassifierState::HeaderFrame
        );
        assert_eq!(classify(&[], ProtocolVersion::M), ClassifierState::AwaitingSync);
    }

    #[test]
    fn test_m_marker_is_required() {
        assert_eq!(classify(&[0xAA], ProtocolVersion::M), ClassifierState::Error);
        assert_eq!(
            classify(&[0xAA, 0x03], ProtocolVersion::M),
            ClassifierState::Error
        );
        assert!(matches!(
            CommonFrameHeader::from_hex(&[0xAA, 0x03], ProtocolVersion::M, None),
            Err(FrameError::UnsupportedSubVersion { .. })
        ));
    }

    #[test]
    fn test_classification_is_total() {
        for version in [ProtocolVersion::M, ProtocolVersion::G] {
            for first in 0..=255u8 {
                let state = classify(&[first], version);
                if first != 0xAA {
                    assert_eq!(state, ClassifierState::Error);
                }
                for second in 0..=255u8 {
                    let buffer = [first, second];
                    let state = classify(&buffer, version);
                    let expected = match (first, second) {
                        (0xAA, 0x02) => ClassifierState::DataFrame,
                        (0xAA, _) if version == ProtocolVersion::G => ClassifierState::DataFrame,
                        (0xBB, 0x24) => ClassifierState::ConfigurationFrame,
                        (0xBB, 0x48) => ClassifierState::HeaderFrame,
                        _ => ClassifierState::Error,
                    };
                    assert_eq!(state, expected, "buffer {:02X?} on {}", buffer, version);
                    let header = CommonFrameHeader::from_hex(&buffer, version, None);
                    assert_eq!(header.is_ok(), expected != ClassifierState::Error);
                }
            }
        }
    }

    #[test]
    fn test_header_bytes() {
        let m = CommonFrameHeader::new(FrameType::DataFrame, ProtocolVersion::M, None);
        assert_eq!(m.to_hex(), vec![0xAA, 0x02]);
        assert_eq!(m.length(), 2);
        let g = CommonFrameHeader::new(FrameType::DataFrame, ProtocolVersion::G, None);
        assert_eq!(g.to_hex(), vec![0xAA]);
        assert_eq!(g.length(), 1);
        let cfg = CommonFrameHeader::new(FrameType::ConfigurationFrame, ProtocolVersion::M, None);
        assert_eq!(cfg.to_hex(), vec![0xBB, 0x24]);
        let hdr = CommonFrameHeader::new(FrameType::HeaderFrame, ProtocolVersion::M, None);
        assert_eq!(hdr.to_hex(), vec![0xBB, 0x48]);
    }

    #[test]
    fn test_status_flags_on_m_data_headers() {
        let mut view = ResolvedView::local(
            ProtocolVersion::M,
            crate::macrodyne::common::OnlineDataFormatFlags::default(),
            "SUB1",
        );
        view.status_flags = Some(StatusFlags(StatusFlags::RESET_OCCURRED));
        let view = Arc::new(view);

        let header =
            CommonFrameHeader::from_hex(&[0xAA, 0x02], ProtocolVersion::M, Some(view.clone()))
                .unwrap();
        assert_eq!(header.status_flags, Some(StatusFlags(StatusFlags::RESET_OCCURRED)));
        let header =
            CommonFrameHeader::from_hex(&[0xBB, 0x24], ProtocolVersion::M, Some(view)).unwrap();
        assert!(header.status_flags.is_none());
        let header = CommonFrameHeader::from_hex(&[0xAA, 0x02], ProtocolVersion::M, None).unwrap();
        assert!(header.status_flags.is_none());
    }

    #[test]
    fn test_error_kinds() {
        assert!(matches!(
            CommonFrameHeader::from_hex(&[0x55, 0x00], ProtocolVersion::M, None),
            Err(FrameError::UnrecognizedSyncByte { .. })
        ));
        assert!(matches!(
            CommonFrameHeader::from_hex(&[0xBB, 0x22], ProtocolVersion::M, None),
            Err(FrameError::UnrecognizedSyncByte { .. })
        ));
        assert!(matches!(
            CommonFrameHeader::from_hex(&[], ProtocolVersion::M, None),
            Err(FrameError::TruncatedFrame { .. })
        ));
    }
}
