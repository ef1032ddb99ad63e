//! # Macrodyne Frame Parser
//!
//! Ties the classifier, the configuration model and the per-type decoders together for
//! one device link, and proposes the commands that move the link from connected to
//! streaming.
//!
//! A 1690M device identifies itself: the host asks for the unit ID, then for the online
//! data format, then starts the stream. A 1690G device has no header or format request;
//! its layout comes from the description file, so the host starts the stream directly.

use super::commands::{CommandFrame, CommandType};
use super::common::{FrameError, FrameType, ProtocolVersion};
use super::config::{ConfigurationFrame, ConfigurationModel, ResolvedView};
use super::connection::ConnectionParameters;
use super::data_frame::{ChecksumPolicy, DataFrameRecord};
use super::frame_header::CommonFrameHeader;
use super::header_frame::{HeaderFrame, StatusFrame};
use super::utils::verify_checksum;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

/// A decoded inbound frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ParsedFrame {
    Data(DataFrameRecord),
    Configuration(ConfigurationFrame),
    Header(HeaderFrame),
}

impl ParsedFrame {
    pub fn frame_type(&self) -> FrameType {
        match self {
            ParsedFrame::Data(_) => FrameType::DataFrame,
            ParsedFrame::Configuration(_) => FrameType::ConfigurationFrame,
            ParsedFrame::Header(_) => FrameType::HeaderFrame,
        }
    }
}

/// Stateful decoder for one device link.
///
/// # Fields
///
/// * `model`: Shared configuration of the device.
/// * `checksum_policy`: Applied to data frames. Configuration and header responses with
///   a bad checksum are always rejected.
pub struct FrameParser {
    model: Arc<ConfigurationModel>,
    checksum_policy: ChecksumPolicy,
}

impl FrameParser {
    pub fn new(model: Arc<ConfigurationModel>) -> Self {
        FrameParser {
            model,
            checksum_policy: ChecksumPolicy::default(),
        }
    }

    /// Builds a parser and its model from connection parameters.
    pub fn from_parameters(parameters: &ConnectionParameters) -> Result<Self, FrameError> {
        Ok(FrameParser::new(Arc::new(ConfigurationModel::from_parameters(
            parameters,
        )?)))
    }

    pub fn with_checksum_policy(mut self, checksum_policy: ChecksumPolicy) -> Self {
        self.checksum_policy = checksum_policy;
        self
    }

    pub fn model(&self) -> &Arc<ConfigurationModel> {
        &self.model
    }

    pub fn protocol_version(&self) -> ProtocolVersion {
        self.model.protocol_version()
    }

    pub fn snapshot(&self) -> Arc<ResolvedView> {
        self.model.snapshot()
    }

    /// Decodes one complete frame.
    ///
    /// Configuration and header responses update the model before they are returned. A
    /// data frame is decoded against the view current at the start of the call.
    ///
    /// # Parameters
    ///
    /// * `bytes`: One contiguous candidate frame.
    /// * `receive_time`: Local receive time of the frame.
    pub fn parse(
        &self,
        bytes: &[u8],
        receive_time: DateTime<Utc>,
    ) -> Result<ParsedFrame, FrameError> {
        if self.model.refresh_on_change() {
            self.model.refresh_if_changed();
        }
        let header =
            CommonFrameHeader::from_hex(bytes, self.protocol_version(), Some(self.model.snapshot()))?;
        match header.frame_type {
            FrameType::DataFrame => {
                let view = header.configuration.ok_or_else(|| FrameError::MissingConfiguration {
                    message: "no configuration snapshot".to_string(),
                })?;
                let record = DataFrameRecord::from_hex_with_policy(
                    bytes,
                    &view,
                    receive_time,
                    self.checksum_policy,
                )?;
                Ok(ParsedFrame::Data(record))
            }
            FrameType::ConfigurationFrame => {
                let frame = ConfigurationFrame::from_hex(bytes)?;
                verify_checksum(bytes)?;
                self.model.apply_configuration_frame(&frame);
                Ok(ParsedFrame::Configuration(frame))
            }
            FrameType::HeaderFrame => {
                let frame = HeaderFrame::from_hex(bytes)?;
                verify_checksum(bytes)?;
                self.model.apply_header_frame(&frame);
                Ok(ParsedFrame::Header(frame))
            }
            FrameType::CommandFrame => Err(FrameError::UnrecognizedSyncByte {
                message: "command frames are never received".to_string(),
            }),
        }
    }

    /// Decodes the reply to a `RequestStatus1Flags` command and records it in the model.
    ///
    /// Status replies share the `0xBB` sync with the other responses but are only expected
    /// right after the request, so they bypass `parse`.
    pub fn parse_status_response(&self, bytes: &[u8]) -> Result<StatusFrame, FrameError> {
        let frame = StatusFrame::from_hex(bytes)?;
        verify_checksum(bytes)?;
        self.model.apply_status_frame(&frame);
        Ok(frame)
    }

    /// Builds a command for this device given the handshake progress so far.
    pub fn command(&self, command: CommandType) -> Result<CommandFrame, FrameError> {
        CommandFrame::for_session(
            command,
            self.protocol_version(),
            self.model.unit_id().is_some(),
        )
    }

    /// Commands to send once the link is open.
    pub fn initial_commands(&self) -> Result<Vec<CommandFrame>, FrameError> {
        let second = match self.protocol_version() {
            ProtocolVersion::M => CommandType::SendHeaderFrame,
            ProtocolVersion::G => CommandType::EnableRealTimeData,
        };
        Ok(vec![
            self.command(CommandType::DisableRealTimeData)?,
            self.command(second)?,
        ])
    }

    /// The command that should follow a parsed frame, if any.
    pub fn follow_up_command(&self, frame: &ParsedFrame) -> Option<CommandFrame> {
        let next = match frame {
            ParsedFrame::Header(_) => CommandType::SendConfigurationFrame2,
            ParsedFrame::Configuration(_) => CommandType::EnableRealTimeData,
            ParsedFrame::Data(_) => return None,
        };
        self.command(next).ok()
    }
}
