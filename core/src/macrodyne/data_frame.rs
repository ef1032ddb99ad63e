//! # Macrodyne Data Frame Utilities
//!
//! This module parses and constructs Macrodyne data frames. The payload of a data frame
//! is not self-describing: which fields are present, and in what order, follows from the
//! device's online data format word and its sub-version. Both directions walk the
//! `LayoutPlan` of a `ResolvedView` field by field.
//!
//! ## Key Components
//!
//! - `DataFrameRecord`: One decoded frame: timestamp, status bytes, phasors, frequency,
//!   reference phasor and digital words.
//! - `ChecksumPolicy`: Whether a checksum mismatch rejects the frame or flags the record.
//! - `DataValue`: A single channel value in engineering units.
//! - `DataFrameMeasurements`: All channels of a record converted with the view's
//!   definitions.
//!
//! ## Usage
//!
//! Decoding requires a configured view; a frame seen before the device format is known
//! fails with `MissingConfiguration`. A frame whose length differs from the plan fails as
//! a whole. Frames without a timestamp block are stamped with the receive time and are
//! never synchronization-valid.

use super::common::{
    ClockStatusFlags, FrameError, FrameType, ProtocolVersion, Status2Flags, StatusFlags,
};
use super::config::ResolvedView;
use super::endian::EndianOrder;
use super::frame_header::CommonFrameHeader;
use super::layout::{FieldKind, LayoutPlan};
use super::phasors::{FrequencyValue, PhasorMeasurement, PhasorValue, ReferencePhasor};
use super::utils::{decode_timestamp, encode_timestamp, push_checksum, verify_checksum};
use bytes::{BufMut, BytesMut};
use chrono::{DateTime, Utc};
use log::warn;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// What to do with a data frame whose checksum does not match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ChecksumPolicy {
    /// Fail with `FrameError::ChecksumMismatch`.
    #[default]
    Reject,
    /// Deliver the record with `checksum_valid` cleared.
    Flag,
}

/// One decoded Macrodyne data frame.
///
/// # Fields
///
/// * `protocol_version`: Sub-version the frame was decoded with.
/// * `timestamp`: Device time, or the receive time when the frame has no timestamp block.
/// * `clock_status`: Clock status byte of the timestamp block, if present.
/// * `status2`: 1690M status-2 byte, if enabled.
/// * `status_flags`: 1690M status-1 byte last reported by the unit. Not part of the data
///   frame; copied from the configuration at decode time.
/// * `sample_number`: 1690G sample number.
/// * `phasors`: Phasor values in slot order.
/// * `frequency`: Frequency deviation and dF/dt.
/// * `reference`: Reference phasor block, if enabled.
/// * `digital1`, `digital2`: Digital words, if enabled.
/// * `checksum_valid`: False only for frames delivered under `ChecksumPolicy::Flag`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataFrameRecord {
    pub protocol_version: ProtocolVersion,
    pub timestamp: DateTime<Utc>,
    pub clock_status: Option<ClockStatusFlags>,
    pub status2: Option<Status2Flags>,
    pub status_flags: Option<StatusFlags>,
    pub sample_number: Option<u16>,
    pub phasors: Vec<PhasorValue>,
    pub frequency: FrequencyValue,
    pub reference: Option<ReferencePhasor>,
    pub digital1: Option<u16>,
    pub digital2: Option<u16>,
    pub checksum_valid: bool,
}

impl DataFrameRecord {
    /// An empty record for `protocol_version` stamped with `timestamp`.
    pub fn new(protocol_version: ProtocolVersion, timestamp: DateTime<Utc>) -> Self {
        DataFrameRecord {
            protocol_version,
            timestamp,
            clock_status: None,
            status2: None,
            status_flags: None,
            sample_number: None,
            phasors: Vec::new(),
            frequency: FrequencyValue::default(),
            reference: None,
            digital1: None,
            digital2: None,
            checksum_valid: true,
        }
    }

    /// Parses a data frame, rejecting checksum mismatches.
    ///
    /// # Parameters
    ///
    /// * `bytes`: The complete frame, sync byte through checksum.
    /// * `view`: Configuration snapshot supplying the layout.
    /// * `receive_time`: Local receive time; supplies the year and stands in for a
    ///   missing timestamp block.
    ///
    /// # Returns
    ///
    /// * `Ok(DataFrameRecord)`: The parsed record.
    /// * `Err(FrameError)`: `MissingConfiguration`, `UnrecognizedSyncByte`,
    ///   `UnsupportedSubVersion`, `TruncatedFrame`, `ChecksumMismatch` or `InvalidBcd`.
    pub fn from_hex(
        bytes: &[u8],
        view: &ResolvedView,
        receive_time: DateTime<Utc>,
    ) -> Result<Self, FrameError> {
        Self::from_hex_with_policy(bytes, view, receive_time, ChecksumPolicy::Reject)
    }

    /// Parses a data frame, handling a checksum mismatch according to `policy`.
    pub fn from_hex_with_policy(
        bytes: &[u8],
        view: &ResolvedView,
        receive_time: DateTime<Utc>,
        policy: ChecksumPolicy,
    ) -> Result<Self, FrameError> {
        if !view.configured {
            return Err(FrameError::MissingConfiguration {
                message: format!(
                    "{} data frame received before the online data format is known",
                    view.protocol_version
                ),
            });
        }
        let header = CommonFrameHeader::from_hex(bytes, view.protocol_version, None)?;
        if header.frame_type != FrameType::DataFrame {
            return Err(FrameError::UnrecognizedSyncByte {
                message: format!("expected a data frame, found a {}", header.frame_type),
            });
        }

        let plan = &view.layout;
        if bytes.len() < plan.frame_length {
            return Err(FrameError::TruncatedFrame {
                message: format!(
                    "format {} needs {} bytes, got {}",
                    plan.flags,
                    plan.frame_length,
                    bytes.len()
                ),
            });
        }
        if bytes.len() > plan.frame_length {
            return Err(FrameError::InvalidFormat {
                message: format!(
                    "format {} needs {} bytes, got {}",
                    plan.flags,
                    plan.frame_length,
                    bytes.len()
                ),
            });
        }

        let checksum_valid = match verify_checksum(bytes) {
            Ok(()) => true,
            Err(err) => match policy {
                ChecksumPolicy::Reject => return Err(err),
                ChecksumPolicy::Flag => {
                    warn!("Delivering {} data frame with bad checksum: {}", view.station_name, err);
                    false
                }
            },
        };

        let mut record = DataFrameRecord::new(view.protocol_version, receive_time);
        record.checksum_valid = checksum_valid;
        record.status_flags = view.status_flags;
        record.phasors.reserve(plan.phasor_count());

        let order = EndianOrder::BigEndian;
        let mut offset = header.length();
        for field in &plan.fields {
            let span = &bytes[offset..offset + field.width()];
            match field {
                FieldKind::Status2 => record.status2 = Some(Status2Flags(span[0])),
                FieldKind::SampleNumber => record.sample_number = Some(order.decode(span, 0)?),
                FieldKind::Timestamp => {
                    let (clock, timestamp) = decode_timestamp(span, receive_time)?;
                    record.clock_status = Some(clock);
                    record.timestamp = timestamp;
                }
                FieldKind::Phasor(_) => record.phasors.push(PhasorValue::from_hex(span)?),
                FieldKind::Frequency => record.frequency = FrequencyValue::from_hex(span)?,
                FieldKind::Reference => record.reference = Some(ReferencePhasor::from_hex(span)?),
                FieldKind::Digital(1) => record.digital1 = Some(order.decode(span, 0)?),
                FieldKind::Digital(_) => record.digital2 = Some(order.decode(span, 0)?),
            }
            offset += field.width();
        }
        Ok(record)
    }

    /// Converts the record to bytes using the layout of `view`.
    ///
    /// # Returns
    ///
    /// * `Ok(Vec<u8>)`: The frame, checksum included.
    /// * `Err(FrameError::MissingConfiguration)`: If the view is not configured.
    /// * `Err(FrameError::InvalidFormat)`: If the record lacks a field the layout
    ///   requires or carries a different number of phasors.
    pub fn to_hex(&self, view: &ResolvedView) -> Result<Vec<u8>, FrameError> {
        if !view.configured {
            return Err(FrameError::MissingConfiguration {
                message: format!(
                    "cannot encode a {} data frame without an online data format",
                    view.protocol_version
                ),
            });
        }
        self.to_hex_with_plan(&view.layout)
    }

    /// Converts the record to bytes following `plan`. Fields the plan omits are skipped.
    pub fn to_hex_with_plan(&self, plan: &LayoutPlan) -> Result<Vec<u8>, FrameError> {
        if self.phasors.len() != plan.phasor_count() {
            return Err(FrameError::InvalidFormat {
                message: format!(
                    "record has {} phasors, format {} carries {}",
                    self.phasors.len(),
                    plan.flags,
                    plan.phasor_count()
                ),
            });
        }
        let missing = |name: &str| FrameError::InvalidFormat {
            message: format!("format {} requires {}, record has none", plan.flags, name),
        };

        let header = CommonFrameHeader::new(FrameType::DataFrame, plan.protocol_version, None);
        let mut out = BytesMut::with_capacity(plan.frame_length);
        out.put_slice(&header.to_hex());

        let order = EndianOrder::BigEndian;
        let mut phasors = self.phasors.iter();
        for field in &plan.fields {
            match field {
                FieldKind::Status2 => out.put_u8(self.status2.ok_or_else(|| missing("status-2"))?.0),
                FieldKind::SampleNumber => {
                    let sample = self.sample_number.ok_or_else(|| missing("a sample number"))?;
                    order.put(sample, &mut out);
                }
                FieldKind::Timestamp => {
                    let clock = self.clock_status.ok_or_else(|| missing("a clock status"))?;
                    out.put_slice(&encode_timestamp(clock, &self.timestamp));
                }
                FieldKind::Phasor(slot) => {
                    let phasor = phasors
                        .next()
                        .ok_or_else(|| missing(&format!("phasor {}", slot)))?;
                    out.put_slice(&phasor.to_hex());
                }
                FieldKind::Frequency => out.put_slice(&self.frequency.to_hex()),
                FieldKind::Reference => {
                    let reference = self.reference.ok_or_else(|| missing("a reference phasor"))?;
                    out.put_slice(&reference.to_hex());
                }
                FieldKind::Digital(1) => {
                    order.put(self.digital1.ok_or_else(|| missing("digital 1"))?, &mut out)
                }
                FieldKind::Digital(_) => {
                    order.put(self.digital2.ok_or_else(|| missing("digital 2"))?, &mut out)
                }
            }
        }

        let mut frame = out.to_vec();
        push_checksum(&mut frame);
        Ok(frame)
    }

    /// Combined status word: status-2 in the high byte, clock status in the low byte.
    pub fn status(&self) -> u16 {
        let high = self.status2.map_or(0, |s| s.0);
        let low = self.clock_status.map_or(0, |c| c.0);
        u16::from(high) << 8 | u16::from(low)
    }

    /// True when the timestamp came from a locked device clock and, if status-2 is
    /// present, the device reports GPS synchronization.
    pub fn synchronization_is_valid(&self) -> bool {
        self.clock_status.is_some_and(|clock| clock.time_is_locked())
            && self.status2.map_or(true, |status| status.gps_synchronized())
    }

    /// Converts every channel with the definitions of `view`.
    pub fn to_measurements(&self, view: &ResolvedView) -> DataFrameMeasurements {
        DataFrameMeasurements {
            station_name: view.station_name.clone(),
            id_code: view.id_code,
            timestamp: self.timestamp,
            synchronization_is_valid: self.synchronization_is_valid(),
            phasors: self
                .phasors
                .iter()
                .zip(view.phasors.iter())
                .map(|(value, definition)| value.to_measurement(definition))
                .collect(),
            frequency: self.frequency.frequency_hz(&view.frequency),
            dfdt: self.frequency.dfdt_hz_per_second(&view.frequency),
            digitals: [self.digital1, self.digital2]
                .into_iter()
                .flatten()
                .collect(),
        }
    }

    /// Retrieves one channel by the name `ResolvedView::channel_names` gives it.
    ///
    /// # Returns
    ///
    /// * `Some(DataValue)`: The value in engineering units.
    /// * `None`: If the view has no such channel.
    pub fn get_value(&self, channel_name: &str, view: &ResolvedView) -> Option<DataValue> {
        if let Some(slot) = view.phasors.iter().position(|p| p.label == channel_name) {
            let value = self.phasors.get(slot)?;
            return Some(DataValue::Phasor(value.to_measurement(&view.phasors[slot])));
        }
        if channel_name == view.frequency.label {
            return Some(DataValue::Float(self.frequency.frequency_hz(&view.frequency)));
        }
        if channel_name == format!("{} dF/dt", view.frequency.label) {
            return Some(DataValue::Float(self.frequency.dfdt_hz_per_second(&view.frequency)));
        }
        let digital = view.digital_labels.iter().position(|l| l == channel_name)?;
        let words: Vec<u16> = [self.digital1, self.digital2].into_iter().flatten().collect();
        words.get(digital).map(|word| DataValue::Digital(*word))
    }

    /// Retrieves every channel of `view`.
    pub fn get_all_values(&self, view: &ResolvedView) -> HashMap<String, DataValue> {
        view.channel_names()
            .into_iter()
            .filter_map(|name| self.get_value(&name, view).map(|value| (name, value)))
            .collect()
    }
}

/// A channel value in engineering units.
///
/// # Variants
///
/// * `Phasor`: Scaled magnitude and angle.
/// * `Float`: Frequency in Hz or dF/dt in Hz/s.
/// * `Digital`: A raw 16-bit digital word.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum DataValue {
    Phasor(PhasorMeasurement),
    Float(f64),
    Digital(u16),
}

/// A record converted with the definitions of a `ResolvedView`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataFrameMeasurements {
    pub station_name: String,
    pub id_code: u16,
    pub timestamp: DateTime<Utc>,
    pub synchronization_is_valid: bool,
    pub phasors: Vec<PhasorMeasurement>,
    pub frequency: f64,
    pub dfdt: f64,
    pub digitals: Vec<u16>,
}
