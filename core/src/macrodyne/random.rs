//! # Macrodyne Test Frame Generator
//!
//! Builds random but self-consistent Macrodyne data for tests and benchmarks: format
//! words, description cells and data records whose fields match a layout plan exactly.
//!
//! ## Key Components
//!
//! - `seeded_rng`: A reproducible `StdRng`.
//! - `random_format_flags`: A random online data format word.
//! - `random_description_cell`: A description cell with randomly scaled channels.
//! - `random_data_record`: A record carrying exactly the fields a plan selects.
//! - `random_data_frame`: The encoded bytes of such a record.
//!
//! ## Usage
//!
//! Timestamps are whole seconds within the 30 days before the receive time, so decoding
//! the generated frame with the same receive time reproduces the record.

use super::common::{
    ClockStatusFlags, FrameError, OnlineDataFormatFlags, ProtocolVersion, Status2Flags,
};
use super::config::ResolvedView;
use super::data_frame::DataFrameRecord;
use super::description::{DeviceDescriptionCell, FrequencyDefinition, PhasorDefinition};
use super::layout::{FieldKind, LayoutPlan};
use super::phasors::{FrequencyValue, PhasorValue, ReferencePhasor};
use super::units::PhasorType;
use super::utils::truncate_to_second;
use chrono::{DateTime, Duration, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const TIMESTAMP_WINDOW_SECONDS: i64 = 30 * 86_400;

/// A generator that yields the same sequence for the same seed.
pub fn seeded_rng(seed: u64) -> StdRng {
    StdRng::seed_from_u64(seed)
}

/// A random format word with the unused high bits clear.
pub fn random_format_flags<R: Rng>(rng: &mut R) -> OnlineDataFormatFlags {
    OnlineDataFormatFlags(rng.random::<u16>() & !OnlineDataFormatFlags::UNUSED_BITS)
}

fn random_phasor<R: Rng>(rng: &mut R) -> PhasorValue {
    PhasorValue::new(rng.random(), rng.random())
}

/// Generates a description cell.
///
/// # Parameters
///
/// * `rng`: Random source.
/// * `index`: Used for the section name (`STN{index:02}`) and ID code.
/// * `phasor_count`: Number of phasor definitions.
pub fn random_description_cell<R: Rng>(
    rng: &mut R,
    index: usize,
    phasor_count: usize,
) -> DeviceDescriptionCell {
    let section = format!("STN{:02}_Substation", index);
    let phasors = (1..=phasor_count)
        .map(|n| {
            let current = rng.random_bool(0.5);
            PhasorDefinition {
                phasor_type: if current {
                    PhasorType::Current
                } else {
                    PhasorType::Voltage
                },
                ratio: f64::from(rng.random_range(1..5000u32)),
                calibration: f64::from(rng.random_range(1..10_000u32)) / 1_000_000.0,
                offset: f64::from(rng.random_range(-180..180i32)),
                shunt: if current { 1.0 } else { 0.0 },
                voltage_reference: if current { 1 } else { 500 },
                label: format!("PH_{:02}", n),
            }
        })
        .collect();
    DeviceDescriptionCell {
        label: section.chars().take(5).collect(),
        section,
        id_code: index as u16,
        station_name: format!("STATION{:02}", index),
        phasors,
        frequency: FrequencyDefinition::default(),
    }
}

/// Generates a record carrying exactly the fields of `plan`.
pub fn random_data_record<R: Rng>(
    rng: &mut R,
    plan: &LayoutPlan,
    receive_time: DateTime<Utc>,
) -> DataFrameRecord {
    let mut record = DataFrameRecord::new(plan.protocol_version, receive_time);
    for field in &plan.fields {
        match field {
            FieldKind::Status2 => record.status2 = Some(Status2Flags(rng.random())),
            FieldKind::SampleNumber => record.sample_number = Some(rng.random()),
            FieldKind::Timestamp => {
                let age = Duration::seconds(rng.random_range(0..TIMESTAMP_WINDOW_SECONDS));
                record.timestamp = truncate_to_second(receive_time) - age;
                record.clock_status = Some(ClockStatusFlags(rng.random()));
            }
            FieldKind::Phasor(_) => record.phasors.push(random_phasor(rng)),
            FieldKind::Frequency => {
                record.frequency = FrequencyValue {
                    frequency: rng.random_range(-500..500),
                    dfdt: rng.random_range(-1000..1000),
                }
            }
            FieldKind::Reference => {
                record.reference = Some(ReferencePhasor {
                    sample_number: rng.random(),
                    phasor: random_phasor(rng),
                })
            }
            FieldKind::Digital(1) => record.digital1 = Some(rng.random()),
            FieldKind::Digital(_) => record.digital2 = Some(rng.random()),
        }
    }
    record
}

/// Generates and encodes a record for `view`.
pub fn random_data_frame(
    view: &ResolvedView,
    receive_time: DateTime<Utc>,
) -> Result<Vec<u8>, FrameError> {
    let mut rng = rand::rng();
    random_data_record(&mut rng, &view.layout, receive_time).to_hex(view)
}

/// A configured view for a random format word.
pub fn random_view<R: Rng>(rng: &mut R, protocol_version: ProtocolVersion) -> ResolvedView {
    ResolvedView::local(protocol_version, random_format_flags(rng), "RANDOM")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_record_matches_plan() {
        let mut rng = seeded_rng(7);
        let receive_time = Utc.with_ymd_and_hms(2025, 1, 3, 0, 0, 0).unwrap();
        for _ in 0..100 {
            let view = random_view(&mut rng, ProtocolVersion::M);
            let record = random_data_record(&mut rng, &view.layout, receive_time);
            assert_eq!(record.phasors.len(), view.layout.phasor_count());
            assert_eq!(record.status2.is_some(), view.online_data_format.status2_included());
            assert_eq!(record.clock_status.is_some(), view.online_data_format.timestamp_included());
            assert!(record.timestamp <= receive_time);
            assert_eq!(record.to_hex(&view).unwrap().len(), view.layout.frame_length);
        }
    }

    #[test]
    fn test_seed_is_reproducible() {
        let a = random_format_flags(&mut seeded_rng(42));
        let b = random_format_flags(&mut seeded_rng(42));
        assert_eq!(a, b);
        assert_eq!(a.bits() & OnlineDataFormatFlags::UNUSED_BITS, 0);
    }

    #[test]
    fn test_description_cell() {
        let cell = random_description_cell(&mut seeded_rng(1), 3, 4);
        assert_eq!(cell.label, "STN03");
        assert_eq!(cell.phasors.len(), 4);
        assert_eq!(cell.phasors[3].label, "PH_04");
        assert!(cell
            .phasors
            .iter()
            .all(|p| p.phasor_type != PhasorType::Current || p.shunt == 1.0));
    }

    #[test]
    fn test_random_frame_decodes() {
        let view = ResolvedView::local(
            ProtocolVersion::G,
            OnlineDataFormatFlags::from_phasor_count(4),
            "RANDOM",
        );
        let receive_time = Utc::now();
        let frame = random_data_frame(&view, receive_time).unwrap();
        assert!(DataFrameRecord::from_hex(&frame, &view, receive_time).is_ok());
    }
}
