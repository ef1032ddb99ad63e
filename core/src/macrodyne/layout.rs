//! # Data Frame Layout Plans
//!
//! A Macrodyne data frame is a fixed header, a sequence of optional fields selected by
//! the online data format word, and a checksum byte. The order of those fields differs
//! between 1690M and 1690G, so each sub-version has its own declarative table of
//! `(gate, field)` pairs. Evaluating a table against a format word yields a
//! `LayoutPlan`: the exact field sequence and total frame length that decoding and
//! encoding walk in a single pass.
//!
//! 1690M: `AA 02 [status2] [timestamp] P1 [P2..P5] FREQ [reference] [digital1] [P6..P10]
//! [digital2] CHK`
//!
//! 1690G: `AA sample [timestamp] P1 [P2..P10] [P11..] [reference] FREQ [digital1]
//! [digital2] CHK`

use super::common::{FrameError, OnlineDataFormatFlags, ProtocolVersion};
use super::phasors::{FrequencyValue, PhasorValue, ReferencePhasor};
use super::utils::TIMESTAMP_BLOCK_SIZE;
use serde::Serialize;

/// One field of a data frame payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FieldKind {
    Status2,
    SampleNumber,
    Timestamp,
    /// Phasor slot, 1-based.
    Phasor(usize),
    Frequency,
    Reference,
    /// Digital word, 1 or 2.
    Digital(usize),
}

impl FieldKind {
    pub fn width(&self) -> usize {
        match self {
            FieldKind::Status2 => 1,
            FieldKind::SampleNumber => 2,
            FieldKind::Timestamp => TIMESTAMP_BLOCK_SIZE,
            FieldKind::Phasor(_) => PhasorValue::SIZE,
            FieldKind::Frequency => FrequencyValue::SIZE,
            FieldKind::Reference => ReferencePhasor::SIZE,
            FieldKind::Digital(_) => 2,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Gate {
    Always,
    Flag(u16),
    /// 1690G channels beyond the ten selectable by the format word.
    AdditionalPhasors,
}

type Flags = OnlineDataFormatFlags;

const M_LAYOUT: &[(Gate, FieldKind)] = &[
    (Gate::Flag(Flags::STATUS2_BYTE_ENABLED), FieldKind::Status2),
    (Gate::Flag(Flags::TIMESTAMP_ENABLED), FieldKind::Timestamp),
    (Gate::Always, FieldKind::Phasor(1)),
    (Gate::Flag(Flags::PHASOR2_ENABLED), FieldKind::Phasor(2)),
    (Gate::Flag(Flags::PHASOR3_ENABLED), FieldKind::Phasor(3)),
    (Gate::Flag(Flags::PHASOR4_ENABLED), FieldKind::Phasor(4)),
    (Gate::Flag(Flags::PHASOR5_ENABLED), FieldKind::Phasor(5)),
    (Gate::Always, FieldKind::Frequency),
    (Gate::Flag(Flags::REFERENCE_ENABLED), FieldKind::Reference),
    (Gate::Flag(Flags::DIGITAL1_ENABLED), FieldKind::Digital(1)),
    (Gate::Flag(Flags::PHASOR6_ENABLED), FieldKind::Phasor(6)),
    (Gate::Flag(Flags::PHASOR7_ENABLED), FieldKind::Phasor(7)),
    (Gate::Flag(Flags::PHASOR8_ENABLED), FieldKind::Phasor(8)),
    (Gate::Flag(Flags::PHASOR9_ENABLED), FieldKind::Phasor(9)),
    (Gate::Flag(Flags::PHASOR10_ENABLED), FieldKind::Phasor(10)),
    (Gate::Flag(Flags::DIGITAL2_ENABLED), FieldKind::Digital(2)),
];

const G_LAYOUT: &[(Gate, FieldKind)] = &[
    (Gate::Always, FieldKind::SampleNumber),
    (Gate::Flag(Flags::TIMESTAMP_ENABLED), FieldKind::Timestamp),
    (Gate::Always, FieldKind::Phasor(1)),
    (Gate::Flag(Flags::PHASOR2_ENABLED), FieldKind::Phasor(2)),
    (Gate::Flag(Flags::PHASOR3_ENABLED), FieldKind::Phasor(3)),
    (Gate::Flag(Flags::PHASOR4_ENABLED), FieldKind::Phasor(4)),
    (Gate::Flag(Flags::PHASOR5_ENABLED), FieldKind::Phasor(5)),
    (Gate::Flag(Flags::PHASOR6_ENABLED), FieldKind::Phasor(6)),
    (Gate::Flag(Flags::PHASOR7_ENABLED), FieldKind::Phasor(7)),
    (Gate::Flag(Flags::PHASOR8_ENABLED), FieldKind::Phasor(8)),
    (Gate::Flag(Flags::PHASOR9_ENABLED), FieldKind::Phasor(9)),
    (Gate::Flag(Flags::PHASOR10_ENABLED), FieldKind::Phasor(10)),
    (Gate::AdditionalPhasors, FieldKind::Phasor(11)),
    (Gate::Flag(Flags::REFERENCE_ENABLED), FieldKind::Reference),
    (Gate::Always, FieldKind::Frequency),
    (Gate::Flag(Flags::DIGITAL1_ENABLED), FieldKind::Digital(1)),
    (Gate::Flag(Flags::DIGITAL2_ENABLED), FieldKind::Digital(2)),
];

/// The resolved field sequence for one format word.
///
/// # Fields
///
/// * `protocol_version`: Sub-version whose table produced the plan.
/// * `flags`: Effective format word (1690G always has the timestamp enabled).
/// * `fields`: Payload fields in wire order.
/// * `header_length`: Sync bytes preceding the payload.
/// * `frame_length`: Header, payload and checksum.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LayoutPlan {
    pub protocol_version: ProtocolVersion,
    pub flags: OnlineDataFormatFlags,
    pub fields: Vec<FieldKind>,
    pub header_length: usize,
    pub frame_length: usize,
}

impl LayoutPlan {
    /// Builds the plan for a format word.
    ///
    /// # Parameters
    ///
    /// * `protocol_version`: Selects the field table.
    /// * `flags`: The device's online data format word.
    /// * `phasor_count`: Channels described for the device. Only 1690G frames with all
    ///   ten format phasors enabled use it, to add channels 11 and up.
    ///
    /// # Returns
    ///
    /// * `Ok(LayoutPlan)`: The plan.
    /// * `Err(FrameError::InvalidFormat)`: If `phasor_count` exceeds the sub-version limit.
    pub fn build(
        protocol_version: ProtocolVersion,
        flags: OnlineDataFormatFlags,
        phasor_count: usize,
    ) -> Result<Self, FrameError> {
        if phasor_count > protocol_version.maximum_phasors() {
            return Err(FrameError::InvalidFormat {
                message: format!(
                    "{} phasors exceed the {} limit of {}",
                    phasor_count,
                    protocol_version,
                    protocol_version.maximum_phasors()
                ),
            });
        }

        let plan = Self::from_flags(protocol_version, flags);
        let additional = if plan.flags.phasor_count() == 10 {
            phasor_count.saturating_sub(10)
        } else {
            0
        };
        if additional == 0 {
            return Ok(plan);
        }
        Ok(Self::evaluate(
            protocol_version,
            plan.flags,
            G_LAYOUT,
            plan.header_length,
            additional,
        ))
    }

    fn evaluate(
        protocol_version: ProtocolVersion,
        flags: OnlineDataFormatFlags,
        table: &[(Gate, FieldKind)],
        header_length: usize,
        additional: usize,
    ) -> Self {
        let mut fields = Vec::with_capacity(table.len() + additional);
        for (gate, field) in table {
            match gate {
                Gate::Always => fields.push(*field),
                Gate::Flag(mask) if flags.contains(*mask) => fields.push(*field),
                Gate::Flag(_) => {}
                Gate::AdditionalPhasors => {
                    fields.extend((11..11 + additional).map(FieldKind::Phasor));
                }
            }
        }

        let payload: usize = fields.iter().map(FieldKind::width).sum();
        LayoutPlan {
            protocol_version,
            flags,
            fields,
            header_length,
            frame_length: header_length + payload + 1,
        }
    }

    /// Builds the plan using only the phasors the format word selects.
    pub fn from_flags(protocol_version: ProtocolVersion, flags: OnlineDataFormatFlags) -> Self {
        let mut flags = flags;
        let (table, header_length) = match protocol_version {
            ProtocolVersion::M => (M_LAYOUT, 2),
            ProtocolVersion::G => {
                flags.insert(Flags::TIMESTAMP_ENABLED);
                (G_LAYOUT, 1)
            }
        };
        Self::evaluate(protocol_version, flags, table, header_length, 0)
    }

    /// Number of phasors in the plan.
    pub fn phasor_count(&self) -> usize {
        self.fields
            .iter()
            .filter(|f| matches!(f, FieldKind::Phasor(_)))
            .count()
    }

    pub fn contains(&self, field: FieldKind) -> bool {
        self.fields.contains(&field)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_m_plan() {
        let plan = LayoutPlan::build(ProtocolVersion::M, Flags::default(), 1).unwrap();
        assert_eq!(plan.fields, vec![FieldKind::Phasor(1), FieldKind::Frequency]);
        assert_eq!(plan.frame_length, 2 + 4 + 4 + 1);
    }

    #[test]
    fn test_full_m_plan_order() {
        let plan = LayoutPlan::build(ProtocolVersion::M, OnlineDataFormatFlags(0x3FFF), 10).unwrap();
        assert_eq!(
            plan.fields,
            vec![
                FieldKind::Status2,
                FieldKind::Timestamp,
                FieldKind::Phasor(1),
                FieldKind::Phasor(2),
                FieldKind::Phasor(3),
                FieldKind::Phasor(4),
                FieldKind::Phasor(5),
                FieldKind::Frequency,
                FieldKind::Reference,
                FieldKind::Digital(1),
                FieldKind::Phasor(6),
                FieldKind::Phasor(7),
                FieldKind::Phasor(8),
                FieldKind::Phasor(9),
                FieldKind::Phasor(10),
                FieldKind::Digital(2),
            ]
        );
        assert_eq!(plan.frame_length, 2 + 1 + 6 + 40 + 4 + 6 + 2 + 2 + 1);
    }

    #[test]
    fn test_g_plan_places_frequency_after_phasors() {
        let flags = OnlineDataFormatFlags(
            Flags::PHASOR2_ENABLED | Flags::REFERENCE_ENABLED | Flags::DIGITAL1_ENABLED,
        );
        let plan = LayoutPlan::build(ProtocolVersion::G, flags, 2).unwrap();
        assert!(plan.flags.timestamp_included());
        assert_eq!(
            plan.fields,
            vec![
                FieldKind::SampleNumber,
                FieldKind::Timestamp,
                FieldKind::Phasor(1),
                FieldKind::Phasor(2),
                FieldKind::Reference,
                FieldKind::Frequency,
                FieldKind::Digital(1),
            ]
        );
        assert_eq!(plan.header_length, 1);
        assert_eq!(plan.frame_length, 1 + 2 + 6 + 8 + 6 + 4 + 2 + 1);
    }

    #[test]
    fn test_g_additional_phasors() {
        let flags = OnlineDataFormatFlags::from_phasor_count(14);
        let plan = LayoutPlan::build(ProtocolVersion::G, flags, 14).unwrap();
        assert_eq!(plan.phasor_count(), 14);
        assert!(plan.contains(FieldKind::Phasor(14)));
        let position = |f| plan.fields.iter().position(|x| *x == f).unwrap();
        assert!(position(FieldKind::Phasor(10)) < position(FieldKind::Phasor(11)));
        assert!(position(FieldKind::Phasor(14)) < position(FieldKind::Frequency));

        // counts beyond the format word are ignored until all ten slots are enabled
        let partial = LayoutPlan::build(ProtocolVersion::G, Flags::from_phasor_count(3), 14).unwrap();
        assert_eq!(partial.phasor_count(), 3);
        // 1690M never carries more than ten
        let m = LayoutPlan::build(ProtocolVersion::M, flags, 10).unwrap();
        assert_eq!(m.phasor_count(), 10);
    }

    #[test]
    fn test_phasor_limits() {
        assert!(matches!(
            LayoutPlan::build(ProtocolVersion::M, Flags::default(), 11),
            Err(FrameError::InvalidFormat { .. })
        ));
        assert!(LayoutPlan::build(ProtocolVersion::G, Flags::from_phasor_count(40), 40).is_ok());
        assert!(LayoutPlan::build(ProtocolVersion::G, Flags::from_phasor_count(40), 41).is_err());
    }

    #[test]
    fn test_length_tracks_every_flag() {
        for bits in 0..0x4000u16 {
            let flags = OnlineDataFormatFlags(bits);
            let plan = LayoutPlan::build(ProtocolVersion::M, flags, flags.phasor_count()).unwrap();
            let expected = 2
                + usize::from(flags.status2_included())
                + 6 * usize::from(flags.timestamp_included())
                + 4 * flags.phasor_count()
                + 4
                + 6 * usize::from(flags.reference_included())
                + 2 * flags.digital_count()
                + 1;
            assert_eq!(plan.frame_length, expected, "flags 0x{:04X}", bits);
        }
    }
}
