//! # Macrodyne Phasor and Frequency Values
//!
//! Raw measurement values carried in Macrodyne data frames and their conversion into
//! engineering units using device-description definitions.
//!
//! ## Key Components
//!
//! - `PhasorValue`: A 16-bit integer rectangular phasor (real, imaginary).
//! - `ReferencePhasor`: The reference block: a reference sample number and a phasor.
//! - `FrequencyValue`: The 16-bit frequency deviation and dF/dt pair.
//! - `PhasorMeasurement`: A phasor scaled to primary units, magnitude and angle in degrees.
//!
//! Voltage magnitude = |real, imaginary| * calibration * ratio. Current magnitude divides
//! that by the shunt. Angle = atan2(imaginary, real) in degrees plus the phase offset.

use super::common::FrameError;
use super::description::{FrequencyDefinition, PhasorDefinition};
use super::endian::EndianOrder;
use super::units::PhasorType;
use serde::{Deserialize, Serialize};

/// Integer rectangular phasor as sent by the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PhasorValue {
    pub real: i16,
    pub imaginary: i16,
}

impl PhasorValue {
    pub const SIZE: usize = 4;

    pub fn new(real: i16, imaginary: i16) -> Self {
        PhasorValue { real, imaginary }
    }

    /// Parses a phasor from the first 4 bytes of `bytes`.
    pub fn from_hex(bytes: &[u8]) -> Result<Self, FrameError> {
        let order = EndianOrder::BigEndian;
        Ok(PhasorValue {
            real: order.decode(bytes, 0)?,
            imaginary: order.decode(bytes, 2)?,
        })
    }

    pub fn to_hex(&self) -> [u8; 4] {
        let mut result = [0u8; 4];
        result[0..2].copy_from_slice(&self.real.to_be_bytes());
        result[2..4].copy_from_slice(&self.imaginary.to_be_bytes());
        result
    }

    /// Unscaled magnitude of the integer pair.
    pub fn raw_magnitude(&self) -> f64 {
        f64::from(self.real).hypot(f64::from(self.imaginary))
    }

    /// Unscaled angle in degrees.
    pub fn raw_angle(&self) -> f64 {
        f64::from(self.imaginary)
            .atan2(f64::from(self.real))
            .to_degrees()
    }

    /// Scales the phasor with its channel definition.
    pub fn to_measurement(&self, definition: &PhasorDefinition) -> PhasorMeasurement {
        let mut magnitude = self.raw_magnitude() * definition.calibration * definition.ratio;
        if definition.phasor_type == PhasorType::Current && definition.shunt != 0.0 {
            magnitude /= definition.shunt;
        }
        PhasorMeasurement {
            label: definition.label.clone(),
            phasor_type: definition.phasor_type,
            magnitude,
            angle: self.raw_angle() + definition.offset,
        }
    }
}

/// A phasor in primary units.
///
/// # Fields
///
/// * `label`: Channel label from the definition.
/// * `phasor_type`: Voltage, current or unspecified.
/// * `magnitude`: Volts (line-neutral) or amperes.
/// * `angle`: Phase angle in degrees.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhasorMeasurement {
    pub label: String,
    pub phasor_type: PhasorType,
    pub magnitude: f64,
    pub angle: f64,
}

/// Reference phasor block: 2-byte reference sample number, then a phasor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ReferencePhasor {
    pub sample_number: u16,
    pub phasor: PhasorValue,
}

impl ReferencePhasor {
    pub const SIZE: usize = 6;

    pub fn from_hex(bytes: &[u8]) -> Result<Self, FrameError> {
        let sample_number = EndianOrder::BigEndian.decode(bytes, 0)?;
        let phasor = PhasorValue::from_hex(bytes.get(2..).unwrap_or_default())?;
        Ok(ReferencePhasor {
            sample_number,
            phasor,
        })
    }

    pub fn to_hex(&self) -> [u8; 6] {
        let mut result = [0u8; 6];
        result[0..2].copy_from_slice(&self.sample_number.to_be_bytes());
        result[2..6].copy_from_slice(&self.phasor.to_hex());
        result
    }
}

/// Frequency deviation and rate of change, as integers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FrequencyValue {
    pub frequency: i16,
    pub dfdt: i16,
}

impl FrequencyValue {
    pub const SIZE: usize = 4;

    pub fn from_hex(bytes: &[u8]) -> Result<Self, FrameError> {
        let order = EndianOrder::BigEndian;
        Ok(FrequencyValue {
            frequency: order.decode(bytes, 0)?,
            dfdt: order.decode(bytes, 2)?,
        })
    }

    pub fn to_hex(&self) -> [u8; 4] {
        let mut result = [0u8; 4];
        result[0..2].copy_from_slice(&self.frequency.to_be_bytes());
        result[2..4].copy_from_slice(&self.dfdt.to_be_bytes());
        result
    }

    /// Frequency in Hz.
    pub fn frequency_hz(&self, definition: &FrequencyDefinition) -> f64 {
        f64::from(self.frequency) / definition.scale + definition.offset
    }

    /// Rate of change of frequency in Hz/s.
    pub fn dfdt_hz_per_second(&self, definition: &FrequencyDefinition) -> f64 {
        f64::from(self.dfdt) / definition.dfdt_scale + definition.dfdt_offset
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-6
    }

    #[test]
    fn test_phasor_bytes() {
        let phasor = PhasorValue::new(-2, 0x1234);
        let bytes = phasor.to_hex();
        assert_eq!(bytes, [0xFF, 0xFE, 0x12, 0x34]);
        assert_eq!(PhasorValue::from_hex(&bytes).unwrap(), phasor);
        assert!(matches!(
            PhasorValue::from_hex(&bytes[..3]),
            Err(FrameError::OutOfRange { .. })
        ));
    }

    #[test]
    fn test_voltage_scaling() {
        let definition = PhasorDefinition::default_voltage();
        let measurement = PhasorValue::new(3000, 4000).to_measurement(&definition);
        assert!(approx(measurement.magnitude, 5000.0 * 0.0060573 * 4500.0));
        assert!(approx(measurement.angle, 4000f64.atan2(3000.0).to_degrees()));
        assert_eq!(measurement.phasor_type, PhasorType::Voltage);
        assert_eq!(measurement.label, "Default 500kV");
    }

    #[test]
    fn test_current_scaling_divides_by_shunt() {
        let mut definition = PhasorDefinition::default_current();
        definition.shunt = 2.0;
        definition.offset = 10.0;
        let measurement = PhasorValue::new(0, 1000).to_measurement(&definition);
        assert!(approx(measurement.magnitude, 1000.0 * 0.000040382 * 600.0 / 2.0));
        assert!(approx(measurement.angle, 100.0));
    }

    #[test]
    fn test_reference_block() {
        let reference = ReferencePhasor {
            sample_number: 29,
            phasor: PhasorValue::new(1, -1),
        };
        let bytes = reference.to_hex();
        assert_eq!(bytes, [0x00, 0x1D, 0x00, 0x01, 0xFF, 0xFF]);
        assert_eq!(ReferencePhasor::from_hex(&bytes).unwrap(), reference);
        assert!(ReferencePhasor::from_hex(&bytes[..5]).is_err());
    }

    #[test]
    fn test_frequency_scaling() {
        let definition = FrequencyDefinition::default();
        let value = FrequencyValue {
            frequency: -25,
            dfdt: 150,
        };
        assert!(approx(value.frequency_hz(&definition), 59.975));
        assert!(approx(value.dfdt_hz_per_second(&definition), 0.15));
        assert_eq!(FrequencyValue::from_hex(&value.to_hex()).unwrap(), value);
    }
}
