//! # Macrodyne Measurement Units
//!
//! Measurement classifications used by device descriptions: the phasor type letter that
//! leads every phasor entry and the nominal line frequency of the monitored system.

use super::common::FrameError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Quantity measured by a phasor channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PhasorType {
    Voltage,
    Current,
    /// `N` entries: the channel is not interpreted.
    Unspecified,
}

impl PhasorType {
    /// Parses the single-letter type code of a phasor entry (`V`, `I` or `N`).
    pub fn from_code(code: &str) -> Result<Self, FrameError> {
        match code.trim().to_ascii_uppercase().as_str() {
            "V" => Ok(PhasorType::Voltage),
            "I" => Ok(PhasorType::Current),
            "N" => Ok(PhasorType::Unspecified),
            other => Err(FrameError::InvalidDefinition {
                message: format!("phasor type must be V, I or N, got '{}'", other),
            }),
        }
    }

    pub fn code(&self) -> char {
        match self {
            PhasorType::Voltage => 'V',
            PhasorType::Current => 'I',
            PhasorType::Unspecified => 'N',
        }
    }
}

impl fmt::Display for PhasorType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            PhasorType::Voltage => write!(f, "Voltage"),
            PhasorType::Current => write!(f, "Current"),
            PhasorType::Unspecified => write!(f, "Unspecified"),
        }
    }
}

/// Nominal system frequency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum NominalFrequency {
    Hz50,
    #[default]
    Hz60,
}

impl NominalFrequency {
    /// Picks the nominal frequency closest to `hz`.
    pub fn from_hz(hz: f64) -> Self {
        if (hz - 50.0).abs() < (hz - 60.0).abs() {
            NominalFrequency::Hz50
        } else {
            NominalFrequency::Hz60
        }
    }

    pub fn hz(&self) -> f64 {
        match self {
            NominalFrequency::Hz50 => 50.0,
            NominalFrequency::Hz60 => 60.0,
        }
    }
}

impl fmt::Display for NominalFrequency {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            NominalFrequency::Hz50 => write!(f, "50 Hz"),
            NominalFrequency::Hz60 => write!(f, "60 Hz"),
        }
    }
}
