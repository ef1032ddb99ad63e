//! # Device Description Sources
//!
//! Macrodyne devices only report which fields they send. Channel names, scaling and the
//! station identity come from an external device-description file in the BPA PDCstream
//! INI layout. This module reads those files into typed definitions and writes them back
//! out.
//!
//! ## Key Components
//!
//! - `PhasorDefinition`: One `Phasor{n}` entry (type, ratio, calibration, offset, shunt,
//!   voltage reference/class, label).
//! - `FrequencyDefinition`: A `Frequency` entry (scale, offset, dF/dt scale, dF/dt
//!   offset, reserved, label).
//! - `DeviceDescriptionCell`: One device section with its section label.
//! - `DeviceDescription`: All cells of a file plus its `[DEFAULT]` and `[CONFIG]` values.
//!   A malformed section is skipped and recorded; the rest still load.
//! - `DescriptionProvider`: Produces a fresh `SectionSource` on every reload;
//!   `IniFileProvider` reads one from disk.
//!
//! ## Usage
//!
//! `config::ConfigurationModel` asks its provider for a description on every reload and
//! binds the cell whose section label matches the device label.

use super::common::{FrameError, MAXIMUM_PHASOR_VALUES};
use super::units::{NominalFrequency, PhasorType};
use crate::utils::{IniDocument, SectionSource};
use log::warn;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

pub const DEFAULT_VOLTAGE_PHASOR_ENTRY: &str = "V,4500.0,0.0060573,0,0,500,Default 500kV";
pub const DEFAULT_CURRENT_PHASOR_ENTRY: &str = "I,600.00,0.000040382,0,1,1,Default Current";
pub const DEFAULT_FREQUENCY_ENTRY: &str = "F,1000,60,1000,0,0,Frequency";
pub const DEFAULT_SAMPLE_RATE: u16 = 30;

/// Number of leading section-name characters forming a section label.
pub const DEFAULT_LABEL_LENGTH: usize = 4;

const DEFAULT_SECTION: &str = "DEFAULT";
const CONFIG_SECTION: &str = "CONFIG";

/// Returns the first `length` characters of `name`, the label used to match devices.
pub fn section_label(name: &str, length: usize) -> String {
    name.trim().chars().take(length).collect()
}

fn strip_comment(entry: &str) -> &str {
    entry.split(';').next().unwrap_or("").trim()
}

fn parse_number<T: std::str::FromStr>(field: &str, name: &str, entry: &str) -> Result<T, FrameError> {
    field.trim().parse::<T>().map_err(|_| FrameError::InvalidDefinition {
        message: format!("{} '{}' is not numeric in entry '{}'", name, field.trim(), entry),
    })
}

/// Calibration of one phasor channel.
///
/// # Fields
///
/// * `phasor_type`: Voltage, current or unspecified.
/// * `ratio`: PT/CT ratio N:1.
/// * `calibration`: Conversion from the integer on the wire to secondary units.
/// * `offset`: Phase angle offset in degrees.
/// * `shunt`: Shunt resistance (current channels).
/// * `voltage_reference`: Voltage class (voltage channels) or the index of the voltage
///   phasor used for power calculations (current channels).
/// * `label`: Channel label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhasorDefinition {
    pub phasor_type: PhasorType,
    pub ratio: f64,
    pub calibration: f64,
    pub offset: f64,
    pub shunt: f64,
    pub voltage_reference: i32,
    pub label: String,
}

impl PhasorDefinition {
    /// Parses a phasor entry.
    ///
    /// Accepts `type,ratio,cal,offset,shunt,vref,label` and the shorter
    /// `type,ratio,cal,offset,shunt_or_class,label`. Text after `;` is a comment.
    pub fn parse(entry: &str) -> Result<Self, FrameError> {
        let body = strip_comment(entry);
        let fields: Vec<&str> = body.split(',').map(str::trim).collect();
        let (shunt, voltage_reference, label) = match fields.len() {
            0..=5 => {
                return Err(FrameError::InvalidDefinition {
                    message: format!("phasor entry '{}' needs at least 6 fields", body),
                })
            }
            6 => {
                let combined: f64 = parse_number(fields[4], "shunt/class", body)?;
                (combined, combined as i32, fields[5].to_string())
            }
            _ => (
                parse_number(fields[4], "shunt", body)?,
                parse_number::<f64>(fields[5], "voltage reference", body)? as i32,
                fields[6..].join(","),
            ),
        };
        Ok(PhasorDefinition {
            phasor_type: PhasorType::from_code(fields[0])?,
            ratio: parse_number(fields[1], "ratio", body)?,
            calibration: parse_number(fields[2], "calibration", body)?,
            offset: parse_number(fields[3], "offset", body)?,
            shunt,
            voltage_reference,
            label,
        })
    }

    /// Formats the definition as a description-file entry.
    pub fn to_entry(&self) -> String {
        format!(
            "{},{},{},{},{},{},{}",
            self.phasor_type.code(),
            self.ratio,
            self.calibration,
            self.offset,
            self.shunt,
            self.voltage_reference,
            self.label
        )
    }

    pub fn default_voltage() -> Self {
        PhasorDefinition {
            phasor_type: PhasorType::Voltage,
            ratio: 4500.0,
            calibration: 0.0060573,
            offset: 0.0,
            shunt: 0.0,
            voltage_reference: 500,
            label: "Default 500kV".to_string(),
        }
    }

    pub fn default_current() -> Self {
        PhasorDefinition {
            phasor_type: PhasorType::Current,
            ratio: 600.0,
            calibration: 0.000040382,
            offset: 0.0,
            shunt: 1.0,
            voltage_reference: 1,
            label: "Default Current".to_string(),
        }
    }

    /// Copy of this definition carrying a different label.
    pub fn relabeled(&self, label: impl Into<String>) -> Self {
        PhasorDefinition {
            label: label.into(),
            ..self.clone()
        }
    }
}

/// Scaling of the frequency and dF/dt pair.
///
/// Frequency = number / `scale` + `offset`; dF/dt = number / `dfdt_scale` + `dfdt_offset`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrequencyDefinition {
    pub scale: f64,
    pub offset: f64,
    pub dfdt_scale: f64,
    pub dfdt_offset: f64,
    pub reserved: i32,
    pub label: String,
}

impl FrequencyDefinition {
    /// Parses a frequency entry. A leading `F` type field is optional.
    pub fn parse(entry: &str) -> Result<Self, FrameError> {
        let body = strip_comment(entry);
        let mut fields: Vec<&str> = body.split(',').map(str::trim).collect();
        if fields
            .first()
            .is_some_and(|f| f.eq_ignore_ascii_case("F"))
        {
            fields.remove(0);
        }
        if fields.len() < 6 {
            return Err(FrameError::InvalidDefinition {
                message: format!("frequency entry '{}' needs 6 fields", body),
            });
        }
        let definition = FrequencyDefinition {
            scale: parse_number(fields[0], "scale", body)?,
            offset: parse_number(fields[1], "offset", body)?,
            dfdt_scale: parse_number(fields[2], "dF/dt scale", body)?,
            dfdt_offset: parse_number(fields[3], "dF/dt offset", body)?,
            reserved: parse_number::<f64>(fields[4], "reserved", body)? as i32,
            label: fields[5..].join(","),
        };
        if definition.scale == 0.0 || definition.dfdt_scale == 0.0 {
            return Err(FrameError::InvalidDefinition {
                message: format!("frequency entry '{}' has a zero scale", body),
            });
        }
        Ok(definition)
    }

    pub fn to_entry(&self) -> String {
        format!(
            "F,{},{},{},{},{},{}",
            self.scale, self.offset, self.dfdt_scale, self.dfdt_offset, self.reserved, self.label
        )
    }

    pub fn nominal_frequency(&self) -> NominalFrequency {
        NominalFrequency::from_hz(self.offset)
    }
}

impl Default for FrequencyDefinition {
    fn default() -> Self {
        FrequencyDefinition {
            scale: 1000.0,
            offset: 60.0,
            dfdt_scale: 1000.0,
            dfdt_offset: 0.0,
            reserved: 0,
            label: "Frequency".to_string(),
        }
    }
}

/// One device described by the external source.
///
/// # Fields
///
/// * `section`: Full section name (`{section}pmu{n}` for devices behind a PDC).
/// * `label`: Section label, the leading characters of `section`.
/// * `id_code`: `PMU` key, or `PDC * 1000 + index` for devices behind a PDC.
/// * `station_name`: `Name` key, defaulting to the section name.
/// * `phasors`: Phasor definitions in slot order.
/// * `frequency`: Frequency definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceDescriptionCell {
    pub section: String,
    pub label: String,
    pub id_code: u16,
    pub station_name: String,
    pub phasors: Vec<PhasorDefinition>,
    pub frequency: FrequencyDefinition,
}

/// Everything read from one description source.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceDescription {
    pub default_voltage: PhasorDefinition,
    pub default_current: PhasorDefinition,
    pub default_frequency: FrequencyDefinition,
    pub sample_rate: u16,
    pub device_count: Option<u16>,
    pub cells: Vec<DeviceDescriptionCell>,
    /// Sections that failed to load, with the reason.
    pub rejected: Vec<(String, FrameError)>,
}

impl DeviceDescription {
    /// Reads all device sections from `source`.
    ///
    /// `label_length` sets how many leading characters of a section name form its label.
    /// Malformed defaults fall back to the built-in entries; a malformed device section
    /// is logged and recorded in `rejected`.
    pub fn from_source(source: &dyn SectionSource, label_length: usize) -> Self {
        let default_voltage = Self::load_default(source, "PhasorV", PhasorDefinition::parse)
            .unwrap_or_else(PhasorDefinition::default_voltage);
        let default_current = Self::load_default(source, "PhasorI", PhasorDefinition::parse)
            .unwrap_or_else(PhasorDefinition::default_current);
        let default_frequency = Self::load_default(source, "Frequency", FrequencyDefinition::parse)
            .unwrap_or_default();

        let sample_rate = match source.value(CONFIG_SECTION, "SampleRate") {
            Some(raw) => strip_comment(&raw).parse::<u16>().unwrap_or_else(|_| {
                warn!("Ignoring invalid SampleRate '{}', using {}", raw, DEFAULT_SAMPLE_RATE);
                DEFAULT_SAMPLE_RATE
            }),
            None => DEFAULT_SAMPLE_RATE,
        };
        let device_count = source
            .value(CONFIG_SECTION, "NumberOfPMUs")
            .and_then(|raw| strip_comment(&raw).parse::<u16>().ok());

        let mut description = DeviceDescription {
            default_voltage,
            default_current,
            default_frequency,
            sample_rate,
            device_count,
            cells: Vec::new(),
            rejected: Vec::new(),
        };

        let device_sections = source.section_names().into_iter().filter(|name| {
            !name.is_empty()
                && !name.eq_ignore_ascii_case(DEFAULT_SECTION)
                && !name.eq_ignore_ascii_case(CONFIG_SECTION)
        });
        for (index, section) in device_sections.enumerate() {
            match description.load_section(source, &section, index, label_length) {
                Ok(mut cells) => description.cells.append(&mut cells),
                Err(err) => {
                    warn!("Skipping device description section [{}]: {}", section, err);
                    description.rejected.push((section, err));
                }
            }
        }
        description
    }

    /// First cell whose section label equals `label`.
    pub fn find_by_label(&self, label: &str) -> Option<&DeviceDescriptionCell> {
        self.cells.iter().find(|cell| cell.label == label)
    }

    fn load_default<T>(
        source: &dyn SectionSource,
        key: &str,
        parse: fn(&str) -> Result<T, FrameError>,
    ) -> Option<T> {
        let raw = source.value(DEFAULT_SECTION, key)?;
        match parse(&raw) {
            Ok(value) => Some(value),
            Err(err) => {
                warn!("Ignoring invalid [DEFAULT] {}: {}", key, err);
                None
            }
        }
    }

    fn load_section(
        &self,
        source: &dyn SectionSource,
        section: &str,
        index: usize,
        label_length: usize,
    ) -> Result<Vec<DeviceDescriptionCell>, FrameError> {
        let get = |key: &str| source.value(section, key);
        let number = |key: &str| -> Result<Option<i64>, FrameError> {
            get(key)
                .map(|raw| parse_number(strip_comment(&raw), key, section))
                .transpose()
        };
        let phasor = |key: String| -> Result<PhasorDefinition, FrameError> {
            match get(&key) {
                Some(raw) => PhasorDefinition::parse(&raw),
                None => Ok(self.default_voltage.clone()),
            }
        };
        let frequency = match get("Frequency") {
            Some(raw) => FrequencyDefinition::parse(&raw)?,
            None => self.default_frequency.clone(),
        };
        let name = get("Name")
            .map(|raw| strip_comment(&raw).to_string())
            .unwrap_or_else(|| section.to_string());

        let pdc = number("PDC")?.unwrap_or(-1);
        if pdc == -1 {
            let phasor_count = number("NumberPhasors")?.unwrap_or(0).max(0);
            if phasor_count > MAXIMUM_PHASOR_VALUES as i64 {
                return Err(FrameError::InvalidDefinition {
                    message: format!(
                        "NumberPhasors {} exceeds the {} phasors a device can carry",
                        phasor_count, MAXIMUM_PHASOR_VALUES
                    ),
                });
            }
            let phasors = (1..=phasor_count)
                .map(|n| phasor(format!("Phasor{}", n)))
                .collect::<Result<Vec<_>, _>>()?;
            let id_code = checked_id_code(Some(number("PMU")?.unwrap_or(index as i64)), section)?;
            return Ok(vec![DeviceDescriptionCell {
                section: section.to_string(),
                label: section_label(section, label_length),
                id_code,
                station_name: name,
                phasors,
                frequency,
            }]);
        }

        // Devices behind a PDC carry two phasors each.
        let device_count = number("NumberPMUs")?.unwrap_or(0).max(0);
        let pdc_id = |x: i64| {
            checked_id_code(pdc.checked_mul(1000).and_then(|v| v.checked_add(x)), section)
        };
        if device_count > 0 {
            pdc_id(device_count - 1)?;
        }
        (0..device_count)
            .map(|x| -> Result<DeviceDescriptionCell, FrameError> {
                let virtual_section = format!("{}pmu{}", section, x);
                let phasors = (0..2)
                    .map(|y| phasor(format!("Phasor{}", x * 2 + y + 1)))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(DeviceDescriptionCell {
                    label: section_label(&virtual_section, label_length),
                    section: virtual_section,
                    id_code: pdc_id(x)?,
                    station_name: format!("{} - Device {}", name, x + 1),
                    phasors,
                    frequency: frequency.clone(),
                })
            })
            .collect()
    }
}

/// `None` stands for an ID computation that overflowed.
fn checked_id_code(value: Option<i64>, section: &str) -> Result<u16, FrameError> {
    value
        .and_then(|v| u16::try_from(v).ok())
        .ok_or_else(|| FrameError::InvalidDefinition {
            message: format!("ID code of section [{}] is outside 0..=65535", section),
        })
}

/// Renders a description file for `cells`, in the layout `DeviceDescription` reads.
pub fn description_image(
    title: &str,
    sample_rate: u16,
    cells: &[DeviceDescriptionCell],
) -> String {
    let mut image = String::new();
    let _ = writeln!(image, "; BPA PDCstream style description for Macrodyne device {}", title);
    image.push_str(
        ";\n\
         ;   Phasor entry format:  Type, Ratio, Cal Factor, Offset, Shunt, VoltageRef/Class, Label  ;Comments\n\
         ;    Type:       V=voltage, I=current, N=don't care\n\
         ;    Ratio:      PT/CT ratio N:1\n\
         ;    Cal Factor: Conversion factor between integer in file and secondary volts\n\
         ;    Offset:     Phase offset in degrees\n\
         ;    Shunt:      Current shunt resistance in ohms\n\
         ;    VoltageRef: Current- voltage phasor number, Voltage- voltage class\n\
         ;\n\
         ;   Voltage Magnitude = MAG(Real,Imaginary) * CalFactor * PTR\n\
         ;   Current Magnitude = MAG(Real,Imaginary) * CalFactor * CTR / Shunt\n\
         ;   Phase Angle = ATAN(Imaginary/Real) + Phase Offset\n\
         ;\n\
         ;   Frequency entry format:  scale, offset, dF/dt scale, dF/dt offset, dummy, label  ;Comments\n\
         ;   Frequency = Number / scale + offset\n\
         ;   dF/dt = Number / (dF/dt scale) + (dF/dt offset)\n\
         ;\n",
    );
    let _ = writeln!(image, "[{}]", DEFAULT_SECTION);
    let _ = writeln!(image, "PhasorV={}", DEFAULT_VOLTAGE_PHASOR_ENTRY);
    let _ = writeln!(image, "PhasorI={}", DEFAULT_CURRENT_PHASOR_ENTRY);
    let _ = writeln!(image, "Frequency={}", DEFAULT_FREQUENCY_ENTRY);
    image.push('\n');
    let _ = writeln!(image, "[{}]", CONFIG_SECTION);
    let _ = writeln!(image, "SampleRate={}", sample_rate);
    let _ = writeln!(image, "NumberOfPMUs={}", cells.len());
    for cell in cells {
        image.push('\n');
        let _ = writeln!(image, "[{}]", cell.section);
        let _ = writeln!(image, "Name={}", cell.station_name);
        let _ = writeln!(image, "PMU={}", cell.id_code);
        let _ = writeln!(image, "NumberPhasors={}", cell.phasors.len());
        for (index, phasor) in cell.phasors.iter().enumerate() {
            let _ = writeln!(image, "Phasor{}={}", index + 1, phasor.to_entry());
        }
        let _ = writeln!(image, "Frequency={}", cell.frequency.to_entry());
    }
    image
}

/// Supplies a device-description document on demand.
pub trait DescriptionProvider: Send + Sync {
    /// Human-readable name of the source, used in log messages.
    fn name(&self) -> String;

    /// Loads the current document.
    fn load(&self) -> Result<Arc<dyn SectionSource>, FrameError>;

    /// Modification stamp of the underlying document, if it has one.
    fn modified(&self) -> Option<SystemTime> {
        None
    }
}

/// Reads a description from an INI file on every load.
#[derive(Debug, Clone)]
pub struct IniFileProvider {
    path: PathBuf,
}

impl IniFileProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        IniFileProvider { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl DescriptionProvider for IniFileProvider {
    fn name(&self) -> String {
        self.path.display().to_string()
    }

    fn load(&self) -> Result<Arc<dyn SectionSource>, FrameError> {
        let document = IniDocument::load(&self.path).map_err(|e| FrameError::SourceUnavailable {
            message: format!("{}: {}", self.path.display(), e),
        })?;
        Ok(Arc::new(document))
    }

    fn modified(&self) -> Option<SystemTime> {
        std::fs::metadata(&self.path).and_then(|m| m.modified()).ok()
    }
}

/// An in-memory document serves itself.
impl DescriptionProvider for IniDocument {
    fn name(&self) -> String {
        "in-memory description".to_string()
    }

    fn load(&self) -> Result<Arc<dyn SectionSource>, FrameError> {
        Ok(Arc::new(self.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FILE: &str = "\
[DEFAULT]
PhasorV=V,1000,0.5,0,0,230,Fallback Voltage
[CONFIG]
SampleRate=60
NumberOfPMUs=3
[SUB1_Substation]
Name=North Substation
PMU=12
NumberPhasors=3
Phasor1=V,4500.0,0.0060573,0,0,500,Bus A ; main bus
Phasor2=I,600.00,0.000040382,1.5,1,1,Line 1
Frequency=F,1000,60,1000,0,0,Bus Frequency
[BROKEN]
NumberPhasors=1
Phasor1=V,abc,0.1,0,0,500,Bad
[PDC9]
PDC=7
Name=Remote
NumberPMUs=2
Phasor3=I,100,0.1,0,2,1,Feeder
";

    fn description() -> DeviceDescription {
        let document = IniDocument::parse(FILE);
        DeviceDescription::from_source(&document, DEFAULT_LABEL_LENGTH)
    }

    #[test]
    fn test_phasor_entry_forms() {
        let full = PhasorDefinition::parse(DEFAULT_CURRENT_PHASOR_ENTRY).unwrap();
        assert_eq!(full, PhasorDefinition::default_current());
        assert_eq!(
            PhasorDefinition::parse(DEFAULT_VOLTAGE_PHASOR_ENTRY).unwrap(),
            PhasorDefinition::default_voltage()
        );

        let short = PhasorDefinition::parse("V,2000,0.01,0,345,Short Form").unwrap();
        assert_eq!(short.shunt, 345.0);
        assert_eq!(short.voltage_reference, 345);
        assert_eq!(short.label, "Short Form");

        let commented = PhasorDefinition::parse("I,1,1,0,1,1,Tie Line ;note").unwrap();
        assert_eq!(commented.label, "Tie Line");

        assert!(PhasorDefinition::parse("V,1,1,0").is_err());
        assert!(PhasorDefinition::parse("Q,1,1,0,0,500,x").is_err());
    }

    #[test]
    fn test_phasor_entry_round_trip() {
        let definition = PhasorDefinition::parse("I,600,0.000040382,1.5,1,2,Line 1").unwrap();
        assert_eq!(PhasorDefinition::parse(&definition.to_entry()).unwrap(), definition);
    }

    #[test]
    fn test_frequency_entry() {
        let with_type = FrequencyDefinition::parse(DEFAULT_FREQUENCY_ENTRY).unwrap();
        assert_eq!(with_type, FrequencyDefinition::default());
        let without_type = FrequencyDefinition::parse("100,50,100,0,0,Hz").unwrap();
        assert_eq!(without_type.nominal_frequency(), NominalFrequency::Hz50);
        assert_eq!(FrequencyDefinition::parse(&with_type.to_entry()).unwrap(), with_type);
        assert!(FrequencyDefinition::parse("F,0,60,1000,0,0,Zero").is_err());
        assert!(FrequencyDefinition::parse("F,1000,60").is_err());
    }

    #[test]
    fn test_sections_load() {
        let description = description();
        assert_eq!(description.sample_rate, 60);
        assert_eq!(description.device_count, Some(3));
        assert_eq!(description.default_voltage.label, "Fallback Voltage");
        assert_eq!(description.default_current, PhasorDefinition::default_current());

        let cell = description.find_by_label("SUB1").unwrap();
        assert_eq!(cell.section, "SUB1_Substation");
        assert_eq!(cell.id_code, 12);
        assert_eq!(cell.station_name, "North Substation");
        assert_eq!(cell.phasors.len(), 3);
        assert_eq!(cell.phasors[0].label, "Bus A");
        assert_eq!(cell.phasors[1].offset, 1.5);
        // missing Phasor3 falls back to [DEFAULT] PhasorV
        assert_eq!(cell.phasors[2].label, "Fallback Voltage");
        assert_eq!(cell.frequency.label, "Bus Frequency");
    }

    #[test]
    fn test_malformed_section_is_isolated() {
        let description = description();
        assert_eq!(description.rejected.len(), 1);
        assert_eq!(description.rejected[0].0, "BROKEN");
        assert!(matches!(
            description.rejected[0].1,
            FrameError::InvalidDefinition { .. }
        ));
        assert!(description.find_by_label("BROK").is_none());
        assert!(description.find_by_label("SUB1").is_some());
    }

    #[test]
    fn test_pdc_section_expands() {
        let description = description();
        let devices: Vec<_> = description
            .cells
            .iter()
            .filter(|c| c.section.starts_with("PDC9"))
            .collect();
        assert_eq!(devices.len(), 2);
        assert_eq!(devices[0].section, "PDC9pmu0");
        assert_eq!(devices[0].id_code, 7000);
        assert_eq!(devices[1].id_code, 7001);
        assert_eq!(devices[1].station_name, "Remote - Device 2");
        assert_eq!(devices[1].phasors.len(), 2);
        assert_eq!(devices[1].phasors[0].label, "Feeder");
        assert_eq!(devices[0].phasors[0].label, "Fallback Voltage");
    }

    #[test]
    fn test_label_length_is_configurable() {
        let document = IniDocument::parse(FILE);
        let description = DeviceDescription::from_source(&document, 6);
        assert!(description.find_by_label("SUB1_S").is_some());
        assert!(description.find_by_label("SUB1").is_none());
        assert_eq!(section_label("AB", 4), "AB");
    }

    #[test]
    fn test_image_reloads_to_same_cells() {
        let original = description();
        let image = description_image("test", original.sample_rate, &original.cells);
        let reparsed = DeviceDescription::from_source(
            &IniDocument::parse(&image),
            DEFAULT_LABEL_LENGTH,
        );
        assert_eq!(reparsed.sample_rate, 60);
        assert_eq!(reparsed.cells.len(), original.cells.len());
        for (a, b) in reparsed.cells.iter().zip(original.cells.iter()) {
            assert_eq!(a.section, b.section);
            assert_eq!(a.id_code, b.id_code);
            assert_eq!(a.station_name, b.station_name);
            assert_eq!(a.phasors, b.phasors);
            assert_eq!(a.frequency, b.frequency);
        }
    }

    #[test]
    fn test_inline_comments_on_numeric_keys() {
        let document = IniDocument::parse(
            "[SUB1]\nName=North ; main site\nPMU=3 ;id\nNumberPhasors=1 ; one channel\n\
             Phasor1=V,4500,0.0060573,0,0,500,Bus A\n",
        );
        let description = DeviceDescription::from_source(&document, DEFAULT_LABEL_LENGTH);
        assert!(description.rejected.is_empty());
        let cell = description.find_by_label("SUB1").unwrap();
        assert_eq!(cell.station_name, "North");
        assert_eq!(cell.id_code, 3);
        assert_eq!(cell.phasors.len(), 1);
    }

    #[test]
    fn test_out_of_range_id_codes_reject_the_section() {
        let document = IniDocument::parse(
            "[BIG1]\nPMU=70000\nNumberPhasors=1\n\
             [PDC1]\nPDC=66\nNumberPMUs=2\n\
             [PDC2]\nPDC=65\nNumberPMUs=2\n\
             [GOOD]\nPMU=65535\nNumberPhasors=1\n\
             [WIDE]\nPDC=9223372036854775807\nNumberPMUs=1\n",
        );
        let description = DeviceDescription::from_source(&document, DEFAULT_LABEL_LENGTH);
        let rejected: Vec<&str> = description.rejected.iter().map(|(s, _)| s.as_str()).collect();
        assert_eq!(rejected, vec!["BIG1", "PDC1", "WIDE"]);
        assert!(description
            .rejected
            .iter()
            .all(|(_, e)| matches!(e, FrameError::InvalidDefinition { .. })));
        let ids: Vec<u16> = description.cells.iter().map(|c| c.id_code).collect();
        assert_eq!(ids, vec![65000, 65001, 65535]);
    }

    #[test]
    fn test_phasor_count_is_bounded() {
        let document = IniDocument::parse(
            "[HUGE]\nNumberPhasors=4000000000\n[MAX1]\nNumberPhasors=40\n[OVER]\nNumberPhasors=41\n",
        );
        let description = DeviceDescription::from_source(&document, DEFAULT_LABEL_LENGTH);
        let rejected: Vec<&str> = description.rejected.iter().map(|(s, _)| s.as_str()).collect();
        assert_eq!(rejected, vec!["HUGE", "OVER"]);
        assert_eq!(description.find_by_label("MAX1").unwrap().phasors.len(), 40);
    }

    #[test]
    fn test_stray_line_keeps_other_sections() {
        let document = IniDocument::parse(&format!("{}[JUNK]\nthis line has no equals\n", FILE));
        assert_eq!(document.skipped_lines().len(), 1);
        let description = DeviceDescription::from_source(&document, DEFAULT_LABEL_LENGTH);
        assert_eq!(description.find_by_label("SUB1").unwrap().phasors.len(), 3);
    }

    #[test]
    fn test_missing_file_is_unavailable() {
        let provider = IniFileProvider::new("/nonexistent/macrodyne.ini");
        assert!(matches!(
            provider.load(),
            Err(FrameError::SourceUnavailable { .. })
        ));
        assert!(provider.modified().is_none());
    }
}
