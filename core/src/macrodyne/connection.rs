//! # Macrodyne Connection Parameters
//!
//! Settings that select the sub-protocol and the device description for one device link.
//! They are usually given as a connection string of `key=value` pairs separated by `;`:
//!
//! ```text
//! protocolVersion=G; iniFileName=/etc/pdc/macrodyne.ini; deviceLabel=SUB1PMU3; labelLength=4
//! ```
//!
//! Keys are matched case-insensitively. Unknown keys are ignored so one string can also
//! carry transport settings.

use super::common::{FrameError, ProtocolVersion};
use super::description::DEFAULT_LABEL_LENGTH;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Per-connection settings.
///
/// # Fields
///
/// * `protocol_version`: `M` (default) or `G`.
/// * `ini_file_name`: Device description file. Required for 1690G.
/// * `device_label`: Identifier matched against description section labels. Required
///   for 1690G; 1690M devices fall back to their reported unit ID.
/// * `refresh_config_file_on_change`: Reload the description when the file changes.
/// * `label_length`: Leading characters of a section name forming its label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionParameters {
    pub protocol_version: ProtocolVersion,
    pub ini_file_name: Option<PathBuf>,
    pub device_label: Option<String>,
    pub refresh_config_file_on_change: bool,
    pub label_length: usize,
}

impl Default for ConnectionParameters {
    fn default() -> Self {
        ConnectionParameters {
            protocol_version: ProtocolVersion::M,
            ini_file_name: None,
            device_label: None,
            refresh_config_file_on_change: false,
            label_length: DEFAULT_LABEL_LENGTH,
        }
    }
}

impl ConnectionParameters {
    /// Parses and validates a connection string.
    ///
    /// # Returns
    ///
    /// * `Ok(ConnectionParameters)`: The settings, with defaults for absent keys.
    /// * `Err(FrameError::InvalidParameter)`: A malformed pair or value, or a failed
    ///   validation.
    /// * `Err(FrameError::UnsupportedSubVersion)`: An unknown `protocolVersion`.
    pub fn from_connection_string(text: &str) -> Result<Self, FrameError> {
        let mut parameters = ConnectionParameters::default();
        for pair in text.split(';').map(str::trim).filter(|p| !p.is_empty()) {
            let (key, value) = pair.split_once('=').ok_or_else(|| FrameError::InvalidParameter {
                message: format!("'{}' is not a key=value pair", pair),
            })?;
            let value = value.trim();
            match key.trim().to_ascii_lowercase().as_str() {
                "protocolversion" => parameters.protocol_version = value.parse()?,
                "inifilename" => {
                    parameters.ini_file_name = (!value.is_empty()).then(|| PathBuf::from(value))
                }
                "devicelabel" => {
                    parameters.device_label = (!value.is_empty()).then(|| value.to_string())
                }
                "refreshconfigfileonchange" => {
                    parameters.refresh_config_file_on_change = parse_bool(value)?
                }
                "labellength" => {
                    parameters.label_length =
                        value.parse().map_err(|_| FrameError::InvalidParameter {
                            message: format!("labelLength '{}' is not a number", value),
                        })?
                }
                _ => {}
            }
        }
        parameters.validate()?;
        Ok(parameters)
    }

    /// Checks the combination of settings.
    pub fn validate(&self) -> Result<(), FrameError> {
        if self.label_length == 0 {
            return Err(FrameError::InvalidParameter {
                message: "labelLength must be at least 1".to_string(),
            });
        }
        if self.protocol_version == ProtocolVersion::G {
            if self.ini_file_name.is_none() {
                return Err(FrameError::InvalidParameter {
                    message: "1690G connections require iniFileName".to_string(),
                });
            }
            if self.device_label.is_none() {
                return Err(FrameError::InvalidParameter {
                    message: "1690G connections require deviceLabel".to_string(),
                });
            }
        }
        Ok(())
    }

    /// Renders the settings back into connection-string form.
    pub fn to_connection_string(&self) -> String {
        let mut pairs = vec![format!("protocolVersion={}", self.protocol_version)];
        if let Some(path) = &self.ini_file_name {
            pairs.push(format!("iniFileName={}", path.display()));
        }
        if let Some(label) = &self.device_label {
            pairs.push(format!("deviceLabel={}", label));
        }
        pairs.push(format!(
            "refreshConfigFileOnChange={}",
            self.refresh_config_file_on_change
        ));
        pairs.push(format!("labelLength={}", self.label_length));
        pairs.join("; ")
    }
}

fn parse_bool(value: &str) -> Result<bool, FrameError> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "yes" | "1" | "on" => Ok(true),
        "false" | "no" | "0" | "off" => Ok(false),
        _ => Err(FrameError::InvalidParameter {
            message: format!("'{}' is not a boolean", value),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let parameters = ConnectionParameters::from_connection_string("").unwrap();
        assert_eq!(parameters, ConnectionParameters::default());
        assert_eq!(parameters.label_length, 4);
    }

    #[test]
    fn test_full_string() {
        let parameters = ConnectionParameters::from_connection_string(
            "ProtocolVersion=1690G; INIFILENAME=/tmp/pdc.ini; deviceLabel=SUB1PMU3; \
             refreshConfigFileOnChange=yes; labelLength=6; port=4712",
        )
        .unwrap();
        assert_eq!(parameters.protocol_version, ProtocolVersion::G);
        assert_eq!(parameters.ini_file_name, Some(PathBuf::from("/tmp/pdc.ini")));
        assert_eq!(parameters.device_label.as_deref(), Some("SUB1PMU3"));
        assert!(parameters.refresh_config_file_on_change);
        assert_eq!(parameters.label_length, 6);

        let again =
            ConnectionParameters::from_connection_string(&parameters.to_connection_string())
                .unwrap();
        assert_eq!(again, parameters);
    }

    #[test]
    fn test_g_requires_description() {
        assert!(matches!(
            ConnectionParameters::from_connection_string("protocolVersion=G; deviceLabel=X"),
            Err(FrameError::InvalidParameter { .. })
        ));
        assert!(matches!(
            ConnectionParameters::from_connection_string("protocolVersion=G; iniFileName=a.ini"),
            Err(FrameError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn test_invalid_values() {
        assert!(matches!(
            ConnectionParameters::from_connection_string("protocolVersion=Z"),
            Err(FrameError::UnsupportedSubVersion { .. })
        ));
        assert!(ConnectionParameters::from_connection_string("labelLength=0").is_err());
        assert!(ConnectionParameters::from_connection_string("labelLength=x").is_err());
        assert!(ConnectionParameters::from_connection_string("refreshConfigFileOnChange=maybe").is_err());
        assert!(ConnectionParameters::from_connection_string("deviceLabel").is_err());
    }
}
