#[cfg(test)]
mod tests {
    use chrono::{Datelike, TimeZone, Utc};
    use phasor_core::macrodyne::commands::DeviceCommand;
    use phasor_core::macrodyne::common::{FrameError, OnlineDataFormatFlags, ProtocolVersion};
    use phasor_core::macrodyne::config::ConfigurationFrame;
    use phasor_core::macrodyne::connection::ConnectionParameters;
    use phasor_core::macrodyne::data_frame::ChecksumPolicy;
    use phasor_core::macrodyne::header_frame::HeaderFrame;
    use phasor_core::macrodyne::parser::{FrameParser, ParsedFrame};
    use phasor_core::macrodyne::random::{random_data_record, seeded_rng};
    use std::fs;
    use std::path::{Path, PathBuf};

    fn test_data(file_name: &str) -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("tests/test_data")
            .join(file_name)
    }

    fn read_hex_file(file_name: &str) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
        let content = fs::read_to_string(test_data(file_name))?;
        let hex_string: String = content.chars().filter(|c| !c.is_whitespace()).collect();
        if hex_string.len() % 2 != 0 {
            return Err("Invalid hex string: odd number of characters".into());
        }
        (0..hex_string.len())
            .step_by(2)
            .map(|i| u8::from_str_radix(&hex_string[i..i + 2], 16).map_err(Into::into))
            .collect()
    }

    fn parameters(text: &str) -> ConnectionParameters {
        let ini = test_data("macrodyne.ini");
        ConnectionParameters::from_connection_string(&format!(
            "iniFileName={}; {}",
            ini.display(),
            text
        ))
        .unwrap()
    }

    #[test]
    fn test_m_session_from_handshake_to_data() {
        let parser = FrameParser::from_parameters(&parameters("protocolVersion=M")).unwrap();
        let initial: Vec<DeviceCommand> = parser
            .initial_commands()
            .unwrap()
            .iter()
            .map(|f| f.command)
            .collect();
        assert_eq!(
            initial,
            vec![DeviceCommand::StopOnlineData, DeviceCommand::RequestUnitIDBufferValue]
        );

        let receive_time = Utc.with_ymd_and_hms(2024, 7, 15, 8, 30, 6).unwrap();
        let header = parser
            .parse(&HeaderFrame::new("SUB1PMU1").to_hex(), receive_time)
            .unwrap();
        assert_eq!(
            parser.follow_up_command(&header).unwrap().command,
            DeviceCommand::RequestOnlineDataFormat
        );
        assert!(parser.model().is_bound());

        let configuration = parser
            .parse(
                &ConfigurationFrame::new(OnlineDataFormatFlags(0x008F)).to_hex(),
                receive_time,
            )
            .unwrap();
        assert_eq!(
            parser.follow_up_command(&configuration).unwrap().command,
            DeviceCommand::StartOnlineData
        );

        let bytes = read_hex_file("m_data_frame.hex").unwrap();
        let record = match parser.parse(&bytes, receive_time).unwrap() {
            ParsedFrame::Data(record) => record,
            other => panic!("expected a data frame, got {:?}", other),
        };
        assert!(parser.follow_up_command(&ParsedFrame::Data(record.clone())).is_none());
        assert_eq!(record.phasors.len(), 3);
        assert_eq!(record.digital1, Some(0x1234));
        assert_eq!(record.timestamp.ordinal(), 196);
        assert!(record.synchronization_is_valid());

        let view = parser.snapshot();
        let measurements = record.to_measurements(&view);
        assert_eq!(measurements.station_name, "North Substation");
        assert_eq!(measurements.id_code, 12);
        let labels: Vec<&str> = measurements.phasors.iter().map(|p| p.label.as_str()).collect();
        assert_eq!(labels, vec!["Bus A Voltage", "Line 1 Current", "Line 2 Current"]);
        assert!((measurements.frequency - 60.02).abs() < 1e-9);
        assert_eq!(
            view.channel_names().last().map(String::as_str),
            Some("Digital 1")
        );
    }

    #[test]
    fn test_m_device_with_too_many_phasors_stays_local() {
        let parser = FrameParser::from_parameters(&parameters("deviceLabel=GEN2")).unwrap();
        parser
            .parse(
                &ConfigurationFrame::new(OnlineDataFormatFlags::from_phasor_count(4)).to_hex(),
                Utc::now(),
            )
            .unwrap();
        let view = parser.snapshot();
        assert!(!view.is_bound());
        assert!(view.configured);
        assert_eq!(view.phasors.len(), 4);
        assert_eq!(view.station_name, "GEN2");
    }

    #[test]
    fn test_g_session_uses_description_layout() {
        let parser = FrameParser::from_parameters(&parameters("protocolVersion=G; deviceLabel=GEN2WEST"))
            .unwrap()
            .with_checksum_policy(ChecksumPolicy::Flag);
        let view = parser.snapshot();
        assert!(view.configured);
        assert_eq!(view.station_name, "West Generator");
        assert_eq!(view.layout.phasor_count(), 12);
        assert_eq!(view.nominal_frequency.hz(), 50.0);

        let receive_time = Utc::now();
        let record = random_data_record(&mut seeded_rng(12), &view.layout, receive_time);
        let mut bytes = record.to_hex(&view).unwrap();
        match parser.parse(&bytes, receive_time).unwrap() {
            ParsedFrame::Data(decoded) => assert_eq!(decoded, record),
            other => panic!("expected a data frame, got {:?}", other),
        }

        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        match parser.parse(&bytes, receive_time).unwrap() {
            ParsedFrame::Data(decoded) => assert!(!decoded.checksum_valid),
            other => panic!("expected a data frame, got {:?}", other),
        }
    }

    #[test]
    fn test_malformed_section_does_not_block_others() {
        let parser = FrameParser::from_parameters(&parameters("deviceLabel=BAD3")).unwrap();
        assert!(!parser.model().is_bound());
        let parser = FrameParser::from_parameters(&parameters("deviceLabel=SUB1")).unwrap();
        assert!(parser.model().is_bound());
        let view = parser.snapshot();
        assert_eq!(view.id_code, 12);
        assert_eq!(view.phasors.len(), 3);
    }

    #[test]
    fn test_short_configuration_response_is_truncated() {
        let parser = FrameParser::from_parameters(&parameters("protocolVersion=M")).unwrap();
        assert!(matches!(
            parser.parse(&[0xBB, 0x24, 0x00], Utc::now()),
            Err(FrameError::TruncatedFrame { .. })
        ));
        assert!(!parser.snapshot().configured);
    }

    #[test]
    fn test_data_before_configuration() {
        let parser = FrameParser::from_parameters(&parameters("protocolVersion=M")).unwrap();
        let bytes = read_hex_file("m_data_frame.hex").unwrap();
        assert!(matches!(
            parser.parse(&bytes, Utc::now()),
            Err(FrameError::MissingConfiguration { .. })
        ));
    }

    #[test]
    fn test_missing_description_file_degrades() {
        let parameters = ConnectionParameters::from_connection_string(
            "iniFileName=/nonexistent/macrodyne.ini; deviceLabel=SUB1",
        )
        .unwrap();
        let parser = FrameParser::from_parameters(&parameters).unwrap();
        parser
            .parse(
                &ConfigurationFrame::new(OnlineDataFormatFlags(0x008F)).to_hex(),
                Utc::now(),
            )
            .unwrap();
        let view = parser.snapshot();
        assert!(!view.is_bound());
        assert!(view.configured);
        assert_eq!(view.phasors.len(), 3);
        assert_eq!(view.protocol_version, ProtocolVersion::M);
    }
}
