use chrono::Utc;
use clap::{Args, Parser, Subcommand, ValueEnum};
use phasor_core::macrodyne::commands::{CommandFrame, CommandType, DeviceCommand};
use phasor_core::macrodyne::common::{OnlineDataFormatFlags, ProtocolVersion};
use phasor_core::macrodyne::config::{ConfigurationFrame, ConfigurationModel, ResolvedView};
use phasor_core::macrodyne::connection::ConnectionParameters;
use phasor_core::macrodyne::data_frame::{ChecksumPolicy, DataFrameRecord};
use phasor_core::macrodyne::layout::LayoutPlan;
use phasor_core::macrodyne::parser::{FrameParser, ParsedFrame};
use serde::Serialize;
use std::error::Error;
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Debug, Parser)]
#[command(name = "phasor-cli")]
#[command(about = "Decode and build Macrodyne 1690M/1690G frames", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Decode one hex-encoded frame and print it as JSON.
    #[command(arg_required_else_help = true)]
    Decode {
        /// Frame bytes as hex; whitespace is ignored.
        hex: String,
        #[command(flatten)]
        device: DeviceArgs,
        /// Online data format word, e.g. 0x008F. Not needed when a description binds.
        #[arg(long, value_parser = parse_format)]
        format: Option<u16>,
        /// Deliver frames with a bad checksum instead of rejecting them.
        #[arg(long)]
        allow_bad_checksum: bool,
    },
    /// Encode a command frame.
    #[command(arg_required_else_help = true)]
    Command {
        #[arg(value_enum)]
        command: CommandArg,
        #[arg(long, value_enum, default_value_t = VersionArg::M)]
        protocol: VersionArg,
    },
    /// Encode a command frame from its native code, e.g. 0xCC3A.
    #[command(arg_required_else_help = true)]
    Native {
        #[arg(value_parser = parse_format)]
        code: u16,
    },
    /// Print the data frame layout of a format word.
    #[command(arg_required_else_help = true)]
    Layout {
        #[arg(value_parser = parse_format)]
        format: u16,
        #[arg(long, value_enum, default_value_t = VersionArg::M)]
        protocol: VersionArg,
        /// Described phasor count (1690G channels beyond ten).
        #[arg(long)]
        phasors: Option<usize>,
    },
    /// Print the description image of a device as the model resolves it.
    Ini {
        #[command(flatten)]
        device: DeviceArgs,
        #[arg(long, value_parser = parse_format)]
        format: Option<u16>,
    },
}

#[derive(Debug, Args)]
struct DeviceArgs {
    /// Connection string, e.g. "protocolVersion=G; iniFileName=pdc.ini; deviceLabel=SUB1".
    #[arg(long, default_value = "")]
    connection: String,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum VersionArg {
    M,
    G,
}

impl From<VersionArg> for ProtocolVersion {
    fn from(value: VersionArg) -> Self {
        match value {
            VersionArg::M => ProtocolVersion::M,
            VersionArg::G => ProtocolVersion::G,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum CommandArg {
    Start,
    Stop,
    Header,
    Config1,
    Config2,
    Config3,
}

impl From<CommandArg> for CommandType {
    fn from(value: CommandArg) -> Self {
        match value {
            CommandArg::Start => CommandType::EnableRealTimeData,
            CommandArg::Stop => CommandType::DisableRealTimeData,
            CommandArg::Header => CommandType::SendHeaderFrame,
            CommandArg::Config1 => CommandType::SendConfigurationFrame1,
            CommandArg::Config2 => CommandType::SendConfigurationFrame2,
            CommandArg::Config3 => CommandType::SendConfigurationFrame3,
        }
    }
}

fn parse_format(text: &str) -> Result<u16, String> {
    let trimmed = text.trim();
    let parsed = match trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
    {
        Some(hex) => u16::from_str_radix(hex, 16),
        None => trimmed.parse(),
    };
    parsed.map_err(|e| format!("'{}' is not a 16-bit value: {}", text, e))
}

fn parse_hex(text: &str) -> Result<Vec<u8>, Box<dyn Error>> {
    let digits: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    if digits.len() % 2 != 0 {
        return Err("Invalid hex string: odd number of characters".into());
    }
    (0..digits.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&digits[i..i + 2], 16).map_err(Into::into))
        .collect()
}

fn to_hex_string(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02X}", b)).collect()
}

fn print_json<T: Serialize>(value: &T) -> Result<(), Box<dyn Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn build_model(device: &DeviceArgs, format: Option<u16>) -> Result<Arc<ConfigurationModel>, Box<dyn Error>> {
    let parameters = ConnectionParameters::from_connection_string(&device.connection)?;
    info!("Connection parameters: {}", parameters.to_connection_string());
    let model = Arc::new(ConfigurationModel::from_parameters(&parameters)?);
    if let Some(bits) = format {
        model.apply_configuration_frame(&ConfigurationFrame::new(OnlineDataFormatFlags(bits)));
    }
    Ok(model)
}

#[derive(Serialize)]
struct DecodedData<'a> {
    record: &'a DataFrameRecord,
    status: u16,
    synchronization_is_valid: bool,
    measurements: phasor_core::macrodyne::data_frame::DataFrameMeasurements,
}

fn decode(hex: &str, device: &DeviceArgs, format: Option<u16>, allow_bad_checksum: bool) -> Result<(), Box<dyn Error>> {
    let bytes = parse_hex(hex)?;
    let model = build_model(device, format)?;
    let policy = if allow_bad_checksum {
        ChecksumPolicy::Flag
    } else {
        ChecksumPolicy::Reject
    };
    let parser = FrameParser::new(model).with_checksum_policy(policy);
    match parser.parse(&bytes, Utc::now())? {
        ParsedFrame::Data(record) => {
            let view: Arc<ResolvedView> = parser.snapshot();
            if !record.checksum_valid {
                warn!("Frame checksum does not match");
            }
            print_json(&DecodedData {
                record: &record,
                status: record.status(),
                synchronization_is_valid: record.synchronization_is_valid(),
                measurements: record.to_measurements(&view),
            })
        }
        other => {
            if let Some(next) = parser.follow_up_command(&other) {
                info!("Next command: {} ({})", next.command, to_hex_string(&next.to_hex()));
            }
            print_json(&other)
        }
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn Error>> {
    match cli.command {
        Commands::Decode {
            hex,
            device,
            format,
            allow_bad_checksum,
        } => decode(&hex, &device, format, allow_bad_checksum),
        Commands::Command { command, protocol } => {
            let frame = CommandFrame::new(command.into(), protocol.into())?;
            println!("{}", to_hex_string(&frame.to_hex()));
            info!("{}", frame.command);
            Ok(())
        }
        Commands::Native { code } => {
            let command = DeviceCommand::try_from(code)?;
            let frame = CommandFrame::from_device_command(command, ProtocolVersion::M)?;
            println!("{}", to_hex_string(&frame.to_hex()));
            info!("{}", frame.command);
            Ok(())
        }
        Commands::Layout {
            format,
            protocol,
            phasors,
        } => {
            let flags = OnlineDataFormatFlags(format);
            let plan = LayoutPlan::build(
                protocol.into(),
                flags,
                phasors.unwrap_or_else(|| flags.phasor_count()),
            )?;
            info!("{}", plan.flags);
            print_json(&plan)
        }
        Commands::Ini { device, format } => {
            let model = build_model(&device, format)?;
            if !model.is_bound() {
                warn!("No description section bound; printing reported fields only");
            }
            print!("{}", model.description_image());
            Ok(())
        }
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        error!("{}", e);
        std::process::exit(1);
    }
}
