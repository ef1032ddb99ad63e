//! # Macrodyne Device Configuration
//!
//! This module tracks what a connected Macrodyne device reports and merges it with the
//! external device description. A device only tells the host two things: its online data
//! format word (the `BB 24` response) and its 8-character unit ID (the `BB 48` response).
//! Channel labels, scaling, the station name and the ID code come from the description
//! section whose label matches the device.
//!
//! ## Key Components
//!
//! - `ConfigurationFrame`: The `BB 24` response carrying the online data format word.
//! - `ResolvedView`: A flattened, immutable snapshot of the active configuration: the
//!   effective format word, its layout plan and the phasor and frequency definitions in
//!   use. Decoders only ever read a `ResolvedView`.
//! - `ConfigurationModel`: The long-lived, shared model for one device. It owns the
//!   locally reported fields and the description provider, and publishes a new
//!   `ResolvedView` after every change.
//!
//! ## Usage
//!
//! A `FrameParser` feeds configuration and header frames into the model and takes a
//! snapshot for every data frame. Reloads build the complete replacement view before
//! swapping it in under the write lock, so a decode holding an older snapshot keeps
//! reading one consistent set of definitions.

use super::common::{FrameError, OnlineDataFormatFlags, ProtocolVersion, StatusFlags};
use super::connection::ConnectionParameters;
use super::description::{
    description_image, section_label, DescriptionProvider, DeviceDescription,
    DeviceDescriptionCell, FrequencyDefinition, IniFileProvider, PhasorDefinition,
    DEFAULT_LABEL_LENGTH, DEFAULT_SAMPLE_RATE,
};
use super::endian::EndianOrder;
use super::frame_header::RESPONSE_SYNC;
use super::header_frame::{HeaderFrame, StatusFrame};
use super::layout::{FieldKind, LayoutPlan};
use super::units::NominalFrequency;
use super::utils::push_checksum;
use log::{debug, info, warn};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::sync::mpsc;
use std::sync::Arc;
use std::time::SystemTime;

/// ID code reported for a device that no description section identifies.
pub const DEFAULT_ID_CODE: u16 = 1;

/// Response to `RequestOnlineDataFormat`: `BB 24`, the format word and a checksum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigurationFrame {
    pub online_data_format: OnlineDataFormatFlags,
}

impl ConfigurationFrame {
    pub const LENGTH: usize = 5;

    pub fn new(online_data_format: OnlineDataFormatFlags) -> Self {
        ConfigurationFrame { online_data_format }
    }

    /// Parses a configuration response. The checksum is not verified here.
    pub fn from_hex(bytes: &[u8]) -> Result<Self, FrameError> {
        if bytes.len() != Self::LENGTH {
            return Err(FrameError::TruncatedFrame {
                message: format!(
                    "configuration frame is {} bytes, got {}",
                    Self::LENGTH,
                    bytes.len()
                ),
            });
        }
        let bits: u16 = EndianOrder::BigEndian.decode(bytes, 2)?;
        Ok(ConfigurationFrame {
            online_data_format: OnlineDataFormatFlags::from_bits(bits),
        })
    }

    pub fn to_hex(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::LENGTH);
        out.extend_from_slice(&[RESPONSE_SYNC, 0x24]);
        out.extend_from_slice(&self.online_data_format.bits().to_be_bytes());
        push_checksum(&mut out);
        out
    }
}

/// The configuration in effect at one instant.
///
/// # Fields
///
/// * `protocol_version`: Sub-version of the device.
/// * `online_data_format`: Effective format word (1690G always includes the timestamp).
/// * `station_name`: Description `Name`, else the unit ID, else the configured label.
/// * `id_code`: Description `PMU` index, else `DEFAULT_ID_CODE`.
/// * `nominal_frequency`: Derived from the frequency definition offset.
/// * `frame_rate`: `[CONFIG] SampleRate` of the description, else the default rate.
/// * `phasors`: One definition per phasor slot of `layout`, in slot order.
/// * `frequency`: Frequency and dF/dt scaling.
/// * `digital_labels`: One label per digital word of `layout`.
/// * `bound_section`: Description section in use, if one is bound.
/// * `status_flags`: Last status-1 byte reported by a 1690M unit.
/// * `layout`: Field sequence of data frames under this configuration.
/// * `configured`: Whether the field layout is known. Data frames cannot be decoded
///   before it is.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedView {
    pub protocol_version: ProtocolVersion,
    pub online_data_format: OnlineDataFormatFlags,
    pub station_name: String,
    pub id_code: u16,
    pub nominal_frequency: NominalFrequency,
    pub frame_rate: u16,
    pub phasors: Vec<PhasorDefinition>,
    pub frequency: FrequencyDefinition,
    pub digital_labels: Vec<String>,
    pub bound_section: Option<String>,
    pub status_flags: Option<StatusFlags>,
    pub layout: LayoutPlan,
    pub configured: bool,
}

impl ResolvedView {
    /// A configured view built from a format word alone, with default definitions.
    pub fn local(
        protocol_version: ProtocolVersion,
        online_data_format: OnlineDataFormatFlags,
        station_name: &str,
    ) -> Self {
        resolve(ResolveInputs {
            protocol_version,
            online_data_format: Some(online_data_format),
            station_name: station_name.to_string(),
            status_flags: None,
            description: None,
            cell: None,
        })
    }

    pub fn is_bound(&self) -> bool {
        self.bound_section.is_some()
    }

    /// Channel names in wire order: phasors, frequency, dF/dt, then digitals.
    pub fn channel_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.phasors.iter().map(|p| p.label.clone()).collect();
        names.push(self.frequency.label.clone());
        names.push(format!("{} dF/dt", self.frequency.label));
        names.extend(self.digital_labels.iter().cloned());
        names
    }

    /// The description cell equivalent to this view.
    pub fn to_cell(&self, label_length: usize) -> DeviceDescriptionCell {
        let section = self
            .bound_section
            .clone()
            .unwrap_or_else(|| self.station_name.replace(&['[', ']'][..], ""));
        DeviceDescriptionCell {
            label: section_label(&section, label_length),
            section,
            id_code: self.id_code,
            station_name: self.station_name.clone(),
            phasors: self.phasors.clone(),
            frequency: self.frequency.clone(),
        }
    }
}

struct ResolveInputs<'a> {
    protocol_version: ProtocolVersion,
    online_data_format: Option<OnlineDataFormatFlags>,
    station_name: String,
    status_flags: Option<StatusFlags>,
    description: Option<&'a DeviceDescription>,
    cell: Option<&'a DeviceDescriptionCell>,
}

/// Flattens local fields and an optional bound cell into one view.
///
/// A 1690M format word reported by the device always decides the layout. Without a
/// reported word the cell's phasor count selects the phasor bits. A bound cell always
/// describes exactly the phasors of the layout and supplies every definition; an unbound
/// view uses the default voltage definition for each slot.
fn resolve(inputs: ResolveInputs) -> ResolvedView {
    let version = inputs.protocol_version;
    let default_voltage = inputs
        .description
        .map(|d| d.default_voltage.clone())
        .unwrap_or_else(PhasorDefinition::default_voltage);
    let default_frequency = inputs
        .description
        .map(|d| d.default_frequency.clone())
        .unwrap_or_default();
    let frame_rate = inputs
        .description
        .map_or(DEFAULT_SAMPLE_RATE, |d| d.sample_rate);

    let (flags, phasor_count, configured) = match (inputs.online_data_format, inputs.cell) {
        (Some(wire), _) if version == ProtocolVersion::M => (wire, wire.phasor_count(), true),
        (wire, Some(cell)) => {
            let count = cell.phasors.len();
            let flags = wire
                .unwrap_or_else(|| OnlineDataFormatFlags::from_phasor_count(count))
                .with_phasor_count(count);
            (flags, count, version == ProtocolVersion::G || wire.is_some())
        }
        (Some(wire), None) => (wire, wire.phasor_count(), true),
        (None, None) => (OnlineDataFormatFlags::default(), 1, false),
    };
    let layout = LayoutPlan::build(version, flags, phasor_count)
        .unwrap_or_else(|_| LayoutPlan::from_flags(version, flags));

    let phasors = match inputs.cell {
        Some(cell) => cell.phasors.clone(),
        None => (1..=layout.phasor_count())
            .map(|slot| default_voltage.relabeled(format!("Phasor {}", slot)))
            .collect(),
    };
    let frequency = inputs
        .cell
        .map(|cell| cell.frequency.clone())
        .unwrap_or(default_frequency);
    let digital_labels = layout
        .fields
        .iter()
        .filter_map(|field| match field {
            FieldKind::Digital(n) => Some(format!("Digital {}", n)),
            _ => None,
        })
        .collect();

    ResolvedView {
        protocol_version: version,
        online_data_format: layout.flags,
        station_name: inputs
            .cell
            .map_or(inputs.station_name, |cell| cell.station_name.clone()),
        id_code: inputs.cell.map_or(DEFAULT_ID_CODE, |cell| cell.id_code),
        nominal_frequency: frequency.nominal_frequency(),
        frame_rate,
        phasors,
        frequency,
        digital_labels,
        bound_section: inputs.cell.map(|cell| cell.section.clone()),
        status_flags: inputs.status_flags.filter(|_| version == ProtocolVersion::M),
        layout,
        configured,
    }
}

/// Locally reported fields and the last loaded description.
#[derive(Default)]
struct LocalState {
    online_data_format: Option<OnlineDataFormatFlags>,
    unit_id: Option<String>,
    status_flags: Option<StatusFlags>,
    description: Option<Arc<DeviceDescription>>,
    source_modified: Option<SystemTime>,
    degraded: bool,
}

/// The shared configuration of one device.
///
/// All mutation goes through `state`; each change ends by swapping a freshly resolved
/// view into `view`. Readers call `snapshot()` and never see a partially rebuilt view.
pub struct ConfigurationModel {
    protocol_version: ProtocolVersion,
    label_length: usize,
    device_label: Option<String>,
    refresh_on_change: bool,
    provider: Option<Box<dyn DescriptionProvider>>,
    state: Mutex<LocalState>,
    view: RwLock<Arc<ResolvedView>>,
    subscribers: Mutex<Vec<mpsc::Sender<Arc<ResolvedView>>>>,
}

impl ConfigurationModel {
    /// Creates a model with no reported fields.
    ///
    /// # Parameters
    ///
    /// * `protocol_version`: Sub-version of the device.
    /// * `device_label`: Identifier matched against description section labels. When
    ///   absent, the unit ID from the header frame is used.
    /// * `provider`: Optional description source.
    pub fn new(
        protocol_version: ProtocolVersion,
        device_label: Option<String>,
        provider: Option<Box<dyn DescriptionProvider>>,
    ) -> Self {
        let initial = resolve(ResolveInputs {
            protocol_version,
            online_data_format: None,
            station_name: default_station_name(protocol_version, device_label.as_deref()),
            status_flags: None,
            description: None,
            cell: None,
        });
        ConfigurationModel {
            protocol_version,
            label_length: DEFAULT_LABEL_LENGTH,
            device_label,
            refresh_on_change: false,
            provider,
            state: Mutex::new(LocalState::default()),
            view: RwLock::new(Arc::new(initial)),
            subscribers: Mutex::new(Vec::new()),
        }
    }

    /// Builds a model from connection parameters, reading the description file if one is
    /// named. A missing file only degrades the model to local fields.
    pub fn from_parameters(parameters: &ConnectionParameters) -> Result<Self, FrameError> {
        parameters.validate()?;
        let provider = parameters
            .ini_file_name
            .as_ref()
            .map(|path| Box::new(IniFileProvider::new(path.clone())) as Box<dyn DescriptionProvider>);
        let mut model = ConfigurationModel::new(
            parameters.protocol_version,
            parameters.device_label.clone(),
            provider,
        );
        model.label_length = parameters.label_length;
        model.refresh_on_change = parameters.refresh_config_file_on_change;
        if model.provider.is_some() {
            model.reload();
        }
        Ok(model)
    }

    /// Sets the section-label prefix length.
    pub fn with_label_length(mut self, label_length: usize) -> Self {
        self.label_length = label_length.max(1);
        self
    }

    pub fn protocol_version(&self) -> ProtocolVersion {
        self.protocol_version
    }

    pub fn label_length(&self) -> usize {
        self.label_length
    }

    pub fn refresh_on_change(&self) -> bool {
        self.refresh_on_change
    }

    /// The current view.
    pub fn snapshot(&self) -> Arc<ResolvedView> {
        self.view.read().clone()
    }

    pub fn is_bound(&self) -> bool {
        self.view.read().is_bound()
    }

    pub fn unit_id(&self) -> Option<String> {
        self.state.lock().unit_id.clone()
    }

    /// Receives every view published after this call.
    pub fn subscribe(&self) -> mpsc::Receiver<Arc<ResolvedView>> {
        let (tx, rx) = mpsc::channel();
        self.subscribers.lock().push(tx);
        rx
    }

    /// Records the device's format word and rebinds against a freshly loaded description.
    pub fn apply_configuration_frame(&self, frame: &ConfigurationFrame) -> Arc<ResolvedView> {
        let view = {
            let mut state = self.state.lock();
            if state.online_data_format != Some(frame.online_data_format) {
                info!(
                    "{} online data format is {}",
                    self.protocol_version, frame.online_data_format
                );
            }
            state.online_data_format = Some(frame.online_data_format);
            self.load_description(&mut state);
            self.publish(&state)
        };
        self.notify(&view);
        view
    }

    /// Records the device's unit ID and rebinds. The description is read only if it has
    /// not been loaded yet.
    pub fn apply_header_frame(&self, frame: &HeaderFrame) -> Arc<ResolvedView> {
        let view = {
            let mut state = self.state.lock();
            debug!("Device unit ID is '{}'", frame.unit_id);
            state.unit_id = Some(frame.unit_id.clone());
            if state.description.is_none() {
                self.load_description(&mut state);
            }
            self.publish(&state)
        };
        self.notify(&view);
        view
    }

    /// Records the status-1 byte of a 1690M unit.
    pub fn apply_status_frame(&self, frame: &StatusFrame) -> Arc<ResolvedView> {
        let view = {
            let mut state = self.state.lock();
            if state.status_flags != Some(frame.status_flags) {
                debug!("{} status flags are {}", self.protocol_version, frame.status_flags);
            }
            state.status_flags = Some(frame.status_flags);
            self.publish(&state)
        };
        self.notify(&view);
        view
    }

    /// Reads the description source again and rebinds.
    ///
    /// Reloading an unchanged source publishes a view equal to the previous one.
    pub fn reload(&self) -> Arc<ResolvedView> {
        let view = {
            let mut state = self.state.lock();
            self.load_description(&mut state);
            self.publish(&state)
        };
        self.notify(&view);
        view
    }

    /// Reloads only when the source reports a modification time different from the one
    /// seen at the last load.
    ///
    /// # Returns
    ///
    /// `true` if a reload happened.
    pub fn refresh_if_changed(&self) -> bool {
        let Some(provider) = &self.provider else {
            return false;
        };
        let modified = provider.modified();
        if modified.is_none() || modified == self.state.lock().source_modified {
            return false;
        }
        debug!("Description source {} changed, reloading", provider.name());
        self.reload();
        true
    }

    /// The `BB 24` response image for the current format word.
    pub fn to_configuration_frame(&self) -> Result<ConfigurationFrame, FrameError> {
        let view = self.snapshot();
        if !view.configured {
            return Err(FrameError::MissingConfiguration {
                message: format!("{} online data format is not known", self.protocol_version),
            });
        }
        Ok(ConfigurationFrame::new(view.online_data_format))
    }

    /// The `BB 48` response image, from the unit ID or else the station name.
    pub fn to_header_frame(&self) -> HeaderFrame {
        match self.unit_id() {
            Some(unit_id) => HeaderFrame::new(unit_id),
            None => HeaderFrame::new(self.snapshot().station_name.clone()),
        }
    }

    /// Renders the current view as a description-source document.
    pub fn description_image(&self) -> String {
        let view = self.snapshot();
        description_image(
            &view.station_name,
            view.frame_rate,
            &[view.to_cell(self.label_length)],
        )
    }

    fn load_description(&self, state: &mut LocalState) {
        let Some(provider) = &self.provider else {
            return;
        };
        match provider.load() {
            Ok(source) => {
                let description = DeviceDescription::from_source(source.as_ref(), self.label_length);
                info!(
                    "Loaded {} device description section(s) from {}",
                    description.cells.len(),
                    provider.name()
                );
                state.description = Some(Arc::new(description));
                state.source_modified = provider.modified();
                state.degraded = false;
            }
            Err(err) => {
                if state.degraded {
                    debug!("Description source still unavailable: {}", err);
                } else {
                    warn!("Using reported fields only, description unavailable: {}", err);
                    state.degraded = true;
                }
                state.description = None;
                state.source_modified = None;
            }
        }
    }

    fn select_cell<'a>(
        &self,
        state: &LocalState,
        description: &'a DeviceDescription,
    ) -> Option<&'a DeviceDescriptionCell> {
        let identifier = self.device_label.as_deref().or(state.unit_id.as_deref())?;
        let label = section_label(identifier, self.label_length);
        let Some(cell) = description.find_by_label(&label) else {
            debug!("No description section matches label '{}'", label);
            return None;
        };
        let count = cell.phasors.len();
        if count == 0 || count > self.protocol_version.maximum_phasors() {
            warn!(
                "Section [{}] describes {} phasors, {} devices carry 1 to {}; not binding",
                cell.section,
                count,
                self.protocol_version,
                self.protocol_version.maximum_phasors()
            );
            return None;
        }
        if let Some(wire) = state.online_data_format {
            if self.protocol_version == ProtocolVersion::M && wire.phasor_count() != count {
                warn!(
                    "Section [{}] describes {} phasors, device reports {}; not binding",
                    cell.section,
                    count,
                    wire.phasor_count()
                );
                return None;
            }
        }
        Some(cell)
    }

    /// Resolves the state into a new view and swaps it in. Called with `state` locked.
    fn publish(&self, state: &LocalState) -> Arc<ResolvedView> {
        let description = state.description.as_deref();
        let cell = description.and_then(|d| self.select_cell(state, d));
        let station_name = state
            .unit_id
            .clone()
            .unwrap_or_else(|| default_station_name(self.protocol_version, self.device_label.as_deref()));
        let view = Arc::new(resolve(ResolveInputs {
            protocol_version: self.protocol_version,
            online_data_format: state.online_data_format,
            station_name,
            status_flags: state.status_flags,
            description,
            cell,
        }));

        let mut current = self.view.write();
        if current.bound_section != view.bound_section {
            match &view.bound_section {
                Some(section) => info!("Bound device description section [{}]", section),
                None => info!("No device description bound, using reported fields"),
            }
        }
        *current = view.clone();
        view
    }

    fn notify(&self, view: &Arc<ResolvedView>) {
        self.subscribers
            .lock()
            .retain(|subscriber| subscriber.send(view.clone()).is_ok());
    }
}

fn default_station_name(version: ProtocolVersion, device_label: Option<&str>) -> String {
    device_label
        .map(str::to_string)
        .unwrap_or_else(|| format!("Macrodyne {}", version))
}
