use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use ndarray::{Array1, Array2};
use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

/// Number of bins along each side of a rate or occupancy map.
pub const MAP_SIDE: usize = 64;

/// Number of bins in one rate or occupancy map (64 × 64).
pub const MAP_BINS: usize = MAP_SIDE * MAP_SIDE;

/// Number of recording channels in one tetrode.
pub const CHANNELS_PER_TETRODE: usize = 4;

/// Behavioral task recorded during one part of a session.
///
/// The type is encoded by the first two letters of every CEL file name and of
/// most RMA file names (`BL1.CEL`, `ESCELL~1.RMA`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SessionType {
    /// Baseline laps on the rectangular track
    #[serde(rename = "BL")]
    Baseline,
    /// Escher staircase, the three-dimensional track
    #[serde(rename = "ES")]
    EscherStaircase,
    /// Magic carpet, the flat two-dimensional track
    #[serde(rename = "MC")]
    MagicCarpet,
}

impl SessionType {
    /// Two-letter code used in the legacy file names.
    pub fn code(&self) -> &'static str {
        match self {
            SessionType::Baseline => "BL",
            SessionType::EscherStaircase => "ES",
            SessionType::MagicCarpet => "MC",
        }
    }

    /// Human-readable description of the task.
    pub fn description(&self) -> &'static str {
        match self {
            SessionType::Baseline => "Baseline - rectangular track",
            SessionType::EscherStaircase => {
                "Escher Staircase - three-dimensional track with 90 degree yaw and pitch turns"
            }
            SessionType::MagicCarpet => "Magic Carpet - flat two-dimensional track",
        }
    }

    /// Reads the session type from the leading two letters of a file name.
    ///
    /// Matching is case-insensitive. Returns `None` when the name starts with
    /// anything other than `BL`, `ES` or `MC`.
    pub fn from_prefix(name: &str) -> Option<Self> {
        let prefix = name.get(..2)?.to_ascii_uppercase();
        match prefix.as_str() {
            "BL" => Some(SessionType::Baseline),
            "ES" => Some(SessionType::EscherStaircase),
            "MC" => Some(SessionType::MagicCarpet),
            _ => None,
        }
    }
}

impl fmt::Display for SessionType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Video-tracker position of the animal at the time of a spike.
///
/// Coordinates are camera pixels. No pixel-to-space calibration is known for
/// this dataset, so the values are carried through untouched.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PixelPosition {
    pub x: f64,
    pub y: f64,
}

/// One sorted spike from a CEL file.
///
/// Created from a single data row and never modified afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct SpikeRecord {
    /// Spike time in seconds from the start of the recording, exactly as written
    /// in the file
    pub time_seconds: f64,
    /// Peak amplitude on each of the four tetrode channels (`t_px`..`t_pb`)
    pub peak_amplitudes: [f64; CHANNELS_PER_TETRODE],
    /// Waveform area on each of the four tetrode channels (`t_mx`..`t_mb`)
    pub waveform_areas: [f64; CHANNELS_PER_TETRODE],
    /// Maximum waveform width (`t_maxwd`)
    pub waveform_width: f64,
    /// Maximum waveform height (`t_maxht`)
    pub waveform_height: f64,
    /// Tracker position, present only when the file carries `pos_x`/`pos_y`
    pub position: Option<PixelPosition>,
    /// Task the animal was performing when the spike was recorded
    pub session_type: SessionType,
}

/// Spatial firing-rate map and occupancy map for one cell or one session.
///
/// Both grids are 64 × 64 in row-major order, matching the layout of the
/// legacy RMA file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateMapPair {
    /// Firing rate per spatial bin (Hz)
    pub rate_map: Array2<f32>,
    /// Number of tracker samples that fell in each spatial bin
    pub occupancy_map: Array2<i32>,
}

/// Recording context of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Context {
    /// Ground recording at Kennedy Space Center before launch
    Preflight,
    /// In-flight recording on the given flight day
    FlightDay(u8),
}

impl Context {
    /// Short label used in output file names (`preflight`, `fd4`, `fd9`).
    pub fn label(&self) -> String {
        match self {
            Context::Preflight => "preflight".to_string(),
            Context::FlightDay(day) => format!("fd{}", day),
        }
    }
}

impl fmt::Display for Context {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Context::Preflight => write!(f, "preflight"),
            Context::FlightDay(day) => write!(f, "flight day {}", day),
        }
    }
}

/// Identifies one subject-session, i.e. one output container.
///
/// Rats 1 and 2 were recorded simultaneously in flight, so two keys can share
/// the same date and time while differing in `subject_id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct SessionKey {
    /// Rat number (1..=3)
    pub subject_id: u8,
    /// Acquisition date (UTC)
    pub date: NaiveDate,
    /// Acquisition time of day (UTC)
    pub time: NaiveTime,
    /// Preflight or flight day
    pub context: Context,
}

impl SessionKey {
    /// Acquisition start as a UTC timestamp.
    pub fn start_time(&self) -> DateTime<Utc> {
        self.date.and_time(self.time).and_utc()
    }

    /// Subject label as used in the lab notes (`Rat1`, `Rat2`, `Rat3`).
    pub fn subject_label(&self) -> String {
        format!("Rat{}", self.subject_id)
    }

    /// File stem of the container written for this session.
    pub fn file_stem(&self) -> String {
        format!("sub-{}_ses-{}", self.subject_label(), self.context.label())
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} {} ({} {})",
            self.subject_label(),
            self.context,
            self.date,
            self.time.format("%H:%M")
        )
    }
}

/// Labels one unit-table row and links rate maps to it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct TetrodeClusterRef {
    /// Tetrode number after any numbering override has been applied
    pub tetrode_id: u32,
    /// Cluster number, when the file name or CEL header names one
    pub cluster_id: Option<u32>,
    /// Name of the CEL file the unit was read from
    pub source_file: String,
}

/// A contiguous interval of one behavioral task.
///
/// Serialized with an extra `session_type_description` column.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Epoch {
    pub session_type: SessionType,
    /// Time of the first spike of the run (s)
    pub start_time: f64,
    /// Time of the last spike of the run (s)
    pub end_time: f64,
}

impl Epoch {
    pub fn duration(&self) -> f64 {
        self.end_time - self.start_time
    }
}

impl Serialize for Epoch {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut row = serializer.serialize_struct("Epoch", 4)?;
        row.serialize_field("session_type", &self.session_type)?;
        row.serialize_field("session_type_description", self.session_type.description())?;
        row.serialize_field("start_time", &self.start_time)?;
        row.serialize_field("end_time", &self.end_time)?;
        row.end()
    }
}

/// One row of the unit table: the spikes of one CEL file.
///
/// Spike-wise arrays share the same length and order as `spike_times`.
#[derive(Debug, Clone, Serialize)]
pub struct Unit {
    /// Tetrode, cluster and source file of this unit
    pub reference: TetrodeClusterRef,
    /// Task recorded in the source file
    pub session_type: SessionType,
    /// Spike times (s)
    pub spike_times: Array1<f64>,
    /// Peak amplitudes
    /// - Shape: [num_spikes, 4]
    pub peak_amplitudes: Array2<f64>,
    /// Waveform areas
    /// - Shape: [num_spikes, 4]
    pub waveform_areas: Array2<f64>,
    /// Maximum waveform width per spike
    pub waveform_width: Array1<f64>,
    /// Maximum waveform height per spike
    pub waveform_height: Array1<f64>,
    /// Indices into the session's electrode table (the tetrode's 4 channels)
    pub electrodes: Vec<usize>,
    /// `Start time` from the CEL header (s), kept as provenance
    pub header_start_time: Option<f64>,
    /// `End time` from the CEL header (s), kept as provenance
    pub header_end_time: Option<f64>,
}

impl Unit {
    pub fn num_spikes(&self) -> usize {
        self.spike_times.len()
    }
}

/// Sparse position trace, sampled at spike times.
#[derive(Debug, Clone, Serialize)]
pub struct PositionSeries {
    /// Sample times (s), strictly increasing
    pub timestamps: Array1<f64>,
    /// Tracker coordinates
    /// - Shape: [num_samples, 2] (x, y)
    pub xy: Array2<f64>,
    /// Always `"pixels"`
    pub unit: String,
    pub reference_frame: String,
}

impl PositionSeries {
    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }
}

/// One tetrode and the electrode-table rows of its channels.
#[derive(Debug, Clone, Serialize)]
pub struct ElectrodeGroup {
    /// Group name (`TT3`)
    pub name: String,
    pub tetrode_id: u32,
    /// Electrode-table indices of the four channels
    pub channels: [usize; CHANNELS_PER_TETRODE],
    pub description: String,
    pub location: String,
}

/// One row of the rate-map table.
#[derive(Debug, Clone, Serialize)]
pub struct RateMapRow {
    /// Name of the RMA file
    pub source_file: String,
    /// Tetrode the map belongs to, when the path names one
    pub tetrode_id: Option<u32>,
    /// Task, when the file name starts with a session-type code
    pub session_type: Option<SessionType>,
    /// Cell number from a `CELL~N` file name
    pub cell_number: Option<u32>,
    /// Index of the linked unit-table row; `None` for session-level maps
    pub unit: Option<usize>,
    /// The decoded grids
    pub maps: RateMapPair,
}

/// A source file that did not contribute to the output, and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedFile {
    pub path: String,
    pub reason: String,
}

/// Everything that goes into one output container.
///
/// Built once by the assembler and handed, unchanged, to a container writer.
#[derive(Debug, Clone, Serialize)]
pub struct SessionRecord {
    /// Subject-session identity
    pub key: SessionKey,
    /// Subject folder name in the legacy archive (`FD4RAT1`, `PREFLI~2`, ...)
    pub source_folder: String,
    /// Real acquisition start time
    pub session_start: DateTime<Utc>,
    pub description: String,
    /// One row per CEL file
    pub units: Vec<Unit>,
    /// Session-wide task epochs, ordered by start time
    pub epochs: Vec<Epoch>,
    /// Present only when at least one spike carried a position
    pub position: Option<PositionSeries>,
    pub rate_maps: Vec<RateMapRow>,
    pub electrode_groups: Vec<ElectrodeGroup>,
    /// Files of this session that were excluded
    pub skipped: Vec<SkippedFile>,
}

impl SessionRecord {
    pub fn has_position(&self) -> bool {
        self.position.is_some()
    }

    /// Total number of spikes over all units.
    pub fn num_spikes(&self) -> usize {
        self.units.iter().map(Unit::num_spikes).sum()
    }

    /// Total number of electrode-table rows.
    pub fn num_electrodes(&self) -> usize {
        self.electrode_groups.len() * CHANNELS_PER_TETRODE
    }

    /// Rate-map rows linked to the given unit-table row.
    pub fn rate_maps_for_unit(&self, unit: usize) -> impl Iterator<Item = &RateMapRow> {
        self.rate_maps.iter().filter(move |row| row.unit == Some(unit))
    }
}
