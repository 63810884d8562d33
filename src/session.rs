//! Session table and file-name resolution.
//!
//! The archive is organised by subject folder (`PREFLI~1`, `FD4RAT2`, ...),
//! then by tetrode directory (`TT0`, `TT1`, ...). File names start with the
//! task code (`BL`, `ES`, `MC`). Rate maps named `CELL~N` belong to one
//! cluster; every other RMA file is a session- or tetrode-level product.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::ResolutionError;
use crate::types::{Context, SessionKey, SessionType};

/// One row of the static session table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionEntry {
    /// Subject folder name in the archive
    pub folder: &'static str,
    pub subject_id: u8,
    pub context: Context,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub description: &'static str,
}

impl SessionEntry {
    pub fn key(&self) -> SessionKey {
        SessionKey {
            subject_id: self.subject_id,
            date: self.date,
            time: self.time,
            context: self.context,
        }
    }
}

const fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    match NaiveDate::from_ymd_opt(year, month, day) {
        Some(date) => date,
        None => panic!("invalid session table date"),
    }
}

const fn clock(hour: u32, minute: u32) -> NaiveTime {
    match NaiveTime::from_hms_opt(hour, minute, 0) {
        Some(time) => time,
        None => panic!("invalid session table time"),
    }
}

/// The eight subject folders of the Neurolab archive (six recording sessions;
/// rats 1 and 2 were recorded together in flight). Times are UTC, taken from
/// the recording directory names in the CEL headers.
pub static SESSION_TABLE: [SessionEntry; 8] = [
    SessionEntry {
        folder: "PREFLI~1",
        subject_id: 1,
        context: Context::Preflight,
        date: date(1998, 4, 14),
        time: clock(12, 53),
        description: "Preflight ground recording - Rat 1. Recorded 3 days before launch at Kennedy Space Center.",
    },
    SessionEntry {
        folder: "PREFLI~2",
        subject_id: 2,
        context: Context::Preflight,
        date: date(1998, 4, 13),
        time: clock(16, 37),
        description: "Preflight ground recording - Rat 2. Recorded 4 days before launch at Kennedy Space Center.",
    },
    SessionEntry {
        folder: "PREFLI~3",
        subject_id: 3,
        context: Context::Preflight,
        date: date(1998, 4, 14),
        time: clock(13, 49),
        description: "Preflight ground recording - Rat 3. Recorded 3 days before launch at Kennedy Space Center.",
    },
    SessionEntry {
        folder: "FD4RAT1",
        subject_id: 1,
        context: Context::FlightDay(4),
        date: date(1998, 4, 20),
        time: clock(9, 57),
        description: "Flight Day 4 recording - Rat 1. Escher Staircase and Magic Carpet tasks with baseline sessions.",
    },
    SessionEntry {
        folder: "FD4RAT2",
        subject_id: 2,
        context: Context::FlightDay(4),
        date: date(1998, 4, 20),
        time: clock(9, 57),
        description: "Flight Day 4 recording - Rat 2. Recorded simultaneously with Rat 1 on shared acquisition system.",
    },
    SessionEntry {
        folder: "FD4RAT3",
        subject_id: 3,
        context: Context::FlightDay(4),
        date: date(1998, 4, 20),
        time: clock(15, 28),
        description: "Flight Day 4 recording - Rat 3. Separate recording session; partial data recovered due to technical issues.",
    },
    SessionEntry {
        folder: "FD9RAT1",
        subject_id: 1,
        context: Context::FlightDay(9),
        date: date(1998, 4, 25),
        time: clock(12, 45),
        description: "Flight Day 9 recording - Rat 1. Escher Staircase and Magic Carpet tasks with baseline sessions.",
    },
    SessionEntry {
        folder: "FD9RAT2",
        subject_id: 2,
        context: Context::FlightDay(9),
        date: date(1998, 4, 25),
        time: clock(12, 45),
        description: "Flight Day 9 recording - Rat 2. Recorded simultaneously with Rat 1 on shared acquisition system.",
    },
];

/// Finds a table entry by subject folder name (case-insensitive).
pub fn lookup_folder(folder: &str) -> Option<&'static SessionEntry> {
    SESSION_TABLE
        .iter()
        .find(|entry| entry.folder.eq_ignore_ascii_case(folder))
}

/// Finds the table entry of a session key.
pub fn lookup_key(key: &SessionKey) -> Option<&'static SessionEntry> {
    SESSION_TABLE.iter().find(|entry| entry.key() == *key)
}

/// Extracts the acquisition time from a recording directory path.
///
/// `/data/SHUTTLE/e100-04.20.98-09:57/TT0` gives 1998-04-20 09:57.
pub fn parse_recording_datetime(directory: &str) -> Option<NaiveDateTime> {
    let start = directory.find("e100-")? + "e100-".len();
    let stamp = directory.get(start..start + 14)?;
    // MM.DD.YY-HH:MM
    let bytes = stamp.as_bytes();
    if bytes[2] != b'.' || bytes[5] != b'.' || bytes[8] != b'-' || bytes[11] != b':' {
        return None;
    }
    let number = |range: std::ops::Range<usize>| stamp.get(range)?.parse::<u32>().ok();
    let month = number(0..2)?;
    let day = number(3..5)?;
    let year_2d = number(6..8)? as i32;
    let hour = number(9..11)?;
    let minute = number(12..14)?;
    let year = if year_2d > 50 { 1900 + year_2d } else { 2000 + year_2d };
    NaiveDate::from_ymd_opt(year, month, day)?.and_hms_opt(hour, minute, 0)
}

/// Renumbers one tetrode of one subject-session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TetrodeOverride {
    pub subject_id: u8,
    pub context: Context,
    /// Number found in the path
    pub from: u32,
    /// Number used in the output
    pub to: u32,
}

/// Rat 2 shared the acquisition system with rat 1 in flight. Its preflight
/// tetrodes are assumed to be numbered from zero on the ground and from six
/// in flight, so TT0-TT5 are moved onto TT6-TT11.
pub fn default_tetrode_overrides() -> Vec<TetrodeOverride> {
    (0..6)
        .map(|tetrode| TetrodeOverride {
            subject_id: 2,
            context: Context::Preflight,
            from: tetrode,
            to: tetrode + 6,
        })
        .collect()
}

/// What a source file contains.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// Spike file of one cluster
    Cel,
    /// Rate-map file; `cell` is set for `CELL~N` names
    Rma { cell: Option<u32> },
}

/// Everything the path of a source file tells us.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedFile {
    pub path: PathBuf,
    /// File name without directories
    pub file_name: String,
    pub key: SessionKey,
    pub entry: &'static SessionEntry,
    pub kind: SourceKind,
    pub session_type: Option<SessionType>,
    /// Tetrode number after overrides
    pub tetrode_id: Option<u32>,
    /// Tetrode number as found in the path
    pub raw_tetrode_id: Option<u32>,
    pub cluster_id: Option<u32>,
}

/// Maps source paths onto the session table.
#[derive(Debug, Clone)]
pub struct SessionResolver {
    overrides: Vec<TetrodeOverride>,
}

impl Default for SessionResolver {
    fn default() -> Self {
        SessionResolver::new(default_tetrode_overrides())
    }
}

impl SessionResolver {
    pub fn new(overrides: Vec<TetrodeOverride>) -> Self {
        SessionResolver { overrides }
    }

    pub fn overrides(&self) -> &[TetrodeOverride] {
        &self.overrides
    }

    /// Resolves one source path.
    ///
    /// The subject folder token may appear as a directory or as a prefix of
    /// the file name; the nearest occurrence wins.
    pub fn resolve(&self, path: &Path) -> Result<ResolvedFile, ResolutionError> {
        let display = path.display().to_string();
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| ResolutionError::UnrecognizedName(display.clone()))?
            .to_string();
        let upper_name = file_name.to_ascii_uppercase();

        let (stem, extension) = match upper_name.rsplit_once('.') {
            Some((stem, extension)) => (stem.to_string(), extension.to_string()),
            None => return Err(ResolutionError::UnsupportedExtension(display)),
        };

        let components: Vec<String> = path
            .iter()
            .filter_map(|component| component.to_str())
            .map(str::to_ascii_uppercase)
            .collect();

        let folder = components
            .iter()
            .rev()
            .find_map(|component| family_token(component))
            .ok_or_else(|| ResolutionError::UnrecognizedName(display.clone()))?;
        let entry = lookup_folder(&folder)
            .ok_or_else(|| ResolutionError::UnknownSession { folder: folder.clone() })?;

        // Drop a leading `FD4RAT1_` so the task code is at the front
        let task_part = stem
            .strip_prefix(folder.as_str())
            .map(|rest| rest.trim_start_matches(['_', '-', ' ']))
            .unwrap_or(&stem);
        let session_type = SessionType::from_prefix(task_part);

        let raw_tetrode_id = components[..components.len().saturating_sub(1)]
            .iter()
            .rev()
            .find_map(|component| component.strip_prefix("TT").and_then(|n| n.parse().ok()))
            .or_else(|| tetrode_token(task_part));
        let tetrode_id = raw_tetrode_id.map(|raw| self.map_tetrode(entry, raw));

        let kind = match extension.as_str() {
            "CEL" | "CELL" => SourceKind::Cel,
            "RMA" => SourceKind::Rma {
                cell: number_after(task_part, "CELL~"),
            },
            _ => return Err(ResolutionError::UnsupportedExtension(display)),
        };

        let cluster_id = match kind {
            SourceKind::Rma { cell } => cell,
            SourceKind::Cel => cluster_token(task_part),
        };

        if kind == SourceKind::Cel {
            if session_type.is_none() {
                return Err(ResolutionError::MissingSessionType(display));
            }
            if tetrode_id.is_none() {
                return Err(ResolutionError::MissingTetrode(display));
            }
        }

        Ok(ResolvedFile {
            path: path.to_path_buf(),
            file_name,
            key: entry.key(),
            entry,
            kind,
            session_type,
            tetrode_id,
            raw_tetrode_id,
            cluster_id,
        })
    }

    fn map_tetrode(&self, entry: &SessionEntry, raw: u32) -> u32 {
        self.overrides
            .iter()
            .find(|o| o.subject_id == entry.subject_id && o.context == entry.context && o.from == raw)
            .map(|o| {
                log::debug!("{}: tetrode TT{} renumbered to TT{}", entry.folder, raw, o.to);
                o.to
            })
            .unwrap_or(raw)
    }
}

/// Recognises `PREFLI~N` and `FDnRATn` at the start of a path component.
fn family_token(component: &str) -> Option<String> {
    if let Some(rest) = component.strip_prefix("PREFLI~") {
        let subject = rest.chars().next()?.to_digit(10)?;
        return Some(format!("PREFLI~{}", subject));
    }
    let rest = component.strip_prefix("FD")?;
    let day_len = rest.chars().take_while(char::is_ascii_digit).count();
    if day_len == 0 {
        return None;
    }
    let (day, rest) = rest.split_at(day_len);
    let subject = rest.strip_prefix("RAT")?.chars().next()?.to_digit(10)?;
    Some(format!("FD{}RAT{}", day, subject))
}

/// Digits immediately following the last occurrence of `marker`.
fn number_after(text: &str, marker: &str) -> Option<u32> {
    let start = text.rfind(marker)? + marker.len();
    let digits: String = text[start..]
        .chars()
        .take_while(char::is_ascii_digit)
        .collect();
    digits.parse().ok()
}

fn tetrode_token(name: &str) -> Option<u32> {
    number_after(name, "TT")
}

/// Cluster number of a CEL file name: `CELL~N`, `CELLN` or `CLN`.
fn cluster_token(name: &str) -> Option<u32> {
    ["CELL~", "CELL", "CL"]
        .iter()
        .find_map(|marker| number_after(name, marker))
}
