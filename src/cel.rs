//! Xclust ASCII spike files (`.CEL`).
//!
//! A CEL file holds the sorted spikes of one cluster during one task. It may
//! start with an Xclust header of `%`-prefixed lines:
//!
//! ```text
//! %%BEGINHEADER
//! % Cluster: 3
//! % Start time: 0:12:05
//! % Fields:	id,2,4,1	t_px,4,4,1	...	time,8,8,1	pos_x,2,2,1	pos_y,2,2,1	head_dir,2,2,1
//! %%ENDHEADER
//! 1 112.0 98.0 ...
//! ```
//!
//! Without a header the columns are taken in the fixed order
//! `id t_px t_py t_pa t_pb t_mx t_my t_ma t_mb t_maxwd t_maxht time [pos_x pos_y] head_dir`.

use std::collections::BTreeMap;

use crate::error::FormatError;
use crate::types::{PixelPosition, SessionType, SpikeRecord, CHANNELS_PER_TETRODE};

/// Head-direction value written when the tracker had no heading.
pub const HEAD_DIR_ABSENT: f64 = -50.0;

// Required columns, in canonical order
const REQUIRED_FIELDS: [&str; 13] = [
    "id", "t_px", "t_py", "t_pa", "t_pb", "t_mx", "t_my", "t_ma", "t_mb", "t_maxwd", "t_maxht",
    "time", "head_dir",
];
const TIME: usize = 11;
const HEAD_DIR: usize = 12;

const WIDTH_WITH_POSITION: usize = 15;
const WIDTH_WITHOUT_POSITION: usize = 13;

/// Key/value lines of an Xclust header.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CelHeader {
    /// Column names from the `Fields` line, if the file had one
    pub fields: Option<Vec<String>>,
    /// Every other `% Key: value` line
    pub entries: BTreeMap<String, String>,
}

impl CelHeader {
    fn absorb(&mut self, line: &str) {
        // `%%BEGINHEADER` / `%%ENDHEADER` markers carry nothing
        if line.starts_with('%') {
            return;
        }
        let Some((key, value)) = line.split_once(':') else {
            return;
        };
        let key = key.trim();
        let value = value.trim();
        if key.eq_ignore_ascii_case("fields") {
            self.fields = Some(parse_field_names(value));
        } else if !key.is_empty() {
            self.entries.insert(key.to_string(), value.to_string());
        }
    }

    /// Looks up a header entry, ignoring case.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    /// Cluster number from the `Cluster` entry.
    pub fn cluster(&self) -> Option<u32> {
        first_number(self.get("Cluster")?)
    }

    /// `Start time` in seconds.
    pub fn start_time_seconds(&self) -> Option<f64> {
        parse_clock(self.get("Start time")?)
    }

    /// `End time` in seconds.
    pub fn end_time_seconds(&self) -> Option<f64> {
        parse_clock(self.get("End time")?)
    }
}

/// A parsed CEL file.
#[derive(Debug, Clone, PartialEq)]
pub struct CelFile {
    pub header: CelHeader,
    /// One record per data row, in file order
    pub records: Vec<SpikeRecord>,
    /// Whether the file carries `pos_x`/`pos_y` columns
    pub has_position: bool,
    /// Rows whose head direction differs from [`HEAD_DIR_ABSENT`]
    pub head_dir_samples: usize,
}

/// Column positions of the fields we read.
#[derive(Debug, Clone)]
struct ColumnLayout {
    width: usize,
    required: [usize; 13],
    position: Option<(usize, usize)>,
}

impl ColumnLayout {
    fn from_names(names: &[String]) -> Result<Self, FormatError> {
        let find = |name: &str| names.iter().position(|n| n.eq_ignore_ascii_case(name));

        let mut required = [0usize; 13];
        for (slot, name) in required.iter_mut().zip(REQUIRED_FIELDS) {
            *slot = find(name).ok_or_else(|| FormatError::MissingField(name.to_string()))?;
        }

        let position = match (find("pos_x"), find("pos_y")) {
            (Some(x), Some(y)) => Some((x, y)),
            (None, None) => None,
            (Some(_), None) => return Err(FormatError::MissingField("pos_y".to_string())),
            (None, Some(_)) => return Err(FormatError::MissingField("pos_x".to_string())),
        };

        Ok(ColumnLayout {
            width: names.len(),
            required,
            position,
        })
    }

    fn headerless(width: usize, line: usize) -> Result<Self, FormatError> {
        let mut required = [0usize; 13];
        for (i, slot) in required.iter_mut().enumerate() {
            *slot = i;
        }
        match width {
            WIDTH_WITH_POSITION => {
                required[HEAD_DIR] = 14;
                Ok(ColumnLayout {
                    width,
                    required,
                    position: Some((12, 13)),
                })
            }
            WIDTH_WITHOUT_POSITION => Ok(ColumnLayout {
                width,
                required,
                position: None,
            }),
            found => Err(FormatError::FieldCount {
                line,
                expected: WIDTH_WITH_POSITION,
                found,
            }),
        }
    }
}

/// Parses the text of one CEL file.
///
/// `session_type` comes from the file name and is stamped on every record.
/// The `time` column is taken as seconds and copied verbatim.
///
/// # Errors
///
/// Any row with a field count different from the header (or from the first
/// row, for headerless files) and any non-numeric field fails the whole file.
/// An empty file is not an error.
pub fn parse_cel(text: &str, session_type: SessionType) -> Result<CelFile, FormatError> {
    let mut header = CelHeader::default();
    let mut rows: Vec<(usize, &str)> = Vec::new();

    for (index, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }
        match line.strip_prefix('%') {
            Some(meta) => header.absorb(meta),
            None => rows.push((index + 1, line)),
        }
    }

    let Some(&(first_line, first_row)) = rows.first() else {
        return Ok(CelFile {
            header,
            records: Vec::new(),
            has_position: false,
            head_dir_samples: 0,
        });
    };

    let layout = match &header.fields {
        Some(names) => ColumnLayout::from_names(names)?,
        None => ColumnLayout::headerless(split_row(first_row).count(), first_line)?,
    };

    let mut records = Vec::with_capacity(rows.len());
    let mut head_dir_samples = 0;
    for (line, row) in rows {
        let tokens: Vec<&str> = split_row(row).collect();
        if tokens.len() != layout.width {
            return Err(FormatError::FieldCount {
                line,
                expected: layout.width,
                found: tokens.len(),
            });
        }
        let value = |slot: usize| -> Result<f64, FormatError> {
            let column = layout.required[slot];
            parse_number(tokens[column], REQUIRED_FIELDS[slot], line)
        };

        // The record id is validated but not kept
        value(0)?;
        let time_seconds = value(TIME)?;
        if !time_seconds.is_finite() {
            return Err(FormatError::NonFiniteTime { line });
        }

        let mut peak_amplitudes = [0.0; CHANNELS_PER_TETRODE];
        let mut waveform_areas = [0.0; CHANNELS_PER_TETRODE];
        for channel in 0..CHANNELS_PER_TETRODE {
            peak_amplitudes[channel] = value(1 + channel)?;
            waveform_areas[channel] = value(5 + channel)?;
        }

        let position = match layout.position {
            Some((x_column, y_column)) => {
                let x = parse_number(tokens[x_column], "pos_x", line)?;
                let y = parse_number(tokens[y_column], "pos_y", line)?;
                (x.is_finite() && y.is_finite()).then_some(PixelPosition { x, y })
            }
            None => None,
        };

        if value(HEAD_DIR)? != HEAD_DIR_ABSENT {
            head_dir_samples += 1;
        }

        records.push(SpikeRecord {
            time_seconds,
            peak_amplitudes,
            waveform_areas,
            waveform_width: value(9)?,
            waveform_height: value(10)?,
            position,
            session_type,
        });
    }

    Ok(CelFile {
        header,
        records,
        has_position: layout.position.is_some(),
        head_dir_samples,
    })
}

/// Splits a data row on whitespace and commas.
fn split_row(row: &str) -> impl Iterator<Item = &str> {
    row.split(|c: char| c.is_whitespace() || c == ',')
        .filter(|token| !token.is_empty())
}

fn parse_number(token: &str, field: &str, line: usize) -> Result<f64, FormatError> {
    token.parse::<f64>().map_err(|_| FormatError::InvalidNumber {
        line,
        field: field.to_string(),
        value: token.to_string(),
    })
}

/// Column names from a `Fields` header value.
///
/// Xclust writes whitespace-separated `name,type,size,count` descriptors;
/// a plain comma-separated list of names is accepted as well.
fn parse_field_names(value: &str) -> Vec<String> {
    if value.split_whitespace().count() > 1 {
        value
            .split_whitespace()
            .filter_map(|descriptor| descriptor.split(',').next())
            .map(str::to_string)
            .collect()
    } else {
        value
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .collect()
    }
}

fn first_number(text: &str) -> Option<u32> {
    let start = text.find(|c: char| c.is_ascii_digit())?;
    let digits: String = text[start..]
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}

/// Parses `H:MM:SS` or `MM:SS` into seconds. Out-of-range values give `None`.
fn parse_clock(text: &str) -> Option<f64> {
    let parts = text
        .trim()
        .split(':')
        .map(|part| part.trim().parse::<u64>())
        .collect::<Result<Vec<_>, _>>()
        .ok()?;
    let (hours, minutes, seconds) = match parts.as_slice() {
        &[h, m, s] => (h, m, s),
        &[m, s] => (0, m, s),
        _ => return None,
    };
    let total = hours
        .checked_mul(3600)?
        .checked_add(minutes.checked_mul(60)?)?
        .checked_add(seconds)?;
    Some(total as f64)
}
