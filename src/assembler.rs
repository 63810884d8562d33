//! Merges the parsed files of one subject-session into a [`SessionRecord`].

use ndarray::{Array1, Array2};
use std::collections::BTreeMap;

use crate::cel::CelFile;
use crate::epoch::segment_epochs;
use crate::error::AssemblyError;
use crate::session::{parse_recording_datetime, ResolvedFile, SessionEntry};
use crate::types::*;

/// A CEL file together with what its path resolved to.
#[derive(Debug, Clone)]
pub struct ParsedCel {
    pub source: ResolvedFile,
    pub cel: CelFile,
}

/// An RMA file together with what its path resolved to.
#[derive(Debug, Clone)]
pub struct ParsedRma {
    pub source: ResolvedFile,
    pub maps: RateMapPair,
}

/// All parsed inputs of one subject-session.
#[derive(Debug, Clone)]
pub struct SessionInputs {
    pub entry: &'static SessionEntry,
    pub cels: Vec<ParsedCel>,
    pub rmas: Vec<ParsedRma>,
    /// Files of this session that already failed to read or parse
    pub skipped: Vec<SkippedFile>,
}

impl SessionInputs {
    pub fn new(entry: &'static SessionEntry) -> Self {
        SessionInputs {
            entry,
            cels: Vec::new(),
            rmas: Vec::new(),
            skipped: Vec::new(),
        }
    }
}

/// Builds the session record from everything that parsed.
///
/// Units stay one per CEL file; epochs are derived once from all spikes of the
/// session merged in time order. Partial input is fine, but a session with no
/// parsed file at all is an error.
pub fn assemble_session(
    inputs: SessionInputs,
    electrode_location: &str,
) -> Result<SessionRecord, AssemblyError> {
    let SessionInputs {
        entry,
        mut cels,
        mut rmas,
        skipped,
    } = inputs;
    let key = entry.key();

    if cels.is_empty() && rmas.is_empty() {
        return Err(AssemblyError::NoUsableFiles {
            session: entry.folder.to_string(),
        });
    }

    cels.sort_by(|a, b| {
        (a.source.tetrode_id, &a.source.file_name).cmp(&(b.source.tetrode_id, &b.source.file_name))
    });
    rmas.sort_by(|a, b| {
        (a.source.tetrode_id, &a.source.file_name).cmp(&(b.source.tetrode_id, &b.source.file_name))
    });

    check_recording_directories(entry, &cels);

    let electrode_groups = build_electrode_groups(&cels, &rmas, electrode_location);
    let channels_of: BTreeMap<u32, [usize; CHANNELS_PER_TETRODE]> = electrode_groups
        .iter()
        .map(|group| (group.tetrode_id, group.channels))
        .collect();

    let units: Vec<Unit> = cels
        .iter()
        .filter_map(|parsed| {
            let tetrode_id = parsed.source.tetrode_id?;
            let session_type = parsed.source.session_type?;
            let electrodes = channels_of
                .get(&tetrode_id)
                .map(|channels| channels.to_vec())
                .unwrap_or_default();
            Some(build_unit(parsed, tetrode_id, session_type, electrodes))
        })
        .collect();

    let mut stream: Vec<&SpikeRecord> = cels.iter().flat_map(|p| p.cel.records.iter()).collect();
    stream.sort_by(|a, b| a.time_seconds.total_cmp(&b.time_seconds));
    let segmentation = segment_epochs(stream.iter().copied());
    if !segmentation.ties.is_empty() {
        log::warn!(
            "{}: {} session-type change(s) at identical timestamps",
            entry.folder,
            segmentation.ties.len()
        );
    }

    let position = build_position_series(&stream);

    let rate_maps: Vec<RateMapRow> = rmas
        .into_iter()
        .map(|parsed| {
            let unit = parsed
                .source
                .cluster_id
                .and_then(|cell| link_rate_map(&units, &parsed.source, cell));
            if parsed.source.cluster_id.is_some() && unit.is_none() {
                log::warn!(
                    "{}: no unit for rate map {}, kept as session-level map",
                    entry.folder,
                    parsed.source.file_name
                );
            }
            RateMapRow {
                source_file: parsed.source.file_name,
                tetrode_id: parsed.source.tetrode_id,
                session_type: parsed.source.session_type,
                cell_number: parsed.source.cluster_id,
                unit,
                maps: parsed.maps,
            }
        })
        .collect();

    log::info!(
        "{}: assembled {} units, {} epochs, {} rate maps, {} tetrodes{}",
        entry.folder,
        units.len(),
        segmentation.epochs.len(),
        rate_maps.len(),
        electrode_groups.len(),
        if position.is_some() { ", with position" } else { "" }
    );

    Ok(SessionRecord {
        key,
        source_folder: entry.folder.to_string(),
        session_start: key.start_time(),
        description: entry.description.to_string(),
        units,
        epochs: segmentation.epochs,
        position,
        rate_maps,
        electrode_groups,
        skipped,
    })
}

fn build_electrode_groups(
    cels: &[ParsedCel],
    rmas: &[ParsedRma],
    location: &str,
) -> Vec<ElectrodeGroup> {
    // tetrode -> number found in the path
    let mut tetrodes: BTreeMap<u32, Option<u32>> = BTreeMap::new();
    let sources = cels
        .iter()
        .map(|p| &p.source)
        .chain(rmas.iter().map(|p| &p.source));
    for source in sources {
        if let Some(tetrode_id) = source.tetrode_id {
            tetrodes.entry(tetrode_id).or_insert(source.raw_tetrode_id);
        }
    }

    tetrodes
        .into_iter()
        .enumerate()
        .map(|(index, (tetrode_id, raw))| {
            let first = index * CHANNELS_PER_TETRODE;
            let description = match raw {
                Some(raw) if raw != tetrode_id => {
                    format!("Tetrode TT{} (recorded as TT{})", tetrode_id, raw)
                }
                _ => format!("Tetrode TT{}", tetrode_id),
            };
            ElectrodeGroup {
                name: format!("TT{}", tetrode_id),
                tetrode_id,
                channels: [first, first + 1, first + 2, first + 3],
                description,
                location: location.to_string(),
            }
        })
        .collect()
}

fn build_unit(
    parsed: &ParsedCel,
    tetrode_id: u32,
    session_type: SessionType,
    electrodes: Vec<usize>,
) -> Unit {
    let records = &parsed.cel.records;
    let n = records.len();
    Unit {
        reference: TetrodeClusterRef {
            tetrode_id,
            cluster_id: parsed.source.cluster_id.or_else(|| parsed.cel.header.cluster()),
            source_file: parsed.source.file_name.clone(),
        },
        session_type,
        spike_times: records.iter().map(|r| r.time_seconds).collect::<Array1<f64>>(),
        peak_amplitudes: Array2::from_shape_fn((n, CHANNELS_PER_TETRODE), |(i, c)| {
            records[i].peak_amplitudes[c]
        }),
        waveform_areas: Array2::from_shape_fn((n, CHANNELS_PER_TETRODE), |(i, c)| {
            records[i].waveform_areas[c]
        }),
        waveform_width: records.iter().map(|r| r.waveform_width).collect(),
        waveform_height: records.iter().map(|r| r.waveform_height).collect(),
        electrodes,
        header_start_time: parsed.cel.header.start_time_seconds(),
        header_end_time: parsed.cel.header.end_time_seconds(),
    }
}

/// Position samples of every spike that has one, in time order. Spikes at an
/// already-sampled time add nothing; the first one wins.
fn build_position_series(stream: &[&SpikeRecord]) -> Option<PositionSeries> {
    let mut samples: Vec<(f64, PixelPosition)> = stream
        .iter()
        .filter_map(|r| r.position.map(|p| (r.time_seconds, p)))
        .collect();
    if samples.is_empty() {
        return None;
    }
    samples.dedup_by(|later, earlier| later.0 == earlier.0);

    let n = samples.len();
    Some(PositionSeries {
        timestamps: samples.iter().map(|(t, _)| *t).collect(),
        xy: Array2::from_shape_fn((n, 2), |(i, axis)| {
            let p = samples[i].1;
            if axis == 0 {
                p.x
            } else {
                p.y
            }
        }),
        unit: "pixels".to_string(),
        reference_frame: "Video tracker pixel coordinates".to_string(),
    })
}

/// Index of the unit a `CELL~N` rate map describes: same tetrode and cluster,
/// preferring the same task.
fn link_rate_map(units: &[Unit], source: &ResolvedFile, cell: u32) -> Option<usize> {
    let tetrode_id = source.tetrode_id?;
    let mut candidates = units.iter().enumerate().filter(|(_, unit)| {
        unit.reference.tetrode_id == tetrode_id && unit.reference.cluster_id == Some(cell)
    });
    let first = candidates.next()?;
    if source.session_type.is_none() || source.session_type == Some(first.1.session_type) {
        return Some(first.0);
    }
    candidates
        .find(|(_, unit)| source.session_type == Some(unit.session_type))
        .or(Some(first))
        .map(|(index, _)| index)
}

fn check_recording_directories(entry: &SessionEntry, cels: &[ParsedCel]) {
    let expected = entry.date.and_time(entry.time);
    for parsed in cels {
        let recorded = parsed
            .cel
            .header
            .entries
            .values()
            .find_map(|value| parse_recording_datetime(value));
        if let Some(recorded) = recorded {
            if recorded != expected {
                log::warn!(
                    "{}: header of {} names recording {} but the session table says {}",
                    entry.folder,
                    parsed.source.file_name,
                    recorded,
                    expected
                );
            }
        }
    }
}
