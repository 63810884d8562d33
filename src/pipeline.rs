//! Runs the conversion over a set of source files.
//!
//! Files are resolved and grouped per subject-session; every session is then
//! read, assembled and written on its own, so one broken session never stops
//! the others.

use rayon::prelude::*;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::assembler::{assemble_session, SessionInputs};
use crate::config::ConversionConfig;
use crate::error::AssemblyError;
use crate::reader::{parse_source, ParsedSource};
use crate::session::{lookup_key, ResolvedFile, SessionResolver};
use crate::types::{SessionKey, SessionRecord, SkippedFile};
use crate::writer::ContainerWriter;

/// What happened to one subject-session.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionOutcome {
    Written {
        path: PathBuf,
        units: usize,
        spikes: usize,
        epochs: usize,
        rate_maps: usize,
        electrode_groups: usize,
        has_position: bool,
    },
    Failed(String),
}

/// Per-session line of the conversion summary.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionReport {
    pub key: SessionKey,
    /// Subject folder name
    pub folder: String,
    pub outcome: SessionOutcome,
    /// Files of this session that were excluded
    pub skipped: Vec<SkippedFile>,
}

impl SessionReport {
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, SessionOutcome::Written { .. })
    }
}

/// Result of a whole conversion run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConversionSummary {
    /// One report per subject-session, in session order
    pub sessions: Vec<SessionReport>,
    /// Files that could not be attributed to any session
    pub unresolved: Vec<SkippedFile>,
}

impl ConversionSummary {
    pub fn num_written(&self) -> usize {
        self.sessions.iter().filter(|s| s.is_success()).count()
    }

    pub fn report(&self, folder: &str) -> Option<&SessionReport> {
        self.sessions.iter().find(|s| s.folder == folder)
    }
}

impl fmt::Display for ConversionSummary {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for report in &self.sessions {
            match &report.outcome {
                SessionOutcome::Written {
                    path,
                    units,
                    spikes,
                    epochs,
                    rate_maps,
                    electrode_groups,
                    has_position,
                } => writeln!(
                    f,
                    "{} ({}): {} units / {} spikes, {} epochs, {} rate maps, {} tetrodes, position {} -> {}",
                    report.folder,
                    report.key,
                    units,
                    spikes,
                    epochs,
                    rate_maps,
                    electrode_groups,
                    if *has_position { "yes" } else { "no" },
                    path.display()
                )?,
                SessionOutcome::Failed(reason) => {
                    writeln!(f, "{} ({}): FAILED: {}", report.folder, report.key, reason)?
                }
            }
            for skipped in &report.skipped {
                writeln!(f, "    skipped {}: {}", skipped.path, skipped.reason)?;
            }
        }
        if !self.unresolved.is_empty() {
            writeln!(f, "unresolved files:")?;
            for skipped in &self.unresolved {
                writeln!(f, "    {}: {}", skipped.path, skipped.reason)?;
            }
        }
        Ok(())
    }
}

/// Resolves every path and groups the results by subject-session.
///
/// Paths that do not resolve are returned separately and logged as warnings.
pub fn group_sources<P: AsRef<Path>>(
    paths: &[P],
    resolver: &SessionResolver,
) -> (BTreeMap<SessionKey, Vec<ResolvedFile>>, Vec<SkippedFile>) {
    let mut groups: BTreeMap<SessionKey, Vec<ResolvedFile>> = BTreeMap::new();
    let mut unresolved = Vec::new();

    for path in paths {
        let path = path.as_ref();
        match resolver.resolve(path) {
            Ok(file) => groups.entry(file.key).or_default().push(file),
            Err(e) => {
                log::warn!("skipping {}: {}", path.display(), e);
                unresolved.push(SkippedFile {
                    path: path.display().to_string(),
                    reason: e.to_string(),
                });
            }
        }
    }

    (groups, unresolved)
}

/// Keeps at most `limit` CEL and `limit` RMA files per tetrode.
fn apply_stub_limit(files: Vec<ResolvedFile>, limit: Option<usize>) -> Vec<ResolvedFile> {
    let Some(limit) = limit else {
        return files;
    };
    let mut files = files;
    files.sort_by(|a, b| a.path.cmp(&b.path));
    let mut counts: BTreeMap<(Option<u32>, bool), usize> = BTreeMap::new();
    files
        .into_iter()
        .filter(|file| {
            let is_cel = file.kind == crate::session::SourceKind::Cel;
            let count = counts.entry((file.tetrode_id, is_cel)).or_insert(0);
            *count += 1;
            *count <= limit
        })
        .collect()
}

/// Reads and parses every file of one subject-session.
///
/// Failures are collected in [`SessionInputs::skipped`] rather than returned.
fn parse_session_files(
    key: SessionKey,
    files: Vec<ResolvedFile>,
    config: &ConversionConfig,
) -> Result<SessionInputs, AssemblyError> {
    let entry = lookup_key(&key).ok_or_else(|| AssemblyError::NoUsableFiles {
        session: key.to_string(),
    })?;
    let files = apply_stub_limit(files, config.stub_files_per_tetrode);
    let retries = config.read_retries;

    let results: Vec<_> = if config.parallel {
        files
            .into_par_iter()
            .map(|file| parse_source(file, retries))
            .collect()
    } else {
        files
            .into_iter()
            .map(|file| parse_source(file, retries))
            .collect()
    };

    let mut inputs = SessionInputs::new(entry);
    for result in results {
        match result {
            Ok(ParsedSource::Cel(cel)) => inputs.cels.push(cel),
            Ok(ParsedSource::Rma(rma)) => inputs.rmas.push(rma),
            Err(e) => {
                log::warn!("{}: skipping {}", entry.folder, e);
                inputs.skipped.push(SkippedFile {
                    path: e.path().display().to_string(),
                    reason: e.to_string(),
                });
            }
        }
    }
    Ok(inputs)
}

/// Reads, parses and assembles one subject-session without writing it.
///
/// Every file is attempted; failures are recorded in
/// [`SessionRecord::skipped`]. Fails only when nothing at all could be used.
pub fn load_session(
    key: SessionKey,
    files: Vec<ResolvedFile>,
    config: &ConversionConfig,
) -> Result<SessionRecord, AssemblyError> {
    let inputs = parse_session_files(key, files, config)?;
    assemble_session(inputs, &config.metadata.electrode_location)
}

fn convert_session(
    key: SessionKey,
    files: Vec<ResolvedFile>,
    config: &ConversionConfig,
    writer: &dyn ContainerWriter,
) -> SessionReport {
    let tic = Instant::now();
    let folder = files
        .first()
        .map(|f| f.entry.folder.to_string())
        .unwrap_or_else(|| key.to_string());
    log::info!("converting {} ({} source files)", folder, files.len());

    let failed = |e: AssemblyError, skipped: Vec<SkippedFile>| {
        log::error!("{}: {}", folder, e);
        SessionReport {
            key,
            folder: folder.clone(),
            outcome: SessionOutcome::Failed(e.to_string()),
            skipped,
        }
    };

    let inputs = match parse_session_files(key, files, config) {
        Ok(inputs) => inputs,
        Err(e) => return failed(e, Vec::new()),
    };
    let skipped = inputs.skipped.clone();
    let record = match assemble_session(inputs, &config.metadata.electrode_location) {
        Ok(record) => record,
        Err(e) => return failed(e, skipped),
    };

    let outcome = match writer.write(&record, &config.metadata) {
        Ok(path) => {
            log::info!(
                "{}: wrote {} in {:.1} s",
                folder,
                path.display(),
                tic.elapsed().as_secs_f64()
            );
            SessionOutcome::Written {
                path,
                units: record.units.len(),
                spikes: record.num_spikes(),
                epochs: record.epochs.len(),
                rate_maps: record.rate_maps.len(),
                electrode_groups: record.electrode_groups.len(),
                has_position: record.has_position(),
            }
        }
        Err(e) => {
            log::error!("{}: {}", folder, e);
            SessionOutcome::Failed(e.to_string())
        }
    };

    SessionReport {
        key,
        folder,
        outcome,
        skipped: record.skipped,
    }
}

/// Converts every subject-session found among `paths`.
///
/// # Examples
///
/// ```no_run
/// use neurolab_converter::{convert, ConversionConfig, JsonContainerWriter};
/// use std::path::PathBuf;
///
/// let paths = vec![
///     PathBuf::from("raw/FD4RAT1/TT0/BL1CL1.CEL"),
///     PathBuf::from("analyzed/FD4RAT1/TT0/BLCELL~1.RMA"),
/// ];
/// let writer = JsonContainerWriter::new("nwb_out");
/// let summary = convert(&paths, &ConversionConfig::default(), &writer);
/// print!("{}", summary);
/// ```
pub fn convert<P: AsRef<Path>>(
    paths: &[P],
    config: &ConversionConfig,
    writer: &dyn ContainerWriter,
) -> ConversionSummary {
    let resolver = SessionResolver::new(config.tetrode_overrides.clone());
    let (groups, unresolved) = group_sources(paths, &resolver);
    log::info!(
        "{} source files in {} sessions, {} unresolved",
        paths.len() - unresolved.len(),
        groups.len(),
        unresolved.len()
    );

    let sessions: Vec<SessionReport> = if config.parallel {
        groups
            .into_par_iter()
            .map(|(key, files)| convert_session(key, files, config, writer))
            .collect()
    } else {
        groups
            .into_iter()
            .map(|(key, files)| convert_session(key, files, config, writer))
            .collect()
    };

    ConversionSummary {
        sessions,
        unresolved,
    }
}
