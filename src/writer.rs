//! Output containers.
//!
//! The assembler hands a finished [`SessionRecord`] to a [`ContainerWriter`];
//! nothing upstream knows about the on-disk format.

use serde::Serialize;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::config::DatasetMetadata;
use crate::error::WriteError;
use crate::types::SessionRecord;

/// Persists one assembled subject-session.
pub trait ContainerWriter: Send + Sync {
    /// Writes the container and returns where it went.
    fn write(
        &self,
        record: &SessionRecord,
        metadata: &DatasetMetadata,
    ) -> Result<PathBuf, WriteError>;
}

/// Subject section of a container.
#[derive(Debug, Clone, Serialize)]
pub struct SubjectInfo<'a> {
    pub subject_id: String,
    pub description: String,
    /// Unknown for this cohort; written as `/`
    pub age: &'static str,
    pub species: &'a str,
    pub strain: &'a str,
    pub sex: &'a str,
}

/// Everything written for one session.
#[derive(Debug, Clone, Serialize)]
pub struct ContainerDocument<'a> {
    /// Stable identifier, `<subject>_<context>_<start>`
    pub identifier: String,
    pub session_description: String,
    pub metadata: &'a DatasetMetadata,
    pub subject: SubjectInfo<'a>,
    pub session: &'a SessionRecord,
}

impl<'a> ContainerDocument<'a> {
    pub fn new(record: &'a SessionRecord, metadata: &'a DatasetMetadata) -> Self {
        let key = &record.key;
        ContainerDocument {
            identifier: format!(
                "{}_{}_{}",
                key.subject_label(),
                key.context.label(),
                record.session_start.format("%Y%m%dT%H%M")
            ),
            session_description: format!("{} - {}", key, record.description),
            metadata,
            subject: SubjectInfo {
                subject_id: key.subject_label(),
                description: format!(
                    "Adult {}{} rat ({})",
                    match metadata.sex.as_str() {
                        "M" => "male ",
                        "F" => "female ",
                        _ => "",
                    },
                    metadata.strain,
                    key.subject_label()
                ),
                age: "/",
                species: &metadata.species,
                strain: &metadata.strain,
                sex: &metadata.sex,
            },
            session: record,
        }
    }
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> WriteError {
    let path = path.to_path_buf();
    move |source| WriteError::Io { path, source }
}

/// Writes one `sub-Rat<N>_ses-<context>.json` file per session.
#[derive(Debug, Clone)]
pub struct JsonContainerWriter {
    output_dir: PathBuf,
    pretty: bool,
}

impl JsonContainerWriter {
    pub fn new<P: AsRef<Path>>(output_dir: P) -> Self {
        JsonContainerWriter {
            output_dir: output_dir.as_ref().to_path_buf(),
            pretty: false,
        }
    }

    /// Indented output; files get several times larger.
    pub fn pretty(mut self, pretty: bool) -> Self {
        self.pretty = pretty;
        self
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Path the given session would be written to.
    pub fn path_for(&self, record: &SessionRecord) -> PathBuf {
        self.output_dir.join(format!("{}.json", record.key.file_stem()))
    }
}

impl ContainerWriter for JsonContainerWriter {
    fn write(
        &self,
        record: &SessionRecord,
        metadata: &DatasetMetadata,
    ) -> Result<PathBuf, WriteError> {
        fs::create_dir_all(&self.output_dir).map_err(io_err(&self.output_dir))?;
        let path = self.path_for(record);
        let file = File::create(&path).map_err(io_err(&path))?;
        let mut out = BufWriter::new(file);

        let document = ContainerDocument::new(record, metadata);
        if self.pretty {
            serde_json::to_writer_pretty(&mut out, &document)?;
        } else {
            serde_json::to_writer(&mut out, &document)?;
        }
        out.flush().map_err(io_err(&path))?;

        log::debug!("wrote {}", path.display());
        Ok(path)
    }
}
