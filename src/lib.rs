//! Converter for the 1998 Neurolab (STS-90) hippocampal tetrode recordings.
//!
//! The legacy archive holds two kinds of files per tetrode:
//!
//! - `.CEL`: ASCII spike tables, one row per sorted spike
//! - `.RMA`: 32768-byte big-endian binary files with a 64 × 64 firing-rate
//!   map followed by a 64 × 64 occupancy map
//!
//! Files are attributed to one of eight subject-sessions from their folder
//! names, parsed, merged into one [`SessionRecord`] per subject-session and
//! handed to a [`ContainerWriter`].
//!
//! # Examples
//!
//! ```no_run
//! use neurolab_converter::{convert, ConversionConfig, JsonContainerWriter};
//! use std::path::PathBuf;
//!
//! let paths: Vec<PathBuf> = vec!["raw/FD9RAT1/TT2/ES1CL3.CEL".into()];
//! let summary = convert(&paths, &ConversionConfig::default(), &JsonContainerWriter::new("out"));
//! println!("{} sessions written", summary.num_written());
//! ```

pub mod assembler;
pub mod cel;
pub mod config;
pub mod epoch;
pub mod error;
pub mod pipeline;
mod reader;
pub mod rma;
pub mod session;
pub mod types;
pub mod writer;

// Re-export types
pub use types::*;

pub use assembler::{assemble_session, ParsedCel, ParsedRma, SessionInputs};
pub use cel::{parse_cel, CelFile, CelHeader};
pub use config::{ConversionConfig, DatasetMetadata};
pub use epoch::{segment_epochs, Segmentation, TimestampTie};
pub use error::{AssemblyError, ConfigError, FileError, FormatError, ResolutionError, WriteError};
pub use pipeline::{
    convert, group_sources, load_session, ConversionSummary, SessionOutcome, SessionReport,
};
pub use reader::{load_cel_file, load_rma_file, parse_source, read_with_retries, ParsedSource};
pub use rma::{encode_rma, parse_rma, RMA_FILE_SIZE};
pub use session::{
    lookup_folder, ResolvedFile, SessionEntry, SessionResolver, SourceKind, TetrodeOverride,
    SESSION_TABLE,
};
pub use writer::{ContainerWriter, JsonContainerWriter};
