use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// A source file whose contents do not match the legacy layout.
#[derive(Debug, Error)]
pub enum FormatError {
    /// An RMA buffer is not exactly 32768 bytes long
    #[error("expected {expected} bytes, got {actual}")]
    RmaLength { expected: usize, actual: usize },
    /// A CEL data row has the wrong number of fields
    #[error("line {line}: expected {expected} fields, found {found}")]
    FieldCount {
        line: usize,
        expected: usize,
        found: usize,
    },
    /// A CEL field is not a number
    #[error("line {line}: field `{field}` is not a number: {value:?}")]
    InvalidNumber {
        line: usize,
        field: String,
        value: String,
    },
    /// A CEL spike time is NaN or infinite
    #[error("line {line}: spike time is not finite")]
    NonFiniteTime { line: usize },
    /// The `Fields` header line lacks a required column
    #[error("header does not list required field `{0}`")]
    MissingField(String),
    #[error("map shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),
}

/// A file name that cannot be mapped onto the session table.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ResolutionError {
    /// No subject folder token (`PREFLI~N`, `FDnRATn`) in the path
    #[error("no known subject/session pattern in {0:?}")]
    UnrecognizedName(String),
    /// The token names a subject-session that was never recorded
    #[error("{folder} does not exist in the session table")]
    UnknownSession { folder: String },
    /// Neither `.CEL` nor `.RMA`
    #[error("unsupported file extension in {0:?}")]
    UnsupportedExtension(String),
    /// A CEL file name without a `BL`/`ES`/`MC` prefix
    #[error("no session type prefix in {0:?}")]
    MissingSessionType(String),
    /// A CEL file without a `TTn` directory or name token
    #[error("no tetrode number in {0:?}")]
    MissingTetrode(String),
}

/// A subject-session that cannot produce a container.
#[derive(Debug, Error)]
pub enum AssemblyError {
    #[error("session {session} has no usable source files")]
    NoUsableFiles { session: String },
}

/// Failure of one source file, tagged with its path.
#[derive(Debug, Error)]
pub enum FileError {
    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("{}: {source}", path.display())]
    Format {
        path: PathBuf,
        #[source]
        source: FormatError,
    },
    #[error("{}: {source}", path.display())]
    Resolution {
        path: PathBuf,
        #[source]
        source: ResolutionError,
    },
}

impl FileError {
    pub fn path(&self) -> &PathBuf {
        match self {
            FileError::Io { path, .. }
            | FileError::Format { path, .. }
            | FileError::Resolution { path, .. } => path,
        }
    }
}

#[derive(Debug, Error)]
pub enum WriteError {
    #[error("cannot write {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("cannot serialize session: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("cannot parse config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}
