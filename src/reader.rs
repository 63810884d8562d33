use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;
use std::time::Instant;

use crate::assembler::{ParsedCel, ParsedRma};
use crate::cel::{parse_cel, CelFile};
use crate::error::{FileError, ResolutionError};
use crate::rma::parse_rma;
use crate::session::{ResolvedFile, SourceKind};
use crate::types::{RateMapPair, SessionType};

// Buffer size for source reads; CEL files run to a few MB
const READ_BUFFER_SIZE: usize = 65536;

/// A source file after parsing.
#[derive(Debug, Clone)]
pub enum ParsedSource {
    Cel(ParsedCel),
    Rma(ParsedRma),
}

/// Reads a whole file, retrying up to `retries` more times on I/O errors.
pub fn read_with_retries(path: &Path, retries: u32) -> io::Result<Vec<u8>> {
    retry_io(path, retries, || read_all(path))
}

// NotFound is final; anything else is retried
fn retry_io<T>(
    path: &Path,
    retries: u32,
    mut op: impl FnMut() -> io::Result<T>,
) -> io::Result<T> {
    let mut attempt = 0;
    loop {
        match op() {
            Ok(value) => return Ok(value),
            Err(e) if attempt < retries && e.kind() != io::ErrorKind::NotFound => {
                attempt += 1;
                log::debug!(
                    "read of {} failed ({}), retry {}/{}",
                    path.display(),
                    e,
                    attempt,
                    retries
                );
            }
            Err(e) => return Err(e),
        }
    }
}

fn read_all(path: &Path) -> io::Result<Vec<u8>> {
    let file = File::open(path)?;
    let capacity = file.metadata().map(|m| m.len() as usize).unwrap_or(0);
    let mut reader = BufReader::with_capacity(READ_BUFFER_SIZE, file);
    let mut bytes = Vec::with_capacity(capacity);
    reader.read_to_end(&mut bytes)?;
    Ok(bytes)
}

/// Reads and parses one resolved source file.
pub fn parse_source(source: ResolvedFile, retries: u32) -> Result<ParsedSource, FileError> {
    let tic = Instant::now();
    let bytes = read_with_retries(&source.path, retries).map_err(|e| FileError::Io {
        path: source.path.clone(),
        source: e,
    })?;

    let parsed = match source.kind {
        SourceKind::Cel => {
            let session_type = source.session_type.ok_or_else(|| FileError::Resolution {
                path: source.path.clone(),
                source: ResolutionError::MissingSessionType(source.file_name.clone()),
            })?;
            // Not all legacy files are clean ASCII
            let text = String::from_utf8_lossy(&bytes);
            let cel = parse_cel(&text, session_type).map_err(|e| FileError::Format {
                path: source.path.clone(),
                source: e,
            })?;
            log::debug!(
                "{}: {} spikes{} in {:.1} ms",
                source.file_name,
                cel.records.len(),
                if cel.has_position { " with position" } else { "" },
                tic.elapsed().as_secs_f64() * 1e3
            );
            ParsedSource::Cel(ParsedCel { source, cel })
        }
        SourceKind::Rma { .. } => {
            let maps = parse_rma(&bytes).map_err(|e| FileError::Format {
                path: source.path.clone(),
                source: e,
            })?;
            log::debug!(
                "{}: rate map in {:.1} ms",
                source.file_name,
                tic.elapsed().as_secs_f64() * 1e3
            );
            ParsedSource::Rma(ParsedRma { source, maps })
        }
    };

    Ok(parsed)
}

/// Loads a single CEL file.
///
/// # Examples
///
/// ```no_run
/// use neurolab_converter::{load_cel_file, SessionType};
///
/// let cel = load_cel_file("FD4RAT1/TT0/BL1CL1.CEL", SessionType::Baseline).unwrap();
/// println!("{} spikes", cel.records.len());
/// ```
pub fn load_cel_file<P: AsRef<Path>>(
    path: P,
    session_type: SessionType,
) -> Result<CelFile, FileError> {
    let path = path.as_ref();
    let bytes = read_all(path).map_err(|source| FileError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_cel(&String::from_utf8_lossy(&bytes), session_type).map_err(|source| {
        FileError::Format {
            path: path.to_path_buf(),
            source,
        }
    })
}

/// Loads a single RMA file.
///
/// # Examples
///
/// ```no_run
/// use neurolab_converter::load_rma_file;
///
/// let maps = load_rma_file("FD4RAT1/TT0/ESCELL~1.RMA").unwrap();
/// println!("peak bin: {}", maps.rate_map.fold(0.0f32, |a, &b| a.max(b)));
/// ```
pub fn load_rma_file<P: AsRef<Path>>(path: P) -> Result<RateMapPair, FileError> {
    let path = path.as_ref();
    let bytes = read_all(path).map_err(|source| FileError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_rma(&bytes).map_err(|source| FileError::Format {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn missing_file_is_not_retried() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_with_retries(&dir.path().join("nope.CEL"), 5).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn transient_error_is_retried() {
        let path = Path::new("FD4RAT1/TT0/BL1CL1.CEL");
        let mut calls = 0;
        let result = retry_io(path, 2, || {
            calls += 1;
            if calls == 1 {
                Err(io::Error::new(io::ErrorKind::Interrupted, "flaky mount"))
            } else {
                Ok(calls)
            }
        });
        assert_eq!(result.unwrap(), 2);

        let mut calls = 0;
        let err = retry_io(path, 2, || -> io::Result<()> {
            calls += 1;
            Err(io::Error::new(io::ErrorKind::TimedOut, "gone"))
        })
        .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);
        assert_eq!(calls, 3);
    }

    #[test]
    fn loads_single_files() {
        let dir = tempfile::tempdir().unwrap();
        let cel_path = dir.path().join("BL1CL1.CEL");
        fs::write(&cel_path, "1 1 2 3 4 5 6 7 8 9 10 42.125 -50\n").unwrap();
        let cel = load_cel_file(&cel_path, SessionType::Baseline).unwrap();
        assert_eq!(cel.records[0].time_seconds, 42.125);

        let rma_path = dir.path().join("ESCELL~1.RMA");
        fs::write(&rma_path, vec![0u8; 100]).unwrap();
        let err = load_rma_file(&rma_path).unwrap_err();
        assert!(matches!(err, FileError::Format { .. }));
        assert_eq!(err.path(), &rma_path);
    }
}
