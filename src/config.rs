//! Conversion configuration.
//!
//! Every field has a default matching the published dataset, so an empty JSON
//! object is a valid configuration:
//!
//! ```
//! use neurolab_converter::ConversionConfig;
//!
//! let cfg: ConversionConfig = serde_json::from_str(r#"{ "read_retries": 0 }"#).unwrap();
//! assert_eq!(cfg.read_retries, 0);
//! assert!(cfg.parallel);
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;

use crate::error::ConfigError;
use crate::session::{default_tetrode_overrides, TetrodeOverride};

/// Dataset-wide descriptive metadata copied into every container.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetMetadata {
    pub experiment_description: String,
    pub institution: String,
    pub lab: String,
    pub experimenters: Vec<String>,
    pub related_publications: Vec<String>,
    pub keywords: Vec<String>,
    pub species: String,
    pub strain: String,
    pub sex: String,
    /// Recording site of every tetrode
    pub electrode_location: String,
    pub device_description: String,
}

impl Default for DatasetMetadata {
    fn default() -> Self {
        DatasetMetadata {
            experiment_description: "Hippocampal place cell recordings from rats aboard the Space \
                Shuttle during the Neurolab STS-90 mission (April-May 1998). Three rats with \
                chronically implanted tetrode arrays in hippocampal area CA1 traversed a \
                three-dimensional track (Escher staircase) and a flat two-dimensional track \
                (Magic Carpet) for medial forebrain bundle stimulation reward. Recordings were \
                made preflight on the ground and in flight on Flight Day 4 and Flight Day 9. \
                Baseline sessions on a rectangular track were interleaved with task sessions."
                .to_string(),
            institution: "University of Arizona".to_string(),
            lab: "McNaughton Lab".to_string(),
            experimenters: vec![
                "Knierim, James J.".to_string(),
                "McNaughton, Bruce L.".to_string(),
                "Poe, Gina R.".to_string(),
            ],
            related_publications: vec!["doi:10.1038/72910".to_string()],
            keywords: [
                "hippocampus",
                "place cells",
                "tetrode",
                "spaceflight",
                "microgravity",
                "spatial navigation",
                "Neurolab",
                "STS-90",
            ]
            .iter()
            .map(|k| k.to_string())
            .collect(),
            species: "Rattus norvegicus".to_string(),
            strain: "Fischer 344".to_string(),
            sex: "M".to_string(),
            electrode_location: "hippocampal area CA1".to_string(),
            device_description:
                "Multi-electrode tetrode recording array chronically implanted in hippocampal area CA1"
                    .to_string(),
        }
    }
}

/// Settings for one conversion run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversionConfig {
    /// Convert sessions (and the files within a session) on the rayon pool.
    ///
    /// Default: `true`.
    pub parallel: bool,

    /// How many times a failed file read is retried before the file is skipped.
    ///
    /// Default: `2`.
    pub read_retries: u32,

    /// Keep at most this many CEL and RMA files per tetrode directory, for quick
    /// trial runs over the full archive.
    ///
    /// Default: `None` (all files).
    pub stub_files_per_tetrode: Option<usize>,

    /// Tetrode renumbering table. Only entries for the subject-session being
    /// resolved are consulted; everything else keeps the number in the path.
    ///
    /// Default: rat 2 preflight TT0-TT5 onto TT6-TT11.
    pub tetrode_overrides: Vec<TetrodeOverride>,

    pub metadata: DatasetMetadata,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        ConversionConfig {
            parallel: true,
            read_retries: 2,
            stub_files_per_tetrode: None,
            tetrode_overrides: default_tetrode_overrides(),
            metadata: DatasetMetadata::default(),
        }
    }
}

impl ConversionConfig {
    /// Reads and validates a JSON configuration file.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: ConversionConfig = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects override tables that renumber the same tetrode twice.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for o in &self.tetrode_overrides {
            if !(1..=3).contains(&o.subject_id) {
                return Err(ConfigError::Invalid(format!(
                    "tetrode override for unknown subject {}",
                    o.subject_id
                )));
            }
            if !seen.insert((o.subject_id, o.context, o.from)) {
                return Err(ConfigError::Invalid(format!(
                    "tetrode TT{} of rat {} ({}) is overridden twice",
                    o.from, o.subject_id, o.context
                )));
            }
        }
        if self.stub_files_per_tetrode == Some(0) {
            return Err(ConfigError::Invalid(
                "stub_files_per_tetrode must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Context;
    use std::io::Write;

    #[test]
    fn defaults_are_valid() {
        let cfg = ConversionConfig::default();
        cfg.validate().unwrap();
        assert!(cfg.tetrode_overrides.iter().all(|o| o.subject_id == 2));
        assert_eq!(cfg.metadata.species, "Rattus norvegicus");
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let cfg: ConversionConfig = serde_json::from_str(
            r#"{
                "parallel": false,
                "tetrode_overrides": [
                    { "subject_id": 2, "context": { "flight_day": 4 }, "from": 9, "to": 3 }
                ],
                "metadata": { "lab": "Somewhere" }
            }"#,
        )
        .unwrap();
        assert!(!cfg.parallel);
        assert_eq!(cfg.read_retries, 2);
        assert_eq!(cfg.tetrode_overrides.len(), 1);
        assert_eq!(cfg.tetrode_overrides[0].context, Context::FlightDay(4));
        assert_eq!(cfg.metadata.lab, "Somewhere");
        assert_eq!(cfg.metadata.strain, "Fischer 344");
    }

    #[test]
    fn duplicate_override_is_rejected() {
        let mut cfg = ConversionConfig::default();
        let first = cfg.tetrode_overrides[0];
        cfg.tetrode_overrides.push(first);
        assert!(matches!(cfg.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn reads_config_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "stub_files_per_tetrode": 2 }}"#).unwrap();
        let cfg = ConversionConfig::from_json_file(file.path()).unwrap();
        assert_eq!(cfg.stub_files_per_tetrode, Some(2));

        let mut bad = tempfile::NamedTempFile::new().unwrap();
        write!(bad, r#"{{ "stub_files_per_tetrode": 0 }}"#).unwrap();
        assert!(ConversionConfig::from_json_file(bad.path()).is_err());
    }
}
