mod common;
use approx::assert_relative_eq;
use common::*;
use neurolab_converter::{
    convert, load_session, ConversionConfig, Context, JsonContainerWriter, SessionOutcome,
    SessionResolver, SessionType,
};
use neurolab_converter::pipeline::group_sources;
use std::path::Path;

fn sequential() -> ConversionConfig {
    ConversionConfig {
        parallel: false,
        ..ConversionConfig::default()
    }
}

fn flight_day_9(root: &Path) {
    put(
        root,
        "raw/FD9RAT1/TT2/ES1CL3.CEL",
        cel_row_with_position(1, 100.5, 120.0, 88.0) + &cel_row_with_position(2, 101.0, 121.0, 87.0),
    );
    put(root, "raw/FD9RAT1/TT2/BL1CL3.CEL", cel_row(1, 10.0) + &cel_row(2, 12.0));
    put(root, "analyzed/FD9RAT1/TT2/ESCELL~3.RMA", rma_bytes(10, 20, 4.5));
    put(root, "raw/FD9RAT2/TT0/MC1CL1.CEL", cel_row(1, 50.0));
    put(root, "raw/FD9RAT3/TT0/BL1CL1.CEL", cel_row(1, 1.0));
}

#[test]
fn unknown_subject_session_is_excluded() {
    let dir = tempfile::tempdir().unwrap();
    flight_day_9(dir.path());
    let writer = MemoryWriter::default();

    let summary = convert(&walk(dir.path()), &sequential(), &writer);

    assert_eq!(summary.num_written(), 2);
    assert_eq!(summary.unresolved.len(), 1);
    assert!(summary.unresolved[0].path.contains("FD9RAT3"));
    assert!(summary.report("FD9RAT3").is_none());

    let records = writer.take();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].source_folder, "FD9RAT1");
    assert_eq!(records[1].source_folder, "FD9RAT2");
    // rats 1 and 2 share the acquisition time
    assert_eq!(records[0].session_start, records[1].session_start);
    assert_eq!(records[0].key.context, Context::FlightDay(9));
}

#[test]
fn flight_session_carries_units_epochs_position_and_rate_maps() {
    let dir = tempfile::tempdir().unwrap();
    flight_day_9(dir.path());
    let writer = MemoryWriter::default();
    convert(&walk(dir.path()), &sequential(), &writer);

    let rat1 = writer.take().remove(0);
    assert_eq!(rat1.units.len(), 2);
    assert_eq!(rat1.num_spikes(), 4);
    let epochs: Vec<(SessionType, f64, f64)> = rat1
        .epochs
        .iter()
        .map(|e| (e.session_type, e.start_time, e.end_time))
        .collect();
    assert_eq!(
        epochs,
        vec![
            (SessionType::Baseline, 10.0, 12.0),
            (SessionType::EscherStaircase, 100.5, 101.0)
        ]
    );

    assert_relative_eq!(rat1.epochs[1].duration(), 0.5);
    assert_relative_eq!(
        rat1.epochs.iter().map(|e| e.duration()).sum::<f64>(),
        2.5,
        epsilon = 1e-12
    );

    let position = rat1.position.as_ref().unwrap();
    assert_eq!(position.timestamps.to_vec(), vec![100.5, 101.0]);
    assert_eq!(position.xy[[0, 0]], 120.0);

    assert_eq!(rat1.rate_maps.len(), 1);
    let row = &rat1.rate_maps[0];
    let unit = row.unit.unwrap();
    assert_eq!(rat1.units[unit].session_type, SessionType::EscherStaircase);
    assert_relative_eq!(row.maps.rate_map[[10, 20]], 4.5f32);
    assert_eq!(row.maps.total_occupancy(), 4096);
}

#[test]
fn preflight_without_position_has_no_position_series() {
    let dir = tempfile::tempdir().unwrap();
    put(dir.path(), "PREFLI~3/TT4/BL1CL1.CEL", cel_row(1, 3.0) + &cel_row(2, 4.0));
    put(dir.path(), "PREFLI~3/TT4/MC1CL1.CEL", cel_row(1, 30.0));
    let writer = MemoryWriter::default();

    let summary = convert(&walk(dir.path()), &sequential(), &writer);
    assert_eq!(summary.num_written(), 1);

    let record = &writer.take()[0];
    assert!(!record.has_position());
    assert_eq!(record.key.context, Context::Preflight);
    assert_eq!(record.epochs.len(), 2);
    assert_eq!(record.electrode_groups.len(), 1);
    assert_eq!(record.electrode_groups[0].name, "TT4");
}

#[test]
fn broken_files_are_skipped_and_reported() {
    let dir = tempfile::tempdir().unwrap();
    put(dir.path(), "FD4RAT3/TT1/BL1CL1.CEL", cel_row(1, 1.0));
    put(dir.path(), "FD4RAT3/TT1/BLCELL~1.RMA", vec![0u8; 1000]);
    put(dir.path(), "FD4RAT3/TT2/BL1CL1.CEL", "1 2 3\n");
    let writer = MemoryWriter::default();

    let summary = convert(&walk(dir.path()), &sequential(), &writer);
    let report = summary.report("FD4RAT3").unwrap();
    assert!(report.is_success());
    assert_eq!(report.skipped.len(), 2);
    assert!(report.skipped.iter().any(|s| s.path.ends_with("BLCELL~1.RMA")));

    let record = &writer.take()[0];
    assert_eq!(record.units.len(), 1);
    assert!(record.rate_maps.is_empty());
}

#[test]
fn session_with_only_broken_files_fails_alone() {
    let dir = tempfile::tempdir().unwrap();
    put(dir.path(), "FD4RAT1/TT0/BLCELL~1.RMA", vec![0u8; 12]);
    put(dir.path(), "FD4RAT2/TT0/BL1CL1.CEL", cel_row(1, 1.0));
    let writer = MemoryWriter::default();

    let summary = convert(&walk(dir.path()), &ConversionConfig::default(), &writer);
    assert_eq!(summary.num_written(), 1);
    let failed = summary.report("FD4RAT1").unwrap();
    assert!(matches!(failed.outcome, SessionOutcome::Failed(_)));
    assert_eq!(failed.skipped.len(), 1);
    assert!(summary.to_string().contains("FD4RAT1"));
}

#[test]
fn rat2_preflight_tetrodes_are_renumbered() {
    let dir = tempfile::tempdir().unwrap();
    let path = put(dir.path(), "PREFLI~2/TT1/BL1CL1.CEL", cel_row(1, 1.0));
    let config = sequential();
    let resolver = SessionResolver::new(config.tetrode_overrides.clone());

    let (groups, unresolved) = group_sources(&[path], &resolver);
    assert!(unresolved.is_empty());
    let (key, files) = groups.into_iter().next().unwrap();
    let record = load_session(key, files, &config).unwrap();
    assert_eq!(record.electrode_groups[0].name, "TT7");
    assert!(record.electrode_groups[0].description.contains("recorded as TT1"));
}

#[test]
fn stub_limit_keeps_few_files_per_tetrode() {
    let dir = tempfile::tempdir().unwrap();
    for cluster in 1..=4 {
        put(
            dir.path(),
            &format!("FD4RAT1/TT0/BL1CL{cluster}.CEL"),
            cel_row(1, cluster as f64),
        );
    }
    let config = ConversionConfig {
        stub_files_per_tetrode: Some(2),
        ..sequential()
    };
    let writer = MemoryWriter::default();
    convert(&walk(dir.path()), &config, &writer);
    assert_eq!(writer.take()[0].units.len(), 2);
}

#[test]
fn json_containers_land_in_output_directory() {
    let dir = tempfile::tempdir().unwrap();
    flight_day_9(&dir.path().join("archive"));
    let out = dir.path().join("nwb");
    let writer = JsonContainerWriter::new(&out);

    let summary = convert(&walk(&dir.path().join("archive")), &sequential(), &writer);
    assert_eq!(summary.num_written(), 2);
    assert!(out.join("sub-Rat1_ses-fd9.json").is_file());
    assert!(out.join("sub-Rat2_ses-fd9.json").is_file());

    let doc: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(out.join("sub-Rat1_ses-fd9.json")).unwrap())
            .unwrap();
    assert_eq!(doc["metadata"]["institution"], "University of Arizona");
    assert_eq!(doc["session"]["rate_maps"][0]["cell_number"], 3);
}
