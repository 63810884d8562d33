//! Shared helpers for building small legacy archives on disk.

use neurolab_converter::{
    encode_rma, ContainerWriter, DatasetMetadata, RateMapPair, SessionRecord, WriteError,
};
use ndarray::Array2;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// One spike row without position, in headerless column order.
pub fn cel_row(id: u32, time: f64) -> String {
    format!("{id} 10 20 30 40 1.5 2.5 3.5 4.5 12 80 {time} -50\n")
}

/// One spike row with a tracker position.
pub fn cel_row_with_position(id: u32, time: f64, x: f64, y: f64) -> String {
    format!("{id} 10 20 30 40 1.5 2.5 3.5 4.5 12 80 {time} {x} {y} -50\n")
}

/// An RMA file whose rate map has a single hot bin.
#[allow(unused)]
pub fn rma_bytes(row: usize, col: usize, rate: f32) -> Vec<u8> {
    let mut rate_map = Array2::<f32>::zeros((64, 64));
    rate_map[[row, col]] = rate;
    let occupancy_map = Array2::<i32>::ones((64, 64));
    encode_rma(&RateMapPair {
        rate_map,
        occupancy_map,
    })
    .unwrap()
}

/// Writes `contents` under `root`, creating parent directories.
pub fn put(root: &Path, relative: &str, contents: impl AsRef<[u8]>) -> PathBuf {
    let path = root.join(relative);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(&path, contents).unwrap();
    path
}

/// Every regular file below `dir`, sorted.
pub fn walk(dir: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    let mut pending = vec![dir.to_path_buf()];
    while let Some(dir) = pending.pop() {
        for entry in fs::read_dir(&dir).unwrap() {
            let path = entry.unwrap().path();
            if path.is_dir() {
                pending.push(path);
            } else {
                files.push(path);
            }
        }
    }
    files.sort();
    files
}

/// Keeps written records in memory.
#[allow(unused)]
#[derive(Default)]
pub struct MemoryWriter {
    pub records: Mutex<Vec<SessionRecord>>,
}

#[allow(unused)]
impl MemoryWriter {
    pub fn take(&self) -> Vec<SessionRecord> {
        let mut records = std::mem::take(&mut *self.records.lock().unwrap());
        records.sort_by_key(|r| r.key);
        records
    }
}

impl ContainerWriter for MemoryWriter {
    fn write(
        &self,
        record: &SessionRecord,
        _metadata: &DatasetMetadata,
    ) -> Result<PathBuf, WriteError> {
        self.records.lock().unwrap().push(record.clone());
        Ok(PathBuf::from(format!("memory/{}", record.key.file_stem())))
    }
}
