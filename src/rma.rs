//! Binary rate-map files (`.RMA`).
//!
//! Layout, 32768 bytes, big-endian regardless of host:
//!
//! | bytes          | content                                   |
//! |----------------|-------------------------------------------|
//! | 0 .. 16384     | 4096 × f32, 64 × 64 rate map (Hz)         |
//! | 16384 .. 32768 | 4096 × i32, 64 × 64 occupancy counts      |

use byteorder::{BigEndian, ByteOrder};
use ndarray::Array2;

use crate::error::FormatError;
use crate::types::{RateMapPair, MAP_BINS, MAP_SIDE};

/// Exact size of every RMA file.
pub const RMA_FILE_SIZE: usize = 32768;

const OCCUPANCY_OFFSET: usize = MAP_BINS * 4;

/// Decodes one RMA buffer into its rate and occupancy maps.
///
/// # Errors
///
/// Returns [`FormatError::RmaLength`] unless `bytes` is exactly
/// [`RMA_FILE_SIZE`] long.
pub fn parse_rma(bytes: &[u8]) -> Result<RateMapPair, FormatError> {
    if bytes.len() != RMA_FILE_SIZE {
        return Err(FormatError::RmaLength {
            expected: RMA_FILE_SIZE,
            actual: bytes.len(),
        });
    }

    let mut rates = vec![0f32; MAP_BINS];
    BigEndian::read_f32_into(&bytes[..OCCUPANCY_OFFSET], &mut rates);

    let mut occupancy = vec![0i32; MAP_BINS];
    BigEndian::read_i32_into(&bytes[OCCUPANCY_OFFSET..], &mut occupancy);

    Ok(RateMapPair {
        rate_map: Array2::from_shape_vec((MAP_SIDE, MAP_SIDE), rates)?,
        occupancy_map: Array2::from_shape_vec((MAP_SIDE, MAP_SIDE), occupancy)?,
    })
}

/// Encodes a map pair back into the 32768-byte RMA layout.
///
/// Bins are written in logical row-major order, whatever the memory layout
/// of the arrays.
pub fn encode_rma(pair: &RateMapPair) -> Result<Vec<u8>, FormatError> {
    let expected = (MAP_SIDE, MAP_SIDE);
    if pair.rate_map.dim() != expected || pair.occupancy_map.dim() != expected {
        return Err(FormatError::RmaLength {
            expected: RMA_FILE_SIZE,
            actual: (pair.rate_map.len() + pair.occupancy_map.len()) * 4,
        });
    }

    let rates: Vec<f32> = pair.rate_map.iter().copied().collect();
    let occupancy: Vec<i32> = pair.occupancy_map.iter().copied().collect();

    let mut bytes = vec![0u8; RMA_FILE_SIZE];
    BigEndian::write_f32_into(&rates, &mut bytes[..OCCUPANCY_OFFSET]);
    BigEndian::write_i32_into(&occupancy, &mut bytes[OCCUPANCY_OFFSET..]);
    Ok(bytes)
}

impl RateMapPair {
    /// Re-encodes the pair in the legacy RMA layout.
    pub fn to_rma_bytes(&self) -> Result<Vec<u8>, FormatError> {
        encode_rma(self)
    }

    /// Total number of occupancy samples over all bins.
    pub fn total_occupancy(&self) -> i64 {
        self.occupancy_map.iter().map(|&count| i64::from(count)).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buffer_with_prefix(prefix: &[u8]) -> Vec<u8> {
        let mut bytes = vec![0u8; RMA_FILE_SIZE];
        bytes[..prefix.len()].copy_from_slice(prefix);
        bytes
    }

    #[test]
    fn rejects_any_other_length() {
        for len in [0, 1, RMA_FILE_SIZE - 1, RMA_FILE_SIZE + 1, 2 * RMA_FILE_SIZE] {
            let err = parse_rma(&vec![0u8; len]).unwrap_err();
            assert!(
                matches!(err, FormatError::RmaLength { expected: RMA_FILE_SIZE, actual } if actual == len)
            );
        }
    }

    #[test]
    fn first_rate_bin_is_big_endian() {
        // 1.5f32 == 0x3FC00000
        let bytes = buffer_with_prefix(&[0x3F, 0xC0, 0x00, 0x00]);
        let pair = parse_rma(&bytes).unwrap();
        assert_eq!(pair.rate_map[[0, 0]], 1.5);
        assert_eq!(pair.rate_map.dim(), (64, 64));
        assert_eq!(pair.occupancy_map.dim(), (64, 64));
        assert_eq!(pair.rate_map.len(), 4096);
        assert_eq!(pair.occupancy_map.len(), 4096);
    }

    #[test]
    fn occupancy_is_signed_and_row_major() {
        let mut bytes = vec![0u8; RMA_FILE_SIZE];
        // bin (1, 2) is index 66
        let offset = OCCUPANCY_OFFSET + 66 * 4;
        bytes[offset..offset + 4].copy_from_slice(&(-3i32).to_be_bytes());
        let last = RMA_FILE_SIZE - 4;
        bytes[last..].copy_from_slice(&42i32.to_be_bytes());

        let pair = parse_rma(&bytes).unwrap();
        assert_eq!(pair.occupancy_map[[1, 2]], -3);
        assert_eq!(pair.occupancy_map[[63, 63]], 42);
        assert_eq!(pair.total_occupancy(), 39);
    }

    #[test]
    fn reencoding_reproduces_the_source_buffer() {
        let mut bytes = vec![0u8; RMA_FILE_SIZE];
        for (i, chunk) in bytes[..OCCUPANCY_OFFSET].chunks_exact_mut(4).enumerate() {
            chunk.copy_from_slice(&(i as f32 * 0.37 - 11.0).to_be_bytes());
        }
        for (i, chunk) in bytes[OCCUPANCY_OFFSET..].chunks_exact_mut(4).enumerate() {
            chunk.copy_from_slice(&(i as i32 - 2000).to_be_bytes());
        }

        let pair = parse_rma(&bytes).unwrap();
        let encoded = pair.to_rma_bytes().unwrap();
        assert_eq!(encoded, bytes);

        let reparsed = parse_rma(&encoded).unwrap();
        for (a, b) in pair.rate_map.iter().zip(reparsed.rate_map.iter()) {
            assert_eq!(a.to_bits(), b.to_bits());
        }
        assert_eq!(pair.occupancy_map, reparsed.occupancy_map);
    }
}
