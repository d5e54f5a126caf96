use std::fs::File;
use std::path::{
    Path,
    PathBuf,
};

use tracing::info;
use zstd::stream::read::Decoder;
use zstd::stream::write::Encoder;

use crate::errors::{
    PeakIndexError,
    Result,
};
use crate::models::index::PeakIndex;

/// Location of the serialized index for a run under a scratch directory.
///
/// One file per run, keyed by the run's position in the experiment so the
/// same run id always rehydrates the same index.
pub fn index_cache_path(scratch_dir: &Path, run_id: usize) -> PathBuf {
    scratch_dir.join(format!("run_{:04}.peakidx.zst", run_id))
}

// Save with compression
pub fn save_compressed(index: &PeakIndex, path: &Path) -> Result<()> {
    let file = File::create(path).map_err(|source| PeakIndexError::Io {
        source,
        path: Some(path.to_path_buf()),
    })?;
    let mut encoder = Encoder::new(file, 3).map_err(|source| PeakIndexError::Io {
        source,
        path: Some(path.to_path_buf()),
    })?;
    bincode::serialize_into(&mut encoder, index).map_err(|source| {
        PeakIndexError::Serialization {
            source,
            context: "serializing peak index",
        }
    })?;
    encoder.finish().map_err(|source| PeakIndexError::Io {
        source,
        path: Some(path.to_path_buf()),
    })?;
    Ok(())
}

// Load with decompression
pub fn load_compressed(path: &Path) -> Result<PeakIndex> {
    let st = std::time::Instant::now();
    let file = File::open(path).map_err(|source| PeakIndexError::Io {
        source,
        path: Some(path.to_path_buf()),
    })?;
    let decoder = Decoder::new(file).map_err(|source| PeakIndexError::Io {
        source,
        path: Some(path.to_path_buf()),
    })?;
    let index: PeakIndex =
        bincode::deserialize_from(decoder).map_err(|source| PeakIndexError::Serialization {
            source,
            context: "deserializing peak index",
        })?;
    info!(
        "Rehydrated peak index from {:?} ({} peaks) in {:?}",
        path,
        index.num_peaks(),
        st.elapsed()
    );
    Ok(index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::index::PeakIndexBuilder;
    use crate::models::peak::Ms1ScanInfo;
    use crate::models::tolerance::MzTolerance;
    use crate::mz_to_neutral_mass;

    #[test]
    fn test_round_trip() {
        let mut builder = PeakIndexBuilder::new();
        for i in 0..5u32 {
            builder.add_scan(
                Ms1ScanInfo {
                    ms1_index: i,
                    scan_number: i + 1,
                    retention_time: 5.0 + i as f64 * 0.05,
                },
                &[(400.123 + i as f64 * 1e-5, 50.0 + i as f64)],
            );
        }
        let index = builder.build();

        let dir = tempfile::tempdir().unwrap();
        let path = index_cache_path(dir.path(), 0);
        save_compressed(&index, &path).unwrap();
        let loaded = load_compressed(&path).unwrap();

        assert_eq!(loaded.num_peaks(), index.num_peaks());
        assert_eq!(loaded.scan_infos(), index.scan_infos());
        let mass = mz_to_neutral_mass(400.123, 1);
        let a = index.get_peak(mass, 0, &MzTolerance::Ppm(10.0), 1);
        let b = loaded.get_peak(mass, 0, &MzTolerance::Ppm(10.0), 1);
        assert_eq!(a, b);
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = index_cache_path(dir.path(), 99);
        assert!(load_compressed(&path).is_err());
    }
}
