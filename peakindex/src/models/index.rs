use serde::{
    Deserialize,
    Serialize,
};
use tracing::debug;

use crate::models::peak::{
    IndexedPeak,
    Ms1ScanInfo,
};
use crate::models::tolerance::MzTolerance;
use crate::neutral_mass_to_mz;

/// Per-run lookup table from (neutral mass, scan) to the observed centroid.
///
/// Peaks are bucketed on integer m/z so a ppm-window query only has to
/// inspect the one or two buckets spanning the window. Within a bucket peaks
/// are ordered by scan index, so restricting to one scan is a binary search.
///
/// The index is immutable after [`PeakIndexBuilder::build`]; concurrent
/// readers need no synchronization.
#[derive(Debug, Serialize, Deserialize)]
pub struct PeakIndex {
    buckets: Vec<Vec<IndexedPeak>>,
    scan_infos: Vec<Ms1ScanInfo>,
    num_peaks: usize,
}

#[derive(Debug, Default)]
pub struct PeakIndexBuilder {
    buckets: Vec<Vec<IndexedPeak>>,
    scan_infos: Vec<Ms1ScanInfo>,
    num_peaks: usize,
}

impl PeakIndexBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add all centroids of one MS1 scan.
    ///
    /// Scans must arrive in ascending `ms1_index` order, which is what any
    /// spectrum reader yields anyway.
    pub fn add_scan(&mut self, info: Ms1ScanInfo, centroids: &[(f64, f64)]) {
        for &(mz, intensity) in centroids {
            if !(mz.is_finite() && intensity.is_finite()) || mz <= 0.0 {
                continue;
            }
            let bucket = mz.floor() as usize;
            if bucket >= self.buckets.len() {
                self.buckets.resize_with(bucket + 1, Vec::new);
            }
            self.buckets[bucket].push(IndexedPeak {
                mz,
                intensity,
                ms1_index: info.ms1_index,
                retention_time: info.retention_time,
            });
            self.num_peaks += 1;
        }
        self.scan_infos.push(info);
    }

    pub fn build(mut self) -> PeakIndex {
        for bucket in self.buckets.iter_mut() {
            bucket.sort_unstable_by(|a, b| {
                a.ms1_index
                    .cmp(&b.ms1_index)
                    .then(a.mz.total_cmp(&b.mz))
            });
        }
        let out = PeakIndex {
            buckets: self.buckets,
            scan_infos: self.scan_infos,
            num_peaks: self.num_peaks,
        };
        debug_assert!(out.verify(), "PeakIndex::build failed at verify");
        debug!(
            "Built peak index: {} peaks over {} MS1 scans in {} buckets",
            out.num_peaks,
            out.scan_infos.len(),
            out.buckets.len()
        );
        out
    }
}

impl PeakIndex {
    pub fn num_peaks(&self) -> usize {
        self.num_peaks
    }

    pub fn is_empty(&self) -> bool {
        self.num_peaks == 0
    }

    pub fn scan_infos(&self) -> &[Ms1ScanInfo] {
        &self.scan_infos
    }

    pub fn num_scans(&self) -> usize {
        self.scan_infos.len()
    }

    /// Index of the last MS1 scan whose retention time is <= `rt`.
    ///
    /// Falls back to the first scan when `rt` precedes the run.
    pub fn scan_at_or_before(&self, rt: f64) -> Option<usize> {
        if self.scan_infos.is_empty() {
            return None;
        }
        let pp = self
            .scan_infos
            .partition_point(|s| s.retention_time <= rt);
        Some(pp.saturating_sub(1))
    }

    /// Indices of the MS1 scans whose retention times fall in `[rt_lo, rt_hi]`.
    pub fn scans_in_rt_window(&self, rt_lo: f64, rt_hi: f64) -> std::ops::Range<usize> {
        let start = self
            .scan_infos
            .partition_point(|s| s.retention_time < rt_lo);
        let end = self
            .scan_infos
            .partition_point(|s| s.retention_time <= rt_hi);
        start..end.max(start)
    }

    /// Look up the centroid matching a neutral mass hypothesis in one scan.
    ///
    /// Returns the most intense centroid whose neutral mass at `charge` is
    /// within `tol` of `mass`, or None when the scan holds no such centroid.
    pub fn get_peak(
        &self,
        mass: f64,
        ms1_index: u32,
        tol: &MzTolerance,
        charge: u8,
    ) -> Option<IndexedPeak> {
        let mass_range = tol.mass_range(mass);
        let mz_lo = neutral_mass_to_mz(mass_range.start(), charge);
        let mz_hi = neutral_mass_to_mz(mass_range.end(), charge);

        let bucket_lo = (mz_lo.floor() as usize).min(self.buckets.len());
        let bucket_hi = ((mz_hi.floor() as usize) + 1).min(self.buckets.len());

        let mut best: Option<IndexedPeak> = None;
        for bucket in &self.buckets[bucket_lo..bucket_hi] {
            let start = bucket.partition_point(|p| p.ms1_index < ms1_index);
            for peak in &bucket[start..] {
                if peak.ms1_index != ms1_index {
                    break;
                }
                if !mass_range.contains(peak.neutral_mass(charge)) {
                    continue;
                }
                match best {
                    Some(b) if b.intensity >= peak.intensity => {}
                    _ => best = Some(*peak),
                }
            }
        }
        best
    }

    /// Every matching centroid across the scans of an RT window, one query
    /// per scan. Used by the transfer search to seed candidate peaks.
    pub fn peaks_in_rt_window(
        &self,
        mass: f64,
        rt_lo: f64,
        rt_hi: f64,
        tol: &MzTolerance,
        charge: u8,
    ) -> Vec<IndexedPeak> {
        self.scans_in_rt_window(rt_lo, rt_hi)
            .filter_map(|scan| {
                self.get_peak(mass, self.scan_infos[scan].ms1_index, tol, charge)
            })
            .collect()
    }

    fn verify(&self) -> bool {
        let mut counted = 0;
        for bucket in &self.buckets {
            counted += bucket.len();
            for w in bucket.windows(2) {
                if w[0].ms1_index > w[1].ms1_index {
                    return false;
                }
            }
        }
        if counted != self.num_peaks {
            return false;
        }
        self.scan_infos
            .windows(2)
            .all(|w| w[0].ms1_index < w[1].ms1_index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scan(i: u32, rt: f64) -> Ms1ScanInfo {
        Ms1ScanInfo {
            ms1_index: i,
            scan_number: i + 1,
            retention_time: rt,
        }
    }

    fn toy_index() -> PeakIndex {
        let mut builder = PeakIndexBuilder::new();
        builder.add_scan(scan(0, 10.0), &[(501.2579, 100.0), (501.7596, 45.0)]);
        builder.add_scan(scan(1, 10.1), &[(501.2580, 120.0), (800.5, 5.0)]);
        builder.add_scan(scan(2, 10.2), &[(501.2578, 80.0)]);
        builder.build()
    }

    #[test]
    fn test_get_peak_in_scan() {
        let index = toy_index();
        // 501.2579 at z=2 -> neutral mass
        let mass = crate::mz_to_neutral_mass(501.2579, 2);
        let hit = index.get_peak(mass, 1, &MzTolerance::Ppm(10.0), 2);
        assert!(hit.is_some());
        let hit = hit.unwrap();
        assert_eq!(hit.ms1_index, 1);
        assert!((hit.intensity - 120.0).abs() < 1e-9);
    }

    #[test]
    fn test_get_peak_misses_out_of_tolerance() {
        let index = toy_index();
        let mass = crate::mz_to_neutral_mass(502.0, 2);
        assert!(index.get_peak(mass, 0, &MzTolerance::Ppm(10.0), 2).is_none());
    }

    #[test]
    fn test_get_peak_most_intense_wins() {
        let mut builder = PeakIndexBuilder::new();
        // Two centroids within tolerance of each other in the same scan.
        builder.add_scan(scan(0, 1.0), &[(500.0000, 10.0), (500.0010, 50.0)]);
        let index = builder.build();
        let mass = crate::mz_to_neutral_mass(500.0005, 1);
        let hit = index.get_peak(mass, 0, &MzTolerance::Ppm(20.0), 1).unwrap();
        assert!((hit.intensity - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_scan_at_or_before() {
        let index = toy_index();
        assert_eq!(index.scan_at_or_before(10.15), Some(1));
        assert_eq!(index.scan_at_or_before(9.0), Some(0));
        assert_eq!(index.scan_at_or_before(99.0), Some(2));
    }

    #[test]
    fn test_scans_in_rt_window() {
        let index = toy_index();
        let rng = index.scans_in_rt_window(10.05, 10.25);
        assert_eq!(rng, 1..3);
    }
}
