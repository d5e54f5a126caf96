use crate::models::index::PeakIndex;
use crate::models::peak::IndexedPeak;
use crate::models::tolerance::MzTolerance;

/// Trace a neutral mass through adjacent MS1 scans around a retention time.
///
/// The walk starts at the last scan whose RT is <= `rt_center`, extends to
/// the right until more than `missed_scans_allowed` consecutive scans lack a
/// matching centroid, then repeats to the left. A non-match at the seed scan
/// itself does not count as a miss, so an identification sitting exactly in
/// a gap can still grow a trace from its neighbors.
///
/// The result is sorted by retention time.
pub fn trace_xic(
    index: &PeakIndex,
    rt_center: f64,
    mass: f64,
    charge: u8,
    tol: &MzTolerance,
    missed_scans_allowed: u32,
) -> Vec<IndexedPeak> {
    let Some(seed) = index.scan_at_or_before(rt_center) else {
        return Vec::new();
    };
    let scan_infos = index.scan_infos();

    let mut out = Vec::new();

    // Rightward, seed included.
    let mut missed = 0u32;
    for info in &scan_infos[seed..] {
        match index.get_peak(mass, info.ms1_index, tol, charge) {
            Some(peak) => {
                out.push(peak);
                missed = 0;
            }
            None => {
                if info.ms1_index != scan_infos[seed].ms1_index {
                    missed += 1;
                    if missed > missed_scans_allowed {
                        break;
                    }
                }
            }
        }
    }

    // Leftward, seed excluded.
    missed = 0;
    for info in scan_infos[..seed].iter().rev() {
        match index.get_peak(mass, info.ms1_index, tol, charge) {
            Some(peak) => {
                out.push(peak);
                missed = 0;
            }
            None => {
                missed += 1;
                if missed > missed_scans_allowed {
                    break;
                }
            }
        }
    }

    out.sort_unstable_by(|a, b| a.retention_time.total_cmp(&b.retention_time));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::index::PeakIndexBuilder;
    use crate::models::peak::Ms1ScanInfo;
    use crate::mz_to_neutral_mass;

    fn scan(i: u32, rt: f64) -> Ms1ScanInfo {
        Ms1ScanInfo {
            ms1_index: i,
            scan_number: i + 1,
            retention_time: rt,
        }
    }

    /// Builds a run where the target mass is present in the given scans.
    fn index_with_hits(num_scans: u32, hit_scans: &[u32]) -> PeakIndex {
        let mut builder = PeakIndexBuilder::new();
        for i in 0..num_scans {
            let rt = 10.0 + i as f64 * 0.1;
            if hit_scans.contains(&i) {
                builder.add_scan(scan(i, rt), &[(500.0, 100.0)]);
            } else {
                builder.add_scan(scan(i, rt), &[]);
            }
        }
        builder.build()
    }

    #[test]
    fn test_contiguous_trace() {
        let index = index_with_hits(9, &[2, 3, 4, 5, 6]);
        let mass = mz_to_neutral_mass(500.0, 1);
        let xic = trace_xic(&index, 10.4, mass, 1, &MzTolerance::Ppm(10.0), 1);
        assert_eq!(xic.len(), 5);
        assert!(xic.windows(2).all(|w| w[0].retention_time < w[1].retention_time));
    }

    #[test]
    fn test_single_gap_tolerated() {
        // Hit, gap, hit: the single absent scan should not stop the walk.
        let index = index_with_hits(9, &[3, 5]);
        let mass = mz_to_neutral_mass(500.0, 1);
        let xic = trace_xic(&index, 10.3, mass, 1, &MzTolerance::Ppm(10.0), 1);
        assert_eq!(xic.len(), 2);
    }

    #[test]
    fn test_double_gap_stops_walk() {
        let index = index_with_hits(9, &[3, 6]);
        let mass = mz_to_neutral_mass(500.0, 1);
        let xic = trace_xic(&index, 10.3, mass, 1, &MzTolerance::Ppm(10.0), 1);
        assert_eq!(xic.len(), 1);
    }

    #[test]
    fn test_seed_miss_does_not_count() {
        // Seed scan (4) is empty but both neighbors have hits.
        let index = index_with_hits(9, &[3, 5]);
        let mass = mz_to_neutral_mass(500.0, 1);
        let xic = trace_xic(&index, 10.4, mass, 1, &MzTolerance::Ppm(10.0), 1);
        assert_eq!(xic.len(), 2);
    }

    #[test]
    fn test_empty_index() {
        let builder = PeakIndexBuilder::new();
        let index = builder.build();
        let xic = trace_xic(&index, 10.0, 500.0, 1, &MzTolerance::Ppm(10.0), 1);
        assert!(xic.is_empty());
    }
}
