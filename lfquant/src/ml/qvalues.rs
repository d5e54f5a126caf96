use tracing::debug;

use crate::mbr::MbrTransfer;

/// Assign double-decoy q-values to MBR transfers, in place.
///
/// Every transfer carries two independent decoy labels: `decoy_peptide`
/// (the donor identification was a database decoy) and `random_rt` (the
/// peak was searched at a randomized retention time). Random-RT decoys
/// estimate false transfers directly; decoy peptides corrected by the
/// double-decoy count estimate the false identifications among them:
///
///   q_i = (1 + Dr_i + max(0, Dp_i - Dd_i)) / T_i
///
/// over the list sorted by decreasing MBR score, monotonized from the tail
/// with a running minimum so q-values never increase with score.
pub fn assign_mbr_qvalues(transfers: &mut [MbrTransfer]) {
    if transfers.is_empty() {
        return;
    }
    transfers.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then(b.features.correlation.total_cmp(&a.features.correlation))
            .then(a.peak.run.cmp(&b.peak.run))
            .then(a.donor_id.cmp(&b.donor_id))
    });

    let mut targets = 0u64;
    let mut decoy_peptides = 0u64;
    let mut random_rts = 0u64;
    let mut double_decoys = 0u64;

    let mut qvals = vec![1.0f64; transfers.len()];
    for (i, t) in transfers.iter().enumerate() {
        match (t.peak.decoy_peptide, t.peak.random_rt) {
            (false, false) => targets += 1,
            (true, false) => decoy_peptides += 1,
            (false, true) => random_rts += 1,
            (true, true) => double_decoys += 1,
        }
        let peptide_errors = decoy_peptides.saturating_sub(double_decoys);
        qvals[i] = (1.0 + random_rts as f64 + peptide_errors as f64) / targets.max(1) as f64;
    }

    // Reverse pass: cumulative minimum.
    let mut q_min = 1.0f64;
    for (t, q) in transfers.iter_mut().zip(qvals.iter()).rev() {
        q_min = q_min.min(*q);
        t.peak.mbr_q_value = Some(q_min);
    }

    debug!(
        "MBR FDR over {} transfers: {} targets, {} decoy peptides, {} random-RT, {} double",
        transfers.len(),
        targets,
        decoy_peptides,
        random_rts,
        double_decoys
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mbr::CandidateFeatures;
    use crate::models::{
        ChromatographicPeak,
        IdIdx,
        RunIdx,
    };

    fn transfer(score: f64, decoy_peptide: bool, random_rt: bool) -> MbrTransfer {
        let mut peak = ChromatographicPeak::new_mbr(RunIdx(0), IdIdx(0), random_rt, decoy_peptide);
        peak.mbr_score = Some(score);
        MbrTransfer {
            peak,
            features: CandidateFeatures {
                ppm_error: 0.0,
                rt_error: 0.0,
                log_intensity: 10.0,
                donor_log_intensity: 10.0,
                correlation: 0.9,
                charge: 2,
                cross_condition: false,
            },
            donor_id: IdIdx(0),
            donor_run: RunIdx(1),
            score,
        }
    }

    #[test]
    fn test_qvalues_monotone_in_score_order() {
        // Interleave targets and random-RT decoys across scores.
        let mut transfers: Vec<MbrTransfer> = (0..200)
            .map(|i| transfer(200.0 - i as f64, false, i % 2 == 1))
            .collect();
        assign_mbr_qvalues(&mut transfers);

        for w in transfers.windows(2) {
            assert!(w[0].score >= w[1].score);
            assert!(w[0].peak.mbr_q_value.unwrap() <= w[1].peak.mbr_q_value.unwrap());
        }
    }

    #[test]
    fn test_clean_prefix_has_low_qvalue() {
        // 50 high-scoring targets followed by interleaved decoys.
        let mut transfers: Vec<MbrTransfer> = Vec::new();
        for i in 0..50 {
            transfers.push(transfer(1000.0 - i as f64, false, false));
        }
        for i in 0..50 {
            transfers.push(transfer(100.0 - i as f64, false, i % 2 == 0));
        }
        assign_mbr_qvalues(&mut transfers);
        let q_first = transfers[0].peak.mbr_q_value.unwrap();
        assert!(q_first <= 1.0 / 50.0 + 1e-12, "got {}", q_first);
    }

    #[test]
    fn test_double_decoys_offset_decoy_peptides() {
        // Equal numbers of decoy-peptide and double-decoy transfers: the
        // peptide-error estimate cancels to zero.
        let mut transfers = vec![
            transfer(10.0, false, false),
            transfer(9.0, true, false),
            transfer(8.0, true, true),
            transfer(7.0, false, false),
        ];
        assign_mbr_qvalues(&mut transfers);
        // At the tail: T=2, Dr=0, Dp=1, Dd=1 -> q = (1 + 0 + 0) / 2.
        assert!((transfers[3].peak.mbr_q_value.unwrap() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_empty_input_is_noop() {
        let mut transfers: Vec<MbrTransfer> = Vec::new();
        assign_mbr_qvalues(&mut transfers);
    }
}
