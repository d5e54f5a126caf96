//! Local retention-time alignment between two runs of the same experiment.
//!
//! Alignment is anchored on peptides identified by MS/MS in both runs. For a
//! retention time to transfer, the nearest anchors on each side vote with
//! their donor-to-acceptor deltas; the median delta gives the predicted
//! acceptor RT and the spread of the deltas gives the search window. This is
//! deliberately local: chromatography drifts nonlinearly over a gradient, so
//! a handful of nearby anchors beats any global fit.

pub mod stats;

use serde::{
    Deserialize,
    Serialize,
};
use tracing::debug;

/// Anchors closer than this (in donor RT minutes) are eligible to vote for
/// a transferred peak.
pub const MAX_ANCHOR_DELTA_MIN: f64 = 0.5;

/// Window width used when fewer than two anchors vote.
pub const FALLBACK_WIDTH_MIN: f64 = 0.25;

#[derive(Debug, Clone)]
pub enum AlignmentError {
    /// Returned when alignment is attempted with no anchor points.
    NoAnchors,
    /// Returned when an anchor carries a non-finite retention time.
    NonFiniteAnchor(f64, f64),
}

impl std::fmt::Display for AlignmentError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl std::error::Error for AlignmentError {}

/// One peptide observed in both runs, with its apex RT in each.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnchorPoint {
    pub donor_rt: f64,
    pub acceptor_rt: f64,
}

impl AnchorPoint {
    /// Donor-minus-acceptor retention time delta.
    pub fn delta(&self) -> f64 {
        self.donor_rt - self.acceptor_rt
    }
}

/// A predicted acceptor retention time with its search window width.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RtPrediction {
    pub rt: f64,
    pub width: f64,
    pub anchor_count: usize,
}

impl RtPrediction {
    pub fn window(&self) -> (f64, f64) {
        (self.rt - self.width / 2.0, self.rt + self.width / 2.0)
    }

    /// The same window re-centered on a different retention time.
    pub fn recentered(&self, rt: f64) -> Self {
        Self { rt, ..*self }
    }

    /// A widened copy, capped at `max_width`.
    pub fn widened(&self, by: f64, max_width: f64) -> Self {
        Self {
            width: (self.width + by).min(max_width),
            ..*self
        }
    }
}

/// Anchor-based local alignment from one donor run onto one acceptor run.
#[derive(Debug, Clone)]
pub struct RtAlignment {
    anchors: Vec<AnchorPoint>,
    anchors_per_side: usize,
    max_window: f64,
}

impl RtAlignment {
    pub fn try_new(
        mut anchors: Vec<AnchorPoint>,
        anchors_per_side: usize,
        max_window: f64,
    ) -> Result<Self, AlignmentError> {
        if anchors.is_empty() {
            return Err(AlignmentError::NoAnchors);
        }
        for a in &anchors {
            if !(a.donor_rt.is_finite() && a.acceptor_rt.is_finite()) {
                return Err(AlignmentError::NonFiniteAnchor(a.donor_rt, a.acceptor_rt));
            }
        }
        anchors.sort_by(|a, b| a.donor_rt.total_cmp(&b.donor_rt));
        debug!("Built RT alignment over {} anchors", anchors.len());
        Ok(Self {
            anchors,
            anchors_per_side,
            max_window,
        })
    }

    pub fn num_anchors(&self) -> usize {
        self.anchors.len()
    }

    /// Donor-minus-acceptor deltas of every anchor, for distribution fitting.
    pub fn deltas(&self) -> Vec<f64> {
        self.anchors.iter().map(|a| a.delta()).collect()
    }

    /// Predict where a donor retention time lands in the acceptor run.
    ///
    /// Collects up to `anchors_per_side` anchors on each side of `donor_rt`
    /// within [`MAX_ANCHOR_DELTA_MIN`]; the prediction is the donor RT
    /// shifted by the median anchor delta, and the window is six standard
    /// deviations of those deltas, clamped to the configured maximum. With a
    /// single voting anchor (or none) the window falls back to
    /// [`FALLBACK_WIDTH_MIN`].
    pub fn predict(&self, donor_rt: f64) -> RtPrediction {
        let split = self
            .anchors
            .partition_point(|a| a.donor_rt < donor_rt);

        let mut deltas: Vec<f64> = Vec::with_capacity(self.anchors_per_side * 2);
        for a in self.anchors[..split].iter().rev().take(self.anchors_per_side) {
            if (donor_rt - a.donor_rt).abs() <= MAX_ANCHOR_DELTA_MIN {
                deltas.push(a.delta());
            }
        }
        for a in self.anchors[split..].iter().take(self.anchors_per_side) {
            if (donor_rt - a.donor_rt).abs() <= MAX_ANCHOR_DELTA_MIN {
                deltas.push(a.delta());
            }
        }

        match deltas.len() {
            0 => RtPrediction {
                rt: donor_rt,
                width: FALLBACK_WIDTH_MIN,
                anchor_count: 0,
            },
            1 => RtPrediction {
                rt: donor_rt - deltas[0],
                width: FALLBACK_WIDTH_MIN,
                anchor_count: 1,
            },
            n => {
                let median = stats::median(&deltas);
                let width = (6.0 * stats::stddev(&deltas)).min(self.max_window);
                RtPrediction {
                    rt: donor_rt - median,
                    width,
                    anchor_count: n,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_anchors_rejected() {
        assert!(RtAlignment::try_new(Vec::new(), 3, 1.0).is_err());
    }

    #[test]
    fn test_non_finite_anchor_rejected() {
        let anchors = vec![AnchorPoint {
            donor_rt: f64::NAN,
            acceptor_rt: 1.0,
        }];
        assert!(RtAlignment::try_new(anchors, 3, 1.0).is_err());
    }
}
