//! Density thresholds that enclose a requested share of a binned distribution.
//!
//! Bins are visited from the densest down; a fraction's threshold is the
//! weight of the bin at which the running sum first reaches that share of
//! the total. Every bin at or above the threshold together holds at least the
//! requested fraction.

use crate::histogram::Hist2D;
use pmssm_common::{PmssmError, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThresholdLevel {
    pub fraction: f64,
    pub threshold: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    /// sum of all non-negative bin weights
    pub total: f64,
    /// one entry per reached fraction, ascending by threshold
    pub levels: Vec<ThresholdLevel>,
    /// fractions that could not be reached, e.g. for an empty histogram
    pub unreached: Vec<f64>,
}

impl Thresholds {
    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    pub fn threshold_for(&self, fraction: f64) -> Option<f64> {
        self.levels.iter().find(|l| l.fraction == fraction).map(|l| l.threshold)
    }

    /// Threshold values ready to hand to a contour tracer, ascending.
    pub fn contour_levels(&self) -> Vec<f64> {
        self.levels.iter().map(|l| l.threshold).collect()
    }
}

/// Check every fraction lies in (0, 1] and return them sorted ascending.
pub fn validate_fractions(fractions: &[f64]) -> Result<Vec<f64>> {
    let mut out = Vec::with_capacity(fractions.len());
    for &f in fractions {
        if !(f > 0.0 && f <= 1.0) {
            return Err(PmssmError::InvalidFraction(f));
        }
        out.push(f);
    }
    out.sort_by(f64::total_cmp);
    Ok(out)
}

/// Threshold per fraction for a set of bin weights.
///
/// Negative and NaN weights are ignored. An all-zero input is not an error:
/// it yields no levels and reports every fraction as unreached.
pub fn threshold_for_containment<I>(weights: I, fractions: &[f64]) -> Result<Thresholds>
where
    I: IntoIterator<Item = f64>,
{
    let wanted = validate_fractions(fractions)?;
    let mut bins: Vec<f64> = weights.into_iter().filter(|w| *w >= 0.0).collect();
    bins.sort_by(|a, b| b.total_cmp(a));
    // summed in the same order as the scan so a fraction of 1.0 is always met
    let total: f64 = bins.iter().sum();
    if total <= 0.0 || !total.is_finite() {
        return Ok(Thresholds { total: 0.0, levels: Vec::new(), unreached: wanted });
    }

    let mut levels = Vec::with_capacity(wanted.len());
    let mut next = 0;
    let mut running = 0.0;
    for &w in &bins {
        if next == wanted.len() {
            break;
        }
        running += w;
        while next < wanted.len() && running >= wanted[next] * total {
            levels.push(ThresholdLevel { fraction: wanted[next], threshold: w });
            next += 1;
        }
    }
    let unreached = wanted[next..].to_vec();
    // larger fractions reach down to smaller weights
    levels.reverse();
    Ok(Thresholds { total, levels, unreached })
}

impl Hist2D {
    /// Thresholds over the regular cells of this histogram.
    pub fn credibility_thresholds(&self, fractions: &[f64]) -> Result<Thresholds> {
        threshold_for_containment(self.cell_contents(), fractions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::histogram::Axis;

    #[test]
    fn uniform_weights() {
        let t = threshold_for_containment(vec![10.0; 10], &[0.3]).unwrap();
        assert_eq!(t.total, 100.0);
        assert_eq!(t.threshold_for(0.3), Some(10.0));
    }

    #[test]
    fn decreasing_weights() {
        let t = threshold_for_containment(vec![5.0, 50.0, 10.0, 5.0, 30.0], &[0.5, 0.8, 0.95]).unwrap();
        assert_eq!(t.threshold_for(0.5), Some(50.0));
        assert_eq!(t.threshold_for(0.8), Some(30.0));
        // 50 + 30 + 10 = 90 < 95, so the 95% share needs one of the 5s
        assert_eq!(t.threshold_for(0.95), Some(5.0));
        assert_eq!(t.contour_levels(), vec![5.0, 30.0, 50.0]);
        assert!(t.unreached.is_empty());
    }

    #[test]
    fn single_filled_bin() {
        let mut w = vec![0.0; 20];
        w[7] = 7.0;
        let t = threshold_for_containment(w, &[0.99]).unwrap();
        assert_eq!(t.threshold_for(0.99), Some(7.0));
    }

    #[test]
    fn one_bin_can_satisfy_several_fractions() {
        let t = threshold_for_containment(vec![0.0, 7.0, 0.0], &[0.5, 0.99]).unwrap();
        assert_eq!(t.levels.len(), 2);
        assert!(t.levels.iter().all(|l| l.threshold == 7.0));
    }

    #[test]
    fn all_zero_reports_unreached() {
        let t = threshold_for_containment(vec![0.0; 8], &[0.67, 0.1]).unwrap();
        assert!(t.is_empty());
        assert_eq!(t.total, 0.0);
        assert_eq!(t.unreached, vec![0.1, 0.67]);
    }

    #[test]
    fn invalid_fractions() {
        for bad in [0.0, -0.1, 1.5, f64::NAN] {
            assert!(matches!(
                threshold_for_containment(vec![1.0], &[bad]),
                Err(PmssmError::InvalidFraction(_))
            ));
        }
    }

    #[test]
    fn full_fraction_reaches_smallest_positive_bin() {
        let t = threshold_for_containment(vec![0.1, 0.2, 0.3, 0.0], &[1.0]).unwrap();
        assert_eq!(t.threshold_for(1.0), Some(0.1));
    }

    #[test]
    fn negative_and_nan_weights_ignored() {
        let t = threshold_for_containment(vec![4.0, -100.0, f64::NAN, 4.0], &[0.5]).unwrap();
        assert_eq!(t.total, 8.0);
        assert_eq!(t.threshold_for(0.5), Some(4.0));
    }

    #[test]
    fn larger_fraction_never_has_higher_threshold() {
        let w: Vec<f64> = (0..50).map(|i| ((i * 37) % 11) as f64 + 0.5).collect();
        let fr = [0.1, 0.25, 0.5, 0.67, 0.9, 0.95];
        let t = threshold_for_containment(w, &fr).unwrap();
        for pair in fr.windows(2) {
            assert!(t.threshold_for(pair[1]).unwrap() <= t.threshold_for(pair[0]).unwrap());
        }
    }

    #[test]
    fn bins_above_threshold_hold_the_fraction() {
        let w: Vec<f64> = (0..40).map(|i| ((i * 13) % 7) as f64).collect();
        let total: f64 = w.iter().sum();
        let t = threshold_for_containment(w.clone(), &[0.1, 0.67, 0.95]).unwrap();
        for level in &t.levels {
            let held: f64 = w.iter().filter(|v| **v >= level.threshold).sum();
            assert!(held >= level.fraction * total);
        }
    }

    #[test]
    fn from_histogram_cells() {
        let mut h = Hist2D::new("h", Axis::uniform(2, 0.0, 2.0).unwrap(), Axis::uniform(2, 0.0, 2.0).unwrap());
        h.fill(0.5, 0.5, 3.0);
        h.fill(1.5, 1.5, 1.0);
        h.fill(5.0, 5.0, 100.0); // overflow, not counted
        let t = h.credibility_thresholds(&[0.5]).unwrap();
        assert_eq!(t.total, 4.0);
        assert_eq!(t.threshold_for(0.5), Some(3.0));
    }
}
