use super::fill_2d;
use crate::analysis::Analysis;
use crate::contour::{trace_contours, ContourLine};
use crate::credibility::Thresholds;
use crate::expr::Projection;
use crate::filter::Predicate;
use crate::histogram::{AxisSpec, Hist2D};
use crate::source::DataSource;
use pmssm_common::{CredibilityConfig, Result};
use serde::{Deserialize, Serialize};

/// Which density the credible regions enclose.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Density {
    Prior,
    #[default]
    Posterior,
}

#[derive(Debug, Clone)]
pub struct CredibleRequest {
    pub name: String,
    pub density: Density,
    /// supplies the Bayes factor for posteriors and the sanity-cut variant for both
    pub analysis: Analysis,
    pub projection: Projection,
    pub x: AxisSpec,
    pub y: AxisSpec,
    pub constraints: Vec<Predicate>,
    /// empty means the configured default intervals
    pub intervals: Vec<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntervalContours {
    pub fraction: f64,
    pub threshold: f64,
    pub lines: Vec<ContourLine>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredibleRegion {
    pub density: Density,
    pub histogram: Hist2D,
    pub thresholds: Thresholds,
    /// ascending by threshold, so the widest interval comes first
    pub intervals: Vec<IntervalContours>,
}

impl CredibleRegion {
    pub fn line_count(&self) -> usize {
        self.intervals.iter().map(|i| i.lines.len()).sum()
    }
}

/// Smallest-area regions holding each requested share of the density.
/// Thresholds come from the raw histogram; contours are traced on the
/// smoothed one when smoothing is enabled.
pub fn credible_region(source: &dyn DataSource, req: &CredibleRequest, cfg: &CredibilityConfig) -> Result<CredibleRegion> {
    let fractions = if req.intervals.is_empty() { &cfg.intervals } else { &req.intervals };
    let selection = match req.density {
        Density::Prior => req.analysis.base_selection(),
        Density::Posterior => req.analysis.posterior_selection(),
    }
    .and_all(req.constraints.iter().cloned());
    let (x, y) = (req.x.axis()?, req.y.axis()?);
    let hist = fill_2d(source, &req.name, &x, &y, &req.projection, selection)?;

    let thresholds = hist.credibility_thresholds(fractions)?;
    if !thresholds.unreached.is_empty() {
        tracing::warn!(hist = %req.name, unreached = ?thresholds.unreached, "credible intervals not reached");
    }

    let traced = if cfg.smooth { hist.smoothed() } else { hist.clone() };
    let (xs, ys) = (req.x.linear_scale, req.y.linear_scale);
    let intervals = thresholds
        .levels
        .iter()
        .map(|level| IntervalContours {
            fraction: level.fraction,
            threshold: level.threshold,
            lines: trace_contours(&traced, level.threshold, cfg.min_contour_points)
                .into_iter()
                .map(|line| line.scaled(xs, ys))
                .collect(),
        })
        .collect();

    Ok(CredibleRegion {
        density: req.density,
        histogram: hist.with_scaled_axes(xs, ys),
        thresholds,
        intervals,
    })
}
