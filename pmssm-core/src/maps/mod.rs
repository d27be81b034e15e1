//! Plot builders: each turns a request plus a data source into histograms.

pub mod credible;
pub mod impact;
pub mod quantile;
pub mod survival;

pub use credible::{credible_region, CredibleRegion, CredibleRequest, Density, IntervalContours};
pub use impact::{impact_plot, ImpactPlot};
pub use quantile::{
    bayes_factor_quantile_2d, bayes_factor_quantiles_1d, normalize_quantile, quantile_label, QuantileCurve,
    QuantileMap,
};
pub use survival::{apply_survival_fixups, NO_POINTS, survival_probability_1d, survival_probability_2d, SurvivalCurves, SurvivalMap};

use crate::analysis::{Analysis, SignalStrength};
use crate::expr::{Expr, Projection};
use crate::filter::Predicate;
use crate::histogram::{Axis, AxisSpec, Hist1D, Hist2D};
use crate::source::{DataSource, Query, Selection};
use pmssm_common::{PmssmError, Result};

/// A quantity binned along one axis.
#[derive(Debug, Clone)]
pub struct Request1D {
    pub name: String,
    pub analysis: Analysis,
    pub quantity: Expr,
    pub x: AxisSpec,
    pub constraints: Vec<Predicate>,
    /// applied to the prior only; empty means the unconstrained prior
    pub prior_constraints: Vec<Predicate>,
}

/// A `Y:X` projection binned on a grid.
#[derive(Debug, Clone)]
pub struct Request2D {
    pub name: String,
    pub analysis: Analysis,
    pub projection: Projection,
    pub x: AxisSpec,
    pub y: AxisSpec,
    pub constraints: Vec<Predicate>,
    pub prior_constraints: Vec<Predicate>,
}

impl Request1D {
    fn prior_selection(&self) -> Selection {
        self.analysis.base_selection().and_all(self.prior_constraints.iter().cloned())
    }

    fn posterior_selection(&self) -> Selection {
        self.analysis.base_selection().and_all(self.constraints.iter().cloned())
    }
}

impl Request2D {
    fn prior_selection(&self) -> Selection {
        self.analysis.base_selection().and_all(self.prior_constraints.iter().cloned())
    }

    fn posterior_selection(&self) -> Selection {
        self.analysis.base_selection().and_all(self.constraints.iter().cloned())
    }
}

/// Survival cut for one signal hypothesis; logs and yields None when the
/// analysis has no significance column for it.
pub(crate) fn survival_cut(analysis: Analysis, strength: SignalStrength, z_threshold: f64) -> Option<Predicate> {
    let cut = analysis.survives(strength, z_threshold);
    if cut.is_none() {
        tracing::warn!(%analysis, ?strength, "no significance column, skipping variant");
    }
    cut
}

pub(crate) fn nominal_cut(analysis: Analysis, z_threshold: f64) -> Result<Predicate> {
    analysis
        .survives(SignalStrength::Nominal, z_threshold)
        .ok_or_else(|| PmssmError::Other(format!("{analysis} has no significance column")))
}

pub(crate) fn fill_1d(
    source: &dyn DataSource,
    name: &str,
    axis: &Axis,
    quantity: &Expr,
    selection: Selection,
) -> Result<Hist1D> {
    let rows = source.query(&Query::new(vec![quantity.clone()], selection))?;
    let mut hist = Hist1D::new(name, axis.clone());
    for row in &rows {
        hist.fill(row.values[0], row.weight);
    }
    tracing::debug!(hist = name, rows = rows.len(), "filled 1D histogram");
    Ok(hist)
}

/// Total weight passing a selection, whether or not the plotted quantity is
/// defined for the row.
pub(crate) fn selected_weight(source: &dyn DataSource, selection: Selection) -> Result<f64> {
    let rows = source.query(&Query::new(Vec::new(), selection))?;
    Ok(rows.iter().map(|r| r.weight).sum())
}

pub(crate) fn fill_2d(
    source: &dyn DataSource,
    name: &str,
    x: &Axis,
    y: &Axis,
    projection: &Projection,
    selection: Selection,
) -> Result<Hist2D> {
    let query = Query::new(vec![projection.x.clone(), projection.y.clone()], selection);
    let rows = source.query(&query)?;
    let mut hist = Hist2D::new(name, x.clone(), y.clone());
    for row in &rows {
        hist.fill(row.values[0], row.values[1], row.weight);
    }
    tracing::debug!(hist = name, rows = rows.len(), "filled 2D histogram");
    Ok(hist)
}
