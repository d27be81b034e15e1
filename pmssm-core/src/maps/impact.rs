use super::{fill_1d, nominal_cut, selected_weight, survival_cut, Request1D};
use crate::analysis::SignalStrength;
use crate::filter::Predicate;
use crate::histogram::Hist1D;
use crate::source::DataSource;
use pmssm_common::{Result, SurvivalConfig};
use serde::{Deserialize, Serialize};

/// Prior and posterior densities of one quantity, each normalised to unit weight.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImpactPlot {
    pub prior: Hist1D,
    pub posterior: Hist1D,
    pub posterior_up: Option<Hist1D>,
    pub posterior_down: Option<Hist1D>,
}

fn normalise(hist: &mut Hist1D, total: f64) {
    if total > 0.0 {
        hist.scale(1.0 / total);
    } else {
        tracing::warn!(hist = %hist.name, "selection is empty, leaving histogram unnormalised");
    }
}

pub fn impact_plot(source: &dyn DataSource, req: &Request1D, survival: &SurvivalConfig) -> Result<ImpactPlot> {
    let axis = req.x.axis()?;
    let scale = req.x.linear_scale;

    let mut prior = fill_1d(source, "prior", &axis, &req.quantity, req.prior_selection())?;
    normalise(&mut prior, selected_weight(source, req.prior_selection())?);

    let posterior_with = |strength: SignalStrength, cut: Predicate| -> Result<Hist1D> {
        let name = format!("{}{}", req.name, strength.tag());
        let selection = req.posterior_selection().and(cut);
        let mut hist = fill_1d(source, &name, &axis, &req.quantity, selection.clone())?;
        normalise(&mut hist, selected_weight(source, selection)?);
        Ok(hist.with_scaled_axis(scale))
    };

    let posterior = posterior_with(SignalStrength::Nominal, nominal_cut(req.analysis, survival.z_threshold)?)?;
    let variant = |strength: SignalStrength| -> Result<Option<Hist1D>> {
        survival_cut(req.analysis, strength, survival.z_threshold)
            .map(|cut| posterior_with(strength, cut))
            .transpose()
    };
    let posterior_up = variant(SignalStrength::Up)?;
    let posterior_down = variant(SignalStrength::Down)?;

    Ok(ImpactPlot { prior: prior.with_scaled_axis(scale), posterior, posterior_up, posterior_down })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::Analysis;
    use crate::expr::Expr;
    use crate::histogram::AxisSpec;
    use crate::source::MemorySource;
    use arrow::array::{ArrayRef, Float64Array};
    use arrow::datatypes::{DataType, Field, Schema};
    use arrow::record_batch::RecordBatch;
    use std::sync::Arc;

    fn scan() -> MemorySource {
        let ones = || -> ArrayRef { Arc::new(Float64Array::from(vec![1.0; 4])) };
        let zeros = || -> ArrayRef { Arc::new(Float64Array::from(vec![0.0; 4])) };
        let columns: Vec<(&str, ArrayRef)> = vec![
            ("g", Arc::new(Float64Array::from(vec![Some(50.0), Some(150.0), None, Some(5000.0)]))),
            ("PickProbability", ones()),
            ("xsec_tot_pb", ones()),
            ("Zsig_combined", ones()),
            ("Zsig_cms_sus_19_006", zeros()),
            ("Zsig_cms_sus_19_006_15s", zeros()),
            ("Zsig_cms_sus_19_006_05s", zeros()),
        ];
        let schema = Schema::new(columns.iter().map(|(n, _)| Field::new(*n, DataType::Float64, true)).collect::<Vec<_>>());
        let batch = RecordBatch::try_new(Arc::new(schema), columns.into_iter().map(|(_, a)| a).collect()).unwrap();
        MemorySource::new(vec![batch])
    }

    #[test]
    fn rows_without_a_value_still_count_towards_the_total() {
        let req = Request1D {
            name: "gluino".into(),
            analysis: Analysis::CmsSus19006,
            quantity: Expr::col("g"),
            x: AxisSpec::new(2, 0.0, 200.0),
            constraints: Vec::new(),
            prior_constraints: Vec::new(),
        };
        let plot = impact_plot(&scan(), &req, &SurvivalConfig::default()).unwrap();
        assert_eq!(plot.prior.content(0), 0.25);
        assert_eq!(plot.prior.content(1), 0.25);
        assert_eq!(plot.prior.overflow(), 0.25);
        assert_eq!(plot.posterior.content(0), 0.25);
        assert_eq!(plot.posterior_up.unwrap().content(1), 0.25);
    }
}
