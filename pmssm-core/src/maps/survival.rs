use super::{fill_1d, fill_2d, nominal_cut, survival_cut, Request1D, Request2D};
use crate::analysis::SignalStrength;
use crate::filter::Predicate;
use crate::histogram::{Hist1D, Hist2D};
use crate::source::DataSource;
use pmssm_common::{Result, SurvivalConfig};
use serde::{Deserialize, Serialize};

/// Value marking cells without any model point.
pub const NO_POINTS: f64 = -1.0;

/// Surviving over prior density per bin, for each signal hypothesis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SurvivalCurves {
    pub posterior: Hist1D,
    pub posterior_up: Option<Hist1D>,
    pub posterior_down: Option<Hist1D>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SurvivalMap {
    pub map: Hist2D,
    pub z_range: [f64; 2],
}

pub fn survival_probability_1d(
    source: &dyn DataSource,
    req: &Request1D,
    survival: &SurvivalConfig,
) -> Result<SurvivalCurves> {
    let axis = req.x.axis()?;
    let prior = fill_1d(source, "prior", &axis, &req.quantity, req.prior_selection())?;

    let ratio = |strength: SignalStrength, cut: Predicate| -> Result<Hist1D> {
        let name = format!("{}{}", req.name, strength.tag());
        let mut hist = fill_1d(source, &name, &axis, &req.quantity, req.posterior_selection().and(cut))?;
        hist.divide(&prior)?;
        Ok(hist.with_scaled_axis(req.x.linear_scale))
    };

    let posterior = ratio(SignalStrength::Nominal, nominal_cut(req.analysis, survival.z_threshold)?)?;
    let variant = |strength: SignalStrength| -> Result<Option<Hist1D>> {
        survival_cut(req.analysis, strength, survival.z_threshold).map(|cut| ratio(strength, cut)).transpose()
    };
    Ok(SurvivalCurves {
        posterior,
        posterior_up: variant(SignalStrength::Up)?,
        posterior_down: variant(SignalStrength::Down)?,
    })
}

/// Mark empty regions and keep tiny survival visible:
/// 0 stays 0 where the prior has points, both empty gives -1,
/// values in (0, cutoff) are raised to the cutoff.
pub fn apply_survival_fixups(map: &mut Hist2D, prior: &Hist2D, cutoff: f64) {
    for iy in 0..map.y_axis().bins() {
        for ix in 0..map.x_axis().bins() {
            let (v, p) = (map.content(ix, iy), prior.content(ix, iy));
            if v == 0.0 && p == 0.0 {
                map.set_content(ix, iy, NO_POINTS);
            } else if v != 0.0 && v < cutoff && p > 0.0 {
                map.set_content(ix, iy, cutoff);
            }
        }
    }
}

pub fn survival_probability_2d(
    source: &dyn DataSource,
    req: &Request2D,
    survival: &SurvivalConfig,
) -> Result<SurvivalMap> {
    let (x, y) = (req.x.axis()?, req.y.axis()?);
    let prior = fill_2d(source, "prior", &x, &y, &req.projection, req.prior_selection())?;
    let cut = nominal_cut(req.analysis, survival.z_threshold)?;
    let mut map = fill_2d(source, &req.name, &x, &y, &req.projection, req.posterior_selection().and(cut))?;
    map.divide(&prior)?;
    apply_survival_fixups(&mut map, &prior, survival.cutoff);
    Ok(SurvivalMap {
        map: map.with_scaled_axes(req.x.linear_scale, req.y.linear_scale),
        z_range: [-0.001, 1.0],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::histogram::Axis;

    #[test]
    fn fixups() {
        let axis = || Axis::uniform(4, 0.0, 4.0).unwrap();
        let one = || Axis::uniform(1, 0.0, 1.0).unwrap();
        let mut map = Hist2D::new("sp", axis(), one());
        let mut prior = Hist2D::new("prior", axis(), one());
        // cell 0: no points at all
        // cell 1: points, none surviving
        prior.set_content(1, 0, 5.0);
        // cell 2: tiny survival
        prior.set_content(2, 0, 5.0);
        map.set_content(2, 0, 1e-6);
        // cell 3: ordinary
        prior.set_content(3, 0, 5.0);
        map.set_content(3, 0, 0.4);
        apply_survival_fixups(&mut map, &prior, 1e-3);
        assert_eq!(map.content(0, 0), -1.0);
        assert_eq!(map.content(1, 0), 0.0);
        assert_eq!(map.content(2, 0), 1e-3);
        assert_eq!(map.content(3, 0), 0.4);
    }
}
