//! Bayes-factor quantiles per bin: the Bayes factors of the points in a bin
//! are histogrammed on a fine axis and the requested quantile interpolated.

use super::{fill_2d, survival::apply_survival_fixups, Request1D, Request2D};
use crate::analysis::SignalStrength;
use crate::histogram::{Axis, Bin, Hist1D, Hist2D};
use crate::source::{DataSource, Query};
use pmssm_common::{BinningConfig, Config, PmssmError, Result};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuantileCurve {
    pub quantile: f64,
    pub hist: Hist1D,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuantileMap {
    pub quantile: f64,
    pub map: Hist2D,
    pub z_range: [f64; 2],
}

/// Values above 1 are percentages. Anything not positive, or above 100%, is rejected.
pub fn normalize_quantile(q: f64) -> Result<f64> {
    let p = if q > 1.0 { q / 100.0 } else { q };
    if p > 0.0 && p <= 1.0 {
        Ok(p)
    } else {
        Err(PmssmError::InvalidFraction(q))
    }
}

pub fn quantile_label(p: f64) -> String {
    format!("quantile_{}", (100.0 * p).round() as i64)
}

fn z_axis(binning: &BinningConfig) -> Result<Axis> {
    Axis::uniform(binning.quantile_z_bins, binning.quantile_z_low, binning.quantile_z_high)
}

fn quantile_of(samples: &[(f64, f64)], z: &Axis, prob: f64) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    let mut hz = Hist1D::new("hz", z.clone());
    for &(value, weight) in samples {
        hz.fill(value, weight);
    }
    hz.quantile(prob).unwrap_or(0.0)
}

pub fn bayes_factor_quantiles_1d(
    source: &dyn DataSource,
    req: &Request1D,
    quantiles: &[f64],
    binning: &BinningConfig,
) -> Result<Vec<QuantileCurve>> {
    let probs = quantiles.iter().map(|&q| normalize_quantile(q)).collect::<Result<Vec<_>>>()?;
    let axis = req.x.axis()?;
    let z = z_axis(binning)?;
    let query = Query::new(
        vec![req.quantity.clone(), req.analysis.bayes_factor(SignalStrength::Nominal)],
        req.posterior_selection(),
    );
    let rows = source.query(&query)?;

    let mut columns: Vec<Vec<(f64, f64)>> = vec![Vec::new(); axis.bins()];
    for row in rows {
        if let Bin::Regular(i) = axis.find_bin(row.values[0]) {
            columns[i].push((row.values[1], row.weight));
        }
    }

    let per_column: Vec<Vec<f64>> = columns
        .par_iter()
        .map(|samples| probs.iter().map(|&p| quantile_of(samples, &z, p)).collect())
        .collect();

    Ok(probs
        .iter()
        .enumerate()
        .map(|(k, &p)| {
            let mut hist = Hist1D::new(quantile_label(p), axis.clone());
            for (i, values) in per_column.iter().enumerate() {
                hist.set_content(i, values[k]);
            }
            QuantileCurve { quantile: p, hist: hist.with_scaled_axis(req.x.linear_scale) }
        })
        .collect())
}

pub fn bayes_factor_quantile_2d(
    source: &dyn DataSource,
    req: &Request2D,
    quantile: f64,
    config: &Config,
) -> Result<QuantileMap> {
    let prob = normalize_quantile(quantile)?;
    let (x, y) = (req.x.axis()?, req.y.axis()?);
    let z = z_axis(&config.binning)?;
    let prior = fill_2d(source, "prior", &x, &y, &req.projection, req.prior_selection())?;

    let query = Query::new(
        vec![
            req.projection.x.clone(),
            req.projection.y.clone(),
            req.analysis.bayes_factor(SignalStrength::Nominal),
        ],
        req.posterior_selection(),
    );
    let rows = source.query(&query)?;
    let nx = x.bins();
    let mut cells: Vec<Vec<(f64, f64)>> = vec![Vec::new(); nx * y.bins()];
    for row in rows {
        if let (Bin::Regular(ix), Bin::Regular(iy)) = (x.find_bin(row.values[0]), y.find_bin(row.values[1])) {
            cells[iy * nx + ix].push((row.values[2], row.weight));
        }
    }
    let values: Vec<f64> = cells.par_iter().map(|samples| quantile_of(samples, &z, prob)).collect();

    let mut map = Hist2D::new(format!("{}_{}", req.name, quantile_label(prob)), x, y);
    for (idx, v) in values.into_iter().enumerate() {
        map.set_content(idx % nx, idx / nx, v);
    }
    apply_survival_fixups(&mut map, &prior, config.survival.cutoff);
    let z_max = map.maximum();
    tracing::debug!(map = %map.name, z_max, "quantile map filled");
    Ok(QuantileMap {
        quantile: prob,
        map: map.with_scaled_axes(req.x.linear_scale, req.y.linear_scale),
        z_range: [-0.001, f64::max(1.0, z_max + 0.1)],
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percentages_and_fractions() {
        assert_eq!(normalize_quantile(50.0).unwrap(), 0.5);
        assert_eq!(normalize_quantile(0.9).unwrap(), 0.9);
        assert_eq!(normalize_quantile(1.0).unwrap(), 1.0);
        assert!(matches!(normalize_quantile(0.0), Err(PmssmError::InvalidFraction(_))));
        assert!(normalize_quantile(-5.0).is_err());
        assert!(normalize_quantile(250.0).is_err());
        assert!(normalize_quantile(f64::NAN).is_err());
    }

    #[test]
    fn labels() {
        assert_eq!(quantile_label(0.5), "quantile_50");
        assert_eq!(quantile_label(0.29), "quantile_29");
    }

    #[test]
    fn empty_cell_is_zero() {
        let z = Axis::uniform(3000, 0.0, 30.0).unwrap();
        assert_eq!(quantile_of(&[], &z, 0.5), 0.0);
        // all mass beyond the fine axis
        assert_eq!(quantile_of(&[(45.0, 1.0)], &z, 0.5), 0.0);
    }

    #[test]
    fn median_of_weighted_samples() {
        let z = Axis::uniform(3000, 0.0, 30.0).unwrap();
        let q = quantile_of(&[(1.0, 1.0), (3.0, 1.0), (5.0, 2.0)], &z, 0.5);
        assert!((q - 3.01).abs() < 1e-9, "q = {q}");
    }
}
