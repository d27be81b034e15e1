//! Plot plans: TOML lists of plot jobs run against one data source.

use crate::analysis::{Analysis, Composition};
use crate::expr::{Expr, Projection};
use crate::filter::{parse_predicate, Predicate};
use crate::histogram::AxisSpec;
use crate::maps::{
    bayes_factor_quantile_2d, bayes_factor_quantiles_1d, credible_region, impact_plot, survival_probability_1d,
    survival_probability_2d, CredibleRegion, CredibleRequest, Density, ImpactPlot, QuantileCurve, QuantileMap,
    Request1D, Request2D, SurvivalCurves, SurvivalMap,
};
use crate::source::DataSource;
use pmssm_common::{Config, PmssmError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Instant;

/// Survey of sparticle masses against the lightest neutralino.
pub const DEFAULT_PLAN: &str = include_str!("../plans/default.toml");

const DEFAULT_QUANTILE: f64 = 50.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlotKind {
    Impact,
    Survival1d,
    Survival2d,
    Quantile1d,
    Quantile2d,
    Credible,
}

impl PlotKind {
    pub fn is_2d(self) -> bool {
        matches!(self, PlotKind::Survival2d | PlotKind::Quantile2d | PlotKind::Credible)
    }
}

/// Credible-region contours drawn on top of a 2D map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CiOverlay {
    #[serde(default)]
    pub name: Option<String>,
    /// posterior overlays only; defaults to the job's analysis
    #[serde(default)]
    pub analysis: Option<Analysis>,
    /// defaults to the job's draw string
    #[serde(default)]
    pub draw: Option<String>,
    pub x: AxisSpec,
    pub y: AxisSpec,
    #[serde(default)]
    pub constraints: Vec<String>,
    #[serde(default)]
    pub intervals: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlotJob {
    pub name: String,
    pub kind: PlotKind,
    #[serde(default)]
    pub analysis: Analysis,
    /// `Y:X` for 2D kinds, a single quantity otherwise
    pub draw: String,
    pub x: AxisSpec,
    #[serde(default)]
    pub y: Option<AxisSpec>,
    #[serde(default)]
    pub constraints: Vec<String>,
    #[serde(default)]
    pub prior_constraints: Vec<String>,
    /// one variant of the job per composition
    #[serde(default)]
    pub compositions: Vec<Composition>,
    #[serde(default)]
    pub quantiles: Vec<f64>,
    #[serde(default)]
    pub intervals: Vec<f64>,
    #[serde(default)]
    pub density: Density,
    #[serde(default)]
    pub prior_ci: Option<CiOverlay>,
    #[serde(default)]
    pub posterior_ci: Option<CiOverlay>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PlotOutcome {
    Impact(ImpactPlot),
    Survival1d(SurvivalCurves),
    Survival2d {
        survival: SurvivalMap,
        prior_ci: Option<CredibleRegion>,
        posterior_ci: Option<CredibleRegion>,
    },
    Quantile1d { curves: Vec<QuantileCurve> },
    Quantile2d { maps: Vec<QuantileMap> },
    Credible(CredibleRegion),
}

#[derive(Debug, Serialize)]
pub struct JobReport {
    pub name: String,
    pub kind: PlotKind,
    pub elapsed_ms: u128,
    pub error: Option<String>,
}

impl JobReport {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    #[serde(default, rename = "plot")]
    pub plots: Vec<PlotJob>,
}

fn parse_constraints(constraints: &[String]) -> Result<Vec<Predicate>> {
    constraints.iter().map(|c| parse_predicate(c)).collect()
}

impl PlotJob {
    /// Split a job listing several compositions into one job per composition.
    pub fn variants(&self) -> Vec<PlotJob> {
        if self.compositions.len() <= 1 {
            return vec![self.clone()];
        }
        self.compositions
            .iter()
            .map(|&c| PlotJob {
                name: format!("{}_{}", self.name, c.name()),
                compositions: vec![c],
                ..self.clone()
            })
            .collect()
    }

    fn constraints(&self) -> Result<Vec<Predicate>> {
        let mut preds = parse_constraints(&self.constraints)?;
        preds.extend(self.compositions.iter().map(|c| c.predicate()));
        Ok(preds)
    }

    fn y_axis(&self) -> Result<AxisSpec> {
        self.y
            .clone()
            .ok_or_else(|| PmssmError::InvalidAxis(format!("{}: 2D plot without a y axis", self.name)))
    }

    pub fn request_1d(&self) -> Result<Request1D> {
        Ok(Request1D {
            name: self.name.clone(),
            analysis: self.analysis,
            quantity: Expr::parse(&self.draw)?,
            x: self.x.clone(),
            constraints: self.constraints()?,
            prior_constraints: parse_constraints(&self.prior_constraints)?,
        })
    }

    pub fn request_2d(&self) -> Result<Request2D> {
        // a missing y axis is reported before the draw string is parsed
        let y = self.y_axis()?;
        Ok(Request2D {
            name: self.name.clone(),
            analysis: self.analysis,
            projection: Projection::parse(&self.draw)?,
            x: self.x.clone(),
            y,
            constraints: self.constraints()?,
            prior_constraints: parse_constraints(&self.prior_constraints)?,
        })
    }

    pub fn credible_request(&self) -> Result<CredibleRequest> {
        let y = self.y_axis()?;
        Ok(CredibleRequest {
            name: self.name.clone(),
            density: self.density,
            analysis: self.analysis,
            projection: Projection::parse(&self.draw)?,
            x: self.x.clone(),
            y,
            constraints: self.constraints()?,
            intervals: self.intervals.clone(),
        })
    }

    fn overlay_request(&self, overlay: &CiOverlay, density: Density) -> Result<CredibleRequest> {
        let suffix = match density {
            Density::Prior => "priorcontours",
            Density::Posterior => "posteriorcontours",
        };
        Ok(CredibleRequest {
            name: overlay.name.clone().unwrap_or_else(|| format!("{}_{suffix}", self.name)),
            density,
            analysis: overlay.analysis.unwrap_or(self.analysis),
            projection: Projection::parse(overlay.draw.as_deref().unwrap_or(&self.draw))?,
            x: overlay.x.clone(),
            y: overlay.y.clone(),
            constraints: parse_constraints(&overlay.constraints)?,
            intervals: overlay.intervals.clone(),
        })
    }

    fn quantiles(&self) -> Vec<f64> {
        if self.quantiles.is_empty() {
            vec![DEFAULT_QUANTILE]
        } else {
            self.quantiles.clone()
        }
    }
}

/// Build one plot.
pub fn run_job(source: &dyn DataSource, job: &PlotJob, config: &Config) -> Result<PlotOutcome> {
    tracing::debug!(job = %job.name, kind = ?job.kind, analysis = %job.analysis, "building plot");
    match job.kind {
        PlotKind::Impact => Ok(PlotOutcome::Impact(impact_plot(source, &job.request_1d()?, &config.survival)?)),
        PlotKind::Survival1d => Ok(PlotOutcome::Survival1d(survival_probability_1d(
            source,
            &job.request_1d()?,
            &config.survival,
        )?)),
        PlotKind::Survival2d => {
            let survival = survival_probability_2d(source, &job.request_2d()?, &config.survival)?;
            let overlay = |ci: &Option<CiOverlay>, density: Density| -> Result<Option<CredibleRegion>> {
                ci.as_ref()
                    .map(|o| credible_region(source, &job.overlay_request(o, density)?, &config.credibility))
                    .transpose()
            };
            Ok(PlotOutcome::Survival2d {
                survival,
                prior_ci: overlay(&job.prior_ci, Density::Prior)?,
                posterior_ci: overlay(&job.posterior_ci, Density::Posterior)?,
            })
        }
        PlotKind::Quantile1d => Ok(PlotOutcome::Quantile1d {
            curves: bayes_factor_quantiles_1d(source, &job.request_1d()?, &job.quantiles(), &config.binning)?,
        }),
        PlotKind::Quantile2d => {
            let req = job.request_2d()?;
            let maps = job
                .quantiles()
                .iter()
                .map(|&q| bayes_factor_quantile_2d(source, &req, q, config))
                .collect::<Result<Vec<_>>>()?;
            Ok(PlotOutcome::Quantile2d { maps })
        }
        PlotKind::Credible => Ok(PlotOutcome::Credible(credible_region(
            source,
            &job.credible_request()?,
            &config.credibility,
        )?)),
    }
}

impl Plan {
    pub fn from_toml(content: &str) -> Result<Plan> {
        toml::from_str(content).map_err(|e| PmssmError::Config(format!("invalid plot plan: {e}")))
    }

    pub fn load(path: &Path) -> Result<Plan> {
        Plan::from_toml(&std::fs::read_to_string(path)?)
    }

    pub fn default_plan() -> Result<Plan> {
        Plan::from_toml(DEFAULT_PLAN)
    }

    /// All jobs after composition expansion, in plan order.
    pub fn jobs(&self) -> Vec<PlotJob> {
        self.plots.iter().flat_map(PlotJob::variants).collect()
    }

    /// Run every job in order and hand each result to `sink`. A failing job
    /// is logged and reported; the remaining jobs still run.
    pub fn run<F>(&self, source: &dyn DataSource, config: &Config, mut sink: F) -> Vec<JobReport>
    where
        F: FnMut(&PlotJob, &PlotOutcome) -> Result<()>,
    {
        self.jobs()
            .into_iter()
            .map(|job| {
                let start = Instant::now();
                let result = run_job(source, &job, config).and_then(|outcome| sink(&job, &outcome));
                let elapsed_ms = start.elapsed().as_millis();
                let error = match result {
                    Ok(()) => {
                        tracing::info!(job = %job.name, elapsed_ms, "plot done");
                        None
                    }
                    Err(e) => {
                        tracing::error!(job = %job.name, error = %e, "plot failed");
                        Some(e.to_string())
                    }
                };
                JobReport { name: job.name, kind: job.kind, elapsed_ms, error }
            })
            .collect()
    }
}
