use pmssm_common::{PmssmError, Result};
use serde::{Deserialize, Serialize};

/// Where a value lands on an axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bin {
    Underflow,
    Regular(usize),
    Overflow,
}

/// Binning along one dimension: fixed-width or log10-spaced edges.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Axis {
    edges: Vec<f64>,
    log: bool,
}

impl Axis {
    pub fn uniform(bins: usize, low: f64, high: f64) -> Result<Axis> {
        check_range(bins, low, high)?;
        let width = (high - low) / bins as f64;
        let mut edges: Vec<f64> = (0..bins).map(|i| low + i as f64 * width).collect();
        edges.push(high);
        Ok(Axis { edges, log: false })
    }

    /// Edges equally spaced in log10 between `low` and `high`.
    pub fn logarithmic(bins: usize, low: f64, high: f64) -> Result<Axis> {
        check_range(bins, low, high)?;
        if low <= 0.0 {
            return Err(PmssmError::InvalidAxis(format!("log axis needs a positive lower edge, got {low}")));
        }
        let (l0, l1) = (low.log10(), high.log10());
        let step = (l1 - l0) / bins as f64;
        let mut edges: Vec<f64> = (0..bins).map(|i| 10f64.powf(l0 + i as f64 * step)).collect();
        edges.push(high);
        Ok(Axis { edges, log: true })
    }

    pub fn new(bins: usize, low: f64, high: f64, log: bool) -> Result<Axis> {
        if log { Self::logarithmic(bins, low, high) } else { Self::uniform(bins, low, high) }
    }

    pub fn bins(&self) -> usize { self.edges.len() - 1 }
    pub fn low(&self) -> f64 { self.edges[0] }
    pub fn high(&self) -> f64 { self.edges[self.edges.len() - 1] }
    pub fn is_log(&self) -> bool { self.log }
    pub fn edges(&self) -> &[f64] { &self.edges }
    pub fn lower_edge(&self, i: usize) -> f64 { self.edges[i] }
    pub fn upper_edge(&self, i: usize) -> f64 { self.edges[i + 1] }
    pub fn width(&self, i: usize) -> f64 { self.edges[i + 1] - self.edges[i] }
    pub fn center(&self, i: usize) -> f64 { 0.5 * (self.edges[i] + self.edges[i + 1]) }

    /// Half-open bins: `low` is in bin 0, `high` is overflow. NaN counts as overflow.
    pub fn find_bin(&self, x: f64) -> Bin {
        if x.is_nan() || x >= self.high() {
            return Bin::Overflow;
        }
        if x < self.low() {
            return Bin::Underflow;
        }
        let idx = self.edges.partition_point(|&e| e <= x) - 1;
        Bin::Regular(idx.min(self.bins() - 1))
    }

    /// Index into a flow-inclusive buffer: 0 underflow, 1..=bins regular, bins+1 overflow.
    pub(crate) fn slot(&self, x: f64) -> usize {
        match self.find_bin(x) {
            Bin::Underflow => 0,
            Bin::Regular(i) => i + 1,
            Bin::Overflow => self.bins() + 1,
        }
    }

    /// Same binning with every edge divided by `factor` (display units, e.g. GeV -> TeV).
    pub fn scaled(&self, factor: f64) -> Axis {
        if factor == 1.0 || factor == 0.0 {
            return self.clone();
        }
        Axis { edges: self.edges.iter().map(|e| e / factor).collect(), log: self.log }
    }
}

fn check_range(bins: usize, low: f64, high: f64) -> Result<()> {
    if bins == 0 {
        return Err(PmssmError::InvalidAxis("axis needs at least one bin".into()));
    }
    if !low.is_finite() || !high.is_finite() || low >= high {
        return Err(PmssmError::InvalidAxis(format!("bad axis range [{low}, {high})")));
    }
    Ok(())
}

fn default_linear_scale() -> f64 {
    1.0
}

/// User-facing axis description, as written in plot plans.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AxisSpec {
    #[serde(default)]
    pub title: Option<String>,
    pub bins: usize,
    pub interval: [f64; 2],
    #[serde(default)]
    pub log_scale: bool,
    /// displayed edges are divided by this factor
    #[serde(default = "default_linear_scale")]
    pub linear_scale: f64,
}

impl AxisSpec {
    pub fn new(bins: usize, low: f64, high: f64) -> Self {
        AxisSpec { title: None, bins, interval: [low, high], log_scale: false, linear_scale: 1.0 }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn axis(&self) -> Result<Axis> {
        Axis::new(self.bins, self.interval[0], self.interval[1], self.log_scale)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_edges_and_lookup() {
        let a = Axis::uniform(4, 0.0, 4.0).unwrap();
        assert_eq!(a.edges(), &[0.0, 1.0, 2.0, 3.0, 4.0]);
        assert_eq!(a.find_bin(0.0), Bin::Regular(0));
        assert_eq!(a.find_bin(2.5), Bin::Regular(2));
        assert_eq!(a.find_bin(3.999), Bin::Regular(3));
        assert_eq!(a.find_bin(4.0), Bin::Overflow);
        assert_eq!(a.find_bin(-0.1), Bin::Underflow);
        assert_eq!(a.find_bin(f64::NAN), Bin::Overflow);
    }

    #[test]
    fn log_edges() {
        let a = Axis::logarithmic(3, 1.0, 1000.0).unwrap();
        assert!((a.edges()[1] - 10.0).abs() < 1e-9);
        assert!((a.edges()[2] - 100.0).abs() < 1e-9);
        assert_eq!(a.find_bin(50.0), Bin::Regular(1));
        assert!(a.is_log());
    }

    #[test]
    fn log_axis_rejects_zero_low_edge() {
        assert!(matches!(Axis::logarithmic(10, 0.0, 10.0), Err(PmssmError::InvalidAxis(_))));
    }

    #[test]
    fn bad_ranges_rejected() {
        assert!(Axis::uniform(0, 0.0, 1.0).is_err());
        assert!(Axis::uniform(10, 1.0, 1.0).is_err());
        assert!(Axis::uniform(10, 0.0, f64::INFINITY).is_err());
    }

    #[test]
    fn scaled_divides_edges() {
        let a = Axis::uniform(2, 0.0, 2000.0).unwrap().scaled(1000.0);
        assert_eq!(a.edges(), &[0.0, 1.0, 2.0]);
    }

    #[test]
    fn spec_from_toml() {
        let spec: AxisSpec = toml::from_str("bins = 50\ninterval = [0.0, 2500.0]\nlinear_scale = 1000.0").unwrap();
        assert_eq!(spec.bins, 50);
        assert!(!spec.log_scale);
        assert_eq!(spec.axis().unwrap().high(), 2500.0);
    }
}
