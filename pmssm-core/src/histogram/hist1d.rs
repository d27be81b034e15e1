use super::axis::Axis;
use pmssm_common::{PmssmError, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistogramBin {
    pub range_start: f64,
    pub range_end: f64,
    pub content: f64,
}

/// Weighted one-dimensional histogram with under/overflow slots.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hist1D {
    pub name: String,
    axis: Axis,
    // [underflow, bin 0 .. bin n-1, overflow]
    contents: Vec<f64>,
}

impl Hist1D {
    pub fn new(name: impl Into<String>, axis: Axis) -> Self {
        let n = axis.bins();
        Hist1D { name: name.into(), axis, contents: vec![0.0; n + 2] }
    }

    pub fn axis(&self) -> &Axis { &self.axis }
    pub fn bins(&self) -> usize { self.axis.bins() }

    pub fn fill(&mut self, x: f64, w: f64) {
        let slot = self.axis.slot(x);
        self.contents[slot] += w;
    }

    pub fn content(&self, i: usize) -> f64 { self.contents[i + 1] }
    pub fn set_content(&mut self, i: usize, v: f64) { self.contents[i + 1] = v; }
    pub fn underflow(&self) -> f64 { self.contents[0] }
    pub fn overflow(&self) -> f64 { self.contents[self.contents.len() - 1] }

    /// Regular bin contents, flows excluded.
    pub fn contents(&self) -> &[f64] {
        &self.contents[1..self.contents.len() - 1]
    }

    pub fn integral(&self) -> f64 { self.contents().iter().sum() }
    pub fn integral_with_flows(&self) -> f64 { self.contents.iter().sum() }

    pub fn maximum(&self) -> f64 {
        self.contents().iter().cloned().fold(f64::NEG_INFINITY, f64::max)
    }

    pub fn scale(&mut self, factor: f64) {
        for c in &mut self.contents {
            *c *= factor;
        }
    }

    /// Bin-by-bin ratio; bins with an empty denominator become 0.
    pub fn divide(&mut self, denom: &Hist1D) -> Result<()> {
        if self.axis != denom.axis {
            return Err(PmssmError::InvalidAxis(format!(
                "cannot divide '{}' by '{}': binning differs", self.name, denom.name
            )));
        }
        for (c, d) in self.contents.iter_mut().zip(&denom.contents) {
            *c = if *d == 0.0 { 0.0 } else { *c / d };
        }
        Ok(())
    }

    /// Interpolated quantile of the regular-bin distribution; None when it is empty.
    pub fn quantile(&self, prob: f64) -> Option<f64> {
        let total = self.integral();
        if total <= 0.0 || !total.is_finite() {
            return None;
        }
        let mut cum = 0.0;
        for (i, &c) in self.contents().iter().enumerate() {
            let next = cum + c / total;
            if next >= prob && c > 0.0 {
                let frac = ((prob - cum) / (next - cum)).clamp(0.0, 1.0);
                return Some(self.axis.lower_edge(i) + self.axis.width(i) * frac);
            }
            cum = next;
        }
        // rounding left the cumulative sum just short of prob
        Some(self.axis.high())
    }

    pub fn with_scaled_axis(mut self, factor: f64) -> Self {
        self.axis = self.axis.scaled(factor);
        self
    }

    pub fn bins_iter(&self) -> impl Iterator<Item = HistogramBin> + '_ {
        (0..self.bins()).map(move |i| HistogramBin {
            range_start: self.axis.lower_edge(i),
            range_end: self.axis.upper_edge(i),
            content: self.content(i),
        })
    }
}
