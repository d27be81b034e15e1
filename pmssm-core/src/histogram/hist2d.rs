use super::axis::Axis;
use pmssm_common::{PmssmError, Result};
use serde::{Deserialize, Serialize};

// 5x5 smoothing kernel, row-major
const K5A: [f64; 25] = [
    0.0, 0.0, 1.0, 0.0, 0.0, //
    0.0, 2.0, 2.0, 2.0, 0.0, //
    1.0, 2.0, 5.0, 2.0, 1.0, //
    0.0, 2.0, 2.0, 2.0, 0.0, //
    0.0, 0.0, 1.0, 0.0, 0.0,
];

/// One regular cell of a 2D histogram, used for export and rendering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cell {
    pub ix: usize,
    pub iy: usize,
    pub x: [f64; 2],
    pub y: [f64; 2],
    pub content: f64,
}

/// Weighted two-dimensional histogram with under/overflow rings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hist2D {
    pub name: String,
    x: Axis,
    y: Axis,
    // (nx + 2) * (ny + 2) slots, x fastest
    contents: Vec<f64>,
}

impl Hist2D {
    pub fn new(name: impl Into<String>, x: Axis, y: Axis) -> Self {
        let len = (x.bins() + 2) * (y.bins() + 2);
        Hist2D { name: name.into(), x, y, contents: vec![0.0; len] }
    }

    pub fn x_axis(&self) -> &Axis { &self.x }
    pub fn y_axis(&self) -> &Axis { &self.y }

    fn index(&self, sx: usize, sy: usize) -> usize {
        sy * (self.x.bins() + 2) + sx
    }

    pub fn fill(&mut self, x: f64, y: f64, w: f64) {
        let idx = self.index(self.x.slot(x), self.y.slot(y));
        self.contents[idx] += w;
    }

    /// Content of regular cell (ix, iy), zero-based.
    pub fn content(&self, ix: usize, iy: usize) -> f64 {
        self.contents[self.index(ix + 1, iy + 1)]
    }

    pub fn set_content(&mut self, ix: usize, iy: usize, v: f64) {
        let idx = self.index(ix + 1, iy + 1);
        self.contents[idx] = v;
    }

    /// Regular cell contents, x fastest.
    pub fn cell_contents(&self) -> impl Iterator<Item = f64> + '_ {
        (0..self.y.bins()).flat_map(move |iy| (0..self.x.bins()).map(move |ix| self.content(ix, iy)))
    }

    pub fn cells(&self) -> impl Iterator<Item = Cell> + '_ {
        (0..self.y.bins()).flat_map(move |iy| {
            (0..self.x.bins()).map(move |ix| Cell {
                ix,
                iy,
                x: [self.x.lower_edge(ix), self.x.upper_edge(ix)],
                y: [self.y.lower_edge(iy), self.y.upper_edge(iy)],
                content: self.content(ix, iy),
            })
        })
    }

    pub fn integral(&self) -> f64 { self.cell_contents().sum() }
    pub fn integral_with_flows(&self) -> f64 { self.contents.iter().sum() }

    pub fn maximum(&self) -> f64 {
        self.cell_contents().fold(f64::NEG_INFINITY, f64::max)
    }

    pub fn minimum(&self) -> f64 {
        self.cell_contents().fold(f64::INFINITY, f64::min)
    }

    pub fn scale(&mut self, factor: f64) {
        for c in &mut self.contents {
            *c *= factor;
        }
    }

    pub fn same_binning(&self, other: &Hist2D) -> bool {
        self.x == other.x && self.y == other.y
    }

    /// Cell-by-cell ratio; cells with an empty denominator become 0.
    pub fn divide(&mut self, denom: &Hist2D) -> Result<()> {
        if !self.same_binning(denom) {
            return Err(PmssmError::InvalidAxis(format!(
                "cannot divide '{}' by '{}': binning differs", self.name, denom.name
            )));
        }
        for (c, d) in self.contents.iter_mut().zip(&denom.contents) {
            *c = if *d == 0.0 { 0.0 } else { *c / d };
        }
        Ok(())
    }

    /// Weighted 5x5 neighbourhood average over regular cells.
    /// Neighbours outside the regular range are left out of both sum and norm.
    pub fn smoothed(&self) -> Hist2D {
        let (nx, ny) = (self.x.bins() as isize, self.y.bins() as isize);
        let mut out = self.clone();
        for iy in 0..ny {
            for ix in 0..nx {
                let mut sum = 0.0;
                let mut norm = 0.0;
                for kx in 0..5isize {
                    for ky in 0..5isize {
                        let (bx, by) = (ix + kx - 2, iy + ky - 2);
                        if bx < 0 || by < 0 || bx >= nx || by >= ny {
                            continue;
                        }
                        let k = K5A[(kx * 5 + ky) as usize];
                        if k != 0.0 {
                            norm += k;
                            sum += k * self.content(bx as usize, by as usize);
                        }
                    }
                }
                if norm != 0.0 {
                    out.set_content(ix as usize, iy as usize, sum / norm);
                }
            }
        }
        out
    }

    /// Same contents shown with both axes divided by their display factors.
    pub fn with_scaled_axes(mut self, x_factor: f64, y_factor: f64) -> Self {
        self.x = self.x.scaled(x_factor);
        self.y = self.y.scaled(y_factor);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid(nx: usize, ny: usize) -> Hist2D {
        Hist2D::new(
            "h",
            Axis::uniform(nx, 0.0, nx as f64).unwrap(),
            Axis::uniform(ny, 0.0, ny as f64).unwrap(),
        )
    }

    #[test]
    fn fill_regular_and_flow_cells() {
        let mut h = grid(3, 2);
        h.fill(0.5, 0.5, 1.0);
        h.fill(2.5, 1.5, 2.0);
        h.fill(9.0, 0.5, 4.0);
        assert_eq!(h.content(0, 0), 1.0);
        assert_eq!(h.content(2, 1), 2.0);
        assert_eq!(h.integral(), 3.0);
        assert_eq!(h.integral_with_flows(), 7.0);
        assert_eq!(h.maximum(), 2.0);
        assert_eq!(h.minimum(), 0.0);
    }

    #[test]
    fn cells_are_x_fastest() {
        let mut h = grid(2, 2);
        h.fill(1.5, 0.5, 5.0);
        let cells: Vec<_> = h.cells().collect();
        assert_eq!(cells.len(), 4);
        assert_eq!((cells[1].ix, cells[1].iy, cells[1].content), (1, 0, 5.0));
        assert_eq!(cells[1].x, [1.0, 2.0]);
    }

    #[test]
    fn divide_zero_denominator() {
        let mut a = grid(2, 1);
        let mut b = grid(2, 1);
        a.fill(0.5, 0.5, 3.0);
        a.fill(1.5, 0.5, 3.0);
        b.fill(0.5, 0.5, 6.0);
        a.divide(&b).unwrap();
        assert_eq!(a.content(0, 0), 0.5);
        assert_eq!(a.content(1, 0), 0.0);
    }

    #[test]
    fn smoothing_preserves_flat_map() {
        let mut h = grid(6, 6);
        for c in 0..36 {
            h.fill((c % 6) as f64 + 0.5, (c / 6) as f64 + 0.5, 2.0);
        }
        let s = h.smoothed();
        for v in s.cell_contents() {
            assert!((v - 2.0).abs() < 1e-12);
        }
    }

    #[test]
    fn smoothing_spreads_a_spike() {
        let mut h = grid(5, 5);
        h.fill(2.5, 2.5, 21.0);
        let s = h.smoothed();
        // full kernel weight is 25, the centre tap is 5
        assert!((s.content(2, 2) - 4.2).abs() < 1e-12);
        assert!(s.content(1, 2) > 0.0);
        assert_eq!(s.content(0, 0), 0.0);
    }

    #[test]
    fn scaled_axes() {
        let h = grid(2, 2).with_scaled_axes(2.0, 1.0);
        assert_eq!(h.x_axis().high(), 1.0);
        assert_eq!(h.y_axis().high(), 2.0);
    }
}
