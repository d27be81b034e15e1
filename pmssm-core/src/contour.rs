//! Iso-lines through a 2D histogram, traced on the grid of cell centres.

use crate::histogram::Hist2D;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContourLine {
    pub level: f64,
    pub points: Vec<(f64, f64)>,
    pub closed: bool,
}

impl ContourLine {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn scaled(mut self, x_factor: f64, y_factor: f64) -> Self {
        let fx = if x_factor == 0.0 { 1.0 } else { x_factor };
        let fy = if y_factor == 0.0 { 1.0 } else { y_factor };
        for p in &mut self.points {
            p.0 /= fx;
            p.1 /= fy;
        }
        self
    }
}

// grid edge between centre (i, j) and (i + 1, j) or (i, j + 1)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum EdgeKey {
    H(usize, usize),
    V(usize, usize),
}

/// Trace every line where the histogram crosses `level`. A centre with value
/// >= `level` counts as inside. Lines shorter than `min_points` are dropped.
pub fn trace_contours(hist: &Hist2D, level: f64, min_points: usize) -> Vec<ContourLine> {
    let (nx, ny) = (hist.x_axis().bins(), hist.y_axis().bins());
    if nx < 2 || ny < 2 || !level.is_finite() {
        return Vec::new();
    }
    let cx: Vec<f64> = (0..nx).map(|i| hist.x_axis().center(i)).collect();
    let cy: Vec<f64> = (0..ny).map(|j| hist.y_axis().center(j)).collect();
    let v = |i: usize, j: usize| hist.content(i, j);

    let mut points: HashMap<EdgeKey, (f64, f64)> = HashMap::new();
    let mut crossing = |key: EdgeKey| -> EdgeKey {
        points.entry(key).or_insert_with(|| {
            let ((i0, j0), (i1, j1)) = match key {
                EdgeKey::H(i, j) => ((i, j), (i + 1, j)),
                EdgeKey::V(i, j) => ((i, j), (i, j + 1)),
            };
            let (a, b) = (v(i0, j0), v(i1, j1));
            let t = if b == a { 0.5 } else { ((level - a) / (b - a)).clamp(0.0, 1.0) };
            (cx[i0] + t * (cx[i1] - cx[i0]), cy[j0] + t * (cy[j1] - cy[j0]))
        });
        key
    };

    let mut segments: Vec<(EdgeKey, EdgeKey)> = Vec::new();
    for j in 0..ny - 1 {
        for i in 0..nx - 1 {
            let corners = [v(i, j), v(i + 1, j), v(i + 1, j + 1), v(i, j + 1)];
            let inside = corners.map(|c| c >= level);
            let case = inside.iter().enumerate().fold(0u8, |acc, (k, &b)| acc | ((b as u8) << k));
            if case == 0 || case == 0b1111 {
                continue;
            }
            let bottom = EdgeKey::H(i, j);
            let right = EdgeKey::V(i + 1, j);
            let top = EdgeKey::H(i, j + 1);
            let left = EdgeKey::V(i, j);
            // edges touching corner k: 0 bottom-left, 1 bottom-right, 2 top-right, 3 top-left
            let around = [(left, bottom), (bottom, right), (right, top), (top, left)];
            match case {
                0b0101 | 0b1010 => {
                    let centre_inside = corners.iter().sum::<f64>() / 4.0 >= level;
                    for (k, (a, b)) in around.iter().enumerate() {
                        if inside[k] != centre_inside {
                            segments.push((crossing(*a), crossing(*b)));
                        }
                    }
                }
                _ => {
                    let cut: Vec<EdgeKey> = [bottom, right, top, left]
                        .into_iter()
                        .zip([(0usize, 1usize), (1, 2), (2, 3), (3, 0)])
                        .filter(|(_, (p, q))| inside[*p] != inside[*q])
                        .map(|(e, _)| e)
                        .collect();
                    if let &[a, b] = cut.as_slice() {
                        segments.push((crossing(a), crossing(b)));
                    }
                }
            }
        }
    }

    chain(&segments)
        .into_iter()
        .filter(|keys| keys.len() >= min_points)
        .map(|keys| {
            let closed = keys.len() > 2 && keys.first() == keys.last();
            ContourLine { level, points: keys.iter().map(|k| points[k]).collect(), closed }
        })
        .collect()
}

fn chain(segments: &[(EdgeKey, EdgeKey)]) -> Vec<Vec<EdgeKey>> {
    let mut by_edge: HashMap<EdgeKey, Vec<usize>> = HashMap::new();
    for (idx, (a, b)) in segments.iter().enumerate() {
        by_edge.entry(*a).or_default().push(idx);
        by_edge.entry(*b).or_default().push(idx);
    }
    let mut used = vec![false; segments.len()];
    let mut lines = Vec::new();

    let walk = |from: EdgeKey, used: &mut Vec<bool>| -> Vec<EdgeKey> {
        let mut out = Vec::new();
        let mut at = from;
        loop {
            let next = by_edge.get(&at).and_then(|c| c.iter().copied().find(|&s| !used[s]));
            let Some(idx) = next else { break };
            used[idx] = true;
            let (a, b) = segments[idx];
            at = if a == at { b } else { a };
            out.push(at);
        }
        out
    };

    for start in 0..segments.len() {
        if used[start] {
            continue;
        }
        used[start] = true;
        let (a, b) = segments[start];
        let mut line = vec![a, b];
        line.extend(walk(b, &mut used));
        if line.last() != Some(&a) {
            let mut back = walk(a, &mut used);
            back.reverse();
            back.extend(line);
            line = back;
        }
        lines.push(line);
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::histogram::Axis;

    fn peak(n: usize) -> Hist2D {
        let mut h = Hist2D::new("h", Axis::uniform(n, 0.0, n as f64).unwrap(), Axis::uniform(n, 0.0, n as f64).unwrap());
        let c = n as f64 / 2.0;
        for j in 0..n {
            for i in 0..n {
                let (x, y) = (i as f64 + 0.5, j as f64 + 0.5);
                let r2 = (x - c).powi(2) + (y - c).powi(2);
                h.fill(x, y, (-r2 / 8.0).exp());
            }
        }
        h
    }

    #[test]
    fn closed_ring_around_peak() {
        let lines = trace_contours(&peak(20), 0.5, 5);
        assert_eq!(lines.len(), 1);
        let line = &lines[0];
        assert!(line.closed);
        // radius where exp(-r^2/8) = 0.5 is about 2.35
        for (x, y) in &line.points {
            let r = ((x - 10.0).powi(2) + (y - 10.0).powi(2)).sqrt();
            assert!((r - 2.35).abs() < 0.5, "r = {r}");
        }
    }

    #[test]
    fn level_above_maximum_gives_nothing() {
        assert!(trace_contours(&peak(10), 2.0, 1).is_empty());
    }

    #[test]
    fn short_lines_dropped() {
        let mut h = Hist2D::new("h", Axis::uniform(4, 0.0, 4.0).unwrap(), Axis::uniform(4, 0.0, 4.0).unwrap());
        h.fill(0.5, 0.5, 1.0);
        // a single corner cut makes one two-point segment
        assert_eq!(trace_contours(&h, 0.5, 1).len(), 1);
        assert!(trace_contours(&h, 0.5, 5).is_empty());
    }

    #[test]
    fn open_line_across_a_step() {
        let mut h = Hist2D::new("h", Axis::uniform(6, 0.0, 6.0).unwrap(), Axis::uniform(6, 0.0, 6.0).unwrap());
        for j in 0..6 {
            for i in 3..6 {
                h.fill(i as f64 + 0.5, j as f64 + 0.5, 1.0);
            }
        }
        let lines = trace_contours(&h, 0.5, 2);
        assert_eq!(lines.len(), 1);
        assert!(!lines[0].closed);
        assert_eq!(lines[0].len(), 6);
        assert!(lines[0].points.iter().all(|(x, _)| (*x - 3.0).abs() < 1e-12));
    }

    #[test]
    fn scaling_divides_coordinates() {
        let line = ContourLine { level: 1.0, points: vec![(1000.0, 500.0)], closed: false }.scaled(1000.0, 1.0);
        assert_eq!(line.points, vec![(1.0, 500.0)]);
    }
}
