//! SVG rendering of plot results with plotters.

use crate::export::output_stem;
use crate::histogram::{Hist1D, Hist2D};
use crate::maps::{CredibleRegion, NO_POINTS};
use crate::plan::{PlotJob, PlotOutcome};
use plotters::prelude::*;
use pmssm_common::{PmssmError, RenderConfig, Result};
use std::error::Error;
use std::path::{Path, PathBuf};

type DrawResult = std::result::Result<(), Box<dyn Error>>;

const LIGHT_BLUE: RGBColor = RGBColor(153, 153, 255);
const GREY: RGBColor = RGBColor(128, 128, 128);
const DARK_RED: RGBColor = RGBColor(153, 0, 0);
const SURVIVAL_FLOOR: f64 = 1e-5;
// z levels are drawn in steps of this size, as in the published maps
const Z_STEP: f64 = 0.05;

// blue -> teal -> yellow
const GRADIENT: [(f64, (u8, u8, u8)); 3] = [(0.0, (53, 42, 135)), (0.5, (33, 165, 133)), (1.0, (249, 251, 14))];

fn render_err(e: Box<dyn Error>) -> PmssmError {
    PmssmError::Render(e.to_string())
}

fn gradient(t: f64) -> RGBColor {
    let t = t.clamp(0.0, 1.0);
    let (lo, hi) = if t <= GRADIENT[1].0 { (GRADIENT[0], GRADIENT[1]) } else { (GRADIENT[1], GRADIENT[2]) };
    let f = (t - lo.0) / (hi.0 - lo.0);
    let ((r0, g0, b0), (r1, g1, b1)) = (lo.1, hi.1);
    let mix = |a: u8, b: u8| (a as f64 + f * (b as f64 - a as f64)).round() as u8;
    RGBColor(mix(r0, r1), mix(g0, g1), mix(b0, b1))
}

/// Cell colour on a map whose z axis ends at `z_max`: cells without points
/// are white, vanishing values black, values at the top grey.
pub fn map_color(v: f64, z_max: f64) -> RGBColor {
    if v <= NO_POINTS || v.is_nan() {
        return WHITE;
    }
    let t = if z_max > 0.0 { v / z_max } else { 0.0 };
    if t < SURVIVAL_FLOOR {
        BLACK
    } else if t > 1.0 - SURVIVAL_FLOOR {
        GREY
    } else {
        gradient((t / Z_STEP).floor() * Z_STEP)
    }
}

fn density_color(v: f64, max: f64) -> RGBColor {
    if v <= 0.0 || max <= 0.0 {
        WHITE
    } else {
        gradient(v / max)
    }
}

fn step_points(h: &Hist1D) -> Vec<(f64, f64)> {
    h.bins_iter().flat_map(|b| [(b.range_start, b.content), (b.range_end, b.content)]).collect()
}

struct Curve<'a> {
    hist: &'a Hist1D,
    label: String,
    color: RGBColor,
}

fn draw_curves(path: &Path, cfg: &RenderConfig, x_title: &str, y_title: &str, curves: &[Curve]) -> DrawResult {
    let Some(first) = curves.first() else { return Ok(()) };
    let axis = first.hist.axis();
    let y_max = curves.iter().map(|c| c.hist.maximum()).fold(0.0, f64::max);
    let y_max = if y_max > 0.0 { 1.1 * y_max } else { 1.0 };

    let root = SVGBackend::new(path, (cfg.width, cfg.height)).into_drawing_area();
    root.fill(&WHITE)?;
    let mut chart = ChartBuilder::on(&root)
        .margin(20)
        .x_label_area_size(45)
        .y_label_area_size(60)
        .build_cartesian_2d(axis.low()..axis.high(), 0.0..y_max)?;
    chart.configure_mesh().disable_mesh().x_desc(x_title).y_desc(y_title).draw()?;

    for c in curves {
        let color = c.color;
        chart
            .draw_series(LineSeries::new(step_points(c.hist), color.stroke_width(2)))?
            .label(c.label.clone())
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color.stroke_width(2)));
    }
    chart
        .configure_series_labels()
        .position(SeriesLabelPosition::UpperRight)
        .background_style(&WHITE.mix(0.8))
        .border_style(&BLACK)
        .draw()?;
    root.present()?;
    Ok(())
}

struct Overlay<'a> {
    region: &'a CredibleRegion,
    label: &'static str,
    colors: [RGBColor; 3],
}

fn draw_map(
    path: &Path,
    cfg: &RenderConfig,
    titles: (&str, &str),
    map: &Hist2D,
    color: &dyn Fn(f64) -> RGBColor,
    overlays: &[Overlay],
) -> DrawResult {
    let (x, y) = (map.x_axis(), map.y_axis());
    let root = SVGBackend::new(path, (cfg.width, cfg.height)).into_drawing_area();
    root.fill(&WHITE)?;
    let mut chart = ChartBuilder::on(&root)
        .margin(20)
        .x_label_area_size(45)
        .y_label_area_size(60)
        .build_cartesian_2d(x.low()..x.high(), y.low()..y.high())?;
    chart.configure_mesh().disable_mesh().x_desc(titles.0).y_desc(titles.1).draw()?;

    chart.draw_series(
        map.cells().map(|c| Rectangle::new([(c.x[0], c.y[0]), (c.x[1], c.y[1])], color(c.content).filled())),
    )?;

    for overlay in overlays {
        for (k, interval) in overlay.region.intervals.iter().enumerate() {
            let line_color = overlay.colors[k % overlay.colors.len()];
            let label = format!("{}% {} CI", (100.0 * interval.fraction).round(), overlay.label);
            let mut labelled = false;
            for line in &interval.lines {
                let series = chart.draw_series(std::iter::once(PathElement::new(
                    line.points.clone(),
                    line_color.stroke_width(2),
                )))?;
                if !labelled {
                    series
                        .label(label.clone())
                        .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], line_color.stroke_width(2)));
                    labelled = true;
                }
            }
        }
    }
    if !overlays.is_empty() {
        chart
            .configure_series_labels()
            .position(SeriesLabelPosition::UpperLeft)
            .background_style(&WHITE.mix(0.8))
            .border_style(&BLACK)
            .draw()?;
    }
    root.present()?;
    Ok(())
}

fn titles(job: &PlotJob) -> (String, String) {
    let x = job.x.title.clone().unwrap_or_else(|| job.draw.clone());
    let y = job.y.as_ref().and_then(|y| y.title.clone()).unwrap_or_default();
    (x, y)
}

fn posterior_curves<'a>(
    name: &str,
    nominal: &'a Hist1D,
    up: Option<&'a Hist1D>,
    down: Option<&'a Hist1D>,
) -> Vec<Curve<'a>> {
    let mut curves = vec![Curve { hist: nominal, label: format!("{name} posterior"), color: BLACK }];
    if let Some(h) = up {
        curves.push(Curve { hist: h, label: "σ × 1.5".into(), color: MAGENTA });
    }
    if let Some(h) = down {
        curves.push(Curve { hist: h, label: "σ × 0.5".into(), color: RED });
    }
    curves
}

/// Draw one plot result; returns the SVG files written.
pub fn render_outcome(
    dir: &Path,
    stem: &str,
    job: &PlotJob,
    outcome: &PlotOutcome,
    cfg: &RenderConfig,
) -> Result<Vec<PathBuf>> {
    let (x_title, y_title) = titles(job);
    let path = dir.join(format!("{stem}.svg"));
    let analysis = job.analysis.name();
    match outcome {
        PlotOutcome::Impact(p) => {
            let mut curves = vec![Curve { hist: &p.prior, label: "prior".into(), color: LIGHT_BLUE }];
            curves.extend(posterior_curves(
                analysis,
                &p.posterior,
                p.posterior_up.as_ref(),
                p.posterior_down.as_ref(),
            ));
            draw_curves(&path, cfg, &x_title, "pMSSM density", &curves).map_err(render_err)?;
        }
        PlotOutcome::Survival1d(s) => {
            let curves =
                posterior_curves(analysis, &s.posterior, s.posterior_up.as_ref(), s.posterior_down.as_ref());
            draw_curves(&path, cfg, &x_title, "survival probability", &curves).map_err(render_err)?;
        }
        PlotOutcome::Quantile1d { curves } => {
            let palette = [BLACK, BLUE, RED, MAGENTA, GREEN, CYAN];
            let curves: Vec<Curve> = curves
                .iter()
                .enumerate()
                .map(|(i, c)| Curve {
                    hist: &c.hist,
                    label: format!("{}% quantile", (100.0 * c.quantile).round()),
                    color: palette[i % palette.len()],
                })
                .collect();
            draw_curves(&path, cfg, &x_title, "Bayes factor", &curves).map_err(render_err)?;
        }
        PlotOutcome::Survival2d { survival, prior_ci, posterior_ci } => {
            let mut overlays = Vec::new();
            if let Some(region) = prior_ci {
                overlays.push(Overlay { region, label: "prior", colors: [RED, DARK_RED, MAGENTA] });
            }
            if let Some(region) = posterior_ci {
                overlays.push(Overlay { region, label: "posterior", colors: [BLUE, CYAN, GREEN] });
            }
            let z_max = survival.z_range[1];
            draw_map(&path, cfg, (&x_title, &y_title), &survival.map, &|v: f64| map_color(v, z_max), &overlays)
                .map_err(render_err)?;
        }
        PlotOutcome::Quantile2d { maps } => {
            let mut written = Vec::with_capacity(maps.len());
            for m in maps {
                let path = dir.join(format!("{}.svg", output_stem(&m.map.name)));
                let z_max = m.z_range[1];
                draw_map(&path, cfg, (&x_title, &y_title), &m.map, &|v: f64| map_color(v, z_max), &[])
                    .map_err(render_err)?;
                written.push(path);
            }
            return Ok(written);
        }
        PlotOutcome::Credible(region) => {
            let max = region.histogram.maximum();
            let label = match region.density {
                crate::maps::Density::Prior => "prior",
                crate::maps::Density::Posterior => "posterior",
            };
            let overlay = Overlay { region, label, colors: [RED, DARK_RED, MAGENTA] };
            draw_map(&path, cfg, (&x_title, &y_title), &region.histogram, &|v: f64| density_color(v, max), &[overlay])
                .map_err(render_err)?;
        }
    }
    Ok(vec![path])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::histogram::Axis;

    #[test]
    fn survival_palette() {
        assert_eq!(map_color(-1.0, 1.0), WHITE);
        assert_eq!(map_color(0.0, 1.0), BLACK);
        assert_eq!(map_color(1.0, 1.0), GREY);
        let mid = map_color(0.5, 1.0);
        assert_ne!(mid, BLACK);
        assert_ne!(mid, GREY);
        // same 0.05 step, same colour
        assert_eq!(map_color(0.51, 1.0), map_color(0.54, 1.0));
    }

    #[test]
    fn quantile_maps_scale_by_z_range() {
        assert_eq!(map_color(3.0, 3.0), GREY);
        assert_eq!(map_color(1.5, 3.0), map_color(0.5, 1.0));
    }

    #[test]
    fn step_points_trace_bin_edges() {
        let mut h = Hist1D::new("h", Axis::uniform(2, 0.0, 2.0).unwrap());
        h.fill(0.5, 3.0);
        assert_eq!(step_points(&h), vec![(0.0, 3.0), (1.0, 3.0), (1.0, 0.0), (2.0, 0.0)]);
    }

    #[test]
    fn writes_svg() {
        let dir = tempfile::tempdir().unwrap();
        let mut h = Hist1D::new("h", Axis::uniform(4, 0.0, 4.0).unwrap());
        h.fill(1.5, 2.0);
        let path = dir.path().join("h.svg");
        let curves = [Curve { hist: &h, label: "h".into(), color: BLACK }];
        draw_curves(&path, &RenderConfig::default(), "x", "y", &curves).unwrap();
        let svg = std::fs::read_to_string(&path).unwrap();
        assert!(svg.contains("<svg"));
    }
}
