use crate::dataset::DatasetProfile;
use crate::histogram::{Hist1D, Hist2D};
use crate::plan::{JobReport, PlotJob, PlotOutcome};
use crate::render;
use pmssm_common::{Config, PmssmError, Result};
use regex::Regex;
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

// --- headless summary output ---

pub fn print_summary(dataset: &DatasetProfile) {
    println!("{:<16} {}", "Files:", dataset.file_count);
    println!("{:<16} {}", "Rows:", dataset.total_rows);
    println!("{:<16} {} bytes", "Size:", dataset.total_bytes);
    println!("{:<16} {} ({} plottable)", "Columns:", dataset.schema.len(), dataset.plottable_columns());
    let groups: usize = dataset.files.iter().map(|f| f.row_group_count).sum();
    println!("{:<16} {}", "Row groups:", groups);
    if let Some(created_by) = dataset.files.iter().find_map(|f| f.created_by.as_deref()) {
        println!("{:<16} {}", "Created by:", created_by);
    }
    if !dataset.missing_columns.is_empty() {
        println!("{:<16} {}", "Missing:", dataset.missing_columns.join(", "));
    }
}

pub fn print_reports(reports: &[JobReport]) {
    for r in reports {
        match &r.error {
            None => println!("{:<40} {:>8} ms", r.name, r.elapsed_ms),
            Some(e) => println!("{:<40} FAILED: {e}", r.name),
        }
    }
    let failed = reports.iter().filter(|r| !r.succeeded()).count();
    println!("{:<16} {}/{}", "Succeeded:", reports.len() - failed, reports.len());
}

// --- output naming ---

static RE_NON_IDENT: OnceLock<Regex> = OnceLock::new();
fn re_non_ident() -> &'static Regex { RE_NON_IDENT.get_or_init(|| Regex::new(r"[^A-Za-z0-9_]+").unwrap()) }

/// File stem for a draw string or plot name: anything outside `[A-Za-z0-9_]`
/// is dropped, so `abs(chi1pm-chi10)` becomes `abschi1pmchi10`.
pub fn output_stem(name: &str) -> String {
    re_non_ident().replace_all(name, "").into_owned()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Svg,
    Json,
    Csv,
}

/// Comma-separated list of `svg`, `json` and `csv`.
pub fn parse_formats(spec: &str) -> Result<Vec<OutputFormat>> {
    let mut formats = Vec::new();
    for part in spec.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let f = match part.to_ascii_lowercase().as_str() {
            "svg" => OutputFormat::Svg,
            "json" => OutputFormat::Json,
            "csv" => OutputFormat::Csv,
            other => return Err(PmssmError::Config(format!("unknown output format '{other}'"))),
        };
        if !formats.contains(&f) {
            formats.push(f);
        }
    }
    if formats.is_empty() {
        return Err(PmssmError::Config("no output format given".into()));
    }
    Ok(formats)
}

// --- JSON export ---

pub fn export_json<T: Serialize + ?Sized>(output_path: &Path, value: &T) -> Result<()> {
    let mut file = std::fs::File::create(output_path)?;
    serde_json::to_writer_pretty(&mut file, value).map_err(|e| PmssmError::Other(e.to_string()))?;
    writeln!(file)?;
    Ok(())
}

// --- CSV export ---

/// One row per bin; one content column per histogram. All histograms must
/// share the first one's binning.
pub fn export_csv_1d(output_path: &Path, hists: &[&Hist1D]) -> Result<()> {
    let Some(first) = hists.first() else {
        return Err(PmssmError::Other("nothing to export".into()));
    };
    if hists.iter().any(|h| h.axis() != first.axis()) {
        return Err(PmssmError::InvalidAxis("histograms in one CSV must share binning".into()));
    }
    let mut file = std::fs::File::create(output_path)?;
    let names: Vec<&str> = hists.iter().map(|h| h.name.as_str()).collect();
    writeln!(file, "range_start,range_end,{}", names.join(","))?;
    for i in 0..first.bins() {
        let values: Vec<String> = hists.iter().map(|h| format!("{}", h.content(i))).collect();
        writeln!(file, "{},{},{}", first.axis().lower_edge(i), first.axis().upper_edge(i), values.join(","))?;
    }
    Ok(())
}

pub fn export_csv_2d(output_path: &Path, hist: &Hist2D) -> Result<()> {
    let mut file = std::fs::File::create(output_path)?;
    writeln!(file, "x_low,x_high,y_low,y_high,content")?;
    for c in hist.cells() {
        writeln!(file, "{},{},{},{},{}", c.x[0], c.x[1], c.y[0], c.y[1], c.content)?;
    }
    Ok(())
}

fn csv_outcome(dir: &Path, stem: &str, outcome: &PlotOutcome) -> Result<Vec<PathBuf>> {
    let path = dir.join(format!("{stem}.csv"));
    match outcome {
        PlotOutcome::Impact(p) => {
            let hists = [Some(&p.prior), Some(&p.posterior), p.posterior_up.as_ref(), p.posterior_down.as_ref()];
            export_csv_1d(&path, &hists.into_iter().flatten().collect::<Vec<_>>())?;
        }
        PlotOutcome::Survival1d(s) => {
            let hists = [Some(&s.posterior), s.posterior_up.as_ref(), s.posterior_down.as_ref()];
            export_csv_1d(&path, &hists.into_iter().flatten().collect::<Vec<_>>())?;
        }
        PlotOutcome::Quantile1d { curves } => {
            export_csv_1d(&path, &curves.iter().map(|c| &c.hist).collect::<Vec<_>>())?;
        }
        PlotOutcome::Survival2d { survival, .. } => export_csv_2d(&path, &survival.map)?,
        PlotOutcome::Credible(region) => export_csv_2d(&path, &region.histogram)?,
        PlotOutcome::Quantile2d { maps } => {
            let mut written = Vec::with_capacity(maps.len());
            for m in maps {
                let path = dir.join(format!("{}.csv", output_stem(&m.map.name)));
                export_csv_2d(&path, &m.map)?;
                written.push(path);
            }
            return Ok(written);
        }
    }
    Ok(vec![path])
}

/// Write one plot result in every configured format; returns the files written.
pub fn write_outcome(dir: &Path, job: &PlotJob, outcome: &PlotOutcome, config: &Config) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(dir)?;
    let stem = output_stem(&job.name);
    let mut written = Vec::new();
    for format in parse_formats(&config.export.format)? {
        match format {
            OutputFormat::Json => {
                let path = dir.join(format!("{stem}.json"));
                export_json(&path, outcome)?;
                written.push(path);
            }
            OutputFormat::Csv => written.extend(csv_outcome(dir, &stem, outcome)?),
            OutputFormat::Svg => written.extend(render::render_outcome(dir, &stem, job, outcome, &config.render)?),
        }
    }
    tracing::debug!(job = %job.name, files = written.len(), "outputs written");
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::histogram::Axis;

    #[test]
    fn stems_drop_punctuation() {
        assert_eq!(output_stem("abs(chi1pm-chi10)"), "abschi1pmchi10");
        assert_eq!(output_stem("abs(chi10):g"), "abschi10g");
        assert_eq!(output_stem("gluino_chi10_RDPlanck"), "gluino_chi10_RDPlanck");
    }

    #[test]
    fn formats() {
        assert_eq!(parse_formats("svg").unwrap(), vec![OutputFormat::Svg]);
        assert_eq!(parse_formats("JSON, csv,json").unwrap(), vec![OutputFormat::Json, OutputFormat::Csv]);
        assert!(matches!(parse_formats("png"), Err(PmssmError::Config(_))));
        assert!(parse_formats(" , ").is_err());
    }

    #[test]
    fn csv_1d_has_one_column_per_histogram() {
        let dir = tempfile::tempdir().unwrap();
        let axis = Axis::uniform(2, 0.0, 2.0).unwrap();
        let mut a = Hist1D::new("prior", axis.clone());
        let mut b = Hist1D::new("posterior", axis);
        a.fill(0.5, 1.0);
        b.fill(1.5, 2.0);
        let path = dir.path().join("out.csv");
        export_csv_1d(&path, &[&a, &b]).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines, vec!["range_start,range_end,prior,posterior", "0,1,1,0", "1,2,0,2"]);
    }

    #[test]
    fn csv_1d_rejects_mixed_binning() {
        let dir = tempfile::tempdir().unwrap();
        let a = Hist1D::new("a", Axis::uniform(2, 0.0, 2.0).unwrap());
        let b = Hist1D::new("b", Axis::uniform(3, 0.0, 2.0).unwrap());
        assert!(export_csv_1d(&dir.path().join("x.csv"), &[&a, &b]).is_err());
        assert!(export_csv_1d(&dir.path().join("y.csv"), &[]).is_err());
    }

    #[test]
    fn csv_2d_lists_cells() {
        let dir = tempfile::tempdir().unwrap();
        let mut h = Hist2D::new("h", Axis::uniform(2, 0.0, 2.0).unwrap(), Axis::uniform(1, 0.0, 1.0).unwrap());
        h.fill(1.5, 0.5, 3.0);
        let path = dir.path().join("h.csv");
        export_csv_2d(&path, &h).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().count(), 3);
        assert!(text.contains("1,2,0,1,3"));
    }

    #[test]
    fn json_export_writes_valid_document() {
        let dir = tempfile::tempdir().unwrap();
        let mut h = Hist1D::new("h", Axis::uniform(2, 0.0, 2.0).unwrap());
        h.fill(0.5, 1.0);
        let path = dir.path().join("h.json");
        export_json(&path, &h).unwrap();
        let v: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(v["name"], "h");
    }
}
