pub mod analysis;
pub mod contour;
pub mod credibility;
pub mod dataset;
pub mod export;
pub mod expr;
pub mod filter;
pub mod histogram;
pub mod maps;
pub mod plan;
pub mod reader;
pub mod render;
pub mod scanner;
pub mod source;

pub use pmssm_common::{Config, PmssmError, Result};
pub use analysis::{Analysis, Composition, SignalStrength};
pub use contour::{trace_contours, ContourLine};
pub use credibility::{threshold_for_containment, ThresholdLevel, Thresholds};
pub use dataset::{describe_dataset, DatasetProfile, FileProfile};
pub use export::{export_csv_1d, export_csv_2d, export_json, output_stem, print_reports, print_summary, write_outcome};
pub use expr::{Expr, Projection};
pub use filter::{parse_predicate, Predicate};
pub use histogram::{Axis, AxisSpec, Hist1D, Hist2D};
pub use plan::{run_job, CiOverlay, JobReport, Plan, PlotJob, PlotKind, PlotOutcome, DEFAULT_PLAN};
pub use reader::{open_parquet_file, ParquetFileInfo, SchemaFieldInfo};
pub use scanner::resolve_paths;
pub use source::{DataSource, MemorySource, ParquetSource, Query, Selection, WeightedRow};
