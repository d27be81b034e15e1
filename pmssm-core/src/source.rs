//! Weighted row queries against a tabular dataset.

use crate::expr::Expr;
use crate::filter::{can_skip_row_group, check_columns, eval_predicate_batch, Predicate};
use crate::scanner::resolve_paths;
use arrow::record_batch::RecordBatch;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ProjectionMask;
use pmssm_common::{PmssmError, Result};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const BATCH_SIZE: usize = 8192;

/// Which rows count and how much each one weighs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Selection {
    pub predicate: Predicate,
    pub weight: Expr,
}

impl Selection {
    pub fn new(predicate: Predicate, weight: Expr) -> Self {
        Selection { predicate, weight }
    }

    pub fn unweighted(predicate: Predicate) -> Self {
        Selection { predicate, weight: Expr::lit(1.0) }
    }

    pub fn and(mut self, extra: Predicate) -> Self {
        self.predicate = self.predicate.and(extra);
        self
    }

    pub fn and_all(self, extra: impl IntoIterator<Item = Predicate>) -> Self {
        extra.into_iter().fold(self, Selection::and)
    }

    pub fn weighted_by(mut self, factor: Expr) -> Self {
        self.weight = self.weight * factor;
        self
    }
}

/// Quantities to compute for every selected row.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub values: Vec<Expr>,
    pub selection: Selection,
}

impl Query {
    pub fn new(values: Vec<Expr>, selection: Selection) -> Self {
        Query { values, selection }
    }

    /// Every column the query touches, deduplicated, in first-use order.
    pub fn columns(&self) -> Vec<&str> {
        let mut cols: Vec<&str> = Vec::new();
        let all = self
            .values
            .iter()
            .flat_map(|e| e.columns())
            .chain(self.selection.predicate.columns())
            .chain(self.selection.weight.columns());
        for c in all {
            if !cols.contains(&c) {
                cols.push(c);
            }
        }
        cols
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightedRow {
    pub values: Vec<f64>,
    pub weight: f64,
}

pub trait DataSource: Sync {
    /// Column names available to expressions.
    fn columns(&self) -> Vec<String>;

    /// Selected rows with finite values and positive weight.
    fn query(&self, query: &Query) -> Result<Vec<WeightedRow>>;
}

/// Evaluate a query over one batch, appending the surviving rows.
fn collect_batch(query: &Query, batch: &RecordBatch, out: &mut Vec<WeightedRow>) -> Result<usize> {
    let mask = eval_predicate_batch(&query.selection.predicate, batch)?;
    if mask.true_count() == 0 {
        return Ok(0);
    }
    let weights = query.selection.weight.eval(batch)?;
    let columns: Vec<Vec<f64>> = query.values.iter().map(|e| e.eval(batch)).collect::<Result<_>>()?;
    let before = out.len();
    for row in 0..batch.num_rows() {
        if !mask.value(row) {
            continue;
        }
        let weight = weights[row];
        if !(weight.is_finite() && weight > 0.0) {
            continue;
        }
        let values: Vec<f64> = columns.iter().map(|c| c[row]).collect();
        if values.iter().all(|v| v.is_finite()) {
            out.push(WeightedRow { values, weight });
        }
    }
    Ok(out.len() - before)
}

/// One or more parquet files sharing a schema.
#[derive(Debug, Clone)]
pub struct ParquetSource {
    files: Vec<PathBuf>,
    columns: Vec<String>,
}

impl ParquetSource {
    /// Open a single file, a directory of files, or a glob pattern.
    pub fn open(input: &str) -> Result<Self> {
        let files = resolve_paths(input)?;
        if files.is_empty() {
            return Err(PmssmError::Other(format!("no parquet files found for '{input}'")));
        }
        Self::from_paths(files)
    }

    pub fn from_paths(files: Vec<PathBuf>) -> Result<Self> {
        let first = files.first().ok_or_else(|| PmssmError::Other("no input files".into()))?;
        let builder = ParquetRecordBatchReaderBuilder::try_new(std::fs::File::open(first)?)?;
        let columns = builder.schema().fields().iter().map(|f| f.name().clone()).collect();
        tracing::debug!(files = files.len(), "opened parquet source");
        Ok(ParquetSource { files, columns })
    }

    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }
}

fn scan_file(path: &Path, query: &Query, needed: &[&str]) -> Result<Vec<WeightedRow>> {
    let builder = ParquetRecordBatchReaderBuilder::try_new(std::fs::File::open(path)?)?;
    let meta = builder.metadata().clone();
    let total_rgs = meta.num_row_groups();
    let rgs_to_scan: Vec<usize> = (0..total_rgs)
        .filter(|&i| !can_skip_row_group(&query.selection.predicate, meta.row_group(i)))
        .collect();
    let mut out = Vec::new();
    if rgs_to_scan.is_empty() {
        tracing::debug!(file = %path.display(), total_rgs, "all row groups skipped");
        return Ok(out);
    }
    let schema = builder.schema().clone();
    let indices: Vec<usize> = needed
        .iter()
        .filter_map(|c| schema.fields().iter().position(|f| f.name() == c))
        .collect();
    let mask = ProjectionMask::roots(builder.parquet_schema(), indices);
    let scanned = rgs_to_scan.len();
    let reader = builder
        .with_projection(mask)
        .with_row_groups(rgs_to_scan)
        .with_batch_size(BATCH_SIZE)
        .build()?;
    let mut matched = 0;
    for batch in reader {
        matched += collect_batch(query, &batch?, &mut out)?;
    }
    tracing::debug!(file = %path.display(), scanned, skipped = total_rgs - scanned, matched, "scanned file");
    Ok(out)
}

impl DataSource for ParquetSource {
    fn columns(&self) -> Vec<String> {
        self.columns.clone()
    }

    fn query(&self, query: &Query) -> Result<Vec<WeightedRow>> {
        let needed = query.columns();
        check_columns(needed.iter().copied(), &self.columns)?;
        let per_file: Vec<Vec<WeightedRow>> =
            self.files.par_iter().map(|p| scan_file(p, query, &needed)).collect::<Result<_>>()?;
        Ok(per_file.into_iter().flatten().collect())
    }
}

/// Record batches held in memory.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    batches: Vec<RecordBatch>,
}

impl MemorySource {
    pub fn new(batches: Vec<RecordBatch>) -> Self {
        MemorySource { batches }
    }
}

impl DataSource for MemorySource {
    fn columns(&self) -> Vec<String> {
        self.batches
            .first()
            .map(|b| b.schema().fields().iter().map(|f| f.name().clone()).collect())
            .unwrap_or_default()
    }

    fn query(&self, query: &Query) -> Result<Vec<WeightedRow>> {
        check_columns(query.columns(), &self.columns())?;
        let mut out = Vec::new();
        for batch in &self.batches {
            collect_batch(query, batch, &mut out)?;
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::parse_predicate;
    use arrow::array::Float64Array;
    use arrow::datatypes::{DataType, Field, Schema};
    use std::sync::Arc;

    fn batch() -> RecordBatch {
        let schema = Schema::new(vec![
            Field::new("m", DataType::Float64, true),
            Field::new("PickProbability", DataType::Float64, false),
        ]);
        RecordBatch::try_new(
            Arc::new(schema),
            vec![
                Arc::new(Float64Array::from(vec![Some(100.0), Some(200.0), None, Some(400.0)])),
                Arc::new(Float64Array::from(vec![0.5, 0.25, 1.0, 0.0])),
            ],
        )
        .unwrap()
    }

    fn selection() -> Selection {
        Selection::new(Predicate::Always, Expr::lit(1.0) / Expr::col("PickProbability"))
    }

    #[test]
    fn drops_null_values_and_infinite_weights() {
        let src = MemorySource::new(vec![batch()]);
        let rows = src.query(&Query::new(vec![Expr::col("m")], selection())).unwrap();
        // row 2 has a null mass, row 3 has weight 1/0
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0], WeightedRow { values: vec![100.0], weight: 2.0 });
        assert_eq!(rows[1].weight, 4.0);
    }

    #[test]
    fn predicate_filters_rows() {
        let src = MemorySource::new(vec![batch()]);
        let sel = selection().and(parse_predicate("m > 150").unwrap());
        let rows = src.query(&Query::new(vec![Expr::col("m") / Expr::lit(100.0)], sel)).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].values, vec![2.0]);
    }

    #[test]
    fn unknown_column_fails_early() {
        let src = MemorySource::new(vec![batch()]);
        let err = src.query(&Query::new(vec![Expr::col("gluino")], selection())).unwrap_err();
        assert!(matches!(err, PmssmError::UnknownColumn { .. }));
    }

    #[test]
    fn query_columns_deduplicated() {
        let q = Query::new(
            vec![Expr::col("a"), Expr::col("b") + Expr::col("a")],
            Selection::unweighted(Predicate::gt(Expr::col("b"), 0.0)),
        );
        assert_eq!(q.columns(), vec!["a", "b"]);
    }

    #[test]
    fn weighted_by_multiplies() {
        let sel = Selection::unweighted(Predicate::Always).weighted_by(Expr::lit(3.0));
        assert_eq!(sel.weight.eval_with(&|_| None), 3.0);
    }
}
