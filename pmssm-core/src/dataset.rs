use crate::analysis::{CROSS_SECTION, PICK_PROBABILITY};
use crate::reader::{open_parquet_file, SchemaFieldInfo};
use pmssm_common::Result;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetProfile {
    pub file_count: usize,
    pub total_rows: i64,
    pub total_bytes: u64,
    pub files: Vec<FileProfile>,
    pub schema: Vec<SchemaFieldInfo>,
    /// columns every plot selection reads that the schema lacks
    pub missing_columns: Vec<String>,
}

/// Read by the sampling reweight and the sanity cut of every analysis.
pub const REQUIRED_COLUMNS: [&str; 3] = [PICK_PROBABILITY, CROSS_SECTION, "Zsig_combined"];

impl DatasetProfile {
    pub fn plottable_columns(&self) -> usize {
        self.schema.iter().filter(|f| f.plottable).count()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileProfile {
    pub path: PathBuf,
    pub row_count: i64,
    pub row_group_count: usize,
    pub file_size: u64,
    pub created_by: Option<String>,
}

/// Read every footer in parallel. Unreadable files are skipped with a
/// warning unless none can be read.
pub fn describe_dataset(paths: &[PathBuf]) -> Result<DatasetProfile> {
    let results: Vec<Result<(FileProfile, Vec<SchemaFieldInfo>)>> = paths
        .par_iter()
        .map(|p| {
            let (info, _meta) = open_parquet_file(p)?;
            let profile = FileProfile {
                path: info.path,
                row_count: info.row_count,
                row_group_count: info.row_group_count,
                file_size: info.file_size,
                created_by: info.created_by,
            };
            Ok((profile, info.schema_fields))
        })
        .collect();

    let mut files = Vec::with_capacity(results.len());
    let mut schema = Vec::new();
    let mut errors = Vec::new();
    for (r, path) in results.into_iter().zip(paths) {
        match r {
            Ok((fp, fields)) => {
                if schema.is_empty() {
                    schema = fields;
                }
                files.push(fp);
            }
            Err(e) => {
                tracing::warn!(file = %path.display(), error = %e, "skipping unreadable file");
                errors.push(e);
            }
        }
    }
    if files.is_empty() && !errors.is_empty() {
        return Err(errors.remove(0));
    }

    let missing_columns: Vec<String> = REQUIRED_COLUMNS
        .iter()
        .filter(|c| !schema.iter().any(|f| f.name == **c))
        .map(|c| c.to_string())
        .collect();
    if !missing_columns.is_empty() && !schema.is_empty() {
        tracing::warn!(missing = ?missing_columns, "dataset lacks standard scan columns");
    }

    Ok(DatasetProfile {
        missing_columns,
        file_count: files.len(),
        total_rows: files.iter().map(|f| f.row_count).sum(),
        total_bytes: files.iter().map(|f| f.file_size).sum(),
        files,
        schema,
    })
}
