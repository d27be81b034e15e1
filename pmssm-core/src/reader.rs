use bytes::Bytes;
use memmap2::Mmap;
use parquet::basic::Type as PhysicalType;
use parquet::file::metadata::ParquetMetaData;
use parquet::file::reader::{FileReader, SerializedFileReader};
use parquet::schema::types::ColumnDescriptor;
use pmssm_common::{PmssmError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParquetFileInfo {
    pub path: PathBuf,
    pub file_size: u64,
    pub row_count: i64,
    pub row_group_count: usize,
    pub created_by: Option<String>,
    pub schema_fields: Vec<SchemaFieldInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaFieldInfo {
    pub name: String,
    pub physical_type: String,
    pub logical_type: Option<String>,
    /// flat numeric or boolean column, usable in expressions
    pub plottable: bool,
}

fn is_plottable(col: &ColumnDescriptor) -> bool {
    col.max_rep_level() == 0
        && matches!(
            col.physical_type(),
            PhysicalType::BOOLEAN | PhysicalType::INT32 | PhysicalType::INT64 | PhysicalType::FLOAT | PhysicalType::DOUBLE
        )
}

/// Footer summary of one scan file.
pub fn open_parquet_file(path: &Path) -> Result<(ParquetFileInfo, ParquetMetaData)> {
    let file = std::fs::File::open(path)?;
    let file_size = file.metadata()?.len();
    // only the footer is decoded; row data is read through ParquetSource
    let mmap: Mmap = unsafe { Mmap::map(&file)? };
    let bytes = Bytes::copy_from_slice(&mmap);
    let reader = SerializedFileReader::new(bytes).map_err(PmssmError::Parquet)?;
    let meta = reader.metadata().clone();
    let file_meta = meta.file_metadata();
    let schema = file_meta.schema_descr();
    let schema_fields = (0..schema.num_columns())
        .map(|i| {
            let col = schema.column(i);
            SchemaFieldInfo {
                name: col.name().to_owned(),
                physical_type: format!("{:?}", col.physical_type()),
                logical_type: col.logical_type().map(|lt| format!("{lt:?}")),
                plottable: is_plottable(&col),
            }
        })
        .collect();
    let row_count: i64 = (0..meta.num_row_groups()).map(|i| meta.row_group(i).num_rows()).sum();
    let info = ParquetFileInfo {
        path: path.to_path_buf(),
        file_size,
        row_count,
        row_group_count: meta.num_row_groups(),
        created_by: file_meta.created_by().map(|s| s.to_owned()),
        schema_fields,
    };
    Ok((info, meta))
}
