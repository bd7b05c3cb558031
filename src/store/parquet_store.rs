use super::{StorageError, StorageResult, Table, TabularStore};
use crate::error::{PipelineError, Result};
use crate::utils::constants::{DATASET_EXTENSION, DEFAULT_ROW_GROUP_SIZE};
use arrow::compute::concat_batches;
use arrow::record_batch::RecordBatch;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use parquet::basic::{Compression, GzipLevel, ZstdLevel};
use parquet::file::properties::WriterProperties;
use parquet::file::reader::{FileReader, SerializedFileReader};
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::debug;

/// Parquet files under a base directory, one file per dataset:
/// `raw/historical` lives at `{base}/raw/historical.parquet`.
pub struct ParquetStore {
    base_path: PathBuf,
    compression: Compression,
    row_group_size: usize,
}

impl ParquetStore {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
            compression: Compression::SNAPPY,
            row_group_size: DEFAULT_ROW_GROUP_SIZE,
        }
    }

    pub fn with_compression(mut self, compression: &str) -> Result<Self> {
        self.compression = match compression.to_lowercase().as_str() {
            "snappy" => Compression::SNAPPY,
            "gzip" => Compression::GZIP(GzipLevel::default()),
            "lz4" => Compression::LZ4,
            "zstd" => Compression::ZSTD(ZstdLevel::default()),
            "none" => Compression::UNCOMPRESSED,
            _ => {
                return Err(PipelineError::Config(format!(
                    "Unsupported compression: {}",
                    compression
                )))
            }
        };
        Ok(self)
    }

    pub fn with_row_group_size(mut self, size: usize) -> Self {
        self.row_group_size = size;
        self
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    pub fn dataset_path(&self, name: &str) -> PathBuf {
        self.base_path
            .join(format!("{}.{}", name, DATASET_EXTENSION))
    }

    /// File statistics for an existing dataset
    pub fn describe(&self, name: &str) -> StorageResult<DatasetInfo> {
        let path = self.dataset_path(name);
        if !path.is_file() {
            return Err(StorageError::NotFound {
                name: name.to_string(),
            });
        }

        let reader = SerializedFileReader::new(File::open(&path)?)?;
        let metadata = reader.metadata();
        let file_metadata = metadata.file_metadata();

        let row_group_sizes: Vec<i64> = metadata
            .row_groups()
            .iter()
            .map(|rg| rg.num_rows())
            .collect();
        let compression = metadata
            .row_groups()
            .first()
            .filter(|rg| rg.num_columns() > 0)
            .map(|rg| rg.column(0).compression());

        Ok(DatasetInfo {
            name: name.to_string(),
            path: path.clone(),
            total_rows: file_metadata.num_rows(),
            columns: file_metadata.schema_descr().num_columns(),
            row_groups: row_group_sizes.len(),
            row_group_sizes,
            file_size: fs::metadata(&path)?.len(),
            compression,
        })
    }

    fn writer_properties(&self) -> WriterProperties {
        WriterProperties::builder()
            .set_compression(self.compression)
            .set_max_row_group_size(self.row_group_size)
            .build()
    }
}

impl TabularStore for ParquetStore {
    fn exists(&self, name: &str) -> bool {
        self.dataset_path(name).is_file()
    }

    fn read(&self, name: &str) -> StorageResult<Table> {
        let path = self.dataset_path(name);
        if !path.is_file() {
            return Err(StorageError::NotFound {
                name: name.to_string(),
            });
        }

        let builder = ParquetRecordBatchReaderBuilder::try_new(File::open(&path)?)?;
        let schema = builder.schema().clone();
        let batches = builder
            .build()?
            .collect::<std::result::Result<Vec<RecordBatch>, _>>()?;

        let table = concat_batches(&schema, &batches)?;
        debug!(dataset = name, rows = table.num_rows(), "Read dataset");
        Ok(table)
    }

    fn write(&self, name: &str, table: &Table) -> StorageResult<()> {
        let path = self.dataset_path(name);
        let parent = path.parent().unwrap_or(self.base_path.as_path());
        fs::create_dir_all(parent)?;

        // Write next to the target and rename so readers never see a partial file
        let mut staging = NamedTempFile::new_in(parent)?;
        {
            let mut writer = ArrowWriter::try_new(
                staging.as_file_mut(),
                table.schema(),
                Some(self.writer_properties()),
            )?;
            writer.write(table)?;
            writer.close()?;
        }
        staging.persist(&path).map_err(|e| e.error)?;

        debug!(
            dataset = name,
            rows = table.num_rows(),
            path = %path.display(),
            "Wrote dataset"
        );
        Ok(())
    }
}

#[derive(Debug)]
pub struct DatasetInfo {
    pub name: String,
    pub path: PathBuf,
    pub total_rows: i64,
    pub columns: usize,
    pub row_groups: usize,
    pub row_group_sizes: Vec<i64>,
    pub file_size: u64,
    pub compression: Option<Compression>,
}

impl DatasetInfo {
    pub fn summary(&self) -> String {
        let avg_rows = if self.row_groups == 0 {
            0.0
        } else {
            self.total_rows as f64 / self.row_groups as f64
        };

        format!(
            "Dataset '{}' ({}):\n\
            - Total rows: {}\n\
            - Columns: {}\n\
            - Row groups: {}\n\
            - File size: {:.2} KB\n\
            - Compression: {}\n\
            - Avg rows per group: {:.0}",
            self.name,
            self.path.display(),
            self.total_rows,
            self.columns,
            self.row_groups,
            self.file_size as f64 / 1024.0,
            self.compression
                .map(|c| format!("{:?}", c))
                .unwrap_or_else(|| "n/a".to_string()),
            avg_rows
        )
    }
}
