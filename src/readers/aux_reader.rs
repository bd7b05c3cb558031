use crate::error::{PipelineError, Result};
use crate::store::Table;
use arrow::compute::concat_batches;
use arrow::csv::reader::{Format, ReaderBuilder};
use arrow::record_batch::RecordBatch;
use encoding_rs::{Encoding, UTF_8};
use std::fs;
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

/// Reads the municipality reference CSV used to enrich the current snapshot.
pub struct AuxiliaryReader {
    encoding: &'static Encoding,
}

impl AuxiliaryReader {
    pub fn new() -> Self {
        Self { encoding: UTF_8 }
    }

    /// `label` is any WHATWG encoding label, e.g. `latin1` or `windows-1252`
    pub fn with_encoding(label: &str) -> Result<Self> {
        let encoding = Encoding::for_label(label.as_bytes())
            .ok_or_else(|| PipelineError::Config(format!("Unknown text encoding: {}", label)))?;
        Ok(Self { encoding })
    }

    /// Read the whole file. Any failure is a `JoinInput` error.
    pub fn read(&self, path: &Path) -> Result<Table> {
        let bytes = fs::read(path).map_err(|e| {
            PipelineError::JoinInput(format!("cannot read {}: {}", path.display(), e))
        })?;

        let (text, used, had_errors) = self.encoding.decode(&bytes);
        if had_errors {
            warn!(
                path = %path.display(),
                encoding = used.name(),
                "Auxiliary file contains invalid byte sequences, replaced"
            );
        }

        let format = Format::default().with_header(true);
        let (schema, _) = format
            .infer_schema(Cursor::new(text.as_bytes()), None)
            .map_err(|e| malformed(path, e))?;
        let schema = Arc::new(schema);

        let reader = ReaderBuilder::new(schema.clone())
            .with_format(format)
            .build(Cursor::new(text.as_bytes()))
            .map_err(|e| malformed(path, e))?;
        let batches = reader
            .collect::<std::result::Result<Vec<RecordBatch>, _>>()
            .map_err(|e| malformed(path, e))?;

        let table = concat_batches(&schema, &batches).map_err(|e| malformed(path, e))?;
        info!(
            path = %path.display(),
            rows = table.num_rows(),
            columns = table.num_columns(),
            "Read auxiliary reference data"
        );
        Ok(table)
    }
}

impl Default for AuxiliaryReader {
    fn default() -> Self {
        Self::new()
    }
}

fn malformed(path: &Path, e: arrow::error::ArrowError) -> PipelineError {
    PipelineError::JoinInput(format!("malformed CSV {}: {}", path.display(), e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::observation::string_column;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_read_utf8_csv() -> Result<()> {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "Cve_Ent,Cve_Mun,Nom_Mun,Pob").unwrap();
        writeln!(file, "31,50,Mérida,995129").unwrap();
        writeln!(file, "1,1,Aguascalientes,948990").unwrap();

        let table = AuxiliaryReader::new().read(file.path())?;

        assert_eq!(table.num_rows(), 2);
        assert_eq!(table.num_columns(), 4);
        assert_eq!(string_column(&table, "Nom_Mun")?.value(0), "Mérida");
        Ok(())
    }

    #[test]
    fn test_read_latin1_csv() -> Result<()> {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"Cve_Ent,Cve_Mun,Nom_Mun\n31,50,M\xe9rida\n").unwrap();

        let table = AuxiliaryReader::with_encoding("latin1")?.read(file.path())?;

        assert_eq!(string_column(&table, "Nom_Mun")?.value(0), "Mérida");
        Ok(())
    }

    #[test]
    fn test_missing_file_is_join_input_error() {
        let result = AuxiliaryReader::new().read(Path::new("/nonexistent/raw_data_merge.csv"));
        assert!(matches!(result, Err(PipelineError::JoinInput(_))));
    }

    #[test]
    fn test_ragged_rows_are_join_input_error() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "Cve_Ent,Cve_Mun").unwrap();
        writeln!(file, "31,50,extra,fields").unwrap();

        let result = AuxiliaryReader::new().read(file.path());
        assert!(matches!(result, Err(PipelineError::JoinInput(_))));
    }

    #[test]
    fn test_unknown_encoding() {
        assert!(AuxiliaryReader::with_encoding("klingon").is_err());
    }
}
