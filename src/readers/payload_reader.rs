use crate::error::{PipelineError, Result};
use crate::store::Table;
use arrow::error::ArrowError;
use arrow::json::reader::{infer_json_schema_from_iterator, ReaderBuilder};
use flate2::read::GzDecoder;
use serde_json::Value;
use std::io::Read;
use std::sync::Arc;
use tracing::{debug, info};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Decode an SMN payload: a JSON array of flat objects, optionally gzipped.
pub fn decode_payload(bytes: &[u8]) -> Result<Table> {
    let json = if bytes.starts_with(&GZIP_MAGIC) {
        gunzip(bytes)?
    } else {
        debug!("Payload is not gzip-compressed, parsing as plain JSON");
        bytes.to_vec()
    };

    parse_observations(&json)
}

fn gunzip(bytes: &[u8]) -> Result<Vec<u8>> {
    info!(compressed_bytes = bytes.len(), "Decompressing weather data");
    let mut decompressed = Vec::new();
    GzDecoder::new(bytes)
        .read_to_end(&mut decompressed)
        .map_err(|e| PipelineError::Decode(format!("could not decompress payload: {}", e)))?;
    info!(bytes = decompressed.len(), "Decompression successful");
    Ok(decompressed)
}

fn parse_observations(json: &[u8]) -> Result<Table> {
    let rows: Vec<Value> = serde_json::from_slice(json)
        .map_err(|e| PipelineError::Decode(format!("could not parse JSON: {}", e)))?;

    if rows.is_empty() {
        return Err(PipelineError::Decode(
            "payload contains no observations".to_string(),
        ));
    }
    if let Some(position) = rows.iter().position(|row| !row.is_object()) {
        return Err(PipelineError::Decode(format!(
            "entry {} is not a JSON object",
            position
        )));
    }

    let schema = infer_json_schema_from_iterator(rows.iter().map(|row| Ok::<_, ArrowError>(row.clone())))
        .map_err(|e| PipelineError::Decode(format!("could not infer schema: {}", e)))?;

    let mut decoder = ReaderBuilder::new(Arc::new(schema))
        .with_batch_size(rows.len())
        .with_coerce_primitive(true)
        .build_decoder()
        .map_err(decode_error)?;
    decoder.serialize(&rows).map_err(decode_error)?;
    let table = decoder
        .flush()
        .map_err(decode_error)?
        .ok_or_else(|| PipelineError::Decode("decoder produced no rows".to_string()))?;

    info!(
        rows = table.num_rows(),
        columns = table.num_columns(),
        "Parsed weather data"
    );
    Ok(table)
}

fn decode_error(e: ArrowError) -> PipelineError {
    PipelineError::Decode(e.to_string())
}
