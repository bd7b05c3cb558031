/// Logical dataset names
pub const CURRENT_DATASET: &str = "raw/current";
pub const HISTORICAL_DATASET: &str = "raw/historical";
pub const MERGED_DATASET: &str = "current/current_weather_data_merged";
pub const PROCESSED_PREFIX: &str = "processed";
pub const AGGREGATE_SUFFIX: &str = "_avg_t";
pub const DATASET_EXTENSION: &str = "parquet";

/// Observation columns
pub const COL_STATE_CODE: &str = "ides";
pub const COL_MUNICIPALITY_CODE: &str = "idmun";
pub const COL_DAY: &str = "ndia";
pub const COL_STATE_NAME: &str = "nes";
pub const COL_MUNICIPALITY_NAME: &str = "nmun";
pub const COL_LOCATION: &str = "dloc";
pub const COL_TMIN: &str = "tmin";
pub const COL_TMAX: &str = "tmax";
pub const COL_DATE_PROCESS: &str = "date_process";

/// Aggregation grouping columns, in output order
pub const GROUP_COLUMNS: [&str; 6] = [
    COL_LOCATION,
    COL_STATE_CODE,
    COL_MUNICIPALITY_CODE,
    COL_DAY,
    COL_STATE_NAME,
    COL_MUNICIPALITY_NAME,
];

/// Auxiliary reference defaults
pub const DEFAULT_AUX_FILE: &str = "current/raw_data_merge.csv";
pub const DEFAULT_AUX_STATE_COLUMN: &str = "Cve_Ent";
pub const DEFAULT_AUX_MUNICIPALITY_COLUMN: &str = "Cve_Mun";
pub const DEFAULT_AUX_ENCODING: &str = "utf-8";

/// Remote source defaults
pub const DEFAULT_SOURCE_URL: &str = "https://smn.conagua.gob.mx/webservices/?method=1";
pub const DEFAULT_USER_AGENT: &str = "Custom";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;

/// Processing defaults
pub const DEFAULT_BASE_PATH: &str = "data";
pub const DEFAULT_WINDOW_MINUTES: u64 = 120;
/// Ten years
pub const MAX_WINDOW_MINUTES: u64 = 5_256_000;
pub const DEFAULT_MAX_RETRIES: u32 = 5;
pub const DEFAULT_RETRY_DELAY_SECS: u64 = 120;
pub const DEFAULT_ROW_GROUP_SIZE: usize = 10000;

/// Configuration sources
pub const DEFAULT_CONFIG_FILE: &str = "wx-pipeline.toml";
pub const ENV_PREFIX: &str = "WX_PIPELINE";

/// Parquet compression options
pub const COMPRESSION_SNAPPY: &str = "snappy";
pub const COMPRESSION_GZIP: &str = "gzip";
pub const COMPRESSION_LZ4: &str = "lz4";
pub const COMPRESSION_ZSTD: &str = "zstd";
pub const COMPRESSION_NONE: &str = "none";
