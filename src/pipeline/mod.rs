//! Stage orchestration: fetch+ingest, aggregate and merge, in that order,
//! each retried on its own.

pub mod retry;

pub use retry::RetryPolicy;

use crate::clock::{Clock, SystemClock};
use crate::config::Settings;
use crate::error::Result;
use crate::processors::{
    AggregateReport, Aggregator, IngestReport, Ingestor, MergeReport, Merger,
};
use crate::readers::{decode_payload, AuxiliaryReader};
use crate::store::{ParquetStore, TabularStore};
use crate::utils::CancelFlag;
use std::future::Future;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone)]
pub struct RunReport {
    pub ingest: IngestReport,
    pub aggregate: AggregateReport,
    pub merge: MergeReport,
}

pub struct Pipeline {
    settings: Settings,
    store: Arc<dyn TabularStore>,
    clock: Arc<dyn Clock>,
    retry: RetryPolicy,
    cancel: CancelFlag,
}

impl Pipeline {
    pub fn new(settings: Settings, store: Arc<dyn TabularStore>, clock: Arc<dyn Clock>) -> Self {
        let retry = RetryPolicy::new(settings.max_retries, settings.retry_delay());
        Self {
            settings,
            store,
            clock,
            retry,
            cancel: CancelFlag::new(),
        }
    }

    /// Parquet storage under `settings.base_path`, wall-clock time
    pub fn from_settings(settings: Settings) -> Result<Self> {
        let store = ParquetStore::new(settings.base_path()).with_compression(&settings.compression)?;
        Ok(Self::new(settings, Arc::new(store), Arc::new(SystemClock)))
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn ingestor(&self) -> Ingestor {
        Ingestor::new(self.store.clone(), self.clock.clone()).with_cancel_flag(self.cancel.clone())
    }

    pub fn aggregator(&self) -> Result<Aggregator> {
        Ok(Aggregator::new(self.store.clone(), self.clock.clone())
            .with_window(self.settings.window()?)
            .with_cancel_flag(self.cancel.clone()))
    }

    pub fn merger(&self) -> Result<Merger> {
        let reader = AuxiliaryReader::with_encoding(&self.settings.aux_encoding)?;
        Ok(Merger::new(self.store.clone(), self.settings.aux_path())
            .with_reader(reader)
            .with_key_columns(
                &self.settings.aux_state_column,
                &self.settings.aux_municipality_column,
            )
            .with_cancel_flag(self.cancel.clone()))
    }

    /// Decode a raw payload and ingest it
    pub async fn ingest_payload(&self, payload: Vec<u8>) -> Result<IngestReport> {
        self.cancel.check()?;
        let ingestor = self.ingestor();
        tokio::task::spawn_blocking(move || {
            let table = decode_payload(&payload)?;
            ingestor.ingest(&table)
        })
        .await?
    }

    pub async fn fetch_and_ingest<F, Fut>(&self, fetch: F) -> Result<IngestReport>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<u8>>>,
    {
        info!("Stage: download weather data");
        let payload = fetch().await?;
        self.ingest_payload(payload).await
    }

    pub async fn aggregate(&self) -> Result<AggregateReport> {
        info!("Stage: aggregate weather data");
        let aggregator = self.aggregator()?;
        tokio::task::spawn_blocking(move || aggregator.aggregate()).await?
    }

    pub async fn merge(&self) -> Result<MergeReport> {
        info!("Stage: merge weather data");
        let merger = self.merger()?;
        tokio::task::spawn_blocking(move || merger.merge()).await?
    }

    /// One full cycle. A stage that exhausts its retries stops the cycle;
    /// later stages do not run and earlier ones are not repeated.
    pub async fn run<F, Fut>(&self, fetch: F) -> Result<RunReport>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<Vec<u8>>>,
    {
        let fetch = &fetch;
        let ingest = self
            .retry
            .run("download_weather_data", move || self.fetch_and_ingest(fetch))
            .await?;
        let aggregate = self
            .retry
            .run("agg_weather_data", move || self.aggregate())
            .await?;
        let merge = self
            .retry
            .run("merge_weather_data", move || self.merge())
            .await?;

        info!(
            ingested = ingest.rows,
            groups = aggregate.groups.len(),
            merged = merge.merged_rows,
            "Pipeline run complete"
        );
        Ok(RunReport {
            ingest,
            aggregate,
            merge,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::error::PipelineError;
    use crate::store::MemoryStore;
    use crate::utils::constants::*;
    use chrono::{TimeZone, Utc};
    use std::io::Write;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;
    use tempfile::NamedTempFile;

    const PAYLOAD: &str = r#"[
        {"ides": 31, "idmun": 50, "nes": "Yucatán", "nmun": "Mérida", "dloc": "20230325", "ndia": 0, "tmin": 22, "tmax": 35},
        {"ides": 1, "idmun": 1, "nes": "Aguascalientes", "nmun": "Aguascalientes", "dloc": "20230325", "ndia": 0, "tmin": 9, "tmax": 27}
    ]"#;

    fn pipeline(store: Arc<MemoryStore>, aux: &NamedTempFile) -> Pipeline {
        let settings = Settings {
            aux_path: Some(aux.path().display().to_string()),
            ..Settings::default()
        };
        let clock = FixedClock(Utc.with_ymd_and_hms(2023, 3, 25, 14, 0, 0).unwrap());

        Pipeline::new(settings, store, Arc::new(clock))
            .with_retry_policy(RetryPolicy::new(2, Duration::from_millis(1)))
    }

    fn aux_file() -> NamedTempFile {
        let mut aux = NamedTempFile::new().unwrap();
        writeln!(aux, "Cve_Ent,Cve_Mun,Nom_Mun").unwrap();
        writeln!(aux, "31,50,Mérida").unwrap();
        writeln!(aux, "1,1,Aguascalientes").unwrap();
        aux
    }

    #[tokio::test]
    async fn test_full_run() {
        let store = Arc::new(MemoryStore::new());
        let aux = aux_file();

        let report = pipeline(store.clone(), &aux)
            .run(|| async { Ok(PAYLOAD.as_bytes().to_vec()) })
            .await
            .unwrap();

        assert_eq!(report.ingest.rows, 2);
        assert_eq!(report.aggregate.groups.len(), 2);
        assert_eq!(report.merge.unmatched_rows, 0);
        assert_eq!(
            store.names(),
            vec![
                MERGED_DATASET.to_string(),
                "processed/aguascalientes_aguascalientes_avg_t".to_string(),
                "processed/yucatan_merida_avg_t".to_string(),
                CURRENT_DATASET.to_string(),
                HISTORICAL_DATASET.to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_failed_fetch_stops_the_cycle() {
        let store = Arc::new(MemoryStore::new());
        let aux = aux_file();
        let counter = AtomicU32::new(0);
        let attempts = &counter;

        let result = pipeline(store.clone(), &aux)
            .run(move || async move {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err(PipelineError::Fetch("Response code: 503".to_string()))
            })
            .await;

        assert!(matches!(result, Err(PipelineError::Fetch(_))));
        assert_eq!(counter.load(Ordering::SeqCst), 3);
        assert!(store.names().is_empty());
    }

    #[tokio::test]
    async fn test_failed_merge_keeps_earlier_stage_output() {
        let store = Arc::new(MemoryStore::new());
        let aux = NamedTempFile::new().unwrap();

        let result = pipeline(store.clone(), &aux)
            .run(|| async { Ok(PAYLOAD.as_bytes().to_vec()) })
            .await;

        assert!(matches!(result, Err(PipelineError::JoinInput(_))));
        assert_eq!(store.read(HISTORICAL_DATASET).unwrap().num_rows(), 2);
        assert!(!store.exists(MERGED_DATASET));
    }

    #[tokio::test]
    async fn test_cancelled_pipeline_does_not_ingest() {
        let store = Arc::new(MemoryStore::new());
        let aux = aux_file();
        let cancel = CancelFlag::new();
        cancel.cancel();

        let result = pipeline(store.clone(), &aux)
            .with_cancel_flag(cancel)
            .run(|| async { Ok(PAYLOAD.as_bytes().to_vec()) })
            .await;

        assert!(matches!(result, Err(PipelineError::Cancelled)));
        assert!(store.names().is_empty());
    }
}
