use crate::clock::Clock;
use crate::error::Result;
use crate::models::with_date_process;
use crate::store::{Table, TabularStore};
use crate::utils::constants::{CURRENT_DATASET, HISTORICAL_DATASET};
use crate::utils::CancelFlag;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone, PartialEq)]
pub struct IngestReport {
    pub rows: usize,
    pub date_process: DateTime<Utc>,
}

/// Replaces the current snapshot with a fetched batch and appends the batch
/// to the historical dataset.
pub struct Ingestor {
    store: Arc<dyn TabularStore>,
    clock: Arc<dyn Clock>,
    cancel: CancelFlag,
}

impl Ingestor {
    pub fn new(store: Arc<dyn TabularStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            cancel: CancelFlag::new(),
        }
    }

    pub fn with_cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    /// Every row gets the same `date_process`. There is no deduplication:
    /// a retried ingest appends its rows again.
    ///
    /// If the historical append fails after the current snapshot was written,
    /// the two datasets disagree until the next successful ingest.
    pub fn ingest(&self, table: &Table) -> Result<IngestReport> {
        let date_process = self.clock.now();
        let stamped = with_date_process(table, date_process)?;
        self.cancel.check()?;

        info!(rows = stamped.num_rows(), "Writing current data");
        self.store.write(CURRENT_DATASET, &stamped)?;

        info!("Appending to historical data");
        self.store.append(HISTORICAL_DATASET, &stamped)?;
        info!(
            rows = stamped.num_rows(),
            date_process = %date_process,
            "Ingestion complete"
        );

        Ok(IngestReport {
            rows: stamped.num_rows(),
            date_process,
        })
    }
}
