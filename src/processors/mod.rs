pub mod aggregator;
pub mod group_key;
pub mod ingestor;
pub mod merger;

pub use aggregator::{AggregateReport, Aggregator, GroupSummary};
pub use group_key::{group_key, normalize};
pub use ingestor::{IngestReport, Ingestor};
pub use merger::{JoinOutput, LeftJoin, MergeReport, Merger};
