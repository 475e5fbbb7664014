//! Application services shared by the gateway and the cleanup batch

pub mod cleanup;
pub mod ingest;
pub mod insights;

pub use cleanup::{CleanupJob, CleanupReport, RetentionPolicy, TierCleanup};
pub use ingest::{IngestReceipt, IngestService};
pub use insights::{InsightsService, RangeQuery, ReportWindow, WindowedReport};
