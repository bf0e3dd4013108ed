//! Replayable records of successful generation calls.

use async_trait::async_trait;
use socialflow_shared::{GenerationRecord, Result};
use socialflow_storage::Storage;

/// Sink for [`GenerationRecord`]s. Writes are best-effort from the pipeline's
/// point of view.
#[async_trait]
pub trait GenerationJournal: Send + Sync {
    async fn record(&self, record: &GenerationRecord) -> Result<()>;
}

#[async_trait]
impl GenerationJournal for Storage {
    async fn record(&self, record: &GenerationRecord) -> Result<()> {
        self.insert_generation_record(record).await
    }
}
