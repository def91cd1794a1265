//! Status reporter that writes through `tracing`.

use async_trait::async_trait;
use mediaci_core::Result;
use mediaci_core::ports::{ReportState, StatusReporter, StatusUpdate};
use tracing::{info, warn};

/// Reports build status to the log only.
#[derive(Debug, Clone, Default)]
pub struct LogReporter;

#[async_trait]
impl StatusReporter for LogReporter {
    async fn report(&self, update: &StatusUpdate) -> Result<()> {
        match update.state {
            ReportState::Started => info!(
                context = %update.context,
                revision = %update.revision,
                "{}", update.description()
            ),
            ReportState::Finished(result) if result.is_success() => info!(
                context = %update.context,
                revision = %update.revision,
                result = %result,
                "{}", update.description()
            ),
            ReportState::Finished(result) => warn!(
                context = %update.context,
                revision = %update.revision,
                result = %result,
                "{}", update.description()
            ),
        }
        Ok(())
    }
}
