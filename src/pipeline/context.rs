use crate::error::ProcessingError;
use crate::record::NormalizedRecord;
use std::time::Duration;

/// Result of processing a single changeset
#[derive(Debug)]
pub enum ProcessResult {
    /// Write this record to the output stream
    Emit(NormalizedRecord),
    /// Processing error for this changeset only
    Error(ProcessingError),
}

/// Runtime statistics
#[derive(Debug, Default, Clone)]
pub struct ProcessingStats {
    /// Changesets seen in the input, whatever their editor
    pub records_processed: usize,
    pub records_output: usize,
    /// Changesets dropped by the editor filter
    pub records_skipped: usize,
    pub errors: usize,
    pub without_country: usize,
    pub processing_time: Duration,
}

impl ProcessingStats {
    /// Elapsed time rounded to milliseconds, for humans
    pub fn elapsed(&self) -> humantime::FormattedDuration {
        humantime::format_duration(Duration::from_millis(self.processing_time.as_millis() as u64))
    }

    pub fn log_summary(&self) {
        tracing::info!(
            changesets = self.records_processed,
            emitted = self.records_output,
            other_editors = self.records_skipped,
            malformed = self.errors,
            without_country = self.without_country,
            elapsed = %self.elapsed(),
            "extraction finished"
        );

        if self.records_processed > 0 && !self.processing_time.is_zero() {
            let rate = self.records_processed as f64 / self.processing_time.as_secs_f64();
            tracing::debug!("processing rate: {:.0} changesets/second", rate);
        }
    }
}
