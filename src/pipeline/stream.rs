// src/pipeline/stream.rs
use std::io::{BufRead, Write};
use std::time::Instant;
use tracing::{debug, warn};

use crate::changeset_reader::ChangesetReader;
use crate::countries::CountryIndex;
use crate::error::ProcessingError;
use crate::output_format::RecordWriter;
use crate::pipeline::config::{ErrorStrategy, ExtractConfig};
use crate::pipeline::context::{ProcessResult, ProcessingStats};
use crate::record::{Changeset, NormalizedRecord};

/// Extraction orchestrator: changeset XML in, normalized records out
pub struct StreamPipeline {
    config: ExtractConfig,
    countries: CountryIndex,
    stats: ProcessingStats,
}

impl StreamPipeline {
    pub fn new(config: ExtractConfig, countries: CountryIndex) -> Self {
        StreamPipeline {
            config,
            countries,
            stats: ProcessingStats::default(),
        }
    }

    /// Turn a matched changeset into its output record
    pub fn process_changeset(&self, changeset: Changeset) -> ProcessResult {
        let country = match &changeset.bbox {
            Some(bbox) => self.countries.resolve(bbox).map(|info| info.code.clone()),
            None => None,
        };
        if country.is_none() {
            debug!(changeset = changeset.id, has_bbox = changeset.bbox.is_some(), "no country resolved");
        }
        ProcessResult::Emit(NormalizedRecord::from_changeset(changeset, country))
    }

    /// Process a whole changeset stream.
    ///
    /// Records are written as soon as they are produced. On a fatal error the
    /// output written so far is flushed before the error is returned.
    pub fn process_stream<R: BufRead, W: Write>(
        &mut self,
        input: R,
        output: &mut W,
    ) -> Result<ProcessingStats, ProcessingError> {
        let start_time = Instant::now();
        let mut file_stats = ProcessingStats::default();

        let mut reader = ChangesetReader::new(input, self.config.editor.clone())
            .with_progress(self.config.progress_interval);
        let mut writer = RecordWriter::new(output, self.config.output_format);

        let outcome = self.drive(&mut reader, &mut writer, &mut file_stats);

        file_stats.records_processed = reader.seen();
        file_stats.records_skipped = reader.rejected();
        file_stats.processing_time = start_time.elapsed();

        // Keep whatever was produced, even when the stream turned out corrupt
        let flushed = writer.flush();
        match (outcome, flushed) {
            (Err(e), flushed) => {
                if let Err(flush_error) = flushed {
                    warn!("could not flush output after failure: {}", flush_error);
                }
                self.accumulate(&file_stats);
                Err(e)
            }
            (Ok(()), Err(e)) if is_broken_pipe(&e) => {
                self.accumulate(&file_stats);
                Ok(file_stats)
            }
            (Ok(()), Err(e)) => Err(e),
            (Ok(()), Ok(())) => {
                self.accumulate(&file_stats);
                Ok(file_stats)
            }
        }
    }

    fn drive<R: BufRead, W: Write>(
        &self,
        reader: &mut ChangesetReader<R>,
        writer: &mut RecordWriter<W>,
        file_stats: &mut ProcessingStats,
    ) -> Result<(), ProcessingError> {
        for result in reader {
            let result = match result {
                Ok(changeset) => self.process_changeset(changeset),
                Err(e) => ProcessResult::Error(e),
            };

            match result {
                ProcessResult::Emit(record) => {
                    if record.country.is_none() {
                        file_stats.without_country += 1;
                    }
                    if let Err(e) = writer.write_record(&record) {
                        // Downstream closed the pipe: nothing left to do
                        if is_broken_pipe(&e) {
                            debug!("output closed, stopping");
                            return Ok(());
                        }
                        return Err(e);
                    }
                    file_stats.records_output += 1;
                }
                ProcessResult::Error(err) if err.is_record_level() => {
                    match self.config.error_strategy {
                        ErrorStrategy::FailFast => return Err(err),
                        ErrorStrategy::Skip => {
                            file_stats.errors += 1;
                            warn!("skipping changeset: {}", err);
                        }
                    }
                }
                ProcessResult::Error(err) => return Err(err),
            }
        }
        Ok(())
    }

    fn accumulate(&mut self, file_stats: &ProcessingStats) {
        self.stats.records_processed += file_stats.records_processed;
        self.stats.records_output += file_stats.records_output;
        self.stats.records_skipped += file_stats.records_skipped;
        self.stats.errors += file_stats.errors;
        self.stats.without_country += file_stats.without_country;
        self.stats.processing_time += file_stats.processing_time;
    }

    /// Get current accumulated stats
    pub fn get_stats(&self) -> &ProcessingStats {
        &self.stats
    }
}

fn is_broken_pipe(err: &ProcessingError) -> bool {
    matches!(err, ProcessingError::IoError(e) if e.kind() == std::io::ErrorKind::BrokenPipe)
}
