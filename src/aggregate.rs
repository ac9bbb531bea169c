// src/aggregate.rs - Chart and table artifacts from the normalized records
pub mod charts;
pub mod releases;
pub mod views;

use crate::countries::CountryIndex;
use crate::error::{ChartError, ProcessingError};
use crate::input_format::RecordReader;
use crate::pipeline::config::{AggregateConfig, ErrorStrategy};
use crate::record::NormalizedRecord;
use indexmap::IndexMap;
use releases::Release;
use serde_json::Value;
use std::fs;
use std::io::BufRead;
use std::path::PathBuf;
use tracing::{debug, error, info, warn};

/// Outcome of one aggregation run
#[derive(Debug, Default)]
pub struct AggregateReport {
    pub written: Vec<PathBuf>,
    pub failed: Vec<String>,
}

impl AggregateReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Read every record of the stream, applying the error strategy to
/// undecodable lines. I/O failures always abort.
pub fn read_records<R: BufRead>(
    input: R,
    config: &AggregateConfig,
) -> Result<(Vec<NormalizedRecord>, usize), ProcessingError> {
    let mut records = Vec::new();
    let mut skipped = 0;

    for result in RecordReader::new(input, config.input_format) {
        match result {
            Ok(record) => records.push(record),
            Err(err) if err.is_record_level() => match config.error_strategy {
                ErrorStrategy::FailFast => return Err(err),
                ErrorStrategy::Skip => {
                    skipped += 1;
                    warn!("skipping record: {}", err);
                }
            },
            Err(err) => return Err(err),
        }
    }

    debug!(records = records.len(), skipped, "records loaded");
    Ok((records, skipped))
}

/// Builds every artifact from a materialized record set
pub struct Aggregator {
    config: AggregateConfig,
    countries: CountryIndex,
    releases: Vec<Release>,
}

impl Aggregator {
    pub fn new(config: AggregateConfig, countries: CountryIndex, releases: Vec<Release>) -> Self {
        Aggregator {
            config,
            countries,
            releases,
        }
    }

    /// Compute all artifacts, keyed by file name in output order
    pub fn build(&self, records: &[NormalizedRecord]) -> IndexMap<&'static str, Result<Value, ChartError>> {
        let releases = &self.releases;
        let mut artifacts = IndexMap::new();

        let daily = views::daily_activity(records);
        artifacts.insert("changes_activity.json", charts::changes_activity(&daily, releases));

        let cumulative = views::cumulative_series(records);
        artifacts.insert("total_changes.json", charts::total_changes(&cumulative, releases));
        artifacts.insert("total_contributors.json", charts::total_contributors(&cumulative, releases));

        let seasonal = views::seasonal_participation(records, self.config.run_time);
        artifacts.insert("seasonal_participation.json", charts::seasonal_participation(&seasonal));

        let annual = views::annual_participation(records);
        artifacts.insert("annual_participation.json", charts::annual_participation(&annual));

        let engagement = views::user_engagement(records);
        artifacts.insert("user_engagement.json", charts::user_engagement(&engagement));

        // Second pass: everything country related builds on the totals
        let totals = views::country_totals(records);
        artifacts.insert("country_changes.json", charts::country_changes(&totals, &self.countries));
        artifacts.insert("country_contributors.json", charts::country_contributors(&totals, &self.countries));

        let ranking = views::country_ranking(&totals, &self.countries);
        artifacts.insert("country_ranking.json", charts::country_ranking(&ranking));

        let timeline = views::country_timeline(records, &totals, self.config.top_countries, &self.countries);
        artifacts.insert("countries_timeline.json", charts::countries_timeline(&timeline));

        let spans = views::user_contributions(records);
        artifacts.insert("user_contributions.json", charts::user_contributions(&spans));

        artifacts
    }

    /// Build and write every artifact. A failing artifact is logged and
    /// reported; the others are still written.
    pub fn run(&self, records: &[NormalizedRecord]) -> AggregateReport {
        let mut report = AggregateReport::default();

        if let Err(e) = fs::create_dir_all(&self.config.output_dir) {
            error!(dir = %self.config.output_dir.display(), "cannot create output directory: {}", e);
        }

        for (name, artifact) in self.build(records) {
            match artifact.and_then(|value| self.write(name, &value)) {
                Ok(path) => {
                    debug!(path = %path.display(), "artifact written");
                    report.written.push(path);
                }
                Err(e) => {
                    error!("{}", e);
                    report.failed.push(name.to_string());
                }
            }
        }

        info!(
            written = report.written.len(),
            failed = report.failed.len(),
            dir = %self.config.output_dir.display(),
            "aggregation finished"
        );
        report
    }

    fn write(&self, name: &str, value: &Value) -> Result<PathBuf, ChartError> {
        let path = self.config.output_dir.join(name);
        let content = serde_json::to_string(value).map_err(|source| ChartError::Serialize {
            chart: name.to_string(),
            source,
        })?;
        fs::write(&path, content).map_err(|source| ChartError::Write {
            path: path.display().to_string(),
            source,
        })?;
        Ok(path)
    }
}
