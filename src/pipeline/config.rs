use crate::editor::EditorFilter;
use crate::output_format::RecordFormat;
use chrono::{DateTime, Utc};
use std::path::PathBuf;

/// Configuration for the extraction stage
#[derive(Debug, Clone)]
pub struct ExtractConfig {
    pub error_strategy: ErrorStrategy,
    pub editor: EditorFilter,
    pub buffer_size: usize,
    pub progress_interval: usize,
    pub output_format: RecordFormat,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        ExtractConfig {
            error_strategy: ErrorStrategy::Skip,
            editor: EditorFilter::default(),
            buffer_size: 65536,   // 64KB
            progress_interval: 0, // Disabled
            output_format: RecordFormat::default(),
        }
    }
}

/// Configuration for the aggregation stage
#[derive(Debug, Clone)]
pub struct AggregateConfig {
    pub error_strategy: ErrorStrategy,
    pub input_format: RecordFormat,
    pub output_dir: PathBuf,
    pub top_countries: usize,
    /// Execution time; decides which month counts as "current"
    pub run_time: DateTime<Utc>,
}

impl Default for AggregateConfig {
    fn default() -> Self {
        AggregateConfig {
            error_strategy: ErrorStrategy::Skip,
            input_format: RecordFormat::default(),
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            top_countries: 10,
            run_time: Utc::now(),
        }
    }
}

pub const DEFAULT_OUTPUT_DIR: &str = "web/charts";

/// Simple error handling strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorStrategy {
    /// Skip problematic records and continue processing
    Skip,
    /// Stop processing on first error
    FailFast,
}
