// src/lib.rs
pub mod aggregate;
pub mod changeset_reader;
pub mod countries;
pub mod editor;
pub mod error;
pub mod input_format;
pub mod logging;
pub mod output_format;
pub mod pipeline;
pub mod record;

pub use error::*;

pub use aggregate::releases::{load_releases, Release};
pub use aggregate::{read_records, AggregateReport, Aggregator};
pub use changeset_reader::ChangesetReader;
pub use countries::{CountryIndex, CountryInfo};
pub use editor::{EditorFilter, MatchMode};
pub use input_format::RecordReader;
pub use output_format::{RecordFormat, RecordWriter};
pub use pipeline::config::{AggregateConfig, ErrorStrategy, ExtractConfig};
pub use pipeline::context::{ProcessResult, ProcessingStats};
pub use pipeline::stream::StreamPipeline;
pub use record::{BoundingBox, Changeset, NormalizedRecord};
