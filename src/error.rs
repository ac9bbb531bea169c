#[derive(Debug, thiserror::Error)]
pub enum ProcessingError {
    /// The byte stream itself is unusable; aborts the run
    #[error("Corrupt changeset stream at byte {position}: {message}")]
    StreamCorruption { position: u64, message: String },

    #[error("Malformed changeset {id}: {message}")]
    MalformedChangeset { id: String, message: String },

    #[error("Malformed record on line {line}: {message}")]
    MalformedRecord { line: usize, message: String },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Output error: {0}")]
    OutputError(String),
}

impl ProcessingError {
    /// Per-record errors that the skip strategy may step over
    pub fn is_record_level(&self) -> bool {
        matches!(
            self,
            ProcessingError::MalformedChangeset { .. } | ProcessingError::MalformedRecord { .. }
        )
    }
}

impl From<csv::Error> for ProcessingError {
    fn from(err: csv::Error) -> Self {
        match err.into_kind() {
            csv::ErrorKind::Io(io) => ProcessingError::IoError(io),
            other => ProcessingError::OutputError(format!("{:?}", other)),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ReferenceDataError {
    #[error("Cannot read reference file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid reference data: {0}")]
    Invalid(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ChartError {
    #[error("Cannot serialize '{chart}': {source}")]
    Serialize {
        chart: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Cannot write '{path}': {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },
}
