use crate::error::ProcessingError;
use crate::record::NormalizedRecord;
use std::io::Write;

/// Line format of the normalized record stream between the two stages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum RecordFormat {
    #[default]
    #[value(name = "jsonl", help = "JSON Lines format (one JSON object per line)")]
    Jsonl,
    #[value(name = "csv", help = "Comma-separated values with a header row")]
    Csv,
}

enum Sink<W: Write> {
    Jsonl(W),
    Csv(csv::Writer<W>),
}

/// Writes normalized records one per line, flushing is left to the caller
pub struct RecordWriter<W: Write> {
    sink: Sink<W>,
}

impl<W: Write> RecordWriter<W> {
    pub fn new(output: W, format: RecordFormat) -> Self {
        let sink = match format {
            RecordFormat::Jsonl => Sink::Jsonl(output),
            RecordFormat::Csv => Sink::Csv(csv::Writer::from_writer(output)),
        };
        RecordWriter { sink }
    }

    pub fn write_record(&mut self, record: &NormalizedRecord) -> Result<(), ProcessingError> {
        match &mut self.sink {
            Sink::Jsonl(output) => {
                let line = serde_json::to_string(record)
                    .map_err(|e| ProcessingError::OutputError(e.to_string()))?;
                writeln!(output, "{}", line)?;
            }
            // csv writes the header row before the first record
            Sink::Csv(writer) => writer.serialize(record)?,
        }
        Ok(())
    }

    pub fn flush(&mut self) -> Result<(), ProcessingError> {
        match &mut self.sink {
            Sink::Jsonl(output) => output.flush()?,
            Sink::Csv(writer) => writer.flush()?,
        }
        Ok(())
    }
}
