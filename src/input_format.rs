// src/input_format.rs - Reading the normalized record stream back in
use crate::error::ProcessingError;
use crate::output_format::RecordFormat;
use crate::record::NormalizedRecord;
use std::io::BufRead;

enum Source<R: BufRead> {
    Jsonl {
        input: R,
        line: Vec<u8>,
        line_number: usize,
    },
    Csv(csv::DeserializeRecordsIntoIter<R, NormalizedRecord>),
}

/// Lazy iterator over normalized records.
///
/// Undecodable lines, invalid UTF-8 included, come back as `MalformedRecord`
/// and iteration continues; I/O failures come back as `IoError`.
pub struct RecordReader<R: BufRead> {
    source: Source<R>,
}

impl<R: BufRead> RecordReader<R> {
    pub fn new(input: R, format: RecordFormat) -> Self {
        let source = match format {
            RecordFormat::Jsonl => Source::Jsonl {
                input,
                line: Vec::new(),
                line_number: 0,
            },
            RecordFormat::Csv => Source::Csv(csv::Reader::from_reader(input).into_deserialize()),
        };
        RecordReader { source }
    }
}

impl<R: BufRead> Iterator for RecordReader<R> {
    type Item = Result<NormalizedRecord, ProcessingError>;

    fn next(&mut self) -> Option<Self::Item> {
        match &mut self.source {
            Source::Jsonl {
                input,
                line,
                line_number,
            } => loop {
                line.clear();
                match input.read_until(b'\n', line) {
                    Ok(0) => return None,
                    Ok(_) => {}
                    Err(e) => return Some(Err(ProcessingError::IoError(e))),
                }
                *line_number += 1;

                let trimmed = line.trim_ascii();
                if trimmed.is_empty() {
                    continue;
                }
                return Some(serde_json::from_slice(trimmed).map_err(|e| {
                    ProcessingError::MalformedRecord {
                        line: *line_number,
                        message: e.to_string(),
                    }
                }));
            },
            Source::Csv(records) => {
                let result = records.next()?;
                Some(result.map_err(|e| {
                    if e.is_io_error() {
                        return ProcessingError::from(e);
                    }
                    ProcessingError::MalformedRecord {
                        line: e.position().map(|p| p.line() as usize).unwrap_or(0),
                        message: e.to_string(),
                    }
                }))
            }
        }
    }
}
