// src/changeset_reader.rs - Streaming reader for OSM changeset dumps
use crate::editor::EditorFilter;
use crate::error::ProcessingError;
use crate::record::{BoundingBox, Changeset};
use chrono::{DateTime, Utc};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::borrow::Cow;
use std::io::BufRead;
use tracing::{debug, info};

/// Tags reported on only for matching changesets
#[derive(Debug, Clone, Copy)]
enum DeferredTag {
    Comment,
    Locale,
}

/// Changeset whose start tag has been seen but whose tags are still arriving.
/// The start tag and the free-text tags are kept raw; they are only decoded
/// once the editor matched.
struct PendingChangeset {
    start: BytesStart<'static>,
    created_by: Option<String>,
    deferred: Vec<(DeferredTag, BytesStart<'static>)>,
    tag_error: Option<String>,
}

impl PendingChangeset {
    fn new(start: BytesStart<'static>) -> Self {
        PendingChangeset {
            start,
            created_by: None,
            deferred: Vec::new(),
            tag_error: None,
        }
    }
}

/// Pulls changesets out of an `<osm>` changeset export, yielding only those
/// whose `created_by` tag passes the editor filter.
///
/// Per-changeset problems come back as `MalformedChangeset` and iteration
/// continues; XML syntax errors and truncation come back as `StreamCorruption`
/// and end the iteration.
pub struct ChangesetReader<R: BufRead> {
    reader: Reader<R>,
    buf: Vec<u8>,
    filter: EditorFilter,
    pending: Option<PendingChangeset>,
    open_elements: Vec<Vec<u8>>,
    seen: usize,
    rejected: usize,
    progress_interval: usize,
    finished: bool,
}

impl<R: BufRead> ChangesetReader<R> {
    pub fn new(input: R, filter: EditorFilter) -> Self {
        let mut reader = Reader::from_reader(input);
        reader.config_mut().trim_text(true);

        ChangesetReader {
            reader,
            buf: Vec::with_capacity(4096),
            filter,
            pending: None,
            open_elements: Vec::new(),
            seen: 0,
            rejected: 0,
            progress_interval: 0,
            finished: false,
        }
    }

    /// Log a progress line every `interval` changesets (0 disables)
    pub fn with_progress(mut self, interval: usize) -> Self {
        self.progress_interval = interval;
        self
    }

    /// Changesets encountered so far, matching or not
    pub fn seen(&self) -> usize {
        self.seen
    }

    /// Changesets discarded because of their editor tag
    pub fn rejected(&self) -> usize {
        self.rejected
    }

    fn count_changeset(&mut self) {
        self.seen += 1;
        if self.progress_interval > 0 && self.seen % self.progress_interval == 0 {
            info!(
                changesets = self.seen,
                matched = self.seen - self.rejected,
                "progress"
            );
        }
    }

    fn corruption(&self, message: String) -> ProcessingError {
        ProcessingError::StreamCorruption {
            position: self.reader.buffer_position(),
            message,
        }
    }

    fn complete(&mut self, pending: PendingChangeset) -> Option<Result<Changeset, ProcessingError>> {
        let accepted = match &pending.created_by {
            Some(created_by) => self.filter.matches(created_by),
            None => self.filter.matches_untagged(),
        };
        if !accepted {
            self.rejected += 1;
            return None;
        }
        Some(decode_changeset(pending))
    }
}

impl<R: BufRead> Iterator for ChangesetReader<R> {
    type Item = Result<Changeset, ProcessingError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        loop {
            self.buf.clear();
            let event = match self.reader.read_event_into(&mut self.buf) {
                Ok(event) => event,
                Err(e) => {
                    self.finished = true;
                    return Some(Err(self.corruption(e.to_string())));
                }
            };

            match event {
                Event::Start(e) => {
                    self.open_elements.push(e.name().as_ref().to_vec());
                    match element_kind(&e) {
                        ElementKind::Changeset => {
                            let pending = PendingChangeset::new(e.into_owned());
                            self.count_changeset();
                            self.pending = Some(pending);
                        }
                        ElementKind::Tag => apply_tag(&mut self.pending, &e),
                        ElementKind::Other => {}
                    }
                }
                Event::Empty(e) => match element_kind(&e) {
                    ElementKind::Changeset => {
                        let pending = PendingChangeset::new(e.into_owned());
                        self.count_changeset();
                        if let Some(result) = self.complete(pending) {
                            return Some(result);
                        }
                    }
                    ElementKind::Tag => apply_tag(&mut self.pending, &e),
                    ElementKind::Other => {}
                },
                Event::End(e) => {
                    let is_changeset = e.name().as_ref() == b"changeset";
                    self.open_elements.pop();
                    if is_changeset {
                        if let Some(pending) = self.pending.take() {
                            if let Some(result) = self.complete(pending) {
                                return Some(result);
                            }
                        }
                    }
                }
                Event::Eof => {
                    self.finished = true;
                    if let Some(open) = self.open_elements.last() {
                        let message = format!(
                            "unexpected end of stream inside <{}>",
                            String::from_utf8_lossy(open)
                        );
                        return Some(Err(self.corruption(message)));
                    }
                    debug!(seen = self.seen, rejected = self.rejected, "changeset stream finished");
                    return None;
                }
                _ => {}
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum ElementKind {
    Changeset,
    Tag,
    Other,
}

fn element_kind(element: &BytesStart) -> ElementKind {
    match element.name().as_ref() {
        b"changeset" => ElementKind::Changeset,
        b"tag" => ElementKind::Tag,
        _ => ElementKind::Other,
    }
}

/// Read one attribute value, unescaped
fn attribute(element: &BytesStart, key: &[u8]) -> Result<Option<String>, String> {
    for attr in element.attributes() {
        let attr = attr.map_err(|e| e.to_string())?;
        if attr.key.as_ref() == key {
            let value = attr.unescape_value().map_err(|e| e.to_string())?;
            return Ok(Some(value.into_owned()));
        }
    }
    Ok(None)
}

/// Raw attribute bytes, without unescaping
fn raw_attribute<'a>(element: &'a BytesStart, key: &[u8]) -> Result<Option<Cow<'a, [u8]>>, String> {
    for attr in element.attributes() {
        let attr = attr.map_err(|e| e.to_string())?;
        if attr.key.as_ref() == key {
            return Ok(Some(attr.value));
        }
    }
    Ok(None)
}

fn apply_tag(pending: &mut Option<PendingChangeset>, tag: &BytesStart) {
    let Some(changeset) = pending.as_mut() else {
        return;
    };

    let key = match raw_attribute(tag, b"k") {
        Ok(Some(key)) => key,
        Ok(None) => return,
        Err(e) => {
            changeset.tag_error = Some(e);
            return;
        }
    };

    match key.as_ref() {
        b"created_by" => match attribute(tag, b"v") {
            Ok(value) => changeset.created_by = Some(value.unwrap_or_default()),
            Err(e) => changeset.tag_error = Some(e),
        },
        b"comment" => changeset
            .deferred
            .push((DeferredTag::Comment, tag.clone().into_owned())),
        b"locale" => changeset
            .deferred
            .push((DeferredTag::Locale, tag.clone().into_owned())),
        _ => {}
    }
}

#[derive(Default)]
struct RawAttributes {
    id: Option<String>,
    uid: Option<String>,
    user: Option<String>,
    created_at: Option<String>,
    closed_at: Option<String>,
    num_changes: Option<String>,
    min_lat: Option<String>,
    min_lon: Option<String>,
    max_lat: Option<String>,
    max_lon: Option<String>,
}

fn decode_changeset(pending: PendingChangeset) -> Result<Changeset, ProcessingError> {
    let mut raw = RawAttributes::default();
    for attr in pending.start.attributes() {
        let attr = attr.map_err(|e| malformed("?", e.to_string()))?;
        let value = attr
            .unescape_value()
            .map_err(|e| malformed("?", e.to_string()))?
            .into_owned();
        match attr.key.as_ref() {
            b"id" => raw.id = Some(value),
            b"uid" => raw.uid = Some(value),
            b"user" => raw.user = Some(value),
            b"created_at" => raw.created_at = Some(value),
            b"closed_at" => raw.closed_at = Some(value),
            b"num_changes" => raw.num_changes = Some(value),
            b"min_lat" => raw.min_lat = Some(value),
            b"min_lon" => raw.min_lon = Some(value),
            b"max_lat" => raw.max_lat = Some(value),
            b"max_lon" => raw.max_lon = Some(value),
            _ => {}
        }
    }

    let raw_id = raw.id.clone().unwrap_or_else(|| "?".to_string());
    if let Some(e) = pending.tag_error {
        return Err(malformed(&raw_id, format!("unreadable tag: {}", e)));
    }

    let mut comment = None;
    let mut locale = None;
    for (kind, tag) in &pending.deferred {
        let value = attribute(tag, b"v")
            .map_err(|e| malformed(&raw_id, format!("unreadable tag: {}", e)))?
            .unwrap_or_default();
        match kind {
            DeferredTag::Comment => comment = Some(value),
            DeferredTag::Locale => locale = Some(value),
        }
    }

    let id = raw
        .id
        .as_deref()
        .ok_or_else(|| malformed(&raw_id, "missing id"))?
        .parse::<u64>()
        .map_err(|e| malformed(&raw_id, format!("invalid id: {}", e)))?;
    let uid = raw
        .uid
        .as_deref()
        .ok_or_else(|| malformed(&raw_id, "missing uid"))?
        .parse::<u64>()
        .map_err(|e| malformed(&raw_id, format!("invalid uid: {}", e)))?;
    let created_at = raw
        .created_at
        .as_deref()
        .ok_or_else(|| malformed(&raw_id, "missing created_at"))
        .and_then(|s| parse_timestamp(s).map_err(|e| malformed(&raw_id, e)))?;
    let closed_at = match raw.closed_at.as_deref() {
        Some(s) => Some(parse_timestamp(s).map_err(|e| malformed(&raw_id, e))?),
        None => None,
    };

    let num_changes = match raw.num_changes.as_deref().map(str::parse::<u64>) {
        Some(Ok(n)) => n,
        Some(Err(e)) => {
            debug!(changeset = id, error = %e, "unreadable num_changes, counting 0");
            0
        }
        None => 0,
    };

    let bbox = match (raw.min_lat, raw.min_lon, raw.max_lat, raw.max_lon) {
        (Some(min_lat), Some(min_lon), Some(max_lat), Some(max_lon)) => Some(BoundingBox {
            min_lat: parse_coordinate(&raw_id, "min_lat", &min_lat)?,
            min_lon: parse_coordinate(&raw_id, "min_lon", &min_lon)?,
            max_lat: parse_coordinate(&raw_id, "max_lat", &max_lat)?,
            max_lon: parse_coordinate(&raw_id, "max_lon", &max_lon)?,
        }),
        _ => None,
    };

    Ok(Changeset {
        id,
        uid,
        user: raw.user.unwrap_or_default(),
        created_at,
        closed_at,
        num_changes,
        bbox,
        created_by: pending.created_by.unwrap_or_default(),
        comment,
        locale,
    })
}

fn malformed(id: &str, message: impl Into<String>) -> ProcessingError {
    ProcessingError::MalformedChangeset {
        id: id.to_string(),
        message: message.into(),
    }
}

fn parse_timestamp(text: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(text)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| format!("invalid timestamp '{}': {}", text, e))
}

fn parse_coordinate(id: &str, name: &str, text: &str) -> Result<f64, ProcessingError> {
    match text.parse::<f64>() {
        Ok(value) if value.is_finite() => Ok(value),
        _ => Err(malformed(id, format!("invalid {} '{}'", name, text))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::editor::MatchMode;
    use std::io::Cursor;

    const DUMP: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<osm version="0.6" generator="planet-dump-ng 1.2.4">
 <changeset id="10" created_at="2023-05-01T10:00:00Z" closed_at="2023-05-01T10:05:00Z" open="false" user="alice" uid="7" min_lat="52.5" min_lon="13.3" max_lat="52.6" max_lon="13.4" num_changes="5" comments_count="0">
  <tag k="comment" v="Bus stop &amp; shelter"/>
  <tag k="created_by" v="OpenStop 1.4.0"/>
  <tag k="locale" v="de"/>
 </changeset>
 <changeset id="11" created_at="2023-05-02T10:00:00Z" open="false" user="bob" uid="8" num_changes="100" comments_count="0">
  <tag k="created_by" v="iD 2.25.1"/>
 </changeset>
 <changeset id="12" created_at="2023-05-03T10:00:00Z" open="true" user="carol" uid="9" num_changes="1" comments_count="0"/>
</osm>
"#;

    fn read_all(input: &str, editor: &str) -> Vec<Result<Changeset, ProcessingError>> {
        ChangesetReader::new(Cursor::new(input), EditorFilter::new(editor, MatchMode::Prefix)).collect()
    }

    #[test]
    fn test_only_matching_changesets_are_yielded() {
        let mut reader = ChangesetReader::new(
            Cursor::new(DUMP),
            EditorFilter::new("OpenStop", MatchMode::Prefix),
        );
        let changesets: Vec<_> = reader.by_ref().collect::<Result<_, _>>().unwrap();

        assert_eq!(changesets.len(), 1);
        let cs = &changesets[0];
        assert_eq!(cs.id, 10);
        assert_eq!(cs.uid, 7);
        assert_eq!(cs.user, "alice");
        assert_eq!(cs.num_changes, 5);
        assert_eq!(cs.created_by, "OpenStop 1.4.0");
        assert_eq!(cs.comment.as_deref(), Some("Bus stop & shelter"));
        assert_eq!(cs.locale.as_deref(), Some("de"));
        assert!(cs.closed_at.is_some());
        assert_eq!(
            cs.bbox,
            Some(BoundingBox { min_lat: 52.5, min_lon: 13.3, max_lat: 52.6, max_lon: 13.4 })
        );

        assert_eq!(reader.seen(), 3);
        assert_eq!(reader.rejected(), 2);
    }

    #[test]
    fn test_empty_editor_includes_untagged_changesets() {
        let results = read_all(DUMP, "");
        assert_eq!(results.len(), 3);
        let last = results[2].as_ref().unwrap();
        assert_eq!(last.id, 12);
        assert_eq!(last.created_by, "");
        assert_eq!(last.bbox, None);
    }

    #[test]
    fn test_missing_num_changes_counts_zero() {
        let input = r#"<osm><changeset id="1" created_at="2024-01-01T00:00:00Z" user="a" uid="1"><tag k="created_by" v="OpenStop"/></changeset></osm>"#;
        let results = read_all(input, "OpenStop");
        assert_eq!(results[0].as_ref().unwrap().num_changes, 0);
    }

    #[test]
    fn test_malformed_changeset_does_not_stop_iteration() {
        let input = r#"<osm>
<changeset id="1" created_at="yesterday" user="a" uid="1"><tag k="created_by" v="OpenStop"/></changeset>
<changeset id="2" created_at="2024-01-01T00:00:00Z" user="b" uid="2"><tag k="created_by" v="OpenStop"/></changeset>
</osm>"#;
        let results = read_all(input, "OpenStop");
        assert_eq!(results.len(), 2);
        assert!(matches!(
            &results[0],
            Err(ProcessingError::MalformedChangeset { id, .. }) if id == "1"
        ));
        assert_eq!(results[1].as_ref().unwrap().id, 2);
    }

    #[test]
    fn test_malformed_rejected_changeset_is_silently_skipped() {
        let input = r#"<osm><changeset id="x" uid="y"><tag k="created_by" v="JOSM"/></changeset></osm>"#;
        assert!(read_all(input, "OpenStop").is_empty());
    }

    #[test]
    fn test_free_text_tags_are_decoded_only_for_matches() {
        let input = r#"<osm>
<changeset id="1" created_at="2024-01-01T00:00:00Z" user="a" uid="1"><tag k="comment" v="broken &bogus; entity"/><tag k="created_by" v="JOSM/1.5"/></changeset>
<changeset id="2" created_at="2024-01-02T00:00:00Z" user="b" uid="2"><tag k="comment" v="broken &bogus; entity"/><tag k="created_by" v="OpenStop 1.4"/></changeset>
</osm>"#;
        let results = read_all(input, "OpenStop");
        assert_eq!(results.len(), 1);
        assert!(matches!(
            &results[0],
            Err(ProcessingError::MalformedChangeset { id, message }) if id == "2" && message.contains("unreadable tag")
        ));
    }

    #[test]
    fn test_truncated_stream_is_corruption() {
        let input = r#"<osm><changeset id="1" created_at="2024-01-01T00:00:00Z" user="a" uid="1"><tag k="created_by" v="OpenStop"/>"#;
        let results = read_all(input, "OpenStop");
        assert_eq!(results.len(), 1);
        match &results[0] {
            Err(ProcessingError::StreamCorruption { position, .. }) => assert!(*position > 0),
            other => panic!("expected corruption, got {:?}", other),
        }
    }

    #[test]
    fn test_mismatched_end_tag_is_corruption() {
        let input = r#"<osm><changeset id="1" uid="1"></osm>"#;
        let results = read_all(input, "");
        assert!(matches!(
            results.last(),
            Some(Err(ProcessingError::StreamCorruption { .. }))
        ));
    }
}
