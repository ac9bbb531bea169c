// src/aggregate/releases.rs - Editor release dates drawn as rules on time charts
use crate::error::ReferenceDataError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// One published release, in the layout of the GitHub releases API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Release {
    pub published_at: DateTime<Utc>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, skip_serializing)]
    pub tag_name: Option<String>,
}

impl Release {
    pub fn label(&self) -> &str {
        self.name
            .as_deref()
            .filter(|name| !name.is_empty())
            .or(self.tag_name.as_deref())
            .unwrap_or("")
    }
}

/// Drafts have no `published_at`; they are dropped rather than failing the load.
pub fn parse_releases(content: &str) -> Result<Vec<Release>, ReferenceDataError> {
    let entries: Vec<serde_json::Value> = serde_json::from_str(content)?;
    let mut releases: Vec<Release> = entries
        .into_iter()
        .filter(|entry| entry.get("published_at").is_some_and(|v| !v.is_null()))
        .map(serde_json::from_value)
        .collect::<Result<_, _>>()?;
    releases.sort_by_key(|release| release.published_at);
    Ok(releases)
}

pub fn load_releases(path: &Path) -> Result<Vec<Release>, ReferenceDataError> {
    let content = fs::read_to_string(path)?;
    let releases = parse_releases(&content)?;
    tracing::debug!(path = %path.display(), releases = releases.len(), "loaded release dates");
    Ok(releases)
}
