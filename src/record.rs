// src/record.rs
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Geographic extent of a changeset, in WGS84 degrees
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub min_lon: f64,
    pub max_lat: f64,
    pub max_lon: f64,
}

impl BoundingBox {
    pub fn center(&self) -> (f64, f64) {
        (
            (self.min_lon + self.max_lon) / 2.0,
            (self.min_lat + self.max_lat) / 2.0,
        )
    }

    /// Candidate points for country lookup as (lon, lat): centre first, then corners
    pub fn sample_points(&self) -> [(f64, f64); 5] {
        [
            self.center(),
            (self.min_lon, self.min_lat),
            (self.max_lon, self.min_lat),
            (self.max_lon, self.max_lat),
            (self.min_lon, self.max_lat),
        ]
    }
}

/// A changeset as read from the planet dump, after it passed the editor filter
#[derive(Debug, Clone, PartialEq)]
pub struct Changeset {
    pub id: u64,
    pub uid: u64,
    pub user: String,
    pub created_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    pub num_changes: u64,
    pub bbox: Option<BoundingBox>,
    pub created_by: String,
    pub comment: Option<String>,
    pub locale: Option<String>,
}

/// One line of the intermediate stream between extractor and aggregator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedRecord {
    pub id: u64,
    pub uid: u64,
    pub user: String,
    pub created_at: DateTime<Utc>,
    pub country: Option<String>,
    pub num_changes: u64,
}

impl NormalizedRecord {
    pub fn from_changeset(changeset: Changeset, country: Option<String>) -> Self {
        NormalizedRecord {
            id: changeset.id,
            uid: changeset.uid,
            user: changeset.user,
            created_at: changeset.created_at,
            country,
            num_changes: changeset.num_changes,
        }
    }

    pub fn date(&self) -> NaiveDate {
        self.created_at.date_naive()
    }
}
