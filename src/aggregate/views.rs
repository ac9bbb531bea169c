//! Aggregate views over the normalized records.
//!
//! Every view is a pure function of the record slice (plus read-only
//! configuration); none depends on another view's output except through
//! explicit arguments.

use crate::countries::CountryIndex;
use crate::record::NormalizedRecord;
use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};

/// First year taking part in seasonal statistics, whatever the run date
pub const SEASONAL_FIRST_YEAR: i32 = 2023;

pub const MONTH_NAMES: [&str; 12] = [
    "January", "February", "March", "April", "May", "June", "July", "August", "September",
    "October", "November", "December",
];

/// Lifetime contribution buckets as (label, lowest, highest), both inclusive
pub const ENGAGEMENT_BUCKETS: [(&str, u64, u64); 6] = [
    ("0", 0, 0),
    ("1-10", 1, 10),
    ("10-100", 11, 100),
    ("100-500", 101, 500),
    ("500-1000", 501, 1000),
    ("> 1000", 1001, u64::MAX),
];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyActivity {
    pub date: NaiveDate,
    pub changes: u64,
    pub users: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CumulativePoint {
    pub date: NaiveDate,
    pub changes: u64,
    pub accumulated_changes: u64,
    pub new_users: usize,
    pub accumulated_users: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeasonalPoint {
    pub month: u32,
    pub month_name: &'static str,
    pub average_changes: f64,
    pub average_users: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnnualPoint {
    pub year: i32,
    pub total_changes: u64,
    pub total_users: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngagementBucket {
    pub category: &'static str,
    pub total_users: usize,
    pub total_changes: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CountryTotal {
    pub code: String,
    pub total_changes: u64,
    pub total_users: usize,
}

/// Row of the country ranking table; field names are read by the page markup
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankingRow {
    pub flag: String,
    #[serde(rename = "NAME")]
    pub name: String,
    pub total_changes: u64,
    pub total_users: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimelinePoint {
    pub code: String,
    #[serde(rename = "NAME")]
    pub name: String,
    pub rank: usize,
    pub month: NaiveDate,
    pub total_changes: u64,
    pub total_users: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserSpan {
    pub uid: u64,
    pub user: String,
    pub first_changeset: DateTime<Utc>,
    pub last_changeset: DateTime<Utc>,
    pub total_changes: u64,
}

#[derive(Default)]
struct Bucket {
    changes: u64,
    users: HashSet<u64>,
}

impl Bucket {
    fn add(&mut self, record: &NormalizedRecord) {
        self.changes = self.changes.saturating_add(record.num_changes);
        self.users.insert(record.uid);
    }
}

/// Every day from `first` to `last`, inclusive
fn days(first: NaiveDate, last: NaiveDate) -> impl Iterator<Item = NaiveDate> {
    first.iter_days().take_while(move |day| *day <= last)
}

fn first_of_month(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

pub fn daily_activity(records: &[NormalizedRecord]) -> Vec<DailyActivity> {
    let mut by_day: BTreeMap<NaiveDate, Bucket> = BTreeMap::new();
    for record in records {
        by_day.entry(record.date()).or_default().add(record);
    }

    let (Some(&first), Some(&last)) = (by_day.keys().next(), by_day.keys().next_back()) else {
        return Vec::new();
    };

    days(first, last)
        .map(|date| match by_day.get(&date) {
            Some(bucket) => DailyActivity {
                date,
                changes: bucket.changes,
                users: bucket.users.len(),
            },
            None => DailyActivity { date, changes: 0, users: 0 },
        })
        .collect()
}

/// Running totals of changes and of distinct users, one point per day.
pub fn cumulative_series(records: &[NormalizedRecord]) -> Vec<CumulativePoint> {
    let mut sorted: Vec<&NormalizedRecord> = records.iter().collect();
    sorted.sort_by_key(|record| record.created_at);

    let mut by_day: BTreeMap<NaiveDate, (u64, usize)> = BTreeMap::new();
    let mut seen_users: HashSet<u64> = HashSet::new();
    for record in sorted {
        let day = by_day.entry(record.date()).or_default();
        day.0 = day.0.saturating_add(record.num_changes);
        if seen_users.insert(record.uid) {
            day.1 += 1;
        }
    }

    let (Some(&first), Some(&last)) = (by_day.keys().next(), by_day.keys().next_back()) else {
        return Vec::new();
    };

    let mut accumulated_changes: u64 = 0;
    let mut accumulated_users = 0;
    days(first, last)
        .map(|date| {
            let (changes, new_users) = by_day.get(&date).copied().unwrap_or_default();
            accumulated_changes = accumulated_changes.saturating_add(changes);
            accumulated_users += new_users;
            CumulativePoint {
                date,
                changes,
                accumulated_changes,
                new_users,
                accumulated_users,
            }
        })
        .collect()
}

/// Average monthly activity per calendar month.
///
/// Only (year, month) buckets from `SEASONAL_FIRST_YEAR` up to, but excluding,
/// the month of `now` take part; months without any activity are not averaged
/// in as zero.
pub fn seasonal_participation(records: &[NormalizedRecord], now: DateTime<Utc>) -> Vec<SeasonalPoint> {
    let Some(lower) = Utc.with_ymd_and_hms(SEASONAL_FIRST_YEAR, 1, 1, 0, 0, 0).single() else {
        return Vec::new();
    };
    let upper = Utc
        .with_ymd_and_hms(now.year(), now.month(), 1, 0, 0, 0)
        .single()
        .unwrap_or(now);

    let mut by_year_month: BTreeMap<(u32, i32), Bucket> = BTreeMap::new();
    for record in records {
        if record.created_at < lower || record.created_at >= upper {
            continue;
        }
        let key = (record.created_at.month(), record.created_at.year());
        by_year_month.entry(key).or_default().add(record);
    }

    let mut by_month: BTreeMap<u32, (u64, usize, usize)> = BTreeMap::new();
    for ((month, _year), bucket) in &by_year_month {
        let entry = by_month.entry(*month).or_default();
        entry.0 = entry.0.saturating_add(bucket.changes);
        entry.1 += bucket.users.len();
        entry.2 += 1;
    }

    by_month
        .into_iter()
        .map(|(month, (changes, users, years))| SeasonalPoint {
            month,
            month_name: MONTH_NAMES[(month - 1) as usize],
            average_changes: changes as f64 / years as f64,
            average_users: users as f64 / years as f64,
        })
        .collect()
}

pub fn annual_participation(records: &[NormalizedRecord]) -> Vec<AnnualPoint> {
    let mut by_year: BTreeMap<i32, Bucket> = BTreeMap::new();
    for record in records {
        by_year.entry(record.created_at.year()).or_default().add(record);
    }
    by_year
        .into_iter()
        .map(|(year, bucket)| AnnualPoint {
            year,
            total_changes: bucket.changes,
            total_users: bucket.users.len(),
        })
        .collect()
}

/// Lifetime total of changed elements per user
pub fn user_totals(records: &[NormalizedRecord]) -> HashMap<u64, u64> {
    let mut totals: HashMap<u64, u64> = HashMap::new();
    for record in records {
        let total = totals.entry(record.uid).or_default();
        *total = total.saturating_add(record.num_changes);
    }
    totals
}

pub fn engagement_bucket(total: u64) -> usize {
    ENGAGEMENT_BUCKETS
        .iter()
        .position(|&(_, low, high)| total >= low && total <= high)
        .unwrap_or(ENGAGEMENT_BUCKETS.len() - 1)
}

/// Users grouped by lifetime contribution. First pass totals per user,
/// second pass classifies them. Empty buckets are left out.
pub fn user_engagement(records: &[NormalizedRecord]) -> Vec<EngagementBucket> {
    let totals = user_totals(records);

    let mut buckets: Vec<EngagementBucket> = ENGAGEMENT_BUCKETS
        .iter()
        .map(|&(category, _, _)| EngagementBucket {
            category,
            total_users: 0,
            total_changes: 0,
        })
        .collect();
    for total in totals.values() {
        let bucket = &mut buckets[engagement_bucket(*total)];
        bucket.total_users += 1;
        bucket.total_changes = bucket.total_changes.saturating_add(*total);
    }

    buckets.retain(|bucket| bucket.total_users > 0);
    buckets
}

/// Per-country totals, largest first. A user counts once in every country
/// they edited in. Records without a country are not attributed anywhere.
pub fn country_totals(records: &[NormalizedRecord]) -> Vec<CountryTotal> {
    let mut by_country: HashMap<&str, Bucket> = HashMap::new();
    for record in records {
        if let Some(code) = record.country.as_deref() {
            by_country.entry(code).or_default().add(record);
        }
    }

    let mut totals: Vec<CountryTotal> = by_country
        .into_iter()
        .map(|(code, bucket)| CountryTotal {
            code: code.to_string(),
            total_changes: bucket.changes,
            total_users: bucket.users.len(),
        })
        .collect();
    totals.sort_by(|a, b| {
        b.total_changes
            .cmp(&a.total_changes)
            .then_with(|| a.code.cmp(&b.code))
    });
    totals
}

pub fn country_ranking(totals: &[CountryTotal], countries: &CountryIndex) -> Vec<RankingRow> {
    totals
        .iter()
        .map(|total| {
            let info = countries.info_or_placeholder(&total.code);
            RankingRow {
                flag: info.flag,
                name: info.name,
                total_changes: total.total_changes,
                total_users: total.total_users,
            }
        })
        .collect()
}

/// Monthly series for the `top` largest countries of `totals`, ordered by
/// rank and month.
pub fn country_timeline(
    records: &[NormalizedRecord],
    totals: &[CountryTotal],
    top: usize,
    countries: &CountryIndex,
) -> Vec<TimelinePoint> {
    let ranks: HashMap<&str, usize> = totals
        .iter()
        .take(top)
        .enumerate()
        .map(|(rank, total)| (total.code.as_str(), rank))
        .collect();

    let mut by_country_month: BTreeMap<(usize, NaiveDate), Bucket> = BTreeMap::new();
    for record in records {
        let Some(&rank) = record.country.as_deref().and_then(|code| ranks.get(code)) else {
            continue;
        };
        by_country_month
            .entry((rank, first_of_month(record.date())))
            .or_default()
            .add(record);
    }

    by_country_month
        .into_iter()
        .map(|((rank, month), bucket)| {
            let info = countries.info_or_placeholder(&totals[rank].code);
            TimelinePoint {
                code: info.code,
                name: info.name,
                rank,
                month,
                total_changes: bucket.changes,
                total_users: bucket.users.len(),
            }
        })
        .collect()
}

/// First and last contribution per user, ordered by user id. The user name
/// is taken from the latest changeset since accounts can be renamed.
pub fn user_contributions(records: &[NormalizedRecord]) -> Vec<UserSpan> {
    let mut spans: BTreeMap<u64, UserSpan> = BTreeMap::new();
    for record in records {
        let span = spans.entry(record.uid).or_insert_with(|| UserSpan {
            uid: record.uid,
            user: record.user.clone(),
            first_changeset: record.created_at,
            last_changeset: record.created_at,
            total_changes: 0,
        });
        span.total_changes = span.total_changes.saturating_add(record.num_changes);
        if record.created_at < span.first_changeset {
            span.first_changeset = record.created_at;
        }
        if record.created_at >= span.last_changeset {
            span.last_changeset = record.created_at;
            span.user.clone_from(&record.user);
        }
    }
    spans.into_values().collect()
}
