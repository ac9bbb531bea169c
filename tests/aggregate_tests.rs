// tests/aggregate_tests.rs
use assert_cmd::Command;
use chrono::{Datelike, Utc};
use predicates::prelude::*;
use serde_json::Value;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

const ARTIFACTS: [&str; 11] = [
    "changes_activity.json",
    "total_changes.json",
    "total_contributors.json",
    "seasonal_participation.json",
    "annual_participation.json",
    "user_engagement.json",
    "country_changes.json",
    "country_contributors.json",
    "country_ranking.json",
    "countries_timeline.json",
    "user_contributions.json",
];

fn record(id: u64, uid: u64, created_at: &str, country: Option<&str>, num_changes: u64) -> String {
    serde_json::json!({
        "id": id,
        "uid": uid,
        "user": format!("user{}", uid),
        "created_at": created_at,
        "country": country,
        "num_changes": num_changes,
    })
    .to_string()
}

fn aggregate(dir: &TempDir, input: String, extra: &[&str]) -> assert_cmd::assert::Assert {
    Command::cargo_bin("csstats")
        .unwrap()
        .arg("aggregate")
        .arg("-d")
        .arg(dir.path())
        .args(extra)
        .write_stdin(input)
        .assert()
}

fn artifact(dir: &Path, name: &str) -> Value {
    serde_json::from_str(&fs::read_to_string(dir.join(name)).unwrap()).unwrap()
}

/// Two changesets of one user, one resolved to a country, one not
fn scenario() -> String {
    [
        record(101, 7, "2023-06-01T08:15:00Z", Some("DE"), 5),
        record(103, 7, "2023-06-02T17:45:00Z", None, 10),
    ]
    .join("\n")
}

#[test]
fn test_every_artifact_is_written() {
    let dir = TempDir::new().unwrap();
    aggregate(&dir, scenario(), &[]).success();

    for name in ARTIFACTS {
        let value = artifact(dir.path(), name);
        if name != "country_ranking.json" {
            assert_eq!(value["$schema"], "https://vega.github.io/schema/vega-lite/v5.json", "{}", name);
        }
    }
}

#[test]
fn test_daily_and_cumulative_views() {
    let dir = TempDir::new().unwrap();
    aggregate(&dir, scenario(), &[]).success();

    let daily = artifact(dir.path(), "changes_activity.json");
    let days = daily["data"]["values"].as_array().unwrap();
    assert_eq!(days.len(), 2);
    assert_eq!(days[0]["changes"], 5);
    assert_eq!(days[0]["users"], 1);
    assert_eq!(days[1]["changes"], 10);
    assert_eq!(days[1]["users"], 1);

    let cumulative = artifact(dir.path(), "total_changes.json");
    let points = cumulative["data"]["values"].as_array().unwrap();
    let last = points.last().unwrap();
    assert_eq!(last["accumulated_changes"], 15);
    assert_eq!(last["accumulated_users"], 1);
}

#[test]
fn test_record_without_country_counts_everywhere_but_countries() {
    let dir = TempDir::new().unwrap();
    aggregate(&dir, scenario(), &["--countries", "tests/fixtures/countries.geojson"]).success();

    let ranking = artifact(dir.path(), "country_ranking.json");
    let rows = ranking.as_array().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["NAME"], "Germany");
    assert_eq!(rows[0]["flag"], "🇩🇪");
    assert_eq!(rows[0]["total_changes"], 5);
    assert_eq!(rows[0]["total_users"], 1);
    let keys: Vec<&String> = rows[0].as_object().unwrap().keys().collect();
    assert_eq!(keys, ["flag", "NAME", "total_changes", "total_users"]);

    let annual = artifact(dir.path(), "annual_participation.json");
    assert_eq!(annual["data"]["values"][0]["year"], 2023);
    assert_eq!(annual["data"]["values"][0]["total_changes"], 15);

    let map = artifact(dir.path(), "country_changes.json");
    let features = map["data"]["values"].as_array().unwrap();
    let france = features
        .iter()
        .find(|f| f["properties"]["code"] == "FR")
        .unwrap();
    assert_eq!(france["properties"]["total_changes"], 0);
    assert_eq!(france["geometry"]["type"], "MultiPolygon");
}

#[test]
fn test_timeline_keeps_top_ten_countries() {
    let codes = ["AT", "BE", "CH", "CZ", "DE", "DK", "ES", "FR", "IT", "NL", "PL", "SE"];
    let input: Vec<String> = codes
        .iter()
        .enumerate()
        .map(|(i, code)| record(i as u64, i as u64, "2023-03-05T10:00:00Z", Some(code), (i as u64 + 1) * 10))
        .collect();

    let dir = TempDir::new().unwrap();
    aggregate(&dir, input.join("\n"), &[]).success();

    let timeline = artifact(dir.path(), "countries_timeline.json");
    let mut series: Vec<&str> = timeline["data"]["values"]
        .as_array()
        .unwrap()
        .iter()
        .map(|point| point["code"].as_str().unwrap())
        .collect();
    series.dedup();
    assert_eq!(series.len(), 10);
    // Largest first, the two smallest dropped
    assert_eq!(series[0], "SE");
    assert!(!series.contains(&"AT"));
    assert!(!series.contains(&"BE"));

    let ranking = artifact(dir.path(), "country_ranking.json");
    assert_eq!(ranking.as_array().unwrap().len(), 12);
}

#[test]
fn test_seasonal_excludes_old_years_and_current_month() {
    let now = Utc::now();
    let this_month = format!("{:04}-{:02}-01T00:00:00Z", now.year(), now.month());
    let input = [
        record(1, 1, "2022-07-10T10:00:00Z", None, 1000),
        record(2, 1, "2023-07-10T10:00:00Z", None, 4),
        record(3, 2, "2023-07-11T10:00:00Z", None, 6),
        record(4, 3, &this_month, None, 500),
    ]
    .join("\n");

    let dir = TempDir::new().unwrap();
    aggregate(&dir, input, &[]).success();

    let seasonal = artifact(dir.path(), "seasonal_participation.json");
    let months = seasonal["data"]["values"].as_array().unwrap();
    let july = months.iter().find(|m| m["month"] == 7).unwrap();
    assert_eq!(july["average_changes"], 10.0);
    assert_eq!(july["average_users"], 2.0);
    assert_eq!(months.len(), 1);
}

#[test]
fn test_engagement_buckets_cover_every_user() {
    let input = [
        record(1, 1, "2023-05-01T10:00:00Z", None, 0),
        record(2, 2, "2023-05-01T10:00:00Z", None, 10),
        record(3, 3, "2023-05-01T10:00:00Z", None, 11),
        record(4, 3, "2023-05-02T10:00:00Z", None, 500),
        record(5, 4, "2023-05-02T10:00:00Z", None, 5000),
    ]
    .join("\n");

    let dir = TempDir::new().unwrap();
    aggregate(&dir, input, &[]).success();

    let engagement = artifact(dir.path(), "user_engagement.json");
    let buckets = engagement["data"]["values"].as_array().unwrap();
    let categories: Vec<&str> = buckets.iter().map(|b| b["category"].as_str().unwrap()).collect();
    assert_eq!(categories, ["0", "1-10", "500-1000", "> 1000"]);
    let users: u64 = buckets.iter().map(|b| b["total_users"].as_u64().unwrap()).sum();
    assert_eq!(users, 4);
}

#[test]
fn test_releases_are_marked_on_time_charts() {
    let dir = TempDir::new().unwrap();
    aggregate(&dir, scenario(), &["--releases", "tests/fixtures/releases.json"]).success();

    let chart = artifact(dir.path(), "total_contributors.json");
    let rules = &chart["layer"][0];
    assert_eq!(rules["mark"]["type"], "rule");
    assert_eq!(rules["data"]["values"].as_array().unwrap().len(), 1);
    assert_eq!(rules["data"]["values"][0]["name"], "OpenStop 1.4.2");
}

#[test]
fn test_malformed_lines_skip_or_fail_fast() {
    let input = format!("{}\nnot a record\n", scenario());

    let dir = TempDir::new().unwrap();
    aggregate(&dir, input.clone(), &[])
        .success()
        .stderr(predicate::str::contains("skipping record"));
    assert_eq!(artifact(dir.path(), "annual_participation.json")["data"]["values"][0]["total_changes"], 15);

    let strict = TempDir::new().unwrap();
    aggregate(&strict, input, &["--fail-fast"])
        .code(1)
        .stderr(predicate::str::contains("Malformed record on line 3"));
    assert!(!strict.path().join("annual_participation.json").exists());
}

#[test]
fn test_csv_input() {
    let input = "id,uid,user,created_at,country,num_changes\n\
                 101,7,alice,2023-06-01T08:15:00Z,DE,5\n\
                 103,7,alice,2023-06-02T17:45:00Z,,10\n";

    let dir = TempDir::new().unwrap();
    aggregate(&dir, input.to_string(), &["--format", "csv"]).success();

    let ranking = artifact(dir.path(), "country_ranking.json");
    assert_eq!(ranking[0]["total_changes"], 5);
}

#[test]
fn test_unwritable_output_dir_exits_with_failure() {
    let dir = TempDir::new().unwrap();
    let blocked = dir.path().join("charts");
    fs::write(&blocked, "a file, not a directory").unwrap();

    Command::cargo_bin("csstats")
        .unwrap()
        .arg("aggregate")
        .arg("-d")
        .arg(&blocked)
        .write_stdin(scenario())
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Cannot write"));
}

#[test]
fn test_one_blocked_artifact_still_writes_the_rest() {
    let dir = TempDir::new().unwrap();
    fs::create_dir(dir.path().join("country_ranking.json")).unwrap();

    aggregate(&dir, scenario(), &[])
        .code(1)
        .stderr(predicate::str::contains("country_ranking.json"));

    for name in ARTIFACTS.iter().filter(|name| **name != "country_ranking.json") {
        assert!(dir.path().join(name).is_file(), "{} missing", name);
    }
    assert!(dir.path().join("country_ranking.json").is_dir());
}

#[test]
fn test_extract_then_aggregate() {
    let extracted = Command::cargo_bin("csstats")
        .unwrap()
        .args([
            "extract",
            "--countries",
            "tests/fixtures/countries.geojson",
            "-i",
            "tests/fixtures/changesets.osm",
        ])
        .output()
        .unwrap();
    assert!(extracted.status.success());

    let dir = TempDir::new().unwrap();
    aggregate(
        &dir,
        String::from_utf8(extracted.stdout).unwrap(),
        &["--countries", "tests/fixtures/countries.geojson"],
    )
    .success();

    let contributions = artifact(dir.path(), "user_contributions.json");
    let spans = contributions["data"]["values"].as_array().unwrap();
    assert_eq!(spans.len(), 1);
    assert_eq!(spans[0]["user"], "alice");
    assert_eq!(spans[0]["total_changes"], 15);
}
