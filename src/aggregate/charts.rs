// src/aggregate/charts.rs - Vega-Lite specifications with inline data
use crate::aggregate::releases::Release;
use crate::aggregate::views::{
    AnnualPoint, CountryTotal, CumulativePoint, DailyActivity, EngagementBucket, RankingRow,
    SeasonalPoint, TimelinePoint, UserSpan, ENGAGEMENT_BUCKETS,
};
use crate::countries::CountryIndex;
use crate::error::ChartError;
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::collections::HashSet;

pub const SCHEMA: &str = "https://vega.github.io/schema/vega-lite/v5.json";

const CHANGES_COLOR: &str = "#ff0000";
const USERS_COLOR: &str = "#5276A7";
const TIME_CHART_HEIGHT: u32 = 300;
const MAP_HEIGHT: u32 = 600;

fn values<T: Serialize>(chart: &str, rows: &[T]) -> Result<Value, ChartError> {
    serde_json::to_value(rows).map_err(|source| ChartError::Serialize {
        chart: chart.to_string(),
        source,
    })
}

fn autosize() -> Value {
    json!({"type": "fit-x", "contains": "padding"})
}

/// Wrap a spec body with the schema reference, keeping the body's field order
fn top_level(body: Value) -> Value {
    let mut spec = Map::new();
    spec.insert("$schema".to_string(), Value::from(SCHEMA));
    if let Value::Object(fields) = body {
        spec.extend(fields);
    }
    Value::Object(spec)
}

/// Dashed vertical rules at every release date
fn release_rules(releases: &[Release]) -> Option<Value> {
    if releases.is_empty() {
        return None;
    }
    let rows: Vec<Value> = releases
        .iter()
        .map(|release| {
            json!({
                "published_at": release.published_at.to_rfc3339(),
                "name": release.label(),
            })
        })
        .collect();

    Some(json!({
        "data": {"values": rows},
        "mark": {"type": "rule", "strokeDash": [8, 8]},
        "encoding": {
            "x": {"field": "published_at", "type": "temporal"},
            "size": {"value": 1},
            "tooltip": [
                {"field": "name", "type": "nominal", "title": "Release"},
                {"field": "published_at", "type": "temporal", "title": "Date"}
            ]
        }
    }))
}

/// Put `body` into `spec`, layered under the release rules when there are any
fn with_releases(mut spec: Map<String, Value>, body: Value, releases: &[Release]) -> Value {
    match release_rules(releases) {
        Some(rules) => {
            spec.insert("layer".to_string(), json!([rules, body]));
        }
        None => {
            if let Value::Object(fields) = body {
                spec.extend(fields);
            }
        }
    }
    Value::Object(spec)
}

fn sized(height: u32) -> Map<String, Value> {
    let mut spec = Map::new();
    spec.insert("height".to_string(), Value::from(height));
    spec.insert("width".to_string(), Value::from("container"));
    spec
}

/// Daily changed elements and active contributors, one line chart each
pub fn changes_activity(daily: &[DailyActivity], releases: &[Release]) -> Result<Value, ChartError> {
    let data = values("changes_activity", daily)?;

    let line = |field: &str, title: &str, color: &str, zoom: &str| {
        json!({
            "params": [{
                "name": zoom,
                "select": {"type": "interval", "encodings": ["x"]},
                "bind": "scales"
            }],
            "mark": {"type": "line", "stroke": color},
            "encoding": {
                "x": {"field": "date", "type": "temporal", "title": null},
                "y": {"field": field, "type": "quantitative", "axis": {"title": title}},
                "tooltip": [
                    {"field": "date", "type": "temporal", "title": "Date"},
                    {"field": field, "type": "quantitative", "title": title}
                ]
            }
        })
    };

    let changes = with_releases(
        sized(TIME_CHART_HEIGHT),
        line("changes", "Changed elements count", CHANGES_COLOR, "zoom_changes"),
        releases,
    );
    let users = with_releases(
        sized(TIME_CHART_HEIGHT),
        line("users", "Contributor count", USERS_COLOR, "zoom_users"),
        releases,
    );

    Ok(top_level(json!({
        "data": {"values": data},
        "vconcat": [changes, users],
        "config": {"autosize": autosize()}
    })))
}

fn cumulative_area(
    chart: &str,
    series: &[CumulativePoint],
    field: &str,
    title: &str,
    color: &str,
    releases: &[Release],
) -> Result<Value, ChartError> {
    let mut spec = Map::new();
    spec.insert("data".to_string(), json!({"values": values(chart, series)?}));
    spec.extend(sized(TIME_CHART_HEIGHT));
    spec.insert("autosize".to_string(), autosize());

    let area = json!({
        "mark": {"type": "area", "fill": color},
        "encoding": {
            "x": {"field": "date", "type": "temporal", "title": null},
            "y": {"field": field, "type": "quantitative", "axis": {"title": title}},
            "tooltip": [
                {"field": "date", "type": "temporal", "title": "Date"},
                {"field": field, "type": "quantitative", "title": title}
            ]
        }
    });

    Ok(top_level(with_releases(spec, area, releases)))
}

pub fn total_changes(series: &[CumulativePoint], releases: &[Release]) -> Result<Value, ChartError> {
    cumulative_area(
        "total_changes",
        series,
        "accumulated_changes",
        "Total changed elements",
        CHANGES_COLOR,
        releases,
    )
}

pub fn total_contributors(series: &[CumulativePoint], releases: &[Release]) -> Result<Value, ChartError> {
    cumulative_area(
        "total_contributors",
        series,
        "accumulated_users",
        "Total contributors",
        USERS_COLOR,
        releases,
    )
}

/// Category axis for the mirrored bar charts
struct Category<'a> {
    field: &'a str,
    label_field: &'a str,
    title: Value,
    sort: Value,
}

/// Changes to the left, contributors to the right, category labels in between
fn mirrored_bars(
    data: Value,
    category: Category,
    changes: (&str, &str),
    users: (&str, &str),
) -> Value {
    let y = json!({"field": category.field, "type": "ordinal", "axis": null, "sort": category.sort});

    let left = json!({
        "mark": {"type": "bar", "fill": CHANGES_COLOR},
        "encoding": {
            "y": y,
            "x": {"field": changes.0, "type": "quantitative", "title": changes.1, "sort": "descending"},
            "tooltip": {"field": changes.0, "type": "quantitative", "title": changes.1}
        }
    });
    let middle = json!({
        "mark": "text",
        "encoding": {
            "y": y,
            "text": {"field": category.label_field, "type": "ordinal"}
        },
        "view": {"strokeWidth": 0},
        "title": category.title
    });
    let right = json!({
        "mark": "bar",
        "encoding": {
            "y": y,
            "x": {"field": users.0, "type": "quantitative", "title": users.1},
            "tooltip": {"field": users.0, "type": "quantitative", "title": "Contributors"}
        }
    });

    top_level(json!({
        "data": {"values": data},
        "concat": [left, middle, right],
        "spacing": 5
    }))
}

pub fn seasonal_participation(points: &[SeasonalPoint]) -> Result<Value, ChartError> {
    Ok(mirrored_bars(
        values("seasonal_participation", points)?,
        Category {
            field: "month",
            label_field: "month_name",
            title: json!("Month"),
            sort: json!("ascending"),
        },
        ("average_changes", "Average changed elements"),
        ("average_users", "Average active users"),
    ))
}

pub fn annual_participation(points: &[AnnualPoint]) -> Result<Value, ChartError> {
    Ok(mirrored_bars(
        values("annual_participation", points)?,
        Category {
            field: "year",
            label_field: "year",
            title: json!("Year"),
            sort: json!("descending"),
        },
        ("total_changes", "Total changed elements"),
        ("total_users", "Total active users"),
    ))
}

pub fn user_engagement(buckets: &[EngagementBucket]) -> Result<Value, ChartError> {
    let order: Vec<&str> = ENGAGEMENT_BUCKETS.iter().map(|(label, _, _)| *label).collect();
    Ok(mirrored_bars(
        values("user_engagement", buckets)?,
        Category {
            field: "category",
            label_field: "category",
            title: json!(["Users grouped", "by contributions"]),
            sort: json!(order),
        },
        ("total_changes", "Total changed elements"),
        ("total_users", "Total active users"),
    ))
}

/// One GeoJSON feature per country carrying its totals. Every boundary is
/// included (zero when inactive); active codes without a boundary get a
/// feature without geometry.
pub fn country_features(totals: &[CountryTotal], countries: &CountryIndex) -> Vec<Value> {
    let feature = |code: &str, name: &str, geometry: &Value, total: Option<&CountryTotal>| {
        json!({
            "type": "Feature",
            "geometry": geometry,
            "properties": {
                "code": code,
                "NAME": name,
                "total_changes": total.map_or(0, |t| t.total_changes),
                "total_users": total.map_or(0, |t| t.total_users),
            }
        })
    };

    let mut features: Vec<Value> = countries
        .geometries()
        .map(|(info, geometry)| {
            let total = totals.iter().find(|t| t.code == info.code);
            feature(&info.code, &info.name, geometry, total)
        })
        .collect();

    let known: HashSet<&str> = countries.geometries().map(|(info, _)| info.code.as_str()).collect();
    for total in totals.iter().filter(|t| !known.contains(t.code.as_str())) {
        features.push(feature(&total.code, &total.code, &Value::Null, Some(total)));
    }
    features
}

fn choropleth(
    features: Vec<Value>,
    field: &str,
    title: &str,
    legend: &str,
    range: [&str; 3],
    map_title: &str,
) -> Value {
    let max = features
        .iter()
        .filter_map(|f| f["properties"][field].as_u64())
        .max()
        .unwrap_or(0)
        .max(1);

    top_level(json!({
        "data": {"values": features},
        "mark": {"type": "geoshape", "stroke": "black", "strokeWidth": 0.2},
        "encoding": {
            "color": {
                "field": format!("properties.{}", field),
                "type": "quantitative",
                // log scale cannot start at 0, hence domain from 1 with clamping
                "scale": {"type": "log", "domain": [1, max], "range": range, "clamp": true},
                "legend": {"title": legend}
            },
            "tooltip": [
                {"field": "properties.NAME", "type": "nominal", "title": "Country"},
                {"field": format!("properties.{}", field), "type": "quantitative", "title": title}
            ]
        },
        "projection": {"type": "equalEarth"},
        "title": map_title,
        "height": MAP_HEIGHT,
        "width": "container",
        "autosize": autosize()
    }))
}

pub fn country_changes(totals: &[CountryTotal], countries: &CountryIndex) -> Result<Value, ChartError> {
    Ok(choropleth(
        country_features(totals, countries),
        "total_changes",
        "Total changed elements",
        "Number of changed elements",
        ["#fff", "#fff1f3", CHANGES_COLOR],
        "Changes Distribution by Country",
    ))
}

pub fn country_contributors(totals: &[CountryTotal], countries: &CountryIndex) -> Result<Value, ChartError> {
    Ok(choropleth(
        country_features(totals, countries),
        "total_users",
        "Total contributors",
        "Number of contributors",
        ["#fff", "#f1f7ff", USERS_COLOR],
        "Contributors Distribution by Country",
    ))
}

/// Plain records; the table library reads the field names directly
pub fn country_ranking(rows: &[RankingRow]) -> Result<Value, ChartError> {
    values("country_ranking", rows)
}

pub fn countries_timeline(points: &[TimelinePoint]) -> Result<Value, ChartError> {
    let mut legend_order: Vec<(usize, &str)> = points.iter().map(|p| (p.rank, p.name.as_str())).collect();
    legend_order.sort();
    legend_order.dedup();
    let legend_order: Vec<&str> = legend_order.into_iter().map(|(_, name)| name).collect();

    Ok(top_level(json!({
        "data": {"values": values("countries_timeline", points)?},
        "mark": {"type": "area", "interpolate": "basis"},
        "encoding": {
            "x": {"field": "month", "type": "temporal", "title": null},
            "y": {"field": "total_changes", "type": "quantitative", "title": "Total changed elements"},
            "color": {"field": "NAME", "type": "nominal", "sort": legend_order, "title": "Countries"},
            "tooltip": [
                {"field": "NAME", "type": "nominal", "title": "Country"},
                {"field": "total_changes", "type": "quantitative", "title": "Total changed elements"},
                {"field": "month", "type": "temporal", "timeUnit": "yearmonth", "title": "Date"}
            ],
            "order": {"field": "rank", "type": "ordinal", "sort": "descending"}
        },
        "height": MAP_HEIGHT,
        "width": "container",
        "autosize": autosize()
    })))
}

pub fn user_contributions(spans: &[UserSpan]) -> Result<Value, ChartError> {
    let max = spans.iter().map(|s| s.total_changes).max().unwrap_or(0).max(1);
    let domain = json!([1, max]);

    Ok(top_level(json!({
        "data": {"values": values("user_contributions", spans)?},
        "params": [{"name": "zoom", "select": "interval", "bind": "scales"}],
        "mark": "circle",
        "encoding": {
            "x": {"field": "first_changeset", "type": "temporal", "title": "First contribution"},
            "y": {"field": "last_changeset", "type": "temporal", "title": "Last contribution"},
            "size": {"field": "total_changes", "type": "quantitative", "scale": {"domain": domain}},
            "color": {
                "field": "total_changes",
                "type": "quantitative",
                "title": "Total changed elements",
                "scale": {"range": ["red", "green"], "domain": domain}
            },
            "tooltip": [
                {"field": "user", "type": "nominal", "title": "Contributor"},
                {"field": "first_changeset", "type": "temporal", "title": "First contribution"},
                {"field": "last_changeset", "type": "temporal", "title": "Last contribution"},
                {"field": "total_changes", "type": "quantitative", "title": "Total changed elements"}
            ]
        },
        "config": {"scale": {"minSize": 30}},
        "height": MAP_HEIGHT,
        "width": "container",
        "autosize": autosize()
    })))
}
