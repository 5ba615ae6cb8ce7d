//! Chart data derived from a filtered sequence of visits
//!
//! Every function here is pure and deterministic: groups appear in the order
//! their first record appears, and sorts are stable, so equal counts keep
//! that order.

use chrono::{DateTime, Utc};
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::collections::HashMap;

use crate::models::VisitRecord;

/// Label for records missing the grouped field
pub const UNKNOWN: &str = "unknown";

/// Bot name excluded from the top pages view
pub const HUMAN: &str = "Human";

const TOP_N: usize = 10;

struct OrderedGroups<T> {
    index: HashMap<String, usize>,
    groups: Vec<T>,
}

impl<T> OrderedGroups<T> {
    fn new() -> Self {
        Self {
            index: HashMap::new(),
            groups: Vec::new(),
        }
    }

    fn entry(&mut self, key: &str, init: impl FnOnce() -> T) -> &mut T {
        let idx = match self.index.get(key) {
            Some(&idx) => idx,
            None => {
                self.groups.push(init());
                self.index.insert(key.to_string(), self.groups.len() - 1);
                self.groups.len() - 1
            }
        };
        &mut self.groups[idx]
    }

    fn into_vec(self) -> Vec<T> {
        self.groups
    }
}

fn bot_label(record: &VisitRecord) -> &str {
    record
        .bot_name
        .as_deref()
        .filter(|name| !name.is_empty())
        .unwrap_or(UNKNOWN)
}

fn country_label(record: &VisitRecord) -> &str {
    record
        .country
        .as_deref()
        .filter(|country| !country.is_empty())
        .unwrap_or(UNKNOWN)
}

fn datetime(timestamp_ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(timestamp_ms).unwrap_or_default()
}

/// UTC calendar day, `YYYY-MM-DD`
pub fn day_key(timestamp_ms: i64) -> String {
    datetime(timestamp_ms).format("%Y-%m-%d").to_string()
}

/// UTC hour, `YYYY-MM-DD HH:00`
pub fn hour_key(timestamp_ms: i64) -> String {
    datetime(timestamp_ms).format("%Y-%m-%d %H:00").to_string()
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BotDistribution {
    pub name: String,
    pub total_count: u64,
    pub anomaly_count: u64,
    pub regular_count: u64,
}

pub fn bot_distribution(records: &[VisitRecord]) -> Vec<BotDistribution> {
    let mut groups = OrderedGroups::new();
    for record in records {
        let name = bot_label(record);
        let group = groups.entry(name, || BotDistribution {
            name: name.to_string(),
            total_count: 0,
            anomaly_count: 0,
            regular_count: 0,
        });
        group.total_count += 1;
        if record.is_anomaly {
            group.anomaly_count += 1;
        } else {
            group.regular_count += 1;
        }
    }
    groups.into_vec()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    #[default]
    Daily,
    Hourly,
}

impl Granularity {
    pub fn bucket(&self, timestamp_ms: i64) -> String {
        match self {
            Granularity::Daily => day_key(timestamp_ms),
            Granularity::Hourly => hour_key(timestamp_ms),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BotTally {
    pub name: String,
    pub total: u64,
    pub anomaly: u64,
    pub regular: u64,
}

/// One time bucket; serializes flat as
/// `{"time": .., "<bot>_total": .., "<bot>_anomaly": .., "<bot>_regular": ..}`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeBucket {
    pub time: String,
    pub bots: Vec<BotTally>,
}

impl Serialize for TimeBucket {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1 + self.bots.len() * 3))?;
        map.serialize_entry("time", &self.time)?;
        for bot in &self.bots {
            map.serialize_entry(&format!("{}_total", bot.name), &bot.total)?;
            map.serialize_entry(&format!("{}_anomaly", bot.name), &bot.anomaly)?;
            map.serialize_entry(&format!("{}_regular", bot.name), &bot.regular)?;
        }
        map.end()
    }
}

/// Buckets ascending by key; zero-padded keys sort chronologically
pub fn time_series(records: &[VisitRecord], granularity: Granularity) -> Vec<TimeBucket> {
    let mut buckets: OrderedGroups<(TimeBucket, OrderedGroups<BotTally>)> = OrderedGroups::new();

    for record in records {
        let time = granularity.bucket(record.timestamp);
        let (_, bots) = buckets.entry(&time, || {
            (
                TimeBucket {
                    time: time.clone(),
                    bots: Vec::new(),
                },
                OrderedGroups::new(),
            )
        });

        let name = bot_label(record);
        let tally = bots.entry(name, || BotTally {
            name: name.to_string(),
            total: 0,
            anomaly: 0,
            regular: 0,
        });
        tally.total += 1;
        if record.is_anomaly {
            tally.anomaly += 1;
        } else {
            tally.regular += 1;
        }
    }

    let mut series: Vec<TimeBucket> = buckets
        .into_vec()
        .into_iter()
        .map(|(mut bucket, bots)| {
            bucket.bots = bots.into_vec();
            bucket
        })
        .collect();
    series.sort_by(|a, b| a.time.cmp(&b.time));
    series
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CountEntry {
    pub name: String,
    pub count: u64,
}

fn top_counts<'a>(keys: impl Iterator<Item = &'a str>) -> Vec<CountEntry> {
    let mut groups = OrderedGroups::new();
    for key in keys {
        groups
            .entry(key, || CountEntry {
                name: key.to_string(),
                count: 0,
            })
            .count += 1;
    }
    let mut entries = groups.into_vec();
    entries.sort_by(|a, b| b.count.cmp(&a.count));
    entries.truncate(TOP_N);
    entries
}

/// Top 10 countries by visit count
pub fn geo_distribution(records: &[VisitRecord]) -> Vec<CountEntry> {
    top_counts(records.iter().map(country_label))
}

/// Top 10 URLs by visit count, ignoring `Human` records
pub fn top_pages(records: &[VisitRecord]) -> Vec<CountEntry> {
    top_counts(
        records
            .iter()
            .filter(|r| r.bot_name.as_deref() != Some(HUMAN))
            .map(|r| if r.url.is_empty() { UNKNOWN } else { r.url.as_str() }),
    )
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnomalyPoint {
    pub time: String,
    /// Mean anomaly score of the day, two decimals; missing scores count as 0
    pub avg_score: f64,
}

pub fn anomaly_trend(records: &[VisitRecord]) -> Vec<AnomalyPoint> {
    let mut days: OrderedGroups<(String, i64, u64)> = OrderedGroups::new();
    for record in records {
        let day = day_key(record.timestamp);
        let entry = days.entry(&day, || (day.clone(), 0, 0));
        entry.1 += record.anomaly_score.unwrap_or(0);
        entry.2 += 1;
    }

    let mut points: Vec<AnomalyPoint> = days
        .into_vec()
        .into_iter()
        .map(|(time, total, count)| AnomalyPoint {
            time,
            avg_score: round2(total as f64 / count as f64),
        })
        .collect();
    points.sort_by(|a, b| a.time.cmp(&b.time));
    points
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    Rising,
    Falling,
    Stable,
    InsufficientData,
}

impl Trend {
    pub fn message(&self) -> &'static str {
        match self {
            Trend::Rising => "anomaly score is rising noticeably",
            Trend::Falling => "anomaly score is falling",
            Trend::Stable => "anomaly score is stable",
            Trend::InsufficientData => "insufficient data",
        }
    }
}

/// Compare the last day's mean score with the day before it
pub fn classify_trend(points: &[AnomalyPoint]) -> Trend {
    let [.., previous, current] = points else {
        return Trend::InsufficientData;
    };

    if current.avg_score > previous.avg_score * 1.2 {
        Trend::Rising
    } else if current.avg_score < previous.avg_score * 0.8 {
        Trend::Falling
    } else {
        Trend::Stable
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformancePoint {
    pub time: String,
    pub avg_page_load_time: f64,
    pub avg_server_response_time: f64,
}

/// Daily mean page load and server response times; missing values count as 0
pub fn performance_metrics(records: &[VisitRecord]) -> Vec<PerformancePoint> {
    let mut days: OrderedGroups<(String, f64, f64, u64)> = OrderedGroups::new();
    for record in records {
        let day = day_key(record.timestamp);
        let entry = days.entry(&day, || (day.clone(), 0.0, 0.0, 0));
        entry.1 += record.page_load_time.unwrap_or(0.0);
        entry.2 += record.server_response_time.unwrap_or(0.0);
        entry.3 += 1;
    }

    let mut points: Vec<PerformancePoint> = days
        .into_vec()
        .into_iter()
        .map(|(time, load, response, count)| PerformancePoint {
            time,
            avg_page_load_time: round2(load / count as f64),
            avg_server_response_time: round2(response / count as f64),
        })
        .collect();
    points.sort_by(|a, b| a.time.cmp(&b.time));
    points
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CountryBot {
    pub name: String,
    pub count: u64,
    pub anomaly_count: u64,
}

/// Per-bot counts of one country (`unknown` selects records without a country)
pub fn country_breakdown(records: &[VisitRecord], country: &str) -> Vec<CountryBot> {
    let mut groups = OrderedGroups::new();
    for record in records.iter().filter(|r| country_label(r) == country) {
        let name = bot_label(record);
        let group = groups.entry(name, || CountryBot {
            name: name.to_string(),
            count: 0,
            anomaly_count: 0,
        });
        group.count += 1;
        if record.is_anomaly {
            group.anomaly_count += 1;
        }
    }
    groups.into_vec()
}

/// Every chart of the dashboard for one filtered record set
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartSet {
    pub bot_distribution: Vec<BotDistribution>,
    pub time_series: Vec<TimeBucket>,
    pub geo_distribution: Vec<CountEntry>,
    pub top_pages: Vec<CountEntry>,
    pub anomaly_trend: Vec<AnomalyPoint>,
    pub trend: Trend,
    pub trend_message: &'static str,
    pub performance: Vec<PerformancePoint>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country_breakdown: Option<Vec<CountryBot>>,
}

impl ChartSet {
    pub fn build(records: &[VisitRecord], granularity: Granularity, country: Option<&str>) -> Self {
        let anomaly_trend = anomaly_trend(records);
        let trend = classify_trend(&anomaly_trend);

        Self {
            bot_distribution: bot_distribution(records),
            time_series: time_series(records, granularity),
            geo_distribution: geo_distribution(records),
            top_pages: top_pages(records),
            anomaly_trend,
            trend,
            trend_message: trend.message(),
            performance: performance_metrics(records),
            country_breakdown: country.map(|c| country_breakdown(records, c)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewVisit;

    const DAY_MS: i64 = 86_400_000;
    // 2024-01-15T00:00:00Z
    const JAN_15: i64 = 1_705_276_800_000;

    fn visit(bot: Option<&str>, timestamp: i64) -> VisitRecord {
        NewVisit {
            url: "/".to_string(),
            bot_name: bot.map(str::to_string),
            timestamp,
            ..Default::default()
        }
        .into_record(0)
    }

    #[test]
    fn test_bot_distribution_counts_add_up() {
        let mut records = vec![
            visit(Some("Googlebot"), JAN_15),
            visit(Some("GPTBot"), JAN_15),
            visit(Some("Googlebot"), JAN_15),
            visit(None, JAN_15),
        ];
        records[2].is_anomaly = true;

        let groups = bot_distribution(&records);
        let names: Vec<_> = groups.iter().map(|g| g.name.as_str()).collect();
        assert_eq!(names, ["Googlebot", "GPTBot", "unknown"]);
        for group in &groups {
            assert_eq!(group.anomaly_count + group.regular_count, group.total_count);
        }
        assert_eq!(
            groups.iter().map(|g| g.total_count).sum::<u64>(),
            records.len() as u64
        );
        assert_eq!(groups[0].anomaly_count, 1);
    }

    #[test]
    fn test_time_series_daily_sorted_and_flattened() {
        let mut records = vec![
            visit(Some("GPTBot"), JAN_15 + DAY_MS),
            visit(Some("Googlebot"), JAN_15 + 3_600_000),
            visit(Some("Googlebot"), JAN_15 + 7_200_000),
        ];
        records[2].is_anomaly = true;

        let series = time_series(&records, Granularity::Daily);
        assert_eq!(series.len(), 2);
        assert_eq!(series[0].time, "2024-01-15");
        assert_eq!(series[1].time, "2024-01-16");

        let json = serde_json::to_value(&series[0]).unwrap();
        assert_eq!(json["time"], "2024-01-15");
        assert_eq!(json["Googlebot_total"], 2);
        assert_eq!(json["Googlebot_anomaly"], 1);
        assert_eq!(json["Googlebot_regular"], 1);
    }

    #[test]
    fn test_time_series_hourly_keys() {
        let records = vec![visit(Some("Googlebot"), JAN_15 + 9 * 3_600_000 + 59_000)];
        let series = time_series(&records, Granularity::Hourly);
        assert_eq!(series[0].time, "2024-01-15 09:00");
    }

    #[test]
    fn test_geo_distribution_top_ten_with_unknown() {
        let mut records = Vec::new();
        for i in 0..12 {
            for _ in 0..=i {
                let mut r = visit(Some("Googlebot"), JAN_15);
                r.country = Some(format!("Country {i}"));
                records.push(r);
            }
        }
        records.push(visit(Some("Googlebot"), JAN_15));

        let geo = geo_distribution(&records);
        assert_eq!(geo.len(), 10);
        assert_eq!(geo[0].name, "Country 11");
        assert_eq!(geo[0].count, 12);
        assert!(geo.iter().all(|e| e.name != UNKNOWN));

        let only_unknown = geo_distribution(&[visit(None, JAN_15)]);
        assert_eq!(only_unknown[0].name, UNKNOWN);
    }

    #[test]
    fn test_top_pages_skip_human() {
        let mut human = visit(Some(HUMAN), JAN_15);
        human.url = "/home".to_string();
        let mut bot = visit(Some("Bingbot"), JAN_15);
        bot.url = "/docs".to_string();

        let pages = top_pages(&[human.clone(), human, bot]);
        assert_eq!(
            pages,
            vec![CountEntry {
                name: "/docs".to_string(),
                count: 1
            }]
        );
    }

    #[test]
    fn test_anomaly_trend_treats_missing_score_as_zero() {
        let mut a = visit(Some("Googlebot"), JAN_15);
        a.anomaly_score = Some(10);
        let b = visit(Some("Googlebot"), JAN_15);
        let mut c = visit(Some("Googlebot"), JAN_15);
        c.anomaly_score = Some(5);

        let trend = anomaly_trend(&[a, b, c]);
        assert_eq!(trend.len(), 1);
        assert_eq!(trend[0].avg_score, 5.0);
    }

    #[test]
    fn test_classify_trend() {
        let point = |time: &str, avg_score: f64| AnomalyPoint {
            time: time.to_string(),
            avg_score,
        };

        assert_eq!(classify_trend(&[]), Trend::InsufficientData);
        assert_eq!(
            classify_trend(&[point("2024-01-15", 10.0)]),
            Trend::InsufficientData
        );
        assert_eq!(
            classify_trend(&[point("2024-01-15", 10.0), point("2024-01-16", 12.5)]),
            Trend::Rising
        );
        assert_eq!(
            classify_trend(&[point("2024-01-15", 10.0), point("2024-01-16", 7.9)]),
            Trend::Falling
        );
        assert_eq!(
            classify_trend(&[
                point("2024-01-14", 50.0),
                point("2024-01-15", 10.0),
                point("2024-01-16", 12.0)
            ]),
            Trend::Stable
        );
    }

    #[test]
    fn test_performance_metrics_average_per_day() {
        let mut a = visit(Some("Googlebot"), JAN_15);
        a.page_load_time = Some(1.0);
        a.server_response_time = Some(0.5);
        let b = visit(Some("Googlebot"), JAN_15);

        let metrics = performance_metrics(&[a, b]);
        assert_eq!(metrics[0].avg_page_load_time, 0.5);
        assert_eq!(metrics[0].avg_server_response_time, 0.25);
    }

    #[test]
    fn test_country_breakdown() {
        let mut a = visit(Some("Googlebot"), JAN_15);
        a.country = Some("Turkey".to_string());
        a.is_anomaly = true;
        let mut b = visit(Some("Googlebot"), JAN_15);
        b.country = Some("Germany".to_string());

        let breakdown = country_breakdown(&[a, b], "Turkey");
        assert_eq!(
            breakdown,
            vec![CountryBot {
                name: "Googlebot".to_string(),
                count: 1,
                anomaly_count: 1
            }]
        );
    }
}
