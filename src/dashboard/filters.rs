//! Dashboard filter parameters as they arrive from query strings and the CLI
//!
//! Every field is optional text. Empty text means "no constraint", and so does
//! the `all` sentinel on the enumerated fields. Bare dates widen to the whole
//! day: a start date begins at 00:00:00.000 UTC, an end date runs through
//! 23:59:59.999 UTC.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::BotCategory;
use crate::storage::VisitFilter;

pub const ALL: &str = "all";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FilterError {
    #[error("invalid {field} '{value}': expected YYYY-MM-DD or an RFC 3339 timestamp")]
    InvalidDate { field: &'static str, value: String },
    #[error("invalid {field} '{value}': expected all, true or false")]
    InvalidFlag { field: &'static str, value: String },
    #[error("invalid bot_category '{0}': expected all, unknown, good, bad or monitored")]
    InvalidCategory(String),
    #[error("invalid {field} '{value}': expected an integer")]
    InvalidScore { field: &'static str, value: String },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterParams {
    pub bot_name: Option<String>,
    pub ip: Option<String>,
    pub url: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub country: Option<String>,
    pub city: Option<String>,
    pub min_anomaly_score: Option<String>,
    pub max_anomaly_score: Option<String>,
    pub is_anomaly: Option<String>,
    pub is_blocked: Option<String>,
    pub os: Option<String>,
    pub browser: Option<String>,
    pub bot_category: Option<String>,
}

#[derive(Clone, Copy)]
enum Bound {
    Start,
    End,
}

/// Trimmed value, `None` when empty
fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// Like [`present`], also `None` for the `all` sentinel
fn selected(value: &Option<String>) -> Option<&str> {
    present(value).filter(|v| !v.eq_ignore_ascii_case(ALL))
}

fn parse_bound(
    field: &'static str,
    value: &Option<String>,
    bound: Bound,
) -> Result<Option<i64>, FilterError> {
    let Some(raw) = present(value) else {
        return Ok(None);
    };

    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        let time = match bound {
            Bound::Start => NaiveTime::default(),
            Bound::End => NaiveTime::from_hms_milli_opt(23, 59, 59, 999).unwrap_or_default(),
        };
        return Ok(Some(date.and_time(time).and_utc().timestamp_millis()));
    }

    if let Ok(instant) = DateTime::parse_from_rfc3339(raw) {
        return Ok(Some(instant.timestamp_millis()));
    }

    // datetime-local inputs carry no offset; read them as UTC
    for format in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Ok(Some(naive.and_utc().timestamp_millis()));
        }
    }

    Err(FilterError::InvalidDate {
        field,
        value: raw.to_string(),
    })
}

fn parse_flag(field: &'static str, value: &Option<String>) -> Result<Option<bool>, FilterError> {
    match selected(value) {
        None => Ok(None),
        Some(v) if v.eq_ignore_ascii_case("true") => Ok(Some(true)),
        Some(v) if v.eq_ignore_ascii_case("false") => Ok(Some(false)),
        Some(v) => Err(FilterError::InvalidFlag {
            field,
            value: v.to_string(),
        }),
    }
}

fn parse_score(field: &'static str, value: &Option<String>) -> Result<Option<i64>, FilterError> {
    present(value)
        .map(|v| {
            v.parse::<i64>().map_err(|_| FilterError::InvalidScore {
                field,
                value: v.to_string(),
            })
        })
        .transpose()
}

impl FilterParams {
    pub fn to_filter(&self) -> Result<VisitFilter, FilterError> {
        let bot_category = selected(&self.bot_category)
            .map(|v| {
                v.parse::<BotCategory>()
                    .map_err(|_| FilterError::InvalidCategory(v.to_string()))
            })
            .transpose()?;

        Ok(VisitFilter {
            bot_name: present(&self.bot_name).map(str::to_string),
            ip: present(&self.ip).map(str::to_string),
            url: present(&self.url).map(str::to_string),
            start: parse_bound("start_date", &self.start_date, Bound::Start)?,
            end: parse_bound("end_date", &self.end_date, Bound::End)?,
            country: present(&self.country).map(str::to_string),
            city: present(&self.city).map(str::to_string),
            min_anomaly_score: parse_score("min_anomaly_score", &self.min_anomaly_score)?,
            max_anomaly_score: parse_score("max_anomaly_score", &self.max_anomaly_score)?,
            is_anomaly: parse_flag("is_anomaly", &self.is_anomaly)?,
            is_blocked: parse_flag("is_blocked", &self.is_blocked)?,
            os: selected(&self.os).map(str::to_string),
            browser: selected(&self.browser).map(str::to_string),
            bot_category,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> FilterParams {
        FilterParams::default()
    }

    #[test]
    fn test_empty_params_give_empty_filter() {
        assert!(params().to_filter().unwrap().is_empty());
    }

    #[test]
    fn test_all_sentinel_means_no_constraint() {
        let p = FilterParams {
            is_anomaly: Some("all".into()),
            is_blocked: Some("ALL".into()),
            os: Some("all".into()),
            browser: Some("all".into()),
            bot_category: Some("all".into()),
            ..params()
        };
        assert!(p.to_filter().unwrap().is_empty());
    }

    #[test]
    fn test_end_date_covers_whole_day() {
        let p = FilterParams {
            start_date: Some("2024-01-15".into()),
            end_date: Some("2024-01-15".into()),
            ..params()
        };
        let filter = p.to_filter().unwrap();
        // 2024-01-15T00:00:00.000Z and 2024-01-15T23:59:59.999Z
        assert_eq!(filter.start, Some(1_705_276_800_000));
        assert_eq!(filter.end, Some(1_705_363_199_999));
    }

    #[test]
    fn test_rfc3339_used_as_given() {
        let p = FilterParams {
            end_date: Some("2024-01-15T12:00:00+02:00".into()),
            ..params()
        };
        assert_eq!(p.to_filter().unwrap().end, Some(1_705_312_800_000));
    }

    #[test]
    fn test_flags_and_category() {
        let p = FilterParams {
            is_anomaly: Some("true".into()),
            is_blocked: Some("false".into()),
            bot_category: Some("monitored".into()),
            min_anomaly_score: Some(" 40 ".into()),
            ..params()
        };
        let filter = p.to_filter().unwrap();
        assert_eq!(filter.is_anomaly, Some(true));
        assert_eq!(filter.is_blocked, Some(false));
        assert_eq!(filter.bot_category, Some(BotCategory::Monitored));
        assert_eq!(filter.min_anomaly_score, Some(40));
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let bad_date = FilterParams {
            start_date: Some("15/01/2024".into()),
            ..params()
        };
        assert!(matches!(
            bad_date.to_filter(),
            Err(FilterError::InvalidDate { field: "start_date", .. })
        ));

        let bad_flag = FilterParams {
            is_blocked: Some("yes".into()),
            ..params()
        };
        assert!(matches!(
            bad_flag.to_filter(),
            Err(FilterError::InvalidFlag { field: "is_blocked", .. })
        ));

        let bad_category = FilterParams {
            bot_category: Some("evil".into()),
            ..params()
        };
        assert_eq!(
            bad_category.to_filter(),
            Err(FilterError::InvalidCategory("evil".into()))
        );

        let bad_score = FilterParams {
            max_anomaly_score: Some("high".into()),
            ..params()
        };
        assert!(matches!(
            bad_score.to_filter(),
            Err(FilterError::InvalidScore { .. })
        ));
    }
}
