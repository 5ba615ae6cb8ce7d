//! Backend-neutral filter predicates for `bot_logs` queries
//!
//! The count query and the row query are built from the same predicate list
//! so a page count derived from one always agrees with the other.

use serde::{Deserialize, Serialize};

use crate::models::BotCategory;

/// Conjunction of optional predicates over visit records; `None` means no constraint
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VisitFilter {
    /// Case-insensitive substring of `bot_name`
    pub bot_name: Option<String>,
    /// Case-insensitive substring of `ip`
    pub ip: Option<String>,
    /// Case-insensitive substring of `url`
    pub url: Option<String>,
    /// Inclusive lower bound, Unix milliseconds
    pub start: Option<i64>,
    /// Inclusive upper bound, Unix milliseconds
    pub end: Option<i64>,
    pub country: Option<String>,
    pub city: Option<String>,
    pub min_anomaly_score: Option<i64>,
    pub max_anomaly_score: Option<i64>,
    pub is_anomaly: Option<bool>,
    pub is_blocked: Option<bool>,
    /// Exact match
    pub os: Option<String>,
    /// Exact match
    pub browser: Option<String>,
    pub bot_category: Option<BotCategory>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    pub fn as_sql(&self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    Text(String),
    Flag(bool),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// `column` contains the pattern, case-insensitively; the pattern is
    /// already wrapped in `%` with `\`, `%` and `_` escaped
    Contains {
        column: &'static str,
        pattern: String,
    },
    AtLeast {
        column: &'static str,
        value: i64,
    },
    AtMost {
        column: &'static str,
        value: i64,
    },
    Equals {
        column: &'static str,
        value: FilterValue,
    },
}

/// Wrap `needle` in `%` for LIKE, escaping wildcard characters with `\`
pub fn like_pattern(needle: &str) -> String {
    let mut pattern = String::with_capacity(needle.len() + 2);
    pattern.push('%');
    for c in needle.chars() {
        if matches!(c, '\\' | '%' | '_') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

impl VisitFilter {
    pub fn is_empty(&self) -> bool {
        self.predicates().is_empty()
    }

    /// Predicates in a fixed column order
    pub fn predicates(&self) -> Vec<Predicate> {
        let mut out = Vec::new();

        let contains = [
            ("bot_name", &self.bot_name),
            ("ip", &self.ip),
            ("url", &self.url),
            ("country", &self.country),
            ("city", &self.city),
        ];
        for (column, needle) in contains {
            if let Some(needle) = needle.as_deref().filter(|n| !n.is_empty()) {
                out.push(Predicate::Contains {
                    column,
                    pattern: like_pattern(needle),
                });
            }
        }

        if let Some(start) = self.start {
            out.push(Predicate::AtLeast {
                column: "timestamp",
                value: start,
            });
        }
        if let Some(end) = self.end {
            out.push(Predicate::AtMost {
                column: "timestamp",
                value: end,
            });
        }
        if let Some(min) = self.min_anomaly_score {
            out.push(Predicate::AtLeast {
                column: "anomaly_score",
                value: min,
            });
        }
        if let Some(max) = self.max_anomaly_score {
            out.push(Predicate::AtMost {
                column: "anomaly_score",
                value: max,
            });
        }

        if let Some(flag) = self.is_anomaly {
            out.push(Predicate::Equals {
                column: "is_anomaly",
                value: FilterValue::Flag(flag),
            });
        }
        if let Some(flag) = self.is_blocked {
            out.push(Predicate::Equals {
                column: "is_blocked",
                value: FilterValue::Flag(flag),
            });
        }
        if let Some(os) = &self.os {
            out.push(Predicate::Equals {
                column: "os",
                value: FilterValue::Text(os.clone()),
            });
        }
        if let Some(browser) = &self.browser {
            out.push(Predicate::Equals {
                column: "browser",
                value: FilterValue::Text(browser.clone()),
            });
        }
        if let Some(category) = self.bot_category {
            out.push(Predicate::Equals {
                column: "bot_category",
                value: FilterValue::Text(category.as_str().to_string()),
            });
        }

        out
    }
}
