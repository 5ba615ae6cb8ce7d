use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Operator-assigned classification of a client, applied per IP
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BotCategory {
    #[default]
    Unknown,
    Good,
    Bad,
    Monitored,
}

impl BotCategory {
    pub const ALL: [BotCategory; 4] = [
        BotCategory::Unknown,
        BotCategory::Good,
        BotCategory::Bad,
        BotCategory::Monitored,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BotCategory::Unknown => "unknown",
            BotCategory::Good => "good",
            BotCategory::Bad => "bad",
            BotCategory::Monitored => "monitored",
        }
    }
}

impl fmt::Display for BotCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BotCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BotCategory::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| format!("unknown bot category '{s}'"))
    }
}

/// One logged request from a classified bot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisitRecord {
    pub id: i64,
    pub url: String,
    pub bot_name: Option<String>,
    pub user_agent: String,
    pub ip: String,
    /// Unix timestamp in milliseconds, set once by the visit logger
    pub timestamp: i64,
    pub referrer: Option<String>,
    pub page_title: Option<String>,
    pub country: Option<String>,
    pub city: Option<String>,
    pub session_id: Option<String>,
    pub os: Option<String>,
    pub browser: Option<String>,
    pub is_anomaly: bool,
    pub anomaly_reasons: Vec<String>,
    pub anomaly_score: Option<i64>,
    pub is_blocked: bool,
    pub bot_category: BotCategory,
    pub page_load_time: Option<f64>,
    pub server_response_time: Option<f64>,
    pub visited_pages: Vec<String>,
    pub is_user: bool,
}

/// Everything the storage layer needs to persist a visit; `id` is assigned on insert
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewVisit {
    pub url: String,
    pub bot_name: Option<String>,
    pub user_agent: String,
    pub ip: String,
    pub timestamp: i64,
    pub referrer: Option<String>,
    pub page_title: Option<String>,
    pub country: Option<String>,
    pub city: Option<String>,
    pub session_id: Option<String>,
    pub os: Option<String>,
    pub browser: Option<String>,
    pub is_anomaly: bool,
    pub anomaly_reasons: Vec<String>,
    pub anomaly_score: Option<i64>,
    pub is_blocked: bool,
    pub bot_category: BotCategory,
    pub page_load_time: Option<f64>,
    pub server_response_time: Option<f64>,
    pub visited_pages: Vec<String>,
    pub is_user: bool,
}

impl NewVisit {
    pub fn into_record(self, id: i64) -> VisitRecord {
        VisitRecord {
            id,
            url: self.url,
            bot_name: self.bot_name,
            user_agent: self.user_agent,
            ip: self.ip,
            timestamp: self.timestamp,
            referrer: self.referrer,
            page_title: self.page_title,
            country: self.country,
            city: self.city,
            session_id: self.session_id,
            os: self.os,
            browser: self.browser,
            is_anomaly: self.is_anomaly,
            anomaly_reasons: self.anomaly_reasons,
            anomaly_score: self.anomaly_score,
            is_blocked: self.is_blocked,
            bot_category: self.bot_category,
            page_load_time: self.page_load_time,
            server_response_time: self.server_response_time,
            visited_pages: self.visited_pages,
            is_user: self.is_user,
        }
    }
}

/// Row of the plain visit widget; logged for every page view regardless of bot status
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct UserVisit {
    pub id: i64,
    pub url: String,
    pub referrer: Option<String>,
    pub user_agent: Option<String>,
    pub session_id: String,
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewUserVisit {
    pub url: String,
    pub referrer: Option<String>,
    pub user_agent: Option<String>,
    pub session_id: String,
    pub timestamp: i64,
}
