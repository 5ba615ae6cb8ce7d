use sqlx::FromRow;

use crate::models::{BotCategory, VisitRecord};
use crate::storage::StorageError;

pub(crate) const VISIT_COLUMNS: &str = "id, url, bot_name, user_agent, ip, timestamp, referrer, \
     page_title, country, city, session_id, os, browser, is_anomaly, anomaly_reasons, \
     anomaly_score, is_blocked, bot_category, page_load_time, server_response_time, \
     visited_pages, is_user";

/// `bot_logs` row as stored; list columns are JSON text, the category is text
#[derive(Debug, FromRow)]
pub(crate) struct VisitRow {
    pub id: i64,
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
    pub anomaly_reasons: String,
    pub anomaly_score: Option<i64>,
    pub is_blocked: bool,
    pub bot_category: String,
    pub page_load_time: Option<f64>,
    pub server_response_time: Option<f64>,
    pub visited_pages: String,
    pub is_user: bool,
}

fn decode_list(column: &str, id: i64, raw: &str) -> Result<Vec<String>, StorageError> {
    if raw.is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(raw)
        .map_err(|e| StorageError::Corrupt(format!("bot_logs.{column} of row {id}: {e}")))
}

pub(crate) fn encode_list(values: &[String]) -> String {
    // Vec<String> always serializes
    serde_json::to_string(values).unwrap_or_else(|_| "[]".to_string())
}

impl TryFrom<VisitRow> for VisitRecord {
    type Error = StorageError;

    fn try_from(row: VisitRow) -> Result<Self, Self::Error> {
        let anomaly_reasons = decode_list("anomaly_reasons", row.id, &row.anomaly_reasons)?;
        let visited_pages = decode_list("visited_pages", row.id, &row.visited_pages)?;
        let bot_category = row
            .bot_category
            .parse::<BotCategory>()
            .map_err(|e| StorageError::Corrupt(format!("bot_logs.bot_category of row {}: {e}", row.id)))?;

        Ok(VisitRecord {
            id: row.id,
            url: row.url,
            bot_name: row.bot_name,
            user_agent: row.user_agent,
            ip: row.ip,
            timestamp: row.timestamp,
            referrer: row.referrer,
            page_title: row.page_title,
            country: row.country,
            city: row.city,
            session_id: row.session_id,
            os: row.os,
            browser: row.browser,
            is_anomaly: row.is_anomaly,
            anomaly_reasons,
            anomaly_score: row.anomaly_score,
            is_blocked: row.is_blocked,
            bot_category,
            page_load_time: row.page_load_time,
            server_response_time: row.server_response_time,
            visited_pages,
            is_user: row.is_user,
        })
    }
}

pub(crate) fn into_records(rows: Vec<VisitRow>) -> Result<Vec<VisitRecord>, StorageError> {
    rows.into_iter().map(VisitRecord::try_from).collect()
}
