//! Summaries of stored mention checks for the dashboard

use chrono::DateTime;
use serde::Serialize;
use std::collections::HashMap;

use crate::models::MentionRecord;

const RANKING_LIMIT: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelScore {
    pub model: String,
    /// Rounded mean over every check of this model
    pub average_score: i64,
}

/// Mean score per model, in order of each model's first check
pub fn model_performance(mentions: &[MentionRecord]) -> Vec<ModelScore> {
    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut totals: Vec<(&str, i64, i64)> = Vec::new();

    for mention in mentions.iter().filter(|m| !m.model.is_empty()) {
        let idx = *index.entry(mention.model.as_str()).or_insert_with(|| {
            totals.push((mention.model.as_str(), 0, 0));
            totals.len() - 1
        });
        totals[idx].1 += mention.score;
        totals[idx].2 += 1;
    }

    totals
        .into_iter()
        .map(|(model, sum, count)| ModelScore {
            model: model.to_string(),
            average_score: (sum as f64 / count as f64).round() as i64,
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BrandScore {
    pub brand: String,
    pub score: i64,
}

/// Top 10 brands by their best score; ties keep first-seen order
pub fn industry_ranking(mentions: &[MentionRecord]) -> Vec<BrandScore> {
    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut best: Vec<BrandScore> = Vec::new();

    for mention in mentions {
        match index.get(mention.brand.as_str()) {
            Some(&idx) => best[idx].score = best[idx].score.max(mention.score),
            None => {
                index.insert(mention.brand.as_str(), best.len());
                best.push(BrandScore {
                    brand: mention.brand.clone(),
                    score: mention.score,
                });
            }
        }
    }

    best.sort_by(|a, b| b.score.cmp(&a.score));
    best.truncate(RANKING_LIMIT);
    best
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WeekCount {
    /// ISO week, `YYYY-Www`
    pub week: String,
    pub count: u64,
}

/// ISO week of a millisecond timestamp, e.g. `2024-W03`
pub fn iso_week(timestamp_ms: i64) -> String {
    DateTime::from_timestamp_millis(timestamp_ms)
        .unwrap_or_default()
        .format("%G-W%V")
        .to_string()
}

/// Checks per ISO week in which the model mentioned `brand`, oldest week first
pub fn visibility_trend(mentions: &[MentionRecord], brand: &str) -> Vec<WeekCount> {
    let mut weeks: HashMap<String, u64> = HashMap::new();
    for mention in mentions
        .iter()
        .filter(|m| m.mentioned && m.brand == brand)
    {
        *weeks.entry(iso_week(mention.created_at)).or_default() += 1;
    }

    let mut trend: Vec<WeekCount> = weeks
        .into_iter()
        .map(|(week, count)| WeekCount { week, count })
        .collect();
    trend.sort_by(|a, b| a.week.cmp(&b.week));
    trend
}

/// Every mention view in one response
#[derive(Debug, Clone, Serialize)]
pub struct MentionStats {
    pub model_performance: Vec<ModelScore>,
    pub industry_ranking: Vec<BrandScore>,
    /// Brand the trend is for; no brand means an empty trend
    pub brand: Option<String>,
    pub visibility_trend: Vec<WeekCount>,
}

impl MentionStats {
    pub fn build(mentions: &[MentionRecord], brand: Option<&str>) -> Self {
        Self {
            model_performance: model_performance(mentions),
            industry_ranking: industry_ranking(mentions),
            brand: brand.map(str::to_string),
            visibility_trend: brand
                .map(|brand| visibility_trend(mentions, brand))
                .unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // 2024-01-15T00:00:00Z, a Monday in ISO week 3
    const JAN_15: i64 = 1_705_276_800_000;
    const DAY_MS: i64 = 86_400_000;

    fn mention(brand: &str, model: &str, score: i64, mentioned: bool, at: i64) -> MentionRecord {
        MentionRecord {
            id: 0,
            brand: brand.to_string(),
            model: model.to_string(),
            prompt: String::new(),
            response: String::new(),
            mentioned,
            score,
            summary: None,
            source_url: None,
            created_at: at,
        }
    }

    #[test]
    fn test_model_performance_rounds_mean() {
        let mentions = vec![
            mention("Ahrefs", "gpt-4o", 80, true, JAN_15),
            mention("Ahrefs", "claude", 40, true, JAN_15),
            mention("Semrush", "gpt-4o", 71, true, JAN_15),
            mention("Semrush", "", 100, true, JAN_15),
        ];

        assert_eq!(
            model_performance(&mentions),
            vec![
                ModelScore {
                    model: "gpt-4o".into(),
                    average_score: 76,
                },
                ModelScore {
                    model: "claude".into(),
                    average_score: 40,
                },
            ]
        );
    }

    #[test]
    fn test_industry_ranking_keeps_best_score_and_top_ten() {
        let mut mentions: Vec<_> = (0..12)
            .map(|i| mention(&format!("brand-{i}"), "gpt-4o", i, false, JAN_15))
            .collect();
        mentions.push(mention("brand-0", "gpt-4o", 95, true, JAN_15));

        let ranking = industry_ranking(&mentions);
        assert_eq!(ranking.len(), 10);
        assert_eq!(
            ranking[0],
            BrandScore {
                brand: "brand-0".into(),
                score: 95,
            }
        );
        assert_eq!(ranking[1].brand, "brand-11");
        assert!(ranking.windows(2).all(|w| w[0].score >= w[1].score));
    }

    #[test]
    fn test_iso_week_uses_week_year() {
        assert_eq!(iso_week(JAN_15), "2024-W03");
        // 2024-12-30 belongs to the first week of 2025
        assert_eq!(iso_week(1_735_516_800_000), "2025-W01");
    }

    #[test]
    fn test_visibility_trend_counts_mentioned_checks_per_week() {
        let mentions = vec![
            mention("workexe.co", "gpt-4o", 60, true, JAN_15 + 8 * DAY_MS),
            mention("workexe.co", "gpt-4o", 60, true, JAN_15),
            mention("workexe.co", "gpt-4o", 10, false, JAN_15),
            mention("workexe.co", "gpt-4o", 60, true, JAN_15 + 6 * DAY_MS),
            mention("Ahrefs", "gpt-4o", 90, true, JAN_15),
        ];

        assert_eq!(
            visibility_trend(&mentions, "workexe.co"),
            vec![
                WeekCount {
                    week: "2024-W03".into(),
                    count: 2,
                },
                WeekCount {
                    week: "2024-W04".into(),
                    count: 1,
                },
            ]
        );
    }

    #[test]
    fn test_stats_without_brand_have_empty_trend() {
        let mentions = vec![mention("Ahrefs", "gpt-4o", 90, true, JAN_15)];
        let stats = MentionStats::build(&mentions, None);
        assert!(stats.visibility_trend.is_empty());
        assert_eq!(stats.industry_ranking.len(), 1);
        assert_eq!(stats.model_performance.len(), 1);
    }
}
