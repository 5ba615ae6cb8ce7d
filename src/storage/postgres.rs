use crate::models::{
    BotCategory, MentionRecord, NewMention, NewUserVisit, NewVisit, UserVisit, VisitRecord,
};
use crate::storage::filter::{FilterValue, Predicate};
use crate::storage::row::{encode_list, into_records, VisitRow, VISIT_COLUMNS};
use crate::storage::{SortOrder, Storage, StorageResult, VisitFilter};
use anyhow::Result;
use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, QueryBuilder};
use std::sync::Arc;

pub struct PostgresStorage {
    pool: Arc<PgPool>,
}

impl PostgresStorage {
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self {
            pool: Arc::new(pool),
        })
    }
}

fn push_filter(qb: &mut QueryBuilder<'_, Postgres>, filter: &VisitFilter) {
    for (i, predicate) in filter.predicates().into_iter().enumerate() {
        qb.push(if i == 0 { " WHERE " } else { " AND " });
        match predicate {
            Predicate::Contains { column, pattern } => {
                qb.push(column)
                    .push(" ILIKE ")
                    .push_bind(pattern)
                    .push(" ESCAPE '\\'");
            }
            Predicate::AtLeast { column, value } => {
                qb.push(column).push(" >= ").push_bind(value);
            }
            Predicate::AtMost { column, value } => {
                qb.push(column).push(" <= ").push_bind(value);
            }
            Predicate::Equals {
                column,
                value: FilterValue::Text(text),
            } => {
                qb.push(column).push(" = ").push_bind(text);
            }
            Predicate::Equals {
                column,
                value: FilterValue::Flag(flag),
            } => {
                qb.push(column).push(" = ").push_bind(flag);
            }
        }
    }
}

#[async_trait]
impl Storage for PostgresStorage {
    async fn init(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS bot_logs (
                id BIGSERIAL PRIMARY KEY,
                url TEXT NOT NULL,
                bot_name TEXT,
                user_agent TEXT NOT NULL,
                ip TEXT NOT NULL,
                timestamp BIGINT NOT NULL,
                referrer TEXT,
                page_title TEXT,
                country TEXT,
                city TEXT,
                session_id TEXT,
                os TEXT,
                browser TEXT,
                is_anomaly BOOLEAN NOT NULL DEFAULT FALSE,
                anomaly_reasons TEXT NOT NULL DEFAULT '[]',
                anomaly_score BIGINT,
                is_blocked BOOLEAN NOT NULL DEFAULT FALSE,
                bot_category TEXT NOT NULL DEFAULT 'unknown',
                page_load_time DOUBLE PRECISION,
                server_response_time DOUBLE PRECISION,
                visited_pages TEXT NOT NULL DEFAULT '[]',
                is_user BOOLEAN NOT NULL DEFAULT FALSE
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_bot_logs_timestamp ON bot_logs(timestamp)")
            .execute(self.pool.as_ref())
            .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_bot_logs_ip ON bot_logs(ip)")
            .execute(self.pool.as_ref())
            .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS user_visits (
                id BIGSERIAL PRIMARY KEY,
                url TEXT NOT NULL,
                referrer TEXT,
                user_agent TEXT,
                session_id TEXT NOT NULL,
                timestamp BIGINT NOT NULL
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS llm_mentions (
                id BIGSERIAL PRIMARY KEY,
                brand TEXT NOT NULL,
                model TEXT NOT NULL,
                prompt TEXT NOT NULL,
                response TEXT NOT NULL,
                mentioned BOOLEAN NOT NULL,
                score BIGINT NOT NULL,
                summary TEXT,
                source_url TEXT,
                created_at BIGINT NOT NULL
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        Ok(())
    }

    async fn insert_visit(&self, visit: &NewVisit) -> StorageResult<VisitRecord> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO bot_logs (
                url, bot_name, user_agent, ip, timestamp, referrer, page_title, country, city,
                session_id, os, browser, is_anomaly, anomaly_reasons, anomaly_score, is_blocked,
                bot_category, page_load_time, server_response_time, visited_pages, is_user
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17,
                    $18, $19, $20, $21)
            RETURNING id
            "#,
        )
        .bind(&visit.url)
        .bind(&visit.bot_name)
        .bind(&visit.user_agent)
        .bind(&visit.ip)
        .bind(visit.timestamp)
        .bind(&visit.referrer)
        .bind(&visit.page_title)
        .bind(&visit.country)
        .bind(&visit.city)
        .bind(&visit.session_id)
        .bind(&visit.os)
        .bind(&visit.browser)
        .bind(visit.is_anomaly)
        .bind(encode_list(&visit.anomaly_reasons))
        .bind(visit.anomaly_score)
        .bind(visit.is_blocked)
        .bind(visit.bot_category.as_str())
        .bind(visit.page_load_time)
        .bind(visit.server_response_time)
        .bind(encode_list(&visit.visited_pages))
        .bind(visit.is_user)
        .fetch_one(self.pool.as_ref())
        .await?;

        Ok(visit.clone().into_record(id))
    }

    async fn count_visits(&self, filter: &VisitFilter) -> StorageResult<i64> {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM bot_logs");
        push_filter(&mut qb, filter);

        let count = qb
            .build_query_scalar::<i64>()
            .fetch_one(self.pool.as_ref())
            .await?;

        Ok(count)
    }

    async fn list_visits(
        &self,
        filter: &VisitFilter,
        limit: i64,
        offset: i64,
    ) -> StorageResult<Vec<VisitRecord>> {
        let mut qb =
            QueryBuilder::<Postgres>::new(format!("SELECT {VISIT_COLUMNS} FROM bot_logs"));
        push_filter(&mut qb, filter);
        qb.push(" ORDER BY timestamp DESC, id DESC LIMIT ")
            .push_bind(limit)
            .push(" OFFSET ")
            .push_bind(offset);

        let rows = qb
            .build_query_as::<VisitRow>()
            .fetch_all(self.pool.as_ref())
            .await?;

        into_records(rows)
    }

    async fn scan_visits(
        &self,
        filter: &VisitFilter,
        order: SortOrder,
    ) -> StorageResult<Vec<VisitRecord>> {
        let mut qb =
            QueryBuilder::<Postgres>::new(format!("SELECT {VISIT_COLUMNS} FROM bot_logs"));
        push_filter(&mut qb, filter);
        qb.push(format!(
            " ORDER BY timestamp {dir}, id {dir}",
            dir = order.as_sql()
        ));

        let rows = qb
            .build_query_as::<VisitRow>()
            .fetch_all(self.pool.as_ref())
            .await?;

        into_records(rows)
    }

    async fn set_blocked(&self, ip: &str, blocked: bool) -> StorageResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE bot_logs
            SET is_blocked = $1
            WHERE ip = $2
            "#,
        )
        .bind(blocked)
        .bind(ip)
        .execute(self.pool.as_ref())
        .await?;

        Ok(result.rows_affected())
    }

    async fn set_category(&self, ip: &str, category: BotCategory) -> StorageResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE bot_logs
            SET bot_category = $1
            WHERE ip = $2
            "#,
        )
        .bind(category.as_str())
        .bind(ip)
        .execute(self.pool.as_ref())
        .await?;

        Ok(result.rows_affected())
    }

    async fn insert_user_visit(&self, visit: &NewUserVisit) -> StorageResult<UserVisit> {
        let row = sqlx::query_as::<_, UserVisit>(
            r#"
            INSERT INTO user_visits (url, referrer, user_agent, session_id, timestamp)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, url, referrer, user_agent, session_id, timestamp
            "#,
        )
        .bind(&visit.url)
        .bind(&visit.referrer)
        .bind(&visit.user_agent)
        .bind(&visit.session_id)
        .bind(visit.timestamp)
        .fetch_one(self.pool.as_ref())
        .await?;

        Ok(row)
    }

    async fn list_user_visits(&self, limit: i64, offset: i64) -> StorageResult<Vec<UserVisit>> {
        let visits = sqlx::query_as::<_, UserVisit>(
            r#"
            SELECT id, url, referrer, user_agent, session_id, timestamp
            FROM user_visits
            ORDER BY timestamp DESC, id DESC
            LIMIT $1 OFFSET $2
            "#,
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(self.pool.as_ref())
        .await?;

        Ok(visits)
    }

    async fn insert_mention(&self, mention: &NewMention) -> StorageResult<MentionRecord> {
        let row = sqlx::query_as::<_, MentionRecord>(
            r#"
            INSERT INTO llm_mentions
                (brand, model, prompt, response, mentioned, score, summary, source_url, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING id, brand, model, prompt, response, mentioned, score, summary, source_url, created_at
            "#,
        )
        .bind(&mention.brand)
        .bind(&mention.model)
        .bind(&mention.prompt)
        .bind(&mention.response)
        .bind(mention.mentioned)
        .bind(mention.score)
        .bind(&mention.summary)
        .bind(&mention.source_url)
        .bind(mention.created_at)
        .fetch_one(self.pool.as_ref())
        .await?;

        Ok(row)
    }

    async fn list_mentions(&self, limit: i64) -> StorageResult<Vec<MentionRecord>> {
        let mentions = sqlx::query_as::<_, MentionRecord>(
            r#"
            SELECT id, brand, model, prompt, response, mentioned, score, summary, source_url, created_at
            FROM llm_mentions
            ORDER BY created_at DESC, id DESC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(self.pool.as_ref())
        .await?;

        Ok(mentions)
    }

    async fn scan_mentions(&self) -> StorageResult<Vec<MentionRecord>> {
        let mentions = sqlx::query_as::<_, MentionRecord>(
            r#"
            SELECT id, brand, model, prompt, response, mentioned, score, summary, source_url, created_at
            FROM llm_mentions
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .fetch_all(self.pool.as_ref())
        .await?;

        Ok(mentions)
    }
}
