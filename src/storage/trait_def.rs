use crate::models::{
    BotCategory, MentionRecord, NewMention, NewUserVisit, NewVisit, UserVisit, VisitRecord,
};
use crate::storage::{SortOrder, VisitFilter};
use anyhow::Result;
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("stored row could not be decoded: {0}")]
    Corrupt(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;

#[async_trait]
pub trait Storage: Send + Sync {
    /// Initialize the storage (create tables and indexes)
    async fn init(&self) -> Result<()>;

    /// Persist one bot visit; the storage assigns `id`
    async fn insert_visit(&self, visit: &NewVisit) -> StorageResult<VisitRecord>;

    /// Number of visits matching `filter`, independent of pagination
    async fn count_visits(&self, filter: &VisitFilter) -> StorageResult<i64>;

    /// One page of visits matching `filter`, newest first
    async fn list_visits(
        &self,
        filter: &VisitFilter,
        limit: i64,
        offset: i64,
    ) -> StorageResult<Vec<VisitRecord>>;

    /// Every visit matching `filter` in the requested timestamp order
    async fn scan_visits(
        &self,
        filter: &VisitFilter,
        order: SortOrder,
    ) -> StorageResult<Vec<VisitRecord>>;

    /// Set the blocked flag on every visit from `ip`; returns rows touched
    async fn set_blocked(&self, ip: &str, blocked: bool) -> StorageResult<u64>;

    /// Set the category on every visit from `ip`; returns rows touched
    async fn set_category(&self, ip: &str, category: BotCategory) -> StorageResult<u64>;

    /// Persist one row of the plain visit widget
    async fn insert_user_visit(&self, visit: &NewUserVisit) -> StorageResult<UserVisit>;

    /// Plain widget rows, newest first
    async fn list_user_visits(&self, limit: i64, offset: i64) -> StorageResult<Vec<UserVisit>>;

    async fn insert_mention(&self, mention: &NewMention) -> StorageResult<MentionRecord>;

    /// Mention checks, newest first
    async fn list_mentions(&self, limit: i64) -> StorageResult<Vec<MentionRecord>>;

    /// Every mention check, oldest first
    async fn scan_mentions(&self) -> StorageResult<Vec<MentionRecord>>;
}
