//! Paginated reads and per-IP bulk mutations over `bot_logs`

use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

use crate::analytics::{ChartSet, Granularity};
use crate::dashboard::filters::FilterError;
use crate::events::{EventBus, LiveEvent};
use crate::models::{BotCategory, VisitRecord};
use crate::storage::{SortOrder, Storage, StorageError, VisitFilter};

#[derive(Debug, Error)]
pub enum QueryError {
    #[error(transparent)]
    Filter(#[from] FilterError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// One page of the filtered view plus the size of the whole view
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VisitPage {
    pub rows: Vec<VisitRecord>,
    pub total_count: i64,
    pub page: u32,
    pub page_size: u32,
    pub total_pages: u32,
}

pub fn total_pages(total_count: i64, page_size: u32) -> u32 {
    if total_count <= 0 || page_size == 0 {
        return 0;
    }
    let page_size = i64::from(page_size);
    u32::try_from((total_count + page_size - 1) / page_size).unwrap_or(u32::MAX)
}

pub struct QueryEngine {
    storage: Arc<dyn Storage>,
    events: EventBus,
    page_size: u32,
}

impl QueryEngine {
    pub fn new(storage: Arc<dyn Storage>, events: EventBus, page_size: u32) -> Self {
        Self {
            storage,
            events,
            page_size: page_size.max(1),
        }
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    /// Rows newest first; `page` is 1-based and values below 1 read page 1.
    /// Count and rows are read separately, so a concurrent insert may skew
    /// them by one.
    pub async fn query(&self, filter: &VisitFilter, page: u32) -> Result<VisitPage, QueryError> {
        let page = page.max(1);
        let limit = i64::from(self.page_size);
        let offset = i64::from(page - 1) * limit;

        let (total_count, rows) = tokio::try_join!(
            self.storage.count_visits(filter),
            self.storage.list_visits(filter, limit, offset),
        )?;

        Ok(VisitPage {
            rows,
            total_count,
            page,
            page_size: self.page_size,
            total_pages: total_pages(total_count, self.page_size),
        })
    }

    /// Every matching record, oldest first
    pub async fn scan(&self, filter: &VisitFilter) -> Result<Vec<VisitRecord>, QueryError> {
        Ok(self.storage.scan_visits(filter, SortOrder::Asc).await?)
    }

    pub async fn charts(
        &self,
        filter: &VisitFilter,
        granularity: Granularity,
        country: Option<&str>,
    ) -> Result<ChartSet, QueryError> {
        let records = self.scan(filter).await?;
        Ok(ChartSet::build(&records, granularity, country))
    }

    /// Set the blocked flag on every record of `ip`, then notify live viewers
    pub async fn set_blocked(&self, ip: &str, blocked: bool) -> Result<u64, QueryError> {
        let updated = self.storage.set_blocked(ip, blocked).await?;
        info!(ip = %ip, blocked, updated, "blocked flag updated");
        self.events.publish(LiveEvent::Blocked {
            ip: ip.to_string(),
            blocked,
        });
        Ok(updated)
    }

    /// Set the category on every record of `ip`, then notify live viewers
    pub async fn set_category(&self, ip: &str, category: BotCategory) -> Result<u64, QueryError> {
        let updated = self.storage.set_category(ip, category).await?;
        info!(ip = %ip, category = %category, updated, "bot category updated");
        self.events.publish(LiveEvent::Categorized {
            ip: ip.to_string(),
            category,
        });
        Ok(updated)
    }
}
