//! Dashboard read side: filter parsing, paginated queries and live viewers

pub mod engine;
pub mod filters;
pub mod session;

pub use engine::{total_pages, QueryEngine, QueryError, VisitPage};
pub use filters::{FilterError, FilterParams};
pub use session::{LiveMessage, RefreshOutcome, ViewQuery, ViewerRegistry, ViewerSession};
