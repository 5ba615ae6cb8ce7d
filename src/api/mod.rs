//! Admin HTTP API: dashboard queries, charts, export, bulk mutations and live updates

pub mod handlers;
pub mod live;
pub mod routes;

pub use handlers::{AppState, ErrorResponse};
pub use routes::create_api_router;
