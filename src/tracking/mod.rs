//! Inbound request path of the tracked site

pub mod handlers;
pub mod middleware;
pub mod routes;

pub use handlers::TrackingState;
pub use routes::create_tracking_router;
