//! Visit logging pipeline and chart aggregation
//!
//! Request context flows from the tracking middleware into the
//! [`VisitLogger`], which enriches it with GeoIP and user-agent data off the
//! request path. [`views`] turns stored records back into chart series.

pub mod geoip;
pub mod ip_extractor;
pub mod logger;
pub mod views;

pub use geoip::{GeoIpService, GeoLocation};
pub use ip_extractor::{extract_client_ip, ip_label};
pub use logger::{VisitEvent, VisitLogger};
pub use views::{ChartSet, Granularity, Trend};
