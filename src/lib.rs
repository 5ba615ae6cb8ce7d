pub mod analytics;
pub mod api;
pub mod auth;
pub mod config;
pub mod dashboard;
pub mod detection;
pub mod events;
pub mod export;
pub mod mentions;
pub mod models;
pub mod storage;
pub mod tracking;
