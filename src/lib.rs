//! Utility meter readings with Google Sheets sync.

pub mod client;
pub mod config;
pub mod db;
pub mod export;
pub mod images;
pub mod models;
pub mod server;
pub mod sheets;
pub mod sync;
pub mod validation;
