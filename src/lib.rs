//! tenderscout - public procurement tender ingestion.
//!
//! Pulls recently published tenders from a paginated search API, normalizes
//! them and keeps a local SQLite copy up to date, once or on a schedule.

pub mod cli;
pub mod config;
pub mod models;
pub mod repository;
pub mod schema;
pub mod scrapers;
pub mod services;
pub mod utils;
