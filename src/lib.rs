//! PM Outreach Lead Finder Library
//!
//! Finds contacts at a company domain through several third-party lead
//! providers (Hunter, Apollo, Snov, FindThatLead), caches results, enforces a
//! per-user call budget and ranks contacts by seniority for outreach.
//!
//! # Modules
//!
//! - `models`: Normalized contact model and persistence records.
//! - `providers`: Provider adapters and the provider registry.
//! - `cache`: Result cache seam.
//! - `cache_validator`: Checksummed cache payloads.
//! - `rate_limit`: Call ledger seam and rate limiter.
//! - `usage`: Per-user search log and usage totals.
//! - `memory_store`: In-process cache, ledger and search log.
//! - `db`: Database connection and migrations.
//! - `db_storage`: Postgres cache, ledger, search log and credential store.
//! - `circuit_breaker`: Circuit breaker around store queries.
//! - `credentials`: Encrypted per-user provider credentials.
//! - `finder`: Provider orchestration with fallback.
//! - `lead_filter`: Role filtering and seniority ranking.
//! - `drafts`: Outreach email drafts.
//! - `outreach_config`: Role and draft settings file.
//! - `config`: Environment configuration.
//! - `errors`: Error handling types.
//! - `handlers`: HTTP request handlers.

pub mod cache;
pub mod cache_validator;
pub mod circuit_breaker;
pub mod config;
pub mod credentials;
pub mod db;
pub mod db_storage;
pub mod drafts;
pub mod errors;
pub mod finder;
pub mod handlers;
pub mod lead_filter;
pub mod memory_store;
pub mod models;
pub mod outreach_config;
pub mod providers;
pub mod rate_limit;
pub mod usage;
