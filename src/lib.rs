//! RSS aggregation backend.
//!
//! Users subscribe to RSS feeds; a background [`scheduler::Scheduler`]
//! periodically selects the stalest feeds, fetches and parses them
//! concurrently, and stores their entries as posts.
//!
//! - [`storage`] - SQLite persistence for users, feeds, follows and posts
//! - [`feed`] - HTTP fetching and RSS parsing
//! - [`scheduler`] - the tick loop and per-feed fetch-and-ingest tasks
//! - [`config`] - TOML configuration

pub mod config;
pub mod feed;
pub mod scheduler;
pub mod storage;
pub mod util;
