#![warn(missing_docs, missing_debug_implementations)]

//! Check Hytale username availability in bulk.
//!
//! This library validates candidate usernames against the Hytale naming
//! rules (3-16 characters, ASCII alphanumeric and underscore), drops
//! case-insensitive duplicates, and drives a bounded pool of worker threads
//! that query the hytl.tools check endpoint -- with exponential backoff on
//! rate limiting and transient failures, and exactly one terminal outcome
//! per candidate.
//!
//! # Example
//!
//! ```no_run
//! use hytale_avail::client::HttpClient;
//! use hytale_avail::config::Config;
//! use hytale_avail::engine::{Engine, NoopObserver};
//! use hytale_avail::validate::collect_candidates;
//!
//! let config = Config::default();
//! let set = collect_candidates(["cool_name", "Cool_Name", "ab"]);
//! let engine = Engine::new(HttpClient::new(config.timeout()), &config);
//! let summary = engine.run(set.candidates, &NoopObserver);
//! for candidate in &summary.available {
//!     println!("{} is available", candidate.name);
//! }
//! ```

pub mod backoff;
pub mod client;
pub mod config;
pub mod engine;
pub mod session;
pub mod validate;
