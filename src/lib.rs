//! Lease-based claims over repository paths plus optimistic-concurrency file
//! edits, for many agent processes sharing one working tree.

pub mod agent;
pub mod build_info;
pub mod commands;
pub mod config;
pub mod error;
pub mod model;
pub mod mutation;
pub mod output;
pub mod patch;
pub mod pathguard;
pub mod store;
pub mod version;
