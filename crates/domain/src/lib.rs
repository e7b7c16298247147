//! Shared types for cronturn: errors, trace events, configuration, cron
//! jobs, model references and agent run output.

pub mod agent;
pub mod channel;
pub mod config;
pub mod error;
pub mod job;
pub mod model;
pub mod payload;
pub mod snapshot;
pub mod trace;
