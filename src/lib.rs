//! Slack slash-command and JSON API front end for the cursor-agent CLI.
//!
//! Requests are authenticated, assigned a job id, and pushed onto a bounded
//! queue. A fixed pool of workers drains the queue, runs the external
//! `cursor-agent` process under a hard deadline and process-group isolation,
//! records every transition in a SQLite store, and posts the formatted
//! result back to the submitter's response URL.

pub mod agent;
pub mod config;
pub mod error;
pub mod server;
pub mod slack;
pub mod store;
pub mod tunnel;
pub mod worker;
