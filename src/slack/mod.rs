//! Slack-facing output: mrkdwn formatting, message chunking, and delivery
//! to response URLs behind an SSRF allow-list.

mod format;
mod notify;

pub use format::{format_error, format_success, split_message, to_mrkdwn};
pub use notify::Notifier;
