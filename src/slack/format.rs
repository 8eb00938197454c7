//! Agent output → Slack mrkdwn.

use std::sync::LazyLock;

use regex::Regex;

/// Slack's maximum message size.
const MAX_CHUNK_BYTES: usize = 40_000;

/// Response-URL call budget for one logical message.
const MAX_CHUNKS: usize = 5;

/// Prefer breaking at a newline within this distance of the cap.
const SPLIT_SLACK_BYTES: usize = 1_000;

/// Cap on diff lines echoed in the change summary.
const MAX_DIFF_LINES: usize = 20;

/// Lines containing these words are scanned for file names.
const FILE_KEYWORDS: &[&str] = &["modified", "created", "deleted", "updated", "file"];

static MD_LINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[([^\]]+)\]\(([^)]+)\)").expect("link pattern compiles"));

/// Build the success message for a finished run.
pub fn format_success(job_id: &str, prompt: &str, output: &str) -> String {
    let mut msg = String::new();
    msg.push_str("✅ *Cursor agent run complete*\n\n");
    msg.push_str(&format!("📝 *Prompt*\n> {prompt}\n\n"));

    let lines: Vec<&str> = output.lines().collect();

    let files = extract_modified_files(&lines);
    if !files.is_empty() {
        msg.push_str("📁 *Files touched*\n");
        for file in &files {
            msg.push_str(&format!("• `{file}`\n"));
        }
        msg.push('\n');
    }

    let changes = extract_change_summary(&lines);
    if !changes.is_empty() {
        msg.push_str("🔧 *Change summary*\n");
        msg.push_str(&changes);
        msg.push('\n');
    }

    msg.push_str("📄 *Output*\n\n");
    msg.push_str(&to_mrkdwn(output));
    msg.push_str(&format!("\n\n🆔 Job ID: `{}`", short_id(job_id)));
    msg
}

/// Build the failure message for a run that ended in an error.
pub fn format_error(job_id: &str, error: &str, output: &str) -> String {
    let mut msg = String::new();
    msg.push_str("❌ *Cursor agent run failed*\n\n");
    msg.push_str(&format!("🚨 *Error*\n> {error}\n\n"));
    if !output.is_empty() {
        msg.push_str("📄 *Output*\n\n");
        msg.push_str(&to_mrkdwn(output));
        msg.push('\n');
    }
    msg.push_str(&format!("\n💡 Details: `/cursor show {}`", short_id(job_id)));
    msg
}

fn short_id(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}

/// Heuristic file-name scan: whitespace-separated tokens containing a dot,
/// on lines that mention a file-change keyword.
fn extract_modified_files(lines: &[&str]) -> Vec<String> {
    let mut files: Vec<String> = Vec::new();
    for line in lines {
        let lower = line.to_lowercase();
        if !FILE_KEYWORDS.iter().any(|k| lower.contains(k)) {
            continue;
        }
        for token in line.split_whitespace() {
            if token.contains('.') && !token.starts_with('.') {
                let file = token.trim_matches(|c| "`:,;\"'".contains(c));
                if !file.is_empty() && !files.iter().any(|f| f == file) {
                    files.push(file.to_string());
                }
            }
        }
    }
    files
}

/// Bulleted ➕/➖ echo of any embedded unified diff, capped at
/// [`MAX_DIFF_LINES`] changes.
fn extract_change_summary(lines: &[&str]) -> String {
    let mut summary = String::new();
    let mut in_diff = false;
    let mut count = 0usize;
    let mut overflow = false;

    for line in lines {
        let trimmed = line.trim();
        if trimmed.starts_with("diff --git")
            || trimmed.starts_with("---")
            || trimmed.starts_with("+++")
            || trimmed.starts_with("@@")
        {
            in_diff = true;
            continue;
        }
        if !in_diff {
            continue;
        }

        let change = if let Some(added) = trimmed.strip_prefix('+') {
            Some(format!("• ➕ {added}\n"))
        } else if let Some(removed) = trimmed.strip_prefix('-') {
            Some(format!("• ➖ {removed}\n"))
        } else {
            None
        };

        if let Some(change) = change {
            if count < MAX_DIFF_LINES {
                summary.push_str(&change);
                count += 1;
            } else {
                overflow = true;
            }
        }
    }

    if overflow {
        summary.push_str("• … more changes omitted\n");
    }
    summary
}

/// Convert standard Markdown to Slack mrkdwn. Fenced code blocks pass
/// through verbatim.
pub fn to_mrkdwn(markdown: &str) -> String {
    let mut out = String::new();
    let mut in_code_block = false;

    for line in markdown.lines() {
        if line.trim().starts_with("```") {
            in_code_block = !in_code_block;
            out.push_str(line);
            out.push('\n');
            continue;
        }
        if in_code_block {
            out.push_str(line);
            out.push('\n');
            continue;
        }

        if let Some(heading) = render_heading(line.trim()) {
            out.push_str(&heading);
            out.push('\n');
            continue;
        }

        let line = line.replace("**", "*");
        let line = MD_LINK.replace_all(&line, "<$2|$1>");

        let content = line.trim_start();
        let indent = &line[..line.len() - content.len()];
        if let Some(rest) = content.strip_prefix("- ").or_else(|| content.strip_prefix("* ")) {
            out.push_str(indent);
            out.push_str("• ");
            out.push_str(rest);
        } else {
            out.push_str(&line);
        }
        out.push('\n');
    }

    // Force-close a dangling fence so the echo stays readable.
    if in_code_block {
        out.push_str("```\n");
    }

    // Slack parses a leading fence more reliably after a blank line.
    if out.trim_start().starts_with("```") {
        out.insert(0, '\n');
    }
    out
}

fn render_heading(trimmed: &str) -> Option<String> {
    if !trimmed.starts_with('#') {
        return None;
    }
    let level = trimmed.chars().take_while(|&c| c == '#').count();
    let title = trimmed[level..].trim();
    if title.is_empty() {
        return None;
    }
    let prefix = match level {
        1 => "📌 *",
        2 => "▪️ *",
        3 => "  • *",
        _ => "    - *",
    };
    Some(format!("{prefix}{title}*"))
}

/// Split a message into at most [`MAX_CHUNKS`] chunks of at most
/// [`MAX_CHUNK_BYTES`] bytes, preferring newline boundaries near the cap.
/// Multi-chunk output gets `page i/N` headers; content past the last chunk
/// is dropped with a truncation notice.
pub fn split_message(message: &str) -> Vec<String> {
    if message.len() <= MAX_CHUNK_BYTES {
        return vec![message.to_string()];
    }

    let mut chunks = Vec::new();
    let mut remaining = message;

    while !remaining.is_empty() && chunks.len() < MAX_CHUNKS {
        if remaining.len() <= MAX_CHUNK_BYTES {
            chunks.push(remaining.to_string());
            remaining = "";
            break;
        }

        let mut cut = floor_char_boundary(remaining, MAX_CHUNK_BYTES);
        if let Some(pos) = remaining[..cut].rfind('\n') {
            if pos + 1 > MAX_CHUNK_BYTES - SPLIT_SLACK_BYTES {
                cut = pos + 1;
            }
        }
        chunks.push(remaining[..cut].to_string());
        remaining = &remaining[cut..];
    }

    if !remaining.is_empty() {
        tracing::warn!(bytes = remaining.len(), "message over chunk budget, truncating");
        if let Some(last) = chunks.last_mut() {
            last.push_str(&format!("\n\n⚠️ {} bytes were truncated", remaining.len()));
        }
    }

    if chunks.len() > 1 {
        let total = chunks.len();
        for (i, chunk) in chunks.iter_mut().enumerate() {
            chunk.insert_str(0, &format!("📄 page {}/{}\n", i + 1, total));
        }
    }

    chunks
}

fn floor_char_boundary(s: &str, mut index: usize) -> usize {
    while index > 0 && !s.is_char_boundary(index) {
        index -= 1;
    }
    index
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bold_is_rewritten() {
        assert_eq!(to_mrkdwn("this is **bold** text"), "this is *bold* text\n");
    }

    #[test]
    fn headings_become_bold_lines() {
        let converted = to_mrkdwn("# Title\n## Section\n### Sub\n#### Deep");
        assert_eq!(
            converted,
            "📌 *Title*\n▪️ *Section*\n  • *Sub*\n    - *Deep*\n"
        );
    }

    #[test]
    fn links_become_slack_links() {
        assert_eq!(
            to_mrkdwn("see [the docs](https://example.com/d)"),
            "see <https://example.com/d|the docs>\n"
        );
    }

    #[test]
    fn list_markers_become_bullets_with_indent() {
        let converted = to_mrkdwn("- one\n  - two\n* three");
        assert_eq!(converted, "• one\n  • two\n• three\n");
    }

    #[test]
    fn code_blocks_pass_through_verbatim() {
        let input = "```\n**not bold** and [not](a-link)\n# not a heading\n```";
        let converted = to_mrkdwn(input);
        assert!(converted.contains("**not bold** and [not](a-link)"));
        assert!(converted.contains("# not a heading"));
    }

    #[test]
    fn dangling_fence_is_closed() {
        let converted = to_mrkdwn("```\ncode without end");
        assert!(converted.ends_with("```\n"));
    }

    #[test]
    fn files_are_extracted_from_keyword_lines() {
        let output = "Modified: src/main.rs\nCreated `tests/it.rs`\nnothing here\nplain.txt alone";
        let lines: Vec<&str> = output.lines().collect();
        let files = extract_modified_files(&lines);
        assert_eq!(files, vec!["src/main.rs", "tests/it.rs"]);
    }

    #[test]
    fn change_summary_caps_at_twenty() {
        let mut output = String::from("diff --git a/x b/x\n@@ -1 +1 @@\n");
        for i in 0..30 {
            output.push_str(&format!("+line {i}\n"));
        }
        let lines: Vec<&str> = output.lines().collect();
        let summary = extract_change_summary(&lines);

        assert_eq!(summary.matches("➕").count(), 20);
        assert!(summary.contains("more changes omitted"));
    }

    #[test]
    fn change_summary_marks_additions_and_removals() {
        let output = "diff --git a/x b/x\n--- a/x\n+++ b/x\n@@ -1 +1 @@\n-old line\n+new line\n";
        let lines: Vec<&str> = output.lines().collect();
        let summary = extract_change_summary(&lines);

        assert!(summary.contains("• ➖ old line"));
        assert!(summary.contains("• ➕ new line"));
    }

    #[test]
    fn small_message_is_a_single_chunk() {
        let chunks = split_message("hello");
        assert_eq!(chunks, vec!["hello".to_string()]);
    }

    #[test]
    fn long_message_is_paged_at_newlines() {
        let message = "0123456789\n".repeat(9_000); // 99,000 bytes
        let chunks = split_message(&message);

        assert_eq!(chunks.len(), 3);
        for (i, chunk) in chunks.iter().enumerate() {
            assert!(chunk.starts_with(&format!("📄 page {}/3\n", i + 1)));
            assert!(chunk.len() <= MAX_CHUNK_BYTES + 32);
        }
        // Newline-preferring split: no line is torn apart.
        assert!(chunks[0].ends_with('\n'));
        assert!(!chunks.iter().any(|c| c.contains("truncated")));
    }

    #[test]
    fn overlong_message_is_truncated_after_five_chunks() {
        let message = "0123456789\n".repeat(30_000); // 330,000 bytes
        let chunks = split_message(&message);

        assert_eq!(chunks.len(), 5);
        assert!(chunks[4].contains("bytes were truncated"));
    }

    #[test]
    fn success_message_carries_prompt_and_short_id() {
        let msg = format_success("0123456789abcdef", "fix the bug", "done");
        assert!(msg.contains("> fix the bug"));
        assert!(msg.contains("`01234567`"));
        assert!(!msg.contains("0123456789abcdef"));
    }

    #[test]
    fn error_message_carries_error_and_hint() {
        let msg = format_error("0123456789abcdef", "agent exited with exit status: 2", "logs");
        assert!(msg.contains("> agent exited with exit status: 2"));
        assert!(msg.contains("/cursor show 01234567"));
    }
}
