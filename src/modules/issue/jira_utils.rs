// Copyright © 2025 rustmailer.com
// Licensed under RustMailer License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

//! Summary/description field assembly for the JIRA issue engine (spec §4.4,
//! SPEC_FULL §B), ported from `threadline/utils/issues/jira_utils.py`'s
//! `remove_emoji`/`build_summary_field`/`embed_images` without carrying over
//! its Django-cache-backed field-selection machinery, which this crate
//! replaces with `Issue.metadata` (spec §4.4's LLM field-selection cache).

use regex::Regex;
use std::sync::LazyLock;

pub const SUMMARY_MAX_CHARS: usize = 500;
pub const DESCRIPTION_MAX_CHARS: usize = 10000;

static EMOJI_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        "[",
        "\u{1F300}-\u{1FAFF}",
        "\u{2600}-\u{27BF}",
        "]",
    ))
    .unwrap()
});

static IMAGE_PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[IMAGE:\s*([\w@.\-]+)\]").unwrap());

/// Strips emoji (the ranges named in spec §4.4a) and collapses newlines,
/// matching the original's `remove_emoji` plus its "newline-collapsing"
/// companion (SPEC_FULL §B).
pub fn strip_emoji_and_collapse_newlines(text: &str) -> String {
    let stripped = EMOJI_PATTERN.replace_all(text, "");
    let collapsed = stripped.lines().map(str::trim).collect::<Vec<_>>().join(" ");
    collapsed.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn truncate_chars(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}

/// Builds the JIRA summary field (spec §4.4 "Summary construction").
pub fn build_summary(
    base: &str,
    prefix: &str,
    add_timestamp: bool,
    timestamp_yyyymmdd: &str,
) -> String {
    let cleaned = strip_emoji_and_collapse_newlines(base);
    let with_prefix = if prefix.is_empty() {
        cleaned
    } else if add_timestamp {
        format!("{prefix}[{timestamp_yyyymmdd}]{cleaned}")
    } else {
        format!("{prefix}{cleaned}")
    };
    truncate_chars(&with_prefix, SUMMARY_MAX_CHARS)
}

/// Replaces every `[IMAGE: safe_filename]` placeholder with the JIRA image
/// macro `!safe_filename|width=600!`, appending the attachment's processed
/// OCR text on the following line when present (spec §4.4a).
pub fn embed_images(llm_content: &str, ocr_lookup: impl Fn(&str) -> Option<String>) -> String {
    if llm_content.is_empty() {
        return String::new();
    }
    let mut result = String::with_capacity(llm_content.len());
    let mut last_end = 0;
    for caps in IMAGE_PLACEHOLDER.captures_iter(llm_content) {
        let whole = caps.get(0).unwrap();
        let filename = &caps[1];
        result.push_str(&llm_content[last_end..whole.start()]);
        result.push_str(&format!("!{filename}|width=600!"));
        if let Some(ocr) = ocr_lookup(filename) {
            if !ocr.is_empty() {
                result.push('\n');
                result.push_str(&ocr);
            }
        }
        last_end = whole.end();
    }
    result.push_str(&llm_content[last_end..]);
    result
}

/// Filenames already referenced via a `!filename|width=600!` macro, used to
/// decide which image attachments belong in the "Additional Images" block.
pub fn embedded_filenames(embedded_content: &str) -> std::collections::HashSet<String> {
    static EMBEDDED: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"!([\w@.\-]+)\|width=600!").unwrap());
    EMBEDDED
        .captures_iter(embedded_content)
        .map(|c| c[1].to_string())
        .collect()
}

/// One entry of the "Additional Images" block (spec §4.4 step 5): a JIRA
/// image macro plus the attachment's processed OCR text.
pub fn additional_image_block(safe_filename: &str, llm_content: &str) -> String {
    format!("!{safe_filename}|width=600!\n{llm_content}")
}

/// Assembles the full description per spec §4.4's deterministic 5-step
/// order, then emoji-strips and truncates to 10000 chars.
pub fn build_description(
    summary_content: Option<&str>,
    embedded_llm_content: &str,
    additional_images: &[String],
) -> String {
    let mut parts = Vec::new();
    if let Some(s) = summary_content {
        if !s.trim().is_empty() {
            parts.push(s.trim().to_string());
        }
    }
    parts.push("---".to_string());
    parts.push(embedded_llm_content.to_string());
    if !additional_images.is_empty() {
        parts.push("---".to_string());
        parts.push(format!(
            "Additional Images\n{}",
            additional_images.join("\n\n")
        ));
    }
    let combined = parts.join("\n");
    let cleaned = strip_emoji_and_collapse_newlines(&combined);
    truncate_chars(&cleaned, DESCRIPTION_MAX_CHARS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embed_images_substitutes_placeholder_and_appends_ocr() {
        let out = embed_images("See [IMAGE: abc123.png] for the error", |f| {
            (f == "abc123.png").then(|| "ERR 500".to_string())
        });
        assert_eq!(out, "See !abc123.png|width=600!\nERR 500 for the error");
    }

    #[test]
    fn build_summary_applies_prefix_and_truncates() {
        let long = "x".repeat(600);
        let out = build_summary(&long, "[AI]", false, "20260101");
        assert_eq!(out.chars().count(), SUMMARY_MAX_CHARS);
        assert!(out.starts_with("[AI]"));
    }

    #[test]
    fn strip_emoji_removes_pictographs() {
        let out = strip_emoji_and_collapse_newlines("Outage \u{1F525} detected");
        assert_eq!(out, "Outage  detected".split_whitespace().collect::<Vec<_>>().join(" "));
    }
}
