//! Markdown helpers: fenced code block extraction, marker-delimited
//! sections, and a Prettier-style normaliser.
//!
//! The normaliser keeps output compatible with what Prettier produces for
//! the same document: blocks are separated by exactly one blank line, list
//! items are packed without blank lines, fenced code blocks stay verbatim.

use crate::error::{ParseError, Result};

/// Extract the content of the first fenced code block tagged `language`.
///
/// Returns `None` when no such block exists. An existing but empty block
/// yields `Some("")`, callers rely on the distinction.
pub fn fenced_code_block(source: &str, language: &str) -> Option<String> {
    let mut in_block = false;
    let mut content: Vec<&str> = Vec::new();

    for line in source.lines() {
        let trimmed = line.trim_start();
        if in_block {
            if trimmed.starts_with("```") {
                return Some(content.join("\n").trim().to_string());
            }
            content.push(line);
        } else if let Some(info) = trimmed.strip_prefix("```") {
            // The info string may carry more than the language tag,
            // only the first word counts.
            if info.split_whitespace().next() == Some(language) {
                in_block = true;
            }
        }
    }

    // Unterminated block, treat as absent
    None
}

fn section_marker(kind: &str, name: &str) -> String {
    format!("<!-- section-{kind} {name} -->")
}

/// Extract the content of the section delimited by
/// `<!-- section-start NAME -->` and `<!-- section-end NAME -->`.
///
/// The surrounding markers and any blank lines directly inside them are not
/// part of the result. Returns `None` when the section is absent.
pub fn section_text(source: &str, name: &str) -> Option<String> {
    let start_marker = section_marker("start", name);
    let end_marker = section_marker("end", name);

    let start = source.find(&start_marker)? + start_marker.len();
    let end = source[start..].find(&end_marker)? + start;

    Some(source[start..end].trim().to_string())
}

#[derive(Debug, PartialEq)]
enum Block {
    Heading(String),
    List(Vec<String>),
    Paragraph(Vec<String>),
    Fence(Vec<String>),
    Html(String),
    Break,
}

/// Normalise a Markdown document into Prettier-compatible shape.
///
/// Fails only on structurally broken input (an unterminated code fence);
/// callers are expected to fall back to the raw text with a warning.
pub fn format(input: &str) -> Result<String> {
    let blocks = parse_blocks(input)?;

    let mut out = String::with_capacity(input.len());
    for (i, block) in blocks.iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        match block {
            Block::Heading(line) | Block::Html(line) => {
                out.push_str(line);
                out.push('\n');
            }
            Block::List(lines) | Block::Paragraph(lines) | Block::Fence(lines) => {
                for line in lines {
                    out.push_str(line);
                    out.push('\n');
                }
            }
            Block::Break => {
                out.push_str("---\n");
            }
        }
    }

    Ok(out)
}

fn parse_blocks(input: &str) -> Result<Vec<Block>> {
    let lines: Vec<&str> = input.lines().collect();
    let mut blocks: Vec<Block> = Vec::new();
    let mut i = 0;

    while i < lines.len() {
        let line = lines[i];
        let trimmed = line.trim();

        if trimmed.is_empty() {
            i += 1;
            continue;
        }

        if trimmed.starts_with("```") {
            let mut fence = vec![line.trim_end().to_string()];
            let mut closed = false;
            i += 1;
            while i < lines.len() {
                fence.push(lines[i].trim_end().to_string());
                if lines[i].trim_start().starts_with("```") {
                    closed = true;
                    i += 1;
                    break;
                }
                i += 1;
            }
            if !closed {
                return Err(ParseError::Markdown {
                    reason: "unterminated fenced code block".to_string(),
                }
                .into());
            }
            blocks.push(Block::Fence(fence));
        } else if trimmed.starts_with('#') {
            blocks.push(Block::Heading(trimmed.to_string()));
            i += 1;
        } else if trimmed == "---" || trimmed == "***" || trimmed == "___" {
            blocks.push(Block::Break);
            i += 1;
        } else if trimmed.starts_with('<') {
            blocks.push(Block::Html(line.trim_end().to_string()));
            i += 1;
        } else if is_list_item(trimmed) {
            let mut items = vec![normalize_list_item(trimmed)];
            i += 1;
            loop {
                // Blank lines between items do not split the list
                let mut j = i;
                while j < lines.len() && lines[j].trim().is_empty() {
                    j += 1;
                }
                if j < lines.len() && is_list_item(lines[j].trim()) {
                    items.push(normalize_list_item(lines[j].trim()));
                    i = j + 1;
                } else {
                    break;
                }
            }
            blocks.push(Block::List(items));
        } else {
            let mut text = vec![trimmed.to_string()];
            i += 1;
            while i < lines.len() {
                let next = lines[i].trim();
                if next.is_empty()
                    || next.starts_with('#')
                    || next.starts_with("```")
                    || next.starts_with('<')
                    || is_list_item(next)
                {
                    break;
                }
                text.push(next.to_string());
                i += 1;
            }
            blocks.push(Block::Paragraph(text));
        }
    }

    Ok(blocks)
}

fn is_list_item(line: &str) -> bool {
    line.starts_with("- ") || line.starts_with("* ") || line.starts_with("+ ")
}

fn normalize_list_item(line: &str) -> String {
    // Prettier renders all bullets as `-`
    if let Some(rest) = line.strip_prefix("* ").or_else(|| line.strip_prefix("+ ")) {
        format!("- {rest}")
    } else {
        line.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fenced_block_found() {
        let source = "Intro\n\n```rp-commits\nfeat: one\nfix: two\n```\n\nOutro";
        assert_eq!(
            fenced_code_block(source, "rp-commits"),
            Some("feat: one\nfix: two".to_string())
        );
    }

    #[test]
    fn fenced_block_empty() {
        let source = "```rp-commits\n```";
        assert_eq!(fenced_code_block(source, "rp-commits"), Some(String::new()));
    }

    #[test]
    fn fenced_block_absent() {
        assert_eq!(fenced_code_block("no blocks here", "rp-commits"), None);
        // Wrong language tag
        assert_eq!(fenced_code_block("```other\nfoo\n```", "rp-commits"), None);
    }

    #[test]
    fn fenced_block_picks_first() {
        let source = "```rp-prefix\nfirst\n```\n\n```rp-prefix\nsecond\n```";
        assert_eq!(
            fenced_code_block(source, "rp-prefix"),
            Some("first".to_string())
        );
    }

    #[test]
    fn section_found() {
        let source = "# Title\n\n<!-- section-start changelog -->\nThe notes\n\n## More\n<!-- section-end changelog -->\n\nTail";
        assert_eq!(
            section_text(source, "changelog"),
            Some("The notes\n\n## More".to_string())
        );
    }

    #[test]
    fn section_absent() {
        assert_eq!(section_text("# Title", "changelog"), None);
    }

    #[test]
    fn format_separates_headings_and_packs_lists() {
        let input = "## [1.0.0](https://example.com/1.0.0)\n### Features\n- Foobar!\n\n- Second\n### Bug Fixes\n- Fixed";
        let want = "## [1.0.0](https://example.com/1.0.0)\n\n### Features\n\n- Foobar!\n- Second\n\n### Bug Fixes\n\n- Fixed\n";
        assert_eq!(format(input).unwrap(), want);
    }

    #[test]
    fn format_keeps_fences_verbatim() {
        let input = "# Head\n```text\n  indented\n\nblank inside\n```\nAfter";
        let want = "# Head\n\n```text\n  indented\n\nblank inside\n```\n\nAfter\n";
        assert_eq!(format(input).unwrap(), want);
    }

    #[test]
    fn format_rejects_unterminated_fence() {
        assert!(format("```\nnever closed").is_err());
    }

    #[test]
    fn format_normalizes_bullet_markers() {
        assert_eq!(format("* one\n+ two").unwrap(), "- one\n- two\n");
    }
}
