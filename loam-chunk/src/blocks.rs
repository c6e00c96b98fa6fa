//! Single-pass block scanner for markdown-style note text.
//!
//! The scanner turns raw text into a flat sequence of typed [`Block`]s. It is
//! line-oriented and tracks just enough state to keep fenced code blocks,
//! tables, callouts and quotes together: a fence opened with N backticks (or
//! tildes) only closes on a fence of at least N of the same character, table
//! rows continue while lines keep their leading pipe, and `>`-prefixed lines
//! extend the callout or quote that opened them.
//!
//! Headings carry their depth and title so the chunker can maintain its
//! heading stack; everything else is classified by its first line.

/// Structural category of a scanned block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockKind {
    Heading,
    Paragraph,
    List,
    Code,
    Table,
    Callout,
    Quote,
    Rule,
}

/// One contiguous block of source text.
#[derive(Debug, Clone)]
pub struct Block {
    pub kind: BlockKind,
    /// Heading depth (1-6); zero for non-heading blocks.
    pub depth: u8,
    /// Heading title with markers stripped; `None` for non-heading blocks.
    pub title: Option<String>,
    pub text: String,
    pub tokens: usize,
}

impl Block {
    fn new(kind: BlockKind, text: String) -> Self {
        let tokens = approx_token_count(&text);
        Self {
            kind,
            depth: 0,
            title: None,
            text,
            tokens,
        }
    }

    fn heading(depth: u8, title: String, text: String) -> Self {
        let tokens = approx_token_count(&text);
        Self {
            kind: BlockKind::Heading,
            depth,
            title: Some(title),
            text,
            tokens,
        }
    }
}

/// Approximate token count for a span of text (~4 characters per token).
///
/// This is intentionally a cheap heuristic: it only has to be stable and
/// monotone in text length so that size thresholds and overlap budgets
/// behave predictably.
pub fn approx_token_count(text: &str) -> usize {
    let chars = text.chars().count();
    chars.div_ceil(4)
}

/// Scan text into an ordered sequence of typed blocks.
pub fn scan_blocks(text: &str) -> Vec<Block> {
    let lines: Vec<&str> = text.lines().collect();
    let mut blocks = Vec::new();
    let mut i = 0;

    while i < lines.len() {
        let trimmed = lines[i].trim_start();
        if trimmed.is_empty() {
            i += 1;
            continue;
        }

        if let Some((fence_char, fence_len)) = fence_open(trimmed) {
            let start = i;
            i += 1;
            while i < lines.len() && !fence_close(lines[i].trim_start(), fence_char, fence_len) {
                i += 1;
            }
            if i < lines.len() {
                i += 1; // include the closing fence
            }
            blocks.push(Block::new(BlockKind::Code, lines[start..i].join("\n")));
            continue;
        }

        if let Some((depth, title)) = heading_line(trimmed) {
            blocks.push(Block::heading(depth, title, lines[i].to_string()));
            i += 1;
            continue;
        }

        if is_rule(trimmed) {
            blocks.push(Block::new(BlockKind::Rule, lines[i].to_string()));
            i += 1;
            continue;
        }

        if trimmed.starts_with('>') {
            let kind = if is_callout_open(trimmed) {
                BlockKind::Callout
            } else {
                BlockKind::Quote
            };
            let start = i;
            i += 1;
            while i < lines.len() && lines[i].trim_start().starts_with('>') {
                i += 1;
            }
            blocks.push(Block::new(kind, lines[start..i].join("\n")));
            continue;
        }

        if trimmed.starts_with('|') {
            let start = i;
            i += 1;
            while i < lines.len() && lines[i].trim_start().starts_with('|') {
                i += 1;
            }
            blocks.push(Block::new(BlockKind::Table, lines[start..i].join("\n")));
            continue;
        }

        if is_list_item(trimmed) {
            let start = i;
            i += 1;
            while i < lines.len() {
                let t = lines[i].trim_start();
                if t.is_empty() {
                    break;
                }
                // nested items or indented continuation lines stay in the list
                if is_list_item(t) || lines[i].starts_with("  ") {
                    i += 1;
                } else {
                    break;
                }
            }
            blocks.push(Block::new(BlockKind::List, lines[start..i].join("\n")));
            continue;
        }

        // Paragraph: accumulate until a blank line or any other block opener.
        let start = i;
        i += 1;
        while i < lines.len() {
            let t = lines[i].trim_start();
            if t.is_empty()
                || heading_line(t).is_some()
                || fence_open(t).is_some()
                || is_rule(t)
                || t.starts_with('>')
                || t.starts_with('|')
                || is_list_item(t)
            {
                break;
            }
            i += 1;
        }
        blocks.push(Block::new(BlockKind::Paragraph, lines[start..i].join("\n")));
    }

    blocks
}

fn fence_open(t: &str) -> Option<(char, usize)> {
    for ch in ['`', '~'] {
        let count = t.chars().take_while(|c| *c == ch).count();
        if count >= 3 {
            return Some((ch, count));
        }
    }
    None
}

fn fence_close(t: &str, fence_char: char, fence_len: usize) -> bool {
    let count = t.chars().take_while(|c| *c == fence_char).count();
    count >= fence_len && t[count..].trim().is_empty()
}

fn heading_line(t: &str) -> Option<(u8, String)> {
    let hashes = t.chars().take_while(|c| *c == '#').count();
    if !(1..=6).contains(&hashes) {
        return None;
    }
    // "#tag" is a tag, not a heading: the marker needs trailing whitespace
    match t[hashes..].chars().next() {
        Some(c) if c == ' ' || c == '\t' => {}
        _ => return None,
    }
    let title = t[hashes..].trim().trim_end_matches('#').trim_end().to_string();
    Some((hashes as u8, title))
}

fn is_rule(t: &str) -> bool {
    let compact: String = t.chars().filter(|c| !c.is_whitespace()).collect();
    compact.len() >= 3
        && (compact.chars().all(|c| c == '-')
            || compact.chars().all(|c| c == '*')
            || compact.chars().all(|c| c == '_'))
}

fn is_callout_open(t: &str) -> bool {
    t.starts_with("> [!") || t.starts_with(">[!")
}

fn is_list_item(t: &str) -> bool {
    for marker in ['-', '*', '+'] {
        if let Some(rest) = t.strip_prefix(marker) {
            if rest.starts_with(' ') {
                return true;
            }
        }
    }
    let digits = t.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits == 0 || digits > 9 {
        return false;
    }
    let rest = &t[digits..];
    (rest.starts_with('.') || rest.starts_with(')')) && rest[1..].starts_with(' ')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_basic_structure() {
        let text = "# Title\n\nA paragraph\nspanning two lines.\n\n- one\n- two\n\n> quoted\n";
        let blocks = scan_blocks(text);
        let kinds: Vec<BlockKind> = blocks.iter().map(|b| b.kind).collect();
        assert_eq!(
            kinds,
            vec![
                BlockKind::Heading,
                BlockKind::Paragraph,
                BlockKind::List,
                BlockKind::Quote
            ]
        );
        assert_eq!(blocks[0].depth, 1);
        assert_eq!(blocks[0].title.as_deref(), Some("Title"));
        assert_eq!(blocks[1].text, "A paragraph\nspanning two lines.");
    }

    #[test]
    fn test_fence_holds_markdown_lines() {
        let text = "```rust\n# not a heading\n| not | a | table |\n```\nafter\n";
        let blocks = scan_blocks(text);
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].kind, BlockKind::Code);
        assert!(blocks[0].text.contains("# not a heading"));
        assert_eq!(blocks[1].kind, BlockKind::Paragraph);
    }

    #[test]
    fn test_longer_fence_required_to_close() {
        let text = "````\n```\nstill code\n```\n````\n";
        let blocks = scan_blocks(text);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].kind, BlockKind::Code);
    }

    #[test]
    fn test_unterminated_fence_runs_to_eof() {
        let text = "```\nno closing fence\nmore code";
        let blocks = scan_blocks(text);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].kind, BlockKind::Code);
        assert!(blocks[0].text.ends_with("more code"));
    }

    #[test]
    fn test_callout_vs_quote() {
        let text = "> [!note]\n> callout body\n\n> ordinary quote\n";
        let blocks = scan_blocks(text);
        assert_eq!(blocks[0].kind, BlockKind::Callout);
        assert_eq!(blocks[1].kind, BlockKind::Quote);
    }

    #[test]
    fn test_rule_and_tag_are_not_misread() {
        let text = "---\n#tag is a paragraph\n";
        let blocks = scan_blocks(text);
        assert_eq!(blocks[0].kind, BlockKind::Rule);
        assert_eq!(blocks[1].kind, BlockKind::Paragraph);
    }

    #[test]
    fn test_table_rows_stay_together() {
        let text = "| a | b |\n| - | - |\n| 1 | 2 |\n\ntail\n";
        let blocks = scan_blocks(text);
        assert_eq!(blocks[0].kind, BlockKind::Table);
        assert_eq!(blocks[0].text.lines().count(), 3);
    }

    #[test]
    fn test_empty_input() {
        assert!(scan_blocks("").is_empty());
        assert!(scan_blocks("\n\n\n").is_empty());
    }

    #[test]
    fn test_token_count_rounds_up() {
        assert_eq!(approx_token_count(""), 0);
        assert_eq!(approx_token_count("abc"), 1);
        assert_eq!(approx_token_count("abcde"), 2);
    }
}
