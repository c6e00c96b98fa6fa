//! Structure-aware chunking of note documents.
//!
//! [`Chunker::chunk`] is a pure function from a document's path and text to an
//! ordered list of [`NoteChunk`] records. The pipeline is:
//!
//! ```text
//! text → strip generated blocks → scan blocks → assemble drafts
//!      → merge fragments → finalize (ids, hashes, tags, representation)
//! ```
//!
//! Chunk boundaries follow document structure first and size second:
//! headings always start a new chunk and maintain the heading stack that
//! becomes each chunk's `heading_path`; strong-boundary blocks (rules,
//! callouts, tables, code fences, lists by default) stand alone; in between,
//! blocks accumulate until the token target is passed at a block end or the
//! hard maximum forces a split. Size-triggered splits carry a bounded overlap
//! tail into the next chunk so context survives the cut; structural
//! boundaries carry nothing.
//!
//! Chunk ids hash the structural position `(path, heading_path, ordinal)`, so
//! re-chunking an unchanged document reproduces identical ids, and an edit
//! inside one section leaves the ids and content hashes of other sections
//! untouched.

use std::collections::HashMap;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::blocks::{Block, BlockKind, approx_token_count, scan_blocks};

/// Marker opening a machine-written region. Text between the begin and end
/// markers is stripped before parsing so generated output is never chunked
/// back into the corpus it was generated from.
pub const DEFAULT_GENERATED_BEGIN: &str = "<!-- loam:begin -->";
/// Marker closing a machine-written region.
pub const DEFAULT_GENERATED_END: &str = "<!-- loam:end -->";

/// Configuration for the chunker.
#[derive(Debug, Clone)]
pub struct ChunkerConfig {
    /// Soft token target: a chunk is closed at the next block end once it
    /// reaches this size.
    pub target_tokens: usize,
    /// Hard ceiling: single blocks larger than this are split mid-block.
    pub max_tokens: usize,
    /// Draft chunks below this size merge into their predecessor when they
    /// share a heading path.
    pub min_tokens: usize,
    /// Tail carried across size-triggered boundaries; zero disables overlap.
    pub overlap_tokens: usize,
    /// Block kinds that always form standalone chunks.
    pub strong_boundaries: Vec<BlockKind>,
    pub generated_begin: String,
    pub generated_end: String,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            target_tokens: 320,
            max_tokens: 512,
            min_tokens: 48,
            overlap_tokens: 32,
            strong_boundaries: vec![
                BlockKind::Rule,
                BlockKind::Callout,
                BlockKind::Table,
                BlockKind::Code,
                BlockKind::List,
            ],
            generated_begin: DEFAULT_GENERATED_BEGIN.to_string(),
            generated_end: DEFAULT_GENERATED_END.to_string(),
        }
    }
}

impl ChunkerConfig {
    pub fn with_target_tokens(mut self, tokens: usize) -> Self {
        self.target_tokens = tokens;
        self
    }

    pub fn with_max_tokens(mut self, tokens: usize) -> Self {
        self.max_tokens = tokens;
        self
    }

    pub fn with_min_tokens(mut self, tokens: usize) -> Self {
        self.min_tokens = tokens;
        self
    }

    pub fn with_overlap_tokens(mut self, tokens: usize) -> Self {
        self.overlap_tokens = tokens;
        self
    }

    pub fn with_strong_boundaries(mut self, kinds: Vec<BlockKind>) -> Self {
        self.strong_boundaries = kinds;
        self
    }

    pub fn with_generated_markers(
        mut self,
        begin: impl Into<String>,
        end: impl Into<String>,
    ) -> Self {
        self.generated_begin = begin.into();
        self.generated_end = end.into();
        self
    }
}

/// Dominant structural category of a chunk, decided by token weight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkKind {
    Text,
    Code,
    Table,
    Callout,
    List,
    Quote,
}

impl ChunkKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChunkKind::Text => "text",
            ChunkKind::Code => "code",
            ChunkKind::Table => "table",
            ChunkKind::Callout => "callout",
            ChunkKind::List => "list",
            ChunkKind::Quote => "quote",
        }
    }

    /// Parse a stored kind string; unknown values fall back to `Text`.
    pub fn parse(s: &str) -> Self {
        match s {
            "code" => ChunkKind::Code,
            "table" => ChunkKind::Table,
            "callout" => ChunkKind::Callout,
            "list" => ChunkKind::List,
            "quote" => ChunkKind::Quote,
            _ => ChunkKind::Text,
        }
    }
}

/// One retrievable chunk of a document: content plus structural metadata.
/// Embeddings are not part of this type; they attach downstream once the
/// chunk is persisted.
#[derive(Debug, Clone, Serialize)]
pub struct NoteChunk {
    /// Deterministic id derived from `(path, heading_path, ordinal)`.
    pub id: String,
    pub path: String,
    /// Enclosing section titles, outermost first.
    pub heading_path: Vec<String>,
    /// Position within the document.
    pub ordinal: usize,
    pub kind: ChunkKind,
    /// Raw chunk text.
    pub content: String,
    /// Content prefixed with a metadata passage header; this is the text
    /// that gets embedded.
    pub representation: String,
    /// Blake3 hex of `content`; drives re-embedding decisions.
    pub content_hash: String,
    pub tags: Vec<String>,
    pub links: Vec<String>,
    pub token_count: usize,
}

struct Part {
    kind: BlockKind,
    text: String,
    tokens: usize,
}

struct DraftChunk {
    heading_path: Vec<String>,
    parts: Vec<Part>,
    tokens: usize,
    /// Standalone strong-boundary chunk; exempt from fragment merging.
    structural: bool,
}

/// Splits documents into [`NoteChunk`]s. Pure and deterministic: the same
/// path and text always produce the same chunks, ids and hashes.
pub struct Chunker {
    config: ChunkerConfig,
    tag_re: Regex,
    link_re: Regex,
}

impl Default for Chunker {
    fn default() -> Self {
        Self::new(ChunkerConfig::default())
    }
}

impl Chunker {
    pub fn new(config: ChunkerConfig) -> Self {
        Self {
            config,
            tag_re: Regex::new(r"(?:^|\s)#([A-Za-z0-9_][A-Za-z0-9_/-]*)").unwrap(),
            link_re: Regex::new(r"\[\[([^\[\]|]+)(?:\|[^\[\]]*)?\]\]").unwrap(),
        }
    }

    pub fn config(&self) -> &ChunkerConfig {
        &self.config
    }

    /// Chunk a document into ordered records.
    pub fn chunk(&self, path: &str, text: &str) -> Vec<NoteChunk> {
        let cleaned = self.strip_generated(text);
        let blocks = scan_blocks(&cleaned);
        let drafts = self.assemble(blocks);
        let merged = self.merge_fragments(drafts);
        self.finalize(path, merged)
    }

    /// Remove machine-written regions delimited by the configured marker
    /// pair. An unterminated begin marker strips to end of input.
    fn strip_generated(&self, text: &str) -> String {
        let begin = &self.config.generated_begin;
        let end = &self.config.generated_end;
        if begin.is_empty() || end.is_empty() {
            return text.to_string();
        }
        let mut out = String::with_capacity(text.len());
        let mut rest = text;
        loop {
            match rest.find(begin.as_str()) {
                None => {
                    out.push_str(rest);
                    break;
                }
                Some(s) => {
                    out.push_str(&rest[..s]);
                    let after = &rest[s + begin.len()..];
                    match after.find(end.as_str()) {
                        Some(e) => rest = &after[e + end.len()..],
                        None => break,
                    }
                }
            }
        }
        out
    }

    fn assemble(&self, blocks: Vec<Block>) -> Vec<DraftChunk> {
        let mut drafts: Vec<DraftChunk> = Vec::new();
        let mut stack: Vec<String> = Vec::new();
        let mut current: Vec<Part> = Vec::new();
        let mut current_tokens = 0usize;

        let flush = |drafts: &mut Vec<DraftChunk>,
                     stack: &[String],
                     current: &mut Vec<Part>,
                     current_tokens: &mut usize| {
            if !current.is_empty() {
                drafts.push(DraftChunk {
                    heading_path: stack.to_vec(),
                    parts: std::mem::take(current),
                    tokens: *current_tokens,
                    structural: false,
                });
            }
            *current_tokens = 0;
        };

        for block in blocks {
            match block.kind {
                BlockKind::Heading => {
                    flush(&mut drafts, &stack, &mut current, &mut current_tokens);
                    let depth = block.depth.max(1) as usize;
                    stack.truncate(depth - 1);
                    stack.push(block.title.clone().unwrap_or_default());
                    current_tokens += block.tokens;
                    current.push(Part {
                        kind: BlockKind::Heading,
                        text: block.text,
                        tokens: block.tokens,
                    });
                }
                BlockKind::Rule => {
                    // A rule is a separator, never content.
                    if self.is_strong(BlockKind::Rule) {
                        flush(&mut drafts, &stack, &mut current, &mut current_tokens);
                    }
                }
                kind if self.is_strong(kind) => {
                    flush(&mut drafts, &stack, &mut current, &mut current_tokens);
                    for piece in split_by_budget(&block.text, self.config.max_tokens) {
                        let tokens = approx_token_count(&piece);
                        drafts.push(DraftChunk {
                            heading_path: stack.clone(),
                            parts: vec![Part { kind, text: piece, tokens }],
                            tokens,
                            structural: true,
                        });
                    }
                }
                kind => {
                    for piece in split_by_budget(&block.text, self.config.max_tokens) {
                        let tokens = approx_token_count(&piece);
                        if current_tokens + tokens > self.config.max_tokens && !current.is_empty()
                        {
                            self.size_flush(&mut drafts, &stack, &mut current, &mut current_tokens);
                        }
                        current_tokens += tokens;
                        current.push(Part { kind, text: piece, tokens });
                        if current_tokens >= self.config.target_tokens {
                            self.size_flush(&mut drafts, &stack, &mut current, &mut current_tokens);
                        }
                    }
                }
            }
        }
        flush(&mut drafts, &stack, &mut current, &mut current_tokens);
        drafts
    }

    /// Close the current chunk on a size boundary, seeding the next chunk
    /// with the overlap tail.
    fn size_flush(
        &self,
        drafts: &mut Vec<DraftChunk>,
        stack: &[String],
        current: &mut Vec<Part>,
        current_tokens: &mut usize,
    ) {
        if current.is_empty() {
            return;
        }
        let carry_overlap = self.config.overlap_tokens > 0
            && current.last().map(|p| !self.is_strong(p.kind)).unwrap_or(false);
        let tail = if carry_overlap {
            let joined = current
                .iter()
                .map(|p| p.text.as_str())
                .collect::<Vec<_>>()
                .join("\n");
            let tail = trailing_tokens(&joined, self.config.overlap_tokens);
            if tail.is_empty() { None } else { Some(tail) }
        } else {
            None
        };
        drafts.push(DraftChunk {
            heading_path: stack.to_vec(),
            parts: std::mem::take(current),
            tokens: *current_tokens,
            structural: false,
        });
        *current_tokens = 0;
        if let Some(text) = tail {
            let tokens = approx_token_count(&text);
            *current_tokens = tokens;
            current.push(Part {
                kind: BlockKind::Paragraph,
                text,
                tokens,
            });
        }
    }

    /// Fold undersized drafts into their predecessor when both sit under the
    /// same heading path. Standalone strong-boundary chunks never merge, and
    /// heading boundaries cannot merge because the paths differ.
    fn merge_fragments(&self, drafts: Vec<DraftChunk>) -> Vec<DraftChunk> {
        let mut merged: Vec<DraftChunk> = Vec::new();
        for draft in drafts {
            if draft.tokens < self.config.min_tokens && !draft.structural {
                if let Some(prev) = merged.last_mut() {
                    if prev.heading_path == draft.heading_path {
                        prev.tokens += draft.tokens;
                        prev.parts.extend(draft.parts);
                        prev.structural = false;
                        continue;
                    }
                }
            }
            merged.push(draft);
        }
        merged
    }

    fn finalize(&self, path: &str, drafts: Vec<DraftChunk>) -> Vec<NoteChunk> {
        drafts
            .into_iter()
            .filter(|d| d.parts.iter().any(|p| !p.text.trim().is_empty()))
            .enumerate()
            .map(|(ordinal, draft)| {
                let content = draft
                    .parts
                    .iter()
                    .map(|p| p.text.as_str())
                    .collect::<Vec<_>>()
                    .join("\n\n");
                let kind = dominant_kind(&draft.parts);
                let tags = self.extract_tags(&content);
                let links = self.extract_links(&content);
                let token_count = approx_token_count(&content);
                let content_hash = hex::encode(blake3::hash(content.as_bytes()).as_bytes());
                let id = chunk_id(path, &draft.heading_path, ordinal);
                let representation =
                    build_representation(path, &draft.heading_path, &tags, &content);
                NoteChunk {
                    id,
                    path: path.to_string(),
                    heading_path: draft.heading_path,
                    ordinal,
                    kind,
                    content,
                    representation,
                    content_hash,
                    tags,
                    links,
                    token_count,
                }
            })
            .collect()
    }

    fn is_strong(&self, kind: BlockKind) -> bool {
        self.config.strong_boundaries.contains(&kind)
    }

    fn extract_tags(&self, content: &str) -> Vec<String> {
        let mut tags = Vec::new();
        for cap in self.tag_re.captures_iter(content) {
            let tag = cap[1].to_string();
            if !tags.contains(&tag) {
                tags.push(tag);
            }
        }
        tags
    }

    fn extract_links(&self, content: &str) -> Vec<String> {
        let mut links = Vec::new();
        for cap in self.link_re.captures_iter(content) {
            let target = cap[1].trim().to_string();
            if !target.is_empty() && !links.contains(&target) {
                links.push(target);
            }
        }
        links
    }
}

/// Deterministic chunk id: truncated blake3 over the structural position.
pub fn chunk_id(path: &str, heading_path: &[String], ordinal: usize) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(path.as_bytes());
    for heading in heading_path {
        hasher.update(&[0]);
        hasher.update(heading.as_bytes());
    }
    hasher.update(&[0xff]);
    hasher.update(&(ordinal as u64).to_le_bytes());
    hex::encode(&hasher.finalize().as_bytes()[..16])
}

/// Build the embedded form of a chunk: a `passage:` header carrying path,
/// section and tags, then the content itself.
fn build_representation(
    path: &str,
    heading_path: &[String],
    tags: &[String],
    content: &str,
) -> String {
    let mut meta = serde_json::Map::new();
    meta.insert("path".to_string(), serde_json::Value::from(path));
    if !heading_path.is_empty() {
        meta.insert(
            "section".to_string(),
            serde_json::Value::from(heading_path.join(" > ")),
        );
    }
    if !tags.is_empty() {
        meta.insert(
            "tags".to_string(),
            serde_json::Value::from(tags.to_vec()),
        );
    }
    format!("passage: {}\n\n{}", serde_json::Value::Object(meta), content)
}

fn dominant_kind(parts: &[Part]) -> ChunkKind {
    let mut weights: HashMap<ChunkKind, usize> = HashMap::new();
    for part in parts {
        let bucket = match part.kind {
            BlockKind::Code => ChunkKind::Code,
            BlockKind::Table => ChunkKind::Table,
            BlockKind::Callout => ChunkKind::Callout,
            BlockKind::List => ChunkKind::List,
            BlockKind::Quote => ChunkKind::Quote,
            BlockKind::Heading | BlockKind::Paragraph | BlockKind::Rule => ChunkKind::Text,
        };
        *weights.entry(bucket).or_default() += part.tokens;
    }
    let max = weights.values().copied().max().unwrap_or(0);
    let winners: Vec<ChunkKind> = [
        ChunkKind::Text,
        ChunkKind::Code,
        ChunkKind::Table,
        ChunkKind::Callout,
        ChunkKind::List,
        ChunkKind::Quote,
    ]
    .into_iter()
    .filter(|k| weights.get(k).copied().unwrap_or(0) == max)
    .collect();
    if winners.len() == 1 {
        winners[0]
    } else {
        ChunkKind::Text
    }
}

/// Split text into pieces no larger than the token budget, preferring line
/// boundaries, then word boundaries.
fn split_by_budget(text: &str, max_tokens: usize) -> Vec<String> {
    if approx_token_count(text) <= max_tokens {
        return vec![text.to_string()];
    }
    let mut pieces = Vec::new();
    let mut buf = String::new();
    let mut buf_tokens = 0usize;
    for line in text.lines() {
        let line_tokens = approx_token_count(line);
        if line_tokens > max_tokens {
            // A single oversized line: fall back to word accumulation.
            for word in line.split_whitespace() {
                let word_tokens = approx_token_count(word);
                if buf_tokens + word_tokens > max_tokens && !buf.is_empty() {
                    pieces.push(std::mem::take(&mut buf));
                    buf_tokens = 0;
                }
                if !buf.is_empty() {
                    buf.push(' ');
                }
                buf.push_str(word);
                buf_tokens += word_tokens;
            }
            continue;
        }
        if buf_tokens + line_tokens > max_tokens && !buf.is_empty() {
            pieces.push(std::mem::take(&mut buf));
            buf_tokens = 0;
        }
        if !buf.is_empty() {
            buf.push('\n');
        }
        buf.push_str(line);
        buf_tokens += line_tokens;
    }
    if !buf.is_empty() {
        pieces.push(buf);
    }
    pieces
}

/// Last `token_budget` tokens of a span, trimmed to a word boundary.
fn trailing_tokens(text: &str, token_budget: usize) -> String {
    if token_budget == 0 {
        return String::new();
    }
    let budget_chars = token_budget * 4;
    let total_chars = text.chars().count();
    if total_chars <= budget_chars {
        return text.trim_start().to_string();
    }
    let skip = total_chars - budget_chars;
    let tail: String = text.chars().skip(skip).collect();
    match tail.find(char::is_whitespace) {
        Some(pos) => tail[pos..].trim_start().to_string(),
        None => tail,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunker() -> Chunker {
        Chunker::default()
    }

    #[test]
    fn test_heading_stack_produces_paths() {
        let text = "# Root\n\nintro text\n\n## Child\n\nchild text\n\n# Other\n\nother text\n";
        let chunks = chunker().chunk("notes/doc.md", text);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].heading_path, vec!["Root"]);
        assert_eq!(chunks[1].heading_path, vec!["Root", "Child"]);
        assert_eq!(chunks[2].heading_path, vec!["Other"]);
    }

    #[test]
    fn test_deep_heading_truncates_stack() {
        let text = "# A\n\none\n\n### B\n\ntwo\n\n## C\n\nthree\n";
        let chunks = chunker().chunk("doc.md", text);
        // ### under # keeps only the depth-1 ancestor; ## then truncates back.
        assert_eq!(chunks[1].heading_path, vec!["A", "B"]);
        assert_eq!(chunks[2].heading_path, vec!["A", "C"]);
    }

    #[test]
    fn test_ids_stable_across_rechunk() {
        let text = "# A\n\nalpha body text\n\n# B\n\nbeta body text\n";
        let first = chunker().chunk("doc.md", text);
        let second = chunker().chunk("doc.md", text);
        let first_ids: Vec<&String> = first.iter().map(|c| &c.id).collect();
        let second_ids: Vec<&String> = second.iter().map(|c| &c.id).collect();
        assert_eq!(first_ids, second_ids);
    }

    #[test]
    fn test_edit_in_one_section_leaves_other_hashes_alone() {
        let before = "# A\n\nalpha body text\n\n# B\n\nbeta body text\n";
        let after = "# A\n\nalpha body text CHANGED\n\n# B\n\nbeta body text\n";
        let old = chunker().chunk("doc.md", before);
        let new = chunker().chunk("doc.md", after);
        assert_eq!(old.len(), new.len());
        assert_ne!(old[0].content_hash, new[0].content_hash);
        assert_eq!(old[1].content_hash, new[1].content_hash);
        assert_eq!(old[1].id, new[1].id);
    }

    #[test]
    fn test_code_block_stands_alone() {
        let body = "text ".repeat(60);
        let text = format!("# H\n\n{body}\n\n```rust\nfn main() {{}}\n```\n\n{body}\n");
        let chunks = chunker().chunk("doc.md", &text);
        let code: Vec<&NoteChunk> = chunks.iter().filter(|c| c.kind == ChunkKind::Code).collect();
        assert_eq!(code.len(), 1);
        assert!(code[0].content.contains("fn main"));
        assert!(!code[0].content.contains("text text"));
    }

    #[test]
    fn test_small_fragment_merges_into_predecessor() {
        let text = "# H\n\n| a | b |\n| - | - |\n| 1 | 2 |\n\ntail line\n";
        let chunks = chunker().chunk("doc.md", text);
        // The lone paragraph after the table folds back into the table chunk.
        assert_eq!(chunks.len(), 2);
        let last = chunks.last().unwrap();
        assert!(last.content.contains("| a | b |"));
        assert!(last.content.contains("tail line"));
    }

    #[test]
    fn test_size_split_carries_overlap() {
        let config = ChunkerConfig::default()
            .with_target_tokens(40)
            .with_max_tokens(64)
            .with_min_tokens(4)
            .with_overlap_tokens(8);
        let chunker = Chunker::new(config);
        let paragraphs: Vec<String> = (0..8)
            .map(|i| format!("paragraph {i} with some sentence content inside it"))
            .collect();
        let text = paragraphs.join("\n\n");
        let chunks = chunker.chunk("doc.md", &text);
        assert!(chunks.len() > 1);
        // Each later chunk starts with the tail of its predecessor.
        let first_tail: String = chunks[0]
            .content
            .chars()
            .skip(chunks[0].content.chars().count().saturating_sub(12))
            .collect();
        assert!(chunks[1].content.contains(first_tail.trim()));
    }

    #[test]
    fn test_generated_region_stripped() {
        let text = format!(
            "# H\n\nkept text before\n\n{}\nmachine written noise\n{}\n\nkept text after\n",
            DEFAULT_GENERATED_BEGIN, DEFAULT_GENERATED_END
        );
        let chunks = chunker().chunk("doc.md", &text);
        let all: String = chunks.iter().map(|c| c.content.as_str()).collect();
        assert!(all.contains("kept text before"));
        assert!(all.contains("kept text after"));
        assert!(!all.contains("machine written noise"));
    }

    #[test]
    fn test_tags_and_links_extracted() {
        let text = "# H\n\nsee [[Other Note|alias]] and [[Second]] about #rust and #dev/tools\n";
        let chunks = chunker().chunk("doc.md", text);
        assert_eq!(chunks[0].tags, vec!["rust", "dev/tools"]);
        assert_eq!(chunks[0].links, vec!["Other Note", "Second"]);
    }

    #[test]
    fn test_representation_prefixes_metadata() {
        let text = "# Section\n\nbody about #topic\n";
        let chunks = chunker().chunk("notes/a.md", text);
        let rep = &chunks[0].representation;
        assert!(rep.starts_with("passage: {"));
        assert!(rep.contains("notes/a.md"));
        assert!(rep.contains("Section"));
        assert!(rep.contains("topic"));
        assert!(rep.ends_with(&chunks[0].content));
    }

    #[test]
    fn test_ordinals_and_unique_ids() {
        let text = "# A\n\none\n\n```\ncode\n```\n\n# B\n\ntwo\n";
        let chunks = chunker().chunk("doc.md", text);
        let mut ids: Vec<&String> = chunks.iter().map(|c| &c.id).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), chunks.len());
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.ordinal, i);
        }
    }

    #[test]
    fn test_rule_forces_boundary_without_content() {
        let text = "first part of the note\n\n---\n\nsecond part of the note\n";
        let config = ChunkerConfig::default().with_min_tokens(0);
        let chunks = Chunker::new(config).chunk("doc.md", text);
        assert_eq!(chunks.len(), 2);
        assert!(!chunks[0].content.contains("---"));
        assert!(!chunks[1].content.contains("---"));
    }

    #[test]
    fn test_dominant_kind_by_token_weight() {
        let text = "# H\n\n```\nlet a = 1;\nlet b = 2;\nlet c = 3;\nlet d = 4;\n```\n";
        let config = ChunkerConfig::default().with_strong_boundaries(vec![BlockKind::Rule]);
        let chunks = Chunker::new(config).chunk("doc.md", text);
        // Code joined with the heading still weighs in as code.
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].kind, ChunkKind::Code);
    }

    #[test]
    fn test_empty_and_whitespace_documents() {
        assert!(chunker().chunk("doc.md", "").is_empty());
        assert!(chunker().chunk("doc.md", "\n\n  \n").is_empty());
    }

    #[test]
    fn test_oversized_block_is_split() {
        let config = ChunkerConfig::default()
            .with_target_tokens(20)
            .with_max_tokens(30)
            .with_min_tokens(2)
            .with_overlap_tokens(0);
        let chunker = Chunker::new(config);
        let long_line = "word ".repeat(100);
        let chunks = chunker.chunk("doc.md", &long_line);
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.token_count <= 40, "chunk too large: {}", chunk.token_count);
        }
    }
}
