//! Deterministic text chunking.
//!
//! Chunking is a pure function of `(text, options)`: identical input always
//! yields an identical chunk sequence, which is what makes re-ingestion
//! reproducible. Two strategies exist: greedy paragraph packing (default)
//! and the fixed character window splitter kept from the legacy ingestion
//! path.

use std::sync::OnceLock;

use regex::Regex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkStrategy {
    /// Pack whole paragraphs greedily up to the target size, then prepend a
    /// trailing-overlap of the previous chunk to each subsequent chunk.
    Paragraphs,
    /// Slide fixed character windows stepping `target_size - overlap`.
    Window,
}

#[derive(Debug, Clone)]
pub struct ChunkOptions {
    /// Upper bound, in characters, for a packed chunk.
    pub target_size: usize,
    /// Characters of trailing context duplicated across adjacent chunks.
    pub overlap: usize,
    pub strategy: ChunkStrategy,
}

impl Default for ChunkOptions {
    fn default() -> Self {
        Self {
            target_size: 1200,
            overlap: 200,
            strategy: ChunkStrategy::Paragraphs,
        }
    }
}

/// One chunk in stored form plus its overlap-free body.
///
/// `content` is what gets persisted and retrieved; `body` is the chunk's own
/// packed text without the prepended overlap, available as embedding input
/// when the ingest policy excludes duplicated context from the vector.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkPiece {
    pub content: String,
    pub body: String,
}

fn horizontal_ws() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[ \t]+").expect("static pattern"))
}

fn newline_runs() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\n{3,}").expect("static pattern"))
}

fn paragraph_break() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\n\s*\n").expect("static pattern"))
}

/// Normalize raw extracted text: strip NUL bytes, unify line endings,
/// collapse horizontal whitespace runs to one space and 3+ newlines to a
/// blank line, trim.
pub fn normalize_text(text: &str) -> String {
    let unix = text.replace('\0', "").replace("\r\n", "\n");
    let collapsed = horizontal_ws().replace_all(&unix, " ");
    let squeezed = newline_runs().replace_all(&collapsed, "\n\n");
    squeezed.trim().to_string()
}

/// Split `text` into chunks in stored form. See [`chunk_pieces`] for the
/// variant that also exposes overlap-free bodies.
pub fn chunk(text: &str, opts: &ChunkOptions) -> Vec<String> {
    chunk_pieces(text, opts)
        .into_iter()
        .map(|piece| piece.content)
        .collect()
}

/// Split `text` into chunks, keeping both stored content and overlap-free
/// body per chunk. Empty or whitespace-only input yields an empty sequence.
pub fn chunk_pieces(text: &str, opts: &ChunkOptions) -> Vec<ChunkPiece> {
    let clean = normalize_text(text);
    if clean.is_empty() {
        return Vec::new();
    }

    match opts.strategy {
        ChunkStrategy::Paragraphs => {
            let packed = pack_paragraphs(&clean, opts.target_size);
            with_overlap(packed, opts.overlap)
        }
        ChunkStrategy::Window => split_windows(&clean, opts.target_size, opts.overlap)
            .into_iter()
            .map(|body| ChunkPiece {
                content: body.clone(),
                body,
            })
            .collect(),
    }
}

/// Greedily pack paragraphs into buffers of at most `target_size` chars.
/// A single paragraph longer than the target is not split further: it
/// becomes one oversized chunk.
fn pack_paragraphs(clean: &str, target_size: usize) -> Vec<String> {
    let paragraphs = paragraph_break()
        .split(clean)
        .map(str::trim)
        .filter(|p| !p.is_empty());

    let mut chunks = Vec::new();
    let mut buf = String::new();
    let mut buf_chars = 0usize;

    for para in paragraphs {
        let para_chars = para.chars().count();
        if buf.is_empty() {
            buf.push_str(para);
            buf_chars = para_chars;
        } else if buf_chars + 2 + para_chars <= target_size {
            buf.push_str("\n\n");
            buf.push_str(para);
            buf_chars += 2 + para_chars;
        } else {
            chunks.push(std::mem::take(&mut buf));
            buf.push_str(para);
            buf_chars = para_chars;
        }
    }

    if !buf.is_empty() {
        chunks.push(buf);
    }
    chunks
}

/// Prepend the trailing `overlap` characters of each previous post-packing
/// chunk to the next one, joined by a newline. No-op for a single chunk.
fn with_overlap(packed: Vec<String>, overlap: usize) -> Vec<ChunkPiece> {
    if packed.len() <= 1 || overlap == 0 {
        return packed
            .into_iter()
            .map(|body| ChunkPiece {
                content: body.clone(),
                body,
            })
            .collect();
    }

    let mut pieces = Vec::with_capacity(packed.len());
    for (i, body) in packed.iter().enumerate() {
        let content = if i == 0 {
            body.clone()
        } else {
            format!("{}\n{}", tail_chars(&packed[i - 1], overlap), body)
        };
        pieces.push(ChunkPiece {
            content,
            body: body.clone(),
        });
    }
    pieces
}

/// Fixed character windows stepping `target_size - overlap`, trimmed,
/// empties dropped.
fn split_windows(clean: &str, target_size: usize, overlap: usize) -> Vec<String> {
    let chars: Vec<char> = clean.chars().collect();
    let total = chars.len();
    let step = target_size.saturating_sub(overlap).max(1);

    let mut chunks = Vec::new();
    let mut start = 0;
    while start < total {
        let end = (start + target_size).min(total);
        let slice: String = chars[start..end].iter().collect();
        let trimmed = slice.trim();
        if !trimmed.is_empty() {
            chunks.push(trimmed.to_string());
        }
        if end >= total {
            break;
        }
        start += step;
    }
    chunks
}

fn tail_chars(s: &str, n: usize) -> &str {
    let count = s.chars().count();
    if count <= n {
        return s;
    }
    let start = s
        .char_indices()
        .nth(count - n)
        .map(|(i, _)| i)
        .unwrap_or(0);
    &s[start..]
}
