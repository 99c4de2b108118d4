/// Token-bounded chunking
///
/// Documents are cut at whitespace boundaries into chunks of at most
/// `max_tokens` tokens, and each chunk repeats at most `overlap_tokens`
/// tokens from the end of the previous one. Token counts come from the
/// same BPE family as the embedding model (`cl100k_base` for the
/// `text-embedding-3-*` models), so chunk limits hold for the embedder.

use anyhow::{bail, Result};
use std::ops::Range;
use std::sync::Arc;

use crate::document::{Chunk, Document, CHUNK_INDEX_KEY};

/// Counts tokens the way the embedding model will
pub trait TokenCounter: Send + Sync {
    fn count(&self, text: &str) -> usize;
}

/// `cl100k_base` BPE from tiktoken
pub struct TiktokenCounter {
    bpe: tiktoken_rs::CoreBPE,
}

impl TiktokenCounter {
    pub fn cl100k() -> Result<Self> {
        Ok(Self {
            bpe: tiktoken_rs::cl100k_base()?,
        })
    }
}

impl TokenCounter for TiktokenCounter {
    fn count(&self, text: &str) -> usize {
        self.bpe.encode_ordinary(text).len()
    }
}

#[derive(Clone)]
pub struct TokenChunker {
    tokenizer: Arc<dyn TokenCounter>,
    max_tokens: usize,
    overlap_tokens: usize,
}

struct Piece {
    range: Range<usize>,
    tokens: usize,
}

impl TokenChunker {
    pub fn new(tokenizer: Arc<dyn TokenCounter>, max_tokens: usize, overlap_tokens: usize) -> Result<Self> {
        if max_tokens == 0 {
            bail!("chunk size must be greater than zero");
        }
        if overlap_tokens >= max_tokens {
            bail!(
                "chunk overlap ({}) must be smaller than chunk size ({})",
                overlap_tokens,
                max_tokens
            );
        }
        Ok(Self {
            tokenizer,
            max_tokens,
            overlap_tokens,
        })
    }

    /// Chunker backed by the `cl100k_base` tokenizer
    pub fn cl100k(max_tokens: usize, overlap_tokens: usize) -> Result<Self> {
        Self::new(Arc::new(TiktokenCounter::cl100k()?), max_tokens, overlap_tokens)
    }

    pub fn max_tokens(&self) -> usize {
        self.max_tokens
    }

    pub fn overlap_tokens(&self) -> usize {
        self.overlap_tokens
    }

    pub fn count_tokens(&self, text: &str) -> usize {
        self.tokenizer.count(text)
    }

    /// Split every document; chunks of one document stay in order
    pub fn chunk_documents(&self, documents: &[Document]) -> Vec<Chunk> {
        documents.iter().flat_map(|doc| self.chunk_document(doc)).collect()
    }

    pub fn chunk_document(&self, document: &Document) -> Vec<Chunk> {
        self.split_spans(&document.content)
            .into_iter()
            .map(|span| document.content[span].trim().to_string())
            .filter(|content| !content.is_empty())
            .enumerate()
            .map(|(idx, content)| {
                let mut metadata = document.metadata.clone();
                metadata.insert(CHUNK_INDEX_KEY.to_string(), idx.to_string());
                Chunk { content, metadata }
            })
            .collect()
    }

    /// Byte ranges of the chunks of `text`
    ///
    /// Consecutive ranges overlap; the shared text `text[next.start..prev.end]`
    /// is at most `overlap_tokens` tokens.
    pub fn split_spans(&self, text: &str) -> Vec<Range<usize>> {
        let pieces = self.pieces(text);
        if pieces.is_empty() {
            return Vec::new();
        }

        let n = pieces.len();
        let mut spans = Vec::new();
        let mut start = 0;
        let mut prev_end = 0;

        loop {
            let end = self.fit(text, &pieces, start);

            // The overlap left no room for new text, drop it
            if end <= prev_end && start < prev_end {
                start = prev_end;
                continue;
            }

            spans.push(pieces[start].range.start..pieces[end - 1].range.end);
            prev_end = end;
            if end == n {
                break;
            }
            start = self.overlap_start(text, &pieces, start, end);
        }

        spans
    }

    /// Largest `end` such that `pieces[start..end]` fits the token budget
    fn fit(&self, text: &str, pieces: &[Piece], start: usize) -> usize {
        let mut end = start;
        let mut total = 0;
        while end < pieces.len() && total + pieces[end].tokens <= self.max_tokens {
            total += pieces[end].tokens;
            end += 1;
        }
        end = end.max(start + 1);

        // Piece costs are an estimate; BPE merges across piece boundaries
        while end > start + 1 {
            let joined = &text[pieces[start].range.start..pieces[end - 1].range.end];
            if self.tokenizer.count(joined.trim()) <= self.max_tokens {
                break;
            }
            end -= 1;
        }
        end
    }

    /// First piece of the next chunk, reaching back into the current one
    fn overlap_start(&self, text: &str, pieces: &[Piece], start: usize, end: usize) -> usize {
        let mut next = end;
        if self.overlap_tokens == 0 {
            return next;
        }
        let tail_end = pieces[end - 1].range.end;
        while next > start + 1 {
            let candidate = next - 1;
            let shared = &text[pieces[candidate].range.start..tail_end];
            if self.tokenizer.count(shared) > self.overlap_tokens {
                break;
            }
            next = candidate;
        }
        next
    }

    /// Words with their trailing whitespace, oversized words split further
    fn pieces(&self, text: &str) -> Vec<Piece> {
        let mut pieces = Vec::new();
        let mut piece_start = 0;
        let mut prev_ws = true;

        for (idx, ch) in text.char_indices() {
            let ws = ch.is_whitespace();
            if prev_ws && !ws && idx > piece_start && !text[piece_start..idx].trim().is_empty() {
                self.push_piece(text, piece_start..idx, &mut pieces);
                piece_start = idx;
            }
            prev_ws = ws;
        }
        if !text[piece_start..].trim().is_empty() {
            self.push_piece(text, piece_start..text.len(), &mut pieces);
        }

        pieces
    }

    fn push_piece(&self, text: &str, range: Range<usize>, out: &mut Vec<Piece>) {
        let tokens = self.tokenizer.count(&text[range.clone()]);
        if tokens <= self.max_tokens {
            out.push(Piece { range, tokens });
            return;
        }

        let slice = &text[range.clone()];
        let mid_char = slice.chars().count() / 2;
        if mid_char == 0 {
            out.push(Piece { range, tokens });
            return;
        }
        let mid = range.start
            + slice
                .char_indices()
                .nth(mid_char)
                .map(|(i, _)| i)
                .unwrap_or(slice.len());
        self.push_piece(text, range.start..mid, out);
        self.push_piece(text, mid..range.end, out);
    }
}
