//! Recursive character text splitting
//!
//! Splits transcript documents into overlapping chunks suitable for
//! embedding models. The splitter tries separators in order of preference
//! (paragraph, line, word, character) and only falls back to a finer one
//! for pieces that are still too long. Lengths are measured in characters,
//! never bytes, so multi-byte text cannot be cut mid-character.

use crate::loader::Document;
use std::collections::VecDeque;

/// Default maximum number of characters per chunk
pub const DEFAULT_CHUNK_SIZE: usize = 800;

/// Default number of characters shared by consecutive chunks
pub const DEFAULT_CHUNK_OVERLAP: usize = 180;

/// Separators in order of preference. The empty separator splits into characters.
const SEPARATORS: [&str; 4] = ["\n\n", "\n", " ", ""];

#[derive(Debug, thiserror::Error)]
pub enum ChunkerError {
    #[error("chunk size must be greater than zero")]
    ZeroChunkSize,

    #[error("chunk overlap ({overlap}) must be smaller than chunk size ({size})")]
    OverlapTooLarge { size: usize, overlap: usize },
}

/// Configuration for the text splitter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkerConfig {
    /// Maximum number of characters per chunk
    pub chunk_size: usize,
    /// Number of characters to overlap between chunks
    pub chunk_overlap: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
        }
    }
}

/// A chunk of text from a document
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    /// The text content of this chunk
    pub text: String,
    /// Source document name
    pub source: String,
    /// Index of this chunk within the document (0-based)
    pub chunk_index: usize,
}

/// Splitter for breaking documents into overlapping chunks
#[derive(Debug, Clone)]
pub struct TextSplitter {
    config: ChunkerConfig,
}

impl TextSplitter {
    pub fn new(config: ChunkerConfig) -> Result<Self, ChunkerError> {
        if config.chunk_size == 0 {
            return Err(ChunkerError::ZeroChunkSize);
        }
        if config.chunk_overlap >= config.chunk_size {
            return Err(ChunkerError::OverlapTooLarge {
                size: config.chunk_size,
                overlap: config.chunk_overlap,
            });
        }
        Ok(Self { config })
    }

    /// Split a text into trimmed, non-empty chunks
    pub fn split_text(&self, text: &str) -> Vec<String> {
        self.split_recursive(text, &SEPARATORS)
            .into_iter()
            .filter_map(|chunk| {
                let trimmed = chunk.trim();
                (!trimmed.is_empty()).then(|| trimmed.to_string())
            })
            .collect()
    }

    /// Chunk a single document
    pub fn chunk_document(&self, document: &Document) -> Vec<Chunk> {
        self.split_text(&document.text)
            .into_iter()
            .enumerate()
            .map(|(i, text)| Chunk {
                text,
                source: document.source.clone(),
                chunk_index: i,
            })
            .collect()
    }

    /// Chunk multiple documents, preserving document order
    pub fn chunk_documents(&self, documents: &[Document]) -> Vec<Chunk> {
        documents
            .iter()
            .flat_map(|d| self.chunk_document(d))
            .collect()
    }

    fn split_recursive(&self, text: &str, separators: &[&str]) -> Vec<String> {
        let index = separators
            .iter()
            .position(|s| s.is_empty() || text.contains(s))
            .unwrap_or(separators.len().saturating_sub(1));
        let separator = separators.get(index).copied().unwrap_or("");
        let finer: &[&str] = if separator.is_empty() {
            &[]
        } else {
            &separators[index + 1..]
        };

        let mut chunks = Vec::new();
        let mut short_pieces: Vec<&str> = Vec::new();

        for piece in split_keeping_separator(text, separator) {
            if char_len(piece) < self.config.chunk_size {
                short_pieces.push(piece);
                continue;
            }

            if !short_pieces.is_empty() {
                chunks.extend(self.merge_pieces(&short_pieces));
                short_pieces.clear();
            }

            if finer.is_empty() {
                chunks.push(piece.to_string());
            } else {
                chunks.extend(self.split_recursive(piece, finer));
            }
        }

        if !short_pieces.is_empty() {
            chunks.extend(self.merge_pieces(&short_pieces));
        }

        chunks
    }

    /// Greedily merge pieces into chunks, carrying a tail of at most
    /// `chunk_overlap` characters into the next chunk.
    fn merge_pieces(&self, pieces: &[&str]) -> Vec<String> {
        let size = self.config.chunk_size;
        let overlap = self.config.chunk_overlap;

        let mut chunks = Vec::new();
        let mut window: VecDeque<(&str, usize)> = VecDeque::new();
        let mut total = 0;

        for &piece in pieces {
            let len = char_len(piece);

            if total + len > size && !window.is_empty() {
                if let Some(chunk) = join_window(&window) {
                    chunks.push(chunk);
                }
                while total > overlap || (total + len > size && total > 0) {
                    match window.pop_front() {
                        Some((_, dropped)) => total -= dropped,
                        None => break,
                    }
                }
            }

            window.push_back((piece, len));
            total += len;
        }

        if let Some(chunk) = join_window(&window) {
            chunks.push(chunk);
        }

        chunks
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

fn join_window(window: &VecDeque<(&str, usize)>) -> Option<String> {
    let joined: String = window.iter().map(|(piece, _)| *piece).collect();
    let trimmed = joined.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Split on `separator`, keeping each separator attached to the start of
/// the piece that follows it. Empty pieces are dropped.
fn split_keeping_separator<'a>(text: &'a str, separator: &str) -> Vec<&'a str> {
    if separator.is_empty() {
        return text
            .char_indices()
            .map(|(i, c)| &text[i..i + c.len_utf8()])
            .collect();
    }

    let mut pieces = Vec::new();
    let mut start = 0;
    for (pos, _) in text.match_indices(separator) {
        if pos > start {
            pieces.push(&text[start..pos]);
        }
        start = pos;
    }
    if start < text.len() {
        pieces.push(&text[start..]);
    }
    pieces
}
