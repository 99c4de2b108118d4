/// Document and chunk records passed between the parser, chunker and store

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Metadata keys shared by documents and chunks
pub const SOURCE_KEY: &str = "source";
pub const PAGE_KEY: &str = "page";
pub const SECTION_KEY: &str = "section";
pub const CHUNK_INDEX_KEY: &str = "chunk_index";

/// One parsed unit of an uploaded file (a page, a section, or the whole file)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub content: String,
    pub metadata: BTreeMap<String, String>,
}

impl Document {
    pub fn new(content: impl Into<String>, source: impl Into<String>) -> Self {
        let mut metadata = BTreeMap::new();
        metadata.insert(SOURCE_KEY.to_string(), source.into());
        Self {
            content: content.into(),
            metadata,
        }
    }

    pub fn with_metadata(mut self, key: &str, value: impl Into<String>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    pub fn source(&self) -> Option<&str> {
        self.metadata.get(SOURCE_KEY).map(String::as_str)
    }
}

/// A token-bounded slice of a [`Document`], the unit stored in the vector index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub content: String,
    pub metadata: BTreeMap<String, String>,
}

impl Chunk {
    /// First `max_chars` characters of the content, used for previews
    pub fn preview(&self, max_chars: usize) -> String {
        self.content.chars().take(max_chars).collect()
    }
}

/// Rendered inside the LLM prompt, one line per retrieved chunk
impl fmt::Display for Chunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Document(page_content={:?}, metadata={{", self.content)?;
        for (i, (key, value)) in self.metadata.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{:?}: {:?}", key, value)?;
        }
        write!(f, "}})")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preview_counts_characters_not_bytes() {
        let chunk = Chunk {
            content: "é".repeat(150),
            metadata: BTreeMap::new(),
        };
        assert_eq!(chunk.preview(100).chars().count(), 100);
    }

    #[test]
    fn display_includes_content_and_metadata() {
        let doc = Document::new("Revenue grew 12%", "report.pdf").with_metadata(PAGE_KEY, "3");
        let chunk = Chunk {
            content: doc.content.clone(),
            metadata: doc.metadata.clone(),
        };
        let rendered = chunk.to_string();
        assert_eq!(
            rendered,
            r#"Document(page_content="Revenue grew 12%", metadata={"page": "3", "source": "report.pdf"})"#
        );
    }
}
