/// Document parsing
///
/// Turns an uploaded file into an ordered list of [`Document`]s. PDFs are
/// split per page, Markdown per heading section, and plain-text formats are
/// returned as a single document.

use async_trait::async_trait;
use std::path::Path;

use crate::document::{Document, PAGE_KEY, SECTION_KEY};
use crate::error::ParseError;

/// Extensions read verbatim as UTF-8 text
const TEXT_EXTENSIONS: &[&str] = &[
    "txt", "text", "log", "csv", "tsv", "json", "yaml", "yml", "toml", "xml", "html", "htm",
    "rst", "tex",
];

const MARKDOWN_EXTENSIONS: &[&str] = &["md", "markdown"];

#[async_trait]
pub trait DocumentParser: Send + Sync {
    /// Parse the file at `path`; `display_name` is the user-facing file name
    /// recorded as the documents' source
    async fn parse(&self, path: &Path, display_name: &str) -> Result<Vec<Document>, ParseError>;
}

/// Parser dispatching on the file extension
#[derive(Debug, Default, Clone)]
pub struct FileParser;

impl FileParser {
    pub fn new() -> Self {
        Self
    }

    pub fn is_supported(extension: &str) -> bool {
        let ext = extension.to_lowercase();
        ext == "pdf"
            || MARKDOWN_EXTENSIONS.contains(&ext.as_str())
            || TEXT_EXTENSIONS.contains(&ext.as_str())
    }

    async fn parse_pdf(&self, path: &Path, display_name: &str) -> Result<Vec<Document>, ParseError> {
        let bytes = read_bytes(path).await?;

        // pdf-extract is CPU bound and synchronous
        let pages = tokio::task::spawn_blocking(move || {
            pdf_extract::extract_text_from_mem_by_pages(&bytes)
        })
        .await
        .map_err(|e| unreadable(path, e))?
        .map_err(|e| unreadable(path, e))?;

        Ok(pages
            .into_iter()
            .enumerate()
            .filter(|(_, text)| !text.trim().is_empty())
            .map(|(idx, text)| {
                Document::new(text.trim(), display_name).with_metadata(PAGE_KEY, (idx + 1).to_string())
            })
            .collect())
    }

    async fn parse_text(&self, path: &Path) -> Result<String, ParseError> {
        let bytes = read_bytes(path).await?;
        String::from_utf8(bytes).map_err(|e| unreadable(path, e))
    }
}

#[async_trait]
impl DocumentParser for FileParser {
    async fn parse(&self, path: &Path, display_name: &str) -> Result<Vec<Document>, ParseError> {
        let extension = Path::new(display_name)
            .extension()
            .or_else(|| path.extension())
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_lowercase();

        log::debug!("Parsing {} as '{}'", path.display(), extension);

        let docs = if extension == "pdf" {
            self.parse_pdf(path, display_name).await?
        } else if MARKDOWN_EXTENSIONS.contains(&extension.as_str()) {
            split_markdown_sections(&self.parse_text(path).await?, display_name)
        } else if TEXT_EXTENSIONS.contains(&extension.as_str()) {
            let text = self.parse_text(path).await?;
            if text.trim().is_empty() {
                Vec::new()
            } else {
                vec![Document::new(text.trim(), display_name)]
            }
        } else {
            return Err(ParseError::Unsupported {
                extension: if extension.is_empty() {
                    "(none)".to_string()
                } else {
                    extension
                },
            });
        };

        if docs.is_empty() {
            return Err(ParseError::Empty);
        }

        log::debug!("Parsed {} into {} documents", display_name, docs.len());
        Ok(docs)
    }
}

/// Split Markdown into one document per heading section
///
/// Text before the first heading becomes its own document without a
/// section marker.
pub fn split_markdown_sections(text: &str, source: &str) -> Vec<Document> {
    let mut docs = Vec::new();
    let mut heading: Option<String> = None;
    let mut body = String::new();

    let mut flush = |heading: &Option<String>, body: &mut String| {
        if !body.trim().is_empty() {
            let mut doc = Document::new(body.trim(), source);
            if let Some(h) = heading {
                doc = doc.with_metadata(SECTION_KEY, h.clone());
            }
            docs.push(doc);
        }
        body.clear();
    };

    let mut fence: Option<&str> = None;
    for line in text.lines() {
        let trimmed = line.trim_start();
        match fence {
            Some(marker) if trimmed.starts_with(marker) => fence = None,
            Some(_) => {}
            None => {
                if let Some(marker) = ["```", "~~~"].into_iter().find(|m| trimmed.starts_with(m)) {
                    fence = Some(marker);
                } else if let Some(title) = atx_heading(trimmed) {
                    flush(&heading, &mut body);
                    heading = Some(title.to_string());
                }
            }
        }
        body.push_str(line);
        body.push('\n');
    }
    flush(&heading, &mut body);

    docs
}

/// Title of an ATX heading: one to six `#` followed by whitespace and text
fn atx_heading(line: &str) -> Option<&str> {
    let level = line.chars().take_while(|c| *c == '#').count();
    if !(1..=6).contains(&level) {
        return None;
    }
    let rest = &line[level..];
    if !rest.starts_with([' ', '\t']) {
        return None;
    }
    let title = rest.trim().trim_end_matches('#').trim();
    (!title.is_empty()).then_some(title)
}

async fn read_bytes(path: &Path) -> Result<Vec<u8>, ParseError> {
    tokio::fs::read(path).await.map_err(|e| unreadable(path, e))
}

fn unreadable(path: &Path, err: impl std::fmt::Display) -> ParseError {
    ParseError::Unreadable {
        path: path.to_path_buf(),
        reason: err.to_string(),
    }
}
