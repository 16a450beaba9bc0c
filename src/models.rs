//! Core data types flowing through the document-to-answer pipeline.
//!
//! These types represent the remote documents, extracted text, chunks, and
//! answers that move from the file store through retrieval to the caller.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// MIME string for PDF documents.
pub const MIME_PDF: &str = "application/pdf";
/// MIME string for Word (OOXML) documents.
pub const MIME_DOCX: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";
/// MIME string for plain-text files.
pub const MIME_TEXT: &str = "text/plain";
/// MIME string for PowerPoint (OOXML) presentations.
pub const MIME_PPTX: &str =
    "application/vnd.openxmlformats-officedocument.presentationml.presentation";
/// MIME string the file store uses for folders.
pub const MIME_FOLDER: &str = "application/vnd.google-apps.folder";

/// Document type as reported by the remote file store.
///
/// Extraction dispatches on this; unknown types are carried verbatim in
/// [`MimeType::Other`] so callers can still log and filter on them.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MimeType {
    Pdf,
    Docx,
    Text,
    Pptx,
    Folder,
    Other(String),
}

impl MimeType {
    pub fn parse(raw: &str) -> Self {
        match raw {
            MIME_PDF => MimeType::Pdf,
            MIME_DOCX => MimeType::Docx,
            MIME_TEXT => MimeType::Text,
            MIME_PPTX => MimeType::Pptx,
            MIME_FOLDER => MimeType::Folder,
            other => MimeType::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            MimeType::Pdf => MIME_PDF,
            MimeType::Docx => MIME_DOCX,
            MimeType::Text => MIME_TEXT,
            MimeType::Pptx => MIME_PPTX,
            MimeType::Folder => MIME_FOLDER,
            MimeType::Other(raw) => raw,
        }
    }

    /// True for the document types the extractor understands.
    pub fn is_extractable(&self) -> bool {
        matches!(
            self,
            MimeType::Pdf | MimeType::Docx | MimeType::Text | MimeType::Pptx
        )
    }
}

impl std::fmt::Display for MimeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A file or folder as listed by the remote file store. Identity is `id`.
#[derive(Debug, Clone)]
pub struct DocumentReference {
    pub id: String,
    pub name: String,
    pub mime_type: MimeType,
    pub modified_time: DateTime<Utc>,
    pub is_folder: bool,
    pub parent_id: Option<String>,
}

/// A downloaded document with its extracted plain text.
///
/// The pipeline only keeps documents whose text is non-empty; an empty
/// extraction is handled as a per-file failure under the configured policy.
#[derive(Debug, Clone)]
pub struct ExtractedDocument {
    pub source: DocumentReference,
    pub text: String,
}

/// A bounded text window cut from one document.
///
/// Chunks of a document form an ordered sequence; each chunk after the first
/// shares `overlap_with_previous` characters with its predecessor. `hash` is
/// a SHA-256 of the text, used for citation identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub source_id: String,
    pub sequence_index: usize,
    pub text: String,
    pub overlap_with_previous: usize,
    pub hash: String,
}

/// A chunk paired with its embedding vector. The vector's dimension is fixed
/// by the embedding model; the pair lives only as long as the collection it
/// is inserted into.
#[derive(Debug, Clone)]
pub struct EmbeddedChunk {
    pub chunk: Chunk,
    pub vector: Vec<f32>,
}

/// One question against a set of selected files and/or folders.
#[derive(Debug, Clone, Deserialize)]
pub struct QueryRequest {
    pub question: String,
    pub target_ids: Vec<String>,
}

/// A retrieved chunk as cited in an answer, ordered by descending similarity.
#[derive(Debug, Clone, Serialize)]
pub struct RetrievedChunk {
    pub source_id: String,
    pub source_name: String,
    pub sequence_index: usize,
    pub text: String,
    pub score: f32,
}

/// The final product of the pipeline: the model's answer plus the chunks it
/// was grounded on.
#[derive(Debug, Clone, Serialize)]
pub struct AnswerResult {
    pub answer_text: String,
    pub cited_chunks: Vec<RetrievedChunk>,
}
