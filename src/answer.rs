//! Retrieval-augmented answer pipeline.
//!
//! [`Answerer`] owns the per-request flow: resolve targets → fetch & extract
//! → chunk → embed & index → retrieve → compose & generate. Collaborators
//! (file store, embedder, vector index, language model) are injected at
//! construction; each request gets a fresh `qa-<uuid>` collection that is
//! dropped before the result is returned.
//!
//! Failure anywhere surfaces as [`AnswerError`] with the stage attached;
//! a partial answer is never returned. Per-file fetch/extract failures are
//! governed by the configured [`FailurePolicy`].

use std::sync::Arc;

use futures::stream::{self, StreamExt};
use uuid::Uuid;

use crate::chunk::split;
use crate::config::{Config, FailurePolicy};
use crate::embedding::Embedder;
use crate::error::{AnswerError, PipelineError, Stage};
use crate::extract::extract_text;
use crate::generate::Generator;
use crate::index::{ChunkRef, IndexEntry, ScoredEntry, VectorIndex};
use crate::models::{
    AnswerResult, Chunk, DocumentReference, EmbeddedChunk, ExtractedDocument, QueryRequest,
    RetrievedChunk,
};
use crate::store::FileStore;
use crate::walker::{expand, MimeFilter};

pub struct Answerer {
    store: Arc<dyn FileStore>,
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    generator: Arc<dyn Generator>,
    filter: MimeFilter,
    chunk_size: usize,
    overlap: usize,
    policy: FailurePolicy,
    top_k: usize,
    max_depth: usize,
    fetch_workers: usize,
}

impl Answerer {
    pub fn new(
        store: Arc<dyn FileStore>,
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorIndex>,
        generator: Arc<dyn Generator>,
        config: &Config,
    ) -> Self {
        Self {
            store,
            embedder,
            index,
            generator,
            // Resolution admits every non-folder type; unsupported documents
            // surface at extraction where the failure policy applies.
            filter: MimeFilter::any(),
            chunk_size: config.chunking.chunk_size,
            overlap: config.chunking.overlap,
            policy: config.pipeline.on_error,
            top_k: config.retrieval.top_k,
            max_depth: config.pipeline.max_depth,
            fetch_workers: config.pipeline.fetch_workers.max(1),
        }
    }

    /// Run the full pipeline for one request.
    pub async fn answer(&self, request: &QueryRequest) -> Result<AnswerResult, AnswerError> {
        // 1. Resolve
        let files = expand(
            self.store.as_ref(),
            &request.target_ids,
            &self.filter,
            self.max_depth,
        )
        .await
        .map_err(|e| AnswerError::new(Stage::Resolve, e))?;
        if files.is_empty() {
            return Err(AnswerError::new(Stage::Resolve, PipelineError::NoDocuments));
        }
        tracing::info!(files = files.len(), "resolved target documents");

        // 2. Fetch & extract
        let documents = self.fetch_and_extract_all(files).await?;
        tracing::info!(documents = documents.len(), "extracted documents");

        // 3. Chunk
        let chunks = self
            .chunk_documents(&documents)
            .map_err(|e| AnswerError::new(Stage::Chunk, e))?;
        tracing::info!(chunks = chunks.len(), "chunked documents");

        // 4. Embed
        let texts: Vec<String> = chunks.iter().map(|chunk| chunk.text.clone()).collect();
        let vectors = self
            .embedder
            .embed(&texts)
            .await
            .map_err(|e| AnswerError::new(Stage::Embed, e))?;
        if vectors.len() != chunks.len() {
            return Err(AnswerError::new(
                Stage::Embed,
                PipelineError::RemoteCall(format!(
                    "embedding count mismatch: {} texts, {} vectors",
                    chunks.len(),
                    vectors.len()
                )),
            ));
        }
        let embedded: Vec<EmbeddedChunk> = chunks
            .into_iter()
            .zip(vectors)
            .map(|(chunk, vector)| EmbeddedChunk { chunk, vector })
            .collect();

        // 5. Index into a collection owned by this request
        let collection = format!("qa-{}", Uuid::new_v4());
        self.index
            .create_collection(&collection, self.embedder.dims())
            .await
            .map_err(|e| AnswerError::new(Stage::Index, e))?;

        let names: std::collections::HashMap<&str, &str> = documents
            .iter()
            .map(|doc| (doc.source.id.as_str(), doc.source.name.as_str()))
            .collect();
        let entries: Vec<IndexEntry> = embedded
            .into_iter()
            .map(|EmbeddedChunk { chunk, vector }| IndexEntry {
                vector,
                metadata: ChunkRef {
                    source_id: chunk.source_id.clone(),
                    source_name: names
                        .get(chunk.source_id.as_str())
                        .copied()
                        .unwrap_or_default()
                        .to_string(),
                    sequence_index: chunk.sequence_index,
                    hash: chunk.hash.clone(),
                },
                text: chunk.text,
            })
            .collect();

        let result = match self.index.upsert(&collection, entries).await {
            Err(e) => Err(AnswerError::new(Stage::Index, e)),
            Ok(()) => self.retrieve_and_generate(&request.question, &collection).await,
        };

        // Best-effort cleanup on both paths; the collection name is never reused.
        if let Err(e) = self.index.drop_collection(&collection).await {
            tracing::warn!(collection = %collection, error = %e, "failed to drop request collection");
        }

        result
    }

    /// Download and extract every file over a bounded worker pool.
    /// `buffered` preserves input order, so results come back in source order.
    async fn fetch_and_extract_all(
        &self,
        files: Vec<DocumentReference>,
    ) -> Result<Vec<ExtractedDocument>, AnswerError> {
        let outcomes: Vec<(DocumentReference, Result<String, (Stage, PipelineError)>)> =
            stream::iter(files)
                .map(|file| {
                    let store = self.store.clone();
                    async move {
                        let outcome = fetch_and_extract(store.as_ref(), &file).await;
                        (file, outcome)
                    }
                })
                .buffered(self.fetch_workers)
                .collect()
                .await;

        let mut documents = Vec::with_capacity(outcomes.len());
        for (file, outcome) in outcomes {
            match outcome {
                Ok(text) => documents.push(ExtractedDocument { source: file, text }),
                Err((stage, cause)) => match self.policy {
                    FailurePolicy::Strict => return Err(AnswerError::new(stage, cause)),
                    FailurePolicy::Lenient => {
                        tracing::warn!(file = %file.name, error = %cause, "skipping document");
                    }
                },
            }
        }

        if documents.is_empty() {
            return Err(AnswerError::new(Stage::Extract, PipelineError::NoDocuments));
        }
        Ok(documents)
    }

    fn chunk_documents(
        &self,
        documents: &[ExtractedDocument],
    ) -> Result<Vec<Chunk>, PipelineError> {
        let mut chunks = Vec::new();
        for document in documents {
            chunks.extend(split(
                &document.source.id,
                &document.text,
                self.chunk_size,
                self.overlap,
            )?);
        }
        Ok(chunks)
    }

    async fn retrieve_and_generate(
        &self,
        question: &str,
        collection: &str,
    ) -> Result<AnswerResult, AnswerError> {
        let query_vector = self
            .embedder
            .embed_query(question)
            .await
            .map_err(|e| AnswerError::new(Stage::Retrieve, e))?;
        let hits = self
            .index
            .query(collection, &query_vector, self.top_k)
            .await
            .map_err(|e| AnswerError::new(Stage::Retrieve, e))?;

        let prompt = compose_prompt(question, &hits);
        let answer_text = self
            .generator
            .generate(&prompt)
            .await
            .map_err(|e| AnswerError::new(Stage::Generate, e))?;

        let cited_chunks = hits
            .into_iter()
            .map(|hit| RetrievedChunk {
                source_id: hit.metadata.source_id,
                source_name: hit.metadata.source_name,
                sequence_index: hit.metadata.sequence_index,
                text: hit.text,
                score: hit.score,
            })
            .collect();

        Ok(AnswerResult {
            answer_text,
            cited_chunks,
        })
    }
}

async fn fetch_and_extract(
    store: &dyn FileStore,
    file: &DocumentReference,
) -> Result<String, (Stage, PipelineError)> {
    let bytes = store
        .download(&file.id)
        .await
        .map_err(|e| (Stage::Fetch, e))?;
    let text = extract_text(&bytes, &file.mime_type).map_err(|e| (Stage::Extract, e))?;
    if text.trim().is_empty() {
        return Err((
            Stage::Extract,
            PipelineError::Decode(format!("no extractable text in '{}'", file.name)),
        ));
    }
    Ok(text)
}

/// Assemble the generation prompt: retrieved chunks as labelled context, then
/// the question, with the instruction to answer only from that context.
fn compose_prompt(question: &str, context: &[ScoredEntry]) -> String {
    let sections: Vec<String> = context
        .iter()
        .map(|entry| {
            format!(
                "[{}, chunk {}]\n{}",
                entry.metadata.source_name, entry.metadata.sequence_index, entry.text
            )
        })
        .collect();

    format!(
        "You are an expert assistant with extensive knowledge in various domains. \
Use the provided context to answer the question accurately and concisely.\n\n\
Context:\n{}\n\n\
Question: {}\n\n\
Instructions:\n\
- Provide a detailed and accurate answer based on the context\n\
- If the information isn't in the context, state \"I don't have enough information to answer this question\"\n\
- Include relevant quotes or references from the document when applicable\n\
- Be clear and concise in your response\n\n\
Answer:",
        sections.join("\n\n"),
        question
    )
}
