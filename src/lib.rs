//! # docqa
//!
//! Retrieval-augmented question answering over documents in a cloud drive.
//!
//! docqa fetches the files and folders a user selects in their drive,
//! extracts text from them (PDF, Word, plain text, presentations), chunks
//! and embeds that text, indexes it in a per-request vector collection, and
//! answers natural-language questions grounded in the retrieved chunks.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   ┌───────────────────────────┐   ┌───────────┐
//! │ Drive API  │──▶│  Pipeline                  │──▶│  LLM       │
//! │ list/fetch │   │ extract→chunk→embed→index │   │ generate  │
//! └────────────┘   └────────────┬──────────────┘   └─────┬─────┘
//!                               │                        │
//!                         ┌─────▼─────┐            ┌─────▼─────┐
//!                         │   CLI     │            │   HTTP    │
//!                         │ (docqa)   │            │ POST /query│
//!                         └───────────┘            └───────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! docqa ls                                  # browse the drive root
//! docqa ask "What is the key finding?" --target <file-or-folder-id>
//! docqa serve                               # start the HTTP boundary
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`error`] | Error taxonomy and stage attribution |
//! | [`store`] | Remote file store client (Drive v3) |
//! | [`walker`] | Recursive folder expansion |
//! | [`extract`] | Multi-format text extraction |
//! | [`chunk`] | Overlapping fixed-window chunking |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`index`] | Vector index abstraction |
//! | [`generate`] | Language model provider abstraction |
//! | [`answer`] | The per-request answer pipeline |
//! | [`server`] | HTTP boundary |

pub mod answer;
pub mod chunk;
pub mod config;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod generate;
pub mod index;
pub mod models;
pub mod server;
pub mod store;
pub mod walker;
