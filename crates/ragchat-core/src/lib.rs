//! # ragchat core
//!
//! Runtime-agnostic logic for ragchat: passage model, provider traits,
//! the multi-query retrieval pipeline, context assembly, and the persona
//! chat loop that ties them together.
//!
//! This crate contains no tokio, sqlx, filesystem I/O, or network code.
//! Concrete embedding, generation, and index backends live in the `ragchat`
//! application crate and plug in through the traits defined here.
//!
//! ## Request flow
//!
//! ```text
//! query ─▶ ChatEngine::respond
//!             │
//!             ├─▶ MultiQueryRetriever::retrieve
//!             │      ├─▶ QueryExpander::expand ─▶ GenerationProvider
//!             │      └─▶ VectorIndex::search  × variants
//!             ├─▶ context::assemble
//!             ├─▶ GenerationProvider::generate
//!             └─▶ Session (history + introduction flag)
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`models`] | `Passage`, `ScoredPassage`, chat messages and turns |
//! | [`error`] | `RagError` failure taxonomy |
//! | [`embedding`] | Embedding provider trait and vector math |
//! | [`generation`] | Text generation provider trait |
//! | [`store`] | `VectorIndex` trait and the in-memory index |
//! | [`chunk`] | Recursive character chunker and passage ids |
//! | [`expand`] | Query expansion into phrasing variants |
//! | [`retrieve`] | Multi-query retrieval, dedup, threshold fallback, ranking |
//! | [`context`] | Rendering ranked passages into a prompt block |
//! | [`conversation`] | Per-session history and persona state |
//! | [`chat`] | Response orchestration and citations |

pub mod chat;
pub mod chunk;
pub mod context;
pub mod conversation;
pub mod embedding;
pub mod error;
pub mod expand;
pub mod generation;
pub mod models;
pub mod retrieve;
pub mod store;

pub use chat::{ChatEngine, Persona, Reply, ReplyKind};
pub use conversation::{Phase, Session};
pub use error::RagError;
pub use models::{ChatMessage, Passage, Role, ScoredPassage};
pub use retrieve::{DedupPolicy, MultiQueryRetriever, RetrievalParams, RetrievalResult};
