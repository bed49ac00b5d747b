//! # ragchat
//!
//! A local-first, retrieval-augmented customer support chatbot.
//!
//! Support documents are chunked, embedded, and stored in a SQLite index.
//! Each question is expanded into several phrasings, every phrasing is
//! searched, and the merged passages become the context a persona-driven
//! model answers from. Answers cite the documents they came from; when
//! nothing relevant is found the bot says so instead of guessing.
//!
//! The retrieval pipeline itself lives in [`ragchat_core`]; this crate
//! supplies configuration, HTTP-backed providers, the SQLite index,
//! ingestion, and the CLI and HTTP front ends.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────┐   ┌──────────┐
//! │  Documents  │──▶│   Ingest     │──▶│  SQLite   │
//! │ txt/md/pdf  │   │ Chunk+Embed  │   │ passages  │
//! └─────────────┘   └──────────────┘   └────┬─────┘
//!                                           │
//!                                 MultiQueryRetriever
//!                                           │
//!                      ┌────────────────────┤
//!                      ▼                    ▼
//!                 ┌──────────┐        ┌──────────┐
//!                 │   CLI    │        │   HTTP   │
//!                 │  (chat)  │        │ (/chat)  │
//!                 └──────────┘        └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! ragchat init                       # create the index
//! ragchat ingest                     # chunk and embed ./data
//! ragchat search "refund policy"     # check what the index returns
//! ragchat chat                       # talk to the assistant
//! ragchat serve                      # start the HTTP server
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration and environment overrides |
//! | [`logging`] | `tracing` subscriber setup |
//! | [`http`] | JSON client with retry shared by providers |
//! | [`embedding`] | Ollama, OpenAI, and hashed embedding providers |
//! | [`llm`] | Ollama and OpenAI chat providers |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema creation |
//! | [`sqlite_index`] | SQLite-backed vector index |
//! | [`engine`] | Wiring config into an index and chat engine |
//! | [`extract`] | Text extraction (plain text and PDF) |
//! | [`connector_fs`] | Document discovery |
//! | [`ingest`] | Incremental ingestion and rebuild |
//! | [`stats`] | Index statistics |
//! | [`search`] | Retrieval test commands |
//! | [`chat_cmd`] | Terminal chat loop |
//! | [`server`] | JSON HTTP chat server |

pub mod chat_cmd;
pub mod config;
pub mod connector_fs;
pub mod db;
pub mod embedding;
pub mod engine;
pub mod extract;
pub mod http;
pub mod ingest;
pub mod llm;
pub mod logging;
pub mod migrate;
pub mod search;
pub mod server;
pub mod sqlite_index;
pub mod stats;
