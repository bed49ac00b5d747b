//! Wiring from [`Config`] to a ready-to-use index and [`ChatEngine`].

use anyhow::Result;
use ragchat_core::expand::QueryExpander;
use ragchat_core::{ChatEngine, MultiQueryRetriever};
use std::sync::Arc;

use crate::config::Config;
use crate::embedding;
use crate::llm;
use crate::sqlite_index::SqliteIndex;

/// Open the configured index with the configured embedding provider.
pub async fn open_index(config: &Config) -> Result<Arc<SqliteIndex>> {
    let embedder = embedding::create_provider(&config.embedding)?;
    let index = SqliteIndex::open(&config.index.path, embedder).await?;
    Ok(Arc::new(index))
}

/// Build a multi-query retriever over `index` using the configured LLM for expansion.
pub fn build_retriever(config: &Config, index: Arc<SqliteIndex>) -> Result<MultiQueryRetriever> {
    let generator = llm::create_generator(&config.llm)?;
    Ok(MultiQueryRetriever::new(
        index,
        QueryExpander::new(generator),
        config.retrieval.to_params(),
    ))
}

/// Build the chat engine: retriever, answer generator, and persona.
pub fn build_engine(config: &Config, index: Arc<SqliteIndex>) -> Result<ChatEngine> {
    let generator = llm::create_generator(&config.llm)?;
    let retriever = MultiQueryRetriever::new(
        index,
        QueryExpander::new(generator.clone()),
        config.retrieval.to_params(),
    );
    Ok(ChatEngine::new(
        retriever,
        generator,
        config.persona.to_persona(),
    ))
}
