//! Response orchestration: retrieval, prompt building, generation, citations.
//!
//! [`ChatEngine::respond`] runs one exchange against a caller-owned
//! [`Session`]:
//!
//! 1. Retrieve passages for the question ([`MultiQueryRetriever`]).
//! 2. If nothing was found, answer with [`NO_INFORMATION_REPLY`] without
//!    calling the model, and record the exchange.
//! 3. Otherwise build a phase-specific system prompt and a user prompt
//!    carrying the context, recent history, and the question; generate once.
//! 4. Append a `Sources:` block to the visible text. The stored assistant
//!    turn keeps the raw answer so citations never re-enter later prompts.
//!
//! The session is only mutated once the exchange has completed. A failed
//! generation leaves it exactly as it was.

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::context::assemble;
use crate::conversation::{Phase, Session};
use crate::error::RagError;
use crate::generation::GenerationProvider;
use crate::models::{format_score, ChatMessage};
use crate::retrieve::{MultiQueryRetriever, RetrievalResult};

/// Fixed answer when retrieval finds nothing usable.
pub const NO_INFORMATION_REPLY: &str = "I'm sorry, but I don't have any information about that. \
Could you rephrase your question, or ask me about something else?";

/// Who the assistant presents itself as.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Persona {
    pub name: String,
    pub company: String,
}

impl Default for Persona {
    fn default() -> Self {
        Self {
            name: "Alex".to_string(),
            company: "TechFlow Solutions".to_string(),
        }
    }
}

impl Persona {
    /// System instruction for the given conversation phase.
    pub fn system_prompt(&self, phase: Phase) -> String {
        match phase {
            Phase::Fresh => format!(
                "You are a helpful customer service representative for {company}. \
Your name is {name}. This is the first interaction, so briefly introduce yourself.\n\
Be friendly, professional, and conversational. Keep responses concise and natural.\n\
Use the provided context to answer questions accurately.\n\
If you don't know something, politely say so.",
                company = self.company,
                name = self.name
            ),
            Phase::Ongoing => format!(
                "You are {name}, a customer service representative for {company}.\n\
You've already introduced yourself, so don't do it again.\n\
Be friendly, professional, and conversational. Keep responses concise and natural.\n\
Use the provided context to answer questions accurately, and when it helps, \
mention naturally where the information comes from.\n\
If you don't know something, politely say so.",
                company = self.company,
                name = self.name
            ),
        }
    }
}

/// Build the user message: context, recent history, and the question.
pub fn user_prompt(context: &str, history: &str, query: &str) -> String {
    format!(
        "Based on this information:\n{context}\n\n\
Previous conversation:\n{history}\n\n\
Customer's question: {query}\n\n\
Provide a helpful, natural response."
    )
}

/// One unique source behind an answer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Citation {
    pub origin: String,
    pub score: f32,
}

/// Unique origins in result order, each with the first score seen.
pub fn citations(result: &RetrievalResult) -> Vec<Citation> {
    let mut seen = HashSet::new();
    result
        .iter()
        .filter(|entry| seen.insert(entry.origin().to_string()))
        .map(|entry| Citation {
            origin: entry.origin().to_string(),
            score: entry.score,
        })
        .collect()
}

/// Render citations as a trailing `Sources:` block, or nothing if empty.
pub fn citations_block(citations: &[Citation]) -> String {
    if citations.is_empty() {
        return String::new();
    }
    let lines: Vec<String> = citations
        .iter()
        .map(|c| format!("- {} (relevance: {})", c.origin, format_score(c.score)))
        .collect();
    format!("Sources:\n{}", lines.join("\n"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplyKind {
    /// Answer generated from retrieved passages.
    Grounded,
    /// Nothing relevant was retrieved; the fixed apology was returned.
    NoInformation,
}

/// Outcome of one exchange.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reply {
    /// What the user sees: the answer plus the `Sources:` block.
    pub text: String,
    /// The raw answer as stored in the session.
    pub answer: String,
    pub citations: Vec<Citation>,
    pub kind: ReplyKind,
}

/// Ties retrieval, context assembly, and generation into one exchange.
#[derive(Clone)]
pub struct ChatEngine {
    retriever: MultiQueryRetriever,
    generator: Arc<dyn GenerationProvider>,
    persona: Persona,
}

impl ChatEngine {
    pub fn new(
        retriever: MultiQueryRetriever,
        generator: Arc<dyn GenerationProvider>,
        persona: Persona,
    ) -> Self {
        Self {
            retriever,
            generator,
            persona,
        }
    }

    pub fn persona(&self) -> &Persona {
        &self.persona
    }

    pub fn retriever(&self) -> &MultiQueryRetriever {
        &self.retriever
    }

    /// Answer `query` within `session`.
    ///
    /// # Errors
    ///
    /// [`RagError::IndexUnavailable`] when the index was never built and
    /// [`RagError::GenerationFailure`] when the final answer could not be
    /// generated. In both cases `session` is unchanged.
    pub async fn respond(&self, session: &mut Session, query: &str) -> Result<Reply, RagError> {
        let result = self.retriever.retrieve(query).await?;

        if result.is_empty() {
            debug!(query, "no relevant passages, returning apology");
            session.record_exchange(query, NO_INFORMATION_REPLY);
            return Ok(Reply {
                text: NO_INFORMATION_REPLY.to_string(),
                answer: NO_INFORMATION_REPLY.to_string(),
                citations: Vec::new(),
                kind: ReplyKind::NoInformation,
            });
        }

        let phase = session.phase();
        let messages = [
            ChatMessage::system(self.persona.system_prompt(phase)),
            ChatMessage::user(user_prompt(
                &assemble(&result),
                &session.render_history(),
                query,
            )),
        ];

        let answer = match self.generator.generate(&messages).await {
            Ok(answer) => answer.trim().to_string(),
            Err(e) => {
                let err = RagError::GenerationFailure(format!("{:#}", e));
                warn!(error = %err, "answer generation failed");
                return Err(err);
            }
        };

        let citations = citations(&result);
        let block = citations_block(&citations);
        let text = if block.is_empty() {
            answer.clone()
        } else {
            format!("{}\n\n{}", answer, block)
        };

        session.record_exchange(query, &answer);
        session.mark_introduced();
        debug!(?phase, sources = citations.len(), "exchange complete");

        Ok(Reply {
            text,
            answer,
            citations,
            kind: ReplyKind::Grounded,
        })
    }

    /// Reset `session` to a fresh conversation.
    pub fn clear(&self, session: &mut Session) {
        session.clear();
    }
}
