//! Interactive terminal chat.
//!
//! Reads one message per line from stdin and prints the assistant's reply.
//! Three words are commands rather than messages: `exit` (or `quit`) ends
//! the session, `clear` forgets the conversation so the persona introduces
//! itself again, and `reload` re-ingests the documents root.

use anyhow::Result;
use ragchat_core::{RagError, Session};
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::warn;

use crate::config::Config;
use crate::engine;
use crate::ingest;

/// One line of terminal input.
#[derive(Debug, PartialEq, Eq)]
enum Input<'a> {
    Exit,
    Clear,
    Reload,
    Blank,
    Message(&'a str),
}

fn parse_input(line: &str) -> Input<'_> {
    let trimmed = line.trim();
    match trimmed.to_lowercase().as_str() {
        "" => Input::Blank,
        "exit" | "quit" => Input::Exit,
        "clear" => Input::Clear,
        "reload" => Input::Reload,
        _ => Input::Message(trimmed),
    }
}

pub async fn run_chat(config: &Config) -> Result<()> {
    let index = engine::open_index(config).await?;
    let chat = engine::build_engine(config, index.clone())?;
    let mut session = Session::new();

    let persona = chat.persona();
    println!("{} from {} — customer support", persona.name, persona.company);
    println!("Type your question. Commands: clear, reload, exit.");
    println!();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("You: ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };

        match parse_input(&line) {
            Input::Blank => continue,
            Input::Exit => break,
            Input::Clear => {
                chat.clear(&mut session);
                println!("Conversation cleared.");
            }
            Input::Reload => match ingest::ingest_all(config, &index).await {
                Ok(report) => println!(
                    "Reloaded: {} added, {} removed.",
                    report.passages_added, report.passages_removed
                ),
                Err(e) => println!("Reload failed: {:#}", e),
            },
            Input::Message(text) => match chat.respond(&mut session, text).await {
                Ok(reply) => println!("\nAssistant: {}\n", reply.text),
                Err(RagError::IndexUnavailable(_)) => {
                    println!("The knowledge base is not ready. Run `ragchat ingest` first.");
                }
                Err(e) => {
                    warn!(error = %e, "exchange failed");
                    println!("Sorry, something went wrong answering that. Please try again.");
                }
            },
        }
    }

    println!("Goodbye!");
    index.close().await;
    Ok(())
}
