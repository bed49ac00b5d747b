//! Ingestion pipeline: discover → extract → chunk → embed → store.
//!
//! Ingestion is incremental. Passage ids are content-derived, so unchanged
//! chunks are skipped without re-embedding, edited chunks get new ids, and
//! ids that no longer correspond to any chunk of a re-read file are
//! deleted. A full scan also drops passages whose file has disappeared from
//! the documents root; files added from outside the root are left alone.
//! Files that fail extraction are logged and skipped; their existing
//! passages are kept.

use anyhow::{bail, Result};
use ragchat_core::chunk::chunk_document;
use ragchat_core::store::VectorIndex;
use std::collections::HashSet;
use std::io::{BufRead, Write};
use std::path::Path;
use tracing::{info, warn};

use crate::config::{ChunkingConfig, Config};
use crate::connector_fs::{document_at, is_outside_root, scan_documents, DocumentFile};
use crate::engine;
use crate::extract::extract_file;
use crate::sqlite_index::SqliteIndex;

/// Counts from one ingestion run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct IngestReport {
    pub files_read: usize,
    pub files_skipped: usize,
    pub passages_added: usize,
    pub passages_unchanged: usize,
    pub passages_removed: usize,
}

impl IngestReport {
    fn print(&self, label: &str) {
        println!("{}", label);
        println!("  files read: {}", self.files_read);
        if self.files_skipped > 0 {
            println!("  files skipped: {}", self.files_skipped);
        }
        println!("  passages added: {}", self.passages_added);
        println!("  passages unchanged: {}", self.passages_unchanged);
        println!("  passages removed: {}", self.passages_removed);
        println!("ok");
    }
}

/// Ingest `files` into `index`.
///
/// With `prune_missing`, passages of root files not among `files` are
/// removed too; use it only when `files` is a complete scan.
pub async fn ingest_files(
    index: &SqliteIndex,
    files: &[DocumentFile],
    chunking: &ChunkingConfig,
    prune_missing: bool,
) -> Result<IngestReport> {
    index.ensure_index().await?;
    let mut report = IngestReport::default();

    for file in files {
        let text = match extract_file(&file.path) {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "skipping file");
                report.files_skipped += 1;
                continue;
            }
        };
        report.files_read += 1;

        let passages = chunk_document(
            &file.origin,
            &text,
            chunking.chunk_size,
            chunking.chunk_overlap,
        );
        let added = index.upsert_batch(&passages).await?;
        report.passages_added += added;
        report.passages_unchanged += passages.len() - added;

        let current: HashSet<&str> = passages.iter().map(|p| p.source_id.as_str()).collect();
        for stale in index.ids_for_origin(&file.origin).await? {
            if !current.contains(stale.as_str()) && index.delete_by_id(&stale).await? {
                report.passages_removed += 1;
            }
        }

        info!(origin = %file.origin, passages = passages.len(), added, "ingested");
    }

    if prune_missing {
        let scanned: HashSet<&str> = files.iter().map(|f| f.origin.as_str()).collect();
        for entry in index.origin_counts().await? {
            if scanned.contains(entry.origin.as_str()) || is_outside_root(&entry.origin) {
                continue;
            }
            for id in index.ids_for_origin(&entry.origin).await? {
                if index.delete_by_id(&id).await? {
                    report.passages_removed += 1;
                }
            }
            info!(origin = %entry.origin, "removed passages of missing file");
        }
    }

    Ok(report)
}

/// `ragchat init`: create the index schema.
pub async fn run_init(config: &Config) -> Result<()> {
    let index = engine::open_index(config).await?;
    index.ensure_index().await?;
    println!("Index initialized at {}", index.path().display());
    index.close().await;
    Ok(())
}

/// `ragchat ingest`: incremental update from the documents root.
pub async fn run_ingest(config: &Config) -> Result<()> {
    let index = engine::open_index(config).await?;
    let report = ingest_all(config, &index).await?;
    report.print("ingest");
    index.close().await;
    Ok(())
}

/// Scan the documents root and ingest everything found.
pub async fn ingest_all(config: &Config, index: &SqliteIndex) -> Result<IngestReport> {
    let files = scan_documents(&config.documents)?;
    if files.is_empty() {
        warn!(root = %config.documents.root.display(), "no documents found");
    }
    ingest_files(index, &files, &config.chunking, true).await
}

/// `ragchat add <file>`: ingest one file.
pub async fn run_add(config: &Config, file: &Path) -> Result<()> {
    if !file.is_file() {
        bail!("Not a file: {}", file.display());
    }
    let doc = document_at(&config.documents.root, file)?;

    let index = engine::open_index(config).await?;
    let report = ingest_files(&index, std::slice::from_ref(&doc), &config.chunking, false).await?;
    if report.files_skipped > 0 {
        index.close().await;
        bail!("Could not extract text from {}", file.display());
    }
    report.print(&format!("add {}", doc.origin));
    index.close().await;
    Ok(())
}

/// `ragchat rebuild`: clear the index and ingest from scratch.
pub async fn run_rebuild(config: &Config, yes: bool) -> Result<()> {
    if !yes && !confirm("This will delete every indexed passage and re-embed all documents. Continue?")? {
        println!("Aborted.");
        return Ok(());
    }

    let index = engine::open_index(config).await?;
    index.ensure_index().await?;
    index.clear().await?;
    let report = ingest_all(config, &index).await?;
    report.print("rebuild");
    index.close().await;
    Ok(())
}

fn confirm(question: &str) -> Result<bool> {
    print!("{} [y/N] ", question);
    std::io::stdout().flush()?;
    let mut answer = String::new();
    std::io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
}
