//! Filesystem document discovery.
//!
//! Walks `[documents].root`, keeps files matching the include globs and not
//! matching the exclude globs (plus `.git`, `target`, `node_modules`), and
//! returns them sorted by their root-relative path.

use anyhow::{bail, Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::config::DocumentsConfig;

/// A document file found under the documents root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentFile {
    /// Absolute or root-joined path used for reading.
    pub path: PathBuf,
    /// Passage origin: root-relative for files under the root, the full
    /// path otherwise.
    pub origin: String,
}

pub fn scan_documents(config: &DocumentsConfig) -> Result<Vec<DocumentFile>> {
    let root = &config.root;
    if !root.exists() {
        bail!("Documents root does not exist: {}", root.display());
    }

    let include_set = build_globset(&config.include_globs)?;

    let mut excludes = vec![
        "**/.git/**".to_string(),
        "**/target/**".to_string(),
        "**/node_modules/**".to_string(),
    ];
    excludes.extend(config.exclude_globs.iter().cloned());
    let exclude_set = build_globset(&excludes)?;

    let mut files = Vec::new();
    for entry in WalkDir::new(root).follow_links(config.follow_symlinks) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let origin = origin_for(root, path);

        if exclude_set.is_match(&origin) || !include_set.is_match(&origin) {
            continue;
        }

        files.push(DocumentFile {
            path: path.to_path_buf(),
            origin,
        });
    }

    files.sort_by(|a, b| a.origin.cmp(&b.origin));
    Ok(files)
}

/// Root-relative path with `/` separators; the path unchanged if it is outside `root`.
pub fn origin_for(root: &Path, path: &Path) -> String {
    match path.strip_prefix(root) {
        Ok(relative) => relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/"),
        Err(_) => path.display().to_string(),
    }
}

/// Whether `origin` names a file outside the documents root.
pub fn is_outside_root(origin: &str) -> bool {
    Path::new(origin).is_absolute()
}

/// A single file given on the command line, keyed the way a scan of `root`
/// would key it. Files outside the root get their canonical path as origin.
pub fn document_at(root: &Path, file: &Path) -> Result<DocumentFile> {
    let path = std::fs::canonicalize(file)
        .with_context(|| format!("Failed to resolve {}", file.display()))?;
    let root = std::fs::canonicalize(root).unwrap_or_else(|_| root.to_path_buf());
    Ok(DocumentFile {
        origin: origin_for(&root, &path),
        path,
    })
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn config(root: &Path) -> DocumentsConfig {
        DocumentsConfig {
            root: root.to_path_buf(),
            ..DocumentsConfig::default()
        }
    }

    #[test]
    fn test_scan_filters_and_sorts() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("policies")).unwrap();
        fs::create_dir_all(root.join(".git")).unwrap();
        fs::write(root.join("pricing.txt"), "plans").unwrap();
        fs::write(root.join("policies/refunds.md"), "refunds").unwrap();
        fs::write(root.join("logo.png"), [0u8, 1, 2]).unwrap();
        fs::write(root.join(".git/notes.txt"), "ignored").unwrap();

        let files = scan_documents(&config(root)).unwrap();
        let origins: Vec<&str> = files.iter().map(|f| f.origin.as_str()).collect();
        assert_eq!(origins, vec!["policies/refunds.md", "pricing.txt"]);
    }

    #[test]
    fn test_exclude_globs_apply() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        fs::write(root.join("draft.txt"), "wip").unwrap();
        fs::write(root.join("final.txt"), "done").unwrap();

        let mut cfg = config(root);
        cfg.exclude_globs = vec!["draft*".to_string()];
        let files = scan_documents(&cfg).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].origin, "final.txt");
    }

    #[test]
    fn test_missing_root_is_an_error() {
        let cfg = config(Path::new("/nonexistent/ragchat/data"));
        assert!(scan_documents(&cfg).is_err());
    }

    #[test]
    fn test_origin_outside_root_keeps_full_path() {
        let origin = origin_for(Path::new("/data"), Path::new("/tmp/extra/hours.txt"));
        assert_eq!(origin, "/tmp/extra/hours.txt");
        assert!(is_outside_root(&origin));
        assert!(!is_outside_root("policies/hours.txt"));
    }

    #[test]
    fn test_document_at_matches_scan_origin() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("data");
        fs::create_dir_all(root.join("policies")).unwrap();
        fs::write(root.join("policies/refunds.md"), "refunds").unwrap();
        fs::write(dir.path().join("refunds.md"), "elsewhere").unwrap();

        let inside = document_at(&root.join("."), &root.join("policies/../policies/refunds.md")).unwrap();
        assert_eq!(inside.origin, "policies/refunds.md");

        let outside = document_at(&root, &dir.path().join("refunds.md")).unwrap();
        assert!(is_outside_root(&outside.origin));
        assert!(outside.origin.ends_with("refunds.md"));
        assert_ne!(outside.origin, "refunds.md");
    }
}
