//! Index statistics.
//!
//! `ragchat stats` prints what is indexed: total passages, a per-source
//! breakdown, the index file and its size, and when passages were last added.

use anyhow::Result;
use ragchat_core::store::VectorIndex;

use crate::config::Config;
use crate::engine;

/// Run the stats command: query the index and print a summary.
pub async fn run_stats(config: &Config) -> Result<()> {
    let index = engine::open_index(config).await?;

    let db_size = std::fs::metadata(index.path())
        .map(|m| m.len())
        .unwrap_or(0);

    println!("ragchat — Index Stats");
    println!("=====================");
    println!();
    println!("  Index:       {}", index.path().display());
    println!("  Size:        {}", format_bytes(db_size));
    println!("  Embeddings:  {}", index.embedder().model_name());

    if !index.reload_ready().await? {
        println!();
        println!("  Not initialized. Run `ragchat init` and `ragchat ingest`.");
        println!();
        index.close().await;
        return Ok(());
    }

    let total = index.count().await?;
    let origins = index.origin_counts().await?;
    let last = index.last_indexed().await?;

    println!();
    println!("  Passages:    {}", total);
    println!("  Sources:     {}", origins.len());
    println!(
        "  Last added:  {}",
        last.map(format_ts_relative)
            .unwrap_or_else(|| "never".to_string())
    );

    if !origins.is_empty() {
        println!();
        println!("  By source:");
        println!("  {:<40} {:>8}", "SOURCE", "PASSAGES");
        println!("  {}", "-".repeat(49));
        for o in &origins {
            println!("  {:<40} {:>8}", o.origin, o.passages);
        }
    }

    println!();
    index.close().await;
    Ok(())
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

/// Format a Unix timestamp relative to now (e.g. "3 hours ago").
fn format_ts_relative(ts: i64) -> String {
    relative_to(chrono::Utc::now().timestamp(), ts)
}

fn relative_to(now: i64, ts: i64) -> String {
    let delta = now - ts;
    if delta < 0 {
        return format_ts_iso(ts);
    }

    let plural = |n: i64| if n == 1 { "" } else { "s" };
    if delta < 60 {
        "just now".to_string()
    } else if delta < 3600 {
        let mins = delta / 60;
        format!("{} min{} ago", mins, plural(mins))
    } else if delta < 86400 {
        let hours = delta / 3600;
        format!("{} hour{} ago", hours, plural(hours))
    } else if delta < 86400 * 30 {
        let days = delta / 86400;
        format!("{} day{} ago", days, plural(days))
    } else {
        format_ts_iso(ts)
    }
}

fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| ts.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.0 MB");
    }

    #[test]
    fn test_relative_times() {
        let now = 1_700_000_000;
        assert_eq!(relative_to(now, now - 5), "just now");
        assert_eq!(relative_to(now, now - 60), "1 min ago");
        assert_eq!(relative_to(now, now - 7200), "2 hours ago");
        assert_eq!(relative_to(now, now - 86400 * 3), "3 days ago");
        assert_eq!(relative_to(0, 86400 * 40), "1970-02-10 00:00");
    }
}
