//! Diagnostic logging setup.
//!
//! Logs go to stderr through `tracing-subscriber`; command output stays on
//! stdout. `RUST_LOG` wins over the level derived from `-v` flags.

use tracing_subscriber::EnvFilter;

/// Install the global subscriber. `base` is the level used with no `-v`.
pub fn init(base: &str, verbose: u8) {
    let filter = match std::env::var("RUST_LOG") {
        Ok(env) if !env.is_empty() => EnvFilter::new(env),
        _ => EnvFilter::new(level_for(base, verbose)),
    };

    // A subscriber may already be installed when embedded in tests.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn level_for(base: &str, verbose: u8) -> &str {
    match verbose {
        0 => base,
        1 => "debug",
        _ => "trace",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbosity_raises_level() {
        assert_eq!(level_for("warn", 0), "warn");
        assert_eq!(level_for("info", 1), "debug");
        assert_eq!(level_for("warn", 3), "trace");
    }
}
