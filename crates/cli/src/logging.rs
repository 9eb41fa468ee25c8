//! Tracing initialization.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Environment variable holding per-crate log directives, e.g.
/// `SQEXPORT_LOG=sqexport_eval=debug,sqexport_codegen=info`.
pub const LOG_ENV: &str = "SQEXPORT_LOG";

/// Default directive for a given `-v` count; `quiet` wins over verbosity.
fn default_directive(verbose: u8, quiet: bool) -> &'static str {
    if quiet {
        return "sqexport=error";
    }
    match verbose {
        0 => "sqexport=warn",
        1 => "sqexport=info",
        _ => "sqexport=debug",
    }
}

/// Install the global subscriber. Logs go to stderr so stdout stays free
/// for `-` output. `SQEXPORT_LOG`, when set and valid, overrides the flags.
pub fn init_tracing(verbose: u8, quiet: bool) {
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbose, quiet)));

    // A subscriber may already be installed (tests); keep it.
    let _ = tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true),
        )
        .with(filter)
        .try_init();
}
