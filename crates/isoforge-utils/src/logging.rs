//! Logging initialization.
//!
//! Structured logging goes through `tracing`; the per-run log *file* is the
//! runner's log sink, not a tracing layer, because the sink must interleave
//! raw subprocess output with phase markers in arrival order.

use std::io::IsTerminal;
use tracing_subscriber::{
    EnvFilter,
    fmt,
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

/// Check if colored output should be used: stdout is a TTY and `NO_COLOR`
/// is not set.
fn use_color() -> bool {
    std::io::stdout().is_terminal() && std::env::var_os("NO_COLOR").is_none()
}

/// Initialize the tracing subscriber.
///
/// `debug` switches the default filter from `isoforge=info` to
/// `isoforge=debug`; `RUST_LOG` overrides both.
pub fn init_tracing(debug: bool) -> Result<(), Box<dyn std::error::Error>> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| {
            if debug {
                EnvFilter::try_new("isoforge=debug,info")
            } else {
                EnvFilter::try_new("isoforge=info,warn")
            }
        })
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_target(debug)
                .with_thread_ids(false)
                .with_thread_names(false)
                .with_line_number(false)
                .with_file(false)
                .with_ansi(use_color())
                .compact(),
        )
        .try_init()?;

    Ok(())
}
