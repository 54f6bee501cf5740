//! Tracing setup.
//!
//! Every accepted connection gets a `tracing::info_span!` carrying a
//! connection id; once a request is parsed off of it, a request id is
//! added to the span so logs for a single intercepted exchange can be
//! correlated end to end (spec.md §9's "structured logging" guidance).

use std::io::IsTerminal as _;
use tracing_subscriber::{EnvFilter, filter::Directive, fmt, layer::SubscriberExt, util::SubscriberInitExt};

pub fn init_tracing(default_directive: impl Into<Directive>) {
    if std::env::var("MITM_PROXY_LOG_JSON").is_ok() {
        init_structured(default_directive);
    } else {
        init_default(default_directive);
    }
    tracing::trace!("tracing init complete");
}

fn init_default(default_directive: impl Into<Directive>) {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(default_directive.into())
                .from_env_lossy(),
        )
        .init();
}

fn init_structured(default_directive: impl Into<Directive>) {
    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_ansi(std::io::stderr().is_terminal())
                .with_writer(std::io::stderr)
                .json()
                .flatten_event(true),
        )
        .with(
            EnvFilter::builder()
                .with_default_directive(default_directive.into())
                .from_env_lossy(),
        )
        .init();
}
