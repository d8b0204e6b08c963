pub mod config;
pub mod contacts;
pub mod dispatch;
pub mod history;
pub mod outbox;
pub mod phone;
pub mod proxy;

#[cfg(test)]
mod testutil;

/// Install the tracing subscriber used by both binaries.
pub fn init_logging() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,nolasms=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
