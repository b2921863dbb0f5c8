use tracing_subscriber::EnvFilter;

use crate::config::{Config, LogFormat};

/// Install the global tracing subscriber.
///
/// `RUST_LOG` wins when set; otherwise `LOG_LEVEL` from the config is used as
/// the default directive. Noisy dependency targets are capped at `warn`.
pub fn init(config: &Config) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "{},sqlx=warn,hyper=warn,reqwest=warn,html5ever=error",
            config.log_level
        ))
    });

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let result = match config.log_format {
        LogFormat::Text => builder.try_init(),
        LogFormat::Json => builder.json().flatten_event(true).try_init(),
    };

    // A second init (tests, embedded use) keeps the first subscriber.
    if let Err(e) = result {
        tracing::debug!("tracing subscriber already installed: {}", e);
    }
}
