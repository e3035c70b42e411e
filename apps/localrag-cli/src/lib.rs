use anyhow::Context;
use tracing_subscriber::EnvFilter;

use localrag_core::config::Settings;

/// Log to stderr, `info` unless `RUST_LOG` says otherwise.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

pub fn load_settings(collection: Option<String>) -> anyhow::Result<Settings> {
    let mut settings = Settings::load().context("loading configuration")?;
    if let Some(collection) = collection {
        settings.index.collection = collection;
        settings.validate()?;
    }
    Ok(settings)
}
