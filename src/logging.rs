use std::str::FromStr;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::LogSettings;

/// Install the global subscriber. `RUST_LOG` takes precedence over the
/// configured level.
pub fn init_logging(settings: &LogSettings) -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(filter(settings))
        .with(fmt::layer().with_ansi(settings.ansi).with_target(true))
        .try_init()?;

    tracing::debug!("Logging initialized");
    Ok(())
}

fn filter(settings: &LogSettings) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::from_str(&settings.level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_init_fails_instead_of_replacing_the_subscriber() {
        let settings = LogSettings {
            level: "debug".into(),
            ansi: false,
        };
        assert!(init_logging(&settings).is_ok());
        assert!(init_logging(&settings).is_err());
    }
}
