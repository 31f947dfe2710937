use serde::{Deserialize, Serialize};
use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub level: String,
    /// JSON lines instead of compact text.
    pub json: bool,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Installs the global subscriber. `RUST_LOG` wins over `settings.level`.
///
/// Fails instead of panicking if a subscriber is already set.
pub fn init_logging(settings: &LogSettings) -> Result<(), TryInitError> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&settings.level));

    let json = settings
        .json
        .then(|| fmt::layer().json().with_target(true).with_current_span(false));
    let compact = (!settings.json).then(|| fmt::layer().with_target(true).compact());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json)
        .with(compact)
        .try_init()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_init_is_an_error() {
        let settings = LogSettings {
            level: "warn".into(),
            json: true,
        };
        let _ = init_logging(&settings);
        assert!(init_logging(&settings).is_err());
    }

    #[test]
    fn settings_default_from_empty_toml() {
        let settings: LogSettings = toml::from_str("").unwrap();
        assert_eq!(settings, LogSettings::default());
    }
}
