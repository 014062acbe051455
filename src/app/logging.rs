use tracing_subscriber::EnvFilter;

use crate::app::config::LoggingSettings;

/// `RUST_LOG` wins over the configured level. `verbose` forces debug output.
pub fn init_logging(settings: &LoggingSettings, verbose: bool) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directive(settings, verbose)));

    if settings.json || !cfg!(debug_assertions) {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .json()
            .with_target(false)
            .try_init();
    } else {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .try_init();
    }
}

fn filter_directive(settings: &LoggingSettings, verbose: bool) -> String {
    if verbose {
        return "debug".to_string();
    }
    match settings.log_level.trim().to_lowercase().as_str() {
        "trace" => "trace",
        "debug" => "debug",
        "warn" | "warning" => "warn",
        "error" | "critical" => "error",
        _ => "info",
    }
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_python_style_levels() {
        let mut settings = LoggingSettings::default();
        assert_eq!(filter_directive(&settings, false), "info");
        settings.log_level = "WARNING".to_string();
        assert_eq!(filter_directive(&settings, false), "warn");
        settings.log_level = "garbage".to_string();
        assert_eq!(filter_directive(&settings, false), "info");
        assert_eq!(filter_directive(&settings, true), "debug");
    }
}
