use std::sync::OnceLock;

use tracing_subscriber::{EnvFilter, fmt};

use crate::CrewSearchError;

static TELEMETRY_GUARD: OnceLock<()> = OnceLock::new();

const DEFAULT_FILTER: &str = "info";

/// Configuration options when initialising telemetry.
#[derive(Debug, Clone)]
pub struct TelemetryOptions {
    /// Filter directives used when `RUST_LOG` is unset or blank.
    pub default_filter: Option<String>,
    pub with_ansi: bool,
    /// Write log lines to stderr instead of stdout. Required for the stdio
    /// tool server, where stdout carries protocol frames.
    pub to_stderr: bool,
}

impl Default for TelemetryOptions {
    fn default() -> Self {
        Self {
            default_filter: None,
            with_ansi: true,
            to_stderr: false,
        }
    }
}

/// Initialise the global tracing subscriber.
///
/// Safe to call multiple times; only the first invocation installs the subscriber.
pub fn init_telemetry(options: TelemetryOptions) -> Result<(), CrewSearchError> {
    if TELEMETRY_GUARD.get().is_some() {
        return Ok(());
    }

    let directives = resolve_filter(
        std::env::var(EnvFilter::DEFAULT_ENV).ok(),
        options.default_filter,
    );

    let builder = fmt::Subscriber::builder()
        .with_env_filter(EnvFilter::new(directives))
        .with_ansi(options.with_ansi)
        .with_target(false);

    let installed = if options.to_stderr {
        builder.with_writer(std::io::stderr).try_init()
    } else {
        builder.try_init()
    };

    installed.map_err(|err| {
        CrewSearchError::InvalidConfiguration(format!("telemetry init failed: {err}"))
    })?;

    TELEMETRY_GUARD.get_or_init(|| ());
    Ok(())
}

/// `RUST_LOG` wins over the configured default, which wins over `info`.
fn resolve_filter(from_env: Option<String>, default_filter: Option<String>) -> String {
    [from_env, default_filter]
        .into_iter()
        .flatten()
        .find(|directives| !directives.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_FILTER.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rust_log_overrides_configured_level() {
        assert_eq!(
            resolve_filter(Some("debug".into()), Some("warn".into())),
            "debug"
        );
        assert_eq!(resolve_filter(None, Some("warn".into())), "warn");
        assert_eq!(resolve_filter(Some("  ".into()), Some("warn".into())), "warn");
        assert_eq!(resolve_filter(None, None), DEFAULT_FILTER);
    }
}
