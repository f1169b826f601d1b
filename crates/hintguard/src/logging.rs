use std::env;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

impl LogFormat {
    pub fn parse(spec: &str) -> Option<Self> {
        match spec.to_ascii_lowercase().as_str() {
            "text" | "plain" => Some(Self::Text),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LogFormat::Text => "text",
            LogFormat::Json => "json",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, clap::ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn parse(spec: &str) -> Option<Self> {
        match spec.to_ascii_lowercase().as_str() {
            "error" => Some(Self::Error),
            "warn" | "warning" => Some(Self::Warn),
            "info" => Some(Self::Info),
            "debug" => Some(Self::Debug),
            "trace" => Some(Self::Trace),
            _ => None,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogOptions {
    pub format: LogFormat,
    pub level: LogLevel,
}

impl Default for LogOptions {
    fn default() -> Self {
        Self {
            format: LogFormat::Text,
            level: LogLevel::Warn,
        }
    }
}

impl LogOptions {
    /// Defaults, then `HINTGUARD_LOG_FORMAT` / `HINTGUARD_LOG_LEVEL`, then flags.
    pub fn resolve(format: Option<LogFormat>, level: Option<LogLevel>) -> Self {
        let env_format = env::var("HINTGUARD_LOG_FORMAT").ok();
        let env_level = env::var("HINTGUARD_LOG_LEVEL").ok();
        let base = apply_env_overrides(Self::default(), env_format.as_deref(), env_level.as_deref());
        Self {
            format: format.unwrap_or(base.format),
            level: level.unwrap_or(base.level),
        }
    }
}

fn apply_env_overrides(base: LogOptions, format: Option<&str>, level: Option<&str>) -> LogOptions {
    LogOptions {
        format: format.and_then(LogFormat::parse).unwrap_or(base.format),
        level: level.and_then(LogLevel::parse).unwrap_or(base.level),
    }
}

/// Install the stderr subscriber. Returns whether it is the process default;
/// an already installed subscriber is kept and later calls are no-ops.
pub fn init_logging(options: &LogOptions) -> bool {
    use std::io::IsTerminal;
    use std::sync::OnceLock;
    use tracing_subscriber::{fmt, EnvFilter};

    static INSTALLED: OnceLock<bool> = OnceLock::new();

    *INSTALLED.get_or_init(|| {
        let use_ansi = env::var_os("NO_COLOR").is_none() && std::io::stderr().is_terminal();
        let filter = EnvFilter::try_from_env("HINTGUARD_LOG")
            .unwrap_or_else(|_| EnvFilter::new(options.level.to_string()));
        let builder = fmt::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(true);
        let installed = match options.format {
            LogFormat::Json => tracing::subscriber::set_global_default(builder.json().finish()),
            LogFormat::Text => tracing::subscriber::set_global_default(
                builder.with_ansi(use_ansi).compact().finish(),
            ),
        };
        match installed {
            Ok(()) => true,
            Err(err) => {
                // Goes to whichever subscriber is already the default.
                tracing::warn!(
                    target: "hintguard::logging",
                    error = %err,
                    "keeping the existing tracing subscriber"
                );
                false
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_values_override_defaults() {
        let opts = apply_env_overrides(LogOptions::default(), Some("JSON"), Some("trace"));
        assert_eq!(opts.format, LogFormat::Json);
        assert_eq!(opts.level, LogLevel::Trace);
    }

    #[test]
    fn unparseable_env_values_are_ignored() {
        let opts = apply_env_overrides(LogOptions::default(), Some("yaml"), Some("loud"));
        assert_eq!(opts, LogOptions::default());
    }

    #[test]
    fn existing_subscriber_is_kept() {
        let _ = tracing::subscriber::set_global_default(tracing_subscriber::registry());
        assert!(!init_logging(&LogOptions::default()));
        assert!(!init_logging(&LogOptions::default()));
    }
}
