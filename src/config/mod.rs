use std::env;
use std::path::PathBuf;

/// Default PostgreSQL `log_line_prefix` the assessment checks compare against.
pub const DEFAULT_LOG_LINE_PREFIX: &str = "%m [%p] %q%u:%r@%d/%a-";

/// Log output format for the binary's tracing subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub log_format: LogFormat,
    pub summary_sample_limit: usize,
    pub results_dir: PathBuf,
    pub log_line_prefix: String,
    pub domain_suffix: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            log_format: LogFormat::Pretty,
            summary_sample_limit: 5,
            results_dir: PathBuf::from("./results"),
            log_line_prefix: DEFAULT_LOG_LINE_PREFIX.to_string(),
            domain_suffix: "localdomain".to_string(),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            log_format: match env::var("STIGKIT_LOG_FORMAT").as_deref() {
                Ok("json") => LogFormat::Json,
                _ => defaults.log_format,
            },
            summary_sample_limit: env::var("STIGKIT_SUMMARY_SAMPLE_LIMIT")
                .unwrap_or_else(|_| "5".to_string())
                .parse()
                .unwrap_or(defaults.summary_sample_limit),
            results_dir: env::var("STIGKIT_RESULTS_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.results_dir),
            log_line_prefix: env::var("STIGKIT_LOG_LINE_PREFIX")
                .unwrap_or(defaults.log_line_prefix),
            domain_suffix: env::var("STIGKIT_DOMAIN_SUFFIX").unwrap_or(defaults.domain_suffix),
        }
    }
}
