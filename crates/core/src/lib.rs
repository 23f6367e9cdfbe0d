pub mod advisor;
pub mod domain;

pub use advisor::error::AdvisorError;
pub use advisor::job::{run_to_completion, RecommendationJob, RunState};
pub use advisor::{JobHandle, JobStatus, PollOptions, Progress, RecommendationService};

pub mod config {
    use crate::advisor::error::AdvisorError;
    use crate::advisor::{PollOptions, DEFAULT_MAX_ATTEMPTS, DEFAULT_POLL_INTERVAL_MS};
    use std::time::Duration;

    const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;
    const DEFAULT_PORT: u16 = 3000;

    #[derive(Debug, Clone)]
    pub struct Settings {
        pub model_url: Option<String>,
        pub sentry_dsn: Option<String>,
        pub poll_interval_ms: u64,
        pub max_attempts: u32,
        pub http_timeout_secs: u64,
        pub port: u16,
    }

    impl Settings {
        pub fn from_env() -> anyhow::Result<Self> {
            Self::from_lookup(|key| std::env::var(key).ok())
        }

        /// Same as [`Settings::from_env`], reading variables through `lookup`.
        pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
            let non_empty = |key: &str| lookup(key).filter(|s| !s.trim().is_empty());

            Ok(Self {
                model_url: non_empty("ML_MODEL_URL"),
                sentry_dsn: non_empty("SENTRY_DSN"),
                poll_interval_ms: non_empty("ADVISOR_POLL_INTERVAL_MS")
                    .and_then(|s| s.trim().parse::<u64>().ok())
                    .unwrap_or(DEFAULT_POLL_INTERVAL_MS),
                max_attempts: non_empty("ADVISOR_MAX_ATTEMPTS")
                    .and_then(|s| s.trim().parse::<u32>().ok())
                    .unwrap_or(DEFAULT_MAX_ATTEMPTS),
                http_timeout_secs: non_empty("ADVISOR_HTTP_TIMEOUT_SECS")
                    .and_then(|s| s.trim().parse::<u64>().ok())
                    .unwrap_or(DEFAULT_HTTP_TIMEOUT_SECS),
                port: non_empty("PORT")
                    .and_then(|s| s.trim().parse::<u16>().ok())
                    .unwrap_or(DEFAULT_PORT),
            })
        }

        pub fn require_model_url(&self) -> Result<&str, AdvisorError> {
            self.model_url.as_deref().ok_or_else(|| {
                AdvisorError::Configuration(
                    "ML_MODEL_URL environment variable is not set".to_string(),
                )
            })
        }

        pub fn poll_options(&self) -> PollOptions {
            PollOptions {
                interval: Duration::from_millis(self.poll_interval_ms),
                max_attempts: self.max_attempts,
            }
        }

        pub fn http_timeout(&self) -> Duration {
            Duration::from_secs(self.http_timeout_secs)
        }
    }

}
