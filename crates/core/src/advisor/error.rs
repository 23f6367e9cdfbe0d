use thiserror::Error;

/// Every way a recommendation request can fail. `stage` names the step that
/// failed (`http`, `body`, `decode`, `frame`, `payload`) so logs and Sentry
/// events can be grouped without parsing `detail`.
#[derive(Debug, Error)]
pub enum AdvisorError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("invalid preferences: {0}")]
    InvalidPreference(String),

    #[error("submission failed (stage={stage}): {detail}")]
    Submission { stage: &'static str, detail: String },

    #[error("poll failed (stage={stage}): {detail}")]
    Poll { stage: &'static str, detail: String },

    #[error("no recommendation after {attempts} poll attempts")]
    Timeout { attempts: u32 },

    #[error("recommendation job failed: {0}")]
    JobFailed(String),

    #[error("recommendation run cancelled")]
    Cancelled,

    #[error("recommendation job already finished; start a new job")]
    AlreadyFinished,
}

impl AdvisorError {
    pub(crate) fn submission(stage: &'static str, detail: impl Into<String>) -> Self {
        Self::Submission {
            stage,
            detail: detail.into(),
        }
    }

    pub(crate) fn poll(stage: &'static str, detail: impl Into<String>) -> Self {
        Self::Poll {
            stage,
            detail: detail.into(),
        }
    }
}
