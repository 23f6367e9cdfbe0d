use crate::advisor::error::AdvisorError;
use crate::advisor::frames::truncate;
use crate::advisor::{payload, JobHandle, JobStatus, RecommendationService};
use crate::config::Settings;
use crate::domain::preference::PreferenceInput;
use serde::Deserialize;
use std::time::Duration;

const BODY_LOG_CHARS: usize = 500;

/// Talks to the hosted inference endpoint: `POST {base}` to submit,
/// `GET {base}/{event_id}` to poll.
#[derive(Debug, Clone)]
pub struct HttpRecommendationService {
    http: reqwest::Client,
    base_url: String,
}

impl HttpRecommendationService {
    pub fn from_settings(settings: &Settings) -> Result<Self, AdvisorError> {
        let base_url = settings.require_model_url()?;
        Self::new(base_url, settings.http_timeout())
    }

    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, AdvisorError> {
        let base_url = base_url.trim().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(AdvisorError::Configuration(
                "recommendation service URL is empty".to_string(),
            ));
        }

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| {
                AdvisorError::Configuration(format!("failed to build recommendation http client: {e}"))
            })?;

        Ok(Self { http, base_url })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn status_url(&self, handle: &JobHandle) -> String {
        format!("{}/{}", self.base_url, handle.job_id())
    }
}

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    #[serde(default)]
    event_id: Option<String>,
}

#[async_trait::async_trait]
impl RecommendationService for HttpRecommendationService {
    fn service_name(&self) -> &'static str {
        "hosted_inference_http"
    }

    async fn submit(&self, input: &PreferenceInput) -> Result<JobHandle, AdvisorError> {
        let res = self
            .http
            .post(&self.base_url)
            .json(&input.to_submission_body())
            .send()
            .await
            .map_err(|e| AdvisorError::submission("http", format!("request failed: {e}")))?;

        let status = res.status();
        let text = res
            .text()
            .await
            .map_err(|e| AdvisorError::submission("body", format!("failed to read body: {e}")))?;

        if !status.is_success() {
            return Err(AdvisorError::submission(
                "http",
                format!("status={status} body={}", truncate(&text, BODY_LOG_CHARS)),
            ));
        }

        let parsed = serde_json::from_str::<SubmitResponse>(&text).map_err(|e| {
            AdvisorError::submission(
                "decode",
                format!("response is not valid JSON ({e}): {}", truncate(&text, BODY_LOG_CHARS)),
            )
        })?;

        let event_id = parsed.event_id.ok_or_else(|| {
            AdvisorError::submission(
                "decode",
                format!("response has no event_id: {}", truncate(&text, BODY_LOG_CHARS)),
            )
        })?;

        let handle = JobHandle::new(event_id)?;
        tracing::info!(
            job_id = %handle,
            risk = %input.risk_tolerance(),
            horizon = %input.horizon(),
            "recommendation job submitted"
        );
        Ok(handle)
    }

    async fn poll(&self, handle: &JobHandle) -> Result<JobStatus, AdvisorError> {
        let res = self
            .http
            .get(self.status_url(handle))
            .send()
            .await
            .map_err(|e| AdvisorError::poll("http", format!("request failed: {e}")))?;

        let status = res.status();
        let text = res
            .text()
            .await
            .map_err(|e| AdvisorError::poll("body", format!("failed to read body: {e}")))?;

        if !status.is_success() {
            return Err(AdvisorError::poll(
                "http",
                format!("status={status} body={}", truncate(&text, BODY_LOG_CHARS)),
            ));
        }

        tracing::debug!(job_id = %handle, body = %truncate(&text, BODY_LOG_CHARS), "status body");
        payload::status_from_body(&text)
    }
}
