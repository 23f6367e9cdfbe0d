use crate::advisor::error::AdvisorError;
use crate::advisor::{JobStatus, PollOptions, RecommendationService};
use crate::domain::preference::PreferenceInput;
use crate::domain::recommendation::RecommendationResult;
use tokio_util::sync::CancellationToken;

/// Lifecycle of one recommendation request.
///
/// `Idle -> Submitting -> Polling -> {Completed, Failed}`. `Completed` and
/// `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Submitting,
    Polling { attempts: u32 },
    Completed,
    Failed,
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// Drives one submission and its polls. A job runs at most once; a second
/// `run` (or a run after the first was abandoned mid-flight) fails with
/// [`AdvisorError::AlreadyFinished`] without touching the network.
#[derive(Debug)]
pub struct RecommendationJob<'a, S: ?Sized> {
    service: &'a S,
    options: PollOptions,
    state: RunState,
}

impl<'a, S> RecommendationJob<'a, S>
where
    S: RecommendationService + ?Sized,
{
    pub fn new(service: &'a S, options: PollOptions) -> Self {
        Self {
            service,
            options,
            state: RunState::Idle,
        }
    }

    /// The last state the run reached. A run future dropped mid-flight
    /// leaves this at `Submitting` or `Polling`; such a job still counts as
    /// finished.
    pub fn state(&self) -> RunState {
        self.state
    }

    /// True once `run` has been entered, whether it returned or was abandoned.
    pub fn is_finished(&self) -> bool {
        self.state != RunState::Idle
    }

    pub async fn run(
        &mut self,
        input: &PreferenceInput,
        cancel: &CancellationToken,
    ) -> Result<RecommendationResult, AdvisorError> {
        if self.state != RunState::Idle {
            return Err(AdvisorError::AlreadyFinished);
        }

        let result = self.drive(input, cancel).await;
        self.state = match &result {
            Ok(_) => RunState::Completed,
            Err(_) => RunState::Failed,
        };
        result
    }

    async fn drive(
        &mut self,
        input: &PreferenceInput,
        cancel: &CancellationToken,
    ) -> Result<RecommendationResult, AdvisorError> {
        let max_attempts = self.options.max_attempts;
        if max_attempts == 0 {
            return Err(AdvisorError::Configuration(
                "max poll attempts must be at least 1".to_string(),
            ));
        }

        self.state = RunState::Submitting;
        if cancel.is_cancelled() {
            return Err(AdvisorError::Cancelled);
        }
        let handle = self.service.submit(input).await?;
        let service = self.service.service_name();
        tracing::info!(job_id = %handle, service, "recommendation job submitted");

        for attempt in 1..=max_attempts {
            if cancel.is_cancelled() {
                tracing::info!(job_id = %handle, attempt, "recommendation run cancelled");
                return Err(AdvisorError::Cancelled);
            }
            if attempt > 1 {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        tracing::info!(job_id = %handle, attempt, "recommendation run cancelled");
                        return Err(AdvisorError::Cancelled);
                    }
                    _ = tokio::time::sleep(self.options.interval) => {}
                }
            }

            self.state = RunState::Polling { attempts: attempt };
            match self.service.poll(&handle).await {
                Ok(JobStatus::Completed(result)) => {
                    tracing::info!(
                        job_id = %handle,
                        service,
                        attempt,
                        stocks = result.stocks.recommendations.len(),
                        funds = result.mutual_funds.recommendations.len(),
                        "recommendation job completed"
                    );
                    return Ok(result);
                }
                Ok(JobStatus::Processing(progress)) => {
                    tracing::debug!(job_id = %handle, attempt, max_attempts, ?progress, "job still processing");
                }
                Ok(JobStatus::Failed(reason)) => {
                    tracing::warn!(job_id = %handle, service, attempt, %reason, "recommendation job failed");
                    return Err(AdvisorError::JobFailed(reason));
                }
                Err(err) => {
                    tracing::warn!(job_id = %handle, attempt, error = %err, "poll failed; giving up");
                    return Err(err);
                }
            }
        }

        tracing::warn!(job_id = %handle, service, max_attempts, "recommendation job timed out");
        Err(AdvisorError::Timeout {
            attempts: max_attempts,
        })
    }
}

/// Submits `input` and polls until the job completes, fails, times out or
/// `cancel` fires.
pub async fn run_to_completion<S>(
    service: &S,
    input: &PreferenceInput,
    options: PollOptions,
    cancel: &CancellationToken,
) -> Result<RecommendationResult, AdvisorError>
where
    S: RecommendationService + ?Sized,
{
    RecommendationJob::new(service, options).run(input, cancel).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::advisor::{JobHandle, Progress};
    use crate::domain::preference::{Horizon, RiskTolerance};
    use crate::domain::recommendation::{FundRecommendations, StockRecommendations};
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    const INTERVAL: Duration = Duration::from_millis(1000);

    /// Replays scripted poll outcomes; once the script runs out every poll
    /// reports `Processing`.
    #[derive(Default)]
    struct ScriptedService {
        fail_submit: bool,
        cancel_on_submit: Option<CancellationToken>,
        polls: Mutex<VecDeque<Result<JobStatus, AdvisorError>>>,
        submit_calls: AtomicU32,
        poll_calls: AtomicU32,
    }

    impl ScriptedService {
        fn with_polls(polls: Vec<Result<JobStatus, AdvisorError>>) -> Self {
            Self {
                polls: Mutex::new(polls.into()),
                ..Default::default()
            }
        }

        fn submits(&self) -> u32 {
            self.submit_calls.load(Ordering::SeqCst)
        }

        fn polls(&self) -> u32 {
            self.poll_calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait::async_trait]
    impl RecommendationService for ScriptedService {
        fn service_name(&self) -> &'static str {
            "scripted"
        }

        async fn submit(&self, _input: &PreferenceInput) -> Result<JobHandle, AdvisorError> {
            self.submit_calls.fetch_add(1, Ordering::SeqCst);
            if let Some(token) = &self.cancel_on_submit {
                token.cancel();
            }
            if self.fail_submit {
                return Err(AdvisorError::submission("http", "status=503"));
            }
            JobHandle::new("evt-1")
        }

        async fn poll(&self, handle: &JobHandle) -> Result<JobStatus, AdvisorError> {
            assert_eq!(handle.job_id(), "evt-1");
            self.poll_calls.fetch_add(1, Ordering::SeqCst);
            self.polls
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Ok(JobStatus::Processing(Progress::Generating)))
        }
    }

    fn input() -> PreferenceInput {
        PreferenceInput::new(RiskTolerance::Moderate, Horizon::MediumTerm, 10_000.0).unwrap()
    }

    fn options(max_attempts: u32) -> PollOptions {
        PollOptions {
            interval: INTERVAL,
            max_attempts,
        }
    }

    fn sample_result() -> RecommendationResult {
        RecommendationResult {
            stocks: StockRecommendations {
                category: "Large Cap".to_string(),
                recommendations: vec![],
            },
            mutual_funds: FundRecommendations {
                category: "Index".to_string(),
                recommendations: vec![],
            },
        }
    }

    #[tokio::test(start_paused = true)]
    async fn completes_on_success_status() {
        let svc = ScriptedService::with_polls(vec![
            Ok(JobStatus::Processing(Progress::Queued)),
            Ok(JobStatus::Completed(sample_result())),
        ]);
        let mut job = RecommendationJob::new(&svc, options(5));

        let result = job.run(&input(), &CancellationToken::new()).await.unwrap();

        assert_eq!(result, sample_result());
        assert_eq!(job.state(), RunState::Completed);
        assert_eq!(svc.submits(), 1);
        assert_eq!(svc.polls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn times_out_after_exactly_max_attempts() {
        let svc = ScriptedService::default();
        let started = tokio::time::Instant::now();

        let err = run_to_completion(&svc, &input(), options(3), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, AdvisorError::Timeout { attempts: 3 }), "{err}");
        assert_eq!(svc.polls(), 3);
        // First poll is immediate; only the two follow-ups wait.
        let elapsed = started.elapsed();
        assert!(elapsed >= INTERVAL * 2 && elapsed < INTERVAL * 3, "{elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn terminal_job_is_not_polled_again() {
        let svc = ScriptedService::with_polls(vec![Ok(JobStatus::Completed(sample_result()))]);
        let mut job = RecommendationJob::new(&svc, options(3));
        let cancel = CancellationToken::new();

        job.run(&input(), &cancel).await.unwrap();
        let again = job.run(&input(), &cancel).await;

        assert!(matches!(again, Err(AdvisorError::AlreadyFinished)));
        assert_eq!(job.state(), RunState::Completed);
        assert_eq!(svc.submits(), 1);
        assert_eq!(svc.polls(), 1);

        let failed_svc = ScriptedService::default();
        let mut failed = RecommendationJob::new(&failed_svc, options(1));
        assert!(failed.run(&input(), &cancel).await.is_err());
        assert!(failed.state().is_terminal());
        assert!(matches!(
            failed.run(&input(), &cancel).await,
            Err(AdvisorError::AlreadyFinished)
        ));
        assert_eq!(failed_svc.polls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn poll_error_short_circuits() {
        let svc = ScriptedService::with_polls(vec![
            Ok(JobStatus::Processing(Progress::Generating)),
            Err(AdvisorError::poll("http", "connection refused")),
        ]);

        let err = run_to_completion(&svc, &input(), options(10), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, AdvisorError::Poll { stage: "http", .. }), "{err}");
        assert_eq!(svc.polls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_status_ends_run() {
        let svc = ScriptedService::with_polls(vec![Ok(JobStatus::Failed("gpu oom".to_string()))]);

        let err = run_to_completion(&svc, &input(), options(10), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, AdvisorError::JobFailed(ref r) if r == "gpu oom"), "{err}");
        assert_eq!(svc.polls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn submission_failure_never_polls() {
        let svc = ScriptedService {
            fail_submit: true,
            ..Default::default()
        };
        let mut job = RecommendationJob::new(&svc, options(3));

        let err = job.run(&input(), &CancellationToken::new()).await.unwrap_err();

        assert!(matches!(err, AdvisorError::Submission { .. }), "{err}");
        assert_eq!(job.state(), RunState::Failed);
        assert_eq!(svc.polls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_stops_further_polls() {
        let svc = ScriptedService::default();
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(INTERVAL + INTERVAL / 2).await;
            trigger.cancel();
        });

        let err = run_to_completion(&svc, &input(), options(10), &cancel)
            .await
            .unwrap_err();

        assert!(matches!(err, AdvisorError::Cancelled), "{err}");
        assert_eq!(svc.polls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_during_submit_skips_first_poll() {
        let cancel = CancellationToken::new();
        let svc = ScriptedService {
            cancel_on_submit: Some(cancel.clone()),
            ..Default::default()
        };
        let mut job = RecommendationJob::new(&svc, options(3));

        let err = job.run(&input(), &cancel).await.unwrap_err();

        assert!(matches!(err, AdvisorError::Cancelled), "{err}");
        assert_eq!(job.state(), RunState::Failed);
        assert_eq!(svc.submits(), 1);
        assert_eq!(svc.polls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn abandoned_run_cannot_be_restarted() {
        let svc = ScriptedService::default();
        let mut job = RecommendationJob::new(&svc, options(10));
        let cancel = CancellationToken::new();
        assert!(!job.is_finished());

        // Dropped while waiting for the second poll.
        let abandoned = tokio::time::timeout(INTERVAL / 2, job.run(&input(), &cancel)).await;
        assert!(abandoned.is_err());
        assert_eq!(job.state(), RunState::Polling { attempts: 1 });
        assert!(job.is_finished());

        let again = job.run(&input(), &cancel).await;

        assert!(matches!(again, Err(AdvisorError::AlreadyFinished)));
        assert_eq!(svc.submits(), 1);
        assert_eq!(svc.polls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_before_start_does_nothing() {
        let svc = ScriptedService::default();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = run_to_completion(&svc, &input(), options(3), &cancel)
            .await
            .unwrap_err();

        assert!(matches!(err, AdvisorError::Cancelled));
        assert_eq!(svc.submits(), 0);
        assert_eq!(svc.polls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_attempts_is_rejected_before_submitting() {
        let svc = ScriptedService::default();

        let err = run_to_completion(&svc, &input(), options(0), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, AdvisorError::Configuration(_)));
        assert_eq!(svc.submits(), 0);
    }
}
