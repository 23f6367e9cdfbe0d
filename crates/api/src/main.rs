use axum::{
    extract::{rejection::JsonRejection, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use advisor_core::advisor::http::HttpRecommendationService;
use advisor_core::domain::preference::PreferenceInput;
use advisor_core::{
    AdvisorError, JobHandle, JobStatus, PollOptions, Progress, RecommendationService,
};

const NOT_CONFIGURED: &str = "ML_MODEL_URL environment variable is not set";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = advisor_core::config::Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();

    let service: Option<Arc<dyn RecommendationService>> =
        match HttpRecommendationService::from_settings(&settings) {
            Ok(service) => {
                tracing::info!(
                    service = service.service_name(),
                    base_url = %service.base_url(),
                    "recommendation service configured"
                );
                Some(Arc::new(service))
            }
            Err(e) => {
                let err = anyhow::Error::new(e);
                sentry_anyhow::capture_anyhow(&err);
                tracing::error!(error = %err, "recommendation service unavailable; starting API in degraded mode");
                None
            }
        };

    let shutdown = CancellationToken::new();
    let state = AppState {
        service,
        options: settings.poll_options(),
        shutdown: shutdown.clone(),
    };

    let app = router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], settings.port));

    tracing::info!(%addr, "api listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await?;

    Ok(())
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route(
            "/api/investment-advisor",
            post(submit_preferences).get(poll_recommendations),
        )
        .route("/api/investment-advisor/run", post(run_recommendations))
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}

#[derive(Clone)]
struct AppState {
    service: Option<Arc<dyn RecommendationService>>,
    options: PollOptions,
    shutdown: CancellationToken,
}

type ApiResponse = (StatusCode, Json<Value>);

impl AppState {
    fn service(&self) -> Result<&dyn RecommendationService, ApiResponse> {
        self.service
            .as_deref()
            .ok_or_else(|| error_body(StatusCode::INTERNAL_SERVER_ERROR, NOT_CONFIGURED))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AdvisorRequest {
    #[serde(default)]
    risk: Option<String>,
    #[serde(default)]
    investment_horizon: Option<String>,
    #[serde(default)]
    investment_amount: Option<AmountField>,
}

/// The dashboard form posts the amount as a string; other callers send a number.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum AmountField {
    Number(f64),
    Text(String),
}

impl AdvisorRequest {
    fn into_input(self) -> Result<PreferenceInput, ApiResponse> {
        let risk = self.risk.filter(|s| !s.trim().is_empty());
        let horizon = self.investment_horizon.filter(|s| !s.trim().is_empty());
        let amount = match self.investment_amount {
            Some(AmountField::Text(s)) if s.trim().is_empty() => None,
            other => other,
        };

        let (Some(risk), Some(horizon), Some(amount)) = (risk, horizon, amount) else {
            return Err(error_body(
                StatusCode::BAD_REQUEST,
                "risk, investmentHorizon and investmentAmount are required",
            ));
        };

        let amount = match amount {
            AmountField::Number(n) => n.to_string(),
            AmountField::Text(s) => s,
        };
        PreferenceInput::parse(&risk, &horizon, &amount)
            .map_err(|e| error_body(StatusCode::BAD_REQUEST, &e.to_string()))
    }
}

#[derive(Debug, Deserialize)]
struct PollQuery {
    #[serde(rename = "eventId")]
    event_id: Option<String>,
}

async fn submit_preferences(
    State(state): State<AppState>,
    body: Result<Json<AdvisorRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiResponse> {
    let input = parse_body(body)?;
    let service = state.service()?;

    let handle = service.submit(&input).await.map_err(|e| {
        report(e, "recommendation submission failed");
        error_body(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to process investment request",
        )
    })?;

    Ok(Json(json!({
        "eventId": handle.job_id(),
        "status": "processing",
    })))
}

async fn poll_recommendations(
    State(state): State<AppState>,
    Query(query): Query<PollQuery>,
) -> Result<Json<Value>, ApiResponse> {
    let Some(event_id) = query.event_id.filter(|s| !s.trim().is_empty()) else {
        return Err(error_body(StatusCode::BAD_REQUEST, "Event ID is required"));
    };
    let service = state.service()?;
    let handle = JobHandle::new(event_id)
        .map_err(|e| error_body(StatusCode::BAD_REQUEST, &e.to_string()))?;

    match service.poll(&handle).await {
        Ok(JobStatus::Processing(progress)) => Ok(Json(json!({
            "status": "processing",
            "message": processing_message(progress),
        }))),
        Ok(JobStatus::Completed(recommendations)) => Ok(Json(json!({
            "status": "completed",
            "recommendations": recommendations,
        }))),
        Ok(JobStatus::Failed(reason)) => Ok(Json(json!({
            "status": "failed",
            "error": reason,
        }))),
        Err(e) => {
            let details = e.to_string();
            report(e, "recommendation poll failed");
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "error": "Failed to get investment recommendations",
                    "details": details,
                })),
            ))
        }
    }
}

async fn run_recommendations(
    State(state): State<AppState>,
    body: Result<Json<AdvisorRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiResponse> {
    let input = parse_body(body)?;
    let service = state.service()?;

    let cancel = state.shutdown.child_token();
    match advisor_core::run_to_completion(service, &input, state.options, &cancel).await {
        Ok(recommendations) => Ok(Json(json!({
            "status": "completed",
            "recommendations": recommendations,
        }))),
        Err(e) => {
            let (status, message) = match &e {
                AdvisorError::Timeout { .. } => (
                    StatusCode::GATEWAY_TIMEOUT,
                    "Timeout waiting for recommendations",
                ),
                AdvisorError::JobFailed(_) => (
                    StatusCode::BAD_GATEWAY,
                    "Recommendation service reported a failure",
                ),
                AdvisorError::Cancelled => {
                    (StatusCode::SERVICE_UNAVAILABLE, "Server is shutting down")
                }
                _ => (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Failed to get investment recommendations",
                ),
            };
            let details = e.to_string();
            report(e, "recommendation run failed");
            Err((
                status,
                Json(json!({ "error": message, "details": details })),
            ))
        }
    }
}

fn processing_message(progress: Progress) -> &'static str {
    match progress {
        Progress::Queued => "Still processing recommendation...",
        Progress::Generating => "Recommendations are being generated...",
    }
}

fn parse_body(body: Result<Json<AdvisorRequest>, JsonRejection>) -> Result<PreferenceInput, ApiResponse> {
    let Json(req) = body.map_err(|e| error_body(StatusCode::BAD_REQUEST, &e.body_text()))?;
    req.into_input()
}

fn error_body(status: StatusCode, message: &str) -> ApiResponse {
    (status, Json(json!({ "error": message })))
}

fn report(err: AdvisorError, message: &'static str) {
    let err = anyhow::Error::new(err);
    sentry_anyhow::capture_anyhow(&err);
    tracing::error!(error = %err, "{message}");
}

async fn shutdown_signal(shutdown: CancellationToken) {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown requested; cancelling in-flight recommendation runs");
    shutdown.cancel();
}

fn init_sentry(settings: &advisor_core::config::Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}
