use clap::Parser;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use advisor_core::advisor::http::HttpRecommendationService;
use advisor_core::config::Settings;
use advisor_core::domain::preference::{Horizon, PreferenceInput, RiskTolerance};
use advisor_core::PollOptions;

#[derive(Debug, Parser)]
#[command(name = "advisor", about = "Request investment recommendations and wait for the result")]
struct Args {
    /// Conservative, Moderate or Aggressive.
    #[arg(long)]
    risk: RiskTolerance,

    /// Short-term, Medium-term or Long-term.
    #[arg(long)]
    horizon: Horizon,

    /// Amount to invest.
    #[arg(long)]
    amount: f64,

    /// Delay between status polls. Defaults to ADVISOR_POLL_INTERVAL_MS.
    #[arg(long)]
    poll_interval_ms: Option<u64>,

    /// Polls before giving up. Defaults to ADVISOR_MAX_ATTEMPTS.
    #[arg(long)]
    max_attempts: Option<u32>,

    /// Validate the input and print the submission body without calling the service.
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    // stdout carries the JSON result.
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(sentry_tracing::layer())
        .init();

    let args = Args::parse();

    let input = PreferenceInput::new(args.risk, args.horizon, args.amount)?;

    if args.dry_run {
        tracing::info!(
            risk = %input.risk_tolerance(),
            horizon = %input.horizon(),
            amount = input.amount(),
            dry_run = true,
            "skipping submission"
        );
        println!("{}", serde_json::to_string_pretty(&input.to_submission_body())?);
        return Ok(());
    }

    let service = HttpRecommendationService::from_settings(&settings)?;
    let options = poll_options(&args, &settings);

    let cancel = CancellationToken::new();
    let on_ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupted; no further polls will be scheduled");
            on_ctrl_c.cancel();
        }
    });

    tracing::info!(
        interval_ms = options.interval.as_millis() as u64,
        max_attempts = options.max_attempts,
        "requesting recommendations"
    );

    match advisor_core::run_to_completion(&service, &input, options, &cancel).await {
        Ok(result) => {
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(())
        }
        Err(e) => {
            let err = anyhow::Error::new(e).context("recommendation run failed");
            sentry_anyhow::capture_anyhow(&err);
            tracing::error!(error = %format!("{err:#}"), "recommendation run failed");
            Err(err)
        }
    }
}

fn poll_options(args: &Args, settings: &Settings) -> PollOptions {
    let mut options = settings.poll_options();
    if let Some(ms) = args.poll_interval_ms {
        options.interval = Duration::from_millis(ms);
    }
    if let Some(n) = args.max_attempts {
        options.max_attempts = n;
    }
    options
}

fn init_sentry(settings: &Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}
