use anyhow::Context;
use chrono::Utc;
use clap::Parser;
use nimbus_core::admins::AdminList;
use nimbus_core::config::Settings;
use nimbus_core::health::{HealthThresholds, PollState};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{info, warn};

mod feed;
mod format;
mod jobs;
mod notify;
mod routes;

use crate::feed::CapFeedClient;
use crate::jobs::health::HealthMonitor;
use crate::jobs::poll::Poller;
use crate::notify::SlackNotifier;

#[derive(Debug, Parser)]
#[command(name = "nimbus-worker")]
#[command(about = "NWS alert poller and health monitor", version)]
struct Args {
    /// Run a single poll cycle and exit.
    #[arg(long)]
    once: bool,
}

#[derive(Clone)]
pub struct WorkerState {
    pub poll_state: Arc<PollState>,
    pub thresholds: HealthThresholds,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .json()
        .init();

    let args = Args::parse();
    let settings = Settings::from_env()?;

    let token = settings
        .slack_bot_token
        .clone()
        .context("SLACK_BOT_TOKEN must be set")?;
    let target_channel = settings
        .target_channel_id
        .clone()
        .context("TARGET_CHANNEL_ID must be set")?;

    let store = nimbus_db::open(&settings).await?;
    let installed = nimbus_db::queries::subscriptions::bootstrap_defaults(store.as_ref(), Utc::now()).await?;
    if installed > 0 {
        info!(installed, "installed default zone feeds");
    }

    let admins = AdminList::new(settings.admin_users.clone());
    if admins.is_empty() {
        warn!("no admin users configured, escalations will only reach the alerts channel");
    }

    let poll_state = Arc::new(PollState::new(Utc::now()));
    let notifier = Arc::new(SlackNotifier::new(token, settings.http_timeout())?);
    let feeds = Arc::new(CapFeedClient::new(&settings.user_agent, settings.http_timeout())?);

    let poller = Arc::new(Poller::new(
        store.clone(),
        feeds,
        notifier.clone(),
        poll_state.clone(),
        admins.clone(),
        target_channel.clone(),
        settings.http_timeout(),
    ));

    if args.once {
        let report = poller.run_cycle().await;
        info!(?report, "single poll cycle finished");
        return Ok(());
    }

    let thresholds = HealthThresholds::for_poll_interval(
        settings.poll_interval(),
        settings.max_consecutive_failures,
    );
    let monitor = Arc::new(HealthMonitor::new(
        poll_state.clone(),
        notifier,
        admins,
        target_channel,
        thresholds,
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let poll_task = {
        let poller = poller.clone();
        let shutdown = shutdown_rx.clone();
        let period = settings.poll_interval();
        tokio::spawn(async move { poller.run(period, shutdown).await })
    };
    let health_task = {
        let monitor = monitor.clone();
        let shutdown = shutdown_rx.clone();
        let period = settings.health_check_interval();
        tokio::spawn(async move { monitor.run(period, shutdown).await })
    };

    let state = WorkerState {
        poll_state,
        thresholds,
    };
    let app = routes::router(state);
    let addr: SocketAddr = settings.worker_bind.parse()?;
    info!(%addr, env = %settings.nimbus_env, "starting worker");

    let listener = TcpListener::bind(addr).await?;
    let mut server_shutdown = shutdown_rx;
    let server = axum::serve(listener, app).with_graceful_shutdown(async move {
        let _ = server_shutdown.changed().await;
    });

    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    });

    server.await?;
    poll_task.await?;
    health_task.await?;
    info!("worker stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown requested");
}
