use axum::{middleware::from_fn, middleware::from_fn_with_state, Router};
use chrono::Utc;
use nimbus_core::admins::AdminList;
use nimbus_core::config::Settings;
use nimbus_weather::{ForecastCache, ForecastService, LocationResolver, NominatimGeocoder, NwsClient};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{info, warn};

mod error;
mod middleware;
mod routes;
mod state;

use crate::middleware::auth::user_auth;
use crate::middleware::request_id::request_id;
use crate::state::AppState;

const CACHE_SWEEP_INTERVAL: Duration = Duration::from_secs(600);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .json()
        .init();

    let settings = Settings::from_env()?;
    let store = nimbus_db::open(&settings).await?;

    let geocoder = Arc::new(NominatimGeocoder::new(&settings.user_agent, settings.http_timeout())?);
    let weather = Arc::new(NwsClient::new(&settings.user_agent, settings.http_timeout())?);
    let cache = ForecastCache::load(store.clone(), Utc::now()).await?;
    let forecasts = ForecastService::new(LocationResolver::new(geocoder), weather, cache);

    let state = AppState {
        store,
        forecasts: Arc::new(forecasts),
        admins: AdminList::new(settings.admin_users.clone()),
        nimbus_env: settings.nimbus_env.clone(),
    };
    if state.admins.is_empty() {
        warn!("no admin users configured, feed management is disabled");
    }

    let sweeper = {
        let forecasts = state.forecasts.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(CACHE_SWEEP_INTERVAL);
            loop {
                ticker.tick().await;
                if let Err(err) = forecasts.cache().purge_expired_at(Utc::now()).await {
                    warn!(error = %err, "forecast cache sweep failed");
                }
            }
        })
    };

    let v1 = routes::v1_router(state.clone()).layer(from_fn_with_state(state.clone(), user_auth));

    let app = Router::new()
        .merge(routes::health_router(state.clone()))
        .merge(v1)
        .layer(from_fn(request_id));

    let addr: SocketAddr = settings.api_bind.parse()?;
    info!(%addr, env = %settings.nimbus_env, "starting api");

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    sweeper.abort();
    info!("api stopped");
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
