// fleetwatch-server: ingest, persist, alert, and serve queries

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use fleetwatch::server::alerts::AlertEvaluator;
use fleetwatch::server::auth::AuthManager;
use fleetwatch::server::config_store::{CONFIG_FILE, ConfigStore};
use fleetwatch::server::event_store::EventStore;
use fleetwatch::server::geoip::GeoIpResolver;
use fleetwatch::server::metrics_store::MetricsStore;
use fleetwatch::server::{AppState, routes};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::time::FormatTime;

struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(
            w,
            "{}",
            chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.3f%:z")
        )
    }
}

const CONNECT_RETRIES: u32 = 5;

async fn connect_with_retry(dsn: &str) -> anyhow::Result<EventStore> {
    let mut last_err = None;
    for attempt in 0..CONNECT_RETRIES {
        match EventStore::connect(dsn).await {
            Ok(store) => {
                info!("columnar store connected");
                return Ok(store);
            }
            Err(e) => {
                let backoff = Duration::from_secs(1 << attempt);
                warn!(
                    "columnar store connection attempt {}/{} failed: {}; retrying in {:?}",
                    attempt + 1,
                    CONNECT_RETRIES,
                    e,
                    backoff
                );
                last_err = Some(e);
                if attempt + 1 < CONNECT_RETRIES {
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }
    Err(last_err.unwrap_or_else(|| anyhow::anyhow!("columnar store connection failed")))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_timer(LocalTimer)
        .with_env_filter(filter)
        .init();

    info!("fleetwatch server starting");
    if std::env::var("AUTH_ENABLED").as_deref() == Ok("false") {
        warn!("authentication is DISABLED; all data is publicly accessible");
    }

    let influx_url =
        std::env::var("INFLUX_URL").unwrap_or_else(|_| "http://localhost:8086".to_string());
    let influx_token =
        std::env::var("INFLUX_TOKEN").context("INFLUX_TOKEN environment variable is required")?;
    let influx_org = std::env::var("INFLUX_ORG").unwrap_or_else(|_| "fleetwatch".to_string());
    let influx_bucket = std::env::var("INFLUX_BUCKET").unwrap_or_else(|_| "metrics".to_string());
    let clickhouse_dsn = std::env::var("CLICKHOUSE_DSN").unwrap_or_default();

    let metrics = Arc::new(MetricsStore::new(
        &influx_url,
        &influx_org,
        &influx_token,
        &influx_bucket,
    ));
    let events = Arc::new(connect_with_retry(&clickhouse_dsn).await?);

    let config = Arc::new(ConfigStore::open(CONFIG_FILE)?);
    let auth = Arc::new(AuthManager::new(config.clone())?);
    let alerts = Arc::new(AlertEvaluator::new(config.clone(), events.clone()));

    let retention_days = config.get().retention_days;
    if retention_days > 0 {
        events.apply_retention(retention_days).await;
    }

    let geoip_path = std::env::var("GEOIP_DB").unwrap_or_else(|_| "GeoLite2-City.mmdb".to_string());
    let geoip = Arc::new(GeoIpResolver::open(&PathBuf::from(geoip_path)));
    if geoip.is_loaded() {
        info!("GeoIP service initialized");
    }

    let state = AppState {
        config,
        auth,
        metrics,
        events,
        alerts,
        geoip,
    };
    let app = routes::app(state);

    let addr = std::env::var("LISTEN_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("ingestion API listening on http://{}", addr);

    tokio::select! {
        result = axum::serve(listener, app) => {
            result?;
        }
        _ = async {
            #[cfg(unix)]
            {
                let mut sigterm = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                    Ok(s) => s,
                    Err(_) => {
                        let _ = tokio::signal::ctrl_c().await;
                        return;
                    }
                };
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = sigterm.recv() => {}
                }
            }
            #[cfg(not(unix))]
            {
                let _ = tokio::signal::ctrl_c().await;
            }
        } => {
            info!("received shutdown signal");
        }
    }

    Ok(())
}
