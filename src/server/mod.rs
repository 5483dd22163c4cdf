// Central server: ingestion, stores, alerting, auth, HTTP surface

pub mod access_log;
pub mod alerts;
pub mod auth;
pub mod config_store;
pub mod event_store;
pub mod geoip;
pub mod ingest;
pub mod metrics_store;
pub mod mfa;
pub mod routes;

use std::sync::Arc;

use alerts::AlertEvaluator;
use auth::AuthManager;
use config_store::ConfigStore;
use event_store::EventStore;
use geoip::GeoIpResolver;
use metrics_store::MetricsStore;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ConfigStore>,
    pub auth: Arc<AuthManager>,
    pub metrics: Arc<MetricsStore>,
    pub events: Arc<EventStore>,
    pub alerts: Arc<AlertEvaluator>,
    pub geoip: Arc<GeoIpResolver>,
}
