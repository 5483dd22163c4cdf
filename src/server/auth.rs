// Auth fabric: system API key, agent secrets, bcrypt admin password, JWT

use std::sync::Arc;

use anyhow::Context;
use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::server::AppState;
use crate::server::config_store::ConfigStore;

const BCRYPT_COST: u32 = 12;
/// Stored values shorter than a bcrypt hash are legacy plaintext.
const BCRYPT_MIN_LEN: usize = 55;
const TOKEN_TTL_HOURS: i64 = 24;
pub const AGENT_SECRET_HEADER: &str = "X-Agent-Secret";

/// URL-safe random string for API keys and agent secrets.
pub fn random_string(n: usize) -> String {
    const CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789-_";
    let mut rng = rand::thread_rng();
    (0..n)
        .map(|_| CHARSET[rng.gen_range(0..CHARSET.len())] as char)
        .collect()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub username: String,
    pub role: String,
    /// Allowed host patterns; "*" grants everything.
    pub allowed: Vec<String>,
    pub exp: i64,
}

pub struct AuthManager {
    config: Arc<ConfigStore>,
    jwt_secret: Vec<u8>,
}

impl AuthManager {
    /// Bootstraps secrets on first boot: system API key, admin password
    /// (env > persisted hash > generated), plaintext-hash migration.
    pub fn new(config: Arc<ConfigStore>) -> anyhow::Result<Self> {
        let jwt_secret = match std::env::var("JWT_SECRET") {
            Ok(s) if !s.is_empty() => s.into_bytes(),
            _ => {
                warn!("JWT_SECRET not set; using a random per-boot key (tokens will not survive restarts)");
                random_string(32).into_bytes()
            }
        };

        let mgr = Self { config, jwt_secret };
        mgr.bootstrap_system_api_key()?;
        mgr.bootstrap_admin_password()?;
        Ok(mgr)
    }

    fn bootstrap_system_api_key(&self) -> anyhow::Result<()> {
        if self.config.get().system_api_key.is_empty() {
            let key = random_string(32);
            self.config.update(|c| c.system_api_key = key.clone())?;
            info!("generated system API key for agent enrollment");
        }
        Ok(())
    }

    fn bootstrap_admin_password(&self) -> anyhow::Result<()> {
        let current = self.config.get().admin_password;

        if let Ok(env_pass) = std::env::var("ADMIN_PASSWORD")
            && !env_pass.is_empty()
        {
            let unchanged = !current.is_empty()
                && current.len() >= BCRYPT_MIN_LEN
                && bcrypt::verify(&env_pass, &current).unwrap_or(false);
            if !unchanged {
                let hash = bcrypt::hash(&env_pass, BCRYPT_COST)?;
                self.config.update(|c| c.admin_password = hash)?;
                info!("admin password loaded from environment and hashed");
            }
            return Ok(());
        }

        if current.is_empty() {
            let generated = random_string(16);
            let hash = bcrypt::hash(&generated, BCRYPT_COST)?;
            self.config.update(|c| c.admin_password = hash)?;
            eprintln!("---------------------------------------------------");
            eprintln!("Admin password generated: {}", generated);
            eprintln!("Save it now; it will not be printed again.");
            eprintln!("---------------------------------------------------");
            return Ok(());
        }

        if current.len() < BCRYPT_MIN_LEN {
            // legacy plaintext value: hash it in place
            let hash = bcrypt::hash(&current, BCRYPT_COST)?;
            self.config.update(|c| c.admin_password = hash)?;
            warn!("migrated plaintext admin password to a bcrypt hash");
        }
        Ok(())
    }

    pub fn validate_password(&self, password: &str) -> bool {
        let hash = self.config.get().admin_password;
        !hash.is_empty() && bcrypt::verify(password, &hash).unwrap_or(false)
    }

    pub fn generate_token(
        &self,
        username: &str,
        role: &str,
        allowed: Vec<String>,
    ) -> anyhow::Result<String> {
        let claims = Claims {
            username: username.to_string(),
            role: role.to_string(),
            allowed,
            exp: (Utc::now() + Duration::hours(TOKEN_TTL_HOURS)).timestamp(),
        };
        jsonwebtoken::encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(&self.jwt_secret),
        )
        .context("token signing failed")
    }

    pub fn decode_token(&self, token: &str) -> anyhow::Result<Claims> {
        let data = jsonwebtoken::decode::<Claims>(
            token,
            &DecodingKey::from_secret(&self.jwt_secret),
            &Validation::default(),
        )
        .context("invalid token")?;
        Ok(data.claims)
    }

    /// An agent secret is valid if it matches any enrolled host.
    pub fn validate_agent_secret(&self, secret: &str) -> bool {
        !secret.is_empty()
            && self
                .config
                .get()
                .agent_secrets
                .values()
                .any(|s| s == secret)
    }
}

fn auth_enabled() -> bool {
    // auth is ON unless explicitly disabled
    std::env::var("AUTH_ENABLED").as_deref() != Ok("false")
}

fn unauthorized(msg: &str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        axum::Json(serde_json::json!({ "error": msg })),
    )
        .into_response()
}

fn bearer_token(req: &Request) -> Option<String> {
    let value = req.headers().get(axum::http::header::AUTHORIZATION)?;
    let s = value.to_str().ok()?;
    Some(s.strip_prefix("Bearer ").unwrap_or(s).to_string())
}

async fn require_role(state: AppState, req: Request, next: Next, role: &str) -> Response {
    if !auth_enabled() {
        return next.run(req).await;
    }
    let Some(token) = bearer_token(&req) else {
        return unauthorized("No token provided");
    };
    match state.auth.decode_token(&token) {
        Ok(claims) => {
            if role == "admin" && claims.role != "admin" {
                return (
                    StatusCode::FORBIDDEN,
                    axum::Json(serde_json::json!({ "error": "admin role required" })),
                )
                    .into_response();
            }
            next.run(req).await
        }
        Err(_) => unauthorized("Invalid token"),
    }
}

/// JWT enforcement for user-facing endpoints unless AUTH_ENABLED=false.
pub async fn optional_user_auth(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Response {
    require_role(state, req, next, "user").await
}

/// JWT + admin role for management endpoints unless AUTH_ENABLED=false.
pub async fn optional_admin_auth(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Response {
    require_role(state, req, next, "admin").await
}

/// Shared-secret gate for agent-targeted endpoints. Always enforced.
pub async fn agent_secret_auth(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Response {
    let secret = req
        .headers()
        .get(AGENT_SECRET_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if !state.auth.validate_agent_secret(secret) {
        return (
            StatusCode::FORBIDDEN,
            axum::Json(serde_json::json!({ "error": "invalid agent secret" })),
        )
            .into_response();
    }
    next.run(req).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::config_store::ConfigStore;

    fn store() -> Arc<ConfigStore> {
        let dir = tempfile::TempDir::new().unwrap();
        let store = ConfigStore::open(dir.path().join("server-config.json")).unwrap();
        // leak the tempdir so the path stays valid for the test lifetime
        std::mem::forget(dir);
        Arc::new(store)
    }

    #[test]
    fn random_string_is_url_safe_and_sized() {
        let s = random_string(32);
        assert_eq!(s.len(), 32);
        assert!(s.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn bootstrap_generates_system_api_key_and_admin_hash() {
        let cfg = store();
        let mgr = AuthManager::new(cfg.clone()).unwrap();
        let c = cfg.get();
        assert_eq!(c.system_api_key.len(), 32);
        assert!(c.admin_password.starts_with("$2"));
        assert!(c.admin_password.len() >= BCRYPT_MIN_LEN);
        // the generated password is unknown here; a wrong guess must fail
        assert!(!mgr.validate_password("definitely-wrong"));
    }

    #[test]
    fn plaintext_admin_password_is_migrated_in_place() {
        let cfg = store();
        cfg.update(|c| c.admin_password = "hunter2".into()).unwrap();
        let mgr = AuthManager::new(cfg.clone()).unwrap();
        let stored = cfg.get().admin_password;
        assert!(stored.starts_with("$2"));
        assert!(mgr.validate_password("hunter2"));
        assert!(!mgr.validate_password("hunter3"));
    }

    #[test]
    fn token_round_trip_carries_claims() {
        let mgr = AuthManager::new(store()).unwrap();
        let token = mgr
            .generate_token("admin", "admin", vec!["*".into()])
            .unwrap();
        let claims = mgr.decode_token(&token).unwrap();
        assert_eq!(claims.username, "admin");
        assert_eq!(claims.role, "admin");
        assert_eq!(claims.allowed, vec!["*"]);
        assert!(claims.exp > Utc::now().timestamp());
    }

    #[test]
    fn agent_secret_membership_check() {
        let cfg = store();
        cfg.update(|c| {
            c.agent_secrets.insert("node-1".into(), "abc123".into());
        })
        .unwrap();
        let mgr = AuthManager::new(cfg).unwrap();
        assert!(mgr.validate_agent_secret("abc123"));
        assert!(!mgr.validate_agent_secret("zzz"));
        assert!(!mgr.validate_agent_secret(""));
    }
}
