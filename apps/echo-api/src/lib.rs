pub mod assistant;
pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod gateway;
pub mod models;
pub mod moderation;
pub mod routes;

use std::sync::Arc;

use auth::gate::SessionGate;
use auth::rate_limit::RateLimiter;
use auth::tokens::TokenCodec;
use config::Config;
use db::identities::IdentityStore;
use db::messages::MessageStore;
use gateway::Gateway;

/// Shared application state available to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub identities: Arc<dyn IdentityStore>,
    pub messages: Arc<dyn MessageStore>,
    pub tokens: TokenCodec,
    pub gate: Arc<SessionGate>,
    pub gateway: Arc<Gateway>,
}

impl AppState {
    pub fn new(
        config: Config,
        identities: Arc<dyn IdentityStore>,
        messages: Arc<dyn MessageStore>,
    ) -> Self {
        let tokens = TokenCodec::new(&config.jwt_secret, config.jwt_ttl);
        let limiter = RateLimiter::new(config.ws_rate_limit_max, config.ws_rate_limit_window);
        let gate = Arc::new(SessionGate::new(
            tokens.clone(),
            Arc::clone(&identities),
            limiter,
        ));
        let gateway = Arc::new(Gateway::new(
            &config,
            Arc::clone(&gate),
            Arc::clone(&identities),
            Arc::clone(&messages),
        ));

        Self {
            config: Arc::new(config),
            identities,
            messages,
            tokens,
            gate,
            gateway,
        }
    }
}
