use std::sync::Arc;
use std::time::Duration;

use axum::extract::FromRef;
use secrecy::ExposeSecret;
use sqlx::PgPool;

use crate::config::Config;
use crate::services::{
    notifier::{ConsoleMailer, Notifier},
    payment::{PaymentGateway, SimulatedPaymentGateway},
    token::TokenKey,
};

/// Application state shared by every handler.
///
/// Collaborators are injected here once at startup; handlers never reach for
/// globals.
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Config,
    pub token_key: TokenKey,
    pub payments: Arc<dyn PaymentGateway>,
    pub notifier: Notifier,
}

impl AppState {
    /// Wires the simulated payment processor and console mailer from config
    pub fn new(pool: PgPool, config: Config) -> Self {
        let token_key = TokenKey::from_secret(config.token_secret.expose_secret());
        let payments = SimulatedPaymentGateway::shared(
            config.payment_success_rate,
            Duration::from_millis(config.payment_latency_ms),
        );
        let notifier = Notifier::new(
            Arc::new(ConsoleMailer::new(config.mail_from.clone())),
            config.base_url.clone(),
        );

        Self {
            pool,
            config,
            token_key,
            payments,
            notifier,
        }
    }
}

impl FromRef<AppState> for PgPool {
    fn from_ref(state: &AppState) -> PgPool {
        state.pool.clone()
    }
}
