use secrecy::Secret;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database_url: String,
    pub base_url: String,
    pub host: String,
    pub port: u16,

    // Bearer tokens (shared with the auth service)
    pub token_secret: Secret<String>,
    pub token_ttl_hours: i64,

    // Simulated payment processor
    pub payment_success_rate: f64,
    pub payment_latency_ms: u64,

    // Outgoing email
    pub mail_from: String,

    // Browser app origin allowed by CORS
    pub cors_allowed_origin: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self, config::ConfigError> {
        // Load .env file if it exists (for local development)
        let _ = dotenvy::dotenv();

        let config = config::Config::builder()
            .set_default("host", "127.0.0.1")?
            .set_default("port", 8080)?
            .set_default("token_ttl_hours", 24)?
            .set_default("payment_success_rate", 0.8)?
            .set_default("payment_latency_ms", 150)?
            .set_default("mail_from", "no-reply@ticket-market.local")?
            .add_source(config::Environment::default().separator("__"))
            .build()?;

        let payment_success_rate: f64 = config.get("payment_success_rate")?;
        if !(0.0..=1.0).contains(&payment_success_rate) {
            return Err(config::ConfigError::Message(
                "payment_success_rate must be between 0 and 1".to_string(),
            ));
        }

        Ok(Self {
            database_url: config.get("database_url")?,
            base_url: config.get("base_url")?,
            host: config.get("host")?,
            port: config.get("port")?,

            token_secret: Secret::new(config.get("token_secret")?),
            token_ttl_hours: config.get("token_ttl_hours")?,

            payment_success_rate,
            payment_latency_ms: config.get("payment_latency_ms")?,

            mail_from: config.get("mail_from")?,

            cors_allowed_origin: config.get("cors_allowed_origin").ok(),
        })
    }
}
