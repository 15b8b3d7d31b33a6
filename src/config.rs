use std::{env, str::FromStr};

use chrono::{TimeDelta, Utc};

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    /// Origin used to build gateway success/cancel URLs when the request carries none.
    pub public_base_url: String,
    /// Extra request origins allowed to receive gateway redirects.
    pub allowed_origins: Vec<String>,
    pub currency: String,
    pub stripe: Option<StripeConfig>,
    pub gateway_max_attempts: u32,
    pub gateway_timeout_secs: u64,
    pub orphan_order_ttl_minutes: i64,
    pub orphan_sweep_interval_secs: u64,
}

#[derive(Debug, Clone)]
pub struct StripeConfig {
    pub secret_key: String,
    pub webhook_secret: Option<String>,
    pub api_base: String,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = env::var("DATABASE_URL")?;
        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = parse_or("APP_PORT", 3000);
        let public_base_url = env::var("PUBLIC_BASE_URL")
            .unwrap_or_else(|_| format!("http://localhost:{port}"));
        let allowed_origins = env::var("ALLOWED_ORIGINS")
            .map(|v| {
                v.split(',')
                    .map(|o| o.trim().to_string())
                    .filter(|o| !o.is_empty())
                    .collect()
            })
            .unwrap_or_default();
        let currency = env::var("CURRENCY").unwrap_or_else(|_| "usd".to_string());

        let stripe = env::var("STRIPE_SECRET_KEY")
            .ok()
            .filter(|k| !k.is_empty())
            .map(|secret_key| StripeConfig {
                secret_key,
                webhook_secret: env::var("STRIPE_WEBHOOK_SECRET")
                    .ok()
                    .filter(|s| !s.is_empty()),
                api_base: env::var("STRIPE_API_BASE")
                    .unwrap_or_else(|_| "https://api.stripe.com".to_string()),
            });

        let orphan_order_ttl_minutes = parse_or("ORPHAN_ORDER_TTL_MINUTES", 60i64);
        if orphan_ttl(orphan_order_ttl_minutes).is_none() {
            anyhow::bail!("ORPHAN_ORDER_TTL_MINUTES out of range: {orphan_order_ttl_minutes}");
        }

        Ok(Self {
            database_url,
            host,
            port,
            public_base_url,
            allowed_origins,
            currency,
            stripe,
            gateway_max_attempts: parse_or("GATEWAY_MAX_ATTEMPTS", 3u32).max(1),
            gateway_timeout_secs: parse_or("GATEWAY_TIMEOUT_SECS", 10),
            orphan_order_ttl_minutes,
            orphan_sweep_interval_secs: parse_or("ORPHAN_SWEEP_INTERVAL_SECS", 300),
        })
    }
}

impl AppConfig {
    pub fn orphan_order_ttl(&self) -> Option<TimeDelta> {
        orphan_ttl(self.orphan_order_ttl_minutes)
    }
}

/// A non-negative age that can still be subtracted from the current time.
pub fn orphan_ttl(minutes: i64) -> Option<TimeDelta> {
    if minutes < 0 {
        return None;
    }
    let ttl = TimeDelta::try_minutes(minutes)?;
    Utc::now().checked_sub_signed(ttl)?;
    Some(ttl)
}

fn parse_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}
