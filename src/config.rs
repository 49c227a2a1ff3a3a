use std::time::Duration;

pub struct Config {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub sse_keep_alive: Duration,
    pub token_ttl_days: i64,
}

impl Config {
    pub fn from_env() -> Self {
        let sse_keep_alive_secs: u64 = std::env::var("CLINIC_SSE_KEEPALIVE_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .filter(|secs| *secs > 0)
            .unwrap_or(15);

        Self {
            host: std::env::var("CLINIC_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: std::env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(39100),
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite:clinicnotify.db?mode=rwc".to_string()),
            sse_keep_alive: Duration::from_secs(sse_keep_alive_secs),
            token_ttl_days: std::env::var("CLINIC_TOKEN_TTL_DAYS")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|days| *days > 0)
                .unwrap_or(30),
        }
    }
}
