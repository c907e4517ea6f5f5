use std::time::Duration;

/// Timeouts applied by the gateway to each live connection.
#[derive(Debug, Clone, PartialEq)]
pub struct GatewayConfig {
    /// How long a fresh connection may stay silent before sending its auth frame.
    pub auth_timeout: Duration,
    /// Upper bound on a single outbound frame write.
    pub send_timeout: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            auth_timeout: Duration::from_secs(30),
            send_timeout: Duration::from_secs(10),
        }
    }
}

pub struct Config {
    pub port: u16,
    pub database_url: String,
    pub gateway: GatewayConfig,
}

fn secs_from_env(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .filter(|secs| *secs > 0)
        .map(Duration::from_secs)
        .unwrap_or(default)
}

impl Config {
    pub fn from_env() -> Self {
        let defaults = GatewayConfig::default();

        Self {
            port: std::env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(8000),
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite:onfine.db?mode=rwc".to_string()),
            gateway: GatewayConfig {
                auth_timeout: secs_from_env("ONFINE_AUTH_TIMEOUT_SECS", defaults.auth_timeout),
                send_timeout: secs_from_env("ONFINE_SEND_TIMEOUT_SECS", defaults.send_timeout),
            },
        }
    }
}
