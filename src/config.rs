use std::time::Duration;

/// Runtime configuration, resolved from the environment once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server bind address (default: 0.0.0.0:8080)
    pub bind_addr: String,
    /// Admission policy for the send endpoint.
    pub rate_limit: RateLimitConfig,
    /// Outbound mail credentials; absent when not fully configured.
    pub sendgrid: Option<SendGridConfig>,
}

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Maximum send requests per window per client (default: 5)
    pub max_requests: u64,
    /// Window length in minutes (default: 15)
    pub window_minutes: u64,
}

impl RateLimitConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_minutes * 60)
    }
}

#[derive(Debug, Clone)]
pub struct SendGridConfig {
    pub api_key: String,
    pub from_email: String,
    pub from_name: String,
}

impl Config {
    /// Load configuration from environment variables. Malformed numeric values fall back to
    /// their defaults; empty strings count as unset.
    pub fn from_env() -> Self {
        let sendgrid = match (var("SENDGRID_API_KEY"), var("SENDGRID_FROM_EMAIL")) {
            (Some(api_key), Some(from_email)) => Some(SendGridConfig {
                api_key,
                from_email,
                from_name: var("SENDGRID_FROM_NAME")
                    .unwrap_or_else(|| "HTML Email Sender".to_string()),
            }),
            _ => None,
        };
        Config {
            bind_addr: var("BIND_ADDR").unwrap_or_else(|| "0.0.0.0:8080".to_string()),
            rate_limit: RateLimitConfig {
                max_requests: var("RATE_LIMIT_MAX_REQUESTS")
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(5),
                window_minutes: var("RATE_LIMIT_WINDOW_MINUTES")
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(15),
            },
            sendgrid,
        }
    }
}

fn var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}
