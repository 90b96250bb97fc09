use serde::Deserialize;

/// Token signing settings, loaded once at startup and shared process-wide.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenConfig {
    pub secret: String,
    pub algorithm: String,
    pub access_window_secs: i64,
    pub refresh_window_secs: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub token: TokenConfig,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL")?;
        let token = TokenConfig {
            secret: std::env::var("TOKEN_SECRET")?,
            algorithm: std::env::var("TOKEN_ALGORITHM").unwrap_or_else(|_| "HS256".into()),
            access_window_secs: std::env::var("ACCESS_WINDOW_SECS")
                .ok()
                .and_then(|v| v.parse::<i64>().ok())
                .unwrap_or(3600),
            refresh_window_secs: std::env::var("REFRESH_WINDOW_SECS")
                .ok()
                .and_then(|v| v.parse::<i64>().ok())
                .unwrap_or(60 * 60 * 24 * 14),
        };
        Ok(Self {
            database_url,
            token,
        })
    }
}
