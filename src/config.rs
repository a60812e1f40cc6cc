use serde::Deserialize;

/// Connection settings for the external user directory.
#[derive(Debug, Clone, Deserialize)]
pub struct DirectoryConfig {
    pub url: Option<String>,
    pub token: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub db_max_connections: u32,
    pub host: String,
    pub port: u16,
    pub directory: DirectoryConfig,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL")?;
        let directory = DirectoryConfig {
            url: std::env::var("USER_SERVICE_URL")
                .ok()
                .filter(|v| !v.trim().is_empty()),
            token: std::env::var("USER_SERVICE_KEY").unwrap_or_default(),
            timeout_secs: std::env::var("USER_SERVICE_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(10),
        };
        Ok(Self {
            database_url,
            db_max_connections: std::env::var("DB_MAX_CONNECTIONS")
                .ok()
                .and_then(|v| v.parse::<u32>().ok())
                .unwrap_or(10),
            host: std::env::var("APP_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port: std::env::var("APP_PORT")
                .ok()
                .and_then(|v| v.parse::<u16>().ok())
                .unwrap_or(8080),
            directory,
        })
    }
}
