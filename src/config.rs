/// Configuration management for Gatehouse
use crate::error::{GateError, GateResult};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

/// Main server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub service: ServiceConfig,
    pub database: DatabaseConfig,
    pub authentication: AuthConfig,
    pub cache: CacheConfig,
    pub email: Option<EmailConfig>,
    pub logging: LoggingConfig,
}

/// Service-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub hostname: String,
    pub port: u16,
    pub public_url: String,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub account_db: PathBuf,
    pub max_connections: u32,
}

/// Authentication configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    pub jwt_secret: String,
    /// Bearer token lifetime in seconds (default: 7 days)
    pub token_ttl: i64,
    /// One-time token lifetime in seconds (default: 7 days)
    pub one_time_token_ttl: i64,
    /// bcrypt work factor
    pub bcrypt_cost: u32,
}

/// Session cache configuration
///
/// When no Redis URL is configured the service falls back to the
/// in-process store, which does not survive restarts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub redis_url: Option<String>,
}

/// Email configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailConfig {
    pub smtp_url: String,
    pub from_address: String,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

impl ServerConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> GateResult<Self> {
        dotenv::dotenv().ok();

        let hostname = env::var("GATE_HOSTNAME").unwrap_or_else(|_| "localhost".to_string());
        let port = env::var("GATE_PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse()
            .map_err(|_| GateError::Validation("Invalid port number".to_string()))?;
        let public_url = env::var("GATE_PUBLIC_URL")
            .unwrap_or_else(|_| format!("http://{}:{}", hostname, port));

        let data_directory: PathBuf = env::var("GATE_DATA_DIRECTORY")
            .unwrap_or_else(|_| "./data".to_string())
            .into();
        let account_db = env::var("GATE_ACCOUNT_DB_LOCATION")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_directory.join("account.sqlite"));
        let max_connections = env::var("GATE_DB_MAX_CONNECTIONS")
            .unwrap_or_else(|_| "10".to_string())
            .parse()
            .unwrap_or(10);

        let jwt_secret = env::var("GATE_JWT_SECRET")
            .map_err(|_| GateError::Validation("JWT secret required".to_string()))?;
        let token_ttl = env::var("GATE_TOKEN_TTL")
            .unwrap_or_else(|_| (7 * 24 * 3600).to_string())
            .parse()
            .unwrap_or(7 * 24 * 3600);
        let one_time_token_ttl = env::var("GATE_ONE_TIME_TOKEN_TTL")
            .unwrap_or_else(|_| (7 * 24 * 3600).to_string())
            .parse()
            .unwrap_or(7 * 24 * 3600);
        let bcrypt_cost = env::var("GATE_BCRYPT_COST")
            .unwrap_or_else(|_| "10".to_string())
            .parse()
            .unwrap_or(10);

        let redis_url = env::var("GATE_REDIS_URL").ok();

        let email = if let Ok(smtp_url) = env::var("GATE_EMAIL_SMTP_URL") {
            Some(EmailConfig {
                smtp_url,
                from_address: env::var("GATE_EMAIL_FROM_ADDRESS")
                    .unwrap_or_else(|_| format!("noreply@{}", hostname)),
            })
        } else {
            None
        };

        let log_level = env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

        Ok(ServerConfig {
            service: ServiceConfig {
                hostname,
                port,
                public_url,
            },
            database: DatabaseConfig {
                account_db,
                max_connections,
            },
            authentication: AuthConfig {
                jwt_secret,
                token_ttl,
                one_time_token_ttl,
                bcrypt_cost,
            },
            cache: CacheConfig { redis_url },
            email,
            logging: LoggingConfig { level: log_level },
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> GateResult<()> {
        if self.service.hostname.is_empty() {
            return Err(GateError::Validation("Hostname cannot be empty".to_string()));
        }

        if self.authentication.jwt_secret.len() < 32 {
            return Err(GateError::Validation(
                "JWT secret must be at least 32 characters".to_string(),
            ));
        }

        if self.authentication.token_ttl <= 0 {
            return Err(GateError::Validation(
                "Token TTL must be positive".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> ServerConfig {
        ServerConfig {
            service: ServiceConfig {
                hostname: "localhost".to_string(),
                port: 8080,
                public_url: "http://localhost:8080".to_string(),
            },
            database: DatabaseConfig {
                account_db: PathBuf::from(":memory:"),
                max_connections: 10,
            },
            authentication: AuthConfig {
                jwt_secret: "test-secret-key-0123456789-0123456789".to_string(),
                token_ttl: 3600,
                one_time_token_ttl: 3600,
                bcrypt_cost: 4,
            },
            cache: CacheConfig { redis_url: None },
            email: None,
            logging: LoggingConfig {
                level: "info".to_string(),
            },
        }
    }

    #[test]
    fn test_validate_accepts_sane_config() {
        assert!(base_config().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_short_secret() {
        let mut config = base_config();
        config.authentication.jwt_secret = "short".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_non_positive_ttl() {
        let mut config = base_config();
        config.authentication.token_ttl = 0;
        assert!(config.validate().is_err());
    }
}
