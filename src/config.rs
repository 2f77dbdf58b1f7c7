/// Configuration management for the IPAM admin service
use crate::error::{IpamError, IpamResult};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

/// Main server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub service: ServiceConfig,
    pub storage: StorageConfig,
    pub authentication: AuthConfig,
    pub audit: AuditConfig,
    pub logging: LoggingConfig,
    pub bootstrap: Option<BootstrapConfig>,
}

/// Service-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub hostname: String,
    pub port: u16,
    pub version: String,
    /// Take the client address from `X-Forwarded-For`; only safe behind a proxy that sets it
    pub trust_forwarded_for: bool,
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub database_path: PathBuf,
    pub max_connections: u32,
    pub enable_wal: bool,
}

/// Authentication configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    pub jwt_secret: String,
    /// Access token lifetime in seconds
    pub access_token_ttl: i64,
    pub password_hashing: PasswordHashingConfig,
}

/// Argon2id cost parameters
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PasswordHashingConfig {
    /// Memory cost in KiB
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for PasswordHashingConfig {
    fn default() -> Self {
        Self {
            memory_kib: 19 * 1024,
            iterations: 2,
            parallelism: 1,
        }
    }
}

/// Audit log read configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditConfig {
    pub default_page_size: u32,
    pub max_page_size: u32,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    /// "plain" or "json"
    pub format: String,
}

/// Initial Developer account created on an empty database
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BootstrapConfig {
    pub name: String,
    pub email: String,
    pub password: String,
}

impl ServerConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> IpamResult<Self> {
        dotenv::dotenv().ok();

        let hostname = env::var("IPAM_HOSTNAME").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("IPAM_PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse()
            .map_err(|_| IpamError::validation("IPAM_PORT", "Invalid port number"))?;
        let version =
            env::var("IPAM_VERSION").unwrap_or_else(|_| env!("CARGO_PKG_VERSION").to_string());
        let trust_forwarded_for = env::var("IPAM_TRUST_FORWARDED_FOR")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false);

        let data_directory: PathBuf = env::var("IPAM_DATA_DIRECTORY")
            .unwrap_or_else(|_| "./data".to_string())
            .into();
        let database_path = env::var("IPAM_DATABASE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_directory.join("ipam.sqlite"));
        let max_connections = env::var("IPAM_DB_MAX_CONNECTIONS")
            .unwrap_or_else(|_| "10".to_string())
            .parse()
            .unwrap_or(10);
        let enable_wal = env::var("IPAM_DB_WAL")
            .map(|v| v != "false" && v != "0")
            .unwrap_or(true);

        let jwt_secret = env::var("IPAM_JWT_SECRET")
            .map_err(|_| IpamError::validation("IPAM_JWT_SECRET", "JWT secret required"))?;
        let access_token_ttl = env::var("IPAM_ACCESS_TOKEN_TTL")
            .unwrap_or_else(|_| "7200".to_string())
            .parse()
            .unwrap_or(7200);

        let defaults = PasswordHashingConfig::default();
        let password_hashing = PasswordHashingConfig {
            memory_kib: env::var("IPAM_ARGON2_MEMORY_KIB")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.memory_kib),
            iterations: env::var("IPAM_ARGON2_ITERATIONS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.iterations),
            parallelism: env::var("IPAM_ARGON2_PARALLELISM")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.parallelism),
        };

        let default_page_size = env::var("IPAM_AUDIT_PAGE_SIZE")
            .unwrap_or_else(|_| "10".to_string())
            .parse()
            .unwrap_or(10);
        let max_page_size = env::var("IPAM_AUDIT_MAX_PAGE_SIZE")
            .unwrap_or_else(|_| "100".to_string())
            .parse()
            .unwrap_or(100);

        let level = env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
        let format = env::var("IPAM_LOG_FORMAT").unwrap_or_else(|_| "plain".to_string());

        // Bootstrap account is only configured when all three values are present
        let bootstrap = match (
            env::var("IPAM_BOOTSTRAP_NAME"),
            env::var("IPAM_BOOTSTRAP_EMAIL"),
            env::var("IPAM_BOOTSTRAP_PASSWORD"),
        ) {
            (Ok(name), Ok(email), Ok(password)) => Some(BootstrapConfig {
                name,
                email,
                password,
            }),
            _ => None,
        };

        Ok(ServerConfig {
            service: ServiceConfig {
                hostname,
                port,
                version,
                trust_forwarded_for,
            },
            storage: StorageConfig {
                database_path,
                max_connections,
                enable_wal,
            },
            authentication: AuthConfig {
                jwt_secret,
                access_token_ttl,
                password_hashing,
            },
            audit: AuditConfig {
                default_page_size,
                max_page_size,
            },
            logging: LoggingConfig { level, format },
            bootstrap,
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> IpamResult<()> {
        if self.service.hostname.is_empty() {
            return Err(IpamError::validation("IPAM_HOSTNAME", "Hostname cannot be empty"));
        }

        if self.authentication.jwt_secret.len() < 32 {
            return Err(IpamError::validation(
                "IPAM_JWT_SECRET",
                "JWT secret must be at least 32 characters",
            ));
        }

        if self.authentication.access_token_ttl <= 0 {
            return Err(IpamError::validation(
                "IPAM_ACCESS_TOKEN_TTL",
                "Access token lifetime must be positive",
            ));
        }

        if self.audit.default_page_size == 0
            || self.audit.default_page_size > self.audit.max_page_size
        {
            return Err(IpamError::validation(
                "IPAM_AUDIT_PAGE_SIZE",
                "Default page size must be between 1 and the maximum page size",
            ));
        }

        if let Some(bootstrap) = &self.bootstrap {
            if bootstrap.password.len() < 8 {
                return Err(IpamError::validation(
                    "IPAM_BOOTSTRAP_PASSWORD",
                    "Bootstrap password must be at least 8 characters",
                ));
            }
        }

        Ok(())
    }

    /// Configuration suitable for tests and ephemeral runs
    pub fn for_testing() -> Self {
        ServerConfig {
            service: ServiceConfig {
                hostname: "127.0.0.1".to_string(),
                port: 0,
                version: env!("CARGO_PKG_VERSION").to_string(),
                trust_forwarded_for: false,
            },
            storage: StorageConfig {
                database_path: PathBuf::from(":memory:"),
                max_connections: 1,
                enable_wal: false,
            },
            authentication: AuthConfig {
                jwt_secret: "test-secret-that-is-at-least-32-characters".to_string(),
                access_token_ttl: 3600,
                password_hashing: PasswordHashingConfig {
                    memory_kib: 8,
                    iterations: 1,
                    parallelism: 1,
                },
            },
            audit: AuditConfig {
                default_page_size: 10,
                max_page_size: 100,
            },
            logging: LoggingConfig {
                level: "debug".to_string(),
                format: "plain".to_string(),
            },
            bootstrap: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_testing_config_is_valid() {
        assert!(ServerConfig::for_testing().validate().is_ok());
    }

    #[test]
    fn test_short_secret_rejected() {
        let mut config = ServerConfig::for_testing();
        config.authentication.jwt_secret = "short".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_page_size_bounds() {
        let mut config = ServerConfig::for_testing();
        config.audit.default_page_size = 500;
        assert!(config.validate().is_err());

        config.audit.default_page_size = 0;
        assert!(config.validate().is_err());
    }
}
