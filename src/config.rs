use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub export: ExportConfig,
    pub retention: RetentionConfig,
    pub admin_tokens: Vec<AdminTokenConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// sqlx SQLite URL, e.g. `sqlite://loghub.db`
    pub url: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExportConfig {
    /// Directory export CSV files are written into.
    pub directory: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetentionConfig {
    /// Local hour of day (0-23) at which the daily sweep runs.
    pub sweep_hour: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AdminTokenConfig {
    pub token: String,
    pub name: String,
    pub enabled: bool,
    pub admin: bool,
}

pub fn load_config(path: &Path) -> anyhow::Result<Config> {
    let config = config::Config::builder()
        .add_source(config::File::from(path))
        .add_source(config::Environment::with_prefix("LOGHUB").separator("__"))
        .build()?;

    let cfg: Config = config.try_deserialize()?;
    validate_config(&cfg)?;

    Ok(cfg)
}

fn validate_config(cfg: &Config) -> anyhow::Result<()> {
    if cfg.admin_tokens.is_empty() {
        anyhow::bail!("At least one admin token must be configured");
    }

    for token in &cfg.admin_tokens {
        if token.name.is_empty() {
            anyhow::bail!("Admin token name cannot be empty");
        }
        if token.token.is_empty() {
            anyhow::bail!("Admin token '{}' has an empty token value", token.name);
        }
    }

    if cfg.database.url.is_empty() {
        anyhow::bail!("Database URL cannot be empty");
    }

    if cfg.export.directory.is_empty() {
        anyhow::bail!("Export directory cannot be empty");
    }

    if cfg.retention.sweep_hour > 23 {
        anyhow::bail!(
            "Retention sweep hour must be 0-23, got {}",
            cfg.retention.sweep_hour
        );
    }

    Ok(())
}

/// Copy of the configuration with token values masked, for `config show`.
pub fn masked(cfg: &Config) -> Config {
    let mut masked = cfg.clone();
    for token in &mut masked.admin_tokens {
        token.token = "********".to_string();
    }
    masked
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_config() -> Config {
        Config {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
                log_level: "info".to_string(),
                log_format: "json".to_string(),
            },
            database: DatabaseConfig {
                url: "sqlite://loghub.db".to_string(),
            },
            export: ExportConfig {
                directory: "exports".to_string(),
            },
            retention: RetentionConfig { sweep_hour: 3 },
            admin_tokens: vec![AdminTokenConfig {
                token: "tok-test".to_string(),
                name: "test".to_string(),
                enabled: true,
                admin: true,
            }],
        }
    }

    #[test]
    fn test_validate_config_requires_admin_token() {
        let mut cfg = create_test_config();
        cfg.admin_tokens.clear();

        let result = validate_config(&cfg);
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("At least one admin token"));
    }

    #[test]
    fn test_validate_config_rejects_empty_token_name() {
        let mut cfg = create_test_config();
        cfg.admin_tokens[0].name.clear();

        assert!(validate_config(&cfg).is_err());
    }

    #[test]
    fn test_validate_config_rejects_bad_sweep_hour() {
        let mut cfg = create_test_config();
        cfg.retention.sweep_hour = 24;

        let result = validate_config(&cfg);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("sweep hour"));
    }

    #[test]
    fn test_validate_config_accepts_valid() {
        assert!(validate_config(&create_test_config()).is_ok());
    }

    #[test]
    fn test_masked_hides_token_values() {
        let cfg = create_test_config();
        let masked = masked(&cfg);
        assert_eq!(masked.admin_tokens[0].token, "********");
        assert_eq!(masked.admin_tokens[0].name, "test");
        // original untouched
        assert_eq!(cfg.admin_tokens[0].token, "tok-test");
    }
}
