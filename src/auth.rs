use crate::{config::Config, error::AppError};
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;

/// Authentication information attached to each authenticated request
#[derive(Debug, Clone)]
pub struct AuthInfo {
    /// Name of the admin token used for authentication. Doubles as the actor
    /// recorded on log entries written during the request.
    pub token_name: String,
}

/// Authentication middleware for the admin log API.
/// Extracts and validates the Bearer token from the Authorization header.
pub async fn auth_middleware(
    State(config): State<Arc<Config>>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let auth_header = req
        .headers()
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::Unauthorized("Missing Authorization header".to_string()))?;

    let info = authenticate(&config, auth_header)?;
    req.extensions_mut().insert(info);

    Ok(next.run(req).await)
}

/// Validate an Authorization header value against the configured tokens.
/// Unknown or disabled tokens are indistinguishable to the caller.
pub fn authenticate(config: &Config, auth_header: &str) -> Result<AuthInfo, AppError> {
    let token = extract_bearer_token(auth_header)?;

    let entry = config
        .admin_tokens
        .iter()
        .find(|t| t.token == token && t.enabled)
        .ok_or_else(|| AppError::Unauthorized("Invalid or disabled token".to_string()))?;

    if !entry.admin {
        return Err(AppError::Forbidden(
            "Token does not have admin access".to_string(),
        ));
    }

    Ok(AuthInfo {
        token_name: entry.name.clone(),
    })
}

/// Extract Bearer token from Authorization header
fn extract_bearer_token(auth_header: &str) -> Result<&str, AppError> {
    const BEARER_PREFIX: &str = "Bearer ";

    if !auth_header.starts_with(BEARER_PREFIX) {
        return Err(AppError::Unauthorized(
            "Authorization header must use Bearer scheme".to_string(),
        ));
    }

    let token = &auth_header[BEARER_PREFIX.len()..];

    if token.is_empty() {
        return Err(AppError::Unauthorized("Bearer token is empty".to_string()));
    }

    Ok(token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{
        AdminTokenConfig, DatabaseConfig, ExportConfig, RetentionConfig, ServerConfig,
    };

    fn create_test_config() -> Config {
        Config {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
                log_level: "info".to_string(),
                log_format: "json".to_string(),
            },
            database: DatabaseConfig {
                url: "sqlite::memory:".to_string(),
            },
            export: ExportConfig {
                directory: "exports".to_string(),
            },
            retention: RetentionConfig { sweep_hour: 3 },
            admin_tokens: vec![
                AdminTokenConfig {
                    token: "tok-admin".to_string(),
                    name: "ops".to_string(),
                    enabled: true,
                    admin: true,
                },
                AdminTokenConfig {
                    token: "tok-disabled".to_string(),
                    name: "old-ops".to_string(),
                    enabled: false,
                    admin: true,
                },
                AdminTokenConfig {
                    token: "tok-reader".to_string(),
                    name: "reader".to_string(),
                    enabled: true,
                    admin: false,
                },
            ],
        }
    }

    #[test]
    fn test_extract_bearer_token_success() {
        let token = extract_bearer_token("Bearer tok-admin-123").unwrap();
        assert_eq!(token, "tok-admin-123");
    }

    #[test]
    fn test_extract_bearer_token_missing_prefix() {
        assert!(extract_bearer_token("tok-admin-123").is_err());
    }

    #[test]
    fn test_extract_bearer_token_empty() {
        assert!(extract_bearer_token("Bearer ").is_err());
    }

    #[test]
    fn test_authenticate_valid_admin_token() {
        let config = create_test_config();
        let info = authenticate(&config, "Bearer tok-admin").unwrap();
        assert_eq!(info.token_name, "ops");
    }

    #[test]
    fn test_authenticate_unknown_token() {
        let config = create_test_config();
        let err = authenticate(&config, "Bearer tok-nope").unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));
    }

    #[test]
    fn test_authenticate_disabled_token() {
        let config = create_test_config();
        let err = authenticate(&config, "Bearer tok-disabled").unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));
    }

    #[test]
    fn test_authenticate_non_admin_token_is_forbidden() {
        let config = create_test_config();
        let err = authenticate(&config, "Bearer tok-reader").unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }
}
