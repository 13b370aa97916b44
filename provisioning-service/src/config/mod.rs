use serde::Deserialize;
use service_core::config as core_config;
use service_core::error::AppError;
use std::env;

#[derive(Debug, Clone, Deserialize)]
pub struct ProvisioningConfig {
    #[serde(flatten)]
    pub common: core_config::Config,
    pub environment: Environment,
    pub service_name: String,
    pub service_version: String,
    pub log_level: String,
    pub identity: IdentityProviderConfig,
    pub directory: DirectoryStoreConfig,
    pub operator: OperatorConfig,
    pub security: SecurityConfig,
    pub swagger: SwaggerConfig,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Dev,
    Prod,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IdentityProviderConfig {
    pub base_url: String,
    pub api_key: String,
    pub request_timeout_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DirectoryStoreConfig {
    pub base_url: String,
    pub request_timeout_seconds: u64,
}

/// Credentials the service signs in with at startup to establish the
/// operator's ambient session.
#[derive(Debug, Clone, Deserialize)]
pub struct OperatorConfig {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SecurityConfig {
    pub allowed_origins: Vec<String>,
    pub admin_api_key: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SwaggerConfig {
    pub enabled: SwaggerMode,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum SwaggerMode {
    Public,
    Authenticated,
    Disabled,
}

impl ProvisioningConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common_config = core_config::Config::load()?;

        let env_str = env::var("ENVIRONMENT").unwrap_or_else(|_| "dev".to_string());
        let environment: Environment = env_str
            .parse()
            .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?;

        let is_prod = environment == Environment::Prod;

        let config = ProvisioningConfig {
            common: common_config,
            environment,
            service_name: get_env("SERVICE_NAME", Some("provisioning-service"), is_prod)?,
            service_version: get_env("SERVICE_VERSION", Some(env!("CARGO_PKG_VERSION")), is_prod)?,
            log_level: get_env("LOG_LEVEL", Some("info"), is_prod)?,
            identity: IdentityProviderConfig {
                base_url: get_env("IDENTITY_BASE_URL", None, is_prod)?,
                api_key: get_env("IDENTITY_API_KEY", None, is_prod)?,
                request_timeout_seconds: get_env(
                    "IDENTITY_REQUEST_TIMEOUT_SECONDS",
                    Some("10"),
                    is_prod,
                )?
                .parse()
                .map_err(|e: std::num::ParseIntError| {
                    AppError::ConfigError(anyhow::anyhow!(e.to_string()))
                })?,
            },
            directory: DirectoryStoreConfig {
                base_url: get_env("DIRECTORY_BASE_URL", None, is_prod)?,
                request_timeout_seconds: get_env(
                    "DIRECTORY_REQUEST_TIMEOUT_SECONDS",
                    Some("10"),
                    is_prod,
                )?
                .parse()
                .map_err(|e: std::num::ParseIntError| {
                    AppError::ConfigError(anyhow::anyhow!(e.to_string()))
                })?,
            },
            operator: OperatorConfig {
                email: get_env("OPERATOR_EMAIL", None, is_prod)?,
                password: get_env("OPERATOR_PASSWORD", None, is_prod)?,
            },
            security: SecurityConfig {
                allowed_origins: get_env("ALLOWED_ORIGINS", Some("http://localhost:3000"), is_prod)?
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .collect(),
                admin_api_key: get_env("ADMIN_API_KEY", None, true)?,
            },
            swagger: SwaggerConfig {
                enabled: get_env("ENABLE_SWAGGER", Some("public"), is_prod)?
                    .parse()
                    .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?,
            },
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), AppError> {
        if self.common.port == 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "PORT must be greater than 0"
            )));
        }

        if self.identity.request_timeout_seconds == 0
            || self.directory.request_timeout_seconds == 0
        {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "Request timeouts must be positive"
            )));
        }

        if self.environment == Environment::Prod {
            if self.security.allowed_origins.iter().any(|o| o == "*") {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "Wildcard CORS origin not allowed in production"
                )));
            }

            if self.swagger.enabled == SwaggerMode::Public {
                tracing::error!("Swagger is publicly accessible in production - consider using 'authenticated' or 'disabled'");
            }
        }

        Ok(())
    }
}

fn get_env(key: &str, default: Option<&str>, is_prod: bool) -> Result<String, AppError> {
    match env::var(key) {
        Ok(val) => Ok(val),
        Err(_) => {
            if is_prod {
                Err(AppError::ConfigError(anyhow::anyhow!(format!(
                    "{} is required in production but not set",
                    key
                ))))
            } else if let Some(def) = default {
                Ok(def.to_string())
            } else {
                Err(AppError::ConfigError(anyhow::anyhow!(format!(
                    "{} is required but not set",
                    key
                ))))
            }
        }
    }
}

impl std::str::FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dev" => Ok(Environment::Dev),
            "prod" => Ok(Environment::Prod),
            _ => Err(format!("Invalid environment: {}", s)),
        }
    }
}

impl std::str::FromStr for SwaggerMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "public" => Ok(SwaggerMode::Public),
            "authenticated" => Ok(SwaggerMode::Authenticated),
            "disabled" => Ok(SwaggerMode::Disabled),
            _ => Err(format!("Invalid swagger mode: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_environment_from_str() {
        assert_eq!("dev".parse::<Environment>().unwrap(), Environment::Dev);
        assert_eq!("PROD".parse::<Environment>().unwrap(), Environment::Prod);
        assert!("staging".parse::<Environment>().is_err());
    }

    #[test]
    fn test_swagger_mode_from_str() {
        assert_eq!(
            "disabled".parse::<SwaggerMode>().unwrap(),
            SwaggerMode::Disabled
        );
        assert!("sometimes".parse::<SwaggerMode>().is_err());
    }

    #[test]
    #[serial]
    fn test_get_env_default_applies_in_dev() {
        env::remove_var("PROVISIONING_TEST_KEY");
        let val = get_env("PROVISIONING_TEST_KEY", Some("fallback"), false).unwrap();
        assert_eq!(val, "fallback");
    }

    #[test]
    #[serial]
    fn test_get_env_required_in_prod() {
        env::remove_var("PROVISIONING_TEST_KEY");
        assert!(get_env("PROVISIONING_TEST_KEY", Some("fallback"), true).is_err());
    }

    #[test]
    #[serial]
    fn test_get_env_prefers_set_value() {
        env::set_var("PROVISIONING_TEST_KEY", "explicit");
        let val = get_env("PROVISIONING_TEST_KEY", Some("fallback"), true).unwrap();
        env::remove_var("PROVISIONING_TEST_KEY");
        assert_eq!(val, "explicit");
    }
}
