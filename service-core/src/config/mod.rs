//! Environment-driven configuration helpers shared by gridmesh services.
//!
//! Every service reads its settings from environment variables through
//! [`get_env`]; built-in defaults apply only outside prod, so a prod
//! deployment must spell out every setting.

use std::env;
use std::str::FromStr;

use crate::error::AppError;

/// Runtime environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Dev,
    Prod,
}

impl Environment {
    /// Read `ENVIRONMENT`, defaulting to dev. Loads a local `.env` file
    /// first when one is present.
    pub fn from_env() -> Result<Self, AppError> {
        dotenvy::dotenv().ok();

        let raw = env::var("ENVIRONMENT").unwrap_or_else(|_| "dev".to_string());
        raw.parse()
            .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))
    }

    pub fn is_prod(&self) -> bool {
        *self == Environment::Prod
    }
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "dev" => Ok(Environment::Dev),
            "prod" => Ok(Environment::Prod),
            other => Err(format!("unknown environment '{other}'")),
        }
    }
}

/// Read an environment variable, falling back to `default` outside prod.
pub fn get_env(key: &str, default: Option<&str>, is_prod: bool) -> Result<String, AppError> {
    match env::var(key) {
        Ok(value) if !value.is_empty() => Ok(value),
        _ => match default {
            Some(value) if !is_prod => Ok(value.to_string()),
            _ => Err(AppError::ConfigError(anyhow::anyhow!(
                "missing required environment variable {key}"
            ))),
        },
    }
}

/// [`get_env`] followed by a parse into the target type.
pub fn get_env_parsed<T>(key: &str, default: Option<&str>, is_prod: bool) -> Result<T, AppError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    get_env(key, default, is_prod)?
        .parse()
        .map_err(|e| AppError::ConfigError(anyhow::anyhow!("invalid value for {key}: {e}")))
}
