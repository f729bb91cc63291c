use thiserror::Error;

pub const URL_VAR: &str = "SUPABASE_URL";
pub const KEY_VAR: &str = "SUPABASE_SERVICE_ROLE_KEY";

const URL_PLACEHOLDER: &str = "YOUR_SUPABASE_URL";
const KEY_PLACEHOLDER: &str = "YOUR_SUPABASE_SERVICE_ROLE_KEY";

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("{0} is not set")]
    Missing(&'static str),

    #[error("{0} is still set to its placeholder value")]
    Placeholder(&'static str),
}

/// Backend credentials
#[derive(Debug, Clone)]
pub struct Config {
    pub supabase_url: String,
    pub service_role_key: String,
}

impl Config {
    /// Read the credentials from the environment, after loading `.env` if present
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let supabase_url = required(&lookup, URL_VAR, URL_PLACEHOLDER)?;
        let service_role_key = required(&lookup, KEY_VAR, KEY_PLACEHOLDER)?;

        Ok(Self {
            supabase_url,
            service_role_key,
        })
    }
}

fn required<F>(lookup: &F, name: &'static str, placeholder: &str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let value = lookup(name)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or(ConfigError::Missing(name))?;

    if value == placeholder {
        return Err(ConfigError::Placeholder(name));
    }
    Ok(value)
}
