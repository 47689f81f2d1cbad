use tracing::info;

use crate::error::{CarpoolError, Result};

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub supabase_url: String,
    pub supabase_anon_key: String,
    /// Serve data from this SQLite database instead of the hosted project.
    pub database_url: Option<String>,
    pub bind_addr: String,
}

impl Config {
    /// Reads `.env` and the process environment.
    pub fn load() -> Result<Self> {
        Self::from_lookup(|key| dotenv::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let required = |key: &str| {
            // front-end style names are accepted too
            var(key)
                .or_else(|| var(&format!("VITE_{key}")))
                .ok_or_else(|| CarpoolError::Config(format!("missing {key}")))
        };

        let config = Self {
            supabase_url: required("SUPABASE_URL")?,
            supabase_anon_key: required("SUPABASE_ANON_KEY")?,
            database_url: var("DATABASE_URL"),
            bind_addr: var("BIND_ADDR").unwrap_or_else(|| {
                info!("BIND_ADDR not set, using default: {DEFAULT_BIND_ADDR}");
                DEFAULT_BIND_ADDR.to_owned()
            }),
        };
        Ok(config)
    }
}
