use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result, bail};

use studio_api::simulation::SimulationConfig;

/// Placeholder JWT secrets that MUST NOT be used outside development.
const PLACEHOLDER_SECRETS: &[&str] = &["change-me-to-a-random-string", "dev-secret-change-me"];

/// Origins the bundled frontend is served from during development.
const DEV_ORIGINS: &[&str] = &["http://localhost:3000", "http://127.0.0.1:3000"];

#[derive(Debug)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub uploads_dir: PathBuf,
    pub jwt_secret: String,
    pub allowed_origins: Vec<String>,
    pub simulation: SimulationConfig,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the config from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let jwt_secret = lookup("STUDIO_JWT_SECRET").unwrap_or_default();
        if jwt_secret.is_empty() || PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
            bail!("STUDIO_JWT_SECRET is unset or still a placeholder");
        }

        let mut allowed_origins: Vec<String> = DEV_ORIGINS.iter().map(|o| o.to_string()).collect();
        if let Some(frontend) = lookup("STUDIO_FRONTEND_URL").filter(|v| !v.is_empty()) {
            allowed_origins.push(frontend);
        }

        let failure_rate: f64 = parse_or(&lookup, "STUDIO_FAILURE_RATE", 0.2)?;
        let latency_min: u64 = parse_or(&lookup, "STUDIO_LATENCY_MIN_MS", 1000)?;
        let latency_max: u64 = parse_or(&lookup, "STUDIO_LATENCY_MAX_MS", 2000)?;
        let simulation = SimulationConfig::new(
            failure_rate,
            Duration::from_millis(latency_min)..Duration::from_millis(latency_max),
        )?;

        Ok(Self {
            host: lookup("STUDIO_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port: parse_or(&lookup, "STUDIO_PORT", 3001)?,
            db_path: lookup("STUDIO_DB_PATH")
                .unwrap_or_else(|| "data/studio.db".into())
                .into(),
            uploads_dir: lookup("STUDIO_UPLOADS_DIR")
                .unwrap_or_else(|| "./uploads".into())
                .into(),
            jwt_secret,
            allowed_origins,
            simulation,
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("invalid value for {}: '{}'", key, raw)),
        None => Ok(default),
    }
}
