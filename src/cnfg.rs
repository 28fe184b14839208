use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use dotenv::dotenv;
use once_cell::sync::OnceCell;

#[derive(Debug, PartialEq, Eq, Clone, Copy, Default)]
pub enum AppEnv {
    #[default]
    Development,
    Production,
}

#[derive(Debug, PartialEq, Clone)]
pub struct AppConfig {
    pub env: AppEnv,

    pub port: u16,
    /// Upper bound for a single HTML document, in UTF-8 bytes.
    pub max_html_size: usize,
    pub max_batch_size: usize,
    pub batch_concurrency: usize,
    pub max_body_size: usize,

    pub conversion_timeout: Duration,
    pub browser_timeout: Duration,
    pub chrome_executable: Option<PathBuf>,

    pub header_template: Option<String>,
    pub footer_template: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            env: AppEnv::Development,
            port: 3000,
            max_html_size: 10_000_000,
            max_batch_size: 1000,
            batch_concurrency: 4,
            max_body_size: 64 * 1024 * 1024,
            conversion_timeout: Duration::from_secs(60),
            browser_timeout: Duration::from_secs(30),
            chrome_executable: None,
            header_template: None,
            footer_template: None,
        }
    }
}

static CONFIG: OnceCell<Arc<AppConfig>> = OnceCell::new();

impl AppConfig {
    /// Builds the config from a variable lookup, falling back to defaults for
    /// anything unset or blank.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let mut config = AppConfig::default();

        if let Some(env) = var("APP_ENV") {
            config.env = match env.trim().to_ascii_lowercase().as_str() {
                "development" | "dev" => AppEnv::Development,
                "production" | "prod" => AppEnv::Production,
                other => anyhow::bail!("Invalid APP_ENV value: {other}"),
            };
        }

        if let Some(port) = var("PORT") {
            config.port = parse_number(&port).context("Invalid PORT value")?;
        }
        if let Some(size) = var("MAX_HTML_SIZE") {
            config.max_html_size = parse_number(&size).context("Invalid MAX_HTML_SIZE value")?;
        }
        if let Some(size) = var("MAX_BATCH_SIZE") {
            config.max_batch_size = parse_number(&size).context("Invalid MAX_BATCH_SIZE value")?;
        }
        if let Some(n) = var("BATCH_CONCURRENCY") {
            config.batch_concurrency =
                parse_number(&n).context("Invalid BATCH_CONCURRENCY value")?;
        }
        if let Some(size) = var("MAX_BODY_SIZE") {
            config.max_body_size = parse_number(&size).context("Invalid MAX_BODY_SIZE value")?;
        }
        if let Some(secs) = var("CONVERSION_TIMEOUT") {
            config.conversion_timeout = Duration::from_secs(
                parse_number(&secs).context("Invalid CONVERSION_TIMEOUT value")?,
            );
        }
        if let Some(secs) = var("BROWSER_TIMEOUT") {
            config.browser_timeout =
                Duration::from_secs(parse_number(&secs).context("Invalid BROWSER_TIMEOUT value")?);
        }

        config.chrome_executable = var("CHROME_EXECUTABLE").map(PathBuf::from);
        config.header_template = var("PDF_HEADER_TEMPLATE");
        config.footer_template = var("PDF_FOOTER_TEMPLATE");

        if config.batch_concurrency == 0 {
            anyhow::bail!("BATCH_CONCURRENCY must be at least 1");
        }

        Ok(config)
    }
}

// Accepts `10_000_000` style separators.
fn parse_number<T>(raw: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let cleaned: String = raw.trim().chars().filter(|c| *c != '_').collect();
    Ok(cleaned.parse::<T>()?)
}

fn load_config() -> Result<AppConfig> {
    dotenv().ok();
    AppConfig::from_lookup(|key| std::env::var(key).ok())
}

/// Loads the process configuration on first call and returns the shared copy.
pub fn init() -> Result<Arc<AppConfig>> {
    CONFIG
        .get_or_try_init(|| load_config().map(Arc::new))
        .map(Arc::clone)
}
