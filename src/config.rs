use anyhow::{Context, Result};
use std::env;
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://www.stoloto.ru";
const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36";

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub scraper: ScraperConfig,
    pub llm: LlmConfig,
}

#[derive(Debug, Clone)]
pub struct ScraperConfig {
    pub sitemap_main_url: String,
    pub sitemap_archive_url: String,
    pub user_agent: String,
    pub request_timeout: Duration,
    /// Sleep enforced before every page fetch.
    pub request_delay: Duration,
    pub max_lottery_pages: usize,
    pub max_archive_pages: usize,
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            sitemap_main_url: sitemap_url(DEFAULT_BASE_URL, "sitemap_main.xml"),
            sitemap_archive_url: sitemap_url(DEFAULT_BASE_URL, "sitemap_archive.xml"),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            request_timeout: Duration::from_secs(30),
            request_delay: Duration::from_secs(1),
            max_lottery_pages: 20,
            max_archive_pages: 10,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub host: String,
    pub model: String,
    pub timeout: Duration,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            host: "http://localhost:11434".to_string(),
            model: "llama3.2".to_string(),
            timeout: Duration::from_secs(60),
        }
    }
}

fn sitemap_url(base_url: &str, file: &str) -> String {
    format!("{}/{}", base_url.trim_end_matches('/'), file)
}

pub fn load() -> Result<Config> {
    dotenvy::dotenv().ok();

    let database_url = env::var("STOLOTO_DB_PATH").unwrap_or_else(|_| "data/stoloto.db".to_string());

    let base_url = env::var("STOLOTO_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());

    let scraper = ScraperConfig {
        sitemap_main_url: env::var("STOLOTO_SITEMAP_MAIN")
            .unwrap_or_else(|_| sitemap_url(&base_url, "sitemap_main.xml")),
        sitemap_archive_url: env::var("STOLOTO_SITEMAP_ARCHIVE")
            .unwrap_or_else(|_| sitemap_url(&base_url, "sitemap_archive.xml")),
        user_agent: env::var("STOLOTO_USER_AGENT").unwrap_or_else(|_| DEFAULT_USER_AGENT.to_string()),
        request_timeout: Duration::from_secs(parse_var("STOLOTO_REQUEST_TIMEOUT_SECS", 30)?),
        request_delay: Duration::from_millis(parse_var("STOLOTO_REQUEST_DELAY_MS", 1000)?),
        max_lottery_pages: parse_var("STOLOTO_MAX_LOTTERY_PAGES", 20)?,
        max_archive_pages: parse_var("STOLOTO_MAX_ARCHIVE_PAGES", 10)?,
    };

    let llm = LlmConfig {
        host: env::var("OLLAMA_HOST").unwrap_or_else(|_| "http://localhost:11434".to_string()),
        model: env::var("OLLAMA_MODEL").unwrap_or_else(|_| "llama3.2".to_string()),
        timeout: Duration::from_secs(parse_var("OLLAMA_TIMEOUT_SECS", 60)?),
    };

    Ok(Config {
        database_url,
        scraper,
        llm,
    })
}

/// Parses `key` from the environment, falling back to `default` when unset.
pub fn parse_var<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("invalid value for {}: {:?}", key, raw)),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_var_default_when_unset() {
        let value: u64 = parse_var("STOLOTO_TEST_SURELY_UNSET_VAR", 42).unwrap();
        assert_eq!(value, 42);
    }

    #[test]
    fn test_sitemap_url_from_base() {
        assert_eq!(
            sitemap_url("https://mirror.test/", "sitemap_archive.xml"),
            "https://mirror.test/sitemap_archive.xml"
        );
        assert_eq!(
            sitemap_url("https://mirror.test", "sitemap_main.xml"),
            "https://mirror.test/sitemap_main.xml"
        );
    }

    #[test]
    fn test_scraper_defaults() {
        let config = ScraperConfig::default();
        assert_eq!(config.sitemap_main_url, "https://www.stoloto.ru/sitemap_main.xml");
        assert_eq!(config.request_delay, Duration::from_secs(1));
        assert_eq!(config.max_lottery_pages, 20);
    }
}
