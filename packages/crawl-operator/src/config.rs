use anyhow::{Context, Result};
use dotenvy::dotenv;
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Seconds a finished crawl job lingers before its resource is deleted.
pub const DEFAULT_TTL_SECS: i64 = 30;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub kubernetes_api_url: String,
    pub operator: OperatorParams,
}

/// Parameters shared by every reconciliation cycle.
///
/// Loaded once at startup and handed to the reconcilers by value; nothing
/// in here changes while the process runs.
#[derive(Debug, Clone)]
pub struct OperatorParams {
    pub namespace: String,
    /// Progress store address; `{id}` and `{namespace}` are substituted.
    pub redis_url_template: String,
    pub crawler_image: String,
    pub crawler_pull_policy: String,
    pub crawler_cpu: String,
    pub crawler_memory: String,
    pub crawler_storage: String,
    pub redis_image: String,
    pub redis_storage: String,
    pub storage_class: Option<String>,
    pub profile_browser_image: String,
    pub default_ttl_secs: i64,
    pub progress_store_timeout: Duration,
    pub progress_store_connect_attempts: u32,
}

impl Default for OperatorParams {
    fn default() -> Self {
        Self {
            namespace: "crawlers".to_string(),
            redis_url_template:
                "redis://redis-{id}-0.redis-{id}.{namespace}.svc.cluster.local/0".to_string(),
            crawler_image: "webrecorder/browsertrix-crawler:latest".to_string(),
            crawler_pull_policy: "IfNotPresent".to_string(),
            crawler_cpu: "800m".to_string(),
            crawler_memory: "1Gi".to_string(),
            crawler_storage: "22Gi".to_string(),
            redis_image: "redis".to_string(),
            redis_storage: "3Gi".to_string(),
            storage_class: None,
            profile_browser_image: "webrecorder/browsertrix-crawler:latest".to_string(),
            default_ttl_secs: DEFAULT_TTL_SECS,
            progress_store_timeout: Duration::from_millis(2000),
            progress_store_connect_attempts: 3,
        }
    }
}

impl OperatorParams {
    /// Load operator parameters from the environment, falling back to defaults.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        Ok(Self {
            namespace: env_or("CRAWLER_NAMESPACE", defaults.namespace),
            redis_url_template: env_or("REDIS_URL_TEMPLATE", defaults.redis_url_template),
            crawler_image: env_or("CRAWLER_IMAGE", defaults.crawler_image),
            crawler_pull_policy: env_or("CRAWLER_PULL_POLICY", defaults.crawler_pull_policy),
            crawler_cpu: env_or("CRAWLER_CPU", defaults.crawler_cpu),
            crawler_memory: env_or("CRAWLER_MEMORY", defaults.crawler_memory),
            crawler_storage: env_or("CRAWLER_STORAGE", defaults.crawler_storage),
            redis_image: env_or("REDIS_IMAGE", defaults.redis_image),
            redis_storage: env_or("REDIS_STORAGE", defaults.redis_storage),
            storage_class: env::var("STORAGE_CLASS").ok().filter(|s| !s.is_empty()),
            profile_browser_image: env_or(
                "PROFILE_BROWSER_IMAGE",
                defaults.profile_browser_image,
            ),
            default_ttl_secs: parse_env("DEFAULT_TTL_SECS", defaults.default_ttl_secs)
                .context("DEFAULT_TTL_SECS must be a number of seconds")?,
            progress_store_timeout: Duration::from_millis(
                parse_env("PROGRESS_STORE_TIMEOUT_MS", 2000u64)
                    .context("PROGRESS_STORE_TIMEOUT_MS must be a number of milliseconds")?,
            ),
            progress_store_connect_attempts: parse_env(
                "PROGRESS_STORE_CONNECT_ATTEMPTS",
                defaults.progress_store_connect_attempts,
            )
            .context("PROGRESS_STORE_CONNECT_ATTEMPTS must be a positive number")?
            .max(1),
        })
    }

    /// Address of the progress store that belongs to one crawl job.
    pub fn redis_url(&self, crawl_id: &str) -> String {
        self.redis_url_template
            .replace("{id}", crawl_id)
            .replace("{namespace}", &self.namespace)
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        Ok(Self {
            database_url: env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .context("PORT must be a valid number")?,
            kubernetes_api_url: env_or(
                "KUBERNETES_API_URL",
                "https://kubernetes.default.svc".to_string(),
            ),
            operator: OperatorParams::from_env()?,
        })
    }
}

fn env_or(name: &str, default: String) -> String {
    env::var(name).ok().filter(|v| !v.is_empty()).unwrap_or(default)
}

fn parse_env<T: FromStr>(name: &str, default: T) -> Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(value) if !value.is_empty() => Ok(value.parse()?),
        _ => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redis_url_substitutes_id_and_namespace() {
        let params = OperatorParams {
            namespace: "crawls".to_string(),
            ..Default::default()
        };
        assert_eq!(
            params.redis_url("abc"),
            "redis://redis-abc-0.redis-abc.crawls.svc.cluster.local/0"
        );
    }

    #[test]
    fn defaults_fail_fast() {
        let params = OperatorParams::default();
        assert_eq!(params.default_ttl_secs, DEFAULT_TTL_SECS);
        assert!(params.progress_store_timeout <= Duration::from_secs(5));
        assert!(params.progress_store_connect_attempts >= 1);
    }
}
