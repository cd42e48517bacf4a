use ns_core::{Error, Result, DEFAULT_PAGE_SIZE};
use std::time::Duration;
use url::Url;

pub const DEFAULT_BASE_URL: &str = "http://localhost:8080/api/v1/";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

pub const ENV_API_URL: &str = "NS_API_URL";
pub const ENV_TIMEOUT: &str = "NS_TIMEOUT";
pub const ENV_PAGE_SIZE: &str = "NS_PAGE_SIZE";
/// Largest page the articles endpoint serves.
pub const MAX_PAGE_SIZE: u32 = 100;

#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    base_url: Url,
    /// Rows per page of the articles list.
    page_size: u32,
    pub timeout: Duration,
    pub user_agent: String,
}

impl ClientConfig {
    pub fn new(base_url: &str) -> Result<Self> {
        Ok(Self {
            base_url: normalize_base(base_url)?,
            ..Self::default()
        })
    }

    /// Defaults overridden by `NS_API_URL`, `NS_TIMEOUT` (seconds) and
    /// `NS_PAGE_SIZE`.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        if let Ok(url) = std::env::var(ENV_API_URL) {
            config = config.with_url(&url)?;
        }
        if let Ok(secs) = std::env::var(ENV_TIMEOUT) {
            let secs = secs
                .trim()
                .parse::<u64>()
                .map_err(|e| Error::Validation(format!("{}: {}", ENV_TIMEOUT, e)))?;
            config.timeout = Duration::from_secs(secs);
        }
        if let Ok(size) = std::env::var(ENV_PAGE_SIZE) {
            let size = size
                .trim()
                .parse::<u32>()
                .map_err(|e| Error::Validation(format!("{}: {}", ENV_PAGE_SIZE, e)))?;
            config = config.with_page_size(size)?;
        }
        Ok(config)
    }

    pub fn with_url(mut self, url: &str) -> Result<Self> {
        self.base_url = normalize_base(url)?;
        Ok(self)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_page_size(mut self, page_size: u32) -> Result<Self> {
        if !(1..=MAX_PAGE_SIZE).contains(&page_size) {
            return Err(Error::Validation(format!(
                "Page size must be between 1 and {}, got {}",
                MAX_PAGE_SIZE, page_size
            )));
        }
        self.page_size = page_size;
        Ok(self)
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Resolves an API path such as `topics/3` against the base URL.
    pub fn endpoint(&self, path: &str) -> Result<Url> {
        Ok(self.base_url.join(path.trim_start_matches('/'))?)
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: Url::parse(DEFAULT_BASE_URL).expect("default base URL is valid"),
            page_size: DEFAULT_PAGE_SIZE,
            timeout: DEFAULT_TIMEOUT,
            user_agent: format!("ns/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

// Url::join drops the last path segment unless the base ends with a slash.
fn normalize_base(url: &str) -> Result<Url> {
    let mut url = Url::parse(url)?;
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_keeps_api_prefix() {
        let config = ClientConfig::new("http://news.local/api/v1").unwrap();
        assert_eq!(
            config.endpoint("/topics/3").unwrap().as_str(),
            "http://news.local/api/v1/topics/3"
        );
        assert_eq!(
            config.endpoint("sentiment/summary").unwrap().as_str(),
            "http://news.local/api/v1/sentiment/summary"
        );
    }

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.page_size(), 20);
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert_eq!(config.base_url().as_str(), DEFAULT_BASE_URL);
    }

    #[test]
    fn test_page_size_bounds() {
        let config = ClientConfig::default().with_page_size(50).unwrap();
        assert_eq!(config.page_size(), 50);
        assert!(matches!(ClientConfig::default().with_page_size(0), Err(Error::Validation(_))));
        assert!(matches!(
            ClientConfig::default().with_page_size(MAX_PAGE_SIZE + 1),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn test_invalid_url() {
        assert!(matches!(ClientConfig::new("not a url"), Err(Error::InvalidUrl(_))));
    }
}
