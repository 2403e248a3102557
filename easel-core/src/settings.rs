use crate::error::{CoreError, Result};
use easel_scanner::client::{ClientOptions, DEFAULT_USER_AGENT, HttpClient, RetryPolicy};
use easel_scanner::download::DEFAULT_WORKERS;
use easel_scanner::walker::DEFAULT_MAX_PAGES;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_SITE_URL: &str = "https://artvee.com";
pub const DEFAULT_OUTPUT_DIR: &str = "Artvee Artworks";
pub const DEFAULT_CACHE_DIR: &str = ".easel-cache";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub total: u32,
    pub connect: u32,
    pub read: u32,
    pub backoff_factor_ms: u64,
    pub status_forcelist: Vec<u16>,
}

impl Default for RetrySettings {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            total: policy.total,
            connect: policy.connect,
            read: policy.read,
            backoff_factor_ms: policy.backoff_factor.as_millis() as u64,
            status_forcelist: policy.status_forcelist,
        }
    }
}

impl From<&RetrySettings> for RetryPolicy {
    fn from(settings: &RetrySettings) -> Self {
        RetryPolicy {
            total: settings.total,
            connect: settings.connect,
            read: settings.read,
            backoff_factor: Duration::from_millis(settings.backoff_factor_ms),
            status_forcelist: settings.status_forcelist.clone(),
        }
    }
}

/// Runtime configuration. Every field has a default, so a config file only
/// needs to name what it changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub site_url: String,
    pub output_dir: PathBuf,
    pub cache_dir: PathBuf,
    pub workers: usize,
    pub timeout_secs: u64,
    pub max_pages: u32,
    pub user_agent: String,
    pub session_cookie: Option<String>,
    pub retry: RetrySettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            site_url: DEFAULT_SITE_URL.to_string(),
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            cache_dir: PathBuf::from(DEFAULT_CACHE_DIR),
            workers: DEFAULT_WORKERS,
            timeout_secs: 10,
            max_pages: DEFAULT_MAX_PAGES,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            session_cookie: None,
            retry: RetrySettings::default(),
        }
    }
}

impl Settings {
    /// Load settings from a JSON file, then expand `~` in the paths.
    pub fn from_file(path: &Path) -> Result<Self> {
        let path = expand_path(path);
        debug!("Loading settings from {}", path.display());
        let content = std::fs::read_to_string(&path)?;
        let settings: Settings = serde_json::from_str(&content)?;
        settings.validated()
    }

    /// Reject values that would make a run meaningless and normalize paths.
    pub fn validated(mut self) -> Result<Self> {
        if self.workers == 0 {
            return Err(CoreError::Settings("workers must be at least 1".to_string()));
        }
        if self.timeout_secs == 0 {
            return Err(CoreError::Settings("timeout_secs must be at least 1".to_string()));
        }
        if self.max_pages == 0 {
            return Err(CoreError::Settings("max_pages must be at least 1".to_string()));
        }
        url::Url::parse(&self.site_url)
            .map_err(|e| CoreError::Settings(format!("site_url {}: {}", self.site_url, e)))?;

        self.site_url = self.site_url.trim_end_matches('/').to_string();
        self.output_dir = expand_path(&self.output_dir);
        self.cache_dir = expand_path(&self.cache_dir);
        Ok(self)
    }

    pub fn client_options(&self) -> ClientOptions {
        ClientOptions {
            timeout_secs: self.timeout_secs,
            user_agent: self.user_agent.clone(),
            session_cookie: self.session_cookie.clone(),
            retry: RetryPolicy::from(&self.retry),
        }
    }

    pub fn http_client(&self) -> Result<HttpClient> {
        Ok(HttpClient::with_options(self.client_options())?)
    }
}

pub fn expand_path(path: &Path) -> PathBuf {
    let raw = path.to_string_lossy();
    PathBuf::from(shellexpand::tilde(&raw).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.site_url, "https://artvee.com");
        assert_eq!(settings.output_dir, PathBuf::from("Artvee Artworks"));
        assert_eq!(settings.workers, 5);
        assert_eq!(settings.timeout_secs, 10);

        let options = settings.client_options();
        assert_eq!(options.retry, RetryPolicy::default());
        assert!(options.session_cookie.is_none());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"workers": 8, "site_url": "https://mirror.example/", "retry": {{"total": 1}}}}"#
        )
        .unwrap();

        let settings = Settings::from_file(file.path()).unwrap();
        assert_eq!(settings.workers, 8);
        assert_eq!(settings.site_url, "https://mirror.example");
        assert_eq!(settings.retry.total, 1);
        assert_eq!(settings.retry.connect, 3);
        assert_eq!(settings.retry.status_forcelist, vec![500, 502, 504]);
        assert_eq!(settings.max_pages, DEFAULT_MAX_PAGES);
    }

    #[test]
    fn test_rejects_zero_workers() {
        let settings = Settings {
            workers: 0,
            ..Settings::default()
        };
        assert!(matches!(settings.validated(), Err(CoreError::Settings(_))));
    }

    #[test]
    fn test_rejects_zero_timeout() {
        let settings = Settings {
            timeout_secs: 0,
            ..Settings::default()
        };
        match settings.validated() {
            Err(CoreError::Settings(msg)) => assert!(msg.contains("timeout_secs")),
            other => panic!("expected a settings error, got {:?}", other),
        }
    }

    #[test]
    fn test_rejects_malformed_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "workers = 3").unwrap();
        assert!(matches!(Settings::from_file(file.path()), Err(CoreError::Json(_))));
    }

    #[test]
    fn test_tilde_expansion() {
        if let Ok(home) = std::env::var("HOME") {
            let expected = format!("{}/art", home);
            assert_eq!(expand_path(Path::new("~/art")), PathBuf::from(expected));
        }
        assert_eq!(expand_path(Path::new("plain/dir")), PathBuf::from("plain/dir"));
    }
}
