use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use wxcore::endpoints::LoginEndpoints;
use wxcore::retry::RetryCounter;

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub login_host: String,
    pub app_id: String,
    /// Page the backend redirects to once the handshake is confirmed.
    pub redirect_target: String,
    pub lang: String,
    pub retry_bound: u32,
    /// Delay between login and the first long-poll check.
    pub sync_warmup_ms: u64,
    pub request_timeout_secs: u64,
    /// Must exceed the backend's own hold time for check requests (~25s).
    pub long_poll_timeout_secs: u64,
    pub user_agent: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            login_host: "https://login.weixin.qq.com".to_string(),
            app_id: "wx782c26e4c19acffb".to_string(),
            redirect_target: "https://wx.qq.com/cgi-bin/mmwebwx-bin/webwxnewloginpage".to_string(),
            lang: "en_US".to_string(),
            retry_bound: RetryCounter::DEFAULT_BOUND,
            sync_warmup_ms: 500,
            request_timeout_secs: 30,
            long_poll_timeout_secs: 40,
            user_agent: "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36".to_string(),
        }
    }
}

impl ClientConfig {
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        serde_json::from_str(&raw).with_context(|| format!("parsing config file {}", path.display()))
    }

    pub fn login_endpoints(&self) -> LoginEndpoints {
        LoginEndpoints {
            host: self.login_host.trim_end_matches('/').to_string(),
            app_id: self.app_id.clone(),
            redirect_target: self.redirect_target.clone(),
            lang: self.lang.clone(),
        }
    }

    pub fn sync_warmup(&self) -> Duration {
        Duration::from_millis(self.sync_warmup_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn long_poll_timeout(&self) -> Duration {
        Duration::from_secs(self.long_poll_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"retry_bound": 5, "sync_warmup_ms": 0}}"#).unwrap();

        let config = ClientConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.retry_bound, 5);
        assert_eq!(config.sync_warmup(), Duration::ZERO);
        assert_eq!(config.lang, "en_US");
        assert_eq!(config.long_poll_timeout(), Duration::from_secs(40));
    }

    #[test]
    fn bad_file_reports_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        let err = ClientConfig::from_json_file(file.path()).unwrap_err();
        assert!(err.to_string().contains("parsing config file"));
    }

    #[test]
    fn trailing_slash_is_trimmed_from_login_host() {
        let config = ClientConfig {
            login_host: "https://login.example.com/".into(),
            ..Default::default()
        };
        assert_eq!(config.login_endpoints().host, "https://login.example.com");
    }
}
