use std::time::Duration;

use common::{error::AppError, utils::config::AppConfig};
use reqwest::redirect::Policy;
use tracing::{debug, instrument, warn};
use url::Url;

use super::BROWSER_USER_AGENT;

const MAX_REDIRECTS: usize = 10;

/// Accepts only absolute `http`/`https` URLs that carry a host.
pub fn parse_ingestion_url(raw: &str) -> Result<Url, AppError> {
    let url = Url::parse(raw.trim())
        .map_err(|err| AppError::Validation(format!("invalid URL '{raw}': {err}")))?;

    match url.scheme() {
        "http" | "https" => {}
        scheme => {
            warn!(%url, %scheme, "Rejected URL with unsupported scheme");
            return Err(AppError::Validation(format!(
                "unsupported URL scheme '{scheme}'"
            )));
        }
    }

    match url.host_str() {
        Some(host) if !host.is_empty() => Ok(url),
        _ => {
            warn!(%url, "Rejected URL missing host");
            Err(AppError::Validation(
                "URL is missing a host component".to_string(),
            ))
        }
    }
}

/// Probes a URL with a `HEAD` request before any rendering work is spent on it.
#[derive(Debug, Clone)]
pub struct UrlVerifier {
    http: reqwest::Client,
}

impl UrlVerifier {
    pub fn new(timeout: Duration) -> Result<Self, AppError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(BROWSER_USER_AGENT)
            .redirect(Policy::limited(MAX_REDIRECTS))
            .build()?;
        Ok(Self { http })
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, AppError> {
        Self::new(Duration::from_secs(config.verification_timeout_secs))
    }

    #[instrument(skip(self))]
    pub async fn verify(&self, raw: &str) -> Result<Url, AppError> {
        let url = parse_ingestion_url(raw)?;

        let response = self.http.head(url.clone()).send().await.map_err(|err| {
            if err.is_timeout() {
                AppError::Communication(format!("{url} did not answer in time"))
            } else {
                AppError::Communication(format!("{url} is unreachable: {err}"))
            }
        })?;

        let status = response.status();
        debug!(%status, "URL probe answered");
        if status.is_success() || status.is_redirection() {
            Ok(url)
        } else {
            Err(AppError::Communication(format!(
                "{url} answered with HTTP {status}"
            )))
        }
    }
}
