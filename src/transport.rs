use std::fs::File;
use std::path::Path;
use std::thread;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::KiraError;

/// Byte retrieval used by the pipeline. Timeouts and retries are the
/// implementation's business; the pipeline only sees success or failure.
pub trait Transport: Send + Sync {
    fn download(&self, url: &str, destination: &Path) -> Result<u64, KiraError>;
    fn fetch_json(&self, url: &str) -> Result<Value, KiraError>;
}

#[derive(Debug, Clone, Copy)]
pub struct HttpSettings {
    pub timeout: Duration,
    pub max_retries: usize,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(120),
            max_retries: 3,
        }
    }
}

#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
    max_retries: usize,
}

impl HttpTransport {
    pub fn new(settings: HttpSettings) -> Result<Self, KiraError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("kira-cm/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| KiraError::Http(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(settings.timeout)
            .build()
            .map_err(|err| KiraError::Http(err.to_string()))?;
        Ok(Self {
            client,
            max_retries: settings.max_retries,
        })
    }

    fn handle_status(
        response: reqwest::blocking::Response,
    ) -> Result<reqwest::blocking::Response, KiraError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let url = response.url().to_string();
        let message = response
            .text()
            .ok()
            .map(|body| body.chars().take(200).collect::<String>())
            .filter(|body| !body.trim().is_empty())
            .unwrap_or(url);
        Err(KiraError::HttpStatus { status, message })
    }

    fn send_with_retries<F>(
        &self,
        mut make_req: F,
    ) -> Result<reqwest::blocking::Response, KiraError>
    where
        F: FnMut() -> reqwest::blocking::RequestBuilder,
    {
        const BASE_DELAY_MS: u64 = 200;
        let mut attempt = 0usize;
        loop {
            let response = make_req().send();
            match response {
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    if attempt < self.max_retries && is_retryable_status(status) {
                        let delay = BASE_DELAY_MS * (attempt as u64 + 1);
                        debug!(status, attempt, delay_ms = delay, "retrying request");
                        thread::sleep(Duration::from_millis(delay));
                        attempt += 1;
                        continue;
                    }
                    return Ok(resp);
                }
                Err(err) => {
                    if attempt < self.max_retries && is_retryable_error(&err) {
                        let delay = BASE_DELAY_MS * (attempt as u64 + 1);
                        warn!(error = %err, attempt, "request failed, retrying");
                        thread::sleep(Duration::from_millis(delay));
                        attempt += 1;
                        continue;
                    }
                    return Err(KiraError::Http(err.to_string()));
                }
            }
        }
    }
}

impl Transport for HttpTransport {
    fn download(&self, url: &str, destination: &Path) -> Result<u64, KiraError> {
        let response = self.send_with_retries(|| self.client.get(url))?;
        let mut response = Self::handle_status(response)?;
        let mut file =
            File::create(destination).map_err(|err| KiraError::Filesystem(err.to_string()))?;
        std::io::copy(&mut response, &mut file).map_err(|err| KiraError::Http(err.to_string()))
    }

    fn fetch_json(&self, url: &str) -> Result<Value, KiraError> {
        let response = self.send_with_retries(|| self.client.get(url))?;
        let response = Self::handle_status(response)?;
        response.json().map_err(|err| KiraError::Http(err.to_string()))
    }
}

fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_statuses() {
        assert!(is_retryable_status(429));
        assert!(is_retryable_status(503));
        assert!(!is_retryable_status(404));
        assert!(!is_retryable_status(200));
    }

    #[test]
    fn client_builds_with_defaults() {
        assert!(HttpTransport::new(HttpSettings::default()).is_ok());
    }
}
