//! Messaging relay client
//!
//! The relay is a separately-run HTTP service that owns the messaging
//! session. It exposes:
//! - `GET  <base>/api/status` → `{"status": "connected" | ...}`
//! - `POST <base>/api/send` (multipart: `recipients`, `message`, optional `file`)
//!   → `{"status": "success"}` on delivery

use reqwest::multipart::{Form, Part};
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::path::Path;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

/// Relay errors
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Message is empty")]
    EmptyMessage,

    #[error("No recipients configured")]
    NoRecipients,

    #[error("Relay not connected; open {url} to connect")]
    NotConnected { url: String },

    #[error("Relay returned HTTP {status}: {body}")]
    Relay { status: u16, body: String },

    #[error("Relay did not confirm delivery")]
    Rejected,

    #[error("Invalid relay configuration: {0}")]
    Config(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, NotifyError>;

/// Relay client configuration
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Full URL of the send endpoint, ending in `/api/send`
    pub endpoint: String,

    /// Comma-separated recipient list
    pub recipients: String,

    /// Timeout of a send request
    pub send_timeout: Duration,

    /// Timeout of a status request
    pub status_timeout: Duration,
}

impl RelayConfig {
    pub fn new(endpoint: impl Into<String>, recipients: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            recipients: recipients.into(),
            send_timeout: Duration::from_secs(45),
            status_timeout: Duration::from_secs(5),
        }
    }

    /// Relay listening on the local host at `port`
    pub fn local(host: &str, port: u16, recipients: impl Into<String>) -> Self {
        Self::new(format!("http://{}:{}/api/send", host, port), recipients)
    }

    pub fn with_send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = timeout;
        self
    }

    pub fn with_status_timeout(mut self, timeout: Duration) -> Self {
        self.status_timeout = timeout;
        self
    }
}

/// Split a comma-separated recipient list, dropping blanks
pub fn parse_recipients(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .map(str::to_string)
        .collect()
}

pub struct RelayNotifier {
    client: Client,
    config: RelayConfig,
    base_url: String,
}

impl RelayNotifier {
    pub fn new(config: RelayConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .user_agent(format!("lprgate/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| NotifyError::Config(format!("Failed to create HTTP client: {}", e)))?;

        let base_url = config
            .endpoint
            .strip_suffix("/api/send")
            .unwrap_or(&config.endpoint)
            .to_string();

        Ok(Self {
            client,
            config,
            base_url,
        })
    }

    /// URL an operator opens to connect the relay session
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn recipients(&self) -> Vec<String> {
        parse_recipients(&self.config.recipients)
    }

    pub fn has_recipients(&self) -> bool {
        !self.recipients().is_empty()
    }

    /// "N recipient(s)" or "none", for startup logs
    pub fn recipients_summary(&self) -> String {
        match self.recipients().len() {
            0 => "none".to_string(),
            n => format!("{} recipient(s)", n),
        }
    }

    /// `true` iff the relay answers HTTP 200 with `{"status": "connected"}`
    pub async fn is_connected(&self) -> bool {
        let url = format!("{}/api/status", self.base_url);
        let response = match self
            .client
            .get(&url)
            .timeout(self.config.status_timeout)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                error!("Failed to query relay status: {}", e);
                return false;
            }
        };

        if response.status() != StatusCode::OK {
            warn!("Relay status endpoint returned HTTP {}", response.status());
            return false;
        }

        match response.json::<Value>().await {
            Ok(body) => body.get("status").and_then(Value::as_str) == Some("connected"),
            Err(e) => {
                error!("Failed to parse relay status: {}", e);
                false
            }
        }
    }

    /// Send `message` to every configured recipient
    ///
    /// The image is attached when `image` points to an existing file. A send
    /// that times out with an image attached is retried once without it.
    ///
    /// # Errors
    /// - `NotifyError::EmptyMessage` / `NotifyError::NoRecipients` before any I/O
    /// - `NotifyError::NotConnected` if the relay has no session
    /// - `NotifyError::Relay`, `NotifyError::Rejected`, `NotifyError::Http` on send failure
    pub async fn send(&self, message: &str, image: Option<&Path>) -> Result<()> {
        if message.trim().is_empty() {
            return Err(NotifyError::EmptyMessage);
        }
        if !self.has_recipients() {
            return Err(NotifyError::NoRecipients);
        }
        if !self.is_connected().await {
            return Err(NotifyError::NotConnected {
                url: self.base_url.clone(),
            });
        }

        let image = match image {
            Some(path) if tokio::fs::try_exists(path).await.unwrap_or(false) => Some(path),
            _ => None,
        };

        match self.post(message, image).await {
            Err(NotifyError::Http(e)) if e.is_timeout() && image.is_some() => {
                warn!("Relay send timed out; retrying without the image");
                self.post(message, None).await
            }
            Err(NotifyError::Http(e)) if e.is_timeout() => {
                warn!("Relay send timed out");
                Err(NotifyError::Http(e))
            }
            other => other,
        }
    }

    async fn post(&self, message: &str, image: Option<&Path>) -> Result<()> {
        let mut form = Form::new()
            .text("recipients", self.config.recipients.clone())
            .text("message", message.to_string());

        if let Some(path) = image {
            let bytes = tokio::fs::read(path).await?;
            let file_name = path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| "capture.jpg".to_string());
            let part = Part::bytes(bytes).file_name(file_name).mime_str("image/jpeg")?;
            form = form.part("file", part);
        }

        let response = self
            .client
            .post(&self.config.endpoint)
            .multipart(form)
            .timeout(self.config.send_timeout)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        let body: Option<Value> = serde_json::from_str(&text).ok();

        if status == StatusCode::OK {
            let delivered = body
                .as_ref()
                .and_then(|b| b.get("status"))
                .and_then(Value::as_str)
                == Some("success");
            return if delivered {
                debug!("Relay accepted message");
                Ok(())
            } else {
                Err(NotifyError::Rejected)
            };
        }

        let preview: String = text.trim().chars().take(500).collect();
        error!("Relay send failed: HTTP {} | body={}", status.as_u16(), preview);
        if let Some(body) = body.as_ref() {
            log_error_details(body);
        }

        Err(NotifyError::Relay {
            status: status.as_u16(),
            body: preview,
        })
    }

    /// Warn periodically while the relay has no session
    ///
    /// The first check happens 30 s after the call, then every `interval`.
    pub fn spawn_status_watch(self: std::sync::Arc<Self>, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(30)).await;
            let mut last_warning: Option<Instant> = None;

            loop {
                tokio::time::sleep(interval).await;
                if self.is_connected().await {
                    continue;
                }
                let due = last_warning.is_none_or(|at| at.elapsed() >= interval);
                if due {
                    warn!("Relay not connected; open {} to connect", self.base_url);
                    last_warning = Some(Instant::now());
                }
            }
        })
    }
}

fn log_error_details(body: &Value) {
    if let Some(detail) = body
        .get("message")
        .or_else(|| body.get("erro"))
        .and_then(Value::as_str)
    {
        error!("Relay error detail: {}", detail);
    }
    if let Some(failures) = body.get("erros").and_then(Value::as_array) {
        for failure in failures {
            error!("Recipient not found: {}", failure);
        }
    }
}
