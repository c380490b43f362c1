//! Connection Factory
//!
//! Derives the durable store's connection target from plain settings. It
//! never opens a session and never fails: missing or unusable settings are
//! logged and reported as `None`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use tracing::{error, info};

use lprgate_core::ConnectionTarget;

/// Example passwords shipped in `.env` templates
const PLACEHOLDER_PASSWORDS: &[&str] = &["senha_aqui", "sua_senha_aqui", "changeme", "change_me"];

const ACCEPTED_SCHEMES: &[&str] = &["postgres://", "postgresql://"];

/// Durable store connection settings
///
/// Either `url` or the discrete fields are used; a non-empty `url` wins.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DurableSettings {
    /// Full connection URL (`DATABASE_URL`)
    pub url: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub database: Option<String>,
    pub user: Option<String>,
    #[serde(skip_serializing)]
    pub password: Option<String>,
}

impl fmt::Debug for DurableSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DurableSettings")
            .field("url", &self.url.as_ref().map(|u| ConnectionTarget::new(u.as_str()).redacted()))
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .finish()
    }
}

impl DurableSettings {
    /// True when nothing at all is configured
    pub fn is_empty(&self) -> bool {
        non_empty(&self.url).is_none()
            && non_empty(&self.host).is_none()
            && self.port.is_none()
            && non_empty(&self.database).is_none()
            && non_empty(&self.user).is_none()
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

pub fn is_placeholder_password(password: &str) -> bool {
    let normalized = password.trim().to_lowercase();
    PLACEHOLDER_PASSWORDS.contains(&normalized.as_str())
}

/// Percent-encode everything outside the RFC 3986 unreserved set
pub fn percent_encode(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for byte in raw.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => {
                out.push(byte as char)
            }
            other => out.push_str(&format!("%{:02X}", other)),
        }
    }
    out
}

/// Builds durable connection targets from [`DurableSettings`]
///
/// The placeholder-password warning is emitted at most once per factory, no
/// matter how often the monitor asks for a target.
#[derive(Debug, Default)]
pub struct ConnectionFactory {
    settings: DurableSettings,
    placeholder_warned: AtomicBool,
    placeholder_warnings: AtomicU32,
}

impl ConnectionFactory {
    pub fn new(settings: DurableSettings) -> Self {
        Self {
            settings,
            placeholder_warned: AtomicBool::new(false),
            placeholder_warnings: AtomicU32::new(0),
        }
    }

    pub fn settings(&self) -> &DurableSettings {
        &self.settings
    }

    /// Number of placeholder-password warnings emitted so far (0 or 1)
    pub fn placeholder_warnings(&self) -> u32 {
        self.placeholder_warnings.load(Ordering::Relaxed)
    }

    /// Derive a connection target, or `None` if the durable store is unavailable
    pub fn target(&self) -> Option<ConnectionTarget> {
        if let Some(url) = non_empty(&self.settings.url) {
            let lowered = url.to_lowercase();
            if ACCEPTED_SCHEMES.iter().any(|scheme| lowered.starts_with(scheme)) {
                return Some(ConnectionTarget::new(url));
            }
            error!("DATABASE_URL is set but is not a PostgreSQL URL; ignoring it");
            return None;
        }

        let host = non_empty(&self.settings.host)?;
        let port = self.settings.port?;
        let database = non_empty(&self.settings.database)?;
        let user = non_empty(&self.settings.user)?;
        let password = self.settings.password.as_deref().filter(|p| !p.is_empty());

        if let Some(password) = password
            && is_placeholder_password(password)
        {
            self.warn_placeholder();
            return None;
        }

        let userinfo = match password {
            Some(password) => format!("{}:{}", percent_encode(user), percent_encode(password)),
            None => percent_encode(user),
        };

        Some(ConnectionTarget::new(format!(
            "postgresql://{}@{}:{}/{}",
            userinfo,
            host,
            port,
            percent_encode(database)
        )))
    }

    fn warn_placeholder(&self) {
        if !self.placeholder_warned.swap(true, Ordering::AcqRel) {
            self.placeholder_warnings.fetch_add(1, Ordering::Relaxed);
            info!(
                "POSTGRES_PASSWORD still holds an example value; set the real password to connect to PostgreSQL"
            );
        }
    }
}
