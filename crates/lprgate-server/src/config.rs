use lprgate_persistence::{DurableSettings, SyncSettings};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File read error
    #[error("Failed to read config: {0}")]
    FileRead(String),

    /// Parse error
    #[error("Failed to parse config: {0}")]
    ParseError(String),

    /// Validation error
    #[error("Invalid config: {0}")]
    ValidationError(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    /// Webhook port; required
    #[serde(default)]
    pub port: Option<u16>,

    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub sync: SyncSettings,

    #[serde(default)]
    pub relay: RelaySettings,

    #[serde(default)]
    pub access: AccessConfig,

    #[serde(default)]
    pub captures: CaptureConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite fallback file
    #[serde(default = "default_local_path")]
    pub local_path: String,

    /// PostgreSQL connection parameters
    #[serde(default)]
    pub postgres: DurableSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelaySettings {
    #[serde(default = "default_relay_host")]
    pub host: String,

    /// Relay port; the relay is disabled without it
    #[serde(default)]
    pub port: Option<u16>,

    /// Comma-separated entry recipients
    #[serde(default)]
    pub recipients: String,

    /// Seconds between "not connected" warnings
    #[serde(default = "default_relay_alert_interval")]
    pub alert_interval_secs: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccessConfig {
    /// IPs or CIDR ranges allowed to read records; empty allows all
    #[serde(default)]
    pub allowed_ips: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureConfig {
    #[serde(default = "default_captures_dir")]
    pub directory: PathBuf,

    #[serde(default = "default_retention_days")]
    pub retention_days: u64,

    #[serde(default = "default_cleanup_interval_hours")]
    pub cleanup_interval_hours: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_false")]
    pub log_sql_queries: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: None,
            database: DatabaseConfig::default(),
            sync: SyncSettings::default(),
            relay: RelaySettings::default(),
            access: AccessConfig::default(),
            captures: CaptureConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            local_path: default_local_path(),
            postgres: DurableSettings::default(),
        }
    }
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            host: default_relay_host(),
            port: None,
            recipients: String::new(),
            alert_interval_secs: default_relay_alert_interval(),
        }
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            directory: default_captures_dir(),
            retention_days: default_retention_days(),
            cleanup_interval_hours: default_cleanup_interval_hours(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            log_sql_queries: false,
        }
    }
}

impl CaptureConfig {
    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_days * 86_400)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_hours.max(1) * 3_600)
    }
}

impl ServerConfig {
    /// Load configuration from a YAML or TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let expanded = shellexpand::tilde(&path.as_ref().to_string_lossy()).to_string();
        let path = PathBuf::from(expanded);

        let contents = std::fs::read_to_string(&path).map_err(|e| {
            ConfigError::FileRead(format!("Failed to read {}: {}", path.display(), e))
        })?;

        if path.extension().and_then(|s| s.to_str()) == Some("toml") {
            toml::from_str(&contents)
                .map_err(|e| ConfigError::ParseError(format!("TOML parse error: {}", e)))
        } else {
            // Default to YAML
            serde_yaml::from_str(&contents)
                .map_err(|e| ConfigError::ParseError(format!("YAML parse error: {}", e)))
        }
    }

    /// Merge process environment variables into config (env vars take precedence)
    pub fn merge_env(&mut self) -> Result<Vec<String>, ConfigError> {
        self.merge_env_from(|key| std::env::var(key).ok())
    }

    /// Merge variables from `lookup` into config
    ///
    /// # Returns
    /// Warnings about ignored values, to be logged once tracing is up
    ///
    /// # Errors
    /// - `ConfigError::ValidationError` when `WEBHOOK_PORT` is set but invalid
    pub fn merge_env_from(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Vec<String>, ConfigError> {
        let mut warnings = Vec::new();
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string());

        // Server settings
        if let Some(val) = var("WEBHOOK_PORT") {
            match parse_port(&val) {
                Some(port) => self.port = Some(port),
                None => {
                    return Err(ConfigError::ValidationError(format!(
                        "invalid port in WEBHOOK_PORT='{}'",
                        val
                    )));
                }
            }
        }
        if let Some(val) = var("WEBHOOK_HOST").filter(|v| !v.is_empty()) {
            self.host = val;
        }

        // PostgreSQL settings
        let postgres = &mut self.database.postgres;
        if let Some(val) = var("DATABASE_URL") {
            postgres.url = Some(val);
        }
        if let Some(val) = var("POSTGRES_HOST") {
            postgres.host = Some(val);
        }
        if let Some(val) = var("POSTGRES_PORT") {
            postgres.port = parse_port(&val);
            if postgres.port.is_none() && !val.is_empty() {
                warnings.push(format!("Invalid port in POSTGRES_PORT='{}'", val));
            }
        }
        if let Some(val) = var("POSTGRES_DB") {
            postgres.database = Some(val);
        }
        if let Some(val) = var("POSTGRES_USER") {
            postgres.user = Some(val);
        }
        if let Some(val) = var("POSTGRES_PASSWORD") {
            postgres.password = Some(val);
        }
        if let Some(val) = var("LOCAL_DB_PATH").filter(|v| !v.is_empty()) {
            self.database.local_path = val;
        }
        if let Some(val) = var("DB_SYNC_INTERVAL_SECONDS") {
            match val.parse::<u64>() {
                Ok(secs) => self.sync.interval_secs = secs,
                Err(_) => {
                    warnings.push(format!(
                        "Invalid DB_SYNC_INTERVAL_SECONDS='{}', using {}s",
                        val,
                        SyncSettings::default().interval_secs
                    ));
                    self.sync.interval_secs = SyncSettings::default().interval_secs;
                }
            }
        }

        // Relay settings
        if let Some(val) = var("API_WHATSAPP_PORT") {
            self.relay.port = parse_port(&val);
            if self.relay.port.is_none() {
                warnings.push(format!("Invalid port in API_WHATSAPP_PORT='{}'", val));
            }
        }
        if let Some(val) = var("WHATSAPP_HOST").filter(|v| !v.is_empty()) {
            self.relay.host = val;
        }
        if let Some(val) = var("DESTINO_ENTRADAS") {
            self.relay.recipients = val;
        }

        // Access settings
        if let Some(val) = var("FRONTEND_ALLOWED_IPS") {
            self.access.allowed_ips = val
                .split(',')
                .map(str::trim)
                .filter(|item| !item.is_empty())
                .map(str::to_string)
                .collect();
        }

        // Capture settings
        if let Some(val) = var("CAPTURES_DIR").filter(|v| !v.is_empty()) {
            self.captures.directory = PathBuf::from(val);
        }
        if let Some(val) = var("CAPTURE_RETENTION_DAYS") {
            match val.parse::<u64>() {
                Ok(days) => self.captures.retention_days = days,
                Err(_) => warnings.push(format!("Invalid CAPTURE_RETENTION_DAYS='{}'", val)),
            }
        }

        // Logging settings
        if let Some(val) = var("LOG_LEVEL").filter(|v| !v.is_empty()) {
            self.logging.level = val;
        }

        Ok(warnings)
    }

    /// Validate the merged configuration
    pub fn validate(&self) -> Result<u16, ConfigError> {
        self.port.filter(|port| *port != 0).ok_or_else(|| {
            ConfigError::ValidationError("WEBHOOK_PORT is not set".to_string())
        })
    }
}

/// Parse a TCP port in 1..=65535
pub fn parse_port(raw: &str) -> Option<u16> {
    raw.trim().parse::<u16>().ok().filter(|port| *port != 0)
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_local_path() -> String {
    "storage/lpr_local.db".to_string()
}

fn default_relay_host() -> String {
    "127.0.0.1".to_string()
}

fn default_relay_alert_interval() -> u64 {
    30
}

fn default_captures_dir() -> PathBuf {
    PathBuf::from("static/captures")
}

fn default_retention_days() -> u64 {
    15
}

fn default_cleanup_interval_hours() -> u64 {
    24
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_false() -> bool {
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.host, "0.0.0.0");
        assert!(config.port.is_none());
        assert_eq!(config.database.local_path, "storage/lpr_local.db");
        assert_eq!(config.captures.retention_days, 15);
        assert_eq!(config.sync.interval(), Duration::from_secs(30));
    }

    #[test]
    fn test_port_is_required() {
        let config = ServerConfig::default();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn test_merge_env_overrides() {
        let mut config = ServerConfig::default();
        let warnings = config
            .merge_env_from(env(&[
                ("WEBHOOK_PORT", "8080"),
                ("POSTGRES_HOST", "db"),
                ("POSTGRES_PORT", "5432"),
                ("POSTGRES_DB", "lpr"),
                ("POSTGRES_USER", "lpr"),
                ("POSTGRES_PASSWORD", "s3cret"),
                ("DB_SYNC_INTERVAL_SECONDS", "5"),
                ("API_WHATSAPP_PORT", "3001"),
                ("DESTINO_ENTRADAS", "5511999990000,Portaria"),
                ("FRONTEND_ALLOWED_IPS", "10.0.0.0/8, 192.168.1.20 ,"),
                ("CAPTURE_RETENTION_DAYS", "7"),
            ]))
            .unwrap();

        assert!(warnings.is_empty());
        assert_eq!(config.validate().unwrap(), 8080);
        assert_eq!(config.database.postgres.host.as_deref(), Some("db"));
        assert_eq!(config.database.postgres.port, Some(5432));
        assert_eq!(config.database.postgres.password.as_deref(), Some("s3cret"));
        // Floor applies
        assert_eq!(config.sync.interval(), Duration::from_secs(10));
        assert_eq!(config.relay.port, Some(3001));
        assert_eq!(config.access.allowed_ips, vec!["10.0.0.0/8", "192.168.1.20"]);
        assert_eq!(config.captures.retention_days, 7);
    }

    #[test]
    fn test_invalid_webhook_port_aborts() {
        for bad in ["0", "70000", "http"] {
            let mut config = ServerConfig::default();
            assert!(
                config
                    .merge_env_from(env(&[("WEBHOOK_PORT", bad)]))
                    .is_err()
            );
        }
    }

    #[test]
    fn test_non_numeric_sync_interval_uses_default() {
        let mut config = ServerConfig::default();
        config.sync.interval_secs = 60;
        let warnings = config
            .merge_env_from(env(&[("DB_SYNC_INTERVAL_SECONDS", "soon")]))
            .unwrap();

        assert_eq!(warnings.len(), 1);
        assert_eq!(config.sync.interval(), Duration::from_secs(30));
    }

    #[test]
    fn test_invalid_relay_port_disables_relay() {
        let mut config = ServerConfig::default();
        config.relay.port = Some(3001);
        let warnings = config
            .merge_env_from(env(&[("API_WHATSAPP_PORT", "abc")]))
            .unwrap();

        assert_eq!(warnings.len(), 1);
        assert!(config.relay.port.is_none());
    }

    #[test]
    fn test_yaml_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("lprgate.yaml");
        std::fs::write(
            &path,
            r#"
port: 9000
database:
  local_path: /var/lib/lprgate/local.db
  postgres:
    url: postgresql://lpr:pw@db:5432/lpr
sync:
  interval_secs: 45
captures:
  directory: /srv/captures
"#,
        )
        .unwrap();

        let config = ServerConfig::from_file(&path).unwrap();
        assert_eq!(config.port, Some(9000));
        assert_eq!(config.database.local_path, "/var/lib/lprgate/local.db");
        assert_eq!(
            config.database.postgres.url.as_deref(),
            Some("postgresql://lpr:pw@db:5432/lpr")
        );
        assert_eq!(config.sync.interval(), Duration::from_secs(45));
        assert_eq!(config.captures.directory, PathBuf::from("/srv/captures"));
        assert_eq!(config.captures.retention_days, 15);
    }

    #[test]
    fn test_toml_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("lprgate.toml");
        std::fs::write(
            &path,
            r#"
port = 9001

[relay]
port = 3001
recipients = "Portaria"

[logging]
level = "debug"
log_sql_queries = true
"#,
        )
        .unwrap();

        let config = ServerConfig::from_file(&path).unwrap();
        assert_eq!(config.port, Some(9001));
        assert_eq!(config.relay.port, Some(3001));
        assert_eq!(config.relay.host, "127.0.0.1");
        assert!(config.logging.log_sql_queries);
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            ServerConfig::from_file("/nonexistent/lprgate.yaml"),
            Err(ConfigError::FileRead(_))
        ));
    }
}
