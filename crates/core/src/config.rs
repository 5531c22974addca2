use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub flock: FlockConfig,
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub templates: TemplateConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct FlockConfig {
    pub app_id: String,
    pub app_secret: SecretString,
    pub api_base_url: String,
    pub request_timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    /// Public base URL of this service, used to build the widget link.
    pub endpoint: String,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub database_url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug, Default)]
pub struct TemplateConfig {
    pub dir: Option<PathBuf>,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    Memory,
    Sqlite,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub flock_app_id: Option<String>,
    pub flock_app_secret: Option<String>,
    pub flock_api_base_url: Option<String>,
    pub server_port: Option<u16>,
    pub server_endpoint: Option<String>,
    pub storage_backend: Option<StorageBackend>,
    pub database_url: Option<String>,
    pub templates_dir: Option<PathBuf>,
    pub log_level: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            flock: FlockConfig {
                app_id: String::new(),
                app_secret: String::new().into(),
                api_base_url: "https://api.flock.co/v1".to_string(),
                request_timeout_secs: 10,
            },
            server: ServerConfig {
                bind_address: "0.0.0.0".to_string(),
                port: 8080,
                endpoint: "http://localhost:8080".to_string(),
                graceful_shutdown_secs: 15,
            },
            storage: StorageConfig {
                backend: StorageBackend::Memory,
                database_url: "sqlite://scrapbook.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            templates: TemplateConfig::default(),
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for StorageBackend {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "sqlite" => Ok(Self::Sqlite),
            other => Err(ConfigError::Validation(format!(
                "unsupported storage backend `{other}` (expected memory|sqlite)"
            ))),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("scrapbook.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    /// Absolute URL of the scrap list widget.
    pub fn widget_url(&self) -> String {
        format!("{}/scraps", self.server.endpoint.trim_end_matches('/'))
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(flock) = patch.flock {
            if let Some(app_id) = flock.app_id {
                self.flock.app_id = app_id;
            }
            if let Some(app_secret_value) = flock.app_secret {
                self.flock.app_secret = secret_value(app_secret_value);
            }
            if let Some(api_base_url) = flock.api_base_url {
                self.flock.api_base_url = api_base_url;
            }
            if let Some(request_timeout_secs) = flock.request_timeout_secs {
                self.flock.request_timeout_secs = request_timeout_secs;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(endpoint) = server.endpoint {
                self.server.endpoint = endpoint;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(storage) = patch.storage {
            if let Some(backend) = storage.backend {
                self.storage.backend = backend;
            }
            if let Some(database_url) = storage.database_url {
                self.storage.database_url = database_url;
            }
            if let Some(max_connections) = storage.max_connections {
                self.storage.max_connections = max_connections;
            }
            if let Some(timeout_secs) = storage.timeout_secs {
                self.storage.timeout_secs = timeout_secs;
            }
        }

        if let Some(templates) = patch.templates {
            if let Some(dir) = templates.dir {
                self.templates.dir = Some(dir);
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("SCRAPBOOK_FLOCK_APP_ID") {
            self.flock.app_id = value;
        }
        if let Some(value) = read_env("SCRAPBOOK_FLOCK_APP_SECRET") {
            self.flock.app_secret = secret_value(value);
        }
        if let Some(value) = read_env("SCRAPBOOK_FLOCK_API_BASE_URL") {
            self.flock.api_base_url = value;
        }
        if let Some(value) = read_env("SCRAPBOOK_FLOCK_REQUEST_TIMEOUT_SECS") {
            self.flock.request_timeout_secs =
                parse_u64("SCRAPBOOK_FLOCK_REQUEST_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("SCRAPBOOK_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        let port = ["SCRAPBOOK_SERVER_PORT", "PORT"]
            .into_iter()
            .find_map(|key| read_env(key).map(|value| (key, value)));
        if let Some((key, value)) = port {
            self.server.port = parse_u16(key, &value)?;
        }
        if let Some(value) = read_env("SCRAPBOOK_SERVER_ENDPOINT") {
            self.server.endpoint = value;
        }
        if let Some(value) = read_env("SCRAPBOOK_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("SCRAPBOOK_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        if let Some(value) = read_env("SCRAPBOOK_STORAGE_BACKEND") {
            self.storage.backend = value.parse()?;
        }
        if let Some(value) = read_env("SCRAPBOOK_DATABASE_URL") {
            self.storage.database_url = value;
        }
        if let Some(value) = read_env("SCRAPBOOK_DATABASE_MAX_CONNECTIONS") {
            self.storage.max_connections = parse_u32("SCRAPBOOK_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("SCRAPBOOK_DATABASE_TIMEOUT_SECS") {
            self.storage.timeout_secs = parse_u64("SCRAPBOOK_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("SCRAPBOOK_TEMPLATES_DIR") {
            self.templates.dir = Some(PathBuf::from(value));
        }

        let log_level =
            read_env("SCRAPBOOK_LOGGING_LEVEL").or_else(|| read_env("SCRAPBOOK_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("SCRAPBOOK_LOGGING_FORMAT").or_else(|| read_env("SCRAPBOOK_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(app_id) = overrides.flock_app_id {
            self.flock.app_id = app_id;
        }
        if let Some(app_secret) = overrides.flock_app_secret {
            self.flock.app_secret = secret_value(app_secret);
        }
        if let Some(api_base_url) = overrides.flock_api_base_url {
            self.flock.api_base_url = api_base_url;
        }
        if let Some(port) = overrides.server_port {
            self.server.port = port;
        }
        if let Some(endpoint) = overrides.server_endpoint {
            self.server.endpoint = endpoint;
        }
        if let Some(backend) = overrides.storage_backend {
            self.storage.backend = backend;
        }
        if let Some(database_url) = overrides.database_url {
            self.storage.database_url = database_url;
        }
        if let Some(dir) = overrides.templates_dir {
            self.templates.dir = Some(dir);
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_flock(&self.flock)?;
        validate_server(&self.server)?;
        validate_storage(&self.storage)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("scrapbook.toml"), PathBuf::from("config/scrapbook.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_flock(flock: &FlockConfig) -> Result<(), ConfigError> {
    if flock.app_id.trim().is_empty() {
        return Err(ConfigError::Validation(
            "flock.app_id is required. Find it under https://dev.flock.com/apps > Your App > App Credentials"
                .to_string(),
        ));
    }

    if flock.app_secret.expose_secret().trim().is_empty() {
        return Err(ConfigError::Validation(
            "flock.app_secret is required to verify event tokens. Find it under https://dev.flock.com/apps > Your App > App Credentials"
                .to_string(),
        ));
    }

    if !is_http_url(&flock.api_base_url) {
        return Err(ConfigError::Validation(
            "flock.api_base_url must start with http:// or https://".to_string(),
        ));
    }

    if flock.request_timeout_secs == 0 || flock.request_timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "flock.request_timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    if !is_http_url(&server.endpoint) {
        return Err(ConfigError::Validation(
            "server.endpoint must start with http:// or https:// (it is embedded in widget links)"
                .to_string(),
        ));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_storage(storage: &StorageConfig) -> Result<(), ConfigError> {
    if storage.backend == StorageBackend::Memory {
        return Ok(());
    }

    let url = storage.database_url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "storage.database_url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if storage.max_connections == 0 {
        return Err(ConfigError::Validation(
            "storage.max_connections must be greater than zero".to_string(),
        ));
    }

    if storage.timeout_secs == 0 || storage.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "storage.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn is_http_url(value: &str) -> bool {
    value.starts_with("http://") || value.starts_with("https://")
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    flock: Option<FlockPatch>,
    server: Option<ServerPatch>,
    storage: Option<StoragePatch>,
    templates: Option<TemplatePatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct FlockPatch {
    app_id: Option<String>,
    app_secret: Option<String>,
    api_base_url: Option<String>,
    request_timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    endpoint: Option<String>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct StoragePatch {
    backend: Option<StorageBackend>,
    database_url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct TemplatePatch {
    dir: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
