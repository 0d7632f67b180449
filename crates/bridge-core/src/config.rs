//! Configuration management
//!
//! 設定は以下の優先順位で読み込まれます:
//! 1. 環境変数
//! 2. llm-bridge.toml 設定ファイル
//! 3. デフォルト値
//!
//! 設定ファイル内では `${VAR_NAME}` 形式で環境変数を展開できます。

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::session::SessionLimits;
use crate::{Error, Result};

/// Default configuration file name, looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "llm-bridge.toml";

/// Main configuration for llm-bridge
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Inbound channel server
    pub server: ServerConfig,

    /// Chat backend connection and process
    pub backend: BackendConfig,

    /// Session registry bounds
    pub sessions: SessionConfig,

    /// Bot credentials and canned replies
    pub bot: BotConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address
    pub host: String,

    /// Listen port
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3978,
        }
    }
}

impl ServerConfig {
    /// `host:port` string suitable for `TcpListener::bind`
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Base URL of the chat backend
    pub base_url: String,

    /// Path of the streaming chat endpoint
    pub chat_path: String,

    /// Path probed by the readiness check. Any HTTP response counts as ready.
    pub health_path: String,

    /// Upper bound for a whole backend request, in seconds
    pub request_timeout_secs: u64,

    /// Upper bound between two chunks of the reply stream, in seconds
    pub stream_idle_timeout_secs: u64,

    /// Readiness probe attempts before giving up
    pub ready_attempts: u32,

    /// Delay between readiness probe attempts, in milliseconds
    pub ready_interval_ms: u64,

    /// Shell command that starts the backend process (None = externally managed)
    pub command: Option<String>,

    /// Working directory for `command`
    pub workdir: Option<String>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8000".to_string(),
            chat_path: "/chat".to_string(),
            health_path: "/".to_string(),
            request_timeout_secs: 120,
            stream_idle_timeout_secs: 60,
            ready_attempts: 30,
            ready_interval_ms: 500,
            command: None,
            workdir: None,
        }
    }
}

impl BackendConfig {
    pub fn chat_url(&self) -> String {
        join_url(&self.base_url, &self.chat_path)
    }

    pub fn health_url(&self) -> String {
        join_url(&self.base_url, &self.health_path)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn stream_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.stream_idle_timeout_secs)
    }

    pub fn ready_interval(&self) -> Duration {
        Duration::from_millis(self.ready_interval_ms)
    }
}

fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Maximum number of tracked users (0 = unlimited)
    pub max_sessions: usize,

    /// Sessions idle longer than this are dropped (0 = never)
    pub idle_timeout_secs: u64,

    /// How often the sweep task runs, in seconds
    pub sweep_interval_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_sessions: 0,
            idle_timeout_secs: 0,
            sweep_interval_secs: 300,
        }
    }
}

impl SessionConfig {
    pub fn limits(&self) -> SessionLimits {
        SessionLimits {
            max_sessions: self.max_sessions,
            idle_timeout: (self.idle_timeout_secs > 0)
                .then(|| Duration::from_secs(self.idle_timeout_secs)),
        }
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    /// MicrosoftAppId
    pub app_id: String,

    /// MicrosoftAppPassword
    #[serde(skip_serializing)]
    pub app_password: String,

    /// MicrosoftAppType
    pub app_type: String,

    /// MicrosoftAppTenantId
    pub tenant_id: String,

    /// Text delivered when the backend fails
    pub apology: String,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            app_id: String::new(),
            app_password: String::new(),
            app_type: String::new(),
            tenant_id: String::new(),
            apology: default_apology(),
        }
    }
}

impl BotConfig {
    /// Whether Bot Framework credentials were supplied
    pub fn has_credentials(&self) -> bool {
        !self.app_id.is_empty()
    }
}

pub fn default_apology() -> String {
    "Sorry, there was an error processing your request.".to_string()
}

impl Config {
    /// 設定ファイルから環境変数を展開する
    ///
    /// `${VAR_NAME}` 形式の文字列を環境変数の値に置換します。
    /// 環境変数が存在しない場合は空文字列になります。
    fn expand_env_vars(value: &str) -> String {
        let mut result = String::new();
        let mut chars = value.chars().peekable();

        while let Some(c) = chars.next() {
            if c == '$' && chars.peek() == Some(&'{') {
                chars.next(); // '{' を消費

                let mut var_name = String::new();
                for c in chars.by_ref() {
                    if c == '}' {
                        break;
                    }
                    var_name.push(c);
                }

                if let Ok(env_value) = std::env::var(&var_name) {
                    result.push_str(&env_value);
                }
            } else {
                result.push(c);
            }
        }

        result
    }

    /// TOML 文字列から設定を読み込む (環境変数による上書きなし)
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let expanded = Self::expand_env_vars(content);
        toml::from_str(&expanded)
            .map_err(|e| Error::Config(format!("Failed to parse TOML: {}", e)))
    }

    /// TOML 設定ファイルから設定を読み込む
    ///
    /// 設定ファイル内の `${VAR_NAME}` は環境変数の値に置換され、
    /// その後、既存の環境変数で上書きされます。
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;

        let mut cfg = Self::from_toml_str(&content)?;
        cfg.apply_env_overrides();
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Result<Self> {
        let mut cfg = Self::default();
        cfg.apply_env_overrides();
        cfg.validate()?;
        Ok(cfg)
    }

    /// 設定を読み込む
    ///
    /// 以下の順序で設定ファイルを探します:
    /// 1. 引数で指定されたパス
    /// 2. `./llm-bridge.toml`
    /// 3. 見つからない場合は環境変数のみ
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::from_toml_file(path);
        }

        if Path::new(DEFAULT_CONFIG_FILE).exists() {
            return Self::from_toml_file(DEFAULT_CONFIG_FILE);
        }

        Self::from_env()
    }

    /// 環境変数で設定を上書きする
    fn apply_env_overrides(&mut self) {
        // Server
        if let Some(host) = env_string("HOST") {
            self.server.host = host;
        }
        // `port` takes precedence over `PORT`, as Bot Framework hosting sets the lowercase one
        if let Some(port) = env_parse("port").or_else(|| env_parse("PORT")) {
            self.server.port = port;
        }

        // Backend
        if let Some(url) = env_string("BACKEND_URL") {
            self.backend.base_url = url;
        }
        if let Some(path) = env_string("BACKEND_CHAT_PATH") {
            self.backend.chat_path = path;
        }
        if let Some(path) = env_string("BACKEND_HEALTH_PATH") {
            self.backend.health_path = path;
        }
        if let Some(secs) = env_parse("BACKEND_TIMEOUT_SECS") {
            self.backend.request_timeout_secs = secs;
        }
        if let Some(secs) = env_parse("BACKEND_STREAM_IDLE_SECS") {
            self.backend.stream_idle_timeout_secs = secs;
        }
        if let Some(attempts) = env_parse("BACKEND_READY_ATTEMPTS") {
            self.backend.ready_attempts = attempts;
        }
        if let Some(ms) = env_parse("BACKEND_READY_INTERVAL_MS") {
            self.backend.ready_interval_ms = ms;
        }
        if let Some(command) = env_string("BACKEND_COMMAND") {
            self.backend.command = Some(command);
        }
        if let Some(dir) = env_string("BACKEND_WORKDIR") {
            self.backend.workdir = Some(dir);
        }

        // Sessions
        if let Some(max) = env_parse("SESSION_MAX") {
            self.sessions.max_sessions = max;
        }
        if let Some(secs) = env_parse("SESSION_IDLE_TIMEOUT_SECS") {
            self.sessions.idle_timeout_secs = secs;
        }
        if let Some(secs) = env_parse("SESSION_SWEEP_INTERVAL_SECS") {
            self.sessions.sweep_interval_secs = secs;
        }

        // Bot credentials
        if let Some(id) = env_string("MicrosoftAppId") {
            self.bot.app_id = id;
        }
        if let Some(password) = env_string("MicrosoftAppPassword") {
            self.bot.app_password = password;
        }
        if let Some(app_type) = env_string("MicrosoftAppType") {
            self.bot.app_type = app_type;
        }
        if let Some(tenant) = env_string("MicrosoftAppTenantId") {
            self.bot.tenant_id = tenant;
        }
        if let Some(apology) = env_string("BOT_APOLOGY") {
            self.bot.apology = apology;
        }
    }

    /// Check values that would otherwise fail late, at the first turn
    pub fn validate(&self) -> Result<()> {
        let url = &self.backend.base_url;
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(Error::Config(format!(
                "backend.base_url must be an http(s) URL, got '{}'",
                url
            )));
        }
        if self.backend.ready_attempts == 0 {
            return Err(Error::Config(
                "backend.ready_attempts must be at least 1".to_string(),
            ));
        }
        if self.bot.apology.trim().is_empty() {
            return Err(Error::Config("bot.apology must not be empty".to_string()));
        }
        Ok(())
    }
}

/// Non-empty environment variable
fn env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    let raw = env_string(name)?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!("Ignoring invalid value for {}: {}", name, raw);
            None
        }
    }
}
