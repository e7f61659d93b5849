//! Configuration types for the chat application.
//!
//! This module provides CLI argument parsing via `arrrg`, an optional YAML configuration
//! file, and the validated [`GenerationConfig`] that the session sends with every request.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use arrrg_derive::CommandLine;
use serde::{Deserialize, Serialize};

use crate::backend::BackendKind;
use crate::error::{Error, Result};

/// Default inference server address.
pub const DEFAULT_BASE_URL: &str = "http://localhost:9000";

/// Default served model name.
pub const DEFAULT_MODEL: &str = "Medical_Qwen3_8B_Large_Language_Model";

/// Environment variable consulted when no API key is configured.
pub const API_KEY_ENV: &str = "VLLM_API_KEY";

/// Default directory for saved chats.
pub const DEFAULT_HISTORY_DIR: &str = "chat_history";

/// Default maximum tokens per response.
const DEFAULT_MAX_TOKENS: u32 = 512;

/// Default sampling temperature.
const DEFAULT_TEMPERATURE: f32 = 0.7;

/// Default nucleus sampling mass.
const DEFAULT_TOP_P: f32 = 0.95;

/// Default request timeout.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Command-line arguments for the vllm-chat tool.
#[derive(CommandLine, Debug, Default, PartialEq, Eq)]
pub struct ChatArgs {
    /// Base URL of the inference server.
    #[arrrg(optional, "Server base URL (default: http://localhost:9000)", "URL")]
    pub base_url: Option<String>,

    /// API key sent as a bearer token.
    #[arrrg(optional, "API key (default: $VLLM_API_KEY)", "KEY")]
    pub api_key: Option<String>,

    /// Served model name.
    #[arrrg(optional, "Served model name", "MODEL")]
    pub model: Option<String>,

    /// Backend kind.
    #[arrrg(optional, "Backend: buffered or streaming (default: streaming)", "KIND")]
    pub backend: Option<String>,

    /// Maximum tokens per response.
    #[arrrg(optional, "Max tokens per response (default: 512)", "TOKENS")]
    pub max_tokens: Option<u32>,

    /// Sampling temperature, validated on conversion.
    #[arrrg(optional, "Sampling temperature 0-2 (default: 0.7)", "TEMP")]
    pub temperature: Option<String>,

    /// Top-p, validated on conversion.
    #[arrrg(optional, "Top-p sampling in (0, 1] (default: 0.95)", "P")]
    pub top_p: Option<String>,

    /// Start with streaming output disabled.
    #[arrrg(flag, "Start with streaming output disabled")]
    pub no_stream: bool,

    /// Directory for saved chats.
    #[arrrg(optional, "Directory for saved chats (default: chat_history)", "DIR")]
    pub history_dir: Option<String>,

    /// YAML configuration file.
    #[arrrg(optional, "YAML configuration file", "FILE")]
    pub config: Option<String>,

    /// Request timeout in seconds.
    #[arrrg(optional, "Request timeout in seconds (default: 120)", "SECONDS")]
    pub timeout: Option<u64>,

    /// Disable ANSI colors and styles.
    #[arrrg(flag, "Disable ANSI colors/styles")]
    pub no_color: bool,
}

/// The keys accepted by `/config <key> <value>`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ConfigKey {
    /// `max_tokens`
    MaxTokens,
    /// `temperature`
    Temperature,
    /// `top_p`
    TopP,
    /// `stream`
    Stream,
    /// `backend`, displayed but fixed for the session.
    Backend,
}

impl ConfigKey {
    /// All keys, in display order.
    pub const ALL: [ConfigKey; 5] = [
        ConfigKey::MaxTokens,
        ConfigKey::Temperature,
        ConfigKey::TopP,
        ConfigKey::Stream,
        ConfigKey::Backend,
    ];

    /// The key as typed by users.
    pub fn as_str(self) -> &'static str {
        match self {
            ConfigKey::MaxTokens => "max_tokens",
            ConfigKey::Temperature => "temperature",
            ConfigKey::TopP => "top_p",
            ConfigKey::Stream => "stream",
            ConfigKey::Backend => "backend",
        }
    }
}

impl fmt::Display for ConfigKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConfigKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        ConfigKey::ALL
            .into_iter()
            .find(|key| key.as_str() == s)
            .ok_or_else(|| Error::unknown_key(s))
    }
}

/// Generation parameters sent with every request.
///
/// Fields are only reachable through validated setters; a rejected value leaves the
/// configuration untouched.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GenerationConfig {
    max_tokens: u32,
    temperature: f32,
    top_p: f32,
    stream: bool,
    backend: BackendKind,
}

impl GenerationConfig {
    /// Creates a configuration with default values.
    ///
    /// Defaults:
    /// - Max tokens: 512
    /// - Temperature: 0.7
    /// - Top-p: 0.95
    /// - Streaming: enabled
    /// - Backend: streaming
    pub fn new() -> Self {
        Self {
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: DEFAULT_TEMPERATURE,
            top_p: DEFAULT_TOP_P,
            stream: true,
            backend: BackendKind::Streaming,
        }
    }

    /// Sets the backend kind.  The kind describes the client handle, so it is only set
    /// while wiring a session together.
    pub fn with_backend(mut self, backend: BackendKind) -> Self {
        self.backend = backend;
        self
    }

    /// Maximum tokens per response.
    pub fn max_tokens(&self) -> u32 {
        self.max_tokens
    }

    /// Sampling temperature.
    pub fn temperature(&self) -> f32 {
        self.temperature
    }

    /// Nucleus sampling mass.
    pub fn top_p(&self) -> f32 {
        self.top_p
    }

    /// Whether streaming output is requested.
    pub fn stream(&self) -> bool {
        self.stream
    }

    /// The backend kind of the session.
    pub fn backend(&self) -> BackendKind {
        self.backend
    }

    /// Sets the maximum tokens per response; must be positive.
    pub fn set_max_tokens(&mut self, max_tokens: u32) -> Result<()> {
        if max_tokens == 0 {
            return Err(Error::type_coercion(
                ConfigKey::MaxTokens.as_str(),
                "0",
                "expects a positive integer",
            ));
        }
        self.max_tokens = max_tokens;
        Ok(())
    }

    /// Sets the sampling temperature; must lie in `[0, 2]`.
    pub fn set_temperature(&mut self, temperature: f32) -> Result<()> {
        if !(temperature.is_finite() && (0.0..=2.0).contains(&temperature)) {
            return Err(Error::type_coercion(
                ConfigKey::Temperature.as_str(),
                temperature.to_string(),
                "expects a value between 0 and 2",
            ));
        }
        self.temperature = temperature;
        Ok(())
    }

    /// Sets top-p; must lie in `(0, 1]`.
    pub fn set_top_p(&mut self, top_p: f32) -> Result<()> {
        if !(top_p.is_finite() && top_p > 0.0 && top_p <= 1.0) {
            return Err(Error::type_coercion(
                ConfigKey::TopP.as_str(),
                top_p.to_string(),
                "expects a value greater than 0 and at most 1",
            ));
        }
        self.top_p = top_p;
        Ok(())
    }

    /// Enables or disables streaming output.
    pub fn set_stream(&mut self, stream: bool) {
        self.stream = stream;
    }

    /// Flips streaming output and returns the new value.
    pub fn toggle_stream(&mut self) -> bool {
        self.stream = !self.stream;
        self.stream
    }

    /// Parses `value` for `key` and applies it.
    ///
    /// # Errors
    ///
    /// `UnknownKey` for keys that do not exist, `TypeCoercion` for values that do not
    /// parse or are out of range, and `Validation` for the read-only `backend` key.  The
    /// configuration is unchanged on error.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let key = key.parse::<ConfigKey>()?;
        let value = value.trim();
        match key {
            ConfigKey::MaxTokens => {
                let parsed = value.parse::<u32>().map_err(|_| {
                    Error::type_coercion(key.as_str(), value, "expects a positive integer")
                })?;
                self.set_max_tokens(parsed)
            }
            ConfigKey::Temperature => {
                let parsed = parse_f32(key, value)?;
                self.set_temperature(parsed).map_err(|_| {
                    Error::type_coercion(key.as_str(), value, "expects a value between 0 and 2")
                })
            }
            ConfigKey::TopP => {
                let parsed = parse_f32(key, value)?;
                self.set_top_p(parsed).map_err(|_| {
                    Error::type_coercion(
                        key.as_str(),
                        value,
                        "expects a value greater than 0 and at most 1",
                    )
                })
            }
            ConfigKey::Stream => {
                let parsed = parse_on_off(value).ok_or_else(|| {
                    Error::type_coercion(key.as_str(), value, "expects true/false, on/off, yes/no or 1/0")
                })?;
                self.set_stream(parsed);
                Ok(())
            }
            ConfigKey::Backend => Err(Error::validation(
                "the backend is fixed for the lifetime of the session",
                Some(key.as_str().to_string()),
            )),
        }
    }

    /// Renders the current value of `key`.
    pub fn get(&self, key: ConfigKey) -> String {
        match key {
            ConfigKey::MaxTokens => self.max_tokens.to_string(),
            ConfigKey::Temperature => self.temperature.to_string(),
            ConfigKey::TopP => self.top_p.to_string(),
            ConfigKey::Stream => self.stream.to_string(),
            ConfigKey::Backend => self.backend.to_string(),
        }
    }

    /// All keys with their rendered values, in display order.
    pub fn entries(&self) -> Vec<(ConfigKey, String)> {
        ConfigKey::ALL
            .into_iter()
            .map(|key| (key, self.get(key)))
            .collect()
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Contents of the optional YAML configuration file.
///
/// Every field is optional; command-line flags override file values, which override
/// defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChatConfigFile {
    /// Base URL of the inference server.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// API key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Served model name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Backend kind.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend: Option<BackendKind>,
    /// Maximum tokens per response.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// Sampling temperature.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    /// Top-p.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    /// Whether to start with streaming output.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,
    /// Directory for saved chats.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub history_dir: Option<PathBuf>,
    /// Request timeout in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

impl ChatConfigFile {
    /// Reads a configuration file from disk.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|err| {
            Error::io(format!("failed to read config file {}", path.display()), err)
        })?;
        serde_yaml::from_str(&content).map_err(|err| {
            Error::serialization(
                format!("failed to parse config file {}", path.display()),
                Some(Box::new(err)),
            )
        })
    }
}

/// Configuration for a chat session.
///
/// This struct holds the resolved configuration values after processing the
/// configuration file and command-line arguments with appropriate defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatConfig {
    /// Base URL of the inference server, without the `/v1` suffix.
    pub base_url: String,

    /// API key; `None` falls back to the environment.
    pub api_key: Option<String>,

    /// Served model name.
    pub model: String,

    /// Generation parameters.
    pub generation: GenerationConfig,

    /// Directory holding saved chats.
    pub history_dir: PathBuf,

    /// Timeout for connecting and for buffered requests.
    pub timeout: Duration,

    /// Whether to use ANSI colors and styles in output.
    pub use_color: bool,
}

impl ChatConfig {
    /// Creates a new ChatConfig with default values.
    pub fn new() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            generation: GenerationConfig::new(),
            history_dir: PathBuf::from(DEFAULT_HISTORY_DIR),
            timeout: DEFAULT_TIMEOUT,
            use_color: true,
        }
    }

    /// Sets the base URL.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Sets the API key.
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Sets the model.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Sets the generation parameters.
    pub fn with_generation(mut self, generation: GenerationConfig) -> Self {
        self.generation = generation;
        self
    }

    /// Sets the history directory.
    pub fn with_history_dir(mut self, history_dir: impl Into<PathBuf>) -> Self {
        self.history_dir = history_dir.into();
        self
    }

    /// Sets the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Disables ANSI color output.
    pub fn without_color(mut self) -> Self {
        self.use_color = false;
        self
    }

    /// Applies the values present in a configuration file.
    pub fn apply_file(mut self, file: ChatConfigFile) -> Result<Self> {
        if let Some(base_url) = file.base_url {
            self.base_url = base_url;
        }
        if let Some(api_key) = file.api_key {
            self.api_key = Some(api_key);
        }
        if let Some(model) = file.model {
            self.model = model;
        }
        let mut generation = self.generation;
        if let Some(backend) = file.backend {
            generation = generation.with_backend(backend);
        }
        if let Some(max_tokens) = file.max_tokens {
            generation.set_max_tokens(max_tokens)?;
        }
        if let Some(temperature) = file.temperature {
            generation.set_temperature(temperature)?;
        }
        if let Some(top_p) = file.top_p {
            generation.set_top_p(top_p)?;
        }
        if let Some(stream) = file.stream {
            generation.set_stream(stream);
        }
        self.generation = generation;
        if let Some(history_dir) = file.history_dir {
            self.history_dir = history_dir;
        }
        if let Some(timeout_secs) = file.timeout_secs {
            self.timeout = Duration::from_secs(timeout_secs);
        }
        Ok(self)
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl TryFrom<ChatArgs> for ChatConfig {
    type Error = Error;

    fn try_from(args: ChatArgs) -> Result<Self> {
        let mut config = ChatConfig::new();
        if let Some(path) = &args.config {
            config = config.apply_file(ChatConfigFile::from_file(path)?)?;
        }
        if let Some(base_url) = args.base_url {
            config = config.with_base_url(base_url);
        }
        if let Some(api_key) = args.api_key {
            config = config.with_api_key(api_key);
        }
        if let Some(model) = args.model {
            config = config.with_model(model);
        }
        let mut generation = config.generation;
        if let Some(backend) = args.backend {
            generation = generation.with_backend(backend.parse()?);
        }
        if let Some(max_tokens) = args.max_tokens {
            generation.set_max_tokens(max_tokens)?;
        }
        if let Some(temperature) = args.temperature {
            generation.set(ConfigKey::Temperature.as_str(), &temperature)?;
        }
        if let Some(top_p) = args.top_p {
            generation.set(ConfigKey::TopP.as_str(), &top_p)?;
        }
        if args.no_stream {
            generation.set_stream(false);
        }
        config = config.with_generation(generation);
        if let Some(history_dir) = args.history_dir {
            config = config.with_history_dir(history_dir);
        }
        if let Some(timeout) = args.timeout {
            config = config.with_timeout(Duration::from_secs(timeout));
        }
        if args.no_color {
            config = config.without_color();
        }
        Ok(config)
    }
}

fn parse_f32(key: ConfigKey, value: &str) -> Result<f32> {
    value
        .parse::<f32>()
        .map_err(|_| Error::type_coercion(key.as_str(), value, "expects a number"))
}

fn parse_on_off(value: &str) -> Option<bool> {
    match value.to_lowercase().as_str() {
        "on" | "true" | "yes" | "1" => Some(true),
        "off" | "false" | "no" | "0" => Some(false),
        _ => None,
    }
}
