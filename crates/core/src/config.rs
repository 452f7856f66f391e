use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::language::Language;
use crate::session::EvictionPolicy;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub providers: ProvidersConfig,
    pub supervision: SupervisionConfig,
    pub sessions: SessionsConfig,
    pub assistant: AssistantConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct ProvidersConfig {
    pub request_timeout_secs: u64,
    pub max_tokens: u32,
    pub temperature: f32,
    /// Delay used on a 429 that carries no usable `Retry-After`.
    pub rate_limit_default_delay_ms: u64,
    pub rate_limit_max_delay_ms: u64,
    pub grok: ProviderSettings,
    pub openai: ProviderSettings,
    pub atlas_chat: ProviderSettings,
    pub gemini: ProviderSettings,
    pub anthropic: ProviderSettings,
}

#[derive(Clone, Debug)]
pub struct ProviderSettings {
    pub api_key: Option<SecretString>,
    pub base_url: String,
    pub model: String,
    pub stream: bool,
}

#[derive(Clone, Debug)]
pub struct SupervisionConfig {
    pub enabled: bool,
    pub timeout_ms: u64,
}

#[derive(Clone, Debug)]
pub struct SessionsConfig {
    pub capacity: usize,
    pub eviction: EvictionPolicy,
}

#[derive(Clone, Debug)]
pub struct AssistantConfig {
    pub default_language: Language,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

/// The text-generation backends the orchestrator knows how to call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    Grok,
    OpenAi,
    AtlasChat,
    Gemini,
    Anthropic,
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
    pub log_level: Option<String>,
    pub log_format: Option<LogFormat>,
    pub default_language: Option<Language>,
    pub supervision_enabled: Option<bool>,
    pub supervision_timeout_ms: Option<u64>,
    pub session_capacity: Option<usize>,
    pub session_eviction: Option<EvictionPolicy>,
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

impl ProviderKind {
    pub const ALL: [ProviderKind; 5] = [
        ProviderKind::Grok,
        ProviderKind::OpenAi,
        ProviderKind::AtlasChat,
        ProviderKind::Gemini,
        ProviderKind::Anthropic,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Grok => "grok",
            Self::OpenAi => "openai",
            Self::AtlasChat => "atlas_chat",
            Self::Gemini => "gemini",
            Self::Anthropic => "anthropic",
        }
    }

    /// Key used for this provider's settings table and `PARLEY_<KEY>_*` variables.
    fn env_key(self) -> &'static str {
        match self {
            Self::Grok => "GROK",
            Self::OpenAi => "OPENAI",
            Self::AtlasChat => "ATLAS_CHAT",
            Self::Gemini => "GEMINI",
            Self::Anthropic => "ANTHROPIC",
        }
    }

    /// Vendor-conventional variable consulted when `PARLEY_<KEY>_API_KEY` is unset.
    pub fn vendor_api_key_var(self) -> &'static str {
        match self {
            Self::Grok => "XAI_API_KEY",
            Self::OpenAi => "OPENAI_API_KEY",
            Self::AtlasChat => "HUGGINGFACE_API_KEY",
            Self::Gemini => "GEMINI_API_KEY",
            Self::Anthropic => "ANTHROPIC_API_KEY",
        }
    }

    pub fn api_key_var(self) -> String {
        self.env_var("API_KEY")
    }

    /// `PARLEY_<KEY>_<FIELD>` override variable for one provider setting.
    pub fn env_var(self, field: &str) -> String {
        format!("PARLEY_{}_{field}", self.env_key())
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for ProviderKind {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "grok" | "xai" => Ok(Self::Grok),
            "openai" => Ok(Self::OpenAi),
            "atlas_chat" | "atlaschat" | "atlas-chat" => Ok(Self::AtlasChat),
            "gemini" => Ok(Self::Gemini),
            "anthropic" | "claude" => Ok(Self::Anthropic),
            other => Err(ConfigError::Validation(format!(
                "unsupported provider `{other}` (expected grok|openai|atlas_chat|gemini|anthropic)"
            ))),
        }
    }
}

impl ProviderSettings {
    fn new(base_url: &str, model: &str) -> Self {
        Self {
            api_key: None,
            base_url: base_url.to_string(),
            model: model.to_string(),
            stream: false,
        }
    }

    /// A provider takes part in orchestration only when it has a non-blank key.
    pub fn is_enabled(&self) -> bool {
        self.api_key.as_ref().is_some_and(|key| !key.expose_secret().trim().is_empty())
    }
}

impl ProvidersConfig {
    pub fn settings(&self, kind: ProviderKind) -> &ProviderSettings {
        match kind {
            ProviderKind::Grok => &self.grok,
            ProviderKind::OpenAi => &self.openai,
            ProviderKind::AtlasChat => &self.atlas_chat,
            ProviderKind::Gemini => &self.gemini,
            ProviderKind::Anthropic => &self.anthropic,
        }
    }

    fn settings_mut(&mut self, kind: ProviderKind) -> &mut ProviderSettings {
        match kind {
            ProviderKind::Grok => &mut self.grok,
            ProviderKind::OpenAi => &mut self.openai,
            ProviderKind::AtlasChat => &mut self.atlas_chat,
            ProviderKind::Gemini => &mut self.gemini,
            ProviderKind::Anthropic => &mut self.anthropic,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            providers: ProvidersConfig {
                request_timeout_secs: 30,
                max_tokens: 500,
                temperature: 0.7,
                rate_limit_default_delay_ms: 2_000,
                rate_limit_max_delay_ms: 30_000,
                grok: ProviderSettings::new("https://api.x.ai/v1", "grok-4-1-fast-reasoning"),
                openai: ProviderSettings::new("https://api.openai.com/v1", "gpt-4o-mini"),
                atlas_chat: ProviderSettings::new(
                    "https://router.huggingface.co/featherless-ai/v1",
                    "MBZUAI-Paris/Atlas-Chat-9B",
                ),
                gemini: ProviderSettings::new(
                    "https://generativelanguage.googleapis.com/v1beta",
                    "gemini-3-flash-preview",
                ),
                anthropic: ProviderSettings::new(
                    "https://api.anthropic.com/v1",
                    "claude-opus-4-5-20251101",
                ),
            },
            supervision: SupervisionConfig { enabled: true, timeout_ms: 1_500 },
            sessions: SessionsConfig { capacity: 5_000, eviction: EvictionPolicy::InsertionOrder },
            assistant: AssistantConfig { default_language: Language::Fr },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
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
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("parley.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(providers) = patch.providers {
            if let Some(request_timeout_secs) = providers.request_timeout_secs {
                self.providers.request_timeout_secs = request_timeout_secs;
            }
            if let Some(max_tokens) = providers.max_tokens {
                self.providers.max_tokens = max_tokens;
            }
            if let Some(temperature) = providers.temperature {
                self.providers.temperature = temperature;
            }
            if let Some(delay) = providers.rate_limit_default_delay_ms {
                self.providers.rate_limit_default_delay_ms = delay;
            }
            if let Some(delay) = providers.rate_limit_max_delay_ms {
                self.providers.rate_limit_max_delay_ms = delay;
            }

            let blocks = [
                (ProviderKind::Grok, providers.grok),
                (ProviderKind::OpenAi, providers.openai),
                (ProviderKind::AtlasChat, providers.atlas_chat),
                (ProviderKind::Gemini, providers.gemini),
                (ProviderKind::Anthropic, providers.anthropic),
            ];
            for (kind, block) in blocks {
                if let Some(block) = block {
                    apply_provider_patch(self.providers.settings_mut(kind), block);
                }
            }
        }

        if let Some(supervision) = patch.supervision {
            if let Some(enabled) = supervision.enabled {
                self.supervision.enabled = enabled;
            }
            if let Some(timeout_ms) = supervision.timeout_ms {
                self.supervision.timeout_ms = timeout_ms;
            }
        }

        if let Some(sessions) = patch.sessions {
            if let Some(capacity) = sessions.capacity {
                self.sessions.capacity = capacity;
            }
            if let Some(eviction) = sessions.eviction {
                self.sessions.eviction = eviction;
            }
        }

        if let Some(assistant) = patch.assistant {
            if let Some(default_language) = assistant.default_language {
                self.assistant.default_language = default_language;
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
        if let Some(value) = read_env("PARLEY_PROVIDERS_REQUEST_TIMEOUT_SECS") {
            self.providers.request_timeout_secs =
                parse_env("PARLEY_PROVIDERS_REQUEST_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("PARLEY_PROVIDERS_MAX_TOKENS") {
            self.providers.max_tokens = parse_env("PARLEY_PROVIDERS_MAX_TOKENS", &value)?;
        }
        if let Some(value) = read_env("PARLEY_PROVIDERS_TEMPERATURE") {
            self.providers.temperature = parse_env("PARLEY_PROVIDERS_TEMPERATURE", &value)?;
        }
        if let Some(value) = read_env("PARLEY_PROVIDERS_RATE_LIMIT_DEFAULT_DELAY_MS") {
            self.providers.rate_limit_default_delay_ms =
                parse_env("PARLEY_PROVIDERS_RATE_LIMIT_DEFAULT_DELAY_MS", &value)?;
        }
        if let Some(value) = read_env("PARLEY_PROVIDERS_RATE_LIMIT_MAX_DELAY_MS") {
            self.providers.rate_limit_max_delay_ms =
                parse_env("PARLEY_PROVIDERS_RATE_LIMIT_MAX_DELAY_MS", &value)?;
        }

        for kind in ProviderKind::ALL {
            let settings = self.providers.settings_mut(kind);

            let api_key =
                read_env(&kind.api_key_var()).or_else(|| read_env(kind.vendor_api_key_var()));
            if let Some(value) = api_key {
                settings.api_key = Some(secret_value(value));
            }
            if let Some(value) = read_env(&kind.env_var("BASE_URL")) {
                settings.base_url = value;
            }
            if let Some(value) = read_env(&kind.env_var("MODEL")) {
                settings.model = value;
            }
            let stream_key = kind.env_var("STREAM");
            if let Some(value) = read_env(&stream_key) {
                settings.stream = parse_env(&stream_key, &value)?;
            }
        }

        if let Some(value) = read_env("PARLEY_SUPERVISION_ENABLED") {
            self.supervision.enabled = parse_env("PARLEY_SUPERVISION_ENABLED", &value)?;
        }
        if let Some(value) = read_env("PARLEY_SUPERVISION_TIMEOUT_MS") {
            self.supervision.timeout_ms = parse_env("PARLEY_SUPERVISION_TIMEOUT_MS", &value)?;
        }

        if let Some(value) = read_env("PARLEY_SESSIONS_CAPACITY") {
            self.sessions.capacity = parse_env("PARLEY_SESSIONS_CAPACITY", &value)?;
        }
        if let Some(value) = read_env("PARLEY_SESSIONS_EVICTION") {
            self.sessions.eviction = value.parse().map_err(|_| ConfigError::InvalidEnvOverride {
                key: "PARLEY_SESSIONS_EVICTION".to_string(),
                value: value.clone(),
            })?;
        }

        let language = read_env("PARLEY_ASSISTANT_DEFAULT_LANGUAGE")
            .or_else(|| read_env("PARLEY_DEFAULT_LANGUAGE"));
        if let Some(value) = language {
            self.assistant.default_language =
                value.parse().map_err(|_| ConfigError::InvalidEnvOverride {
                    key: "PARLEY_ASSISTANT_DEFAULT_LANGUAGE".to_string(),
                    value: value.clone(),
                })?;
        }

        let log_level = read_env("PARLEY_LOGGING_LEVEL").or_else(|| read_env("PARLEY_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("PARLEY_LOGGING_FORMAT").or_else(|| read_env("PARLEY_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(log_format) = overrides.log_format {
            self.logging.format = log_format;
        }
        if let Some(default_language) = overrides.default_language {
            self.assistant.default_language = default_language;
        }
        if let Some(enabled) = overrides.supervision_enabled {
            self.supervision.enabled = enabled;
        }
        if let Some(timeout_ms) = overrides.supervision_timeout_ms {
            self.supervision.timeout_ms = timeout_ms;
        }
        if let Some(capacity) = overrides.session_capacity {
            self.sessions.capacity = capacity;
        }
        if let Some(eviction) = overrides.session_eviction {
            self.sessions.eviction = eviction;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_providers(&self.providers)?;
        validate_supervision(&self.supervision)?;
        validate_sessions(&self.sessions)?;
        validate_logging(&self.logging)?;
        Ok(())
    }

    /// Providers with a configured key, in declaration order.
    pub fn enabled_providers(&self) -> Vec<ProviderKind> {
        ProviderKind::ALL
            .into_iter()
            .filter(|kind| self.providers.settings(*kind).is_enabled())
            .collect()
    }
}

fn apply_provider_patch(settings: &mut ProviderSettings, patch: ProviderPatch) {
    if let Some(api_key_value) = patch.api_key {
        settings.api_key = Some(secret_value(api_key_value));
    }
    if let Some(base_url) = patch.base_url {
        settings.base_url = base_url;
    }
    if let Some(model) = patch.model {
        settings.model = model;
    }
    if let Some(stream) = patch.stream {
        settings.stream = stream;
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("parley.toml"), PathBuf::from("config/parley.toml")]
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

fn validate_providers(providers: &ProvidersConfig) -> Result<(), ConfigError> {
    if providers.request_timeout_secs == 0 || providers.request_timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "providers.request_timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    if providers.max_tokens == 0 {
        return Err(ConfigError::Validation(
            "providers.max_tokens must be greater than zero".to_string(),
        ));
    }

    if !(0.0..=2.0).contains(&providers.temperature) {
        return Err(ConfigError::Validation(
            "providers.temperature must be in range 0.0..=2.0".to_string(),
        ));
    }

    if providers.rate_limit_default_delay_ms > providers.rate_limit_max_delay_ms {
        return Err(ConfigError::Validation(
            "providers.rate_limit_default_delay_ms must not exceed providers.rate_limit_max_delay_ms"
                .to_string(),
        ));
    }

    for kind in ProviderKind::ALL {
        let settings = providers.settings(kind);
        let base_url = settings.base_url.trim();
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(ConfigError::Validation(format!(
                "providers.{}.base_url must start with http:// or https://",
                kind.name()
            )));
        }
        if settings.model.trim().is_empty() {
            return Err(ConfigError::Validation(format!(
                "providers.{}.model must not be empty",
                kind.name()
            )));
        }
    }

    Ok(())
}

fn validate_supervision(supervision: &SupervisionConfig) -> Result<(), ConfigError> {
    if supervision.timeout_ms == 0 || supervision.timeout_ms > 60_000 {
        return Err(ConfigError::Validation(
            "supervision.timeout_ms must be in range 1..=60000".to_string(),
        ));
    }
    Ok(())
}

fn validate_sessions(sessions: &SessionsConfig) -> Result<(), ConfigError> {
    if sessions.capacity == 0 {
        return Err(ConfigError::Validation(
            "sessions.capacity must be greater than zero".to_string(),
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

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse::<T>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    providers: Option<ProvidersPatch>,
    supervision: Option<SupervisionPatch>,
    sessions: Option<SessionsPatch>,
    assistant: Option<AssistantPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct ProvidersPatch {
    request_timeout_secs: Option<u64>,
    max_tokens: Option<u32>,
    temperature: Option<f32>,
    rate_limit_default_delay_ms: Option<u64>,
    rate_limit_max_delay_ms: Option<u64>,
    grok: Option<ProviderPatch>,
    openai: Option<ProviderPatch>,
    atlas_chat: Option<ProviderPatch>,
    gemini: Option<ProviderPatch>,
    anthropic: Option<ProviderPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct ProviderPatch {
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    stream: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct SupervisionPatch {
    enabled: Option<bool>,
    timeout_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct SessionsPatch {
    capacity: Option<usize>,
    eviction: Option<EvictionPolicy>,
}

#[derive(Debug, Default, Deserialize)]
struct AssistantPatch {
    default_language: Option<Language>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
