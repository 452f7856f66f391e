use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use parley_core::config::{AppConfig, LoadOptions, ProviderSettings};
use parley_core::ProviderKind;
use secrecy::ExposeSecret;
use toml::Value;

use crate::commands::CommandResult;

pub fn run() -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult {
                exit_code: 2,
                output: format!("config validation failed: {error}"),
            };
        }
    };

    let sources = Sources::detect();
    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];

    let providers = &config.providers;
    lines.push(sources.line(
        "providers.request_timeout_secs",
        &providers.request_timeout_secs.to_string(),
        &["PARLEY_PROVIDERS_REQUEST_TIMEOUT_SECS"],
    ));
    lines.push(sources.line(
        "providers.max_tokens",
        &providers.max_tokens.to_string(),
        &["PARLEY_PROVIDERS_MAX_TOKENS"],
    ));
    lines.push(sources.line(
        "providers.temperature",
        &providers.temperature.to_string(),
        &["PARLEY_PROVIDERS_TEMPERATURE"],
    ));
    lines.push(sources.line(
        "providers.rate_limit_default_delay_ms",
        &providers.rate_limit_default_delay_ms.to_string(),
        &["PARLEY_PROVIDERS_RATE_LIMIT_DEFAULT_DELAY_MS"],
    ));
    lines.push(sources.line(
        "providers.rate_limit_max_delay_ms",
        &providers.rate_limit_max_delay_ms.to_string(),
        &["PARLEY_PROVIDERS_RATE_LIMIT_MAX_DELAY_MS"],
    ));

    for kind in ProviderKind::ALL {
        lines.extend(provider_lines(&sources, kind, providers.settings(kind)));
    }

    lines.push(sources.line(
        "supervision.enabled",
        &config.supervision.enabled.to_string(),
        &["PARLEY_SUPERVISION_ENABLED"],
    ));
    lines.push(sources.line(
        "supervision.timeout_ms",
        &config.supervision.timeout_ms.to_string(),
        &["PARLEY_SUPERVISION_TIMEOUT_MS"],
    ));

    lines.push(sources.line(
        "sessions.capacity",
        &config.sessions.capacity.to_string(),
        &["PARLEY_SESSIONS_CAPACITY"],
    ));
    lines.push(sources.line(
        "sessions.eviction",
        &format!("{:?}", config.sessions.eviction),
        &["PARLEY_SESSIONS_EVICTION"],
    ));

    lines.push(sources.line(
        "assistant.default_language",
        config.assistant.default_language.code(),
        &["PARLEY_ASSISTANT_DEFAULT_LANGUAGE", "PARLEY_DEFAULT_LANGUAGE"],
    ));

    lines.push(sources.line(
        "logging.level",
        &config.logging.level,
        &["PARLEY_LOGGING_LEVEL", "PARLEY_LOG_LEVEL"],
    ));
    lines.push(sources.line(
        "logging.format",
        &format!("{:?}", config.logging.format),
        &["PARLEY_LOGGING_FORMAT", "PARLEY_LOG_FORMAT"],
    ));

    CommandResult { exit_code: 0, output: lines.join("\n") }
}

fn provider_lines(
    sources: &Sources,
    kind: ProviderKind,
    settings: &ProviderSettings,
) -> Vec<String> {
    let prefix = format!("providers.{}", kind.name());
    let api_key = settings
        .api_key
        .as_ref()
        .map(|key| redact_token(key.expose_secret()))
        .unwrap_or_else(|| "<unset>".to_string());
    let api_key_var = kind.api_key_var();
    let base_url_var = kind.env_var("BASE_URL");
    let model_var = kind.env_var("MODEL");
    let stream_var = kind.env_var("STREAM");

    vec![
        sources.line(
            &format!("{prefix}.api_key"),
            &api_key,
            &[api_key_var.as_str(), kind.vendor_api_key_var()],
        ),
        sources.line(&format!("{prefix}.base_url"), &settings.base_url, &[base_url_var.as_str()]),
        sources.line(&format!("{prefix}.model"), &settings.model, &[model_var.as_str()]),
        sources.line(
            &format!("{prefix}.stream"),
            &settings.stream.to_string(),
            &[stream_var.as_str()],
        ),
    ]
}

/// The config file that `AppConfig::load` would pick up, kept as a raw TOML
/// document for attribution.
struct Sources {
    file_path: Option<PathBuf>,
    file_doc: Option<Value>,
}

impl Sources {
    fn detect() -> Self {
        let file_path = detect_config_path();
        let file_doc = load_config_file_doc(file_path.as_deref());
        Self { file_path, file_doc }
    }

    fn line(&self, key_path: &str, value: &str, env_keys: &[&str]) -> String {
        render_line(key_path, value, self.field_source(key_path, env_keys))
    }

    fn field_source(&self, key_path: &str, env_keys: &[&str]) -> String {
        let from_env = env_keys
            .iter()
            .find(|key| env::var(key).is_ok_and(|value| !value.trim().is_empty()));
        if let Some(env_key) = from_env {
            return format!("env ({env_key})");
        }

        if let Some(doc) = &self.file_doc {
            if contains_path(doc, key_path) {
                let file_path = self
                    .file_path
                    .as_ref()
                    .map(|path| path.display().to_string())
                    .unwrap_or_else(|| "config file".to_string());
                return format!("file ({file_path})");
            }
        }

        "default".to_string()
    }
}

fn detect_config_path() -> Option<PathBuf> {
    let root = PathBuf::from("parley.toml");
    if root.exists() {
        return Some(root);
    }

    let nested = PathBuf::from("config/parley.toml");
    if nested.exists() {
        return Some(nested);
    }

    None
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

fn redact_token(token: &str) -> String {
    let trimmed = token.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    if let Some((prefix, _)) = trimmed.split_once('-') {
        return format!("{prefix}-***");
    }

    "<redacted>".to_string()
}
