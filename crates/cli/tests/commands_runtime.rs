use std::env;
use std::sync::{Mutex, OnceLock};

use parley_cli::commands::respond::RespondArgs;
use parley_cli::commands::{config, providers, qualify, respond};
use parley_core::{Language, ProviderKind};
use serde_json::Value;

#[test]
fn qualify_reports_signals_and_score() {
    let result = qualify::run("Notre budget est de 1500€, c'est urgent", 1);
    assert_eq!(result.exit_code, 0, "qualify never fails");

    let payload = parse_payload(&result.output);
    assert_eq!(payload["command"], "qualify");
    assert_eq!(payload["status"], "ok");
    assert_eq!(payload["extracted"]["budget"]["label"], "Growth+");
    assert_eq!(payload["extracted"]["email"], Value::Null);
    // 30 budget + 25 timeline + 2 engagement.
    assert_eq!(payload["lead"]["score"], 57);
    assert_eq!(payload["lead"]["status"], "warm");
    assert_eq!(payload["lead"]["breakdown"]["timeline"], 25);
}

#[test]
fn providers_lists_darija_model_second_when_enabled() {
    with_env(&[("PARLEY_ATLAS_CHAT_API_KEY", "hf-test"), ("XAI_API_KEY", "xai-test")], || {
        let result = providers::run(Some(Language::Ary));
        assert_eq!(result.exit_code, 0, "expected provider listing");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "providers");
        assert_eq!(payload["language"], "ary");
        assert_eq!(payload["providers"].as_array().map(Vec::len), Some(5));
        assert_eq!(
            payload["order"],
            serde_json::json!(["grok", "atlas_chat", "openai", "gemini", "anthropic"])
        );
    });
}

#[test]
fn providers_skips_darija_model_for_other_languages() {
    with_env(&[("PARLEY_ATLAS_CHAT_API_KEY", "hf-test")], || {
        let result = providers::run(Some(Language::Fr));
        let payload = parse_payload(&result.output);
        assert_eq!(payload["order"], serde_json::json!(["grok", "openai", "gemini", "anthropic"]));
    });
}

#[test]
fn respond_without_configured_providers_reports_unavailable() {
    with_env(&[], || {
        let result = respond::run(RespondArgs {
            message: "Hello, I need a quote".to_string(),
            language: Some(Language::En),
            ..RespondArgs::default()
        });
        assert_eq!(result.exit_code, 3, "expected total provider failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "respond");
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "service_unavailable");
        assert_eq!(
            payload["message"],
            "Sorry, the service is temporarily unavailable. Please try again later."
        );
        assert_eq!(payload["turn"]["result"]["status"], "failure");
        assert_eq!(payload["turn"]["result"]["errors"].as_array().map(Vec::len), Some(4));
    });
}

#[test]
fn respond_uses_default_language_for_unavailable_message() {
    with_env(&[("PARLEY_SESSIONS_CAPACITY", "4")], || {
        let result = respond::run(RespondArgs {
            message: "Bonjour".to_string(),
            session: Some("cli-session".to_string()),
            ..RespondArgs::default()
        });
        assert_eq!(result.exit_code, 3);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["language"], "fr");
        assert_eq!(payload["turn"]["session_id"], "cli-session");
        assert_eq!(payload["correlation_id"], "cli-session");
        assert!(payload["message"]
            .as_str()
            .is_some_and(|message| message.starts_with("Désolé, le service")));
    });
}

#[test]
fn respond_rejects_blank_message() {
    with_env(&[], || {
        let result =
            respond::run(RespondArgs { message: "  \n ".to_string(), ..RespondArgs::default() });
        assert_eq!(result.exit_code, 4, "expected invalid input code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "invalid_input");
    });
}

#[test]
fn respond_returns_config_failure_for_invalid_env() {
    with_env(&[("PARLEY_SESSIONS_CAPACITY", "0")], || {
        let result =
            respond::run(RespondArgs { message: "Bonjour".to_string(), ..RespondArgs::default() });
        assert_eq!(result.exit_code, 2, "expected config validation failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "respond");
        assert_eq!(payload["error_class"], "config_validation");
    });
}

#[test]
fn config_attributes_sources_and_redacts_keys() {
    with_env(
        &[
            ("PARLEY_OPENAI_API_KEY", "sk-proj-supersecret"),
            ("GEMINI_API_KEY", "AIzaSecretValue"),
            ("PARLEY_LOG_LEVEL", "debug"),
        ],
        || {
            let result = config::run();
            assert_eq!(result.exit_code, 0);

            let output = result.output;
            assert!(!output.contains("supersecret"), "api keys must never be printed");
            assert!(!output.contains("AIzaSecretValue"), "api keys must never be printed");
            assert!(output.contains(
                "- providers.openai.api_key = sk-*** (source: env (PARLEY_OPENAI_API_KEY))"
            ));
            assert!(output.contains(
                "- providers.gemini.api_key = <redacted> (source: env (GEMINI_API_KEY))"
            ));
            assert!(output.contains("- providers.grok.api_key = <unset> (source: default)"));
            assert!(output.contains("- logging.level = debug (source: env (PARLEY_LOG_LEVEL))"));
            assert!(output.contains("- sessions.eviction = InsertionOrder (source: default)"));
        },
    );
}

#[test]
fn config_returns_failure_code_for_invalid_env() {
    with_env(&[("PARLEY_SUPERVISION_TIMEOUT_MS", "soon")], || {
        let result = config::run();
        assert_eq!(result.exit_code, 2);
        assert!(result.output.starts_with("config validation failed:"));
        assert!(result.output.contains("PARLEY_SUPERVISION_TIMEOUT_MS"));
    });
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env mutex should not be poisoned");

    let mut keys: Vec<String> = [
        "PARLEY_PROVIDERS_REQUEST_TIMEOUT_SECS",
        "PARLEY_PROVIDERS_MAX_TOKENS",
        "PARLEY_PROVIDERS_TEMPERATURE",
        "PARLEY_PROVIDERS_RATE_LIMIT_DEFAULT_DELAY_MS",
        "PARLEY_PROVIDERS_RATE_LIMIT_MAX_DELAY_MS",
        "PARLEY_SUPERVISION_ENABLED",
        "PARLEY_SUPERVISION_TIMEOUT_MS",
        "PARLEY_SESSIONS_CAPACITY",
        "PARLEY_SESSIONS_EVICTION",
        "PARLEY_ASSISTANT_DEFAULT_LANGUAGE",
        "PARLEY_DEFAULT_LANGUAGE",
        "PARLEY_LOGGING_LEVEL",
        "PARLEY_LOGGING_FORMAT",
        "PARLEY_LOG_LEVEL",
        "PARLEY_LOG_FORMAT",
    ]
    .iter()
    .map(|key| key.to_string())
    .collect();
    for kind in ProviderKind::ALL {
        keys.push(kind.api_key_var());
        keys.push(kind.vendor_api_key_var().to_string());
        for field in ["BASE_URL", "MODEL", "STREAM"] {
            keys.push(kind.env_var(field));
        }
    }

    let previous_values: Vec<(String, Option<String>)> =
        keys.iter().map(|key| (key.clone(), env::var(key).ok())).collect();

    for key in &keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test_fn();

    for (key, value) in previous_values {
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
    }
}
