use parley_agent::llm::ProviderDescriptor;
use parley_agent::AgentRuntime;
use parley_core::config::{AppConfig, LoadOptions};
use parley_core::Language;
use serde::Serialize;

use crate::commands::CommandResult;

const COMMAND: &str = "providers";

#[derive(Debug, Serialize)]
struct ProvidersReport {
    command: &'static str,
    status: &'static str,
    language: Language,
    providers: Vec<ProviderDescriptor>,
    order: Vec<String>,
}

pub fn run(language: Option<Language>) -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(COMMAND, "config_validation", error.to_string(), 2);
        }
    };
    let agent = match AgentRuntime::from_config(&config) {
        Ok(agent) => agent,
        Err(error) => {
            return CommandResult::failure(COMMAND, "config_validation", error.to_string(), 2);
        }
    };

    let language = language.unwrap_or(agent.default_language());
    let orchestrator = agent.orchestrator();
    let providers =
        orchestrator.providers().iter().map(|provider| provider.descriptor().clone()).collect();
    let order = orchestrator
        .provider_order(language)
        .iter()
        .map(|provider| provider.descriptor().name.clone())
        .collect();

    CommandResult::report(
        0,
        &ProvidersReport { command: COMMAND, status: "ok", language, providers, order },
    )
}
