use parley_agent::{AgentRuntime, OrchestrationResult, RespondOptions, TurnOutcome};
use parley_core::config::{AppConfig, LoadOptions};
use parley_core::session::SessionId;
use parley_core::{ApplicationError, Language};
use serde::Serialize;

use crate::commands::CommandResult;

const COMMAND: &str = "respond";

#[derive(Debug, Clone, Default)]
pub struct RespondArgs {
    pub message: String,
    pub language: Option<Language>,
    pub session: Option<String>,
    pub force_fail: Vec<String>,
}

#[derive(Debug, Serialize)]
struct RespondReport<'a> {
    command: &'static str,
    status: &'static str,
    error_class: Option<&'static str>,
    language: Language,
    message: Option<&'a str>,
    correlation_id: Option<&'a str>,
    turn: &'a TurnOutcome,
}

pub fn run(args: RespondArgs) -> CommandResult {
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

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                COMMAND,
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                5,
            );
        }
    };

    let language = args.language.unwrap_or(agent.default_language());
    let session_id = args.session.as_deref().map(SessionId::from);
    let options = RespondOptions::default().force_failing(args.force_fail);

    let turn =
        runtime.block_on(agent.handle_message(session_id, &args.message, Some(language), options));

    let turn = match turn {
        Ok(turn) => turn,
        Err(ApplicationError::Domain(error)) => {
            return CommandResult::failure(COMMAND, "invalid_input", error.to_string(), 4);
        }
        Err(error) => return CommandResult::failure(COMMAND, "internal", error.to_string(), 5),
    };

    match &turn.result {
        OrchestrationResult::Success { text, .. } => CommandResult::report(
            0,
            &RespondReport {
                command: COMMAND,
                status: "ok",
                error_class: None,
                language,
                message: Some(text.as_str()),
                correlation_id: None,
                turn: &turn,
            },
        ),
        OrchestrationResult::Failure { error, .. } => {
            let unavailable = ApplicationError::Integration(error.clone())
                .into_interface(turn.session_id.as_str());
            CommandResult::report(
                3,
                &RespondReport {
                    command: COMMAND,
                    status: "error",
                    error_class: Some("service_unavailable"),
                    language,
                    message: Some(unavailable.localized_message(language)),
                    correlation_id: Some(unavailable.correlation_id()),
                    turn: &turn,
                },
            )
        }
    }
}
