use std::sync::Arc;
use std::time::Duration;

use parley_core::config::AppConfig;
use parley_core::qualification::{LeadStatus, ScoreBreakdown};
use parley_core::session::{Message, SessionId, SessionStore};
use parley_core::{ApplicationError, DomainError, Language};
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::backoff::ThrottlePolicy;
use crate::bus::{EventBus, InMemoryBus};
use crate::guardrails::{GuardrailDecision, GuardrailPolicy};
use crate::orchestrator::{OrchestrationResult, Orchestrator, RespondOptions};
use crate::prompt::{ContextQuery, ContextSource, PromptBuilder};
use crate::providers;
use crate::supervision::Supervisor;
use crate::supervisor;

/// Everything the caller needs after one inbound message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TurnOutcome {
    pub session_id: SessionId,
    pub result: OrchestrationResult,
    pub score: u8,
    pub status: LeadStatus,
    pub breakdown: ScoreBreakdown,
    pub qualification_complete: bool,
    /// Qualification fields first detected in this message.
    pub newly_extracted: Vec<&'static str>,
}

struct InboundTurn {
    history: Vec<Message>,
    contact_email: Option<String>,
    newly_extracted: Vec<&'static str>,
}

pub struct AgentRuntime {
    sessions: Mutex<SessionStore>,
    orchestrator: Orchestrator,
    prompts: PromptBuilder,
    guardrails: GuardrailPolicy,
    default_language: Language,
}

impl AgentRuntime {
    pub fn new(
        orchestrator: Orchestrator,
        sessions: SessionStore,
        prompts: PromptBuilder,
        guardrails: GuardrailPolicy,
        default_language: Language,
    ) -> Self {
        Self {
            sessions: Mutex::new(sessions),
            orchestrator,
            prompts,
            guardrails,
            default_language,
        }
    }

    /// Wires providers, the bus with the built-in reviewer (when supervision
    /// is enabled) and the session store from configuration.
    pub fn from_config(config: &AppConfig) -> Result<Self, ApplicationError> {
        let adapters = providers::build_from_config(config)
            .map_err(|error| ApplicationError::Configuration(error.to_string()))?;

        let supervisor = config.supervision.enabled.then(|| {
            let bus: Arc<dyn EventBus> = Arc::new(InMemoryBus::new());
            supervisor::attach(&bus);
            Supervisor::new(bus, Duration::from_millis(config.supervision.timeout_ms))
        });

        let orchestrator = Orchestrator::new(
            adapters,
            supervisor,
            ThrottlePolicy::from_config(&config.providers),
        );
        let sessions = SessionStore::new(config.sessions.capacity, config.sessions.eviction);

        Ok(Self::new(
            orchestrator,
            sessions,
            PromptBuilder::default(),
            GuardrailPolicy::default(),
            config.assistant.default_language,
        ))
    }

    pub fn with_context_sources(mut self, sources: Vec<Arc<dyn ContextSource>>) -> Self {
        self.prompts = PromptBuilder::new(sources);
        self
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    pub fn default_language(&self) -> Language {
        self.default_language
    }

    /// Runs one conversational turn: sanitize, qualify, generate, record.
    pub async fn handle_message(
        &self,
        session_id: Option<SessionId>,
        message: &str,
        language: Option<Language>,
        options: RespondOptions,
    ) -> Result<TurnOutcome, ApplicationError> {
        let text = match self.guardrails.evaluate(message) {
            GuardrailDecision::Allow { text } => text,
            GuardrailDecision::Degrade { text, reason_codes } => {
                warn!(
                    event_name = "agent.runtime.input_degraded",
                    reason_codes = ?reason_codes,
                    "inbound message altered by guardrails"
                );
                text
            }
            GuardrailDecision::Deny { reason_code } => {
                debug!(event_name = "agent.runtime.input_denied", reason_code, "message rejected");
                return Err(DomainError::EmptyMessage.into());
            }
        };

        let language = language.unwrap_or(self.default_language);
        let session_id = session_id.unwrap_or_else(SessionId::generate);
        let inbound = self.record_inbound(&session_id, &text).await;

        let system_prompt = self
            .prompts
            .build(&ContextQuery {
                message: &text,
                language,
                session_id: session_id.as_str(),
                contact_email: inbound.contact_email.as_deref(),
            })
            .await;

        let options = RespondOptions { session_id: Some(session_id.to_string()), ..options };
        let result = self
            .orchestrator
            .respond(&text, &inbound.history, &system_prompt, language, &options)
            .await;

        let mut sessions = self.sessions.lock().await;
        let (session, evicted) = sessions.get_or_create(session_id.clone());
        if let Some(evicted) = evicted {
            warn!(
                event_name = "agent.sessions.evicted_during_turn",
                session_id = %session_id,
                evicted = %evicted,
                "session was evicted while its reply was generated"
            );
        }
        if let Some(reply) = result.text() {
            session.record_assistant_message(reply);
        }

        info!(
            event_name = "agent.runtime.turn_completed",
            session_id = %session_id,
            success = result.is_success(),
            score = session.score(),
            status = session.status().as_str(),
            "turn completed"
        );

        Ok(TurnOutcome {
            session_id: session.id.clone(),
            score: session.score(),
            status: session.status(),
            breakdown: session.breakdown(),
            qualification_complete: session.qualification_complete(),
            newly_extracted: inbound.newly_extracted,
            result,
        })
    }

    async fn record_inbound(&self, session_id: &SessionId, text: &str) -> InboundTurn {
        let mut sessions = self.sessions.lock().await;
        let (session, evicted) = sessions.get_or_create(session_id.clone());
        if let Some(evicted) = evicted {
            debug!(
                event_name = "agent.sessions.evicted",
                evicted = %evicted,
                "session store full, evicted one session"
            );
        }

        let history = session.messages().to_vec();
        let newly_extracted = session.record_user_message(text);
        InboundTurn {
            history,
            contact_email: session.extracted().email.clone(),
            newly_extracted,
        }
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.lock().await.len()
    }
}
