//! System prompt assembly.
//!
//! The prompt is the per-language base prompt followed by a
//! `RELEVANT_SYSTEMS` block collected from [`ContextSource`]s (knowledge
//! base, CRM lookups). Sources are opaque: a failing source contributes
//! nothing and the prompt is still built.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use parley_core::Language;
use tracing::warn;

pub const BASE_PROMPT: &str = "You are Parley, the voice assistant of an automation agency that \
builds e-commerce and B2B marketing systems.

RESPONSE RULES:
- Voice optimized: at most 2-3 sentences, no bullet points, no markdown.
- Answer in the user's language (French, English, Spanish or Arabic).
- Be consultative: advise, then move the conversation towards a free audit.
- Qualify the lead as you go: budget, decision maker, timeline, business type.
- Use the RELEVANT_SYSTEMS context below for precise details; never invent prices.";

pub const DARIJA_PROMPT: &str = "نتا المساعد الصوتي ديال Parley، أجونس ديال الأوتوماسيون \
كتعاون المتاجر الإلكترونية والشركات B2B.

قواعد الجواب:
- جاوب ديما بالدارجة المغربية، جملتين ولا تلاتة ماشي كثر.
- ما تستعملش الفرنسية فالتحية: قول Salam، Choukran، Beslama.
- سول على الميزانية، شكون كياخد القرار، وإمتى بغا يبدا.
- الأوديت مجاني، والمعلومات الدقيقة كاينين ف RELEVANT_SYSTEMS.";

pub const CONTEXT_HEADER: &str = "RELEVANT_SYSTEMS:";

pub fn base_prompt(language: Language) -> &'static str {
    match language {
        Language::Ary => DARIJA_PROMPT,
        Language::Fr | Language::En | Language::Es | Language::Ar => BASE_PROMPT,
    }
}

/// What a context source gets to see about the current turn.
#[derive(Clone, Copy, Debug)]
pub struct ContextQuery<'a> {
    pub message: &'a str,
    pub language: Language,
    pub session_id: &'a str,
    pub contact_email: Option<&'a str>,
}

#[async_trait]
pub trait ContextSource: Send + Sync {
    fn name(&self) -> &'static str;

    /// Text block appended to the prompt; empty when there is nothing relevant.
    async fn fetch(&self, query: &ContextQuery<'_>) -> Result<String>;
}

/// Stand-in used when no knowledge base or CRM is wired in.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopContext;

#[async_trait]
impl ContextSource for NoopContext {
    fn name(&self) -> &'static str {
        "noop"
    }

    async fn fetch(&self, _query: &ContextQuery<'_>) -> Result<String> {
        Ok(String::new())
    }
}

#[derive(Clone)]
pub struct PromptBuilder {
    sources: Vec<Arc<dyn ContextSource>>,
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self::new(vec![Arc::new(NoopContext)])
    }
}

impl PromptBuilder {
    pub fn new(sources: Vec<Arc<dyn ContextSource>>) -> Self {
        Self { sources }
    }

    pub async fn build(&self, query: &ContextQuery<'_>) -> String {
        let mut blocks = Vec::with_capacity(self.sources.len());
        for source in &self.sources {
            match source.fetch(query).await {
                Ok(block) if !block.trim().is_empty() => blocks.push(block.trim().to_string()),
                Ok(_) => {}
                Err(error) => warn!(
                    event_name = "agent.prompt.context_source_failed",
                    source = source.name(),
                    session_id = query.session_id,
                    error = %error,
                    "context source failed, continuing without it"
                ),
            }
        }

        format!("{}\n\n{CONTEXT_HEADER}\n{}", base_prompt(query.language), blocks.join("\n"))
    }
}
