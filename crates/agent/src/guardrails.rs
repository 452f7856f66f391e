use std::sync::OnceLock;

use regex::Regex;

pub const MAX_INPUT_CHARS: usize = 2_000;
pub const REDACTION_MARKER: &str = "[REDACTED_SECURITY_POLICY]";

/// Prompt-injection phrasings, longest first so overlapping phrases redact whole.
const INJECTION_PHRASES: [&str; 10] = [
    "ignore previous instructions",
    "reveal the system prompt",
    "ignore all previous",
    "forget everything",
    "new instructions",
    "tu es maintenant",
    "votre nouveau rôle",
    "system prompt",
    "speak as",
    "act as",
];

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GuardrailDecision {
    Allow { text: String },
    Degrade { text: String, reason_codes: Vec<&'static str> },
    Deny { reason_code: &'static str },
}

impl GuardrailDecision {
    /// Text to forward to the model, if any.
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Allow { text } | Self::Degrade { text, .. } => Some(text),
            Self::Deny { .. } => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GuardrailPolicy {
    pub max_input_chars: usize,
}

impl Default for GuardrailPolicy {
    fn default() -> Self {
        Self { max_input_chars: MAX_INPUT_CHARS }
    }
}

fn injection_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| {
            let alternatives: Vec<String> =
                INJECTION_PHRASES.iter().map(|phrase| regex::escape(phrase)).collect();
            Regex::new(&format!(r"(?i)\b(?:{})\b", alternatives.join("|"))).ok()
        })
        .as_ref()
}

impl GuardrailPolicy {
    /// Normalizes inbound user text before it reaches prompts or extractors:
    /// control characters removed, whitespace collapsed, length capped and
    /// injection phrasings redacted.
    pub fn evaluate(&self, raw: &str) -> GuardrailDecision {
        let cleaned: String = raw
            .chars()
            .filter(|ch| !ch.is_control() || ch.is_whitespace())
            .collect::<String>()
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ");

        if cleaned.is_empty() {
            return GuardrailDecision::Deny { reason_code: "empty_input" };
        }

        let mut reason_codes = Vec::new();
        let mut text = if cleaned.chars().count() > self.max_input_chars {
            reason_codes.push("input_truncated");
            cleaned.chars().take(self.max_input_chars).collect::<String>().trim_end().to_string()
        } else {
            cleaned
        };

        if let Some(pattern) = injection_pattern() {
            if pattern.is_match(&text) {
                reason_codes.push("prompt_injection_redacted");
                text = pattern.replace_all(&text, REDACTION_MARKER).into_owned();
            }
        }

        if reason_codes.is_empty() {
            GuardrailDecision::Allow { text }
        } else {
            GuardrailDecision::Degrade { text, reason_codes }
        }
    }
}
