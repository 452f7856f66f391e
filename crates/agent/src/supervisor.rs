//! Built-in reviewer answering `voice.generation.check` requests.
//!
//! Replies are cleaned for speech synthesis, AI boilerplate is replaced by a
//! localized "please repeat" line, and Darija replies get French courtesy
//! words swapped for their Darija equivalents.

use std::sync::{Arc, OnceLock, Weak};

use parley_core::Language;
use regex::Regex;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::bus::{Event, EventBus, EventMetadata, SubscriptionId};
use crate::supervision::{APPROVED_EVENT, CHECK_EVENT, CORRECTED_EVENT};

pub const REASON_HALLUCINATION: &str = "hallucination_detected";
pub const REASON_DARIJA: &str = "darija_enforcement";

const BOILERPLATE_PHRASES: [&str; 9] = [
    "as an ai language model",
    "i am an artificial intelligence",
    "i cannot have personal opinions",
    "my cutoff date",
    "openai",
    "en tant que modèle de langue",
    "je suis une intelligence artificielle",
    "je ne peux pas",
    "ma date de coupure",
];

const DARIJA_REPLACEMENTS: [(&str, &str); 6] = [
    ("bonjour", "Salam"),
    ("au revoir", "Beslama"),
    ("s'il vous plaît", "3afak"),
    ("merci", "Choukran"),
    ("oui", "Ah"),
    ("non", "Lla"),
];

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Review {
    Approved { text: String },
    Corrected { text: String, reason: &'static str },
}

/// Strips markdown markers and emoji and collapses whitespace.
pub fn clean_for_speech(text: &str) -> String {
    let stripped: String = text
        .chars()
        .filter(|ch| !matches!(ch, '*' | '_' | '#' | '`' | '\u{1F600}'..='\u{1F64F}'))
        .collect();
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn contains_boilerplate(text: &str) -> bool {
    let lowered = text.to_lowercase();
    BOILERPLATE_PHRASES.iter().any(|phrase| lowered.contains(phrase))
}

pub fn fallback_reply(language: Language) -> &'static str {
    match language {
        Language::Ary => "Smahli, ma sma3tch mzyan. 3awd 3afak?",
        Language::Ar => "عذراً، لم أسمع جيداً. ممكن تعاود؟",
        Language::En => "Sorry, I didn't verify that properly. Could you repeat?",
        Language::Es => "Lo siento, no verifiqué bien. ¿Puede repetir?",
        Language::Fr => "Pardon, je n'ai pas bien saisi. Pouvez-vous répéter ?",
    }
}

fn darija_patterns() -> &'static [(Regex, &'static str)] {
    static PATTERNS: OnceLock<Vec<(Regex, &'static str)>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        DARIJA_REPLACEMENTS
            .iter()
            .filter_map(|(from, to)| {
                Regex::new(&format!(r"(?i)\b{}\b", regex::escape(from))).ok().map(|re| (re, *to))
            })
            .collect()
    })
}

/// Whole-word, case-insensitive replacement of French courtesy words.
pub fn enforce_darija(text: &str) -> String {
    darija_patterns().iter().fold(text.to_string(), |current, (pattern, to)| {
        pattern.replace_all(&current, *to).into_owned()
    })
}

pub fn review(text: &str, language: Language) -> Review {
    let cleaned = clean_for_speech(text);

    if contains_boilerplate(&cleaned) {
        return Review::Corrected {
            text: fallback_reply(language).to_string(),
            reason: REASON_HALLUCINATION,
        };
    }

    if language == Language::Ary {
        let enforced = enforce_darija(&cleaned);
        if enforced != cleaned {
            return Review::Corrected { text: enforced, reason: REASON_DARIJA };
        }
    }

    Review::Approved { text: cleaned }
}

/// Subscribes the reviewer to check requests on `bus`. The handler holds the
/// bus weakly, so it never keeps the bus alive on its own.
pub fn attach(bus: &Arc<dyn EventBus>) -> SubscriptionId {
    let weak: Weak<dyn EventBus> = Arc::downgrade(bus);
    bus.subscribe(
        CHECK_EVENT,
        Arc::new(move |event: &Event| {
            if let Some(bus) = weak.upgrade() {
                handle_check(bus.as_ref(), event);
            }
        }),
    )
}

fn handle_check(bus: &dyn EventBus, event: &Event) {
    let correlation_id = event.metadata.correlation_id.as_str();
    let Some(text) = event.payload.get("text").and_then(Value::as_str) else {
        warn!(
            event_name = "agent.supervisor.invalid_check",
            correlation_id,
            "check request without text, ignoring"
        );
        return;
    };
    let language = event
        .payload
        .get("language")
        .and_then(Value::as_str)
        .and_then(|code| code.parse::<Language>().ok())
        .unwrap_or_default();

    let metadata = EventMetadata::correlated(correlation_id);
    match review(text, language) {
        Review::Approved { text } => {
            bus.publish(APPROVED_EVENT, json!({ "text": text }), metadata);
        }
        Review::Corrected { text, reason } => {
            debug!(
                event_name = "agent.supervisor.corrected",
                correlation_id,
                reason,
                language = language.code(),
                "reply corrected before delivery"
            );
            bus.publish(CORRECTED_EVENT, json!({ "text": text, "reason": reason }), metadata);
        }
    }
}
