use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;
use rust_decimal::Decimal;

use super::{
    Authority, BudgetSignal, BudgetTier, ExtractedData, IndustryTier, Signal, TimelineTier,
};

const PACKAGE_KEYWORDS: [(BudgetTier, &[&str]); 3] = [
    (BudgetTier::High, &["growth", "1399", "1400"]),
    (BudgetTier::Medium, &["essentials", "790", "800"]),
    (BudgetTier::Low, &["quick win", "390", "400"]),
];

const TIMELINE_KEYWORDS: [(TimelineTier, &[&str]); 4] = [
    (
        TimelineTier::Immediate,
        &[
            "urgent",
            "asap",
            "maintenant",
            "cette semaine",
            "immédiat",
            "immédiatement",
            "right away",
            "immediately",
            "this week",
        ],
    ),
    (
        TimelineTier::Short,
        &[
            "ce mois",
            "bientôt",
            "rapidement",
            "2 semaines",
            "prochainement",
            "this month",
            "soon",
            "two weeks",
            "2 weeks",
        ],
    ),
    (
        TimelineTier::Medium,
        &["prochain mois", "trimestre", "1-3 mois", "q1", "q2", "next month", "next quarter"],
    ),
    (
        TimelineTier::Long,
        &["plus tard", "explorer", "pas pressé", "futur", "later", "just exploring", "no rush"],
    ),
];

const AUTHORITY_KEYWORDS: [(Authority, &[&str]); 3] = [
    (
        Authority::Yes,
        &[
            "je décide",
            "c'est moi",
            "mon entreprise",
            "je suis le",
            "je suis la",
            "fondateur",
            "fondatrice",
            "ceo",
            "directeur",
            "directrice",
            "owner",
            "gérant",
            "patron",
            "founder",
            "i decide",
            "my company",
        ],
    ),
    (
        Authority::Partial,
        &[
            "avec mon",
            "équipe",
            "nous décidons",
            "je propose",
            "valider avec",
            "my team",
            "we decide",
            "check with",
        ],
    ),
    (
        Authority::No,
        &["mon chef", "supérieur", "je transmets", "je demande", "my boss", "my manager"],
    ),
];

const INDUSTRY_KEYWORDS: [(IndustryTier, &[&str]); 4] = [
    (
        IndustryTier::Perfect,
        &[
            "e-commerce",
            "ecommerce",
            "boutique en ligne",
            "online store",
            "shopify",
            "woocommerce",
            "klaviyo",
            "email marketing",
        ],
    ),
    (
        IndustryTier::Good,
        &["pme", "b2b", "saas", "startup", "agence", "agency", "services", "sme"],
    ),
    (IndustryTier::Moderate, &["entreprise", "société", "business", "commerce", "company"]),
    (IndustryTier::Low, &["particulier", "personnel", "hobby", "personal"]),
];

/// Runs every extractor over `text`. Each field of the result is set only
/// when its extractor found a signal.
pub fn extract_all(text: &str) -> ExtractedData {
    ExtractedData {
        budget: extract_budget(text),
        timeline: extract_timeline(text),
        decision_maker: extract_decision_maker(text),
        industry: extract_industry_fit(text),
        email: extract_email(text),
        phone: extract_phone(text),
        name: extract_name(text),
    }
}

/// Explicit euro amounts take precedence over package mentions.
pub fn extract_budget(text: &str) -> Option<BudgetSignal> {
    if let Some(amount) = extract_euro_amount(text) {
        return Some(BudgetSignal::from_amount(amount));
    }

    let normalized = normalize_text(text);
    PACKAGE_KEYWORDS
        .iter()
        .find(|(_, keywords)| contains_any(&normalized, keywords))
        .map(|(tier, _)| BudgetSignal::from_package(*tier))
}

pub fn extract_timeline(text: &str) -> Option<Signal<TimelineTier>> {
    first_matching_tier(text, &TIMELINE_KEYWORDS).map(Signal::new)
}

pub fn extract_decision_maker(text: &str) -> Option<Signal<Authority>> {
    first_matching_tier(text, &AUTHORITY_KEYWORDS).map(Signal::new)
}

pub fn extract_industry_fit(text: &str) -> Option<Signal<IndustryTier>> {
    first_matching_tier(text, &INDUSTRY_KEYWORDS).map(Signal::new)
}

pub fn extract_email(text: &str) -> Option<String> {
    let found = email_pattern()?.find(text)?;
    Some(found.as_str().to_lowercase())
}

/// French (+33 / 0) and Moroccan (+212) numbers, separators removed.
pub fn extract_phone(text: &str) -> Option<String> {
    let found = phone_pattern()?.find(text)?;
    Some(found.as_str().chars().filter(|ch| !matches!(ch, ' ' | '.' | '-' | '\t')).collect())
}

pub fn extract_name(text: &str) -> Option<String> {
    let captures = name_pattern()?.captures(text)?;
    let name = captures.get(1)?.as_str().trim();
    (!name.is_empty()).then(|| name.to_string())
}

fn extract_euro_amount(text: &str) -> Option<Decimal> {
    let captures = amount_pattern()?.captures(text)?;
    let raw = captures.get(1).or_else(|| captures.get(2))?.as_str();
    Decimal::from_str(&raw.replace(',', ".")).ok()
}

fn first_matching_tier<T: Copy>(text: &str, table: &[(T, &[&str])]) -> Option<T> {
    let normalized = normalize_text(text);
    table
        .iter()
        .find(|(_, keywords)| contains_any(&normalized, keywords))
        .map(|(tier, _)| *tier)
}

fn normalize_text(text: &str) -> String {
    text.to_lowercase().replace('’', "'")
}

fn contains_any(haystack: &str, phrases: &[&str]) -> bool {
    phrases.iter().any(|phrase| contains_phrase(haystack, phrase))
}

/// Substring match that refuses to start or end inside a word, so `later`
/// does not match `collateral`.
fn contains_phrase(haystack: &str, phrase: &str) -> bool {
    haystack.match_indices(phrase).any(|(start, matched)| {
        let before = haystack[..start].chars().next_back();
        let after = haystack[start + matched.len()..].chars().next();
        !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
    })
}

fn amount_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| {
            Regex::new(r"(?i)€\s*(\d+(?:[.,]\d+)?)|(\d+(?:[.,]\d+)?)\s*(?:€|euros?\b|eur\b)").ok()
        })
        .as_ref()
}

fn email_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"[\w.+-]+@[\w-]+(?:\.[\w-]+)*\.\w+").ok()).as_ref()
}

fn phone_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"(?:\+33|\+212|\b0)[\s.-]?[1-9](?:[\s.-]?\d{2}){4}\b").ok())
        .as_ref()
}

fn name_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| {
            Regex::new(
                r"\b(?i:je suis|je m'appelle|je m’appelle|my name is|i'm|i am)\s+(\p{Lu}\p{Ll}+(?:[\s-]\p{Lu}\p{Ll}+)?)",
            )
            .ok()
        })
        .as_ref()
}
