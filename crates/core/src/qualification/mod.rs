//! Lead qualification (BANT) signals extracted from conversation text.
//!
//! Extraction is pure: every extractor maps text to an optional signal and
//! never fails. Scores are attached to tiers, never computed ad hoc, so a
//! signal's score is always drawn from the fixed scale of its tier.

pub mod extract;
pub mod scoring;

use rust_decimal::Decimal;
use serde::Serialize;

pub use extract::{
    extract_all, extract_budget, extract_decision_maker, extract_email, extract_industry_fit,
    extract_name, extract_phone, extract_timeline,
};
pub use scoring::{engagement_score, score, LeadScore, LeadStatus, ScoreBreakdown};

/// A tier on one of the fixed qualification scales.
pub trait Tier: Copy {
    fn score(self) -> u8;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BudgetTier {
    High,
    Medium,
    Low,
    Minimal,
}

impl BudgetTier {
    /// Highest tier first; the first tier whose minimum is met wins.
    pub const DESCENDING: [BudgetTier; 4] =
        [BudgetTier::High, BudgetTier::Medium, BudgetTier::Low, BudgetTier::Minimal];

    pub fn minimum_amount(self) -> Decimal {
        match self {
            Self::High => Decimal::from(1000),
            Self::Medium => Decimal::from(500),
            Self::Low => Decimal::from(300),
            Self::Minimal => Decimal::ZERO,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::High => "Growth+",
            Self::Medium => "Essentials",
            Self::Low => "Quick Win",
            Self::Minimal => "Nurture",
        }
    }

    pub fn for_amount(amount: Decimal) -> Self {
        Self::DESCENDING
            .into_iter()
            .find(|tier| amount >= tier.minimum_amount())
            .unwrap_or(Self::Minimal)
    }
}

impl Tier for BudgetTier {
    fn score(self) -> u8 {
        match self {
            Self::High => 30,
            Self::Medium => 20,
            Self::Low => 10,
            Self::Minimal => 5,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TimelineTier {
    Immediate,
    Short,
    Medium,
    Long,
}

impl Tier for TimelineTier {
    fn score(self) -> u8 {
        match self {
            Self::Immediate => 25,
            Self::Short => 20,
            Self::Medium => 12,
            Self::Long => 5,
        }
    }
}

/// Whether the contact can sign off on a purchase.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Authority {
    Yes,
    Partial,
    No,
}

impl Tier for Authority {
    fn score(self) -> u8 {
        match self {
            Self::Yes => 20,
            Self::Partial => 12,
            Self::No => 5,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IndustryTier {
    Perfect,
    Good,
    Moderate,
    Low,
}

impl Tier for IndustryTier {
    fn score(self) -> u8 {
        match self {
            Self::Perfect => 15,
            Self::Good => 12,
            Self::Moderate => 8,
            Self::Low => 3,
        }
    }
}

/// A detected tier together with its fixed score.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct Signal<T> {
    tier: T,
    score: u8,
}

impl<T: Tier> Signal<T> {
    pub fn new(tier: T) -> Self {
        Self { tier, score: tier.score() }
    }

    pub fn tier(&self) -> T {
        self.tier
    }

    pub fn score(&self) -> u8 {
        self.score
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct BudgetSignal {
    tier: BudgetTier,
    score: u8,
    label: &'static str,
    /// Explicit euro amount when one was stated; absent for package mentions.
    amount: Option<Decimal>,
}

impl BudgetSignal {
    pub fn from_amount(amount: Decimal) -> Self {
        let tier = BudgetTier::for_amount(amount);
        Self { tier, score: tier.score(), label: tier.label(), amount: Some(amount) }
    }

    pub fn from_package(tier: BudgetTier) -> Self {
        Self { tier, score: tier.score(), label: tier.label(), amount: None }
    }

    pub fn tier(&self) -> BudgetTier {
        self.tier
    }

    pub fn score(&self) -> u8 {
        self.score
    }

    pub fn label(&self) -> &'static str {
        self.label
    }

    pub fn amount(&self) -> Option<Decimal> {
        self.amount
    }
}

/// Qualification fields known about a lead.
///
/// Used both as the per-message extraction result (a partial update) and as
/// the accumulated session state.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ExtractedData {
    pub budget: Option<BudgetSignal>,
    pub timeline: Option<Signal<TimelineTier>>,
    pub decision_maker: Option<Signal<Authority>>,
    pub industry: Option<Signal<IndustryTier>>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub name: Option<String>,
}

impl ExtractedData {
    /// Fills fields that are still empty from `update` and returns the names
    /// of the fields that were set. Fields already present are never replaced.
    pub fn merge_first_wins(&mut self, update: ExtractedData) -> Vec<&'static str> {
        let mut filled = Vec::new();
        fill(&mut self.budget, update.budget, "budget", &mut filled);
        fill(&mut self.timeline, update.timeline, "timeline", &mut filled);
        fill(&mut self.decision_maker, update.decision_maker, "decision_maker", &mut filled);
        fill(&mut self.industry, update.industry, "industry", &mut filled);
        fill(&mut self.email, update.email, "email", &mut filled);
        fill(&mut self.phone, update.phone, "phone", &mut filled);
        fill(&mut self.name, update.name, "name", &mut filled);
        filled
    }

    /// A way to reach the lead is known (email or phone).
    pub fn has_contact(&self) -> bool {
        self.email.is_some() || self.phone.is_some()
    }

    pub fn has_qualification(&self) -> bool {
        self.budget.is_some() || self.timeline.is_some() || self.industry.is_some()
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

fn fill<T>(
    slot: &mut Option<T>,
    candidate: Option<T>,
    field: &'static str,
    filled: &mut Vec<&'static str>,
) {
    if slot.is_none() {
        if let Some(value) = candidate {
            *slot = Some(value);
            filled.push(field);
        }
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::{
        Authority, BudgetSignal, BudgetTier, ExtractedData, IndustryTier, Signal, Tier,
        TimelineTier,
    };

    #[test]
    fn budget_tiers_follow_amount_thresholds() {
        assert_eq!(BudgetTier::for_amount(Decimal::from(1500)), BudgetTier::High);
        assert_eq!(BudgetTier::for_amount(Decimal::from(1000)), BudgetTier::High);
        assert_eq!(BudgetTier::for_amount(Decimal::new(99999, 2)), BudgetTier::Medium);
        assert_eq!(BudgetTier::for_amount(Decimal::from(300)), BudgetTier::Low);
        assert_eq!(BudgetTier::for_amount(Decimal::from(299)), BudgetTier::Minimal);
    }

    #[test]
    fn signal_scores_come_from_tier_scale() {
        assert_eq!(Signal::new(TimelineTier::Short).score(), 20);
        assert_eq!(Signal::new(Authority::Partial).score(), 12);
        assert_eq!(Signal::new(IndustryTier::Moderate).score(), 8);
        assert_eq!(BudgetSignal::from_package(BudgetTier::Low).score(), BudgetTier::Low.score());
    }

    #[test]
    fn merge_keeps_first_detected_value() {
        let mut data = ExtractedData {
            timeline: Some(Signal::new(TimelineTier::Long)),
            ..ExtractedData::default()
        };

        let filled = data.merge_first_wins(ExtractedData {
            timeline: Some(Signal::new(TimelineTier::Immediate)),
            email: Some("lead@example.com".to_string()),
            ..ExtractedData::default()
        });

        assert_eq!(filled, vec!["email"]);
        assert_eq!(data.timeline.map(|signal| signal.tier()), Some(TimelineTier::Long));
        assert_eq!(data.email.as_deref(), Some("lead@example.com"));
    }

    #[test]
    fn contact_and_qualification_flags() {
        let mut data = ExtractedData::default();
        assert!(data.is_empty());
        assert!(!data.has_contact());

        data.name = Some("Marie".to_string());
        assert!(!data.has_contact(), "a name alone is not a way to reach the lead");

        data.phone = Some("0612345678".to_string());
        data.decision_maker = Some(Signal::new(Authority::Yes));
        assert!(data.has_contact());
        assert!(!data.has_qualification());

        data.industry = Some(Signal::new(IndustryTier::Good));
        assert!(data.has_qualification());
    }
}
