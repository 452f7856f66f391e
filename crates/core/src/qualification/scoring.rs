//! Lead score and status derivation.
//!
//! The score is always recomputed from the extracted fields and the message
//! count; nothing incremental is kept between messages.

use serde::Serialize;

use super::ExtractedData;

/// Points granted per message, before the engagement cap.
pub const ENGAGEMENT_PER_MESSAGE: u8 = 2;
pub const MAX_ENGAGEMENT: u8 = 10;
/// 30 (budget) + 25 (timeline) + 20 (authority) + 15 (industry) + 10 (engagement).
pub const MAX_SCORE: u8 = 100;

pub const HOT_THRESHOLD: u8 = 75;
pub const WARM_THRESHOLD: u8 = 50;
pub const COOL_THRESHOLD: u8 = 25;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadStatus {
    Hot,
    Warm,
    Cool,
    #[default]
    Cold,
}

impl LeadStatus {
    pub fn from_score(score: u8) -> Self {
        match score {
            s if s >= HOT_THRESHOLD => Self::Hot,
            s if s >= WARM_THRESHOLD => Self::Warm,
            s if s >= COOL_THRESHOLD => Self::Cool,
            _ => Self::Cold,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Hot => "hot",
            Self::Warm => "warm",
            Self::Cool => "cool",
            Self::Cold => "cold",
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ScoreBreakdown {
    pub budget: u8,
    pub timeline: u8,
    pub decision_maker: u8,
    pub industry: u8,
    pub engagement: u8,
}

impl ScoreBreakdown {
    pub fn total(&self) -> u8 {
        let total = u16::from(self.budget)
            + u16::from(self.timeline)
            + u16::from(self.decision_maker)
            + u16::from(self.industry)
            + u16::from(self.engagement);
        total.min(u16::from(MAX_SCORE)) as u8
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct LeadScore {
    pub score: u8,
    pub status: LeadStatus,
    pub breakdown: ScoreBreakdown,
}

pub fn engagement_score(message_count: usize) -> u8 {
    let capped = message_count.min(usize::from(MAX_ENGAGEMENT / ENGAGEMENT_PER_MESSAGE));
    (capped as u8).saturating_mul(ENGAGEMENT_PER_MESSAGE).min(MAX_ENGAGEMENT)
}

pub fn score(extracted: &ExtractedData, message_count: usize) -> LeadScore {
    let breakdown = ScoreBreakdown {
        budget: extracted.budget.as_ref().map_or(0, |budget| budget.score()),
        timeline: extracted.timeline.map_or(0, |signal| signal.score()),
        decision_maker: extracted.decision_maker.map_or(0, |signal| signal.score()),
        industry: extracted.industry.map_or(0, |signal| signal.score()),
        engagement: engagement_score(message_count),
    };
    let score = breakdown.total();

    LeadScore { score, status: LeadStatus::from_score(score), breakdown }
}
