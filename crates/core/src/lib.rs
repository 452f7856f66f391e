//! Domain core for the parley conversational assistant: qualification
//! extraction and scoring, conversation sessions, languages, layered
//! configuration and the error model shared by the other crates.

pub mod config;
pub mod errors;
pub mod language;
pub mod qualification;
pub mod session;

pub use config::{AppConfig, ConfigError, LoadOptions, ProviderKind};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use language::{Language, LanguageParseError};
pub use qualification::{
    extract_all, score, BudgetTier, ExtractedData, LeadScore, LeadStatus, ScoreBreakdown,
};
pub use session::{ConversationSession, EvictionPolicy, Message, Role, SessionId, SessionStore};
