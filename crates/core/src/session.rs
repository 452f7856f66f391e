//! Conversation sessions and the bounded in-memory store that holds them.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::qualification::{self, ExtractedData, LeadScore, LeadStatus, ScoreBreakdown};

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SessionId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into(), timestamp: Utc::now() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into(), timestamp: Utc::now() }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct ConversationSession {
    pub id: SessionId,
    pub created_at: DateTime<Utc>,
    messages: Vec<Message>,
    extracted: ExtractedData,
    score: u8,
    status: LeadStatus,
    breakdown: ScoreBreakdown,
    qualification_complete: bool,
}

impl ConversationSession {
    pub fn new(id: SessionId) -> Self {
        Self {
            id,
            created_at: Utc::now(),
            messages: Vec::new(),
            extracted: ExtractedData::default(),
            score: 0,
            status: LeadStatus::Cold,
            breakdown: ScoreBreakdown::default(),
            qualification_complete: false,
        }
    }

    /// Extracts qualification signals from an inbound message, keeps the first
    /// value seen for every field, appends the message, and rescores.
    /// Returns the fields that were newly filled by this message.
    pub fn record_user_message(&mut self, content: &str) -> Vec<&'static str> {
        let filled = self.extracted.merge_first_wins(qualification::extract_all(content));
        self.messages.push(Message::user(content));
        self.rescore();
        filled
    }

    pub fn record_assistant_message(&mut self, content: &str) {
        self.messages.push(Message::assistant(content));
        self.rescore();
    }

    /// Score derived from the stored fields and message count alone.
    pub fn lead_score(&self) -> LeadScore {
        qualification::score(&self.extracted, self.messages.len())
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn extracted(&self) -> &ExtractedData {
        &self.extracted
    }

    pub fn score(&self) -> u8 {
        self.score
    }

    pub fn status(&self) -> LeadStatus {
        self.status
    }

    pub fn breakdown(&self) -> ScoreBreakdown {
        self.breakdown
    }

    pub fn qualification_complete(&self) -> bool {
        self.qualification_complete
    }

    fn rescore(&mut self) {
        let lead = self.lead_score();
        self.score = lead.score;
        self.status = lead.status;
        self.breakdown = lead.breakdown;
        self.qualification_complete =
            self.extracted.has_contact() && self.extracted.has_qualification();
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvictionPolicy {
    /// Evict the session that was created first, regardless of later use.
    #[default]
    InsertionOrder,
    /// Evict the session that was read or written least recently.
    LeastRecentlyUsed,
}

impl std::str::FromStr for EvictionPolicy {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "insertion_order" | "fifo" => Ok(Self::InsertionOrder),
            "least_recently_used" | "lru" => Ok(Self::LeastRecentlyUsed),
            other => Err(format!(
                "unsupported eviction policy `{other}` (expected insertion_order|least_recently_used)"
            )),
        }
    }
}

#[derive(Debug)]
struct Slot {
    session: ConversationSession,
    tick: u64,
}

/// Fixed-capacity session store.
///
/// Sessions live in an arena of slots; `index` maps ids to slots and `order`
/// maps an ever-increasing tick to a slot, so the smallest tick is always the
/// next eviction candidate. Under `InsertionOrder` a slot's tick is assigned
/// once at creation; under `LeastRecentlyUsed` it is refreshed on every access.
#[derive(Debug)]
pub struct SessionStore {
    capacity: usize,
    policy: EvictionPolicy,
    slots: Vec<Option<Slot>>,
    free: Vec<usize>,
    index: HashMap<SessionId, usize>,
    order: BTreeMap<u64, usize>,
    clock: u64,
}

impl SessionStore {
    /// A capacity of zero is treated as one.
    pub fn new(capacity: usize, policy: EvictionPolicy) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            policy,
            slots: Vec::with_capacity(capacity.min(1024)),
            free: Vec::new(),
            index: HashMap::new(),
            order: BTreeMap::new(),
            clock: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn policy(&self) -> EvictionPolicy {
        self.policy
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn contains(&self, id: &SessionId) -> bool {
        self.index.contains_key(id)
    }

    /// Read without counting as a use.
    pub fn peek(&self, id: &SessionId) -> Option<&ConversationSession> {
        let slot = *self.index.get(id)?;
        self.slots.get(slot)?.as_ref().map(|entry| &entry.session)
    }

    pub fn get_mut(&mut self, id: &SessionId) -> Option<&mut ConversationSession> {
        let slot = *self.index.get(id)?;
        self.touch(slot);
        self.slots.get_mut(slot)?.as_mut().map(|entry| &mut entry.session)
    }

    /// Returns the session for `id`, creating it (and evicting one session if
    /// the store is full) when absent. The second value is the id of the
    /// evicted session, if any.
    pub fn get_or_create(
        &mut self,
        id: SessionId,
    ) -> (&mut ConversationSession, Option<SessionId>) {
        if let Some(existing) = self.take(&id) {
            let tick = match self.policy {
                EvictionPolicy::InsertionOrder => existing.tick,
                EvictionPolicy::LeastRecentlyUsed => self.next_tick(),
            };
            return (self.place(existing.session, tick), None);
        }

        let evicted = if self.index.len() >= self.capacity { self.evict_one() } else { None };
        let tick = self.next_tick();
        (self.place(ConversationSession::new(id), tick), evicted)
    }

    /// Detaches the session for `id` and releases its slot.
    fn take(&mut self, id: &SessionId) -> Option<Slot> {
        let slot = self.index.remove(id)?;
        self.free.push(slot);
        let entry = self.slots.get_mut(slot)?.take()?;
        self.order.remove(&entry.tick);
        Some(entry)
    }

    fn place(&mut self, session: ConversationSession, tick: u64) -> &mut ConversationSession {
        let slot = match self.free.pop() {
            Some(slot) if slot < self.slots.len() => slot,
            _ => {
                self.slots.push(None);
                self.slots.len() - 1
            }
        };
        self.index.insert(session.id.clone(), slot);
        self.order.insert(tick, slot);
        &mut self.slots[slot].insert(Slot { session, tick }).session
    }

    fn evict_one(&mut self) -> Option<SessionId> {
        let (_, slot) = self.order.pop_first()?;
        let entry = self.slots.get_mut(slot)?.take()?;
        self.index.remove(&entry.session.id);
        self.free.push(slot);
        Some(entry.session.id)
    }

    fn touch(&mut self, slot: usize) {
        if self.policy != EvictionPolicy::LeastRecentlyUsed {
            return;
        }
        let tick = self.next_tick();
        if let Some(entry) = self.slots.get_mut(slot).and_then(Option::as_mut) {
            self.order.remove(&entry.tick);
            entry.tick = tick;
            self.order.insert(tick, slot);
        }
    }

    fn next_tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }
}
