//! Out-of-band verification of generated replies.
//!
//! A draft is published as a check request on the [`EventBus`] and the round
//! settles on the first of: an approved event, a corrected event, or the
//! timeout. A timeout passes the draft through unchanged.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use parley_core::Language;
use rand::Rng;
use serde::Serialize;
use serde_json::{json, Value};
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::bus::{Event, EventBus, EventHandler, EventMetadata, Priority, SubscriptionId};

pub const CHECK_EVENT: &str = "voice.generation.check";
pub const APPROVED_EVENT: &str = "voice.generation.approved";
pub const CORRECTED_EVENT: &str = "voice.generation.corrected";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SupervisionState {
    Pending,
    Approved,
    Corrected,
    TimedOut,
}

/// Result of one verification round.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Verification {
    pub state: SupervisionState,
    pub text: String,
    /// The draft before correction. Only set for [`SupervisionState::Corrected`].
    pub original_text: Option<String>,
    pub reason: Option<String>,
    pub latency_ms: u64,
    pub correlation_id: String,
}

#[derive(Clone, Debug)]
pub struct SupervisionRequest {
    pub correlation_id: String,
    pub draft: String,
    pub language: Language,
    pub session_id: Option<String>,
    pub created_at: Instant,
}

impl SupervisionRequest {
    pub fn new(draft: &str, language: Language, session_id: Option<&str>) -> Self {
        Self {
            correlation_id: next_correlation_id(),
            draft: draft.to_string(),
            language,
            session_id: session_id.map(str::to_string),
            created_at: Instant::now(),
        }
    }

    fn check_payload(&self) -> Value {
        json!({
            "text": self.draft,
            "language": self.language.code(),
            "session_id": self.session_id,
        })
    }
}

static CORRELATION_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// `sup-<unix millis>-<sequence>-<random>`. The process-wide sequence makes
/// ids unique among concurrent rounds; time and suffix keep them unique
/// across restarts.
pub fn next_correlation_id() -> String {
    let millis =
        SystemTime::now().duration_since(UNIX_EPOCH).map_or(0, |elapsed| elapsed.as_millis());
    let sequence = CORRELATION_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    let suffix: u16 = rand::thread_rng().gen();
    format!("sup-{millis:x}-{sequence:x}-{suffix:04x}")
}

#[derive(Debug)]
enum Outcome {
    Approved { text: String },
    Corrected { text: String, reason: Option<String> },
}

/// Single-fulfilment handle shared by both listeners and the timeout.
struct Settlement {
    sender: Mutex<Option<oneshot::Sender<Outcome>>>,
}

impl Settlement {
    fn new(sender: oneshot::Sender<Outcome>) -> Self {
        Self { sender: Mutex::new(Some(sender)) }
    }

    /// Returns true for the caller that settled the round. `None` settles it
    /// as timed out.
    fn settle(&self, outcome: Option<Outcome>) -> bool {
        let sender = self.sender.lock().unwrap_or_else(PoisonError::into_inner).take();
        match sender {
            Some(sender) => {
                if let Some(outcome) = outcome {
                    let _ = sender.send(outcome);
                }
                true
            }
            None => false,
        }
    }
}

/// Removes its subscriptions when dropped, including when the verifying
/// future is cancelled.
struct ListenerGuard {
    bus: Arc<dyn EventBus>,
    subscriptions: Vec<(&'static str, SubscriptionId)>,
}

impl ListenerGuard {
    fn new(bus: Arc<dyn EventBus>) -> Self {
        Self { bus, subscriptions: Vec::with_capacity(2) }
    }

    fn subscribe(&mut self, event_type: &'static str, handler: EventHandler) {
        let id = self.bus.subscribe(event_type, handler);
        self.subscriptions.push((event_type, id));
    }
}

impl Drop for ListenerGuard {
    fn drop(&mut self) {
        for (event_type, id) in self.subscriptions.drain(..) {
            self.bus.unsubscribe(event_type, id);
        }
    }
}

fn payload_text(payload: &Value) -> Option<String> {
    payload.get("text").and_then(Value::as_str).map(str::to_string)
}

/// Publishes drafts for verification and waits for the verdict.
#[derive(Clone)]
pub struct Supervisor {
    bus: Arc<dyn EventBus>,
    timeout: Duration,
}

impl Supervisor {
    pub fn new(bus: Arc<dyn EventBus>, timeout: Duration) -> Self {
        Self { bus, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub async fn verify(
        &self,
        draft: &str,
        language: Language,
        session_id: Option<&str>,
    ) -> Verification {
        let request = SupervisionRequest::new(draft, language, session_id);
        let (sender, mut receiver) = oneshot::channel();
        let settlement = Arc::new(Settlement::new(sender));

        let mut guard = ListenerGuard::new(Arc::clone(&self.bus));
        guard.subscribe(APPROVED_EVENT, {
            let correlation_id = request.correlation_id.clone();
            let draft = request.draft.clone();
            let settlement = Arc::clone(&settlement);
            Arc::new(move |event: &Event| {
                if event.metadata.correlation_id != correlation_id {
                    return;
                }
                let text = payload_text(&event.payload).unwrap_or_else(|| draft.clone());
                settlement.settle(Some(Outcome::Approved { text }));
            })
        });
        guard.subscribe(CORRECTED_EVENT, {
            let correlation_id = request.correlation_id.clone();
            let draft = request.draft.clone();
            let settlement = Arc::clone(&settlement);
            Arc::new(move |event: &Event| {
                if event.metadata.correlation_id != correlation_id {
                    return;
                }
                let text = payload_text(&event.payload).unwrap_or_else(|| draft.clone());
                let reason =
                    event.payload.get("reason").and_then(Value::as_str).map(str::to_string);
                settlement.settle(Some(Outcome::Corrected { text, reason }));
            })
        });

        self.bus.publish(
            CHECK_EVENT,
            request.check_payload(),
            EventMetadata::correlated(&request.correlation_id).with_priority(Priority::High),
        );

        let outcome = match tokio::time::timeout(self.timeout, &mut receiver).await {
            Ok(received) => received.ok(),
            Err(_elapsed) => {
                if settlement.settle(None) {
                    None
                } else {
                    // A listener settled between the deadline firing and now.
                    receiver.try_recv().ok()
                }
            }
        };
        drop(guard);

        self.finish(&request, outcome)
    }

    fn finish(&self, request: &SupervisionRequest, outcome: Option<Outcome>) -> Verification {
        let latency_ms = request.created_at.elapsed().as_millis() as u64;
        let (state, text, original_text, reason) = match outcome {
            Some(Outcome::Approved { text }) => (SupervisionState::Approved, text, None, None),
            Some(Outcome::Corrected { text, reason }) => {
                (SupervisionState::Corrected, text, Some(request.draft.clone()), reason)
            }
            None => (SupervisionState::TimedOut, request.draft.clone(), None, None),
        };

        if state == SupervisionState::TimedOut {
            warn!(
                event_name = "agent.supervision.timed_out",
                correlation_id = %request.correlation_id,
                timeout_ms = self.timeout.as_millis() as u64,
                "supervision did not answer in time, passing draft through"
            );
        } else {
            debug!(
                event_name = "agent.supervision.settled",
                correlation_id = %request.correlation_id,
                state = ?state,
                latency_ms,
                reason = reason.as_deref().unwrap_or(""),
                "supervision round settled"
            );
        }

        Verification {
            state,
            text,
            original_text,
            reason,
            latency_ms,
            correlation_id: request.correlation_id.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use parley_core::Language;
    use serde_json::json;
    use tokio::sync::oneshot;

    use super::{
        next_correlation_id, Outcome, Settlement, SupervisionState, Supervisor, APPROVED_EVENT,
        CHECK_EVENT, CORRECTED_EVENT,
    };
    use crate::bus::{Event, EventBus, EventMetadata, InMemoryBus, Priority};

    const TIMEOUT: Duration = Duration::from_millis(1_500);

    fn supervisor(bus: &Arc<InMemoryBus>) -> Supervisor {
        Supervisor::new(Arc::clone(bus) as Arc<dyn EventBus>, TIMEOUT)
    }

    fn assert_no_listeners(bus: &InMemoryBus) {
        assert_eq!(bus.listener_count(APPROVED_EVENT), 0);
        assert_eq!(bus.listener_count(CORRECTED_EVENT), 0);
    }

    /// Answers every check request from a spawned task after `delay`.
    fn answer_after(bus: &Arc<InMemoryBus>, delay: Duration, event_type: &'static str) {
        let responder = Arc::clone(bus);
        bus.subscribe(
            CHECK_EVENT,
            Arc::new(move |event: &Event| {
                let responder = Arc::clone(&responder);
                let metadata = event.metadata.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    responder.publish(event_type, json!({ "text": "late" }), metadata);
                });
            }),
        );
    }

    #[tokio::test(start_paused = true)]
    async fn approved_event_settles_with_supervisor_text() {
        let bus = Arc::new(InMemoryBus::new());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let responder = Arc::clone(&bus);
        bus.subscribe(
            CHECK_EVENT,
            Arc::new(move |event: &Event| {
                sink.lock().expect("seen lock").push(event.clone());
                responder.publish(
                    APPROVED_EVENT,
                    json!({ "text": "Bonjour, comment puis-je aider ?" }),
                    event.metadata.clone(),
                );
            }),
        );

        let verification = supervisor(&bus)
            .verify("**Bonjour**, comment puis-je aider ?", Language::Fr, Some("s-1"))
            .await;

        assert_eq!(verification.state, SupervisionState::Approved);
        assert_eq!(verification.text, "Bonjour, comment puis-je aider ?");
        assert_eq!(verification.original_text, None);
        assert_eq!(verification.latency_ms, 0);

        let seen = seen.lock().expect("seen lock");
        assert_eq!(seen[0].payload["language"], "fr");
        assert_eq!(seen[0].payload["session_id"], "s-1");
        assert_eq!(seen[0].metadata.priority, Priority::High);
        assert_eq!(seen[0].metadata.correlation_id, verification.correlation_id);
        assert_no_listeners(&bus);
    }

    #[tokio::test(start_paused = true)]
    async fn corrected_event_keeps_original_draft() {
        let bus = Arc::new(InMemoryBus::new());
        let responder = Arc::clone(&bus);
        bus.subscribe(
            CHECK_EVENT,
            Arc::new(move |event: &Event| {
                responder.publish(
                    CORRECTED_EVENT,
                    json!({ "text": "Salam, kifach n3awnek?", "reason": "darija_enforcement" }),
                    event.metadata.clone(),
                );
            }),
        );

        let verification =
            supervisor(&bus).verify("Bonjour, kifach n3awnek?", Language::Ary, None).await;

        assert_eq!(verification.state, SupervisionState::Corrected);
        assert_eq!(verification.text, "Salam, kifach n3awnek?");
        assert_eq!(verification.original_text.as_deref(), Some("Bonjour, kifach n3awnek?"));
        assert_eq!(verification.reason.as_deref(), Some("darija_enforcement"));
        assert_no_listeners(&bus);
    }

    #[tokio::test(start_paused = true)]
    async fn events_for_other_rounds_are_ignored() {
        let bus = Arc::new(InMemoryBus::new());
        let responder = Arc::clone(&bus);
        bus.subscribe(
            CHECK_EVENT,
            Arc::new(move |_: &Event| {
                responder.publish(
                    APPROVED_EVENT,
                    json!({ "text": "not yours" }),
                    EventMetadata::correlated("sup-other"),
                );
            }),
        );

        let verification = supervisor(&bus).verify("draft", Language::En, None).await;

        assert_eq!(verification.state, SupervisionState::TimedOut);
        assert_eq!(verification.text, "draft");
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_passes_draft_through_and_cleans_up() {
        let bus = Arc::new(InMemoryBus::new());

        let verification = supervisor(&bus).verify("Hello there", Language::En, None).await;

        assert_eq!(verification.state, SupervisionState::TimedOut);
        assert_eq!(verification.text, "Hello there");
        assert!(verification.latency_ms >= TIMEOUT.as_millis() as u64);
        assert_no_listeners(&bus);
    }

    #[tokio::test(start_paused = true)]
    async fn late_answer_after_timeout_is_dropped() {
        let bus = Arc::new(InMemoryBus::new());
        answer_after(&bus, TIMEOUT * 2, APPROVED_EVENT);

        let verification = supervisor(&bus).verify("draft", Language::Fr, None).await;
        assert_eq!(verification.state, SupervisionState::TimedOut);

        tokio::time::sleep(TIMEOUT * 2).await;
        assert_no_listeners(&bus);
    }

    #[tokio::test(start_paused = true)]
    async fn answer_and_timeout_in_same_tick_settle_once() {
        let bus = Arc::new(InMemoryBus::new());
        answer_after(&bus, TIMEOUT, APPROVED_EVENT);

        let verification = supervisor(&bus).verify("draft", Language::Fr, None).await;

        match verification.state {
            SupervisionState::Approved => assert_eq!(verification.text, "late"),
            SupervisionState::TimedOut => assert_eq!(verification.text, "draft"),
            other => panic!("unexpected state {other:?}"),
        }
        tokio::task::yield_now().await;
        assert_no_listeners(&bus);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_round_removes_listeners() {
        let bus = Arc::new(InMemoryBus::new());
        let supervisor = supervisor(&bus);

        let cancelled = tokio::time::timeout(
            Duration::from_millis(10),
            supervisor.verify("draft", Language::Fr, None),
        )
        .await;

        assert!(cancelled.is_err());
        assert_no_listeners(&bus);
    }

    #[test]
    fn settlement_only_accepts_first_outcome() {
        let (sender, mut receiver) = oneshot::channel();
        let settlement = Settlement::new(sender);

        assert!(settlement.settle(Some(Outcome::Approved { text: "first".to_string() })));
        assert!(!settlement.settle(None));
        let late = Outcome::Corrected { text: "x".to_string(), reason: None };
        assert!(!settlement.settle(Some(late)));

        match receiver.try_recv() {
            Ok(Outcome::Approved { text }) => assert_eq!(text, "first"),
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[test]
    fn correlation_ids_are_unique_across_threads() {
        let ids = Mutex::new(HashSet::new());
        std::thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(|| {
                    let batch: Vec<String> = (0..500).map(|_| next_correlation_id()).collect();
                    ids.lock().expect("id lock").extend(batch);
                });
            }
        });

        let ids = ids.into_inner().expect("id lock");
        assert_eq!(ids.len(), 8 * 500);
        assert!(ids.iter().all(|id| id.starts_with("sup-")));
    }
}
