//! Tool-call intent gate.
//!
//! Every tool call gets exactly one acknowledgement. At most one accepted
//! intent is processed at a time, and calls that repeat a recent intent
//! (same words, same action and target, or simply too soon) are skipped.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tokio::time::Instant;

use super::{BrowserAction, ConversationSink, Intent, IntentError, IntentSink, QueryRequest};
use crate::core::live::{BROWSER_ACTION_TOOL, FunctionCall, FunctionResponse};

pub const DEFAULT_TEXT_WINDOW_MS: u64 = 2000;
pub const DEFAULT_ACTION_WINDOW_MS: u64 = 3500;
pub const DEFAULT_THROTTLE_INTERVAL_MS: u64 = 1000;
pub const DEFAULT_SIDE_EFFECT_TIMEOUT_MS: u64 = 15_000;
pub const DEFAULT_LOCK_RELEASE_DELAY_MS: u64 = 1000;

/// Duplicate windows and timeouts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    /// Same raw text within this window is a duplicate (ms)
    pub text_window_ms: u64,
    /// Same action and target within this window is a duplicate (ms)
    pub action_window_ms: u64,
    /// Minimum spacing between acceptances (ms)
    pub throttle_interval_ms: u64,
    /// Upper bound on the backend call (ms)
    pub side_effect_timeout_ms: u64,
    /// Lock hold time after the acknowledgement (ms)
    pub lock_release_delay_ms: u64,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            text_window_ms: DEFAULT_TEXT_WINDOW_MS,
            action_window_ms: DEFAULT_ACTION_WINDOW_MS,
            throttle_interval_ms: DEFAULT_THROTTLE_INTERVAL_MS,
            side_effect_timeout_ms: DEFAULT_SIDE_EFFECT_TIMEOUT_MS,
            lock_release_delay_ms: DEFAULT_LOCK_RELEASE_DELAY_MS,
        }
    }
}

impl GateConfig {
    fn text_window(&self) -> Duration {
        Duration::from_millis(self.text_window_ms)
    }

    fn action_window(&self) -> Duration {
        Duration::from_millis(self.action_window_ms)
    }

    fn throttle_interval(&self) -> Duration {
        Duration::from_millis(self.throttle_interval_ms)
    }

    fn side_effect_timeout(&self) -> Duration {
        Duration::from_millis(self.side_effect_timeout_ms)
    }

    fn lock_release_delay(&self) -> Duration {
        Duration::from_millis(self.lock_release_delay_ms)
    }
}

/// Why a call was not acted on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    DuplicateText,
    DuplicateTarget,
    InFlight,
    Throttled,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DuplicateText => "duplicate_text",
            Self::DuplicateTarget => "duplicate_target",
            Self::InFlight => "in_flight",
            Self::Throttled => "throttled",
        }
    }
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Accept,
    Skip(SkipReason),
}

/// Memory of the most recently accepted intent.
#[derive(Debug, Default)]
pub struct DuplicateTracker {
    last_text: Option<(String, Instant)>,
    last_key: Option<(String, Instant)>,
    last_accept: Option<Instant>,
}

impl DuplicateTracker {
    /// Classify `action` against the last acceptance. `locked` reports an
    /// intent still being processed.
    pub fn evaluate(
        &self,
        config: &GateConfig,
        action: &BrowserAction,
        locked: bool,
        now: Instant,
    ) -> Decision {
        let within = |at: Instant, window: Duration| now.saturating_duration_since(at) < window;

        if let Some((text, at)) = &self.last_text
            && !action.raw_text.is_empty()
            && *text == action.raw_text
            && within(*at, config.text_window())
        {
            return Decision::Skip(SkipReason::DuplicateText);
        }
        if let Some((key, at)) = &self.last_key
            && *key == action.key()
            && within(*at, config.action_window())
        {
            return Decision::Skip(SkipReason::DuplicateTarget);
        }
        if locked {
            return Decision::Skip(SkipReason::InFlight);
        }
        if let Some(at) = self.last_accept
            && within(at, config.throttle_interval())
        {
            return Decision::Skip(SkipReason::Throttled);
        }
        Decision::Accept
    }

    pub fn record(&mut self, action: &BrowserAction, now: Instant) {
        if !action.raw_text.is_empty() {
            self.last_text = Some((action.raw_text.clone(), now));
        }
        self.last_key = Some((action.key(), now));
        self.last_accept = Some(now);
    }
}

/// What the gate did with a call.
#[derive(Debug, Clone, PartialEq)]
pub enum GateOutcome {
    Accepted(Intent),
    Skipped { call_id: String, reason: SkipReason },
    /// Unknown function or unusable arguments
    Rejected { call_id: String, error: String },
    Completed { call_id: String, text: String },
    Failed { call_id: String, error: String },
    Cancelled { call_id: String },
}

#[derive(Debug, Default)]
enum Lock {
    #[default]
    Free,
    Processing {
        call_id: String,
        generation: u64,
        task: Option<AbortHandle>,
    },
    Releasing {
        generation: u64,
    },
}

#[derive(Debug, Default)]
struct GateState {
    tracker: DuplicateTracker,
    lock: Lock,
    generation: u64,
    log: Vec<Intent>,
}

struct GateInner {
    config: GateConfig,
    sink: Arc<dyn IntentSink>,
    conversation: Arc<dyn ConversationSink>,
    state: Mutex<GateState>,
    outcomes: mpsc::UnboundedSender<GateOutcome>,
}

/// Serializes browser intents coming from model tool calls.
#[derive(Clone)]
pub struct IntentGate {
    inner: Arc<GateInner>,
}

impl IntentGate {
    pub fn new(
        config: GateConfig,
        sink: Arc<dyn IntentSink>,
        conversation: Arc<dyn ConversationSink>,
    ) -> (Self, mpsc::UnboundedReceiver<GateOutcome>) {
        let (outcomes, rx) = mpsc::unbounded_channel();
        let inner = GateInner {
            config,
            sink,
            conversation,
            state: Mutex::new(GateState::default()),
            outcomes,
        };
        (
            Self {
                inner: Arc::new(inner),
            },
            rx,
        )
    }

    /// Handle the calls of one `toolCall` frame, in order.
    pub async fn handle_calls(&self, calls: Vec<FunctionCall>) {
        for call in calls {
            self.handle_call(call).await;
        }
    }

    pub async fn handle_call(&self, call: FunctionCall) {
        let inner = &self.inner;

        if call.name != BROWSER_ACTION_TOOL {
            let error = format!("unknown function: {}", call.name);
            tracing::warn!(call_id = %call.id, "{}", error);
            inner.acknowledge(&call, error_payload(&error)).await;
            inner.emit(GateOutcome::Rejected {
                call_id: call.id,
                error,
            });
            return;
        }

        let action = match BrowserAction::from_args(&call.args) {
            Ok(action) => action,
            Err(e) => {
                tracing::warn!(call_id = %call.id, "Rejecting tool call: {}", e);
                inner.acknowledge(&call, error_payload(&e.to_string())).await;
                inner.emit(GateOutcome::Rejected {
                    call_id: call.id,
                    error: e.to_string(),
                });
                return;
            }
        };

        let now = Instant::now();
        let accepted = {
            let mut state = inner.state.lock();
            let locked = !matches!(state.lock, Lock::Free);
            match state.tracker.evaluate(&inner.config, &action, locked, now) {
                Decision::Skip(reason) => Err(reason),
                Decision::Accept => {
                    state.tracker.record(&action, now);
                    state.generation += 1;
                    let generation = state.generation;
                    state.lock = Lock::Processing {
                        call_id: call.id.clone(),
                        generation,
                        task: None,
                    };
                    let intent = Intent::new(&call.id, &action);
                    state.log.push(intent.clone());
                    Ok((intent, generation))
                }
            }
        };

        let (intent, generation) = match accepted {
            Ok(accepted) => accepted,
            Err(reason) => {
                tracing::info!(
                    call_id = %call.id,
                    action = %action.action,
                    reason = %reason,
                    "Skipping tool call"
                );
                inner
                    .acknowledge(&call, json!({"status": "skipped", "reason": reason.as_str()}))
                    .await;
                inner.emit(GateOutcome::Skipped {
                    call_id: call.id,
                    reason,
                });
                return;
            }
        };

        tracing::info!(
            call_id = %call.id,
            action = %intent.action,
            target = %intent.target,
            "Accepted browser intent"
        );
        inner.emit(GateOutcome::Accepted(intent));

        let task_inner = inner.clone();
        let request = QueryRequest::from(&action);
        let handle = tokio::spawn(async move {
            task_inner.process(call, request, generation).await;
        });

        let mut state = inner.state.lock();
        if let Lock::Processing {
            generation: current,
            task,
            ..
        } = &mut state.lock
            && *current == generation
        {
            *task = Some(handle.abort_handle());
        }
    }

    /// Drop pending calls named in a `toolCallCancellation`. A cancelled
    /// call is not acknowledged and frees the lock.
    pub fn cancel(&self, ids: &[String]) {
        let inner = &self.inner;
        let cancelled = {
            let mut state = inner.state.lock();
            match &state.lock {
                Lock::Processing { call_id, task, .. } if ids.contains(call_id) => {
                    if let Some(task) = task {
                        task.abort();
                    }
                    let call_id = call_id.clone();
                    state.lock = Lock::Free;
                    Some(call_id)
                }
                _ => None,
            }
        };

        if let Some(call_id) = cancelled {
            tracing::info!(call_id = %call_id, "Tool call cancelled");
            inner.emit(GateOutcome::Cancelled { call_id });
        }
    }

    /// Abort any in-flight side effect.
    pub fn shutdown(&self) {
        let mut state = self.inner.state.lock();
        if let Lock::Processing {
            task: Some(task), ..
        } = &state.lock
        {
            task.abort();
        }
        state.lock = Lock::Free;
    }

    /// True while an intent is processed or its lock has not been released.
    pub fn is_locked(&self) -> bool {
        !matches!(self.inner.state.lock().lock, Lock::Free)
    }

    /// Accepted intents, oldest first.
    pub fn intents(&self) -> Vec<Intent> {
        self.inner.state.lock().log.clone()
    }
}

impl GateInner {
    async fn process(self: Arc<Self>, call: FunctionCall, request: QueryRequest, generation: u64) {
        let result = match tokio::time::timeout(
            self.config.side_effect_timeout(),
            self.sink.submit(&request),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(IntentError::Timeout(self.config.side_effect_timeout_ms)),
        };

        {
            let mut state = self.state.lock();
            match state.lock {
                Lock::Processing {
                    generation: current,
                    ..
                } if current == generation => {
                    state.lock = Lock::Releasing { generation };
                }
                // cancelled while the request was in flight
                _ => return,
            }
        }

        match result {
            Ok(response) => {
                self.acknowledge(&call, json!({"status": "success", "result": response.text}))
                    .await;
                if !response.text.is_empty()
                    && let Err(e) = self.conversation.send_update(&response.text).await
                {
                    tracing::warn!("Failed to forward intent update: {}", e);
                }
                self.emit(GateOutcome::Completed {
                    call_id: call.id,
                    text: response.text,
                });
            }
            Err(e) => {
                tracing::warn!(call_id = %call.id, "Browser intent failed: {}", e);
                self.acknowledge(&call, error_payload(&e.to_string())).await;
                self.emit(GateOutcome::Failed {
                    call_id: call.id,
                    error: e.to_string(),
                });
            }
        }

        tokio::time::sleep(self.config.lock_release_delay()).await;

        let mut state = self.state.lock();
        if matches!(state.lock, Lock::Releasing { generation: current } if current == generation) {
            state.lock = Lock::Free;
            tracing::debug!("Intent lock released");
        }
    }

    async fn acknowledge(&self, call: &FunctionCall, response: Value) {
        let ack = FunctionResponse {
            id: call.id.clone(),
            name: Some(call.name.clone()),
            response,
        };
        if let Err(e) = self.conversation.send_tool_response(vec![ack]).await {
            tracing::warn!(call_id = %call.id, "Failed to acknowledge tool call: {}", e);
        }
    }

    fn emit(&self, outcome: GateOutcome) {
        let _ = self.outcomes.send(outcome);
    }
}

fn error_payload(error: &str) -> Value {
    json!({"status": "error", "error": error})
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::intent::QueryResponse;
    use crate::core::live::LiveError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeBackend {
        calls: AtomicUsize,
        delay: Duration,
        fail: bool,
    }

    impl FakeBackend {
        fn new() -> Arc<Self> {
            Self::with(Duration::ZERO, false)
        }

        fn with(delay: Duration, fail: bool) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                delay,
                fail,
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl IntentSink for FakeBackend {
        async fn submit(&self, request: &QueryRequest) -> Result<QueryResponse, IntentError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            if self.fail {
                return Err(IntentError::Status {
                    status: 500,
                    body: "boom".to_string(),
                });
            }
            Ok(QueryResponse {
                text: format!("done: {}", request.action),
                agent_address: None,
            })
        }
    }

    #[derive(Default)]
    struct FakeConversation {
        acks: Mutex<Vec<FunctionResponse>>,
        updates: Mutex<Vec<String>>,
    }

    impl FakeConversation {
        fn ack_status(&self, id: &str) -> Vec<String> {
            self.acks
                .lock()
                .iter()
                .filter(|a| a.id == id)
                .map(|a| a.response["status"].as_str().unwrap_or_default().to_string())
                .collect()
        }
    }

    #[async_trait]
    impl ConversationSink for FakeConversation {
        async fn send_tool_response(
            &self,
            responses: Vec<FunctionResponse>,
        ) -> Result<(), LiveError> {
            self.acks.lock().extend(responses);
            Ok(())
        }

        async fn send_update(&self, text: &str) -> Result<(), LiveError> {
            self.updates.lock().push(text.to_string());
            Ok(())
        }
    }

    fn call(id: &str, action: &str, target: &str, raw_text: &str) -> FunctionCall {
        FunctionCall {
            id: id.to_string(),
            name: BROWSER_ACTION_TOOL.to_string(),
            args: json!({"action": action, "target": target, "rawText": raw_text}),
        }
    }

    fn gate(
        config: GateConfig,
        backend: Arc<FakeBackend>,
    ) -> (IntentGate, Arc<FakeConversation>, mpsc::UnboundedReceiver<GateOutcome>) {
        let conversation = Arc::new(FakeConversation::default());
        let (gate, rx) = IntentGate::new(config, backend, conversation.clone());
        (gate, conversation, rx)
    }

    async fn advance(ms: u64) {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }

    #[test]
    fn test_tracker_checks() {
        let config = GateConfig::default();
        let mut tracker = DuplicateTracker::default();
        let t0 = Instant::now();
        let first = BrowserAction::from_args(&json!({
            "action": "SEARCH", "target": "pizza", "rawText": "find pizza"
        }))
        .unwrap();
        assert_eq!(tracker.evaluate(&config, &first, false, t0), Decision::Accept);
        tracker.record(&first, t0);

        let reworded = BrowserAction {
            raw_text: "look up pizza".to_string(),
            ..first.clone()
        };
        let other = BrowserAction::from_args(&json!({
            "action": "OPEN", "target": "mail", "rawText": "open my mail"
        }))
        .unwrap();

        let at = |ms| t0 + Duration::from_millis(ms);
        assert_eq!(
            tracker.evaluate(&config, &first, false, at(1999)),
            Decision::Skip(SkipReason::DuplicateText)
        );
        assert_eq!(
            tracker.evaluate(&config, &reworded, false, at(3000)),
            Decision::Skip(SkipReason::DuplicateTarget)
        );
        assert_eq!(
            tracker.evaluate(&config, &reworded, false, at(3500)),
            Decision::Accept
        );
        assert_eq!(
            tracker.evaluate(&config, &other, false, at(500)),
            Decision::Skip(SkipReason::Throttled)
        );
        assert_eq!(
            tracker.evaluate(&config, &other, true, at(5000)),
            Decision::Skip(SkipReason::InFlight)
        );
        assert_eq!(tracker.evaluate(&config, &other, false, at(1000)), Decision::Accept);
    }

    #[tokio::test(start_paused = true)]
    async fn test_same_target_reworded_calls_backend_once() {
        let backend = FakeBackend::new();
        let (gate, conversation, _rx) = gate(GateConfig::default(), backend.clone());

        gate.handle_call(call("c1", "SEARCH", "pizza", "search for pizza"))
            .await;
        advance(1000).await;
        gate.handle_call(call("c2", "SEARCH", "pizza", "find me some pizza"))
            .await;
        advance(3000).await;

        assert_eq!(backend.calls(), 1);
        assert_eq!(conversation.ack_status("c1"), vec!["success"]);
        assert_eq!(conversation.ack_status("c2"), vec!["skipped"]);
        let acks = conversation.acks.lock();
        let skipped = acks.iter().find(|a| a.id == "c2").unwrap();
        assert_eq!(skipped.response["reason"], "duplicate_target");
    }

    #[tokio::test(start_paused = true)]
    async fn test_same_text_within_window_is_duplicate() {
        let backend = FakeBackend::new();
        let (gate, conversation, _rx) = gate(GateConfig::default(), backend.clone());

        gate.handle_call(call("c1", "OPEN", "news", "open the news"))
            .await;
        advance(1500).await;
        gate.handle_call(call("c2", "NAVIGATE", "news site", "open the news"))
            .await;
        advance(100).await;

        assert_eq!(backend.calls(), 1);
        assert_eq!(conversation.ack_status("c2"), vec!["skipped"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_in_flight_calls_are_skipped() {
        let backend = FakeBackend::with(Duration::from_secs(2), false);
        let (gate, conversation, _rx) = gate(GateConfig::default(), backend.clone());

        gate.handle_call(call("c1", "OPEN", "mail", "open mail")).await;
        advance(1500).await;
        assert!(gate.is_locked());
        gate.handle_call(call("c2", "SEARCH", "flights", "search flights"))
            .await;

        // c2 is answered right away, c1 once the backend returns
        assert_eq!(conversation.ack_status("c2"), vec!["skipped"]);
        assert!(conversation.ack_status("c1").is_empty());

        advance(600).await;
        assert_eq!(conversation.ack_status("c1"), vec!["success"]);
        assert!(gate.is_locked());
        advance(1000).await;
        assert!(!gate.is_locked());
        assert_eq!(backend.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_distinct_call_accepted_after_release() {
        let backend = FakeBackend::new();
        let (gate, conversation, _rx) = gate(GateConfig::default(), backend.clone());

        gate.handle_call(call("c1", "OPEN", "mail", "open mail")).await;
        advance(1100).await;
        gate.handle_call(call("c2", "SEARCH", "flights", "search flights"))
            .await;
        advance(10).await;

        assert_eq!(backend.calls(), 2);
        assert_eq!(conversation.ack_status("c2"), vec!["success"]);
        assert_eq!(gate.intents().len(), 2);
        assert_eq!(
            *conversation.updates.lock(),
            vec!["done: OPEN".to_string(), "done: SEARCH".to_string()]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_throttle_without_lock_hold() {
        let config = GateConfig {
            lock_release_delay_ms: 0,
            ..Default::default()
        };
        let backend = FakeBackend::new();
        let (gate, conversation, _rx) = gate(config, backend.clone());

        gate.handle_call(call("c1", "OPEN", "mail", "open mail")).await;
        advance(300).await;
        gate.handle_call(call("c2", "SEARCH", "flights", "search flights"))
            .await;

        let acks = conversation.acks.lock();
        let skipped = acks.iter().find(|a| a.id == "c2").unwrap();
        assert_eq!(skipped.response["reason"], "throttled");
        assert_eq!(backend.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backend_failure_still_acknowledged() {
        let backend = FakeBackend::with(Duration::ZERO, true);
        let (gate, conversation, mut rx) = gate(GateConfig::default(), backend.clone());

        gate.handle_call(call("c1", "OPEN", "mail", "open mail")).await;
        advance(10).await;

        assert_eq!(conversation.ack_status("c1"), vec!["error"]);
        assert!(conversation.updates.lock().is_empty());
        assert!(matches!(rx.recv().await, Some(GateOutcome::Accepted(_))));
        assert!(matches!(rx.recv().await, Some(GateOutcome::Failed { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_side_effect_timeout() {
        let backend = FakeBackend::with(Duration::from_secs(60), false);
        let (gate, conversation, _rx) = gate(GateConfig::default(), backend.clone());

        gate.handle_call(call("c1", "OPEN", "mail", "open mail")).await;
        advance(14_900).await;
        assert!(conversation.ack_status("c1").is_empty());
        advance(200).await;

        let acks = conversation.acks.lock();
        assert_eq!(acks.len(), 1);
        assert_eq!(acks[0].response["status"], "error");
        assert!(
            acks[0].response["error"]
                .as_str()
                .unwrap()
                .contains("timed out")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_arguments_rejected_without_side_effect() {
        let backend = FakeBackend::new();
        let (gate, conversation, _rx) = gate(GateConfig::default(), backend.clone());

        gate.handle_call(FunctionCall {
            id: "c1".to_string(),
            name: BROWSER_ACTION_TOOL.to_string(),
            args: json!({"target": "mail"}),
        })
        .await;
        gate.handle_call(FunctionCall {
            id: "c2".to_string(),
            name: "get_weather".to_string(),
            args: json!({}),
        })
        .await;

        assert_eq!(backend.calls(), 0);
        assert!(!gate.is_locked());
        assert_eq!(conversation.ack_status("c1"), vec!["error"]);
        assert_eq!(conversation.ack_status("c2"), vec!["error"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_call_is_not_acknowledged() {
        let backend = FakeBackend::with(Duration::from_secs(5), false);
        let (gate, conversation, mut rx) = gate(GateConfig::default(), backend.clone());

        gate.handle_call(call("c1", "OPEN", "mail", "open mail")).await;
        advance(100).await;
        gate.cancel(&["c1".to_string()]);
        assert!(!gate.is_locked());

        advance(6000).await;
        assert!(conversation.acks.lock().is_empty());
        assert!(matches!(rx.recv().await, Some(GateOutcome::Accepted(_))));
        assert_eq!(
            rx.recv().await,
            Some(GateOutcome::Cancelled {
                call_id: "c1".to_string()
            })
        );

        // unrelated ids are ignored
        gate.cancel(&["nope".to_string()]);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_each_call_in_frame_acknowledged_once() {
        let backend = FakeBackend::new();
        let (gate, conversation, _rx) = gate(GateConfig::default(), backend.clone());

        gate.handle_calls(vec![
            call("a", "OPEN", "mail", "open mail"),
            call("b", "OPEN", "mail", "open mail"),
            call("c", "SEARCH", "news", "search news"),
        ])
        .await;
        advance(2000).await;

        let acks = conversation.acks.lock();
        assert_eq!(acks.len(), 3);
        for id in ["a", "b", "c"] {
            assert_eq!(acks.iter().filter(|a| a.id == id).count(), 1);
        }
        assert_eq!(backend.calls(), 1);
    }
}
