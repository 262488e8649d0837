//! Task Dispatcher: bulkhead-isolated concurrent execution
//!
//! ```text
//! routed tags ──▶ plan (snapshot.select / general / fallback)
//!                   │
//!                   ▼
//!   JoinSet::spawn(task_i) × N      Semaphore(min(N, max_concurrency))
//!     each task: acquire permit, then deadline_i = min(now + timeout_i, global)
//!                select! { cancel | sleep_until(deadline_i) | handler (catch_unwind) }
//!                   │
//!   join_next until all terminal ── or global deadline ──▶ abort_all, mark timeout
//!                   │
//!                   ▼
//!   Vec<TaskResult> in routing order ──▶ feedback queue (try_send)
//! ```
//!
//! One task failing, panicking, or hanging never affects its siblings: each
//! runs in its own spawned task with its own deadline and child
//! cancellation token.

pub mod handler;
pub mod task;

pub use handler::{CapabilityHandler, HandlerError, HandlerSet, SharedHandler};
pub use task::{Task, TaskId, TaskPayload, TaskResult, TaskStatus};

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::capability::CapabilityTag;
use crate::config::DispatchConfig;
use crate::feedback::FeedbackSender;
use crate::handlers::FallbackHandler;
use crate::registry::RegistrySnapshot;
use crate::request::Request;
use crate::router::RoutedTag;

/// A task with its handler, before it holds a concurrency permit.
#[derive(Clone)]
pub struct PlannedTask {
    pub task: Task,
    pub handler: SharedHandler,
    /// Capability timeout; the clock starts once the permit is held
    pub timeout: Duration,
    pub global_deadline: Instant,
}

/// Runs the tasks for one request.
#[derive(Clone)]
pub struct Dispatcher {
    handlers: Arc<HandlerSet>,
    fallback: SharedHandler,
    config: DispatchConfig,
    feedback: Option<FeedbackSender>,
}

impl Dispatcher {
    pub fn new(handlers: Arc<HandlerSet>, config: DispatchConfig) -> Self {
        Self {
            handlers,
            fallback: Arc::new(FallbackHandler::default()),
            config,
            feedback: None,
        }
    }

    /// Forward every terminal result to the feedback loop.
    pub fn with_feedback(mut self, feedback: FeedbackSender) -> Self {
        self.feedback = Some(feedback);
        self
    }

    /// Replace the built-in handler used when no agent serves a tag.
    pub fn with_fallback(mut self, fallback: SharedHandler) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    /// Build one task per routed tag against `snapshot`.
    pub fn plan(
        &self,
        request: &Request,
        routed: &[RoutedTag],
        snapshot: &RegistrySnapshot,
        global_deadline: Instant,
    ) -> Vec<PlannedTask> {
        routed
            .iter()
            .map(|r| {
                let (agent_id, capability_tag, handler) = self.select(&r.tag, snapshot);
                let task = Task {
                    id: uuid::Uuid::new_v4().to_string(),
                    request_id: request.id().to_string(),
                    agent_id,
                    capability_tag,
                    requested_tag: r.tag.clone(),
                    deadline: global_deadline,
                };
                PlannedTask {
                    task,
                    handler,
                    // Overrides are keyed by the routed tag, fallback or not.
                    timeout: self.config.task_timeout(&r.tag),
                    global_deadline,
                }
            })
            .collect()
    }

    /// Routed tag, then `general`, then the built-in fallback.
    fn select(
        &self,
        tag: &CapabilityTag,
        snapshot: &RegistrySnapshot,
    ) -> (String, CapabilityTag, SharedHandler) {
        let general = CapabilityTag::general();
        for candidate in [tag, &general] {
            let Some(descriptor) = snapshot.select(candidate) else {
                continue;
            };
            match self.handlers.get(&descriptor.id) {
                Some(handler) => {
                    return (descriptor.id.clone(), candidate.clone(), handler.clone());
                }
                None => {
                    warn!(agent_id = %descriptor.id, tag = %candidate, "registered agent has no handler");
                }
            }
        }

        debug!(tag = %tag, agent_id = self.fallback.id(), "no agent for tag, using fallback handler");
        (self.fallback.id().to_string(), general, self.fallback.clone())
    }

    /// Execute every routed tag concurrently and return one result per tag,
    /// in routing order.
    pub async fn dispatch(
        &self,
        request: &Request,
        routed: &[RoutedTag],
        snapshot: &RegistrySnapshot,
        global_deadline: Instant,
        cancel: &CancellationToken,
    ) -> Vec<TaskResult> {
        let planned = self.plan(request, routed, snapshot, global_deadline);
        let tasks: Vec<Task> = planned.iter().map(|p| p.task.clone()).collect();
        let permits = planned.len().min(self.config.max_concurrency).max(1);

        info!(
            request_id = request.id(),
            tasks = planned.len(),
            permits,
            snapshot_version = snapshot.version(),
            "dispatching tasks"
        );

        let semaphore = Arc::new(Semaphore::new(permits));
        let request = Arc::new(request.clone());
        let started = Instant::now();
        let mut slots: Vec<Option<TaskResult>> = vec![None; planned.len()];
        let mut join_set: JoinSet<(usize, TaskResult)> = JoinSet::new();

        for (index, planned) in planned.into_iter().enumerate() {
            let semaphore = semaphore.clone();
            let request = request.clone();
            let token = cancel.child_token();
            join_set.spawn(async move {
                let result = run_task(planned, request, token, semaphore).await;
                (index, result)
            });
        }

        loop {
            tokio::select! {
                next = join_set.join_next() => match next {
                    Some(Ok((index, result))) => {
                        debug!(
                            task_id = result.task_id(),
                            agent_id = result.agent_id(),
                            status = %result.status(),
                            latency_ms = result.latency_ms(),
                            "task terminal"
                        );
                        slots[index] = Some(result);
                    }
                    Some(Err(e)) => {
                        warn!(error = %e, "task join failed");
                    }
                    None => break,
                },
                _ = sleep_until(global_deadline) => {
                    warn!(request_id = request.id(), outstanding = join_set.len(), "global deadline reached, abandoning tasks");
                    join_set.abort_all();
                    break;
                }
                _ = cancel.cancelled() => {
                    warn!(request_id = request.id(), outstanding = join_set.len(), "dispatch cancelled, abandoning tasks");
                    join_set.abort_all();
                    break;
                }
            }
        }

        let elapsed_ms = started.elapsed().as_millis() as u64;
        let results: Vec<TaskResult> = tasks
            .iter()
            .zip(slots)
            .map(|(task, slot)| slot.unwrap_or_else(|| TaskResult::timeout(task, elapsed_ms)))
            .collect();

        if let Some(feedback) = &self.feedback {
            for result in results.iter().filter(|r| r.agent_id() != self.fallback.id()) {
                feedback.record(result);
            }
        }

        let succeeded = results.iter().filter(|r| r.is_success()).count();
        info!(
            request_id = request.id(),
            succeeded,
            total = results.len(),
            elapsed_ms,
            "dispatch complete"
        );
        results
    }
}

async fn run_task(
    planned: PlannedTask,
    request: Arc<Request>,
    token: CancellationToken,
    semaphore: Arc<Semaphore>,
) -> TaskResult {
    let PlannedTask {
        mut task,
        handler,
        timeout,
        global_deadline,
    } = planned;

    // Queueing for a permit only counts against the global deadline.
    let queued = Instant::now();
    let permit = tokio::select! {
        biased;
        _ = token.cancelled() => None,
        _ = sleep_until(global_deadline) => None,
        permit = semaphore.acquire() => permit.ok(),
    };
    let Some(_permit) = permit else {
        let latency_ms = queued.elapsed().as_millis() as u64;
        warn!(task_id = %task.id, agent_id = %task.agent_id, latency_ms, "task never started");
        return TaskResult::timeout(&task, latency_ms);
    };

    let started = Instant::now();
    task.deadline = (started + timeout).min(global_deadline);

    let outcome = tokio::select! {
        biased;
        _ = token.cancelled() => None,
        _ = sleep_until(task.deadline) => None,
        result = AssertUnwindSafe(handler.execute(&task, &request, token.clone()))
            .catch_unwind() => Some(result),
    };
    let latency_ms = started.elapsed().as_millis() as u64;

    match outcome {
        None => {
            token.cancel();
            warn!(task_id = %task.id, agent_id = %task.agent_id, latency_ms, "task timed out");
            TaskResult::timeout(&task, latency_ms)
        }
        Some(Ok(Ok(payload))) => TaskResult::success(&task, payload, latency_ms),
        Some(Ok(Err(e))) => {
            warn!(task_id = %task.id, agent_id = %task.agent_id, error = %e, "task failed");
            TaskResult::failure(&task, e.to_string(), latency_ms)
        }
        Some(Err(panic)) => {
            let message = panic_message(panic.as_ref());
            warn!(task_id = %task.id, agent_id = %task.agent_id, panic = %message, "handler panicked");
            TaskResult::failure(&task, HandlerError::Panicked(message).to_string(), latency_ms)
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::CapabilityDescriptor;
    use async_trait::async_trait;
    use std::time::Duration;

    struct Scripted {
        id: &'static str,
        tags: Vec<&'static str>,
        delay: Duration,
        fail: bool,
    }

    #[async_trait]
    impl CapabilityHandler for Scripted {
        fn id(&self) -> &str {
            self.id
        }

        fn capabilities(&self) -> Vec<CapabilityDescriptor> {
            self.tags
                .iter()
                .map(|t| CapabilityDescriptor::new(*t, "scripted"))
                .collect()
        }

        async fn execute(
            &self,
            task: &Task,
            _request: &Request,
            _cancel: CancellationToken,
        ) -> Result<TaskPayload, HandlerError> {
            tokio::time::sleep(self.delay).await;
            if self.fail {
                return Err(HandlerError::Failed(format!("{} refused", self.id)));
            }
            Ok(TaskPayload::text(format!("{} answered {}", self.id, task.capability_tag)))
        }
    }

    fn scripted(id: &'static str, tags: &[&'static str], delay_ms: u64, fail: bool) -> Scripted {
        Scripted {
            id,
            tags: tags.to_vec(),
            delay: Duration::from_millis(delay_ms),
            fail,
        }
    }

    fn routed(tags: &[&str]) -> Vec<RoutedTag> {
        tags.iter()
            .map(|t| RoutedTag {
                tag: CapabilityTag::new(*t),
                score: 1.0,
            })
            .collect()
    }

    fn dispatcher(handlers: HandlerSet, config: DispatchConfig) -> (Dispatcher, RegistrySnapshot) {
        let snapshot = handlers.snapshot(1_000.0);
        (Dispatcher::new(Arc::new(handlers), config), snapshot)
    }

    #[tokio::test(start_paused = true)]
    async fn test_results_follow_routing_order() {
        let handlers = HandlerSet::new()
            .with(scripted("slow", &["research"], 300, false))
            .with(scripted("fast", &["developer"], 10, false));
        let (dispatcher, snapshot) = dispatcher(handlers, DispatchConfig::default());

        let results = dispatcher
            .dispatch(
                &Request::new("x"),
                &routed(&["research", "developer"]),
                &snapshot,
                Instant::now() + Duration::from_secs(5),
                &CancellationToken::new(),
            )
            .await;

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].agent_id(), "slow");
        assert_eq!(results[1].agent_id(), "fast");
        assert!(results.iter().all(TaskResult::is_success));
    }

    #[tokio::test(start_paused = true)]
    async fn test_capability_timeout_override() {
        let handlers = HandlerSet::new()
            .with(scripted("slow", &["research"], 2_000, false))
            .with(scripted("fast", &["developer"], 1_500, false));
        let mut config = DispatchConfig::default();
        config.capability_timeouts.insert("research".into(), 1_000);
        let (dispatcher, snapshot) = dispatcher(handlers, config);

        let results = dispatcher
            .dispatch(
                &Request::new("x"),
                &routed(&["research", "developer"]),
                &snapshot,
                Instant::now() + Duration::from_secs(60),
                &CancellationToken::new(),
            )
            .await;

        assert_eq!(results[0].status(), TaskStatus::Timeout);
        assert_eq!(results[1].status(), TaskStatus::Success);
    }

    #[tokio::test(start_paused = true)]
    async fn test_global_deadline_marks_outstanding_as_timeout() {
        let handlers = HandlerSet::new()
            .with(scripted("hang", &["research"], 600_000, false))
            .with(scripted("quick", &["developer"], 5, false));
        let (dispatcher, snapshot) = dispatcher(handlers, DispatchConfig::default());

        let started = Instant::now();
        let results = dispatcher
            .dispatch(
                &Request::new("x"),
                &routed(&["research", "developer"]),
                &snapshot,
                started + Duration::from_millis(200),
                &CancellationToken::new(),
            )
            .await;

        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(results[0].status(), TaskStatus::Timeout);
        assert_eq!(results[1].status(), TaskStatus::Success);
    }

    #[tokio::test]
    async fn test_fallback_when_tag_and_general_unregistered() {
        let handlers = HandlerSet::new().with(scripted("coder", &["developer"], 0, false));
        let (dispatcher, snapshot) = dispatcher(handlers, DispatchConfig::default());

        let results = dispatcher
            .dispatch(
                &Request::new("x"),
                &routed(&["finance"]),
                &snapshot,
                Instant::now() + Duration::from_secs(5),
                &CancellationToken::new(),
            )
            .await;

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].agent_id(), crate::handlers::FALLBACK_AGENT_ID);
        assert!(results[0].capability_tag().is_general());
        assert_eq!(results[0].requested_tag().as_str(), "finance");
        assert!(results[0].is_success());
    }

    #[tokio::test]
    async fn test_general_agent_preferred_over_builtin_fallback() {
        let handlers = HandlerSet::new().with(scripted("generalist", &["general"], 0, false));
        let (dispatcher, snapshot) = dispatcher(handlers, DispatchConfig::default());

        let planned = dispatcher.plan(
            &Request::new("x"),
            &routed(&["creative"]),
            &snapshot,
            Instant::now() + Duration::from_secs(5),
        );
        assert_eq!(planned[0].task.agent_id, "generalist");
        assert!(planned[0].task.is_fallback());
        assert!(snapshot
            .descriptor("generalist")
            .unwrap()
            .serves(&planned[0].task.capability_tag));
    }

    #[tokio::test]
    async fn test_empty_registry_never_yields_zero_tasks() {
        let (dispatcher, snapshot) = dispatcher(HandlerSet::new(), DispatchConfig::default());
        let results = dispatcher
            .dispatch(
                &Request::new("x"),
                &routed(&["general"]),
                &snapshot,
                Instant::now() + Duration::from_secs(5),
                &CancellationToken::new(),
            )
            .await;
        assert_eq!(results.len(), 1);
        assert!(results[0].is_success());
    }

    #[tokio::test(start_paused = true)]
    async fn test_queued_task_timeout_starts_at_permit() {
        let handlers = HandlerSet::new()
            .with(scripted("first", &["research"], 800, false))
            .with(scripted("second", &["developer"], 800, false));
        let config = DispatchConfig {
            default_task_timeout_ms: 1_000,
            max_concurrency: 1,
            ..DispatchConfig::default()
        };
        let (dispatcher, snapshot) = dispatcher(handlers, config);

        let results = dispatcher
            .dispatch(
                &Request::new("x"),
                &routed(&["research", "developer"]),
                &snapshot,
                Instant::now() + Duration::from_secs(60),
                &CancellationToken::new(),
            )
            .await;

        // The second task waits 800ms for the permit, then still gets its full second.
        assert!(results.iter().all(TaskResult::is_success));
    }

    #[tokio::test(start_paused = true)]
    async fn test_queued_task_bounded_by_global_deadline() {
        let handlers = HandlerSet::new()
            .with(scripted("first", &["research"], 5_000, false))
            .with(scripted("second", &["developer"], 10, false));
        let config = DispatchConfig {
            max_concurrency: 1,
            ..DispatchConfig::default()
        };
        let (dispatcher, snapshot) = dispatcher(handlers, config);

        let started = Instant::now();
        let results = dispatcher
            .dispatch(
                &Request::new("x"),
                &routed(&["research", "developer"]),
                &snapshot,
                started + Duration::from_millis(300),
                &CancellationToken::new(),
            )
            .await;

        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(results[0].status(), TaskStatus::Timeout);
        assert_eq!(results[1].status(), TaskStatus::Timeout);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fallback_uses_routed_tag_timeout() {
        let handlers = HandlerSet::new().with(scripted("generalist", &["general"], 2_000, false));
        let mut config = DispatchConfig::default();
        config.capability_timeouts.insert("finance".into(), 500);
        let (dispatcher, snapshot) = dispatcher(handlers, config);

        let planned = dispatcher.plan(
            &Request::new("x"),
            &routed(&["finance"]),
            &snapshot,
            Instant::now() + Duration::from_secs(60),
        );
        assert_eq!(planned[0].timeout, Duration::from_millis(500));

        let results = dispatcher
            .dispatch(
                &Request::new("x"),
                &routed(&["finance"]),
                &snapshot,
                Instant::now() + Duration::from_secs(60),
                &CancellationToken::new(),
            )
            .await;
        assert_eq!(results[0].agent_id(), "generalist");
        assert_eq!(results[0].status(), TaskStatus::Timeout);
    }

    #[tokio::test(start_paused = true)]
    async fn test_parent_cancellation_abandons_tasks() {
        let handlers = HandlerSet::new().with(scripted("hang", &["research"], 600_000, false));
        let (dispatcher, snapshot) = dispatcher(handlers, DispatchConfig::default());
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let results = dispatcher
            .dispatch(
                &Request::new("x"),
                &routed(&["research"]),
                &snapshot,
                Instant::now() + Duration::from_secs(60),
                &cancel,
            )
            .await;
        assert_eq!(results[0].status(), TaskStatus::Timeout);
    }
}
