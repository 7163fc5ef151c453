//! Host execution bridge.
//!
//! Tools mutate host state that is only valid on the host's single
//! execution context. The bridge marshals one invocation at a time from the
//! async side onto that context:
//!
//! 1. The caller installs a [`ToolExecutionRequest`] in the single request
//!    slot and raises the host's [`HostSignal`].
//! 2. The host, on its own turn, calls [`HostBridge::drain`], which takes
//!    the request, runs the tool to completion and resolves the request's
//!    one-shot completion handle.
//! 3. The caller awaits the handle with a bounded timeout.
//!
//! Every failure along the way (unknown tool, host unavailable, signal
//! rejected, timeout, tool panic) is reported as a failed [`ToolResult`].

pub mod host_thread;
pub mod signal;

pub use host_thread::HostThread;
pub use signal::{wake_channel, ChannelSignal, HostSignal, HostWakeup, Wake};

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::error::PilotError;
use crate::tools::{HostContext, Tool, ToolArguments, ToolDeclaration, ToolRegistry};
use crate::types::{ToolInput, ToolResult};
use crate::util::with_deadline;

/// Default time a caller waits for the host to run a tool.
pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(30);

/// Executes named tools on behalf of the orchestration loop.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    /// Declarations of every invocable tool, for prompt construction.
    fn declarations(&self) -> Vec<ToolDeclaration>;

    /// Execute one tool. Never fails: errors become a failed [`ToolResult`].
    async fn execute(
        &self,
        tool_name: &str,
        input: ToolInput,
        cancel: &CancellationToken,
    ) -> ToolResult;
}

/// Shared flag reporting whether the host can accept tool work
/// (e.g. whether a document is open). Updated by the host.
#[derive(Debug, Clone)]
pub struct HostAvailability {
    available: Arc<AtomicBool>,
}

impl Default for HostAvailability {
    fn default() -> Self {
        Self {
            available: Arc::new(AtomicBool::new(true)),
        }
    }
}

impl HostAvailability {
    pub fn is_available(&self) -> bool {
        self.available.load(Ordering::Acquire)
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::Release);
    }
}

/// One tool invocation waiting for the host. Lives for a single round trip.
pub struct ToolExecutionRequest<H> {
    id: Uuid,
    tool_name: String,
    tool: Arc<dyn Tool<H>>,
    arguments: ToolArguments,
    responder: oneshot::Sender<ToolResult>,
    enqueued_at: Instant,
}

impl<H> ToolExecutionRequest<H> {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn tool_name(&self) -> &str {
        &self.tool_name
    }
}

/// Single-flight bridge between async callers and the host's execution
/// context.
pub struct HostBridge<H> {
    registry: Arc<ToolRegistry<H>>,
    slot: Mutex<Option<ToolExecutionRequest<H>>>,
    gate: tokio::sync::Mutex<()>,
    signal: Arc<dyn HostSignal>,
    availability: HostAvailability,
    timeout: Duration,
}

impl<H: HostContext> HostBridge<H> {
    pub fn new(registry: impl Into<Arc<ToolRegistry<H>>>, signal: Arc<dyn HostSignal>) -> Self {
        Self {
            registry: registry.into(),
            slot: Mutex::new(None),
            gate: tokio::sync::Mutex::new(()),
            signal,
            availability: HostAvailability::default(),
            timeout: DEFAULT_TOOL_TIMEOUT,
        }
    }

    /// Bridge wired to a fresh [`wake_channel`]; the returned
    /// [`HostWakeup`] belongs to the host.
    pub fn with_wake_channel(registry: impl Into<Arc<ToolRegistry<H>>>) -> (Self, HostWakeup) {
        let (signal, wakeup) = wake_channel();
        (Self::new(registry, Arc::new(signal)), wakeup)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn registry(&self) -> &ToolRegistry<H> {
        &self.registry
    }

    /// Handle the host uses to report availability changes.
    pub fn availability(&self) -> HostAvailability {
        self.availability.clone()
    }

    /// Whether a request is installed and not yet taken by the host.
    pub fn has_pending(&self) -> bool {
        self.lock_slot().is_some()
    }

    fn lock_slot(&self) -> MutexGuard<'_, Option<ToolExecutionRequest<H>>> {
        self.slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Invoke a tool on the host and wait for its result.
    ///
    /// Concurrent callers queue behind one another. A request that times out
    /// or is cancelled before the host picks it up is withdrawn; one the host
    /// already started runs to completion and its result is discarded.
    pub async fn invoke(
        &self,
        tool_name: &str,
        input: ToolInput,
        cancel: &CancellationToken,
    ) -> ToolResult {
        let Some(tool) = self.registry.lookup(tool_name) else {
            warn!(tool = tool_name, "tool not registered");
            return ToolResult::failure(format!("Tool '{tool_name}' not found"));
        };
        if !self.availability.is_available() {
            return PilotError::HostUnavailable(format!(
                "cannot run '{tool_name}': no active document"
            ))
            .into();
        }

        // Time queued behind another caller counts against the timeout.
        let deadline = tokio::time::Instant::now() + self.timeout;
        let _flight = tokio::select! {
            _ = cancel.cancelled() => {
                return ToolResult::failure(format!("Tool '{tool_name}' cancelled before dispatch"));
            }
            guard = tokio::time::timeout_at(deadline, self.gate.lock()) => match guard {
                Ok(guard) => guard,
                Err(_) => {
                    warn!(tool = tool_name, "timed out waiting behind another tool request");
                    return self.timed_out(tool_name);
                }
            },
        };

        let (responder, completion) = oneshot::channel();
        let request_id = Uuid::new_v4();
        self.install(ToolExecutionRequest {
            id: request_id,
            tool_name: tool_name.to_string(),
            tool,
            arguments: ToolArguments::new(input),
            responder,
            enqueued_at: Instant::now(),
        });

        if let Err(err) = self.signal.raise() {
            self.withdraw(request_id);
            warn!(tool = tool_name, error = %err, "host rejected wake request");
            return err.into();
        }

        let completion = async {
            completion.await.map_err(|_| PilotError::ToolExecution {
                tool_name: tool_name.to_string(),
                message: "dropped by the host before completing".to_string(),
            })
        };

        tokio::select! {
            _ = cancel.cancelled() => {
                let withdrawn = self.withdraw(request_id);
                debug!(tool = tool_name, withdrawn, "tool wait cancelled");
                ToolResult::failure(format!("Tool '{tool_name}' cancelled"))
            }
            outcome = with_deadline(deadline, self.timeout, completion) => match outcome {
                Ok(result) => result,
                Err(PilotError::Timeout(timeout_ms)) => {
                    let withdrawn = self.withdraw(request_id);
                    warn!(tool = tool_name, timeout_ms, withdrawn, "tool execution timed out");
                    self.timed_out(tool_name)
                }
                Err(err) => err.into(),
            },
        }
    }

    fn timed_out(&self, tool_name: &str) -> ToolResult {
        ToolResult::failure(format!(
            "Tool '{tool_name}' timed out after {:.1}s waiting for the host",
            self.timeout.as_secs_f64()
        ))
    }

    fn install(&self, request: ToolExecutionRequest<H>) {
        let mut slot = self.lock_slot();
        if let Some(stale) = slot.replace(request) {
            warn!(
                tool = %stale.tool_name,
                request_id = %stale.id,
                "superseding request nobody is waiting on"
            );
            let _ = stale
                .responder
                .send(ToolResult::failure("superseded by a newer tool request"));
        }
    }

    /// Remove the request from the slot if the host has not taken it yet.
    fn withdraw(&self, request_id: Uuid) -> bool {
        let mut slot = self.lock_slot();
        if slot.as_ref().is_some_and(|r| r.id == request_id) {
            slot.take();
            true
        } else {
            false
        }
    }

    /// Host side: take the pending request, if any, and run it to completion
    /// on the calling (host) thread. Returns whether a request was run.
    pub fn drain(&self, host: &mut H) -> bool {
        let Some(request) = self.lock_slot().take() else {
            return false;
        };

        let started = Instant::now();
        let result = if host.is_available() {
            run_guarded(request.tool.as_ref(), &request.tool_name, host, &request.arguments)
        } else {
            ToolResult::failure(host.unavailable_reason())
        };
        debug!(
            tool = %request.tool_name,
            request_id = %request.id,
            queued_ms = started.duration_since(request.enqueued_at).as_millis() as u64,
            elapsed_ms = started.elapsed().as_millis() as u64,
            success = result.success,
            "host executed tool"
        );

        if request.responder.send(result).is_err() {
            debug!(
                tool = %request.tool_name,
                request_id = %request.id,
                "caller stopped waiting; discarding late result"
            );
        }
        true
    }
}

fn run_guarded<H>(tool: &dyn Tool<H>, tool_name: &str, host: &mut H, args: &ToolArguments) -> ToolResult {
    match panic::catch_unwind(AssertUnwindSafe(|| tool.execute(host, args))) {
        Ok(result) => result,
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            error!(tool = tool_name, panic = %message, "tool panicked during execution");
            ToolResult::failure(format!("Tool '{tool_name}' failed: {message}"))
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[async_trait]
impl<H: HostContext> ToolExecutor for HostBridge<H> {
    fn declarations(&self) -> Vec<ToolDeclaration> {
        self.registry.list()
    }

    async fn execute(
        &self,
        tool_name: &str,
        input: ToolInput,
        cancel: &CancellationToken,
    ) -> ToolResult {
        self.invoke(tool_name, input, cancel).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::{FnTool, ToolSchema};

    struct Doc {
        open: bool,
        edits: u32,
    }

    impl HostContext for Doc {
        fn is_available(&self) -> bool {
            self.open
        }
    }

    fn registry() -> ToolRegistry<Doc> {
        ToolRegistry::new()
            .with(FnTool::new("edit", "Edit", ToolSchema::empty(), |doc: &mut Doc, _| {
                doc.edits += 1;
                ToolResult::success("edited")
            }))
            .with(FnTool::new("explode", "Panics", ToolSchema::empty(), |_: &mut Doc, _| {
                panic!("element id 42 is invalid")
            }))
    }

    #[test]
    fn drain_with_empty_slot_does_nothing() {
        let (bridge, _wakeup) = HostBridge::with_wake_channel(registry());
        let mut doc = Doc { open: true, edits: 0 };
        assert!(!bridge.drain(&mut doc));
    }

    #[tokio::test]
    async fn drain_runs_request_and_resolves_caller() {
        let (bridge, _wakeup) = HostBridge::with_wake_channel(registry());
        let bridge = Arc::new(bridge);
        let caller = {
            let bridge = bridge.clone();
            tokio::spawn(async move {
                bridge
                    .invoke("edit", ToolInput::new(), &CancellationToken::new())
                    .await
            })
        };
        while !bridge.has_pending() {
            tokio::task::yield_now().await;
        }
        let mut doc = Doc { open: true, edits: 0 };
        assert!(bridge.drain(&mut doc));
        let result = caller.await.unwrap();
        assert!(result.success);
        assert_eq!(doc.edits, 1);
    }

    #[test]
    fn panics_become_failed_results() {
        let registry = registry();
        let tool = registry.lookup("explode").unwrap();
        let mut doc = Doc { open: true, edits: 0 };
        let result = run_guarded(tool.as_ref(), "explode", &mut doc, &ToolArguments::default());
        assert!(!result.success);
        assert!(result.message.contains("element id 42 is invalid"));
    }

    #[tokio::test]
    async fn unknown_tool_fails_fast() {
        let (bridge, _wakeup) = HostBridge::with_wake_channel(registry());
        let result = bridge
            .invoke("missing", ToolInput::new(), &CancellationToken::new())
            .await;
        assert!(!result.success);
        assert_eq!(result.message, "Tool 'missing' not found");
        assert!(!bridge.has_pending());
    }

    #[tokio::test]
    async fn unavailable_host_is_reported() {
        let (bridge, _wakeup) = HostBridge::with_wake_channel(registry());
        bridge.availability().set_available(false);
        let result = bridge
            .invoke("edit", ToolInput::new(), &CancellationToken::new())
            .await;
        assert!(!result.success);
        assert!(result.message.contains("no active document"));
    }

    #[tokio::test]
    async fn rejected_signal_withdraws_request() {
        let reject = || -> Result<(), PilotError> { Err(PilotError::Signal("queue full".into())) };
        let bridge = HostBridge::new(registry(), Arc::new(reject));
        let result = bridge
            .invoke("edit", ToolInput::new(), &CancellationToken::new())
            .await;
        assert!(!result.success);
        assert_eq!(result.message, "Failed to signal host: queue full");
        assert!(!bridge.has_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_withdraws_untaken_request() {
        let (bridge, _wakeup) = HostBridge::with_wake_channel(registry());
        let bridge = bridge.with_timeout(Duration::from_secs(30));
        let result = bridge
            .invoke("edit", ToolInput::new(), &CancellationToken::new())
            .await;
        assert!(!result.success);
        assert!(result.message.contains("timed out"));
        assert!(!bridge.has_pending());
    }

    #[test]
    fn drain_checks_host_availability() {
        let (bridge, _wakeup) = HostBridge::with_wake_channel(registry());
        let (responder, mut completion) = oneshot::channel();
        bridge.install(ToolExecutionRequest {
            id: Uuid::new_v4(),
            tool_name: "edit".into(),
            tool: bridge.registry().lookup("edit").unwrap(),
            arguments: ToolArguments::default(),
            responder,
            enqueued_at: Instant::now(),
        });
        let mut doc = Doc { open: false, edits: 0 };
        assert!(bridge.drain(&mut doc));
        let result = completion.try_recv().unwrap();
        assert!(!result.success);
        assert_eq!(doc.edits, 0);
    }
}
