//! The think → act → observe loop.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, Notify};
use tokio_util::sync::CancellationToken;

use loom_context::ContextStore;
use loom_core::tools::{dispatch_tool_call, ToolCall, ToolContext, ToolError, ToolRegistry};
use loom_core::{AgentError, AgentEvent, Message, TokenUsage, ToolResult};
use loom_llm::{ChatRequest, SharedChatClient};

use crate::config::AgentLoopConfig;
use crate::state::{AgentState, ExecutionMode};

pub type Result<T> = std::result::Result<T, AgentError>;

/// One dispatched tool call, recorded with timestamps and outcome.
#[derive(Debug, Clone)]
pub struct AgentAction {
    pub tool_call: ToolCall,
    pub result: ToolResult,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AgentStats {
    pub llm_calls: u64,
    pub tokens_used: u64,
    pub iterations: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    /// The LLM produced a final text response.
    Completed,
    /// The iteration budget ran out; not a failure.
    MaxIterations,
}

#[derive(Debug, Clone)]
pub struct TaskResult {
    pub outcome: TaskOutcome,
    pub response: String,
    pub iterations: usize,
}

struct Control {
    state: RwLock<AgentState>,
    paused: AtomicBool,
    stopped: AtomicBool,
    step_pending: AtomicBool,
    notify: Notify,
    cancel: CancellationToken,
    queue: Mutex<VecDeque<String>>,
}

impl Control {
    fn new() -> Self {
        Self {
            state: RwLock::new(AgentState::Idle),
            paused: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
            step_pending: AtomicBool::new(false),
            notify: Notify::new(),
            cancel: CancellationToken::new(),
            queue: Mutex::new(VecDeque::new()),
        }
    }

    fn set_state(&self, state: AgentState) {
        *self.state.write().expect("state lock poisoned") = state;
    }

    fn state(&self) -> AgentState {
        *self.state.read().expect("state lock poisoned")
    }
}

/// Cloneable control surface for a running loop: pause/resume/step/stop and
/// task queueing from outside the execution task.
#[derive(Clone)]
pub struct AgentHandle {
    control: Arc<Control>,
}

impl AgentHandle {
    pub fn state(&self) -> AgentState {
        self.control.state()
    }

    /// Suspend at the next checkpoint. The loop resumes in the state it was
    /// pausing from.
    pub fn pause(&self) {
        self.control.paused.store(true, Ordering::SeqCst);
    }

    pub fn resume(&self) {
        self.control.paused.store(false, Ordering::SeqCst);
        self.control.notify.notify_waiters();
    }

    /// In step mode, run exactly one more iteration.
    pub fn step(&self) {
        self.control.step_pending.store(true, Ordering::SeqCst);
        self.control.notify.notify_waiters();
    }

    /// Terminal: clears the task queue and cancels any in-flight work.
    pub fn stop(&self) {
        self.control.stopped.store(true, Ordering::SeqCst);
        self.control.queue.lock().expect("queue lock poisoned").clear();
        self.control.cancel.cancel();
        self.control.notify.notify_waiters();
    }

    pub fn queue_task(&self, description: impl Into<String>) {
        self.control
            .queue
            .lock()
            .expect("queue lock poisoned")
            .push_back(description.into());
    }

    pub fn queued_tasks(&self) -> usize {
        self.control.queue.lock().expect("queue lock poisoned").len()
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.control.cancel.clone()
    }
}

/// The ReAct loop. Owns its context store; shares the tool registry and the
/// chat client with other executions.
pub struct AgentLoop {
    context: ContextStore,
    llm: SharedChatClient,
    tools: Arc<ToolRegistry>,
    config: AgentLoopConfig,
    control: Arc<Control>,
    stats: AgentStats,
    actions: Vec<AgentAction>,
    event_tx: Option<mpsc::Sender<AgentEvent>>,
}

impl AgentLoop {
    pub fn new(
        context: ContextStore,
        llm: SharedChatClient,
        tools: Arc<ToolRegistry>,
        config: AgentLoopConfig,
    ) -> Self {
        Self {
            context,
            llm,
            tools,
            config,
            control: Arc::new(Control::new()),
            stats: AgentStats::default(),
            actions: Vec::new(),
            event_tx: None,
        }
    }

    pub fn with_events(mut self, event_tx: mpsc::Sender<AgentEvent>) -> Self {
        self.event_tx = Some(event_tx);
        self
    }

    pub fn handle(&self) -> AgentHandle {
        AgentHandle {
            control: Arc::clone(&self.control),
        }
    }

    pub fn state(&self) -> AgentState {
        self.control.state()
    }

    pub fn stats(&self) -> AgentStats {
        self.stats
    }

    pub fn actions(&self) -> &[AgentAction] {
        &self.actions
    }

    pub fn context(&self) -> &ContextStore {
        &self.context
    }

    pub fn context_mut(&mut self) -> &mut ContextStore {
        &mut self.context
    }

    /// Run one task to completion. In autonomous mode, queued tasks are
    /// drained afterwards; a fatal error on one task does not stop the next.
    pub async fn execute_task(&mut self, description: impl Into<String>) -> Result<TaskResult> {
        if self.control.state() == AgentState::Stopped {
            return Err(AgentError::Cancelled);
        }

        let mut result = self.run_single_task(description.into()).await;

        if self.config.mode == ExecutionMode::Autonomous {
            loop {
                let next = {
                    let mut queue = self.control.queue.lock().expect("queue lock poisoned");
                    queue.pop_front()
                };
                let Some(next) = next else { break };

                match self.run_single_task(next).await {
                    Ok(task_result) => result = Ok(task_result),
                    Err(AgentError::Cancelled) => return Err(AgentError::Cancelled),
                    Err(error) => {
                        // Fatal to that task only; keep draining the queue.
                        log::warn!("queued task failed: {error}");
                        self.emit(AgentEvent::Error {
                            message: error.to_string(),
                        })
                        .await;
                    }
                }
            }
        }

        result
    }

    async fn run_single_task(&mut self, description: String) -> Result<TaskResult> {
        self.context.add_message(Message::user(description)).await
            .map_err(|e| AgentError::Context(e.to_string()))?;

        let mut iteration = 0usize;

        loop {
            if iteration >= self.config.max_iterations {
                let note = "max iterations reached";
                self.context
                    .add_message(Message::assistant(note, None))
                    .await
                    .map_err(|e| AgentError::Context(e.to_string()))?;
                self.control.set_state(AgentState::Idle);
                return Ok(TaskResult {
                    outcome: TaskOutcome::MaxIterations,
                    response: note.to_string(),
                    iterations: iteration,
                });
            }
            iteration += 1;
            self.stats.iterations += 1;
            self.emit(AgentEvent::IterationStarted { iteration }).await;

            // Think
            self.checkpoint(AgentState::Thinking).await?;
            let response = match self.think().await {
                Ok(response) => response,
                Err(error) => {
                    // Transport failure is fatal to the task, not the agent.
                    self.control.set_state(AgentState::Error);
                    self.emit(AgentEvent::Error {
                        message: error.to_string(),
                    })
                    .await;
                    self.control.set_state(AgentState::Idle);
                    return Err(error);
                }
            };

            let tool_calls = response.message.tool_calls.clone().unwrap_or_default();
            self.context
                .add_message(Message::assistant(response.content.clone(), {
                    if tool_calls.is_empty() {
                        None
                    } else {
                        Some(tool_calls.clone())
                    }
                }))
                .await
                .map_err(|e| AgentError::Context(e.to_string()))?;

            if tool_calls.is_empty() {
                self.emit(AgentEvent::AssistantMessage {
                    content: response.content.clone(),
                })
                .await;
                self.emit(AgentEvent::Complete {
                    usage: TokenUsage {
                        prompt_tokens: 0,
                        completion_tokens: 0,
                        total_tokens: self.stats.tokens_used as u32,
                    },
                })
                .await;
                self.control.set_state(AgentState::Idle);
                return Ok(TaskResult {
                    outcome: TaskOutcome::Completed,
                    response: response.content,
                    iterations: iteration,
                });
            }

            // Act: sequential by default so observations keep LLM order.
            self.checkpoint(AgentState::Acting).await?;
            let results = self.act(&tool_calls).await?;

            // Observe: one tool message per call, in the order the LLM
            // emitted the calls.
            self.control.set_state(AgentState::Observing);
            for (call, result) in tool_calls.iter().zip(&results) {
                self.context
                    .add_message(Message::tool_result(
                        call.id.clone(),
                        result.content_for_llm(),
                    ))
                    .await
                    .map_err(|e| AgentError::Context(e.to_string()))?;
            }

            if self.config.mode == ExecutionMode::Step {
                self.control.paused.store(true, Ordering::SeqCst);
            }
            self.checkpoint(AgentState::Observing).await?;
        }
    }

    async fn think(&mut self) -> Result<loom_llm::ChatResponse> {
        let mut request = ChatRequest::new(self.context.messages_for_llm())
            .with_tools(self.tools.list_schemas());
        request.temperature = self.config.temperature;
        request.max_tokens = self.config.max_tokens;

        let response = self
            .llm
            .chat(request)
            .await
            .map_err(|error| AgentError::Llm(error.to_string()))?;

        self.stats.llm_calls += 1;
        if let Some(usage) = &response.usage {
            self.stats.tokens_used += u64::from(usage.total_tokens);
        }

        Ok(response)
    }

    async fn act(&mut self, tool_calls: &[ToolCall]) -> Result<Vec<ToolResult>> {
        let ctx = ToolContext::new(self.config.workdir.clone())
            .with_timeout(self.config.tool_timeout)
            .with_cancel(self.control.cancel.clone());

        let mut results = Vec::with_capacity(tool_calls.len());

        for call in tool_calls {
            let arguments = loom_core::parse_tool_args(&call.function.arguments)
                .unwrap_or_else(|_| serde_json::json!({}));
            self.emit(AgentEvent::ToolStart {
                tool_call_id: call.id.clone(),
                tool_name: call.function.name.clone(),
                arguments,
            })
            .await;

            let started_at = Utc::now();
            let result = match dispatch_tool_call(&self.tools, call, &ctx).await {
                Ok(result) => result,
                Err(ToolError::Cancelled) => return Err(AgentError::Cancelled),
                // Dispatch failures are observations, not task failures; the
                // next think sees the error text and may recover.
                Err(error) => ToolResult::fail(error.to_string()),
            };
            let finished_at = Utc::now();

            if result.success {
                self.emit(AgentEvent::ToolComplete {
                    tool_call_id: call.id.clone(),
                    result: result.clone(),
                })
                .await;
            } else {
                self.emit(AgentEvent::ToolError {
                    tool_call_id: call.id.clone(),
                    error: result.error.clone().unwrap_or_default(),
                })
                .await;
            }

            self.actions.push(AgentAction {
                tool_call: call.clone(),
                result: result.clone(),
                started_at,
                finished_at,
            });
            results.push(result);
        }

        Ok(results)
    }

    /// Pause/stop/cancel checkpoint. Sets the target state when allowed to
    /// proceed; parks in `Paused` (remembering the target) otherwise.
    async fn checkpoint(&self, next: AgentState) -> Result<()> {
        loop {
            if self.control.stopped.load(Ordering::SeqCst) {
                self.control.set_state(AgentState::Stopped);
                return Err(AgentError::Cancelled);
            }
            if self.control.cancel.is_cancelled() {
                self.control.set_state(AgentState::Stopped);
                return Err(AgentError::Cancelled);
            }

            if !self.control.paused.load(Ordering::SeqCst) {
                self.control.set_state(next);
                return Ok(());
            }

            // Step mode: one queued step() lets a single iteration through
            // while the loop stays logically paused.
            if self.control.step_pending.swap(false, Ordering::SeqCst) {
                self.control.paused.store(false, Ordering::SeqCst);
                self.control.set_state(next);
                return Ok(());
            }

            self.control.set_state(AgentState::Paused);

            tokio::select! {
                _ = self.control.notify.notified() => {}
                _ = self.control.cancel.cancelled() => {}
            }
        }
    }

    async fn emit(&self, event: AgentEvent) {
        if let Some(event_tx) = &self.event_tx {
            let _ = event_tx.send(event).await;
        }
    }
}
