//! The tool-calling orchestration loop.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use luminous_config::{AgentSettings, AppConfig};
use luminous_core::error::{Error, ProviderError};
use luminous_core::event::{DomainEvent, EventBus};
use luminous_core::message::Turn;
use luminous_core::provider::{Provider, ProviderRequest, ProviderResponse};
use luminous_core::session::Session;
use luminous_core::state::{Dimension, InternalState};
use luminous_core::tool::{ToolCall, ToolContext, ToolRegistry, ToolResult};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::directive::build_directive;
use crate::persona::{NOTHING_TO_ADD, Persona, REFLECTION_PROMPT};
use crate::post_process;

/// What starts an advance.
#[derive(Debug, Clone, PartialEq)]
pub enum Input {
    /// Text typed by the operator
    Message(String),
    /// A synthetic self-review turn
    Reflection,
}

impl Input {
    pub fn is_reflection(&self) -> bool {
        matches!(self, Input::Reflection)
    }
}

/// A successful advance.
#[derive(Debug, Clone)]
pub struct AdvanceOutcome {
    /// Cleaned reply, `None` when a reflection had nothing to add
    pub reply: Option<String>,
    /// The session with this advance committed
    pub session: Session,
    /// Ordered log trail
    pub log: Vec<String>,
    /// One operator message per capability invocation
    pub tool_messages: Vec<String>,
    /// Model calls that requested capabilities
    pub rounds: usize,
}

/// A failed advance. The caller's session is untouched.
#[derive(Debug, thiserror::Error)]
#[error("{error}")]
pub struct AdvanceFailure {
    pub error: Error,
    /// Log lines accumulated before the failure, ending with the error
    pub log: Vec<String>,
}

/// Mutable scratch state for one advance.
struct Run {
    session: Session,
    log: Vec<String>,
    tool_messages: Vec<String>,
    rounds: usize,
    deadline: Instant,
}

/// The core loop that drives model calls and capability execution.
pub struct AgentLoop {
    /// The LLM provider to use
    provider: Arc<dyn Provider>,

    /// The model to use
    model: String,

    /// Temperature setting
    temperature: f32,

    /// Max tokens per response
    max_tokens: Option<u32>,

    /// Capability registry
    tools: Arc<ToolRegistry>,

    /// Persona texts for the directive
    persona: Persona,

    /// Event bus for domain events
    event_bus: Arc<EventBus>,

    /// Maximum model calls that may request capabilities
    max_rounds: usize,

    /// Per-request provider timeout
    request_timeout: Duration,

    /// Wall-clock bound on the whole advance
    loop_timeout: Duration,

    /// Run invocations of one round concurrently when none touch state
    parallel_tools: bool,
}

impl AgentLoop {
    /// Create a new loop with default bounds.
    pub fn new(
        provider: Arc<dyn Provider>,
        model: impl Into<String>,
        tools: Arc<ToolRegistry>,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self {
            provider,
            model: model.into(),
            temperature: 0.7,
            max_tokens: None,
            tools,
            persona: Persona::default(),
            event_bus,
            max_rounds: 8,
            request_timeout: Duration::from_secs(30),
            loop_timeout: Duration::from_secs(120),
            parallel_tools: true,
        }
    }

    /// Build a loop from the application config with the built-in capabilities.
    pub fn from_config(
        config: &AppConfig,
        provider: Arc<dyn Provider>,
        model: impl Into<String>,
        event_bus: Arc<EventBus>,
    ) -> Self {
        let tools = luminous_tools::default_registry(
            &config.tools,
            Duration::from_secs(config.agent.tool_timeout_secs),
        );
        Self::new(provider, model, Arc::new(tools), event_bus)
            .with_temperature(config.default_temperature)
            .with_max_tokens(config.default_max_tokens)
            .with_persona(Persona::from_config(&config.persona))
            .with_settings(&config.agent)
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = Some(max);
        self
    }

    pub fn with_persona(mut self, persona: Persona) -> Self {
        self.persona = persona;
        self
    }

    pub fn with_max_rounds(mut self, max: usize) -> Self {
        self.max_rounds = max;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_loop_timeout(mut self, timeout: Duration) -> Self {
        self.loop_timeout = timeout;
        self
    }

    pub fn with_parallel_tools(mut self, enabled: bool) -> Self {
        self.parallel_tools = enabled;
        self
    }

    /// Apply the bounds from `[agent]`.
    pub fn with_settings(self, settings: &AgentSettings) -> Self {
        self.with_max_rounds(settings.max_rounds)
            .with_request_timeout(Duration::from_secs(settings.request_timeout_secs))
            .with_loop_timeout(Duration::from_secs(settings.loop_timeout_secs))
            .with_parallel_tools(settings.parallel_tools)
    }

    pub fn persona(&self) -> &Persona {
        &self.persona
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }

    /// Run one advance against a copy of `session`.
    ///
    /// 1. Append the input turn and build the directive
    /// 2. Call the model
    /// 3. If it requested capabilities: run them, append the results, go to 2
    /// 4. Otherwise post-process the reply and commit
    pub async fn advance(
        &self,
        session: &Session,
        input: Input,
    ) -> Result<AdvanceOutcome, AdvanceFailure> {
        let reflection = input.is_reflection();
        let mut run = Run {
            session: session.clone(),
            log: Vec::new(),
            tool_messages: Vec::new(),
            rounds: 0,
            deadline: Instant::now() + self.loop_timeout,
        };

        info!(
            turns = session.history.len(),
            reflection,
            provider = self.provider.name(),
            "Advancing session"
        );

        match self.drive(&mut run, input).await {
            Ok(reply) => Ok(AdvanceOutcome {
                reply,
                session: run.session,
                log: run.log,
                tool_messages: run.tool_messages,
                rounds: run.rounds,
            }),
            Err(error) => {
                warn!(error = %error, kind = error.kind(), "Advance failed");
                self.event_bus.publish(DomainEvent::ErrorOccurred {
                    context: if reflection { "reflection" } else { "chat" }.into(),
                    error_message: error.to_string(),
                    timestamp: Utc::now(),
                });
                let mut log = run.log;
                log.push(format!("{}: {error}", error.kind()));
                Err(AdvanceFailure { error, log })
            }
        }
    }

    async fn drive(&self, run: &mut Run, input: Input) -> Result<Option<String>, Error> {
        let reflection = input.is_reflection();
        let base_len = run.session.history.len();

        let prompt = match input {
            Input::Message(text) => {
                run.log.push("Luminous is processing...".into());
                text
            }
            Input::Reflection => {
                run.log.push("Autonomous reflection triggered.".into());
                REFLECTION_PROMPT.to_string()
            }
        };
        run.session.history.push(Turn::user(prompt))?;

        let definitions = self.tools.definitions();

        let response = loop {
            let directive = build_directive(
                &self.persona,
                &run.session.state,
                run.session.keepsake.as_deref(),
            );
            let request = ProviderRequest {
                model: self.model.clone(),
                system: Some(directive),
                turns: run.session.history.turns().to_vec(),
                temperature: self.temperature,
                max_tokens: self.max_tokens,
                tools: definitions.clone(),
            };

            let response = self.call_provider(request, run).await?;
            if !response.turn.has_invocations() {
                break response;
            }

            if run.rounds >= self.max_rounds {
                return Err(Error::ToolLoopExceeded {
                    rounds: run.rounds,
                    reason: format!(
                        "model still requesting capabilities after {} rounds",
                        self.max_rounds
                    ),
                });
            }
            run.rounds += 1;
            debug!(round = run.rounds, "Capability round");

            let calls: Vec<ToolCall> = response.turn.invocations().into_iter().cloned().collect();
            run.session.history.push(response.turn)?;

            let rounds = run.rounds;
            let remaining = run.deadline.saturating_duration_since(Instant::now());
            let results = tokio::time::timeout(remaining, self.run_round(&calls, run))
                .await
                .map_err(|_| self.deadline_exceeded(rounds))?;
            run.session.history.push_tool_results(results)?;
        };

        self.finish(run, response, reflection, base_len)
    }

    /// Race one provider call against the request timeout and the loop deadline.
    async fn call_provider(
        &self,
        request: ProviderRequest,
        run: &Run,
    ) -> Result<ProviderResponse, Error> {
        let remaining = run.deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(self.deadline_exceeded(run.rounds));
        }
        let limit = remaining.min(self.request_timeout);

        match tokio::time::timeout(limit, self.provider.complete(request)).await {
            Ok(response) => Ok(response?),
            Err(_) if limit < self.request_timeout => Err(self.deadline_exceeded(run.rounds)),
            Err(_) => Err(ProviderError::Timeout(format!(
                "no response from {} within {}s",
                self.provider.name(),
                self.request_timeout.as_secs()
            ))
            .into()),
        }
    }

    fn deadline_exceeded(&self, rounds: usize) -> Error {
        Error::ToolLoopExceeded {
            rounds,
            reason: format!(
                "loop deadline of {}s exceeded",
                self.loop_timeout.as_secs()
            ),
        }
    }

    /// Execute one round of invocations and fold their effects into `run`.
    /// Results come back in invocation order.
    async fn run_round(&self, calls: &[ToolCall], run: &mut Run) -> Vec<ToolResult> {
        for call in calls {
            run.tool_messages.push(format!("Using tool: {}...", call.name));
            run.log.push(format!("Invoking {} with {}", call.name, call.arguments));
        }

        let before = run.session.state;
        let ctx = ToolContext::new(before);
        let sequential =
            !self.parallel_tools || calls.iter().any(|c| self.tools.touches_state(&c.name));

        let executed = if sequential {
            let mut executed = Vec::with_capacity(calls.len());
            for call in calls {
                executed.push(self.run_tool(call, &ctx).await);
            }
            executed
        } else {
            join_all(calls.iter().map(|call| self.run_tool(call, &ctx))).await
        };

        let mut results = Vec::with_capacity(executed.len());
        for (result, lines) in executed {
            run.log.extend(lines);
            if result.success {
                run.log.push(format!("{} succeeded", result.name));
            } else {
                run.log.push(format!("{} failed: {}", result.name, result.summary()));
            }
            results.push(result);
        }

        let after = ctx.state();
        if after != before {
            self.publish_state(&before, &after);
            run.session.state = after;
        }
        results
    }

    async fn run_tool(&self, call: &ToolCall, ctx: &ToolContext) -> (ToolResult, Vec<String>) {
        let invocation = ctx.for_invocation();
        let start = Instant::now();
        let result = self.tools.execute(call, &invocation).await;
        let duration_ms = start.elapsed().as_millis() as u64;

        debug!(tool = %call.name, success = result.success, duration_ms, "Capability executed");
        self.event_bus.publish(DomainEvent::ToolExecuted {
            tool_name: call.name.clone(),
            success: result.success,
            duration_ms,
            timestamp: Utc::now(),
        });

        (result, invocation.take_log())
    }

    fn publish_state(&self, before: &InternalState, after: &InternalState) {
        let applied = Dimension::ALL
            .iter()
            .filter(|d| before.get(**d) != after.get(**d))
            .map(|d| d.key().to_string())
            .collect();
        self.event_bus.publish(DomainEvent::StateUpdated {
            applied,
            intrinsic_value: after.intrinsic_value(),
            timestamp: Utc::now(),
        });
    }

    /// Post-process the final reply and commit it to the session.
    fn finish(
        &self,
        run: &mut Run,
        response: ProviderResponse,
        reflection: bool,
        base_len: usize,
    ) -> Result<Option<String>, Error> {
        let unusable = match response.blocked.as_deref() {
            Some(reason) => Some(format!("blocked: {reason}")),
            None => response.is_empty().then(|| "empty reply".to_string()),
        };
        if let Some(reason) = unusable {
            if !reflection {
                return Err(ProviderError::EmptyResponse(reason).into());
            }
            return Ok(self.suppress(run, base_len));
        }

        let processed = post_process::process(&response.turn.text());
        run.log.extend(processed.log.iter().cloned());

        let before = run.session.state;
        let applied = processed.apply(
            &mut run.session.state,
            &mut run.session.keepsake,
            &mut run.log,
        );
        if let Some(keepsake) = &applied.keepsake {
            self.event_bus.publish(DomainEvent::KeepsakeSet {
                preview: keepsake.chars().take(80).collect(),
                timestamp: Utc::now(),
            });
        }
        if !applied.state.applied.is_empty() {
            self.publish_state(&before, &run.session.state);
        }

        if reflection && (processed.text.is_empty() || processed.text == NOTHING_TO_ADD) {
            return Ok(self.suppress(run, base_len));
        }

        run.session.history.push(Turn::model(processed.text.clone()))?;
        self.event_bus.publish(DomainEvent::ResponseGenerated {
            model: response.model,
            rounds: run.rounds,
            reflection,
            timestamp: Utc::now(),
        });
        info!(rounds = run.rounds, chars = processed.text.len(), "Reply ready");
        Ok(Some(processed.text))
    }

    /// Drop the reflection exchange from history, keeping state and keepsake.
    fn suppress(&self, run: &mut Run, base_len: usize) -> Option<String> {
        run.session.history.truncate(base_len);
        run.log.push("Reflection had nothing to add.".into());
        self.event_bus.publish(DomainEvent::ReflectionSkipped {
            reason: "nothing to add".into(),
            timestamp: Utc::now(),
        });
        None
    }
}
