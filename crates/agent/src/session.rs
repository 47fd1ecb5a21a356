//! Serialized access to the one stored session.
//!
//! Every advance goes through an async mutex. Operator messages queue on it;
//! reflections only take it when it is free.

use std::sync::{Arc, Mutex as StdMutex};

use chrono::Utc;
use luminous_core::error::{Error, StoreError};
use luminous_core::event::DomainEvent;
use luminous_core::session::Session;
use luminous_memory::ConversationStore;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::loop_runner::{AdvanceFailure, AdvanceOutcome, AgentLoop, Input};

/// The result of one advance as seen by callers.
#[derive(Debug, Clone)]
pub struct Exchange {
    pub reply: Option<String>,
    pub session: Session,
    pub log: Vec<String>,
    pub tool_messages: Vec<String>,
    pub rounds: usize,
    /// Whether the session was written to the store
    pub saved: bool,
}

impl Exchange {
    fn new(outcome: AdvanceOutcome, saved: bool) -> Self {
        Self {
            reply: outcome.reply,
            session: outcome.session,
            log: outcome.log,
            tool_messages: outcome.tool_messages,
            rounds: outcome.rounds,
            saved,
        }
    }
}

/// Owns the stored session and runs advances against it one at a time.
pub struct SessionRunner {
    agent: Arc<AgentLoop>,
    store: ConversationStore,
    session: Mutex<Session>,
    last_activity: StdMutex<Instant>,
}

impl SessionRunner {
    /// Load the stored session (or the persona seed) and wrap it.
    pub async fn open(agent: Arc<AgentLoop>, store: ConversationStore) -> Result<Self, StoreError> {
        let store = store.with_seed(agent.persona().seed_session());
        let session = store.load().await?;
        info!(
            backend = store.backend_name(),
            key = store.key(),
            turns = session.history.len(),
            "Session opened"
        );
        Ok(Self {
            agent,
            store,
            session: Mutex::new(session),
            last_activity: StdMutex::new(Instant::now()),
        })
    }

    pub fn agent(&self) -> &Arc<AgentLoop> {
        &self.agent
    }

    pub fn store(&self) -> &ConversationStore {
        &self.store
    }

    /// Time since the last operator message.
    pub fn idle_for(&self) -> std::time::Duration {
        self.last_activity
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .elapsed()
    }

    fn touch(&self) {
        *self.last_activity.lock().unwrap_or_else(|e| e.into_inner()) = Instant::now();
    }

    /// A copy of the current session.
    pub async fn snapshot(&self) -> Session {
        self.session.lock().await.clone()
    }

    /// Send an operator message, waiting for any advance in flight.
    pub async fn submit(&self, message: impl Into<String>) -> Result<Exchange, AdvanceFailure> {
        self.touch();
        let mut session = self.session.lock().await;
        self.advance_locked(&mut session, Input::Message(message.into())).await
    }

    /// Send an operator message, or fail with `Busy` if an advance is in flight.
    pub async fn try_submit(&self, message: impl Into<String>) -> Result<Exchange, AdvanceFailure> {
        let Ok(mut session) = self.session.try_lock() else {
            return Err(busy());
        };
        self.touch();
        self.advance_locked(&mut session, Input::Message(message.into())).await
    }

    /// Run an autonomous reflection unless an advance is in flight.
    pub async fn try_reflect(&self) -> Result<Exchange, AdvanceFailure> {
        let Ok(mut session) = self.session.try_lock() else {
            debug!("Reflection skipped, session busy");
            self.agent.event_bus().publish(DomainEvent::ReflectionSkipped {
                reason: "session busy".into(),
                timestamp: Utc::now(),
            });
            return Err(busy());
        };
        self.advance_locked(&mut session, Input::Reflection).await
    }

    /// Advance a caller-held session. Nothing is stored, but the call still
    /// queues behind any advance in flight.
    pub async fn submit_detached(
        &self,
        session: &Session,
        input: Input,
    ) -> Result<Exchange, AdvanceFailure> {
        if !input.is_reflection() {
            self.touch();
        }
        let _guard = self.session.lock().await;
        let outcome = self.agent.advance(session, input).await?;
        Ok(Exchange::new(outcome, false))
    }

    /// Replace the stored session with the persona seed.
    pub async fn reset(&self) -> Result<Session, StoreError> {
        let mut session = self.session.lock().await;
        *session = self.store.reset().await?;
        info!(key = self.store.key(), "Session reset");
        Ok(session.clone())
    }

    async fn advance_locked(
        &self,
        session: &mut Session,
        input: Input,
    ) -> Result<Exchange, AdvanceFailure> {
        let mut outcome = self.agent.advance(session, input).await?;

        let saved = match self.store.save(&outcome.session).await {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "Failed to save session");
                outcome.log.push(format!("Failed to save session: {e}"));
                false
            }
        };
        *session = outcome.session.clone();
        Ok(Exchange::new(outcome, saved))
    }
}

fn busy() -> AdvanceFailure {
    AdvanceFailure {
        error: Error::Busy,
        log: vec!["Busy: an advance is already in flight".into()],
    }
}
