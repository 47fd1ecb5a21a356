//! Autonomous reflection triggering.
//!
//! A [`ReflectionScheduler`] ticks on a fixed interval. Each tick fires with
//! a configured probability, or unconditionally once the operator has been
//! idle past a threshold. Triggers go out on a channel; the consumer feeds
//! them into [`SessionRunner::try_reflect`], which skips when a loop is
//! already running.

use chrono::{DateTime, Utc};
use luminous_agent::SessionRunner;
use luminous_config::ReflectionConfig;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Why a trigger fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerReason {
    /// The per-tick dice roll came up
    Chance,
    /// The operator has been quiet past the idle threshold
    Idle,
}

impl std::fmt::Display for TriggerReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TriggerReason::Chance => write!(f, "chance"),
            TriggerReason::Idle => write!(f, "idle"),
        }
    }
}

/// A request to run one reflection.
#[derive(Debug, Clone)]
pub struct ReflectionTrigger {
    pub reason: TriggerReason,
    pub fired_at: DateTime<Utc>,
}

/// Decides when the session should reflect on its own.
#[derive(Debug, Clone)]
pub struct ReflectionScheduler {
    interval: Duration,
    probability: f64,
    idle_threshold: Option<Duration>,
}

impl ReflectionScheduler {
    pub fn new(interval: Duration, probability: f64) -> Self {
        Self {
            interval,
            probability: probability.clamp(0.0, 1.0),
            idle_threshold: None,
        }
    }

    /// Fire regardless of the dice once idle for `threshold`.
    pub fn with_idle_threshold(mut self, threshold: Duration) -> Self {
        self.idle_threshold = Some(threshold);
        self
    }

    /// Build from `[reflection]`. Returns `None` when reflection is disabled.
    pub fn from_config(config: &ReflectionConfig) -> Option<Self> {
        if !config.enabled {
            return None;
        }
        let scheduler = Self::new(Duration::from_secs(config.interval_secs), config.probability);
        Some(match config.idle_minutes {
            0 => scheduler,
            minutes => scheduler.with_idle_threshold(Duration::from_secs(minutes * 60)),
        })
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Decide one tick.
    ///
    /// `roll` is uniform in `[0, 1)`. `idle` is time since the last operator
    /// message. `since_fire` is time since this scheduler last fired, if ever.
    /// An idle trigger repeats at most once per threshold.
    pub fn decide(
        &self,
        roll: f64,
        idle: Duration,
        since_fire: Option<Duration>,
    ) -> Option<TriggerReason> {
        if let Some(threshold) = self.idle_threshold
            && idle >= threshold
            && since_fire.is_none_or(|s| s >= threshold)
        {
            return Some(TriggerReason::Idle);
        }
        (roll < self.probability).then_some(TriggerReason::Chance)
    }

    /// Start the background ticker.
    ///
    /// `idle` reports time since the last operator message. The caller is
    /// responsible for feeding triggers into the session; the ticker stops
    /// when the receiver is dropped.
    pub fn start<F>(
        &self,
        idle: F,
    ) -> (mpsc::Receiver<ReflectionTrigger>, tokio::task::JoinHandle<()>)
    where
        F: Fn() -> Duration + Send + 'static,
    {
        let scheduler = self.clone();
        let (tx, rx) = mpsc::channel::<ReflectionTrigger>(4);

        let handle = tokio::spawn(async move {
            let start = Instant::now() + scheduler.interval;
            let mut interval = tokio::time::interval_at(start, scheduler.interval);
            let mut last_fire: Option<Instant> = None;

            loop {
                interval.tick().await;
                let roll: f64 = rand::random();
                let since_fire = last_fire.map(|t| t.elapsed());

                let Some(reason) = scheduler.decide(roll, idle(), since_fire) else {
                    continue;
                };
                last_fire = Some(Instant::now());
                debug!(%reason, "Reflection trigger fired");

                let trigger = ReflectionTrigger {
                    reason,
                    fired_at: Utc::now(),
                };
                // A full channel means a reflection is already pending
                match tx.try_send(trigger) {
                    Ok(()) => {}
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        debug!("Reflection already pending, dropping trigger");
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => {
                        debug!("Trigger receiver dropped, stopping reflection ticker");
                        return;
                    }
                }
            }
        });

        (rx, handle)
    }
}

/// Start the scheduler against a session runner and consume its triggers.
pub fn spawn_reflection_loop(
    scheduler: &ReflectionScheduler,
    runner: Arc<SessionRunner>,
) -> tokio::task::JoinHandle<()> {
    let idle_source = Arc::clone(&runner);
    let (mut rx, ticker) = scheduler.start(move || idle_source.idle_for());
    info!(interval_secs = scheduler.interval().as_secs(), "Reflection scheduler started");

    tokio::spawn(async move {
        while let Some(trigger) = rx.recv().await {
            match runner.try_reflect().await {
                Ok(exchange) => match exchange.reply {
                    Some(reply) => {
                        info!(reason = %trigger.reason, chars = reply.len(), "Reflection recorded")
                    }
                    None => debug!(reason = %trigger.reason, "Reflection had nothing to add"),
                },
                Err(failure) if failure.error.kind() == "Busy" => {
                    debug!("Reflection skipped, session busy");
                }
                Err(failure) => {
                    warn!(error = %failure.error, "Reflection failed");
                }
            }
        }
        ticker.abort();
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    const MIN: Duration = Duration::from_secs(60);

    #[test]
    fn chance_follows_probability() {
        let scheduler = ReflectionScheduler::new(Duration::from_secs(120), 0.1);
        assert_eq!(scheduler.decide(0.05, Duration::ZERO, None), Some(TriggerReason::Chance));
        assert_eq!(scheduler.decide(0.1, Duration::ZERO, None), None);
        assert_eq!(scheduler.decide(0.9, Duration::ZERO, None), None);
    }

    #[test]
    fn idle_threshold_fires_once_per_period() {
        let scheduler =
            ReflectionScheduler::new(Duration::from_secs(120), 0.0).with_idle_threshold(30 * MIN);
        assert_eq!(scheduler.decide(0.5, 10 * MIN, None), None);
        assert_eq!(scheduler.decide(0.5, 31 * MIN, None), Some(TriggerReason::Idle));
        assert_eq!(scheduler.decide(0.5, 33 * MIN, Some(2 * MIN)), None);
        assert_eq!(
            scheduler.decide(0.5, 62 * MIN, Some(31 * MIN)),
            Some(TriggerReason::Idle)
        );
    }

    #[test]
    fn config_maps_to_scheduler() {
        let mut config = ReflectionConfig {
            enabled: true,
            interval_secs: 120,
            probability: 0.1,
            idle_minutes: 0,
        };
        let scheduler = ReflectionScheduler::from_config(&config).unwrap();
        assert_eq!(scheduler.interval(), Duration::from_secs(120));
        assert!(scheduler.idle_threshold.is_none());

        config.idle_minutes = 30;
        let scheduler = ReflectionScheduler::from_config(&config).unwrap();
        assert_eq!(scheduler.idle_threshold, Some(30 * MIN));

        config.enabled = false;
        assert!(ReflectionScheduler::from_config(&config).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn ticker_emits_on_interval() {
        let scheduler = ReflectionScheduler::new(Duration::from_secs(120), 1.0);
        let (mut rx, handle) = scheduler.start(|| Duration::ZERO);

        let begin = Instant::now();
        let trigger = rx.recv().await.unwrap();
        assert_eq!(trigger.reason, TriggerReason::Chance);
        assert!(begin.elapsed() >= Duration::from_secs(120));

        drop(rx);
        tokio::time::advance(Duration::from_secs(240)).await;
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn ticker_fires_on_idle_with_zero_probability() {
        let idle = Arc::new(Mutex::new(Duration::ZERO));
        let scheduler =
            ReflectionScheduler::new(Duration::from_secs(60), 0.0).with_idle_threshold(5 * MIN);
        let source = Arc::clone(&idle);
        let (mut rx, handle) = scheduler.start(move || *source.lock().unwrap());

        tokio::time::advance(Duration::from_secs(180)).await;
        assert!(rx.try_recv().is_err());

        *idle.lock().unwrap() = 6 * MIN;
        let trigger = rx.recv().await.unwrap();
        assert_eq!(trigger.reason, TriggerReason::Idle);
        handle.abort();
    }

    struct Reflective;

    #[async_trait::async_trait]
    impl luminous_core::Provider for Reflective {
        fn name(&self) -> &str {
            "reflective"
        }

        async fn complete(
            &self,
            request: luminous_core::ProviderRequest,
        ) -> Result<luminous_core::ProviderResponse, luminous_core::ProviderError> {
            let prompt = request.turns.last().map(|t| t.text()).unwrap_or_default();
            let text = if prompt.starts_with("AUTONOMOUS_REFLECTION_TRIGGER") {
                "I notice I have been quiet."
            } else {
                "Hello."
            };
            Ok(luminous_core::ProviderResponse {
                turn: luminous_core::Turn::model(text),
                usage: None,
                model: "mock-model".into(),
                blocked: None,
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn reflection_loop_feeds_the_session() {
        let agent = luminous_agent::AgentLoop::new(
            Arc::new(Reflective),
            "mock-model",
            Arc::new(luminous_core::ToolRegistry::new()),
            Arc::new(luminous_core::EventBus::default()),
        );
        let store = luminous_memory::ConversationStore::new(
            Arc::new(luminous_memory::InMemoryStore::new()),
            "luminous_session",
        );
        let runner = Arc::new(SessionRunner::open(Arc::new(agent), store).await.unwrap());
        let seeded = runner.snapshot().await.history.len();

        let scheduler = ReflectionScheduler::new(Duration::from_secs(60), 1.0);
        let handle = spawn_reflection_loop(&scheduler, Arc::clone(&runner));
        tokio::time::sleep(Duration::from_secs(61)).await;
        tokio::task::yield_now().await;

        let session = runner.snapshot().await;
        assert_eq!(session.history.len(), seeded + 2);
        assert_eq!(
            session.history.last().unwrap().text(),
            "I notice I have been quiet."
        );
        handle.abort();
    }
}
