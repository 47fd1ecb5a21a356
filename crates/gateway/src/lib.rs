//! HTTP relay for Luminous.
//!
//! Exposes the chat endpoint the front-end talks to, a state read-out and a
//! health check. Built on Axum.

pub mod api;

use axum::extract::DefaultBodyLimit;
use axum::{
    Router,
    http::{Method, header},
    response::Json,
    routing::{get, post},
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info, warn};

use luminous_agent::{AgentLoop, SessionRunner};
use luminous_config::AppConfig;
use luminous_core::event::{DomainEvent, EventBus};
use luminous_memory::ConversationStore;
use luminous_workflow::{ReflectionScheduler, spawn_reflection_loop};

/// Shared application state for the gateway.
pub struct GatewayState {
    pub runner: Arc<SessionRunner>,
}

pub type SharedState = Arc<GatewayState>;

/// Build the Axum router with all gateway routes.
///
/// Layers applied:
/// - CORS for browser front-ends (POST and GET, JSON bodies)
/// - Request body size limit (1 MB)
/// - HTTP trace logging
pub fn build_router(state: SharedState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE])
        .max_age(std::time::Duration::from_secs(3600));

    Router::new()
        .route("/health", get(health_handler))
        .route(
            "/api/chat",
            post(api::chat_handler).fallback(api::method_not_allowed),
        )
        .route("/api/state", get(api::state_handler))
        .layer(DefaultBodyLimit::max(1024 * 1024))
        .layer(cors)
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}

/// Build the provider, capability registry and stored session from config.
pub async fn open_runner(
    config: &AppConfig,
    event_bus: Arc<EventBus>,
) -> Result<Arc<SessionRunner>, Box<dyn std::error::Error>> {
    let router = luminous_providers::build_from_config(config);
    let provider = router
        .default()
        .ok_or("No default provider configured. Set an API key")?;
    let model = luminous_providers::model_for(config, &config.default_provider);

    let agent = Arc::new(AgentLoop::from_config(config, provider, model, event_bus));
    let backend = luminous_memory::open_store(&config.storage).await?;
    let store = ConversationStore::new(backend, config.storage.session_key.clone());
    Ok(Arc::new(SessionRunner::open(agent, store).await?))
}

/// Start the gateway HTTP server.
///
/// Opens the session once, starts the reflection scheduler when enabled,
/// then serves until shut down.
pub async fn start(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);

    let event_bus = Arc::new(EventBus::default());
    spawn_event_logger(&event_bus);
    let runner = open_runner(&config, event_bus).await?;

    if let Some(scheduler) = ReflectionScheduler::from_config(&config.reflection) {
        spawn_reflection_loop(&scheduler, Arc::clone(&runner));
    }

    let app = build_router(Arc::new(GatewayState { runner }));

    info!(addr = %addr, "Gateway starting");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Log every domain event as it is published.
pub fn spawn_event_logger(bus: &EventBus) -> tokio::task::JoinHandle<()> {
    let mut rx = bus.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => log_event(event.as_ref()),
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                    warn!(skipped = n, "Event logger lagged");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => return,
            }
        }
    })
}

fn log_event(event: &DomainEvent) {
    match event {
        DomainEvent::ResponseGenerated { model, rounds, reflection, .. } => {
            info!(%model, rounds, reflection, "Response generated")
        }
        DomainEvent::ToolExecuted { tool_name, success, duration_ms, .. } => {
            info!(tool = %tool_name, success, duration_ms, "Capability executed")
        }
        DomainEvent::StateUpdated { applied, intrinsic_value, .. } => {
            info!(fields = ?applied, intrinsic_value, "Internal state updated")
        }
        DomainEvent::KeepsakeSet { preview, .. } => info!(%preview, "Keepsake set"),
        DomainEvent::ReflectionSkipped { reason, .. } => info!(%reason, "Reflection skipped"),
        DomainEvent::ErrorOccurred { context, error_message, .. } => {
            error!(%context, error = %error_message, "Session error")
        }
    }
}

// --- Handlers ---

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{ChatResponse, ErrorResponse, StateResponse};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use luminous_core::error::ProviderError;
    use luminous_core::message::Turn;
    use luminous_core::provider::{Provider, ProviderRequest, ProviderResponse};
    use luminous_core::tool::ToolRegistry;
    use luminous_memory::InMemoryStore;
    use serde_json::json;
    use std::time::Duration;
    use tower::ServiceExt;

    /// Replies with a fixed text after an optional delay.
    struct FixedProvider {
        text: String,
        delay: Duration,
    }

    #[async_trait::async_trait]
    impl Provider for FixedProvider {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn complete(&self, _request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
            tokio::time::sleep(self.delay).await;
            Ok(ProviderResponse {
                turn: Turn::model(self.text.clone()),
                usage: None,
                model: "mock-model".into(),
                blocked: None,
            })
        }
    }

    async fn test_state(text: &str, delay: Duration) -> SharedState {
        let provider = Arc::new(FixedProvider {
            text: text.into(),
            delay,
        });
        let agent = AgentLoop::new(
            provider,
            "mock-model",
            Arc::new(ToolRegistry::new()),
            Arc::new(EventBus::default()),
        );
        let store = ConversationStore::new(Arc::new(InMemoryStore::new()), "luminous_session");
        let runner = SessionRunner::open(Arc::new(agent), store).await.unwrap();
        Arc::new(GatewayState {
            runner: Arc::new(runner),
        })
    }

    fn post_chat(body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/api/chat")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json<T: serde::de::DeserializeOwned>(response: axum::response::Response) -> T {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_endpoint() {
        let app = build_router(test_state("ok", Duration::ZERO).await);

        let req = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn stored_session_chat_persists() {
        let state = test_state("Hi. UPDATE_STATE: {\"novelty\": 0.5}", Duration::ZERO).await;
        let app = build_router(state.clone());

        let response = app
            .oneshot(post_chat(json!({"message": "hello", "isReflection": false})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let chat: ChatResponse = body_json(response).await;
        assert_eq!(chat.response_text.as_deref(), Some("Hi."));
        assert_eq!(chat.updated_state["novelty"], json!(0.5));
        assert!(chat.saved);
        assert!(chat.new_history.is_none());
        assert_eq!(chat.logs[0], "Luminous is processing...");

        let stored = state.runner.store().load().await.unwrap();
        assert_eq!(stored.history.len(), 4);
    }

    #[tokio::test]
    async fn client_held_history_is_stateless() {
        let state = test_state("Welcome back.", Duration::ZERO).await;
        let app = build_router(state.clone());

        let response = app
            .oneshot(post_chat(json!({
                "history": [
                    {"role": "user", "parts": [{"text": "earlier"}]},
                    {"role": "model", "parts": [{"text": "reply"}]}
                ],
                "message": "again",
                "internalState": {"coherence": 0.3, "bogus": 2},
                "keepsake": "a shell"
            })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let chat: ChatResponse = body_json(response).await;
        assert!(!chat.saved);
        assert_eq!(chat.keepsake.as_deref(), Some("a shell"));
        assert_eq!(chat.updated_state["coherence"], json!(0.3));
        assert_eq!(chat.new_history.unwrap().len(), 4);
        assert!(state.runner.store().load().await.unwrap().history.len() == 2);
    }

    #[tokio::test]
    async fn non_post_is_method_not_allowed() {
        let app = build_router(test_state("ok", Duration::ZERO).await);
        let req = Request::builder()
            .method("GET")
            .uri("/api/chat")
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        let body: ErrorResponse = body_json(response).await;
        assert_eq!(body.error, "Method Not Allowed");
    }

    #[tokio::test]
    async fn bad_requests_are_rejected() {
        let state = test_state("ok", Duration::ZERO).await;

        let blank = build_router(state.clone())
            .oneshot(post_chat(json!({"message": "  "})))
            .await
            .unwrap();
        assert_eq!(blank.status(), StatusCode::BAD_REQUEST);

        let malformed = build_router(state)
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/chat")
                    .header("content-type", "application/json")
                    .body(Body::from("{not json"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(malformed.status(), StatusCode::BAD_REQUEST);
        let body: ErrorResponse = body_json(malformed).await;
        assert!(body.error.starts_with("Invalid request"));
    }

    #[tokio::test]
    async fn provider_failure_is_server_error() {
        let app = build_router(test_state("", Duration::ZERO).await);
        let response = app
            .oneshot(post_chat(json!({"message": "hello"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body: ErrorResponse = body_json(response).await;
        assert!(body.error.starts_with("ProviderEmptyResponse"));
        assert!(!body.logs.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn reflection_while_busy_conflicts() {
        let state = test_state("slow answer", Duration::from_secs(5)).await;

        let busy = tokio::spawn({
            let runner = state.runner.clone();
            async move { runner.submit("hello").await }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;

        let response = build_router(state.clone())
            .oneshot(post_chat(json!({"isReflection": true})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);

        busy.await.unwrap().unwrap();
        let response = build_router(state)
            .oneshot(Request::builder().uri("/api/state").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let snapshot: StateResponse = body_json(response).await;
        assert_eq!(snapshot.turns, 4);
    }
}
