use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use serde::Serialize;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use super::{signature, WebhookError};
use crate::domain::models::WebhookDelivery;
use crate::services::listener::{DeliveryOutcome, IgnoreReason, Listener};

/// Route receiving provider deliveries.
pub const WEBHOOK_PATH: &str = "/api/github/webhooks";

const EVENT_HEADER: &str = "x-github-event";
const SIGNATURE_HEADER: &str = "x-hub-signature-256";
const DELIVERY_HEADER: &str = "x-github-delivery";

struct WebhookState {
    listener: Listener,
    secret: Option<String>,
}

#[derive(Debug, Serialize)]
struct DeliveryResponse {
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<String>,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    listener_started: bool,
    pending: usize,
}

/// Webhook HTTP server feeding a [`Listener`].
pub struct WebhookServer {
    state: Arc<WebhookState>,
}

impl WebhookServer {
    /// Build a server for `listener`. Signatures are verified when `secret`
    /// is non-empty.
    pub fn new(listener: Listener, secret: Option<String>) -> Self {
        Self {
            state: Arc::new(WebhookState {
                listener,
                secret: secret.filter(|s| !s.is_empty()),
            }),
        }
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route(WEBHOOK_PATH, post(receive_delivery))
            .route("/health", get(health_check))
            .with_state(Arc::clone(&self.state))
            .layer(TraceLayer::new_for_http())
    }

    /// Bind `addr` and serve until `shutdown` resolves.
    pub async fn serve_with_shutdown<F>(self, addr: SocketAddr, shutdown: F) -> anyhow::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let router = self.router();
        let listener = TcpListener::bind(addr).await?;
        info!(%addr, path = WEBHOOK_PATH, "webhook server listening");

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown)
            .await?;
        Ok(())
    }
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

async fn receive_delivery(
    State(state): State<Arc<WebhookState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, WebhookError> {
    let event = header(&headers, EVENT_HEADER).ok_or(WebhookError::MissingEvent)?;
    let delivery_id = header(&headers, DELIVERY_HEADER).unwrap_or("-");

    if let Some(secret) = &state.secret {
        if let Err(err) = signature::verify(secret, header(&headers, SIGNATURE_HEADER), &body) {
            warn!(delivery_id, error = %err, "rejected delivery");
            return Err(err);
        }
    }

    if event == "ping" {
        debug!(delivery_id, "ping");
        return Ok((
            StatusCode::OK,
            Json(DeliveryResponse {
                status: "pong",
                reason: None,
            }),
        )
            .into_response());
    }

    let delivery = WebhookDelivery::parse(event, &body)?;
    let response = match state.listener.deliver(delivery) {
        DeliveryOutcome::Accepted => (
            StatusCode::ACCEPTED,
            Json(DeliveryResponse {
                status: "accepted",
                reason: None,
            }),
        ),
        // Not acknowledged, so the provider can redeliver it.
        DeliveryOutcome::Ignored(reason @ IgnoreReason::NotStarted) => {
            warn!(delivery_id, "listener not started, delivery refused");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(DeliveryResponse {
                    status: "unavailable",
                    reason: Some(format!("{reason:?}")),
                }),
            )
        }
        DeliveryOutcome::Ignored(reason) => {
            debug!(delivery_id, ?reason, "delivery ignored");
            (
                StatusCode::OK,
                Json(DeliveryResponse {
                    status: "ignored",
                    reason: Some(format!("{reason:?}")),
                }),
            )
        }
    };
    Ok(response.into_response())
}

async fn health_check(
    State(state): State<Arc<WebhookState>>,
) -> (StatusCode, Json<HealthResponse>) {
    let started = state.listener.is_started();
    let (code, status) = if started {
        (StatusCode::OK, "healthy")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "starting")
    };
    (
        code,
        Json(HealthResponse {
            status,
            listener_started: started,
            pending: state.listener.pending(),
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::errors::{ProviderError, ProviderResult};
    use crate::domain::models::config::ListenerConfig;
    use crate::domain::models::{RepositoryPayload, SearchPage, SearchQuery};
    use crate::domain::ports::IssueProvider;
    use crate::services::dispatcher::SubscriptionRegistry;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use serde_json::json;
    use tower::ServiceExt;

    struct RepoProvider;

    #[async_trait]
    impl IssueProvider for RepoProvider {
        async fn fetch_repository(&self, fullname: &str) -> ProviderResult<RepositoryPayload> {
            if fullname != "acme/widgets" {
                return Err(ProviderError::Http {
                    status: 502,
                    message: "bad gateway".to_string(),
                });
            }
            Ok(RepositoryPayload {
                id: 42,
                name: "widgets".to_string(),
                full_name: fullname.to_string(),
                ..RepositoryPayload::default()
            })
        }

        async fn search(&self, _query: &SearchQuery, _page: u32) -> ProviderResult<SearchPage> {
            Err(ProviderError::Transport("unused".to_string()))
        }
    }

    fn listener(repos: &[&str]) -> Listener {
        Listener::new(
            ListenerConfig {
                repos: repos.iter().map(ToString::to_string).collect(),
                users: vec!["alice".to_string()],
                ..ListenerConfig::default()
            },
            Arc::new(RepoProvider),
            SubscriptionRegistry::new(),
        )
        .unwrap()
    }

    async fn server(secret: Option<&str>) -> WebhookServer {
        let listener = listener(&["acme/widgets"]);
        listener.start().await.unwrap();
        WebhookServer::new(listener, secret.map(str::to_string))
    }

    fn opened_body() -> String {
        json!({
            "action": "opened",
            "issue": {
                "id": 1001,
                "number": 7,
                "state": "open",
                "user": {"login": "alice"}
            },
            "repository": {"id": 42, "name": "widgets", "full_name": "acme/widgets"}
        })
        .to_string()
    }

    fn request(event: Option<&str>, signature: Option<&str>, body: String) -> Request<Body> {
        let mut builder = Request::builder().method("POST").uri(WEBHOOK_PATH);
        if let Some(event) = event {
            builder = builder.header(EVENT_HEADER, event);
        }
        if let Some(signature) = signature {
            builder = builder.header(SIGNATURE_HEADER, signature);
        }
        builder.body(Body::from(body)).unwrap()
    }

    #[tokio::test]
    async fn test_accepts_delivery() {
        let router = server(None).await.router();
        let response = router
            .oneshot(request(Some("issues"), None, opened_body()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
    }

    #[tokio::test]
    async fn test_missing_event_header() {
        let router = server(None).await.router();
        let response = router
            .oneshot(request(None, None, opened_body()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_ping() {
        let router = server(None).await.router();
        let response = router
            .oneshot(request(Some("ping"), None, "{}".to_string()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_signature_required_when_secret_set() {
        let router = server(Some("s3cret")).await.router();

        let unsigned = router
            .clone()
            .oneshot(request(Some("issues"), None, opened_body()))
            .await
            .unwrap();
        assert_eq!(unsigned.status(), StatusCode::UNAUTHORIZED);

        let body = opened_body();
        let signature = signature::sign("s3cret", body.as_bytes()).unwrap();
        let signed = router
            .oneshot(request(Some("issues"), Some(&signature), body))
            .await
            .unwrap();
        assert_eq!(signed.status(), StatusCode::ACCEPTED);
    }

    #[tokio::test]
    async fn test_malformed_payload() {
        let router = server(None).await.router();
        let response = router
            .oneshot(request(Some("issues"), None, "not json".to_string()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_unsupported_action_is_ignored() {
        let router = server(None).await.router();
        let body = opened_body().replace("\"opened\"", "\"pinned\"");
        let response = router
            .oneshot(request(Some("issues"), None, body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_health() {
        let router = server(None).await.router();
        let response = router
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_unavailable_until_listener_started() {
        let listener = listener(&["acme/widgets", "acme/unreachable"]);
        assert!(listener.start().await.is_err());
        let router = WebhookServer::new(listener, None).router();

        let response = router
            .clone()
            .oneshot(request(Some("issues"), None, opened_body()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        let health = router
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(health.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
