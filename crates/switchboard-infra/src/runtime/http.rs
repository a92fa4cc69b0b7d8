//! HttpAgentRuntime: a remote agent runtime speaking NDJSON.
//!
//! Each turn is one `POST` to the agent's endpoint with a JSON body
//! `{run_id, thread_id, agent_id, message, depth}`. The response body is a
//! stream of raw events, one JSON object per line, read incrementally as
//! the runtime produces them.
//!
//! The optional bearer token is held as a [`SecretString`] and is only
//! exposed while building request headers.

use std::time::Duration;

use futures_util::StreamExt;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use uuid::Uuid;

use switchboard_core::runtime::{AgentRuntime, RawEventStream, RuntimeRequest};
use switchboard_types::error::RuntimeError;

use super::ndjson::{LineBuffer, parse_line};

/// Request body of one turn.
#[derive(Debug, Serialize)]
struct InvokeBody {
    run_id: Uuid,
    thread_id: Uuid,
    agent_id: String,
    message: String,
    depth: u8,
}

/// Remote agent runtime. Does not derive Debug: it holds the API key.
pub struct HttpAgentRuntime {
    name: String,
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<SecretString>,
}

impl HttpAgentRuntime {
    const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

    pub fn new(
        name: impl Into<String>,
        endpoint: impl Into<String>,
        api_key: Option<SecretString>,
    ) -> Result<Self, RuntimeError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Self::CONNECT_TIMEOUT)
            .build()
            .map_err(|e| RuntimeError::Unavailable(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            name: name.into(),
            client,
            endpoint: endpoint.into(),
            api_key,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn authorized(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => builder.bearer_auth(key.expose_secret()),
            None => builder,
        }
    }
}

/// Turn a non-2xx response into a runtime error carrying its body.
async fn ensure_success(
    response: reqwest::Response,
    endpoint: &str,
) -> Result<reqwest::Response, RuntimeError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let error_body = response.text().await.unwrap_or_default();
    tracing::warn!(%status, body = %error_body, %endpoint, "agent runtime error response");
    Err(RuntimeError::Unavailable(format!("HTTP {status}: {error_body}")))
}

impl AgentRuntime for HttpAgentRuntime {
    fn name(&self) -> &str {
        &self.name
    }

    /// Dropping the event stream drops the response, which closes the
    /// connection and stops the remote turn.
    fn supports_cancellation(&self) -> bool {
        true
    }

    fn invoke(&self, request: RuntimeRequest) -> RawEventStream {
        let body = InvokeBody {
            run_id: request.run_id,
            thread_id: request.thread_id,
            agent_id: request.agent_id,
            message: request.message,
            depth: request.depth,
        };
        let builder = self
            .authorized(self.client.post(&self.endpoint))
            .header(reqwest::header::ACCEPT, "application/x-ndjson")
            .json(&body);
        let endpoint = self.endpoint.clone();

        Box::pin(async_stream::try_stream! {
            let response = builder.send().await.map_err(|e| {
                RuntimeError::Unavailable(format!("request to {endpoint} failed: {e}"))
            })?;

            let response = ensure_success(response, &endpoint).await?;

            let mut bytes = response.bytes_stream();
            let mut lines = LineBuffer::new();
            while let Some(chunk) = bytes.next().await {
                let chunk = chunk.map_err(|e| RuntimeError::Stream(format!("response body read: {e}")))?;
                for line in lines.push(&chunk) {
                    if let Some(event) = parse_line(&line)? {
                        yield event;
                    }
                }
            }
            if let Some(rest) = lines.finish() {
                if let Some(event) = parse_line(&rest)? {
                    yield event;
                }
            }
        })
    }

    async fn check(&self) -> Result<(), RuntimeError> {
        // Any HTTP response means the endpoint is reachable.
        self.authorized(self.client.head(&self.endpoint))
            .send()
            .await
            .map(|_| ())
            .map_err(|e| RuntimeError::Unavailable(format!("{}: {e}", self.endpoint)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Router;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::post;
    use switchboard_types::runtime::RawEvent;

    /// Serve `router` on an ephemeral port and return its base URL.
    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn request(message: &str) -> RuntimeRequest {
        RuntimeRequest {
            run_id: Uuid::now_v7(),
            thread_id: Uuid::now_v7(),
            agent_id: "it-support".to_string(),
            message: message.to_string(),
            depth: 0,
            cancellation: Default::default(),
        }
    }

    async fn collect_events(stream: RawEventStream) -> Vec<Result<RawEvent, RuntimeError>> {
        stream.collect().await
    }

    #[tokio::test]
    async fn test_streams_ndjson_events() {
        let router = Router::new().route(
            "/runs",
            post(|body: String| async move {
                let parsed: serde_json::Value = serde_json::from_str(&body).unwrap();
                let echo = parsed["message"].as_str().unwrap_or_default().to_string();
                format!(
                    "{{\"event\":\"token\",\"data\":{{\"text\":\"{echo}\"}}}}\n\n{{\"event\":\"run_end\"}}"
                )
            }),
        );
        let base = serve(router).await;
        let runtime = HttpAgentRuntime::new("remote", format!("{base}/runs"), None).unwrap();

        let events = collect_events(runtime.invoke(request("hello"))).await;
        assert_eq!(events.len(), 2);
        let first = events[0].as_ref().unwrap();
        assert_eq!(first.event, "token");
        assert_eq!(first.data["text"], "hello");
        assert_eq!(events[1].as_ref().unwrap().event, "run_end");
    }

    #[tokio::test]
    async fn test_sends_bearer_token() {
        let router = Router::new().route(
            "/runs",
            post(|headers: HeaderMap| async move {
                match headers.get("authorization").and_then(|v| v.to_str().ok()) {
                    Some("Bearer sk-test") => (StatusCode::OK, "{\"event\":\"run_end\"}\n"),
                    _ => (StatusCode::UNAUTHORIZED, "missing token"),
                }
            }),
        );
        let base = serve(router).await;
        let url = format!("{base}/runs");

        let authed = HttpAgentRuntime::new("remote", url.clone(), Some(SecretString::from("sk-test"))).unwrap();
        let events = collect_events(authed.invoke(request("hi"))).await;
        assert!(events[0].is_ok());

        let anonymous = HttpAgentRuntime::new("remote", url, None).unwrap();
        let events = collect_events(anonymous.invoke(request("hi"))).await;
        assert_eq!(events.len(), 1);
        match &events[0] {
            Err(RuntimeError::Unavailable(msg)) => assert!(msg.contains("401")),
            other => panic!("expected Unavailable, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_undecodable_line_is_fatal() {
        let router = Router::new().route(
            "/runs",
            post(|| async { "{\"event\":\"token\",\"data\":{\"text\":\"a\"}}\nnot-json\n" }),
        );
        let base = serve(router).await;
        let runtime = HttpAgentRuntime::new("remote", format!("{base}/runs"), None).unwrap();

        let events = collect_events(runtime.invoke(request("hi"))).await;
        assert_eq!(events.len(), 2);
        assert!(matches!(events[1], Err(RuntimeError::Decode(_))));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint() {
        let runtime = HttpAgentRuntime::new("remote", "http://127.0.0.1:9/runs", None).unwrap();
        assert!(runtime.check().await.is_err());
        let events = collect_events(runtime.invoke(request("hi"))).await;
        assert!(matches!(events[0], Err(RuntimeError::Unavailable(_))));
    }
}
