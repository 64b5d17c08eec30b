use axum::{
    body::{to_bytes, Body, Bytes},
    http::{header::CONTENT_LENGTH, Request, StatusCode},
    middleware::Next,
    response::Response,
};
use std::time::Instant;

use crate::middleware::request_id::RequestId;

const MAX_BUFFERED_BODY_BYTES: usize = 64 * 1024;
const MAX_LOGGED_BODY_BYTES: usize = 2048;

/// Logs every 4xx/5xx response with its body preview, then forwards the same
/// body to the caller.
///
/// Only the path is logged. Query strings on this service carry OAuth codes
/// and login state and must not reach the logs.
pub async fn log_error_responses(req: Request<Body>, next: Next) -> Response {
    let method = req.method().to_string();
    let path = req.uri().path().to_string();
    let request_id = req
        .extensions()
        .get::<RequestId>()
        .map(|id| id.0.clone())
        .unwrap_or_default();
    let start = Instant::now();

    let response = next.run(req).await;
    let status = response.status();
    if !(status.is_client_error() || status.is_server_error()) {
        return response;
    }

    let event = ErrorEvent {
        status,
        method: &method,
        path: &path,
        request_id: &request_id,
        latency_ms: start.elapsed().as_millis() as u64,
    };

    let (mut parts, body) = response.into_parts();
    match to_bytes(body, MAX_BUFFERED_BODY_BYTES).await {
        Ok(bytes) => {
            event.log(&preview(&bytes));
            Response::from_parts(parts, Body::from(bytes))
        }
        Err(err) => {
            parts.headers.remove(CONTENT_LENGTH);
            event.log(&format!("<unreadable body: {}>", err));
            Response::from_parts(parts, Body::empty())
        }
    }
}

struct ErrorEvent<'a> {
    status: StatusCode,
    method: &'a str,
    path: &'a str,
    request_id: &'a str,
    latency_ms: u64,
}

impl ErrorEvent<'_> {
    fn log(&self, body: &str) {
        let status = self.status.as_u16();
        if self.status.is_server_error() {
            tracing::error!(
                status,
                method = self.method,
                path = self.path,
                request_id = self.request_id,
                latency_ms = self.latency_ms,
                body,
                "Request failed"
            );
        } else {
            tracing::warn!(
                status,
                method = self.method,
                path = self.path,
                request_id = self.request_id,
                latency_ms = self.latency_ms,
                body,
                "Request rejected"
            );
        }
    }
}

fn preview(bytes: &Bytes) -> String {
    if bytes.len() > MAX_LOGGED_BODY_BYTES {
        format!(
            "{}... (truncated, {} bytes total)",
            String::from_utf8_lossy(&bytes[..MAX_LOGGED_BODY_BYTES]),
            bytes.len()
        )
    } else {
        String::from_utf8_lossy(bytes).into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{routing::get, Router};
    use tower::ServiceExt;

    #[tokio::test]
    async fn error_body_is_forwarded_unchanged() {
        let app = Router::new()
            .route(
                "/fail",
                get(|| async { (StatusCode::BAD_REQUEST, "bad input") }),
            )
            .layer(axum::middleware::from_fn(log_error_responses));

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/fail?code=secret")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        assert_eq!(&body[..], b"bad input");
    }

    #[test]
    fn long_bodies_are_truncated_in_preview() {
        let bytes = Bytes::from(vec![b'a'; MAX_LOGGED_BODY_BYTES + 10]);
        let text = preview(&bytes);
        assert!(text.ends_with(&format!("(truncated, {} bytes total)", bytes.len())));
    }
}
