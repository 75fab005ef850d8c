//! Request instrumentation
//!
//! Establishes the ambient `RequestContext` for each request (propagating an
//! inbound trace id when present, minting one otherwise), measures latency,
//! echoes both ids on the response, and records a completion log entry whose
//! severity follows the response status.

use crate::auth::AuthInfo;
use crate::context::RequestContext;
use crate::handlers::AppState;
use crate::logs::HttpRequestLog;
use axum::{
    extract::{Request, State},
    http::{HeaderMap, HeaderValue},
    middleware::Next,
    response::Response,
};
use std::time::Instant;

pub const TRACE_ID_HEADER: &str = "x-trace-id";
pub const REQUEST_ID_HEADER: &str = "x-request-id";

pub async fn instrument_request(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let mut ctx = match inbound_trace_id(req.headers()) {
        Some(trace_id) => RequestContext::with_correlation_id(trace_id),
        None => RequestContext::new(),
    };
    if let Some(auth) = req.extensions().get::<AuthInfo>() {
        ctx.user_id = Some(auth.token_name.clone());
    }

    let correlation_id = ctx.correlation_id.clone();
    let request_id = ctx.request_id.clone();
    let method = req.method().to_string();
    let path = req.uri().path().to_string();
    let start = Instant::now();

    let writer = state.request_writer.clone();
    let mut response = ctx
        .scope(async move {
            let response = next.run(req).await;
            // recorded inside the scope so the entry carries the request ids
            writer
                .http_request(HttpRequestLog {
                    method,
                    path,
                    status_code: response.status().as_u16(),
                    duration_ms: start.elapsed().as_millis() as u64,
                    detail: None,
                })
                .await;
            response
        })
        .await;

    let headers = response.headers_mut();
    if let Ok(value) = HeaderValue::from_str(&correlation_id) {
        headers.insert(TRACE_ID_HEADER, value);
    }
    if let Ok(value) = HeaderValue::from_str(&request_id) {
        headers.insert(REQUEST_ID_HEADER, value);
    }

    response
}

fn inbound_trace_id(headers: &HeaderMap) -> Option<String> {
    headers
        .get(TRACE_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
}
