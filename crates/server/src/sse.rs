//! SSE response framing for the client side.

use axum::{
    body::Body,
    http::{HeaderValue, header},
    response::Response,
};
use gateway::SseStream;

/// Wrap a gateway SSE stream in an HTTP response with the streaming
/// headers every client expects.
pub(crate) fn sse_response(stream: SseStream) -> Response {
    let mut response = Response::new(Body::from_stream(stream));

    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/event-stream"));
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));

    response
}
