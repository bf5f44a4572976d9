//! Protocol-native error envelopes.
//!
//! The same gateway error renders differently per inbound protocol:
//! Anthropic clients get `{"type":"error","error":{...}}`, Chat and
//! Responses clients get `{"error":{...}}`. Status-to-type mapping lives
//! on [`GatewayError`]; this module only chooses the envelope shape.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use gateway::{GatewayError, Protocol};
use protocol::{anthropic, chat};

/// A gateway error bound to the protocol the client speaks.
pub(crate) struct ProtocolError {
    protocol: Protocol,
    error: GatewayError,
}

impl ProtocolError {
    pub(crate) fn new(protocol: Protocol, error: GatewayError) -> Self {
        Self { protocol, error }
    }
}

impl IntoResponse for ProtocolError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.error.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        let error_type = self.error.error_type();
        let message = self.error.client_message();

        match self.protocol {
            Protocol::AnthropicMessages => {
                let body = anthropic::ErrorResponse::new(error_type, message);
                (status, Json(body)).into_response()
            }
            Protocol::ChatCompletions | Protocol::Responses => {
                let body = chat::ErrorResponse::new(error_type, message);
                (status, Json(body)).into_response()
            }
        }
    }
}

/// Result alias used by the inference handlers.
pub(crate) type HandlerResult<T> = Result<T, ProtocolError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn body_of(response: Response) -> (StatusCode, serde_json::Value) {
        let status = response.status();
        let bytes = futures::executor::block_on(axum::body::to_bytes(
            response.into_body(),
            usize::MAX,
        ))
        .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[test]
    fn anthropic_envelope_shape() {
        let error = ProtocolError::new(
            Protocol::AnthropicMessages,
            GatewayError::from_upstream_status(429, String::new()),
        );

        let (status, body) = body_of(error.into_response());

        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(body["type"], "error");
        assert_eq!(body["error"]["type"], "rate_limit_error");
    }

    #[test]
    fn chat_envelope_shape() {
        let error = ProtocolError::new(
            Protocol::ChatCompletions,
            GatewayError::InvalidRequest("missing model".to_string()),
        );

        let (status, body) = body_of(error.into_response());

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body.get("type").is_none());
        assert_eq!(body["error"]["type"], "invalid_request_error");
        assert_eq!(body["error"]["message"], "invalid request: missing model");
    }
}
