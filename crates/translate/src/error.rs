use thiserror::Error;

/// Errors surfaced by the stream-side translators.
///
/// Whole-body translation is total and does not fail; only the SSE
/// scanner and the item-id tracker can reject input.
#[derive(Debug, Error)]
pub enum TranslateError {
    /// A `data:` payload was not valid JSON.
    #[error("malformed stream event: {0}")]
    MalformedEvent(#[from] serde_json::Error),

    /// A single SSE line exceeded the scanner's buffer limit.
    #[error("SSE line exceeds {limit} bytes")]
    LineTooLong {
        /// The configured limit.
        limit: usize,
    },
}
