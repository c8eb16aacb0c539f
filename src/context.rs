//! Request context for engine operations.
//!
//! Carries the request id used in every log line, and the cancellation
//! signal every hook receives.

use crate::cancellation::CancellationSignal;
use uuid::Uuid;

/// Per-request context. Never shared across requests.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Unique identifier for this request
    pub request_id: String,
    cancellation: CancellationSignal,
}

impl RequestContext {
    /// Create a new request context with a specific request ID.
    pub fn new(request_id: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            cancellation: CancellationSignal::never(),
        }
    }

    /// Create a new request context with a generated request ID.
    pub fn with_generated_id() -> Self {
        Self::new(Uuid::new_v4().to_string())
    }

    /// Attach the cancellation signal of the owning request.
    pub fn with_cancellation(mut self, cancellation: CancellationSignal) -> Self {
        self.cancellation = cancellation;
        self
    }

    /// Get the request ID.
    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    /// Get the cancellation signal for this request.
    pub fn cancellation(&self) -> &CancellationSignal {
        &self.cancellation
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::with_generated_id()
    }
}
