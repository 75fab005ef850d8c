//! Ambient request context
//!
//! A task-local `RequestContext` carries correlation and identity ids across
//! await points without threading them through every signature. Handlers
//! establish a scope at the edge; the log writer reads it back implicitly.

use uuid::Uuid;

tokio::task_local! {
    static ACTIVE_REQUEST_CONTEXT: RequestContext;
}

/// Per-request identity, visible to all code running inside its scope.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestContext {
    /// End-to-end trace id, shared across services.
    pub correlation_id: String,
    /// Id of this hop only.
    pub request_id: String,
    pub user_id: Option<String>,
    pub session_id: Option<String>,
}

impl RequestContext {
    /// Fresh context with new correlation and request ids.
    pub fn new() -> Self {
        Self {
            correlation_id: Uuid::new_v4().to_string(),
            request_id: Uuid::new_v4().to_string(),
            user_id: None,
            session_id: None,
        }
    }

    /// Context continuing an existing trace. The request id is still fresh;
    /// only the correlation id is inherited.
    pub fn with_correlation_id(correlation_id: impl Into<String>) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            request_id: Uuid::new_v4().to_string(),
            user_id: None,
            session_id: None,
        }
    }

    /// Run `fut` with this context active. Scopes nest; an inner scope
    /// shadows the outer one for its duration and the outer context is
    /// visible again afterwards.
    pub async fn scope<F>(self, fut: F) -> F::Output
    where
        F: std::future::Future,
    {
        ACTIVE_REQUEST_CONTEXT.scope(self, fut).await
    }

    /// The active context, if the current task is inside a scope.
    pub fn current() -> Option<RequestContext> {
        ACTIVE_REQUEST_CONTEXT.try_with(|ctx| ctx.clone()).ok()
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new()
    }
}
