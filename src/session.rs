// ===================================================================================================
// Session factory boundary
// ===================================================================================================
//
// The actual agent planner and execution kernel are explicitly out of scope for this
// crate. `SessionFactory` is the seam an embedder plugs them in at:
// `handle_task_request` invokes it and propagates the decision verbatim. The accepted
// session is then expected to run independently and post its result back via
// `POST /task/result` — this trait does not see or await that progress.
// ===================================================================================================

use async_trait::async_trait;

use crate::messages::{SwarmTaskRequest, TaskRequestDecision};

#[async_trait]
pub trait SessionFactory: Send + Sync {
    /// Decide whether to accept a delegated task. Must return synchronously-or-promptly;
    /// the actual session work happens independently of this call.
    async fn on_task_request(&self, request: SwarmTaskRequest) -> TaskRequestDecision;
}

/// A factory that accepts every request and hands back a freshly minted session id.
/// Useful for dry-run/mock mode and tests.
pub struct MockSessionFactory;

#[async_trait]
impl SessionFactory for MockSessionFactory {
    async fn on_task_request(&self, _request: SwarmTaskRequest) -> TaskRequestDecision {
        TaskRequestDecision::accepted(uuid::Uuid::new_v4().to_string())
    }
}

/// A factory that refuses every request, as if `onTaskRequest` were unconfigured.
pub struct RefusingSessionFactory;

#[async_trait]
impl SessionFactory for RefusingSessionFactory {
    async fn on_task_request(&self, _request: SwarmTaskRequest) -> TaskRequestDecision {
        TaskRequestDecision::rejected("Node does not accept delegated tasks")
    }
}
