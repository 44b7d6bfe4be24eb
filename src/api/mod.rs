pub mod routes;
pub mod websocket;

use std::sync::Arc;

use crate::sandbox::CodeSandbox;
use crate::session::{AssignmentAuthority, RoomRegistry, SignalingRelay, SubmissionMonitor};

/// Shared state behind every route: the four coordinator services plus the
/// external execution collaborator. Constructed once at process start.
pub struct AppState {
    pub registry: Arc<RoomRegistry>,
    pub relay: Arc<SignalingRelay>,
    pub assignments: Arc<AssignmentAuthority>,
    pub submissions: Arc<SubmissionMonitor>,
    pub sandbox: Arc<dyn CodeSandbox>,
    /// Default meeting duration in minutes when the creator omits one
    pub default_duration_minutes: u64,
}

impl AppState {
    pub fn new(sandbox: Arc<dyn CodeSandbox>, default_duration_minutes: u64) -> Arc<Self> {
        let registry = RoomRegistry::new();
        Arc::new(Self {
            relay: SignalingRelay::new(registry.clone()),
            registry,
            assignments: AssignmentAuthority::new(),
            submissions: SubmissionMonitor::new(),
            sandbox,
            default_duration_minutes,
        })
    }
}
