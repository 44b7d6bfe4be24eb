/// Boundary to the code-execution collaborator. The coordinator only gates
/// access (timing window, integrity screening); actually running candidate
/// code is someone else's problem and must happen in an OS-level isolated
/// sandbox, not in this process.
pub trait CodeSandbox: Send + Sync {
    fn execute(&self, code: &str) -> crate::error::Result<String>;
}

/// Placeholder backend for deployments where the execution service is not
/// wired up. Passes the gate checks through and reports that nothing ran.
pub struct StubSandbox;

impl CodeSandbox for StubSandbox {
    fn execute(&self, _code: &str) -> crate::error::Result<String> {
        Ok("execution backend not configured".to_string())
    }
}
