use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Mutex;

use crate::error::CoordinatorError;
use crate::session::now_ms;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentStatus {
    Assigned,
    InProgress,
    Completed,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Assignment {
    pub id: u64,
    pub username: String,
    pub test_id: Option<i64>,
    pub time_limit_secs: u64,
    pub started_at: u64,
    pub status: AssignmentStatus,
}

/// A still-open working window returned by [`AssignmentAuthority::check_window_at`].
#[derive(Debug, Clone)]
pub struct ActiveWindow {
    pub assignment: Assignment,
    pub elapsed_secs: u64,
}

/// Server-side authority over per-candidate working windows. The wall
/// clock here is the server's; a client manipulating its local clock
/// cannot extend its window because every privileged operation re-checks
/// elapsed time against `started_at` before proceeding.
///
/// Invariant: at most one `in_progress` assignment per username. `start`
/// force-completes all prior non-completed assignments under the same
/// lock that inserts the new one, so concurrent starts for one username
/// cannot interleave.
pub struct AssignmentAuthority {
    assignments: Mutex<Vec<Assignment>>,
}

impl AssignmentAuthority {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            assignments: Mutex::new(Vec::new()),
        })
    }

    pub async fn start(
        &self,
        username: &str,
        test_id: Option<i64>,
        time_limit_secs: u64,
    ) -> crate::error::Result<Assignment> {
        self.start_at(username, test_id, time_limit_secs, now_ms()).await
    }

    pub async fn start_at(
        &self,
        username: &str,
        test_id: Option<i64>,
        time_limit_secs: u64,
        now: u64,
    ) -> crate::error::Result<Assignment> {
        if username.is_empty() {
            return Err(CoordinatorError::invalid("username"));
        }
        if time_limit_secs == 0 {
            return Err(CoordinatorError::invalid("timeLimitSec"));
        }

        let mut assignments = self.assignments.lock().await;

        // Enforce the single-active-assignment invariant before inserting
        for existing in assignments
            .iter_mut()
            .filter(|a| a.username == username && a.status != AssignmentStatus::Completed)
        {
            existing.status = AssignmentStatus::Completed;
            tracing::info!(
                assignment_id = existing.id,
                username = %username,
                "Force-completed prior assignment"
            );
        }

        let assignment = Assignment {
            id: assignments.len() as u64 + 1,
            username: username.to_string(),
            test_id,
            time_limit_secs,
            started_at: now,
            status: AssignmentStatus::InProgress,
        };
        assignments.push(assignment.clone());

        tracing::info!(
            assignment_id = assignment.id,
            username = %username,
            time_limit_secs,
            "Assignment started"
        );
        Ok(assignment)
    }

    /// Idempotent transition to `completed`.
    pub async fn complete(&self, assignment_id: u64) -> crate::error::Result<()> {
        let mut assignments = self.assignments.lock().await;
        let assignment = assignments
            .iter_mut()
            .find(|a| a.id == assignment_id)
            .ok_or(CoordinatorError::AssignmentNotFound(assignment_id))?;
        assignment.status = AssignmentStatus::Completed;
        Ok(())
    }

    /// Most recent `in_progress` assignment for the username, if any.
    pub async fn get_active(&self, username: &str) -> Option<Assignment> {
        let assignments = self.assignments.lock().await;
        assignments
            .iter()
            .rev()
            .find(|a| a.username == username && a.status == AssignmentStatus::InProgress)
            .cloned()
    }

    pub async fn check_window(&self, username: &str) -> crate::error::Result<ActiveWindow> {
        self.check_window_at(username, now_ms()).await
    }

    /// Check whether the candidate's window is still open. Expiry is a
    /// side-effecting check: once elapsed time passes the limit the
    /// assignment is completed right here, so a stale window can never be
    /// used again even if the caller ignores the error.
    pub async fn check_window_at(
        &self,
        username: &str,
        now: u64,
    ) -> crate::error::Result<ActiveWindow> {
        let mut assignments = self.assignments.lock().await;
        let assignment = assignments
            .iter_mut()
            .rev()
            .find(|a| a.username == username && a.status == AssignmentStatus::InProgress)
            .ok_or_else(|| CoordinatorError::NoActiveAssignment(username.to_string()))?;

        let elapsed_secs = now.saturating_sub(assignment.started_at) / 1000;
        if elapsed_secs > assignment.time_limit_secs {
            assignment.status = AssignmentStatus::Completed;
            tracing::info!(
                assignment_id = assignment.id,
                username = %username,
                elapsed_secs,
                "Assignment window elapsed, auto-completing"
            );
            return Err(CoordinatorError::Expired(assignment.id));
        }

        Ok(ActiveWindow {
            assignment: assignment.clone(),
            elapsed_secs,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: u64 = 1_700_000_000_000;

    #[tokio::test]
    async fn test_start_validates_arguments() {
        let authority = AssignmentAuthority::new();

        let err = authority.start_at("", None, 600, NOW).await.unwrap_err();
        assert!(matches!(err, CoordinatorError::InvalidArgument(_)));

        let err = authority.start_at("bob", None, 0, NOW).await.unwrap_err();
        assert!(matches!(err, CoordinatorError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn test_single_active_assignment_per_username() {
        let authority = AssignmentAuthority::new();
        let first = authority.start_at("bob", Some(1), 600, NOW).await.unwrap();
        let second = authority
            .start_at("bob", Some(2), 900, NOW + 1000)
            .await
            .unwrap();

        let active = authority.get_active("bob").await.unwrap();
        assert_eq!(active.id, second.id);

        // Exactly one in_progress, the prior one completed
        let all = authority.assignments.lock().await;
        let in_progress: Vec<&Assignment> = all
            .iter()
            .filter(|a| a.status == AssignmentStatus::InProgress)
            .collect();
        assert_eq!(in_progress.len(), 1);
        assert_eq!(in_progress[0].id, second.id);
        assert_eq!(
            all.iter().find(|a| a.id == first.id).unwrap().status,
            AssignmentStatus::Completed
        );
    }

    #[tokio::test]
    async fn test_starts_for_different_usernames_are_independent() {
        let authority = AssignmentAuthority::new();
        authority.start_at("bob", None, 600, NOW).await.unwrap();
        authority.start_at("carol", None, 600, NOW).await.unwrap();

        assert!(authority.get_active("bob").await.is_some());
        assert!(authority.get_active("carol").await.is_some());
    }

    #[tokio::test]
    async fn test_complete_is_idempotent() {
        let authority = AssignmentAuthority::new();
        let a = authority.start_at("bob", None, 600, NOW).await.unwrap();

        authority.complete(a.id).await.unwrap();
        authority.complete(a.id).await.unwrap();
        assert!(authority.get_active("bob").await.is_none());
    }

    #[tokio::test]
    async fn test_complete_unknown_assignment() {
        let authority = AssignmentAuthority::new();
        let err = authority.complete(42).await.unwrap_err();
        assert!(matches!(err, CoordinatorError::AssignmentNotFound(42)));
    }

    #[tokio::test]
    async fn test_check_window_boundaries() {
        let authority = AssignmentAuthority::new();
        authority.start_at("bob", None, 600, NOW).await.unwrap();

        // One second before the limit: still open
        let window = authority
            .check_window_at("bob", NOW + 599_000)
            .await
            .unwrap();
        assert_eq!(window.elapsed_secs, 599);

        // One second past the limit: expired, and the assignment flips
        let err = authority
            .check_window_at("bob", NOW + 601_000)
            .await
            .unwrap_err();
        assert!(matches!(err, CoordinatorError::Expired(_)));
        assert!(authority.get_active("bob").await.is_none());

        // Subsequent checks see no active assignment
        let err = authority.check_window_at("bob", NOW + 602_000).await.unwrap_err();
        assert!(matches!(err, CoordinatorError::NoActiveAssignment(_)));
    }

    #[tokio::test]
    async fn test_check_window_without_assignment() {
        let authority = AssignmentAuthority::new();
        let err = authority.check_window_at("ghost", NOW).await.unwrap_err();
        assert!(matches!(err, CoordinatorError::NoActiveAssignment(_)));
    }
}
