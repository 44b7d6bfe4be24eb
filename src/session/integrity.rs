use std::sync::Arc;

use serde::Serialize;
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;

use crate::error::CoordinatorError;
use crate::session::now_ms;

/// Prior submissions by the same user within this window are compared
/// against a new submission's fingerprint.
pub const DUPLICATE_LOOKBACK_MINUTES: u64 = 30;

/// Burst policy: more than BURST_LIMIT submissions inside BURST_WINDOW_MINUTES
/// rejects further execution until the window ages out.
pub const BURST_WINDOW_MINUTES: u64 = 5;
pub const BURST_LIMIT: usize = 10;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
    pub id: u64,
    pub username: String,
    pub code: String,
    pub timestamp: u64,
    pub flagged: bool,
    #[serde(skip)]
    fingerprint: String,
}

/// Outcome of screening one execution attempt.
#[derive(Debug, Clone)]
pub struct ScreeningResult {
    pub submission_id: u64,
    /// Id of the prior submission flagged as reused content, if any
    pub flagged_prior: Option<u64>,
}

/// SHA-256 content fingerprint used to detect byte-identical resubmission.
pub fn fingerprint(code: &str) -> String {
    hex::encode(Sha256::digest(code.as_bytes()))
}

/// Append-only log of execution attempts with the two policies the execute
/// gate applies around it: duplicate-content flagging and burst throttling.
/// Both are sliding windows re-derived from timestamps on every check, so
/// there is no counter state that can drift from the log.
pub struct SubmissionMonitor {
    log: Mutex<Vec<Submission>>,
}

impl SubmissionMonitor {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            log: Mutex::new(Vec::new()),
        })
    }

    pub async fn log_submission(&self, username: &str, code: &str) -> u64 {
        self.log_submission_at(username, code, now_ms()).await
    }

    pub async fn log_submission_at(&self, username: &str, code: &str, now: u64) -> u64 {
        let mut log = self.log.lock().await;
        let id = log.len() as u64 + 1;
        log.push(Submission {
            id,
            username: username.to_string(),
            code: code.to_string(),
            timestamp: now,
            flagged: false,
            fingerprint: fingerprint(code),
        });
        tracing::debug!(submission_id = id, username = %username, "Submission logged");
        id
    }

    /// Submissions by `username` within the last `window_minutes`, oldest
    /// first. A snapshot, not a live stream.
    pub async fn recent_submissions(&self, username: &str, window_minutes: u64) -> Vec<Submission> {
        self.recent_submissions_at(username, window_minutes, now_ms()).await
    }

    pub async fn recent_submissions_at(
        &self,
        username: &str,
        window_minutes: u64,
        now: u64,
    ) -> Vec<Submission> {
        let cutoff = now.saturating_sub(window_minutes * 60 * 1000);
        let log = self.log.lock().await;
        log.iter()
            .filter(|s| s.username == username && s.timestamp >= cutoff)
            .cloned()
            .collect()
    }

    /// Idempotent: flagging an already-flagged submission is a no-op.
    pub async fn flag(&self, submission_id: u64) -> crate::error::Result<()> {
        let mut log = self.log.lock().await;
        let submission = log
            .iter_mut()
            .find(|s| s.id == submission_id)
            .ok_or(CoordinatorError::SubmissionNotFound(submission_id))?;
        submission.flagged = true;
        Ok(())
    }

    /// Log one execution attempt and apply both policies in order. The
    /// whole sequence holds the log lock, so two near-simultaneous
    /// submissions from one user cannot both slip under the burst limit.
    pub async fn screen(&self, username: &str, code: &str) -> crate::error::Result<ScreeningResult> {
        self.screen_at(username, code, now_ms()).await
    }

    pub async fn screen_at(
        &self,
        username: &str,
        code: &str,
        now: u64,
    ) -> crate::error::Result<ScreeningResult> {
        let new_fingerprint = fingerprint(code);
        let mut log = self.log.lock().await;

        let id = log.len() as u64 + 1;
        log.push(Submission {
            id,
            username: username.to_string(),
            code: code.to_string(),
            timestamp: now,
            flagged: false,
            fingerprint: new_fingerprint.clone(),
        });

        // Duplicate content: flag the most recent *prior* submission that
        // shares the fingerprint, never the one just logged.
        let dup_cutoff = now.saturating_sub(DUPLICATE_LOOKBACK_MINUTES * 60 * 1000);
        let flagged_prior = log
            .iter_mut()
            .rev()
            .skip(1)
            .find(|s| {
                s.username == username
                    && s.timestamp >= dup_cutoff
                    && s.fingerprint == new_fingerprint
            })
            .map(|prior| {
                prior.flagged = true;
                prior.id
            });
        if let Some(prior_id) = flagged_prior {
            tracing::warn!(
                username = %username,
                submission_id = id,
                flagged_prior = prior_id,
                "Identical code resubmitted, prior submission flagged"
            );
        }

        // Burst throttle, the new submission included
        let burst_cutoff = now.saturating_sub(BURST_WINDOW_MINUTES * 60 * 1000);
        let in_window: Vec<&Submission> = log
            .iter()
            .filter(|s| s.username == username && s.timestamp >= burst_cutoff)
            .collect();
        if in_window.len() > BURST_LIMIT {
            let oldest = in_window.first().map(|s| s.timestamp).unwrap_or(now);
            let retry_after_secs =
                (oldest + BURST_WINDOW_MINUTES * 60 * 1000).saturating_sub(now) / 1000;
            tracing::warn!(
                username = %username,
                count = in_window.len(),
                retry_after_secs,
                "Execution burst threshold exceeded"
            );
            return Err(CoordinatorError::RateLimited { retry_after_secs });
        }

        Ok(ScreeningResult {
            submission_id: id,
            flagged_prior,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: u64 = 1_700_000_000_000;
    const MINUTE: u64 = 60_000;

    #[tokio::test]
    async fn test_identical_code_flags_the_prior_submission() {
        let monitor = SubmissionMonitor::new();
        let first = monitor.screen_at("bob", "print(1)", NOW).await.unwrap();
        assert!(first.flagged_prior.is_none());

        let second = monitor
            .screen_at("bob", "print(1)", NOW + MINUTE)
            .await
            .unwrap();
        assert_eq!(second.flagged_prior, Some(first.submission_id));

        let recent = monitor
            .recent_submissions_at("bob", 30, NOW + MINUTE)
            .await;
        assert_eq!(recent.len(), 2);
        assert!(recent[0].flagged);
        assert!(!recent[1].flagged);
    }

    #[tokio::test]
    async fn test_different_code_flags_nothing() {
        let monitor = SubmissionMonitor::new();
        monitor.screen_at("bob", "print(1)", NOW).await.unwrap();
        let second = monitor
            .screen_at("bob", "print(2)", NOW + MINUTE)
            .await
            .unwrap();
        assert!(second.flagged_prior.is_none());

        let recent = monitor.recent_submissions_at("bob", 30, NOW + MINUTE).await;
        assert!(recent.iter().all(|s| !s.flagged));
    }

    #[tokio::test]
    async fn test_duplicate_outside_lookback_window_is_ignored() {
        let monitor = SubmissionMonitor::new();
        monitor.screen_at("bob", "print(1)", NOW).await.unwrap();

        let later = NOW + (DUPLICATE_LOOKBACK_MINUTES + 1) * MINUTE;
        let second = monitor.screen_at("bob", "print(1)", later).await.unwrap();
        assert!(second.flagged_prior.is_none());
    }

    #[tokio::test]
    async fn test_duplicates_scoped_per_username() {
        let monitor = SubmissionMonitor::new();
        monitor.screen_at("bob", "print(1)", NOW).await.unwrap();
        let other = monitor
            .screen_at("carol", "print(1)", NOW + MINUTE)
            .await
            .unwrap();
        assert!(other.flagged_prior.is_none());
    }

    #[tokio::test]
    async fn test_eleventh_submission_in_five_minutes_is_rejected() {
        let monitor = SubmissionMonitor::new();
        for i in 0..10 {
            monitor
                .screen_at("bob", &format!("attempt {i}"), NOW + i * 1000)
                .await
                .unwrap();
        }

        let err = monitor
            .screen_at("bob", "attempt 10", NOW + 10_000)
            .await
            .unwrap_err();
        match err {
            CoordinatorError::RateLimited { retry_after_secs } => {
                // Window opened at NOW, so it ages out 5 minutes later
                assert_eq!(retry_after_secs, (5 * MINUTE - 10_000) / 1000);
            }
            other => panic!("expected RateLimited, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_burst_window_ages_out() {
        let monitor = SubmissionMonitor::new();
        for i in 0..10 {
            monitor
                .screen_at("bob", &format!("attempt {i}"), NOW + i * 1000)
                .await
                .unwrap();
        }

        // Past the sliding window the same user can execute again
        let later = NOW + BURST_WINDOW_MINUTES * MINUTE + 10_000;
        assert!(monitor.screen_at("bob", "fresh", later).await.is_ok());
    }

    #[tokio::test]
    async fn test_flag_is_idempotent_and_checks_existence() {
        let monitor = SubmissionMonitor::new();
        let id = monitor.log_submission_at("bob", "print(1)", NOW).await;

        monitor.flag(id).await.unwrap();
        monitor.flag(id).await.unwrap();
        let recent = monitor.recent_submissions_at("bob", 30, NOW).await;
        assert!(recent[0].flagged);

        let err = monitor.flag(999).await.unwrap_err();
        assert!(matches!(err, CoordinatorError::SubmissionNotFound(999)));
    }

    #[tokio::test]
    async fn test_recent_submissions_chronological() {
        let monitor = SubmissionMonitor::new();
        monitor.log_submission_at("bob", "a", NOW).await;
        monitor.log_submission_at("bob", "b", NOW + 1000).await;
        monitor.log_submission_at("bob", "c", NOW + 2000).await;

        let recent = monitor.recent_submissions_at("bob", 5, NOW + 2000).await;
        let codes: Vec<&str> = recent.iter().map(|s| s.code.as_str()).collect();
        assert_eq!(codes, vec!["a", "b", "c"]);
    }
}
