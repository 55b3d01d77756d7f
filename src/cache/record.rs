// Cached workflow-run snapshot for one tracked repository of one user.
// All changes to the validator, payload and check time go through the mutators here.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, RunwatchError};
use crate::github::{RepoCoordinates, WorkflowRun};

/// Identifies a cache record: which user tracks which repository.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    pub owner_identity: String,
    pub repo: RepoCoordinates,
}

impl CacheKey {
    pub fn new(owner_identity: impl Into<String>, repo: RepoCoordinates) -> Self {
        Self {
            owner_identity: owner_identity.into(),
            repo,
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.owner_identity, self.repo)
    }
}

/// Last known recent-runs result for a (user, repository) pair.
///
/// `etag` is only ever set together with the `payload` it validates, and
/// `last_checked_at` never moves backwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheRecord {
    owner_identity: String,
    repo: RepoCoordinates,
    created_at: DateTime<Utc>,
    last_checked_at: Option<DateTime<Utc>>,
    etag: Option<String>,
    payload: Option<String>,
}

impl CacheRecord {
    /// A record for a newly tracked repository that has never been checked.
    pub fn new(key: CacheKey, created_at: DateTime<Utc>) -> Self {
        Self {
            owner_identity: key.owner_identity,
            repo: key.repo,
            created_at,
            last_checked_at: None,
            etag: None,
            payload: None,
        }
    }

    pub fn key(&self) -> CacheKey {
        CacheKey::new(self.owner_identity.clone(), self.repo.clone())
    }

    pub fn owner_identity(&self) -> &str {
        &self.owner_identity
    }

    pub fn repo(&self) -> &RepoCoordinates {
        &self.repo
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn last_checked_at(&self) -> Option<DateTime<Utc>> {
        self.last_checked_at
    }

    pub fn etag(&self) -> Option<&str> {
        self.etag.as_deref()
    }

    /// Serialized run list, as stored.
    pub fn payload(&self) -> Option<&str> {
        self.payload.as_deref()
    }

    /// Decode the stored run list.
    pub fn runs(&self) -> Result<Option<Vec<WorkflowRun>>> {
        self.payload
            .as_deref()
            .map(serde_json::from_str::<Vec<WorkflowRun>>)
            .transpose()
            .map_err(RunwatchError::from)
    }

    /// Whether the payload may be served without contacting the upstream.
    pub fn is_fresh(&self, now: DateTime<Utc>, window: Duration) -> bool {
        match (self.last_checked_at, &self.payload) {
            (Some(checked), Some(_)) => now.signed_duration_since(checked) < window,
            _ => false,
        }
    }

    /// Replace the snapshot with newly fetched runs.
    pub fn apply_fresh(
        &mut self,
        runs: &[WorkflowRun],
        validator: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let payload = serde_json::to_string(runs)?;
        self.payload = Some(payload);
        self.etag = validator;
        self.advance_checked(now);
        Ok(())
    }

    /// Record that the upstream confirmed the snapshot is still current.
    pub fn mark_not_modified(&mut self, now: DateTime<Utc>) {
        self.advance_checked(now);
    }

    /// Check the invariants of a record read back from storage.
    pub fn validate(&self) -> Result<()> {
        if self.etag.is_some() && self.payload.is_none() {
            return Err(RunwatchError::Storage(format!(
                "record {} has a validator without a payload",
                self.key()
            )));
        }
        Ok(())
    }

    fn advance_checked(&mut self, now: DateTime<Utc>) {
        self.last_checked_at = Some(match self.last_checked_at {
            Some(previous) if previous > now => previous,
            _ => now,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::github::{RunConclusion, RunStatus};

    fn record() -> CacheRecord {
        CacheRecord::new(
            CacheKey::new("42", RepoCoordinates::new("phatblat", "jolt")),
            Utc::now(),
        )
    }

    fn runs() -> Vec<WorkflowRun> {
        vec![WorkflowRun {
            id: 1,
            name: Some("CI".to_string()),
            status: RunStatus::Completed,
            conclusion: Some(RunConclusion::Success),
            head_branch: Some("main".to_string()),
            created_at: Utc::now(),
            html_url: "https://github.com/phatblat/jolt/actions/runs/1".to_string(),
        }]
    }

    #[test]
    fn test_new_record_is_blank() {
        let record = record();
        assert!(record.last_checked_at().is_none());
        assert!(record.etag().is_none());
        assert!(record.runs().unwrap().is_none());
        assert!(!record.is_fresh(Utc::now(), Duration::seconds(60)));
    }

    #[test]
    fn test_apply_fresh_sets_all_fields() {
        let mut record = record();
        let now = Utc::now();
        record
            .apply_fresh(&runs(), Some("\"xyz\"".to_string()), now)
            .unwrap();

        assert_eq!(record.runs().unwrap(), Some(runs()));
        assert_eq!(record.etag(), Some("\"xyz\""));
        assert_eq!(record.last_checked_at(), Some(now));
    }

    #[test]
    fn test_freshness_window() {
        let mut record = record();
        let now = Utc::now();
        record
            .apply_fresh(&runs(), None, now - Duration::seconds(30))
            .unwrap();

        assert!(record.is_fresh(now, Duration::seconds(60)));
        assert!(!record.is_fresh(now + Duration::seconds(30), Duration::seconds(60)));
    }

    #[test]
    fn test_last_checked_never_moves_backwards() {
        let mut record = record();
        let now = Utc::now();
        record.apply_fresh(&runs(), None, now).unwrap();

        record.mark_not_modified(now - Duration::seconds(10));
        assert_eq!(record.last_checked_at(), Some(now));

        let later = now + Duration::seconds(10);
        record.mark_not_modified(later);
        assert_eq!(record.last_checked_at(), Some(later));
    }

    #[test]
    fn test_validate_rejects_orphan_validator() {
        let json = r#"{
            "owner_identity": "42",
            "repo": {"owner": "o", "name": "r"},
            "created_at": "2024-05-01T12:00:00Z",
            "last_checked_at": null,
            "etag": "\"abc\"",
            "payload": null
        }"#;
        let record: CacheRecord = serde_json::from_str(json).unwrap();
        assert!(record.validate().is_err());
    }
}
