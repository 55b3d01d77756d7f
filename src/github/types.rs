// GitHub API response types.
// Defines structs for deserializing GitHub REST API responses and repository coordinates.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::RunwatchError;

/// Owner and name of a GitHub repository.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RepoCoordinates {
    pub owner: String,
    pub name: String,
}

impl RepoCoordinates {
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for RepoCoordinates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

impl FromStr for RepoCoordinates {
    type Err = RunwatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().split_once('/') {
            Some((owner, name))
                if !owner.is_empty() && !name.is_empty() && !name.contains('/') =>
            {
                Ok(Self::new(owner, name))
            }
            _ => Err(RunwatchError::InvalidRepo(s.to_string())),
        }
    }
}

/// Owner type discriminator (user or organization).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum OwnerType {
    #[default]
    User,
    Organization,
    Bot,
    #[serde(other)]
    Unknown,
}

/// GitHub user or organization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Owner {
    pub id: u64,
    pub login: String,
    #[serde(rename = "type", default)]
    pub owner_type: OwnerType,
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

/// GitHub repository, as returned by repository search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Repository {
    pub id: u64,
    pub name: String,
    pub full_name: String,
    pub owner: Owner,
    pub private: bool,
    pub description: Option<String>,
    pub updated_at: DateTime<Utc>,
    pub pushed_at: Option<DateTime<Utc>>,
}

impl Repository {
    pub fn coordinates(&self) -> RepoCoordinates {
        RepoCoordinates::new(&self.owner.login, &self.name)
    }
}

/// GitHub Actions workflow run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowRun {
    pub id: u64,
    pub name: Option<String>,
    pub status: RunStatus,
    pub conclusion: Option<RunConclusion>,
    pub head_branch: Option<String>,
    pub created_at: DateTime<Utc>,
    pub html_url: String,
}

impl WorkflowRun {
    /// The state shown for a run: its conclusion once finished, otherwise its status.
    pub fn display_state(&self) -> &'static str {
        match self.conclusion {
            Some(conclusion) => conclusion.as_str(),
            None => self.status.as_str(),
        }
    }

    pub fn tone(&self) -> StatusTone {
        match (self.conclusion, self.status) {
            (Some(RunConclusion::Success), _) => StatusTone::Success,
            (Some(RunConclusion::Failure), _) => StatusTone::Failure,
            (Some(_), _) => StatusTone::Neutral,
            (None, RunStatus::InProgress | RunStatus::Queued) => StatusTone::Pending,
            (None, _) => StatusTone::Neutral,
        }
    }
}

/// Coarse classification of a run for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusTone {
    Success,
    Failure,
    Pending,
    Neutral,
}

/// Workflow run status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Queued,
    InProgress,
    Completed,
    Waiting,
    Requested,
    Pending,
    #[serde(other)]
    Unknown,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Queued => "queued",
            RunStatus::InProgress => "in_progress",
            RunStatus::Completed => "completed",
            RunStatus::Waiting => "waiting",
            RunStatus::Requested => "requested",
            RunStatus::Pending => "pending",
            RunStatus::Unknown => "unknown",
        }
    }
}

/// Workflow run conclusion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunConclusion {
    Success,
    Failure,
    Cancelled,
    Skipped,
    TimedOut,
    ActionRequired,
    Neutral,
    Stale,
    StartupFailure,
    #[serde(other)]
    Unknown,
}

impl RunConclusion {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunConclusion::Success => "success",
            RunConclusion::Failure => "failure",
            RunConclusion::Cancelled => "cancelled",
            RunConclusion::Skipped => "skipped",
            RunConclusion::TimedOut => "timed_out",
            RunConclusion::ActionRequired => "action_required",
            RunConclusion::Neutral => "neutral",
            RunConclusion::Stale => "stale",
            RunConclusion::StartupFailure => "startup_failure",
            RunConclusion::Unknown => "unknown",
        }
    }
}

/// Rate limit information from response headers.
#[derive(Debug, Clone, Default)]
pub struct RateLimit {
    pub limit: u64,
    pub remaining: u64,
    pub reset: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(status: RunStatus, conclusion: Option<RunConclusion>) -> WorkflowRun {
        WorkflowRun {
            id: 1,
            name: Some("CI".to_string()),
            status,
            conclusion,
            head_branch: Some("main".to_string()),
            created_at: Utc::now(),
            html_url: "https://github.com/o/r/actions/runs/1".to_string(),
        }
    }

    #[test]
    fn test_parse_repo_coordinates() {
        let repo: RepoCoordinates = "phatblat/jolt".parse().unwrap();
        assert_eq!(repo, RepoCoordinates::new("phatblat", "jolt"));
        assert_eq!(repo.to_string(), "phatblat/jolt");

        assert!("jolt".parse::<RepoCoordinates>().is_err());
        assert!("/jolt".parse::<RepoCoordinates>().is_err());
        assert!("a/b/c".parse::<RepoCoordinates>().is_err());
    }

    #[test]
    fn test_deserialize_workflow_run() {
        let json = r#"{
            "id": 42,
            "name": "CI",
            "run_number": 7,
            "status": "completed",
            "conclusion": "startup_failure",
            "head_branch": "main",
            "head_sha": "abc123",
            "created_at": "2024-05-01T12:00:00Z",
            "html_url": "https://github.com/o/r/actions/runs/42"
        }"#;

        let run: WorkflowRun = serde_json::from_str(json).unwrap();
        assert_eq!(run.id, 42);
        assert_eq!(run.conclusion, Some(RunConclusion::StartupFailure));
        assert_eq!(run.display_state(), "startup_failure");
    }

    #[test]
    fn test_unknown_status_tolerated() {
        let json = r#"{
            "id": 1,
            "name": null,
            "status": "brand_new_state",
            "conclusion": null,
            "head_branch": null,
            "created_at": "2024-05-01T12:00:00Z",
            "html_url": "https://github.com/o/r/actions/runs/1"
        }"#;

        let run: WorkflowRun = serde_json::from_str(json).unwrap();
        assert_eq!(run.status, RunStatus::Unknown);
        assert_eq!(run.display_state(), "unknown");
    }

    #[test]
    fn test_tone() {
        assert_eq!(
            run(RunStatus::Completed, Some(RunConclusion::Success)).tone(),
            StatusTone::Success
        );
        assert_eq!(
            run(RunStatus::Completed, Some(RunConclusion::Failure)).tone(),
            StatusTone::Failure
        );
        assert_eq!(run(RunStatus::Queued, None).tone(), StatusTone::Pending);
        assert_eq!(run(RunStatus::InProgress, None).display_state(), "in_progress");
        assert_eq!(
            run(RunStatus::Completed, Some(RunConclusion::Cancelled)).tone(),
            StatusTone::Neutral
        );
    }
}
