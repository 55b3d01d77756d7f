// Upstream source of workflow runs.
// Abstracts the conditional "recent runs" request behind a trait the engine depends on.

use async_trait::async_trait;

use crate::error::RunwatchError;
use crate::session::Credential;

use super::client::GitHubClient;
use super::types::{RepoCoordinates, WorkflowRun};

/// Result of a conditional fetch of recent runs.
#[derive(Debug)]
pub enum FetchOutcome {
    /// New content, with the validator the upstream issued for it (if any).
    Fresh {
        runs: Vec<WorkflowRun>,
        validator: Option<String>,
    },
    /// The stored content is still current.
    NotModified,
    /// Transport, status or decoding failure.
    Failed(RunwatchError),
}

/// Something that can list the recent runs of a repository.
#[async_trait]
pub trait RunsSource: Send + Sync {
    async fn fetch_recent_runs(
        &self,
        credential: &Credential,
        repo: &RepoCoordinates,
        validator: Option<&str>,
    ) -> FetchOutcome;
}

#[async_trait]
impl RunsSource for GitHubClient {
    async fn fetch_recent_runs(
        &self,
        credential: &Credential,
        repo: &RepoCoordinates,
        validator: Option<&str>,
    ) -> FetchOutcome {
        self.list_recent_runs(credential, repo, validator).await
    }
}
