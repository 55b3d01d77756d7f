// GitHub API endpoint functions.
// Provides typed methods for the REST endpoints runwatch uses.

use reqwest::{StatusCode, header::ETAG};
use serde::Deserialize;

use crate::error::Result;
use crate::session::Credential;

use super::client::{GitHubClient, transport_error};
use super::source::FetchOutcome;
use super::types::{Owner, RepoCoordinates, Repository, WorkflowRun};

/// Response wrapper for workflow runs list.
#[derive(Debug, Deserialize)]
struct WorkflowRunsResponse {
    #[allow(dead_code)]
    total_count: u64,
    workflow_runs: Vec<WorkflowRun>,
}

/// Response wrapper for repository search.
#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[allow(dead_code)]
    total_count: u64,
    items: Vec<Repository>,
}

impl GitHubClient {
    /// Get the authenticated user.
    pub async fn get_current_user(&self, credential: &Credential) -> Result<Owner> {
        let response = self.get(credential, "/user").await?;
        let user: Owner = response.json().await.map_err(transport_error)?;
        Ok(user)
    }

    /// Search repositories visible to the credential.
    pub async fn search_repos(
        &self,
        credential: &Credential,
        query: &str,
        per_page: u32,
    ) -> Result<Vec<Repository>> {
        let params = [("q", query), ("per_page", &per_page.to_string())];
        let response = self
            .get_with_params(credential, "/search/repositories", &params)
            .await?;
        let wrapper: SearchResponse = response.json().await.map_err(transport_error)?;
        Ok(wrapper.items)
    }

    /// Fetch the most recent workflow runs for a repository.
    ///
    /// With a validator the request is conditional, and an unchanged resource
    /// comes back as [`FetchOutcome::NotModified`] instead of a body.
    pub async fn list_recent_runs(
        &self,
        credential: &Credential,
        repo: &RepoCoordinates,
        validator: Option<&str>,
    ) -> FetchOutcome {
        match self.try_list_recent_runs(credential, repo, validator).await {
            Ok(outcome) => outcome,
            Err(err) => FetchOutcome::Failed(err),
        }
    }

    async fn try_list_recent_runs(
        &self,
        credential: &Credential,
        repo: &RepoCoordinates,
        validator: Option<&str>,
    ) -> Result<FetchOutcome> {
        let params = [("per_page", self.runs_per_page().to_string())];
        let response = self
            .get_conditional(
                credential,
                &format!("/repos/{}/{}/actions/runs", repo.owner, repo.name),
                &params,
                validator,
            )
            .await?;

        if response.status() == StatusCode::NOT_MODIFIED {
            return Ok(FetchOutcome::NotModified);
        }

        let new_validator = response
            .headers()
            .get(ETAG)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let wrapper: WorkflowRunsResponse = response.json().await.map_err(transport_error)?;

        Ok(FetchOutcome::Fresh {
            runs: wrapper.workflow_runs,
            validator: new_validator,
        })
    }
}
