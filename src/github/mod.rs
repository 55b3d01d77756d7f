// GitHub API module.
// Provides the client, runs source and types for the GitHub REST API.

pub mod client;
pub mod endpoints;
pub mod source;
pub mod types;

pub use client::{GITHUB_API_BASE, GitHubClient};
pub use source::{FetchOutcome, RunsSource};
pub use types::*;
