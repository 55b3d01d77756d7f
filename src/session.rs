// Session identity and upstream credential.
// Passed explicitly into the engine and registry on every call.

use std::fmt;

use tracing::debug;

use crate::error::{Result, RunwatchError};
use crate::github::GitHubClient;

/// Upstream access token. Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn token(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(***)")
    }
}

/// An authenticated user: who they are, and the credential to act as them.
#[derive(Debug, Clone)]
pub struct Session {
    pub owner_identity: String,
    pub credential: Credential,
}

impl Session {
    pub fn new(owner_identity: impl Into<String>, credential: Credential) -> Self {
        Self {
            owner_identity: owner_identity.into(),
            credential,
        }
    }

    /// Whether this session can make upstream calls.
    pub fn is_authenticated(&self) -> bool {
        !self.owner_identity.is_empty() && !self.credential.is_empty()
    }

    /// Resolve a session from a token by asking GitHub who it belongs to.
    pub async fn resolve(client: &GitHubClient, credential: Credential) -> Result<Self> {
        if credential.is_empty() {
            return Err(RunwatchError::MissingToken);
        }
        let user = client.get_current_user(&credential).await?;
        debug!(login = %user.login, id = user.id, "resolved session identity");
        Ok(Self::new(user.id.to_string(), credential))
    }

    /// Resolve a session from the GITHUB_TOKEN environment variable.
    pub async fn from_env(client: &GitHubClient) -> Result<Self> {
        let token = std::env::var("GITHUB_TOKEN").map_err(|_| RunwatchError::MissingToken)?;
        Self::resolve(client, Credential::new(token)).await
    }
}

/// The session if it is usable for upstream calls.
pub fn authenticated(session: Option<&Session>) -> Option<&Session> {
    session.filter(|s| s.is_authenticated())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::github::client::test_server::{response, serve_once};

    #[test]
    fn test_credential_debug_redacts_token() {
        let credential = Credential::new("ghp_secret");
        assert_eq!(format!("{:?}", credential), "Credential(***)");
        assert!(!format!("{:?}", Session::new("1", credential)).contains("ghp_secret"));
    }

    #[test]
    fn test_authenticated_filter() {
        let good = Session::new("1", Credential::new("t"));
        let empty_token = Session::new("1", Credential::new("  "));

        assert!(authenticated(Some(&good)).is_some());
        assert!(authenticated(Some(&empty_token)).is_none());
        assert!(authenticated(None).is_none());
    }

    #[tokio::test]
    async fn test_resolve_uses_user_id() {
        let body = r#"{"id":583231,"login":"octocat","type":"User","avatar_url":null}"#;
        let (base, _server) = serve_once(Some(response("200 OK", &[], body))).await;
        let client = GitHubClient::new(&base, Duration::from_secs(5)).unwrap();

        let session = Session::resolve(&client, Credential::new("t")).await.unwrap();
        assert_eq!(session.owner_identity, "583231");
    }

    #[tokio::test]
    async fn test_resolve_rejects_empty_token() {
        let client = GitHubClient::new("http://127.0.0.1:9", Duration::from_secs(1)).unwrap();
        let err = Session::resolve(&client, Credential::new("")).await.unwrap_err();
        assert!(matches!(err, RunwatchError::MissingToken));
    }
}
