// Tracked-repository registry.
// Creates and deletes the cache records that mark a repository as tracked by a user.

use chrono::{DateTime, Utc};
use tracing::info;

use crate::cache::{CacheKey, CacheRecord, CacheStore};
use crate::error::{Result, RunwatchError};
use crate::github::RepoCoordinates;
use crate::session::{Session, authenticated};

/// Result of asking to track a repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackOutcome {
    Added,
    AlreadyTracked,
}

/// Start tracking a repository, creating a blank cache record for it.
pub fn track<S: CacheStore + ?Sized>(
    store: &S,
    session: Option<&Session>,
    repo: &RepoCoordinates,
    now: DateTime<Utc>,
) -> Result<TrackOutcome> {
    let session = authenticated(session).ok_or(RunwatchError::Unauthorized)?;
    let key = CacheKey::new(session.owner_identity.clone(), repo.clone());

    if store.insert_if_absent(&CacheRecord::new(key, now))? {
        info!(repo = %repo, "tracking repository");
        Ok(TrackOutcome::Added)
    } else {
        Ok(TrackOutcome::AlreadyTracked)
    }
}

/// Stop tracking a repository, discarding its cached runs.
pub fn untrack<S: CacheStore + ?Sized>(
    store: &S,
    session: Option<&Session>,
    repo: &RepoCoordinates,
) -> Result<bool> {
    let session = authenticated(session).ok_or(RunwatchError::Unauthorized)?;
    let removed = store.remove(&CacheKey::new(session.owner_identity.clone(), repo.clone()))?;
    if removed {
        info!(repo = %repo, "stopped tracking repository");
    }
    Ok(removed)
}

/// Repositories tracked by the session's user, most recently added first.
pub fn tracked<S: CacheStore + ?Sized>(
    store: &S,
    session: Option<&Session>,
) -> Result<Vec<CacheRecord>> {
    let session = authenticated(session).ok_or(RunwatchError::Unauthorized)?;
    let mut records = store.list(&session.owner_identity)?;
    records.sort_by(|a, b| {
        b.created_at()
            .cmp(&a.created_at())
            .then_with(|| a.repo().cmp(b.repo()))
    });
    Ok(records)
}
