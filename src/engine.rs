// Revalidation engine.
// Decides per tracked repository whether to serve the cached runs or revalidate
// them against GitHub, and reconciles the answer back into the cache store.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

use crate::cache::{CacheKey, CacheStore};
use crate::config::Config;
use crate::error::{Result, RunwatchError};
use crate::github::{FetchOutcome, RepoCoordinates, RunsSource, WorkflowRun};
use crate::session::{Session, authenticated};

/// Timing knobs for the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineSettings {
    /// How long after a completed check the stored runs are served as-is.
    pub freshness_window: Duration,
    /// Delay before retrying after the first upstream failure. Zero disables backoff.
    pub backoff_base: Duration,
    /// Longest delay between retries after repeated failures.
    pub backoff_cap: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            freshness_window: Duration::seconds(60),
            backoff_base: Duration::seconds(5),
            backoff_cap: Duration::seconds(60),
        }
    }
}

impl EngineSettings {
    /// Settings from configuration; backoff is capped at the poll interval.
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self {
            freshness_window: to_delta("freshness_window_secs", config.freshness_window())?,
            backoff_base: to_delta("backoff_base_secs", config.backoff_base())?,
            backoff_cap: to_delta("poll_interval_secs", config.poll_interval())?,
        })
    }
}

fn to_delta(field: &str, duration: std::time::Duration) -> Result<Duration> {
    Duration::from_std(duration)
        .map_err(|_| RunwatchError::Config(format!("{} is out of range", field)))
}

/// How a revalidation was answered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RevalidationOutcome {
    /// Served from the cache inside the freshness window.
    Cached,
    /// GitHub returned new runs.
    Fresh,
    /// GitHub confirmed the cached runs are current.
    NotModified,
    /// The upstream call failed; the cached runs (if any) were served.
    Failed { reason: String },
    /// Skipped the upstream call while backing off after failures.
    BackingOff { retry_at: DateTime<Utc> },
    /// No record exists for this user and repository.
    NotTracked,
    /// No usable session credential.
    Unauthenticated,
}

impl RevalidationOutcome {
    /// Whether the upstream was contacted to produce this result.
    pub fn contacted_upstream(&self) -> bool {
        matches!(
            self,
            RevalidationOutcome::Fresh
                | RevalidationOutcome::NotModified
                | RevalidationOutcome::Failed { .. }
        )
    }
}

/// Runs to display for a repository and how they were obtained.
#[derive(Debug, Clone, PartialEq)]
pub struct Revalidation {
    pub runs: Vec<WorkflowRun>,
    pub outcome: RevalidationOutcome,
}

impl Revalidation {
    fn empty(outcome: RevalidationOutcome) -> Self {
        Self {
            runs: Vec::new(),
            outcome,
        }
    }
}

/// Consecutive upstream failures for one key.
#[derive(Debug, Clone, Copy)]
struct FailureState {
    consecutive: u32,
    retry_at: DateTime<Utc>,
}

/// Serves workflow runs from the cache store, revalidating against the runs
/// source once the freshness window has passed.
///
/// Revalidations of the same (user, repository) key run one at a time; the
/// per-key lock is held from the record read until the updated record is stored.
pub struct Revalidator<S, U> {
    store: S,
    source: U,
    settings: EngineSettings,
    inflight: Mutex<HashMap<CacheKey, Arc<Mutex<()>>>>,
    failures: std::sync::Mutex<HashMap<CacheKey, FailureState>>,
}

impl<S: CacheStore, U: RunsSource> Revalidator<S, U> {
    pub fn new(store: S, source: U, settings: EngineSettings) -> Self {
        Self {
            store,
            source,
            settings,
            inflight: Mutex::new(HashMap::new()),
            failures: std::sync::Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn source(&self) -> &U {
        &self.source
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Runs to display for `repo`. Upstream failures degrade to the cached
    /// (or empty) runs; only storage failures are returned as errors.
    pub async fn revalidate(
        &self,
        session: Option<&Session>,
        repo: &RepoCoordinates,
        now: DateTime<Utc>,
    ) -> Result<Vec<WorkflowRun>> {
        Ok(self.revalidate_detailed(session, repo, now).await?.runs)
    }

    /// Like [`Self::revalidate`], also reporting which path produced the runs.
    pub async fn revalidate_detailed(
        &self,
        session: Option<&Session>,
        repo: &RepoCoordinates,
        now: DateTime<Utc>,
    ) -> Result<Revalidation> {
        let Some(session) = authenticated(session) else {
            debug!(repo = %repo, "no authenticated session, skipping revalidation");
            return Ok(Revalidation::empty(RevalidationOutcome::Unauthenticated));
        };

        let key = CacheKey::new(session.owner_identity.clone(), repo.clone());
        let guard = self.acquire(&key).await;

        let Some(mut record) = self.store.get(&key)? else {
            debug!(key = %key, "repository is not tracked");
            drop(guard);
            self.release_idle_lock(&key).await;
            return Ok(Revalidation::empty(RevalidationOutcome::NotTracked));
        };

        if record.is_fresh(now, self.settings.freshness_window) {
            debug!(key = %key, "serving cached runs inside freshness window");
            return Ok(Revalidation {
                runs: record.runs()?.unwrap_or_default(),
                outcome: RevalidationOutcome::Cached,
            });
        }

        if let Some(retry_at) = self.retry_at(&key).filter(|retry_at| now < *retry_at) {
            debug!(key = %key, retry_at = %retry_at, "backing off after upstream failure");
            return Ok(Revalidation {
                runs: record.runs()?.unwrap_or_default(),
                outcome: RevalidationOutcome::BackingOff { retry_at },
            });
        }

        let outcome = self
            .source
            .fetch_recent_runs(&session.credential, repo, record.etag())
            .await;

        match outcome {
            FetchOutcome::Fresh { runs, validator } => {
                record.apply_fresh(&runs, validator, now)?;
                if !self.store.update(&record)? {
                    return Ok(self.untracked_during_fetch(&key));
                }
                self.clear_failures(&key);
                info!(key = %key, runs = runs.len(), "fetched fresh workflow runs");
                Ok(Revalidation {
                    runs,
                    outcome: RevalidationOutcome::Fresh,
                })
            }
            FetchOutcome::NotModified => {
                record.mark_not_modified(now);
                if !self.store.update(&record)? {
                    return Ok(self.untracked_during_fetch(&key));
                }
                self.clear_failures(&key);
                debug!(key = %key, "workflow runs not modified");
                Ok(Revalidation {
                    runs: record.runs()?.unwrap_or_default(),
                    outcome: RevalidationOutcome::NotModified,
                })
            }
            FetchOutcome::Failed(err) => {
                warn!(key = %key, error = %err, "failed to revalidate workflow runs");
                self.record_failure(&key, now);
                Ok(Revalidation {
                    runs: record.runs()?.unwrap_or_default(),
                    outcome: RevalidationOutcome::Failed {
                        reason: err.to_string(),
                    },
                })
            }
        }
    }

    /// Stop tracking a repository. Waits for any in-flight revalidation of the
    /// key, so a fetch that completes afterwards cannot store the record again.
    pub async fn untrack(
        &self,
        session: Option<&Session>,
        repo: &RepoCoordinates,
    ) -> Result<bool> {
        let Some(session) = authenticated(session) else {
            return Err(RunwatchError::Unauthorized);
        };
        let key = CacheKey::new(session.owner_identity.clone(), repo.clone());

        let guard = self.acquire(&key).await;
        let removed = crate::registry::untrack(&self.store, Some(session), repo)?;
        self.clear_failures(&key);
        drop(guard);

        self.release_idle_lock(&key).await;
        Ok(removed)
    }

    /// The record was removed while its runs were being fetched.
    fn untracked_during_fetch(&self, key: &CacheKey) -> Revalidation {
        debug!(key = %key, "repository untracked during revalidation, discarding result");
        self.clear_failures(key);
        Revalidation::empty(RevalidationOutcome::NotTracked)
    }

    /// Take the per-key lock, creating it on first use.
    async fn acquire(&self, key: &CacheKey) -> OwnedMutexGuard<()> {
        let lock = {
            let mut inflight = self.inflight.lock().await;
            Arc::clone(
                inflight
                    .entry(key.clone())
                    .or_insert_with(|| Arc::new(Mutex::new(()))),
            )
        };
        lock.lock_owned().await
    }

    /// Drop the per-key lock entry if nobody holds or waits on it.
    async fn release_idle_lock(&self, key: &CacheKey) {
        let mut inflight = self.inflight.lock().await;
        if inflight
            .get(key)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            inflight.remove(key);
        }
    }

    fn retry_at(&self, key: &CacheKey) -> Option<DateTime<Utc>> {
        let failures = self.failures.lock().ok()?;
        failures.get(key).map(|state| state.retry_at)
    }

    fn record_failure(&self, key: &CacheKey, now: DateTime<Utc>) {
        let base = self.settings.backoff_base;
        if base <= Duration::zero() {
            return;
        }
        let Ok(mut failures) = self.failures.lock() else {
            return;
        };

        let consecutive = failures
            .get(key)
            .map_or(1, |state| state.consecutive.saturating_add(1));
        let factor = 1i32 << (consecutive - 1).min(16);
        let cap = self.settings.backoff_cap;
        let delay = base.checked_mul(factor).unwrap_or(cap).min(cap);

        failures.insert(
            key.clone(),
            FailureState {
                consecutive,
                retry_at: now + delay,
            },
        );
    }

    fn clear_failures(&self, key: &CacheKey) {
        if let Ok(mut failures) = self.failures.lock() {
            failures.remove(key);
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use chrono::Utc;

    use crate::error::RunwatchError;
    use crate::github::{RunConclusion, RunStatus};
    use crate::session::Credential;

    use super::*;

    /// Runs source answering from a script and counting calls.
    #[derive(Default)]
    pub struct ScriptedSource {
        responses: Mutex<VecDeque<FetchOutcome>>,
        validators: Mutex<Vec<Option<String>>>,
        calls: AtomicUsize,
        delay: Option<std::time::Duration>,
    }

    impl ScriptedSource {
        pub fn new(responses: Vec<FetchOutcome>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                ..Self::default()
            }
        }

        pub fn with_delay(mut self, delay: std::time::Duration) -> Self {
            self.delay = Some(delay);
            self
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        pub fn validators(&self) -> Vec<Option<String>> {
            self.validators.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl RunsSource for ScriptedSource {
        async fn fetch_recent_runs(
            &self,
            _credential: &Credential,
            _repo: &RepoCoordinates,
            validator: Option<&str>,
        ) -> FetchOutcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.validators
                .lock()
                .unwrap()
                .push(validator.map(str::to_string));
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| {
                    FetchOutcome::Failed(RunwatchError::Other("no scripted response".to_string()))
                })
        }
    }

    pub fn run(id: u64, conclusion: RunConclusion) -> WorkflowRun {
        WorkflowRun {
            id,
            name: Some("CI".to_string()),
            status: RunStatus::Completed,
            conclusion: Some(conclusion),
            head_branch: Some("main".to_string()),
            created_at: "2024-05-01T12:00:00Z".parse().unwrap(),
            html_url: format!("https://github.com/o/r/actions/runs/{}", id),
        }
    }

    pub fn session() -> Session {
        Session::new("42", Credential::new("t0ken"))
    }

    pub fn repo() -> RepoCoordinates {
        RepoCoordinates::new("o", "r")
    }

    pub fn now() -> DateTime<Utc> {
        Utc::now()
    }
}
