// Background poller.
// Revalidates each displayed repository on its own fixed interval, plus on demand.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{Notify, mpsc};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error};

use crate::cache::CacheStore;
use crate::engine::{Revalidation, Revalidator};
use crate::error::Result;
use crate::github::{RepoCoordinates, RunsSource};
use crate::session::Session;

/// Capacity of the update channel shared by all repositories.
const UPDATE_BUFFER: usize = 64;

/// What triggered a poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollTrigger {
    Interval,
    Manual,
}

/// Result of one poll of one repository.
#[derive(Debug)]
pub struct RunsUpdate {
    pub repo: RepoCoordinates,
    pub trigger: PollTrigger,
    pub at: DateTime<Utc>,
    pub result: Result<Revalidation>,
}

struct RepoTask {
    refresh: Arc<Notify>,
    handle: JoinHandle<()>,
}

/// Handle to running poll tasks. Dropping it stops them.
pub struct PollerHandle {
    tasks: HashMap<RepoCoordinates, RepoTask>,
}

impl PollerHandle {
    /// Repositories being polled.
    pub fn repos(&self) -> impl Iterator<Item = &RepoCoordinates> {
        self.tasks.keys()
    }

    /// Poll a repository now, outside its schedule. Returns false if it is not being polled.
    ///
    /// The engine's freshness window still applies, so this only reaches the
    /// upstream once the cached runs are stale.
    pub fn refresh(&self, repo: &RepoCoordinates) -> bool {
        match self.tasks.get(repo) {
            Some(task) => {
                task.refresh.notify_one();
                true
            }
            None => false,
        }
    }

    pub fn refresh_all(&self) {
        for task in self.tasks.values() {
            task.refresh.notify_one();
        }
    }

    /// Stop all poll tasks.
    pub fn shutdown(mut self) {
        self.abort_all();
    }

    fn abort_all(&mut self) {
        for (_, task) in self.tasks.drain() {
            task.handle.abort();
        }
    }
}

impl Drop for PollerHandle {
    fn drop(&mut self) {
        self.abort_all();
    }
}

/// Start one poll task per repository. The first poll of each happens immediately.
pub fn spawn<S, U>(
    engine: Arc<Revalidator<S, U>>,
    session: Session,
    repos: Vec<RepoCoordinates>,
    interval: Duration,
) -> (PollerHandle, mpsc::Receiver<RunsUpdate>)
where
    S: CacheStore + 'static,
    U: RunsSource + 'static,
{
    let (tx, rx) = mpsc::channel(UPDATE_BUFFER);
    let mut tasks = HashMap::new();

    for repo in repos {
        if tasks.contains_key(&repo) {
            continue;
        }
        let refresh = Arc::new(Notify::new());
        let handle = tokio::spawn(poll_repo(
            Arc::clone(&engine),
            session.clone(),
            repo.clone(),
            interval,
            Arc::clone(&refresh),
            tx.clone(),
        ));
        tasks.insert(repo, RepoTask { refresh, handle });
    }

    (PollerHandle { tasks }, rx)
}

async fn poll_repo<S: CacheStore, U: RunsSource>(
    engine: Arc<Revalidator<S, U>>,
    session: Session,
    repo: RepoCoordinates,
    interval: Duration,
    refresh: Arc<Notify>,
    updates: mpsc::Sender<RunsUpdate>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        let trigger = tokio::select! {
            _ = ticker.tick() => PollTrigger::Interval,
            _ = refresh.notified() => PollTrigger::Manual,
        };

        let at = Utc::now();
        let result = engine.revalidate_detailed(Some(&session), &repo, at).await;
        if let Err(err) = &result {
            error!(repo = %repo, error = %err, "poll failed");
        } else {
            debug!(repo = %repo, ?trigger, "polled repository");
        }

        let update = RunsUpdate {
            repo: repo.clone(),
            trigger,
            at,
            result,
        };
        if updates.send(update).await.is_err() {
            debug!(repo = %repo, "update receiver dropped, stopping poller");
            break;
        }
    }
}
