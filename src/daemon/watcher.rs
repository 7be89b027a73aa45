use super::repository::Repository;
use log::{debug, error};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::{self, JoinHandle};
use tokio::time;

/// Starts the periodic updater for `repo`, or returns `None` when its
/// `update_interval` is 0.
pub fn start_watching_repo(repo: Arc<Repository>) -> Option<JoinHandle<()>> {
    let interval = repo.config().update_interval;
    if interval == 0 {
        return None;
    }
    debug!("Auto-update enabled for {} every {}s", repo.name(), interval);
    Some(task::spawn(watch_single_repo(repo, Duration::from_secs(interval))))
}

async fn watch_single_repo(repo: Arc<Repository>, interval: Duration) {
    loop {
        time::sleep(interval).await;

        let worker = Arc::clone(&repo);
        match task::spawn_blocking(move || worker.update()).await {
            Ok(Ok(())) => debug!("Auto-updated {}", repo.name()),
            Ok(Err(error)) => error!("Auto-update of {} failed: {error}", repo.name()),
            Err(error) => error!("Auto-update task for {} panicked: {error}", repo.name()),
        }
    }
}
