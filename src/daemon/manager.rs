use super::config::Config;
use super::errors::{Result, SyncError};
use super::repository::Repository;
use super::watcher::start_watching_repo;
use log::{debug, error, info};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::{self, JoinHandle};

/// Registry of managed repositories, filled once by [`Manager::provision`]
/// and read-only afterwards.
#[derive(Debug)]
pub struct Manager {
    repos: HashMap<String, Arc<Repository>>,
    watchers: Vec<JoinHandle<()>>,
}

impl Manager {
    /// Registers every configured repository in order, syncs it once and
    /// starts its auto-updater. Any failure aborts the whole provisioning and
    /// stops the auto-updaters already started.
    pub async fn provision(config: &Config) -> Result<Manager> {
        let mut manager = Manager {
            repos: HashMap::new(),
            watchers: Vec::new(),
        };
        for cfg in &config.repos {
            if let Err(error) = manager.register(Repository::new(cfg.clone())).await {
                error!("Failed managing repo {}: {error}", cfg.name.trim());
                for watcher in &manager.watchers {
                    watcher.abort();
                }
                return Err(error);
            }
        }
        Ok(manager)
    }

    async fn register(&mut self, repo: Result<Repository>) -> Result<()> {
        let repo = Arc::new(repo?);
        if self.repos.contains_key(repo.name()) {
            return Err(SyncError::DuplicateName(repo.name().to_string()));
        }

        let worker = Arc::clone(&repo);
        task::spawn_blocking(move || worker.update()).await??;
        debug!("Registered and synced repo {}", repo.name());

        if let Some(watcher) = start_watching_repo(Arc::clone(&repo)) {
            self.watchers.push(watcher);
        }
        self.repos.insert(repo.name().to_string(), repo);
        Ok(())
    }

    pub fn lookup(&self, name: &str) -> Result<Arc<Repository>> {
        self.repos
            .get(name)
            .cloned()
            .ok_or_else(|| SyncError::NotFound(name.to_string()))
    }

    fn names(&self) -> impl Iterator<Item = &str> {
        self.repos.keys().map(String::as_str)
    }

    /// Number of repositories with a running auto-updater.
    fn scheduled(&self) -> usize {
        self.watchers.len()
    }

    pub fn start(&self) {
        info!(
            "Started git repo manager with {} repositories, {} auto-updating",
            self.repos.len(),
            self.scheduled()
        );
        for name in self.names() {
            debug!("Managing repo {}", name);
        }
    }

    /// Auto-updaters keep running until the process exits.
    pub fn stop(&self) {
        info!("Stopped git repo manager");
    }
}
