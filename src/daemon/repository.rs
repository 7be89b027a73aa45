use super::auth;
use super::errors::Result;
use super::git_ops::{self, PullOutcome};
use super::hooks::run_post_update;
use super::repo_config::RepoCfg;
use super::webhook::Webhook;
use git2::Oid;
use log::{debug, info};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::SystemTime;

#[derive(Debug, Default)]
struct RepoState {
    last_updated: Option<SystemTime>,
    head: Option<Oid>,
}

/// One managed working copy.
#[derive(Debug)]
pub struct Repository {
    cfg: RepoCfg,
    webhooks: Vec<Webhook>,
    updating: AtomicBool,
    syncs: AtomicU64,
    state: Mutex<RepoState>,
}

/// Clears the in-flight flag however `update` exits.
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl Repository {
    /// Validates `cfg` and builds the runtime entity. No I/O happens here.
    pub fn new(mut cfg: RepoCfg) -> Result<Repository> {
        cfg.validate()?;
        let webhooks = cfg
            .webhooks
            .iter()
            .map(|webhook| Webhook::from_config(&cfg.name, webhook))
            .collect::<Result<Vec<_>>>()?;
        Ok(Repository {
            cfg,
            webhooks,
            updating: AtomicBool::new(false),
            syncs: AtomicU64::new(0),
            state: Mutex::new(RepoState::default()),
        })
    }

    pub fn name(&self) -> &str {
        &self.cfg.name
    }

    pub fn config(&self) -> &RepoCfg {
        &self.cfg
    }

    pub fn webhooks(&self) -> &[Webhook] {
        &self.webhooks
    }

    pub fn is_updating(&self) -> bool {
        self.updating.load(Ordering::Acquire)
    }

    pub fn last_updated(&self) -> Option<SystemTime> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).last_updated
    }

    /// Commit the working copy was at after the last successful update.
    pub(crate) fn head(&self) -> Option<Oid> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).head
    }

    /// How many clone/pull runs have actually been started.
    pub(crate) fn sync_count(&self) -> u64 {
        self.syncs.load(Ordering::Acquire)
    }

    /// Brings the working copy in line with upstream, then runs post-update
    /// actions. Returns `Ok(())` without doing anything when another update of
    /// this repository is already running.
    pub fn update(&self) -> Result<()> {
        if self
            .updating
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Update of {} already in progress, skipping", self.cfg.name);
            return Ok(());
        }
        let _in_flight = InFlight(&self.updating);
        self.syncs.fetch_add(1, Ordering::AcqRel);

        let head = self.sync_working_copy()?;
        {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            state.last_updated = Some(SystemTime::now());
            state.head = Some(head);
        }

        if !self.cfg.post_update.is_empty() {
            run_post_update(&self.cfg.name, &self.cfg.post_update);
        }
        Ok(())
    }

    fn sync_working_copy(&self) -> Result<Oid> {
        let base_dir = self.cfg.base_dir();
        if !base_dir.exists() {
            create_private_dir(&base_dir)?;
        }

        let creds = auth::resolve(&self.cfg)?;
        let repo_dir = self.cfg.local_dir();
        if !repo_dir.exists() {
            git_ops::clone_repo(
                &self.cfg.address,
                &repo_dir,
                &self.cfg.branch,
                self.cfg.depth,
                &creds,
            )?;
        }

        let repo_dir = std::fs::canonicalize(&repo_dir)?;
        let repository = git2::Repository::open(&repo_dir)?;
        if repository.is_bare() {
            return Err(git2::Error::from_str("working copy has no work tree").into());
        }

        match git_ops::pull(&repository, &self.cfg.branch, self.cfg.depth, &creds)? {
            PullOutcome::UpToDate => debug!("{} is already up to date", self.cfg.name),
            PullOutcome::FastForwarded(oid) => info!("Fast-forwarded {} to {}", self.cfg.name, oid),
        }

        let head = git_ops::head_commit(&repository)?;
        debug!("{} at {} is on commit {}", self.cfg.name, repo_dir.display(), head);
        Ok(head)
    }
}

#[cfg(unix)]
fn create_private_dir(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::DirBuilderExt;
    std::fs::DirBuilder::new().recursive(true).mode(0o700).create(path)
}

#[cfg(not(unix))]
fn create_private_dir(path: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::daemon::errors::SyncError;
    use crate::daemon::repo_config::ExecCfg;
    use crate::daemon::testutil::{commit_file, init_upstream};
    use std::sync::Arc;
    use std::time::{Duration, Instant};
    use tempfile::tempdir;

    fn repo_cfg(upstream: &Path, base_dir: &Path) -> RepoCfg {
        RepoCfg::new("site", upstream.to_str().unwrap(), base_dir)
    }

    #[test]
    fn first_update_clones_into_base_dir() {
        let temp = tempdir().expect("temp dir");
        let (upstream_path, upstream) = init_upstream(temp.path());
        let first = commit_file(&upstream, "index.html", "v1");

        let base_dir = temp.path().join("www").join("nested");
        let repo = Repository::new(repo_cfg(&upstream_path, &base_dir)).expect("repository");
        repo.update().expect("update");

        assert_eq!(repo.sync_count(), 1);
        assert_eq!(repo.head(), Some(first));
        assert!(repo.last_updated().is_some());
        assert_eq!(std::fs::read_to_string(base_dir.join("site/index.html")).unwrap(), "v1");
    }

    #[cfg(unix)]
    #[test]
    fn base_dir_is_created_private() {
        use std::os::unix::fs::PermissionsExt;

        let temp = tempdir().expect("temp dir");
        let (upstream_path, upstream) = init_upstream(temp.path());
        commit_file(&upstream, "index.html", "v1");

        let base_dir = temp.path().join("private");
        Repository::new(repo_cfg(&upstream_path, &base_dir)).unwrap().update().expect("update");

        let mode = std::fs::metadata(&base_dir).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o700);
    }

    #[test]
    fn existing_checkout_is_pulled_not_recloned() {
        let temp = tempdir().expect("temp dir");
        let (upstream_path, upstream) = init_upstream(temp.path());
        commit_file(&upstream, "index.html", "v1");

        let base_dir = temp.path().join("www");
        let repo = Repository::new(repo_cfg(&upstream_path, &base_dir)).expect("repository");
        repo.update().expect("initial update");

        let untracked = base_dir.join("site").join("untracked.txt");
        std::fs::write(&untracked, "keep me").unwrap();

        let second = commit_file(&upstream, "index.html", "v2");
        repo.update().expect("second update");

        assert_eq!(repo.head(), Some(second));
        assert_eq!(std::fs::read_to_string(base_dir.join("site/index.html")).unwrap(), "v2");
        assert!(untracked.exists(), "a fresh clone would have dropped this file");
    }

    #[test]
    fn concurrent_update_is_skipped() {
        let temp = tempdir().expect("temp dir");
        let (upstream_path, upstream) = init_upstream(temp.path());
        commit_file(&upstream, "index.html", "v1");

        // The post-update action holds the first update open until `release` exists.
        let release = temp.path().join("release");
        let mut cfg = repo_cfg(&upstream_path, &temp.path().join("www"));
        cfg.post_update = vec![ExecCfg {
            name: "wait".into(),
            command: "sh".into(),
            args: vec![
                "-c".into(),
                concat!(
                    "i=0; while [ ! -f \"$0\" ] && [ $i -lt 400 ]; ",
                    "do sleep 0.05; i=$((i+1)); done"
                )
                .into(),
                release.to_str().unwrap().into(),
            ],
        }];
        let repo = Arc::new(Repository::new(cfg).expect("repository"));

        let first = {
            let repo = Arc::clone(&repo);
            std::thread::spawn(move || repo.update())
        };

        let started = Instant::now();
        while repo.sync_count() < 1 {
            assert!(started.elapsed() < Duration::from_secs(10), "first update never started");
            std::thread::sleep(Duration::from_millis(5));
        }

        repo.update().expect("skipped update still reports success");
        repo.update().expect("skipped update still reports success");
        assert_eq!(repo.sync_count(), 1);

        std::fs::write(&release, "").unwrap();
        first.join().expect("thread").expect("first update");
        assert_eq!(repo.sync_count(), 1);
        assert!(!repo.is_updating());

        repo.update().expect("later update runs");
        assert_eq!(repo.sync_count(), 2);
    }

    #[test]
    fn failing_post_update_action_keeps_success() {
        let temp = tempdir().expect("temp dir");
        let (upstream_path, upstream) = init_upstream(temp.path());
        commit_file(&upstream, "index.html", "v1");

        let mut cfg = repo_cfg(&upstream_path, &temp.path().join("www"));
        cfg.post_update = vec![ExecCfg {
            name: "fail".into(),
            command: "false".into(),
            args: vec![],
        }];
        let repo = Repository::new(cfg).expect("repository");

        repo.update().expect("hook failure must not fail the update");
        assert!(repo.head().is_some());
    }

    #[test]
    fn invalid_config_is_rejected_before_io() {
        let temp = tempdir().expect("temp dir");
        let base_dir = temp.path().join("www");
        let err = Repository::new(RepoCfg::new("site", "https://github.com/a/site", &base_dir))
            .expect_err("address without .git must be rejected");
        assert!(matches!(err, SyncError::AddressUnsupported(_)));
        assert!(!base_dir.exists());
    }

    #[test]
    fn shallow_local_upstream_is_rejected_before_io() {
        let temp = tempdir().expect("temp dir");
        let (upstream_path, upstream) = init_upstream(temp.path());
        commit_file(&upstream, "index.html", "v1");
        let base_dir = temp.path().join("www");

        let file_url = format!("file://{}", upstream_path.display());
        for address in [upstream_path.to_str().unwrap(), file_url.as_str()] {
            let mut cfg = RepoCfg::new("site", address, &base_dir);
            cfg.depth = 1;
            let err = Repository::new(cfg).expect_err("shallow local clone must be rejected");
            assert!(matches!(err, SyncError::ShallowLocal { .. }));
        }
        assert!(!base_dir.exists());

        let repo = Repository::new(repo_cfg(&upstream_path, &base_dir)).expect("repository");
        repo.update().expect("full clone of a local upstream");
    }

    #[test]
    fn failed_clone_is_returned_and_releases_the_flag() {
        let temp = tempdir().expect("temp dir");
        let missing = temp.path().join("missing.git");
        let repo =
            Repository::new(repo_cfg(&missing, &temp.path().join("www"))).expect("repository");

        assert!(matches!(repo.update(), Err(SyncError::Git(_))));
        assert!(!repo.is_updating());
        assert!(repo.last_updated().is_none());

        assert!(repo.update().is_err());
        assert_eq!(repo.sync_count(), 2);
    }
}
