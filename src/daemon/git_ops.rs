use super::auth::Credentials;
use super::errors::{Result, SyncError};
use git2::build::{CheckoutBuilder, RepoBuilder};
use git2::{FetchOptions, Oid, Repository};
use log::{debug, info};
use std::path::Path;

pub const DEFAULT_REMOTE: &str = "origin";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PullOutcome {
    UpToDate,
    FastForwarded(Oid),
}

fn fetch_options<'a>(creds: &'a Credentials, depth: u32) -> FetchOptions<'a> {
    let mut fetch_options = FetchOptions::new();
    fetch_options.remote_callbacks(creds.remote_callbacks());
    // Range is checked when the config is validated.
    if let Ok(depth @ 1..) = i32::try_from(depth) {
        fetch_options.depth(depth);
    }
    fetch_options
}

/// Clones `address` into `dest`, optionally limited to one branch and a
/// shallow depth.
pub fn clone_repo(
    address: &str,
    dest: &Path,
    branch: &str,
    depth: u32,
    creds: &Credentials,
) -> Result<Repository> {
    info!("Cloning {} into {}", address, dest.display());

    let mut builder = RepoBuilder::new();
    builder.fetch_options(fetch_options(creds, depth));
    if !branch.is_empty() {
        builder.branch(branch);
    }
    Ok(builder.clone(address, dest)?)
}

/// Branch to pull: the configured one, else whatever is checked out.
fn tracked_branch(repository: &Repository, branch: &str) -> Result<String> {
    if !branch.is_empty() {
        return Ok(branch.to_string());
    }
    let head = repository.head()?;
    if !head.is_branch() {
        return Err(SyncError::DetachedHead {
            path: repository.workdir().unwrap_or(repository.path()).to_path_buf(),
        });
    }
    head.shorthand()
        .map(str::to_string)
        .ok_or_else(|| git2::Error::from_str("branch name is not valid UTF-8").into())
}

/// Fetches the tracked branch from `origin` and fast-forwards the working
/// copy onto it.
pub fn pull(
    repository: &Repository,
    branch: &str,
    depth: u32,
    creds: &Credentials,
) -> Result<PullOutcome> {
    let branch = tracked_branch(repository, branch)?;
    let mut remote = repository.find_remote(DEFAULT_REMOTE)?;

    let refspec = format!("+refs/heads/{branch}:refs/remotes/{DEFAULT_REMOTE}/{branch}");
    debug!("Fetching '{}' from {}", branch, DEFAULT_REMOTE);
    remote.fetch(&[&refspec], Some(&mut fetch_options(creds, depth)), None)?;

    let fetch_head = repository.find_reference("FETCH_HEAD")?;
    let fetch_commit = repository.reference_to_annotated_commit(&fetch_head)?;
    let (analysis, _) = repository.merge_analysis(&[&fetch_commit])?;

    // If there's nothing new, escape
    if analysis.is_up_to_date() {
        return Ok(PullOutcome::UpToDate);
    }
    if !analysis.is_fast_forward() && !analysis.is_unborn() {
        return Err(SyncError::NotFastForward { branch });
    }

    let refname = format!("refs/heads/{branch}");
    let target = fetch_commit.id();
    match repository.find_reference(&refname) {
        Ok(mut reference) => {
            reference.set_target(target, "gitkeeper: fast-forward")?;
        }
        Err(error) if error.code() == git2::ErrorCode::NotFound => {
            repository.reference(&refname, target, true, "gitkeeper: track branch")?;
        }
        Err(error) => return Err(error.into()),
    }
    repository.set_head(&refname)?;
    repository.checkout_head(Some(CheckoutBuilder::default().force()))?;

    Ok(PullOutcome::FastForwarded(target))
}

/// Commit the working copy's HEAD points at.
pub fn head_commit(repository: &Repository) -> Result<Oid> {
    Ok(repository.head()?.peel_to_commit()?.id())
}
