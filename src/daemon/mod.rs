pub mod auth;
pub mod config;
pub mod errors;
pub mod git_ops;
pub mod hooks;
pub mod manager;
pub mod repo_config;
pub mod repository;
pub mod trigger;
pub mod watcher;
pub mod webhook;

#[cfg(test)]
pub(crate) mod testutil {
    use git2::{Commit, Oid, Repository, RepositoryInitOptions, Signature};
    use std::path::{Path, PathBuf};

    /// Non-bare upstream repository at `root/upstream.git` with `main` as HEAD.
    pub fn init_upstream(root: &Path) -> (PathBuf, Repository) {
        let path = root.join("upstream.git");
        let mut opts = RepositoryInitOptions::new();
        opts.initial_head("main");
        let repo = Repository::init_opts(&path, &opts).expect("init upstream");
        (path, repo)
    }

    pub fn commit_file(repo: &Repository, name: &str, contents: &str) -> Oid {
        let workdir = repo.workdir().expect("non-bare repository");
        std::fs::write(workdir.join(name), contents).expect("write file");

        let mut index = repo.index().expect("index");
        index.add_path(Path::new(name)).expect("add path");
        index.write().expect("write index");
        let tree = repo.find_tree(index.write_tree().expect("write tree")).expect("tree");

        let sig = Signature::now("gitkeeper", "gitkeeper@example.com").expect("signature");
        let parent = repo.head().ok().and_then(|head| head.peel_to_commit().ok());
        let parents: Vec<&Commit> = parent.iter().collect();
        repo.commit(Some("HEAD"), &sig, &sig, &format!("update {name}"), &tree, &parents)
            .expect("commit")
    }
}
