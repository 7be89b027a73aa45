use super::errors::{Result, SyncError};
use super::repo_config::RepoCfg;
use serde::Deserialize;

#[derive(Deserialize, Debug, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub repos: Vec<RepoCfg>,
}

impl Config {
    pub fn load_config(path: &str) -> Result<Config> {
        let file_text = std::fs::read_to_string(path).map_err(|source| SyncError::Config {
            path: path.to_string(),
            source,
        })?;
        Config::from_toml(&file_text)
    }

    /// Parses and validates a config, registering each repo in declared order.
    pub fn from_toml(text: &str) -> Result<Config> {
        let parsed: Config = toml::from_str(text)?;
        let mut config = Config::default();
        for repo in parsed.repos {
            config.add_repository(repo)?;
        }
        Ok(config)
    }

    /// Validates `repo` and appends it. On error the config is left unchanged.
    pub fn add_repository(&mut self, mut repo: RepoCfg) -> Result<()> {
        repo.validate()?;
        if self.repos.iter().any(|existing| existing.name == repo.name) {
            return Err(SyncError::DuplicateName(repo.name));
        }
        self.repos.push(repo);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::daemon::repo_config::{Transport, WebhookKind};

    const SAMPLE: &str = r#"
        [[repos]]
        name = "authp.github.io"
        address = "https://github.com/authp/authp.github.io.git"
        base_dir = "/tmp"
        branch = "gh-pages"
        depth = 1
        update_interval = 300

        [repos.auth]
        username = "deploy"
        password = "token"

        [[repos.webhooks]]
        name = "github"
        header = "X-Hub-Signature-256"
        secret = "s3cret"

        [[repos.post_update]]
        name = "notify"
        command = "/usr/bin/logger"
        args = ["site updated"]

        [[repos]]
        name = "docs"
        address = "git@github.com:authp/docs.git"

        [[repos.post_pull_exec]]
        command = "true"
    "#;

    #[test]
    fn parses_full_config() {
        let config = Config::from_toml(SAMPLE).expect("config should parse");
        assert_eq!(config.repos.len(), 2);

        let site = &config.repos[0];
        assert_eq!(site.name, "authp.github.io");
        assert_eq!(site.branch, "gh-pages");
        assert_eq!(site.depth, 1);
        assert_eq!(site.update_interval, 300);
        assert_eq!(site.transport(), Transport::Http);
        assert_eq!(site.auth.as_ref().map(|a| a.username.as_str()), Some("deploy"));
        assert_eq!(site.webhooks[0].kind, Some(WebhookKind::Signature));
        assert_eq!(site.post_update[0].args, vec!["site updated".to_string()]);

        let docs = &config.repos[1];
        assert_eq!(docs.transport(), Transport::Ssh);
        assert_eq!(docs.update_interval, 0);
        assert_eq!(docs.base_dir, std::path::PathBuf::from("."));
        assert_eq!(docs.post_update.len(), 1);
    }

    #[test]
    fn duplicate_name_is_rejected_and_config_unchanged() {
        let mut config = Config::default();
        config
            .add_repository(RepoCfg::new("site", "https://github.com/a/site.git", "/tmp"))
            .expect("first registration");

        let err = config
            .add_repository(RepoCfg::new(" site ", "https://github.com/b/site.git", "/srv"))
            .expect_err("duplicate must fail");
        assert!(matches!(err, SyncError::DuplicateName(ref name) if name == "site"));
        assert_eq!(config.repos.len(), 1);
        assert_eq!(config.repos[0].address, "https://github.com/a/site.git");
    }

    #[test]
    fn duplicate_in_file_fails_loading() {
        let text = r#"
            [[repos]]
            name = "a"
            address = "https://example.com/a.git"
            [[repos]]
            name = "a"
            address = "https://example.com/b.git"
        "#;
        assert!(matches!(Config::from_toml(text), Err(SyncError::DuplicateName(_))));
    }

    #[test]
    fn missing_file_reports_path() {
        let err = Config::load_config("/nonexistent/gitkeeper.toml").expect_err("must fail");
        match err {
            SyncError::Config { path, .. } => assert_eq!(path, "/nonexistent/gitkeeper.toml"),
            other => panic!("expected Config error, got: {other:?}"),
        }
    }

    #[test]
    fn malformed_toml_is_a_toml_error() {
        assert!(matches!(Config::from_toml("[[repos]\nname ="), Err(SyncError::Toml(_))));
    }
}
