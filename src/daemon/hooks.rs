use super::repo_config::ExecCfg;
use log::{debug, info, warn};
use std::process::{Command, Stdio};

/// Runs every post-update action in order. Failures are logged and never stop
/// the remaining actions; the number of failed actions is returned.
pub fn run_post_update(repo_name: &str, actions: &[ExecCfg]) -> usize {
    let mut failed = 0;

    for action in actions {
        if action.command.is_empty() {
            continue;
        }
        info!("Running post-update action '{}' for {}: {}", action.name, repo_name, action.command);

        let output = Command::new(&action.command)
            .args(&action.args)
            .stdin(Stdio::null())
            .output();

        match output {
            Ok(output) => {
                let stdout = String::from_utf8_lossy(&output.stdout);
                let stderr = String::from_utf8_lossy(&output.stderr);
                if output.status.success() {
                    debug!(
                        "Post-update action '{}' for {} finished, stdout: {:?}, stderr: {:?}",
                        action.name, repo_name, stdout, stderr
                    );
                } else {
                    failed += 1;
                    warn!(
                        "Post-update action '{}' for {} failed with {}, stdout: {:?}, stderr: {:?}",
                        action.name, repo_name, output.status, stdout, stderr
                    );
                }
            }
            Err(error) => {
                failed += 1;
                warn!(
                    "Post-update action '{}' for {} could not be started: {}",
                    action.name, repo_name, error
                );
            }
        }
    }

    failed
}
