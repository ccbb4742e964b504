use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use anyhow::Context as _;
use async_trait::async_trait;
use tokio::process::Command;

/// External collaborator that downloads the raw pages of one title
/// into some new directory under `work_dir`. The output naming scheme
/// is the fetcher's own; callers locate the result by diffing the
/// directory set around the invocation.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, title_id: &str, work_dir: &Path) -> anyhow::Result<()>;
}

/// Runs a configured program with the title identifier as its last
/// argument, cwd pinned to the staging directory, bounded by a
/// timeout. Non-zero exit is a fetch failure.
#[derive(Debug, Clone)]
pub struct CommandFetcher {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandFetcher {
    pub fn new(program: impl Into<String>, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args,
            timeout,
        }
    }
}

#[async_trait]
impl Fetcher for CommandFetcher {
    async fn fetch(&self, title_id: &str, work_dir: &Path) -> anyhow::Result<()> {
        tracing::info!(program = %self.program, title_id, "run fetcher");

        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .arg(title_id)
            .current_dir(work_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        let status = tokio::time::timeout(self.timeout, command.status())
            .await
            .map_err(|_| {
                anyhow::anyhow!(
                    "fetcher timed out after {}s: {}",
                    self.timeout.as_secs(),
                    self.program
                )
            })?
            .with_context(|| format!("spawn fetcher: {}", self.program))?;

        if !status.success() {
            anyhow::bail!("fetcher failed ({status}): {}", self.program);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn title_id_is_passed_as_last_argument() -> anyhow::Result<()> {
        let temp = tempfile::TempDir::new()?;
        let fetcher = CommandFetcher::new(
            "sh",
            vec!["-c".to_owned(), "mkdir -p \"$0\"".to_owned()],
            Duration::from_secs(10),
        );

        fetcher.fetch("416330", temp.path()).await?;
        assert!(temp.path().join("416330").is_dir());
        Ok(())
    }

    #[tokio::test]
    async fn nonzero_exit_is_a_failure() -> anyhow::Result<()> {
        let temp = tempfile::TempDir::new()?;
        let fetcher = CommandFetcher::new(
            "sh",
            vec!["-c".to_owned(), "exit 3".to_owned()],
            Duration::from_secs(10),
        );

        let err = fetcher.fetch("416330", temp.path()).await.unwrap_err();
        assert!(err.to_string().contains("fetcher failed"));
        Ok(())
    }

    #[tokio::test]
    async fn slow_fetcher_is_cut_off() -> anyhow::Result<()> {
        let temp = tempfile::TempDir::new()?;
        let fetcher = CommandFetcher::new(
            "sh",
            vec!["-c".to_owned(), "sleep 5".to_owned()],
            Duration::from_millis(100),
        );

        let err = fetcher.fetch("416330", temp.path()).await.unwrap_err();
        assert!(err.to_string().contains("timed out"));
        Ok(())
    }
}
