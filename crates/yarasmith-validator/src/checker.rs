//! Syntax checking capability and the `yara` binary implementation.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use log::debug;
use tokio::process::Command;

use yarasmith_core::CheckerUnavailable;

/// Verdict of one syntax check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntaxVerdict {
    pub valid: bool,
    pub message: Option<String>,
}

impl SyntaxVerdict {
    pub fn valid() -> Self {
        Self {
            valid: true,
            message: None,
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self {
            valid: false,
            message: Some(message.into()),
        }
    }
}

#[async_trait]
pub trait SyntaxChecker: Send + Sync {
    async fn check(&self, rule_text: &str) -> Result<SyntaxVerdict, CheckerUnavailable>;
}

#[async_trait]
impl<T: SyntaxChecker + ?Sized> SyntaxChecker for Arc<T> {
    async fn check(&self, rule_text: &str) -> Result<SyntaxVerdict, CheckerUnavailable> {
        (**self).check(rule_text).await
    }
}

/// Compiles rules with the `yara` command line tool.
///
/// The rule is written to a scratch directory and run against an empty
/// target directory; exit status 0 means the rule compiled. Concurrency and
/// timeouts are applied by the caller (see [`Corrector`](crate::Corrector)).
pub struct YaraBinaryChecker {
    binary: PathBuf,
}

impl YaraBinaryChecker {
    pub fn new(binary: PathBuf) -> Self {
        Self { binary }
    }

    pub fn binary(&self) -> &PathBuf {
        &self.binary
    }
}

#[async_trait]
impl SyntaxChecker for YaraBinaryChecker {
    async fn check(&self, rule_text: &str) -> Result<SyntaxVerdict, CheckerUnavailable> {
        let scratch = tempfile::tempdir()
            .map_err(|e| CheckerUnavailable(format!("failed to create scratch directory: {e}")))?;
        let rule_path = scratch.path().join("candidate.yar");
        let target_dir = scratch.path().join("target");

        tokio::fs::write(&rule_path, rule_text)
            .await
            .map_err(|e| CheckerUnavailable(format!("failed to write rule: {e}")))?;
        tokio::fs::create_dir(&target_dir)
            .await
            .map_err(|e| CheckerUnavailable(format!("failed to create scan target: {e}")))?;

        let mut cmd = Command::new(&self.binary);
        cmd.arg(&rule_path).arg(&target_dir).kill_on_drop(true);

        debug!("Running syntax check: {:?}", cmd);

        let output = cmd.output().await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                CheckerUnavailable(format!("yara binary not found at {}", self.binary.display()))
            } else {
                CheckerUnavailable(format!("failed to spawn yara: {e}"))
            }
        })?;

        if output.status.success() {
            return Ok(SyntaxVerdict::valid());
        }

        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        // Diagnostics mention the scratch path; strip it so identical errors compare equal
        let stderr = stderr.replace(&rule_path.display().to_string(), "rule");
        let message = if stderr.is_empty() {
            format!("yara exited with code {}", output.status.code().unwrap_or(-1))
        } else {
            stderr
        };

        Ok(SyntaxVerdict::invalid(message))
    }
}
