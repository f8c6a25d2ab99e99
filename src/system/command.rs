//! External command execution.

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::error::{MonitorError, Result};

/// Runs a program and returns its standard output.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Runs `argv[0]` with the remaining arguments.
    ///
    /// # Errors
    ///
    /// Returns `Command` error if the program cannot be started or exits
    /// with a non-zero status.
    async fn run(&self, argv: &[&str]) -> Result<String>;
}

/// Prefixes `argv` with `sudo` when `sudo` is set.
#[must_use]
pub fn privileged<'a>(sudo: bool, argv: &[&'a str]) -> Vec<&'a str> {
    let mut full = Vec::with_capacity(argv.len() + 1);
    if sudo {
        full.push("sudo");
    }
    full.extend_from_slice(argv);
    full
}

/// [`CommandRunner`] that spawns real processes
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

#[async_trait]
impl CommandRunner for SystemRunner {
    async fn run(&self, argv: &[&str]) -> Result<String> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| MonitorError::Command("empty command line".to_string()))?;

        debug!("Running: {}", argv.join(" "));
        let output = Command::new(program)
            .args(args)
            .output()
            .await
            .map_err(|e| MonitorError::Command(format!("{}: {}", program, e)))?;

        if !output.status.success() {
            return Err(MonitorError::Command(format!(
                "{} exited with {}: {}",
                argv.join(" "),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_privileged_prefixes_sudo() {
        assert_eq!(
            privileged(true, &["rfkill", "block", "wifi"]),
            vec!["sudo", "rfkill", "block", "wifi"]
        );
        assert_eq!(
            privileged(false, &["rfkill", "block", "wifi"]),
            vec!["rfkill", "block", "wifi"]
        );
    }

    #[tokio::test]
    async fn test_system_runner_captures_stdout() {
        let output = SystemRunner.run(&["echo", "hello"]).await.unwrap();
        assert_eq!(output.trim(), "hello");
    }

    #[tokio::test]
    async fn test_system_runner_nonzero_exit_is_error() {
        let result = SystemRunner.run(&["false"]).await;
        assert!(matches!(result, Err(MonitorError::Command(_))));
    }

    #[tokio::test]
    async fn test_system_runner_missing_program_is_error() {
        let result = SystemRunner.run(&["/nonexistent/program-12345"]).await;
        match result {
            Err(MonitorError::Command(msg)) => assert!(msg.contains("program-12345")),
            other => panic!("Expected Command error, got: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_system_runner_empty_argv_is_error() {
        assert!(SystemRunner.run(&[]).await.is_err());
    }
}
