//! Sandboxed execution of caller-supplied scheduling scripts.
//!
//! Each run gets a fresh temporary directory holding the script and its
//! input, and a child process of the configured interpreter with a cleared
//! environment. The child is killed when the wall-clock limit passes or the
//! caller goes away. A semaphore bounds how many scripts run at once.
//!
//! Environment seen by the script:
//!
//! | Variable | Meaning |
//! |----------|---------|
//! | `SCHEDULER_INPUT` | Path of `input.json` (the request's `data`) |
//! | `SCHEDULER_RESULT` | Path the script may write its JSON result to |
//! | `PATH` | Configured search path |

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::process::Command;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

/// Script runner settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    /// Interpreter program.
    pub interpreter: String,
    /// Arguments placed before the script path.
    pub args: Vec<String>,
    /// File name of the script inside the sandbox directory.
    pub script_name: String,
    pub timeout_seconds: u64,
    /// Captured stdout/stderr are cut to this many bytes each.
    pub max_output_bytes: usize,
    pub max_concurrent: usize,
    /// `PATH` for the child.
    pub path: String,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            interpreter: "python3".to_string(),
            args: Vec::new(),
            script_name: "script.py".to_string(),
            timeout_seconds: 30,
            max_output_bytes: 1024 * 1024,
            max_concurrent: 4,
            path: "/usr/local/bin:/usr/bin:/bin".to_string(),
        }
    }
}

/// Sandbox failures.
#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("failed to prepare sandbox: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to start interpreter '{interpreter}': {source}")]
    Spawn {
        interpreter: String,
        #[source]
        source: std::io::Error,
    },

    #[error("script exceeded the {}s time limit and was killed", .0.as_secs())]
    Timeout(Duration),

    #[error("script failed with {status}")]
    Failed {
        status: String,
        stdout: String,
        stderr: String,
    },

    #[error("script result is not valid JSON: {0}")]
    InvalidResult(#[source] serde_json::Error),

    #[error("script runner is shut down")]
    Closed,
}

impl SandboxError {
    /// Captured stdout, when the script got far enough to produce any.
    pub fn stdout(&self) -> Option<&str> {
        match self {
            Self::Failed { stdout, .. } => Some(stdout),
            _ => None,
        }
    }

    /// Captured stderr, when the script got far enough to produce any.
    pub fn stderr(&self) -> Option<&str> {
        match self {
            Self::Failed { stderr, .. } => Some(stderr),
            _ => None,
        }
    }
}

/// A script and the data handed to it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ScriptRequest {
    pub script: String,
    pub data: Value,
}

/// What a successful script produced.
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptOutput {
    /// Parsed contents of `SCHEDULER_RESULT`, if the script wrote it.
    pub result: Option<Value>,
    pub stdout: String,
    pub stderr: String,
}

/// Runs scripts under [`SandboxConfig`] limits.
#[derive(Debug, Clone)]
pub struct ScriptRunner {
    config: SandboxConfig,
    permits: Arc<Semaphore>,
}

impl ScriptRunner {
    pub fn new(config: SandboxConfig) -> Self {
        let permits = Arc::new(Semaphore::new(config.max_concurrent.max(1)));
        Self { config, permits }
    }

    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    /// Runs one script to completion.
    pub async fn run(&self, request: &ScriptRequest) -> Result<ScriptOutput, SandboxError> {
        let _permit = self.permits.acquire().await.map_err(|_| SandboxError::Closed)?;

        let dir = tempfile::tempdir()?;
        let script_path = dir.path().join(&self.config.script_name);
        let input_path = dir.path().join("input.json");
        let result_path = dir.path().join("result.json");
        tokio::fs::write(&script_path, request.script.as_bytes()).await?;
        let input = serde_json::to_vec(&request.data).map_err(std::io::Error::from)?;
        tokio::fs::write(&input_path, input).await?;

        let child = Command::new(&self.config.interpreter)
            .args(&self.config.args)
            .arg(&script_path)
            .current_dir(dir.path())
            .env_clear()
            .env("PATH", &self.config.path)
            .env("SCHEDULER_INPUT", &input_path)
            .env("SCHEDULER_RESULT", &result_path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| SandboxError::Spawn {
                interpreter: self.config.interpreter.clone(),
                source,
            })?;

        let limit = Duration::from_secs(self.config.timeout_seconds);
        let output = match tokio::time::timeout(limit, child.wait_with_output()).await {
            Ok(output) => output?,
            Err(_) => {
                warn!(limit_seconds = limit.as_secs(), "script timed out");
                return Err(SandboxError::Timeout(limit));
            }
        };

        let stdout = truncate(&output.stdout, self.config.max_output_bytes);
        let stderr = truncate(&output.stderr, self.config.max_output_bytes);
        debug!(status = %output.status, stdout_bytes = output.stdout.len(), "script finished");

        if !output.status.success() {
            return Err(SandboxError::Failed {
                status: output.status.to_string(),
                stdout,
                stderr,
            });
        }

        let result = read_result(result_path).await?;
        Ok(ScriptOutput { result, stdout, stderr })
    }
}

async fn read_result(path: PathBuf) -> Result<Option<Value>, SandboxError> {
    match tokio::fs::read(&path).await {
        Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => Ok(None),
        Ok(bytes) => serde_json::from_slice(&bytes).map(Some).map_err(SandboxError::InvalidResult),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Lossy UTF-8 of at most `limit` bytes, cut on a char boundary.
fn truncate(bytes: &[u8], limit: usize) -> String {
    let mut text = String::from_utf8_lossy(bytes).into_owned();
    if text.len() > limit {
        let mut cut = limit;
        while !text.is_char_boundary(cut) {
            cut -= 1;
        }
        text.truncate(cut);
        text.push_str("\n[output truncated]");
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn shell() -> ScriptRunner {
        ScriptRunner::new(SandboxConfig {
            interpreter: "sh".to_string(),
            script_name: "script.sh".to_string(),
            timeout_seconds: 5,
            ..Default::default()
        })
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate(b"hello", 10), "hello");
        assert_eq!(truncate(b"hello world", 5), "hello\n[output truncated]");
        // 'é' is two bytes; never split it.
        assert_eq!(truncate("aé".as_bytes(), 2), "a\n[output truncated]");
    }

    #[tokio::test]
    async fn test_result_and_output() {
        let request = ScriptRequest {
            script: r#"cat "$SCHEDULER_INPUT" > "$SCHEDULER_RESULT"; echo done"#.to_string(),
            data: json!({"batches": 3}),
        };
        let out = shell().run(&request).await.unwrap();
        assert_eq!(out.result, Some(json!({"batches": 3})));
        assert_eq!(out.stdout.trim(), "done");
    }

    #[tokio::test]
    async fn test_environment_is_cleared() {
        std::env::set_var("PRODSCHED_SECRET_FOR_TEST", "leak");
        let request = ScriptRequest {
            script: r#"echo "[${PRODSCHED_SECRET_FOR_TEST}]""#.to_string(),
            data: Value::Null,
        };
        let out = shell().run(&request).await.unwrap();
        assert_eq!(out.stdout.trim(), "[]");
        assert_eq!(out.result, None);
    }

    #[tokio::test]
    async fn test_failure_keeps_stderr() {
        let request = ScriptRequest {
            script: "echo boom >&2; exit 3".to_string(),
            data: Value::Null,
        };
        let err = shell().run(&request).await.unwrap_err();
        assert!(matches!(err, SandboxError::Failed { .. }));
        assert_eq!(err.stderr().map(str::trim), Some("boom"));
    }

    #[tokio::test]
    async fn test_timeout_kills_script() {
        let runner = ScriptRunner::new(SandboxConfig {
            interpreter: "sh".to_string(),
            timeout_seconds: 1,
            ..Default::default()
        });
        let request = ScriptRequest {
            script: "sleep 10".to_string(),
            data: Value::Null,
        };
        let err = runner.run(&request).await.unwrap_err();
        assert!(matches!(err, SandboxError::Timeout(_)));
    }

    #[tokio::test]
    async fn test_missing_interpreter() {
        let runner = ScriptRunner::new(SandboxConfig {
            interpreter: "definitely-not-an-interpreter".to_string(),
            ..Default::default()
        });
        let err = runner.run(&ScriptRequest::default()).await.unwrap_err();
        assert!(matches!(err, SandboxError::Spawn { .. }));
    }

    #[tokio::test]
    async fn test_invalid_result_json() {
        let request = ScriptRequest {
            script: r#"echo "not json" > "$SCHEDULER_RESULT""#.to_string(),
            data: Value::Null,
        };
        let err = shell().run(&request).await.unwrap_err();
        assert!(matches!(err, SandboxError::InvalidResult(_)));
    }
}
