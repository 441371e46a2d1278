//! Code executors.
//!
//! [`PythonExecutor`] writes the sample, the code and the policy into a fresh
//! temporary directory, runs the bundled harness there in a child process and
//! reads back `report.json` plus any rendered figures. The directory is
//! removed when the call returns, whatever the outcome.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use datastory_common::sandbox::RESULT_VARIABLE;
use datastory_common::{DatasetSample, SandboxPolicy};
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::error::SandboxError;

const HARNESS: &str = include_str!("harness.py");

const HARNESS_FILE: &str = "harness.py";
const CODE_FILE: &str = "code.py";
const DATA_FILE: &str = "data.csv";
const POLICY_FILE: &str = "policy.json";
const REPORT_FILE: &str = "report.json";

/// Search path handed to the interpreter; nothing else leaks from the parent environment.
const SANDBOX_PATH: &str = "/usr/local/bin:/usr/bin:/bin";

// ── Outcomes ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureKind {
    Syntax,
    Runtime,
}

/// A figure the code left open, rendered to PNG by the harness.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedFigure {
    pub label: String,
    pub png: Vec<u8>,
}

/// What the generated code did. Both variants are valid results of a run.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionOutcome {
    Success {
        results: serde_json::Value,
        figures: Vec<RenderedFigure>,
    },
    Failed {
        kind: FailureKind,
        message: String,
    },
}

#[derive(Debug, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
enum HarnessReport {
    Success {
        results: serde_json::Value,
        #[serde(default)]
        figures: Vec<String>,
    },
    Failed {
        kind: FailureKind,
        message: String,
        #[serde(default)]
        traceback: Option<String>,
    },
    Environment {
        message: String,
    },
}

// ── Trait ─────────────────────────────────────────────────────────────────────

#[async_trait]
pub trait CodeExecutor: Send + Sync {
    /// Run `code` against a private copy of `sample`.
    async fn execute(&self, code: &str, sample: &DatasetSample) -> Result<ExecutionOutcome, SandboxError>;
}

// ── Python subprocess executor ────────────────────────────────────────────────

pub struct PythonExecutor {
    interpreter: PathBuf,
    policy: SandboxPolicy,
}

impl PythonExecutor {
    pub fn new<P: AsRef<Path>>(interpreter: P, policy: SandboxPolicy) -> Self {
        Self {
            interpreter: interpreter.as_ref().to_path_buf(),
            policy,
        }
    }

    pub fn policy(&self) -> &SandboxPolicy {
        &self.policy
    }

    async fn stage_inputs(&self, dir: &Path, code: &str, sample: &DatasetSample) -> Result<(), SandboxError> {
        let policy = serde_json::json!({
            "allowed_modules": self.policy.allowed_modules().collect::<Vec<_>>(),
            "result_variable": RESULT_VARIABLE,
        });
        tokio::fs::write(dir.join(HARNESS_FILE), HARNESS).await?;
        tokio::fs::write(dir.join(CODE_FILE), code).await?;
        tokio::fs::write(dir.join(DATA_FILE), sample.to_csv()?).await?;
        tokio::fs::write(dir.join(POLICY_FILE), policy.to_string()).await?;
        Ok(())
    }

    async fn collect_figures(&self, dir: &Path, names: Vec<String>) -> Result<Vec<RenderedFigure>, SandboxError> {
        let mut figures = Vec::with_capacity(names.len());
        for name in names {
            let path = Path::new(&name);
            // The harness only ever writes bare file names into its working directory.
            if path.components().count() != 1 || path.extension().and_then(|e| e.to_str()) != Some("png") {
                return Err(SandboxError::Protocol(format!("unexpected figure path '{name}'")));
            }
            let label = path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("figure")
                .to_string();
            let png = tokio::fs::read(dir.join(path)).await?;
            figures.push(RenderedFigure { label, png });
        }
        Ok(figures)
    }
}

#[async_trait]
impl CodeExecutor for PythonExecutor {
    async fn execute(&self, code: &str, sample: &DatasetSample) -> Result<ExecutionOutcome, SandboxError> {
        let workdir = tempfile::Builder::new().prefix("datastory-run-").tempdir()?;
        let dir = workdir.path();
        self.stage_inputs(dir, code, sample).await?;

        info!(
            interpreter = %self.interpreter.display(),
            rows = sample.n_rows(),
            code_len = code.len(),
            "Executing generated analysis code"
        );

        let child = Command::new(&self.interpreter)
            .arg("-B")
            .arg(HARNESS_FILE)
            .current_dir(dir)
            .env_clear()
            .env("PATH", SANDBOX_PATH)
            .env("HOME", dir)
            .env("MPLBACKEND", "Agg")
            .env("MPLCONFIGDIR", dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| SandboxError::Spawn {
                interpreter: self.interpreter.display().to_string(),
                reason: e.to_string(),
            })?;

        // Dropping the child on timeout kills it.
        let output = tokio::time::timeout(self.policy.timeout, child.wait_with_output())
            .await
            .map_err(|_| SandboxError::Timeout(self.policy.timeout))??;

        let stdout = String::from_utf8_lossy(&output.stdout);
        if !stdout.trim().is_empty() {
            debug!(stdout = %stdout.chars().take(2_000).collect::<String>(), "Generated code output");
        }

        let report_path = dir.join(REPORT_FILE);
        if !report_path.exists() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let tail: String = stderr.chars().rev().take(1_000).collect::<Vec<_>>().into_iter().rev().collect();
            return Err(SandboxError::Protocol(format!(
                "harness exited with {} without a report: {}",
                output.status, tail
            )));
        }

        let report: HarnessReport = serde_json::from_slice(&tokio::fs::read(&report_path).await?)
            .map_err(|e| SandboxError::Protocol(format!("unreadable report: {e}")))?;

        match report {
            HarnessReport::Success { results, figures } => {
                let figures = self.collect_figures(dir, figures).await?;
                debug!(figures = figures.len(), "Generated code succeeded");
                Ok(ExecutionOutcome::Success { results, figures })
            }
            HarnessReport::Failed { kind, message, traceback } => {
                warn!(?kind, %message, "Generated code failed");
                if let Some(tb) = traceback {
                    debug!(traceback = %tb, "Generated code traceback");
                }
                Ok(ExecutionOutcome::Failed { kind, message })
            }
            HarnessReport::Environment { message } => Err(SandboxError::Environment(message)),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use datastory_common::{Cell, Column};

    fn sample() -> DatasetSample {
        DatasetSample::from_columns(vec![
            Column::from_cells("x", (0..10).map(Cell::Int).collect()),
            Column::from_cells("y", (0..10).map(|i| Cell::Float(i as f64 * 2.0)).collect()),
        ])
        .unwrap()
    }

    #[test]
    fn test_report_variants_decode() {
        let ok: HarnessReport = serde_json::from_str(
            r#"{"status": "success", "results": {"k": 1}, "figures": ["figure_0.png"]}"#,
        )
        .unwrap();
        assert!(matches!(ok, HarnessReport::Success { ref figures, .. } if figures.len() == 1));

        let failed: HarnessReport = serde_json::from_str(
            r#"{"status": "failed", "kind": "syntax", "message": "Syntax error: bad"}"#,
        )
        .unwrap();
        assert!(matches!(failed, HarnessReport::Failed { kind: FailureKind::Syntax, .. }));

        let env: HarnessReport =
            serde_json::from_str(r#"{"status": "environment", "message": "No module named 'pandas'"}"#).unwrap();
        assert!(matches!(env, HarnessReport::Environment { .. }));
    }

    #[tokio::test]
    async fn test_missing_interpreter_is_spawn_error() {
        let exec = PythonExecutor::new("/nonexistent/python3", SandboxPolicy::new());
        let err = exec.execute("results = {}", &sample()).await.unwrap_err();
        assert!(matches!(err, SandboxError::Spawn { .. }));
    }

    #[tokio::test]
    #[ignore] // Requires python3 with pandas and matplotlib
    async fn test_syntax_error_is_failed_outcome() {
        let exec = PythonExecutor::new("python3", SandboxPolicy::new());
        let outcome = exec.execute("results = {", &sample()).await.unwrap();
        match outcome {
            ExecutionOutcome::Failed { kind, message } => {
                assert_eq!(kind, FailureKind::Syntax);
                assert!(!message.is_empty());
            }
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[tokio::test]
    #[ignore] // Requires python3 with pandas and matplotlib
    async fn test_results_and_figures_are_captured() {
        let exec = PythonExecutor::new("python3", SandboxPolicy::new());
        let code = "plt.figure()\nplt.plot(df['x'], df['y'])\nresults = {'mean_y': float(df['y'].mean())}";
        let outcome = exec.execute(code, &sample()).await.unwrap();
        match outcome {
            ExecutionOutcome::Success { results, figures } => {
                assert_eq!(results["mean_y"], 9.0);
                assert_eq!(figures.len(), 1);
                assert!(figures[0].png.starts_with(&[0x89, b'P', b'N', b'G']));
            }
            other => panic!("expected success, got {other:?}"),
        }
    }

    #[tokio::test]
    #[ignore] // Requires python3 with pandas and matplotlib
    async fn test_denied_import_is_runtime_failure() {
        let exec = PythonExecutor::new("python3", SandboxPolicy::new());
        let outcome = exec.execute("import os\nresults = os.listdir('/')", &sample()).await.unwrap();
        assert!(matches!(outcome, ExecutionOutcome::Failed { kind: FailureKind::Runtime, .. }));
    }

    #[tokio::test]
    #[ignore] // Requires python3 with pandas and matplotlib
    async fn test_io_module_cannot_open_host_files() {
        let exec = PythonExecutor::new("python3", SandboxPolicy::new());
        for code in [
            "results = {'leak': io.open('/etc/hostname').read()}",
            "import io as real_io\nresults = {'leak': real_io.open('/etc/hostname').read()}",
            "from io import open as o\nresults = {'leak': o('/etc/hostname').read()}",
        ] {
            let outcome = exec.execute(code, &sample()).await.unwrap();
            assert!(
                matches!(outcome, ExecutionOutcome::Failed { kind: FailureKind::Runtime, .. }),
                "{code}: {outcome:?}"
            );
        }

        let buffers = "buf = io.BytesIO()\nbuf.write(b'ok')\nresults = {'n': len(buf.getvalue())}";
        match exec.execute(buffers, &sample()).await.unwrap() {
            ExecutionOutcome::Success { results, .. } => assert_eq!(results["n"], 2),
            other => panic!("expected success, got {other:?}"),
        }
    }

    #[tokio::test]
    #[ignore] // Requires python3 with pandas and matplotlib
    async fn test_secrets_do_not_reach_the_child() {
        std::env::set_var("DATASTORY_TEST_SECRET", "hunter2");
        let mut policy = SandboxPolicy::new();
        policy.allow_module("os");
        let exec = PythonExecutor::new("python3", policy);
        let outcome = exec
            .execute("import os\nresults = {'secret': os.environ.get('DATASTORY_TEST_SECRET')}", &sample())
            .await
            .unwrap();
        match outcome {
            ExecutionOutcome::Success { results, .. } => assert!(results["secret"].is_null()),
            other => panic!("expected success, got {other:?}"),
        }
    }
}
