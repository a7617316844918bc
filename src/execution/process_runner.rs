//! Interpreter subprocess implementation of [`CodeRunner`].

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::process::Stdio;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tracing::{debug, instrument, warn};

use super::code_runner::{CodeRunner, RunOutput};
use crate::config::RunnerConfig;
use crate::error::ExecutionError;
use crate::models::TableArtifact;

/// Harness run by the interpreter. Reads the code from stdin, exposes only the
/// allow-listed modules, and prints a single JSON verdict to stdout.
const HARNESS: &str = r#"
import builtins, contextlib, importlib, io, json, sys, traceback

name = sys.argv[1]
allowed = json.loads(sys.argv[2])
roots = {module.split(".")[0] for module in allowed.values()}
code = sys.stdin.read()
captured = io.StringIO()

def emit(verdict):
    verdict["stdout"] = captured.getvalue()[-4000:]
    sys.__stdout__.write(json.dumps(verdict, default=str))
    sys.__stdout__.flush()
    sys.exit(0)

def guarded_import(module, globals=None, locals=None, fromlist=(), level=0):
    if level != 0 or module.split(".")[0] not in roots:
        raise ImportError("import of '%s' is not allowed" % module)
    return builtins.__import__(module, globals, locals, fromlist, level)

safe_builtins = dict(vars(builtins))
for blocked in ("open", "exec", "eval", "compile", "input", "breakpoint", "exit", "quit"):
    safe_builtins.pop(blocked, None)
safe_builtins["__import__"] = guarded_import

scope = {"__builtins__": safe_builtins, "__name__": "__generated__"}
for alias, module in allowed.items():
    scope[alias] = importlib.import_module(module)

try:
    with contextlib.redirect_stdout(captured):
        exec(compile(code, "<generated>", "exec"), scope)
except BaseException:
    emit({"status": "error", "diagnostic": traceback.format_exc()})

if name not in scope:
    emit({"status": "missing"})

value = scope[name]
pandas = importlib.import_module("pandas")
if not isinstance(value, pandas.DataFrame):
    emit({"status": "wrong_type", "found": type(value).__name__})

emit({
    "status": "ok",
    "columns": [str(column) for column in value.columns],
    "rows": json.loads(value.to_json(orient="values", date_format="iso", default_handler=str)),
})
"#;

/// Verdict printed by the harness
#[derive(Debug, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
enum HarnessVerdict {
    Ok {
        columns: Vec<String>,
        rows: Vec<Vec<Value>>,
        #[serde(default)]
        stdout: String,
    },
    Missing {},
    WrongType {
        found: String,
    },
    Error {
        diagnostic: String,
    },
}

/// Runs generated code in a child interpreter with a cleared environment,
/// a fixed working directory and a hard time limit.
#[derive(Debug, Clone)]
pub struct ProcessCodeRunner {
    config: RunnerConfig,
}

impl ProcessCodeRunner {
    pub fn new(config: RunnerConfig) -> Self {
        Self { config }
    }

    fn build_command(&self) -> Result<Command, ExecutionError> {
        let bindings = serde_json::to_string(&self.config.allowed_bindings)
            .map_err(|e| ExecutionError::Spawn(e.to_string()))?;

        let mut command = Command::new(&self.config.interpreter);
        command
            .arg("-I")
            .arg("-c")
            .arg(HARNESS)
            .arg(&self.config.output_binding)
            .arg(bindings)
            .env_clear()
            .env("PATH", std::env::var_os("PATH").unwrap_or_default())
            .env("PYTHONIOENCODING", "utf-8")
            .env("PYTHONDONTWRITEBYTECODE", "1")
            .current_dir(&self.config.working_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        Ok(command)
    }

    fn interpret(&self, verdict: HarnessVerdict) -> Result<RunOutput, ExecutionError> {
        let name = self.config.output_binding.clone();
        match verdict {
            HarnessVerdict::Ok {
                columns,
                rows,
                stdout,
            } => {
                let artifact =
                    TableArtifact::new(columns, rows).map_err(|e| ExecutionError::WrongType {
                        name,
                        found: format!("malformed table ({e})"),
                    })?;
                Ok(RunOutput { artifact, stdout })
            }
            HarnessVerdict::Missing {} => Err(ExecutionError::MissingBinding { name }),
            HarnessVerdict::WrongType { found } => Err(ExecutionError::WrongType { name, found }),
            HarnessVerdict::Error { diagnostic } => Err(ExecutionError::Raised { diagnostic }),
        }
    }
}

#[async_trait]
impl CodeRunner for ProcessCodeRunner {
    #[instrument(skip_all, fields(interpreter = %self.config.interpreter, code_len = code.len()))]
    async fn run(&self, code: &str) -> Result<RunOutput, ExecutionError> {
        let mut child = self
            .build_command()?
            .spawn()
            .map_err(|e| ExecutionError::Spawn(e.to_string()))?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| ExecutionError::Spawn("child stdin unavailable".to_string()))?;
        let stdout_pipe = child
            .stdout
            .take()
            .ok_or_else(|| ExecutionError::Spawn("child stdout unavailable".to_string()))?;
        let stderr_pipe = child
            .stderr
            .take()
            .ok_or_else(|| ExecutionError::Spawn("child stderr unavailable".to_string()))?;

        let limit = self.config.max_output_bytes;
        let collected = tokio::time::timeout(self.config.timeout(), async {
            stdin.write_all(code.as_bytes()).await.map_err(Capture::Io)?;
            drop(stdin);
            let (stdout, stderr) = tokio::try_join!(
                read_capped(stdout_pipe, limit),
                read_capped(stderr_pipe, limit)
            )?;
            let status = child.wait().await.map_err(Capture::Io)?;
            Ok::<_, Capture>(CapturedOutput {
                stdout,
                stderr,
                status,
            })
        })
        .await;

        let output = match collected {
            Ok(Ok(output)) => output,
            Ok(Err(Capture::TooLarge)) => {
                let _ = child.kill().await;
                warn!(limit, "Generated code exceeded the output limit");
                return Err(ExecutionError::OutputTooLarge { limit });
            }
            Ok(Err(Capture::Io(e))) => {
                let _ = child.kill().await;
                return Err(ExecutionError::Spawn(e.to_string()));
            }
            Err(_) => {
                let _ = child.kill().await;
                warn!(
                    seconds = self.config.timeout_seconds,
                    "Generated code timed out"
                );
                return Err(ExecutionError::Timeout {
                    seconds: self.config.timeout_seconds,
                });
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        let verdict: HarnessVerdict = serde_json::from_str(stdout.trim()).map_err(|e| {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let tail: String = stderr
                .chars()
                .rev()
                .take(2000)
                .collect::<Vec<_>>()
                .into_iter()
                .rev()
                .collect();
            ExecutionError::InvalidOutput(format!(
                "exit status {}: {e}; stderr: {tail}",
                output.status
            ))
        })?;

        debug!(verdict = ?verdict, "Harness finished");
        self.interpret(verdict)
    }
}

/// Reason the child's output was not collected
enum Capture {
    Io(std::io::Error),
    TooLarge,
}

struct CapturedOutput {
    stdout: Vec<u8>,
    stderr: Vec<u8>,
    status: std::process::ExitStatus,
}

/// Read `reader` to the end, giving up once more than `limit` bytes arrive
async fn read_capped<R>(reader: R, limit: usize) -> Result<Vec<u8>, Capture>
where
    R: AsyncRead + Unpin,
{
    let mut buffer = Vec::new();
    let cap = u64::try_from(limit).unwrap_or(u64::MAX).saturating_add(1);
    reader
        .take(cap)
        .read_to_end(&mut buffer)
        .await
        .map_err(Capture::Io)?;
    if buffer.len() > limit {
        return Err(Capture::TooLarge);
    }
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn runner() -> ProcessCodeRunner {
        ProcessCodeRunner::new(RunnerConfig::default())
    }

    fn parse(raw: Value) -> HarnessVerdict {
        serde_json::from_value(raw).unwrap()
    }

    #[test]
    fn ok_verdict_becomes_artifact() {
        let output = runner()
            .interpret(parse(json!({
                "status": "ok",
                "columns": ["a", "b"],
                "rows": [[1, "x"], [2, null]],
                "stdout": "printed"
            })))
            .unwrap();
        assert_eq!(output.artifact.columns(), ["a".to_string(), "b".to_string()]);
        assert_eq!(output.stdout, "printed");
    }

    #[test]
    fn shape_failures_are_typed() {
        let missing = runner()
            .interpret(parse(json!({ "status": "missing", "stdout": "" })))
            .unwrap_err();
        assert_eq!(
            missing,
            ExecutionError::MissingBinding { name: "df".into() }
        );

        let wrong = runner()
            .interpret(parse(json!({ "status": "wrong_type", "found": "dict" })))
            .unwrap_err();
        assert!(wrong.is_ambiguous());

        let ragged = runner()
            .interpret(parse(json!({
                "status": "ok",
                "columns": ["a", "b"],
                "rows": [[1]]
            })))
            .unwrap_err();
        assert!(ragged.is_ambiguous());
    }

    #[test]
    fn raised_errors_keep_the_diagnostic() {
        let err = runner()
            .interpret(parse(json!({
                "status": "error",
                "diagnostic": "Traceback...\nZeroDivisionError: division by zero"
            })))
            .unwrap_err();
        assert!(matches!(err, ExecutionError::Raised { ref diagnostic } if diagnostic.contains("ZeroDivisionError")));
        assert!(!err.is_ambiguous());
    }

    #[tokio::test]
    async fn missing_interpreter_is_a_spawn_error() {
        let config = RunnerConfig {
            interpreter: "/nonexistent/interpreter".into(),
            ..RunnerConfig::default()
        };
        let err = ProcessCodeRunner::new(config).run("df = 1").await.unwrap_err();
        assert!(matches!(err, ExecutionError::Spawn(_)));
    }

    async fn python_available() -> bool {
        Command::new("python3")
            .arg("--version")
            .output()
            .await
            .map(|output| output.status.success())
            .unwrap_or(false)
    }

    fn math_runner() -> ProcessCodeRunner {
        ProcessCodeRunner::new(RunnerConfig {
            allowed_bindings: std::collections::BTreeMap::from([(
                "m".to_string(),
                "math".to_string(),
            )]),
            ..RunnerConfig::default()
        })
    }

    #[tokio::test]
    async fn harness_reports_missing_output_binding() {
        if !python_available().await {
            eprintln!("python3 not found, skipping");
            return;
        }
        let err = math_runner().run("x = m.sqrt(4)").await.unwrap_err();
        assert_eq!(err, ExecutionError::MissingBinding { name: "df".into() });
    }

    #[tokio::test]
    async fn harness_blocks_imports_outside_the_allow_list() {
        if !python_available().await {
            eprintln!("python3 not found, skipping");
            return;
        }
        let err = math_runner().run("import os\ndf = os.getcwd()").await.unwrap_err();
        match err {
            ExecutionError::Raised { diagnostic } => {
                assert!(diagnostic.contains("import of 'os' is not allowed"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn harness_stops_runaway_code_at_the_timeout() {
        if !python_available().await {
            eprintln!("python3 not found, skipping");
            return;
        }
        let runner = ProcessCodeRunner::new(RunnerConfig {
            timeout_seconds: 1,
            ..math_runner().config
        });
        let err = runner.run("while True:\n    pass").await.unwrap_err();
        assert_eq!(err, ExecutionError::Timeout { seconds: 1 });
    }

    /// An interpreter stand-in that floods one stream and then hangs
    #[cfg(unix)]
    fn flooding_interpreter(dir: &std::path::Path, redirect: &str) -> std::path::PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join("flood.sh");
        std::fs::write(
            &path,
            format!("#!/bin/sh\nhead -c 50000000 /dev/zero {redirect}\nsleep 30\n"),
        )
        .unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[cfg(unix)]
    async fn assert_flood_is_cut_off(redirect: &str) {
        let dir = tempfile::tempdir().unwrap();
        let runner = ProcessCodeRunner::new(RunnerConfig {
            interpreter: flooding_interpreter(dir.path(), redirect)
                .to_string_lossy()
                .into_owned(),
            max_output_bytes: 1024,
            timeout_seconds: 20,
            ..RunnerConfig::default()
        });

        let started = std::time::Instant::now();
        let err = runner.run("df = 1").await.unwrap_err();
        assert_eq!(err, ExecutionError::OutputTooLarge { limit: 1024 });
        assert!(started.elapsed() < std::time::Duration::from_secs(10));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn stdout_flood_is_cut_off_at_the_limit() {
        assert_flood_is_cut_off("").await;
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn stderr_flood_is_cut_off_at_the_limit() {
        assert_flood_is_cut_off(">&2").await;
    }
}
