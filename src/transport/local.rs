//! Local execution transport.

use super::{ExecOutput, ExecRequest};
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Execute a shell script locally via `bash -c`.
/// Uses bash (not sh/dash) so scripts may use `set -o pipefail`.
pub async fn exec_local(request: &ExecRequest) -> Result<ExecOutput, String> {
    let mut command = Command::new("bash");
    command
        .arg("-c")
        .arg(&request.script)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(ref cwd) = request.cwd {
        command.current_dir(cwd);
    }
    for (key, value) in &request.env {
        command.env(key, value);
    }

    let mut child = command
        .spawn()
        .map_err(|e| format!("failed to spawn bash: {}", e))?;

    if let Some(mut stdin) = child.stdin.take() {
        if let Some(ref payload) = request.stdin {
            // scripts that never read stdin may exit first
            if let Err(e) = stdin.write_all(payload.as_bytes()).await {
                if e.kind() != std::io::ErrorKind::BrokenPipe {
                    return Err(format!("stdin write error: {}", e));
                }
            }
        }
        // dropped here so the script sees EOF
    }

    let output = child
        .wait_with_output()
        .await
        .map_err(|e| format!("wait error: {}", e))?;

    Ok(ExecOutput {
        exit_code: output.status.code().unwrap_or(-1),
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_local_echo() {
        let out = exec_local(&ExecRequest::new("echo hello")).await.unwrap();
        assert!(out.success());
        assert_eq!(out.stdout.trim(), "hello");
    }

    #[tokio::test]
    async fn test_local_failure() {
        let out = exec_local(&ExecRequest::new("exit 42")).await.unwrap();
        assert!(!out.success());
        assert_eq!(out.exit_code, 42);
    }

    #[tokio::test]
    async fn test_local_stdin_payload() {
        let req = ExecRequest::new("cat").stdin("{\"a\":1}");
        let out = exec_local(&req).await.unwrap();
        assert_eq!(out.stdout, "{\"a\":1}");
    }

    #[tokio::test]
    async fn test_local_env_and_cwd() {
        let dir = tempfile::tempdir().unwrap();
        let req = ExecRequest::new("echo \"$STEP\"; pwd")
            .env("STEP", "vpc/main-blue")
            .cwd(dir.path());
        let out = exec_local(&req).await.unwrap();
        let lines: Vec<_> = out.stdout.lines().collect();
        assert_eq!(lines[0], "vpc/main-blue");
        let cwd = std::fs::canonicalize(dir.path()).unwrap();
        assert_eq!(std::fs::canonicalize(lines[1]).unwrap(), cwd);
    }

    #[tokio::test]
    async fn test_local_stderr() {
        let out = exec_local(&ExecRequest::new("echo err >&2")).await.unwrap();
        assert!(out.success());
        assert!(out.stderr.contains("err"));
    }

    #[tokio::test]
    async fn test_local_pipefail() {
        let out = exec_local(&ExecRequest::new("set -euo pipefail\nfalse | true"))
            .await
            .unwrap();
        assert!(!out.success(), "pipefail should catch false in pipeline");
    }
}
