//! Process transport: run back-end scripts and capture their output.

pub mod local;

use std::path::PathBuf;

/// Output from executing a script.
#[derive(Debug, Clone)]
pub struct ExecOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ExecOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Last non-empty stdout line, where scripts report their result.
    pub fn last_line(&self) -> Option<&str> {
        self.stdout.lines().rev().map(str::trim).find(|l| !l.is_empty())
    }

    /// Trimmed stderr, falling back to the exit code when empty.
    pub fn failure_message(&self) -> String {
        let stderr = self.stderr.trim();
        if stderr.is_empty() {
            format!("exit code {}", self.exit_code)
        } else {
            stderr.to_string()
        }
    }
}

/// A script invocation: body, stdin payload, working directory, environment.
#[derive(Debug, Clone, Default)]
pub struct ExecRequest {
    pub script: String,
    pub stdin: Option<String>,
    pub cwd: Option<PathBuf>,
    pub env: Vec<(String, String)>,
}

impl ExecRequest {
    pub fn new(script: impl Into<String>) -> Self {
        Self {
            script: script.into(),
            ..Self::default()
        }
    }

    pub fn stdin(mut self, payload: impl Into<String>) -> Self {
        self.stdin = Some(payload.into());
        self
    }

    pub fn cwd(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exec_output_success() {
        let ok = ExecOutput { exit_code: 0, stdout: "ok".into(), stderr: "".into() };
        assert!(ok.success());
        let fail = ExecOutput { exit_code: 1, stdout: "".into(), stderr: "err".into() };
        assert!(!fail.success());
        let sig = ExecOutput { exit_code: -1, stdout: "".into(), stderr: "".into() };
        assert!(!sig.success());
    }

    #[test]
    fn test_last_line_skips_blank() {
        let out = ExecOutput {
            exit_code: 0,
            stdout: "progress 50%\n{\"id\":\"x\"}\n\n".into(),
            stderr: "".into(),
        };
        assert_eq!(out.last_line(), Some("{\"id\":\"x\"}"));
        let empty = ExecOutput { exit_code: 0, stdout: "\n".into(), stderr: "".into() };
        assert_eq!(empty.last_line(), None);
    }

    #[test]
    fn test_failure_message() {
        let out = ExecOutput { exit_code: 3, stdout: "".into(), stderr: " quota exceeded\n".into() };
        assert_eq!(out.failure_message(), "quota exceeded");
        let bare = ExecOutput { exit_code: 3, stdout: "".into(), stderr: "".into() };
        assert_eq!(bare.failure_message(), "exit code 3");
    }

    #[test]
    fn test_request_builder() {
        let req = ExecRequest::new("echo hi").stdin("{}").cwd("/tmp").env("A", "1");
        assert_eq!(req.script, "echo hi");
        assert_eq!(req.stdin.as_deref(), Some("{}"));
        assert_eq!(req.env, vec![("A".to_string(), "1".to_string())]);
    }
}
