//! CommandBackend - サブプロセスとして動くアルゴリズムの呼び出し
//!
//! The argument template may reference call parameters as `{name}`:
//!
//! ```ignore
//! CommandBackend::new("python3", vec![
//!     "tappable/main.py".into(), "-i".into(), "{images}".into(),
//!     "-x".into(), "{annotations}".into(), "-o".into(), "{output}".into(),
//!     "-t".into(), "{threshold}".into(),
//! ]);
//! ```

use async_trait::async_trait;
use std::path::PathBuf;

use crate::domain::AlgorithmError;
use crate::ports::{AlgorithmBackend, AlgorithmCall};

/// Keep error messages readable when a tool dumps a long traceback.
const STDERR_TAIL: usize = 2000;

#[derive(Debug, Clone)]
pub struct CommandBackend {
    program: String,
    args: Vec<String>,
    working_dir: Option<PathBuf>,
}

impl CommandBackend {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            working_dir: None,
        }
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Resolve `{name}` placeholders against the call's parameters.
    pub fn render_args(&self, call: &AlgorithmCall) -> Result<Vec<String>, AlgorithmError> {
        self.args.iter().map(|arg| render(arg, call)).collect()
    }
}

fn render(template: &str, call: &AlgorithmCall) -> Result<String, AlgorithmError> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        let Some(len) = rest[start..].find('}') else {
            break;
        };
        let name = &rest[start + 1..start + len];
        let value = call
            .get(name)
            .ok_or_else(|| AlgorithmError::MissingParam(name.to_string()))?;
        out.push_str(&rest[..start]);
        out.push_str(value);
        rest = &rest[start + len + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

#[async_trait]
impl AlgorithmBackend for CommandBackend {
    async fn invoke(&self, call: &AlgorithmCall) -> Result<(), AlgorithmError> {
        let args = self.render_args(call)?;
        tracing::info!(
            algorithm = %call.algorithm,
            program = %self.program,
            ?args,
            "running algorithm"
        );

        let mut command = tokio::process::Command::new(&self.program);
        command.args(&args).kill_on_drop(true);
        if let Some(dir) = &self.working_dir {
            command.current_dir(dir);
        }

        let output = command.output().await.map_err(|source| AlgorithmError::Spawn {
            program: self.program.clone(),
            source,
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let tail_start = stderr
                .char_indices()
                .rev()
                .nth(STDERR_TAIL)
                .map(|(i, _)| i)
                .unwrap_or(0);
            return Err(AlgorithmError::Exit {
                program: self.program.clone(),
                code: output.status.code(),
                stderr: stderr[tail_start..].trim().to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TaskKind;

    fn call() -> AlgorithmCall {
        AlgorithmCall::new(TaskKind::Tappability)
            .param("images", "/tmp/images")
            .param("threshold", "50")
    }

    #[test]
    fn placeholders_are_substituted() {
        let backend = CommandBackend::new(
            "python3",
            vec![
                "main.py".into(),
                "-i".into(),
                "{images}".into(),
                "--threshold={threshold}".into(),
            ],
        );
        let args = backend.render_args(&call()).unwrap();
        assert_eq!(args, vec!["main.py", "-i", "/tmp/images", "--threshold=50"]);
    }

    #[test]
    fn unknown_placeholder_is_an_error() {
        let backend = CommandBackend::new("python3", vec!["{output}".into()]);
        let err = backend.render_args(&call()).unwrap_err();
        assert!(matches!(err, AlgorithmError::MissingParam(ref name) if name == "output"));
    }

    #[test]
    fn unbalanced_brace_is_kept_verbatim() {
        let backend = CommandBackend::new("echo", vec!["{images".into()]);
        assert_eq!(backend.render_args(&call()).unwrap(), vec!["{images"]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn non_zero_exit_is_reported_with_stderr() {
        let backend = CommandBackend::new(
            "sh",
            vec!["-c".into(), "echo boom >&2; exit 3".into()],
        );
        let err = backend.invoke(&call()).await.unwrap_err();
        match err {
            AlgorithmError::Exit { code, stderr, .. } => {
                assert_eq!(code, Some(3));
                assert_eq!(stderr, "boom");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn successful_command_writes_into_output_dir() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("done.txt");
        let backend = CommandBackend::new("sh", vec!["-c".into(), "touch {output}".into()]);
        let call = AlgorithmCall::new(TaskKind::DisplayIssue).path_param("output", &out);
        backend.invoke(&call).await.unwrap();
        assert!(out.exists());
    }

    #[tokio::test]
    async fn missing_program_is_a_spawn_error() {
        let backend = CommandBackend::new("/nonexistent/algorithm", vec![]);
        let err = backend.invoke(&call()).await.unwrap_err();
        assert!(matches!(err, AlgorithmError::Spawn { .. }));
    }
}
