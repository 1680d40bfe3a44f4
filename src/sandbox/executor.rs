use crate::error::AppError;
use crate::sandbox::cert_command::CertCommand;
use crate::sandbox::command_validator::{redact, CommandValidator};
use serde::Serialize;
use std::path::Path;
use std::time::Instant;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;

#[derive(Debug, Clone, Serialize)]
pub struct CommandOutput {
    pub command: String,
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Copy)]
pub struct ExecLimits {
    pub timeout_secs: u64,
    pub max_output_bytes: usize,
}

enum CollectError {
    Overflow,
    Io(std::io::Error),
}

/// Read at most `max` bytes; one byte more is an overflow.
async fn read_bounded<R>(reader: Option<R>, max: usize) -> Result<Vec<u8>, CollectError>
where
    R: AsyncRead + Unpin,
{
    let mut buf = Vec::new();
    if let Some(reader) = reader {
        reader
            .take(max as u64 + 1)
            .read_to_end(&mut buf)
            .await
            .map_err(CollectError::Io)?;
    }
    if buf.len() > max {
        return Err(CollectError::Overflow);
    }
    Ok(buf)
}

/// Check `command` against the allowlist and run `program` with its argument
/// vector. No shell is involved.
pub async fn run_command(
    validator: &CommandValidator,
    program: &Path,
    command: &CertCommand,
    limits: ExecLimits,
) -> Result<CommandOutput, AppError> {
    let rendered = command.render();
    validator.check(&rendered)?;
    let logged = redact(&rendered).into_owned();

    let start = Instant::now();

    let mut cmd = Command::new(program);
    cmd.args(command.args())
        .env("LC_ALL", "C")
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped())
        .kill_on_drop(true);
    if let Some(dir) = command.working_dir() {
        cmd.current_dir(dir);
    }

    let mut child = cmd.spawn().map_err(|e| AppError::SubprocessFailure {
        message: format!("Failed to spawn {}: {}", command.tool(), e),
        stderr: String::new(),
    })?;
    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    let max = limits.max_output_bytes;

    // Both pipes are drained concurrently; the first overflow ends collection.
    let result = tokio::time::timeout(std::time::Duration::from_secs(limits.timeout_secs), async {
        let (out, err) = tokio::try_join!(read_bounded(stdout, max), read_bounded(stderr, max))?;
        let status = child.wait().await.map_err(CollectError::Io)?;
        Ok::<_, CollectError>((out, err, status))
    })
    .await;

    let duration_ms = start.elapsed().as_millis() as u64;

    let (stdout, stderr, status) = match result {
        Ok(Ok(collected)) => collected,
        Ok(Err(CollectError::Overflow)) => {
            let _ = child.start_kill();
            tracing::warn!(command = %logged, max_output_bytes = max, "Command output exceeded limit");
            return Err(AppError::SubprocessFailure {
                message: format!("{} output exceeded {} bytes", command.tool(), max),
                stderr: String::new(),
            });
        }
        Ok(Err(CollectError::Io(e))) => {
            let _ = child.start_kill();
            return Err(AppError::SubprocessFailure {
                message: format!("{} execution failed: {}", command.tool(), e),
                stderr: String::new(),
            });
        }
        Err(_) => {
            let _ = child.start_kill();
            tracing::warn!(command = %logged, timeout_secs = limits.timeout_secs, "Command timed out");
            return Err(AppError::Timeout(limits.timeout_secs));
        }
    };

    let stderr = String::from_utf8_lossy(&stderr).into_owned();
    let exit_code = status.code().unwrap_or(-1);
    if !status.success() {
        tracing::warn!(
            command = %logged,
            exit_code,
            duration_ms,
            "Command failed"
        );
        return Err(AppError::SubprocessFailure {
            message: format!("{} exited with status {}", command.tool(), exit_code),
            stderr,
        });
    }

    tracing::debug!(command = %logged, duration_ms, "Command completed");

    Ok(CommandOutput {
        command: logged,
        exit_code,
        stdout: String::from_utf8_lossy(&stdout).into_owned(),
        stderr,
        duration_ms,
    })
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use std::path::PathBuf;

    fn script(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn limits() -> ExecLimits {
        ExecLimits {
            timeout_secs: 5,
            max_output_bytes: 1024,
        }
    }

    #[tokio::test]
    async fn arguments_are_passed_without_a_shell() {
        let tmp = tempfile::tempdir().unwrap();
        let program = script(tmp.path(), "mkcert", r#"printf '%s\n' "$@""#);
        let out = run_command(
            &CommandValidator::new(),
            &program,
            &CertCommand::CaRoot,
            limits(),
        )
        .await
        .unwrap();
        assert_eq!(out.stdout, "-CAROOT\n");
        assert_eq!(out.command, "mkcert -CAROOT");
        assert_eq!(out.exit_code, 0);
    }

    #[tokio::test]
    async fn generate_runs_inside_the_target_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let program = script(tmp.path(), "mkcert", "pwd");
        let dir = tmp.path().join("2024-01-01");
        std::fs::create_dir_all(&dir).unwrap();
        let cmd = CertCommand::Generate {
            dir: dir.clone(),
            cert_file: "a.pem".into(),
            key_file: "a-key.pem".into(),
            domains: vec!["a.test".into()],
        };
        let out = run_command(&CommandValidator::new(), &program, &cmd, limits())
            .await
            .unwrap();
        assert_eq!(
            PathBuf::from(out.stdout.trim()).canonicalize().unwrap(),
            dir.canonicalize().unwrap()
        );
    }

    #[tokio::test]
    async fn rejected_commands_never_spawn() {
        let tmp = tempfile::tempdir().unwrap();
        let marker = tmp.path().join("ran");
        let program = script(tmp.path(), "mkcert", &format!("touch {}", marker.display()));
        let cmd = CertCommand::Generate {
            dir: tmp.path().join("x;reboot"),
            cert_file: "a.pem".into(),
            key_file: "a-key.pem".into(),
            domains: vec!["a.test".into()],
        };
        let err = run_command(&CommandValidator::new(), &program, &cmd, limits())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidCommand(_)));
        assert!(!marker.exists());
    }

    #[tokio::test]
    async fn non_zero_exit_surfaces_stderr() {
        let tmp = tempfile::tempdir().unwrap();
        let program = script(tmp.path(), "mkcert", "echo 'no CA' >&2; exit 3");
        let err = run_command(
            &CommandValidator::new(),
            &program,
            &CertCommand::Install,
            limits(),
        )
        .await
        .unwrap_err();
        match err {
            AppError::SubprocessFailure { message, stderr } => {
                assert!(message.contains("status 3"));
                assert_eq!(stderr.trim(), "no CA");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn slow_commands_time_out() {
        let tmp = tempfile::tempdir().unwrap();
        let program = script(tmp.path(), "mkcert", "sleep 5");
        let err = run_command(
            &CommandValidator::new(),
            &program,
            &CertCommand::CaRoot,
            ExecLimits {
                timeout_secs: 1,
                max_output_bytes: 1024,
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::Timeout(1)));
    }

    #[tokio::test]
    async fn oversized_output_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let program = script(tmp.path(), "mkcert", "head -c 4096 /dev/zero");
        let err = run_command(
            &CommandValidator::new(),
            &program,
            &CertCommand::CaRoot,
            limits(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::SubprocessFailure { .. }));
    }

    #[tokio::test]
    async fn output_overflow_stops_the_child_early() {
        let tmp = tempfile::tempdir().unwrap();
        let program = script(tmp.path(), "mkcert", "head -c 65536 /dev/zero; sleep 5");
        let started = Instant::now();
        let err = run_command(
            &CommandValidator::new(),
            &program,
            &CertCommand::CaRoot,
            ExecLimits {
                timeout_secs: 10,
                max_output_bytes: 1024,
            },
        )
        .await
        .unwrap_err();
        match err {
            AppError::SubprocessFailure { message, .. } => {
                assert!(message.contains("exceeded 1024 bytes"))
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(started.elapsed() < std::time::Duration::from_secs(3));
    }

    #[tokio::test]
    async fn output_at_the_limit_is_accepted() {
        let tmp = tempfile::tempdir().unwrap();
        let program = script(tmp.path(), "mkcert", "head -c 1024 /dev/zero");
        let out = run_command(
            &CommandValidator::new(),
            &program,
            &CertCommand::CaRoot,
            limits(),
        )
        .await
        .unwrap();
        assert_eq!(out.stdout.len(), 1024);
    }

    #[tokio::test]
    async fn pfx_password_stays_out_of_argv_and_logs() {
        let tmp = tempfile::tempdir().unwrap();
        let program = script(tmp.path(), "openssl", r#"printf '%s\n' "$@""#);
        let password_file = tmp.path().join("export.pass");
        std::fs::write(&password_file, "Hunter2-secret\n").unwrap();
        let cmd = CertCommand::Pkcs12 {
            out: tmp.path().join("a.pfx"),
            key: tmp.path().join("a-key.pem"),
            cert: tmp.path().join("a.pem"),
            ca: None,
            password_file: password_file.clone(),
            legacy: false,
        };
        let out = run_command(&CommandValidator::new(), &program, &cmd, limits())
            .await
            .unwrap();
        assert!(!out.stdout.contains("Hunter2-secret"));
        assert!(!out.command.contains("Hunter2-secret"));
        assert!(out
            .stdout
            .lines()
            .any(|arg| arg == format!("file:{}", password_file.display())));
    }

    #[tokio::test]
    async fn missing_binary_is_a_subprocess_failure() {
        let err = run_command(
            &CommandValidator::new(),
            Path::new("/nonexistent/mkcert"),
            &CertCommand::CaRoot,
            limits(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::SubprocessFailure { .. }));
    }
}
