use crate::error::AppError;
use crate::sandbox::cert_command::{CertCommand, Tool};
use crate::sandbox::executor::{self, CommandOutput, ExecLimits};
use crate::state::AppState;
use std::path::{Path, PathBuf};

/// Run a certificate command under the global concurrency limit.
pub async fn run(state: &AppState, command: &CertCommand) -> Result<CommandOutput, AppError> {
    let program = match command.tool() {
        Tool::Mkcert => &state.config.mkcert_bin,
        Tool::Openssl => &state.config.openssl_bin,
    };

    let limits = ExecLimits {
        timeout_secs: state.config.command_timeout_secs,
        max_output_bytes: state.config.command_max_output_bytes,
    };

    let _permit = state
        .command_semaphore
        .acquire()
        .await
        .map_err(|_| AppError::Internal("Command semaphore closed".into()))?;

    executor::run_command(&state.policy.commands, Path::new(program), command, limits).await
}

/// The mkcert CA directory as reported by `mkcert -CAROOT`.
pub async fn ca_root(state: &AppState) -> Result<PathBuf, AppError> {
    let output = run(state, &CertCommand::CaRoot).await?;
    let root = output.stdout.trim();
    if root.is_empty() {
        return Err(AppError::Internal(
            "Could not determine CA root directory".into(),
        ));
    }
    Ok(PathBuf::from(root))
}

/// Whether both halves of the local CA exist under `ca_root`.
pub async fn ca_files_exist(ca_root: &Path) -> bool {
    let cert = tokio::fs::try_exists(ca_root.join("rootCA.pem")).await;
    let key = tokio::fs::try_exists(ca_root.join("rootCA-key.pem")).await;
    matches!((cert, key), (Ok(true), Ok(true)))
}
