//! Build strategies: one implementation per [`TargetSpec`].
//!
//! A strategy turns the session's source file plus [`BuildOptions`] into a
//! single Process Runner invocation and interprets the result. The
//! orchestrator only ever sees the [`BuildStrategy`] trait.

pub mod container;
pub mod cross;
pub mod host_gated;
pub mod native;

pub use container::ContainerToolchain;
pub use cross::CrossToolchain;
pub use host_gated::HostGated;
pub use native::NativeToolchain;

use crate::core::{BuildOptions, BuildOutcome, FailureKind, TargetSpec};
use crate::execution::{CommandSpec, ProcessResult, ProcessStatus};
use anyhow::Result;
use async_trait::async_trait;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Everything a strategy needs to build one target of a session.
pub struct BuildRequest<'a> {
    pub session_id: Uuid,
    /// Session directory; every output is written here.
    pub output_dir: &'a Path,
    pub source: &'a Path,
    pub options: &'a BuildOptions,
    pub cancel: &'a CancellationToken,
}

#[async_trait]
pub trait BuildStrategy: Send + Sync {
    fn target(&self) -> TargetSpec;

    fn output_file_name(&self, options: &BuildOptions) -> String;

    /// Builds the target. `Err` is reserved for failures of the strategy itself
    /// (e.g. an unusable session path); a failed compile is an `Ok` outcome.
    async fn build(&self, request: &BuildRequest<'_>) -> Result<BuildOutcome>;
}

/// `-std=<std> -<opt> <source> -o <output> -Wall -Wextra [-static]`
pub(crate) fn compile_args(
    options: &BuildOptions,
    source: impl Into<OsString>,
    output: impl Into<OsString>,
) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec![
        format!("-std={}", options.language_standard).into(),
        format!("-{}", options.optimization_level).into(),
        source.into(),
        "-o".into(),
        output.into(),
        "-Wall".into(),
        "-Wextra".into(),
    ];
    if options.static_link {
        args.push("-static".into());
    }
    args
}

/// Removes a leftover output so that its presence after the build proves the build produced it.
pub(crate) async fn clear_stale_output(path: &Path) -> std::io::Result<()> {
    match tokio::fs::remove_file(path).await {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

/// Applies the common success rule: zero exit code *and* the expected output on disk.
pub(crate) async fn finalize(
    target: TargetSpec,
    command: &CommandSpec,
    result: ProcessResult,
    expected_output: PathBuf,
) -> BuildOutcome {
    let output_exists = tokio::fs::metadata(&expected_output)
        .await
        .map(|m| m.is_file())
        .unwrap_or(false);

    let (success, failure, diagnostic) = match result.status {
        ProcessStatus::Exited(0) if output_exists => (true, None, result.diagnostic),
        ProcessStatus::Exited(0) => (
            false,
            Some(FailureKind::MissingOutput),
            Some(format!(
                "Toolchain exited 0 but the expected output {:?} was not produced",
                expected_output.file_name().unwrap_or_default()
            )),
        ),
        ProcessStatus::Exited(_) | ProcessStatus::Signaled(_) => {
            (false, Some(FailureKind::CompileFailure), result.diagnostic)
        }
        ProcessStatus::LaunchFailed => (false, Some(FailureKind::LaunchFailure), result.diagnostic),
        ProcessStatus::TimedOut => (false, Some(FailureKind::Timeout), result.diagnostic),
        ProcessStatus::Cancelled => (false, Some(FailureKind::Cancelled), result.diagnostic),
    };

    BuildOutcome {
        target: target.as_str().to_string(),
        success,
        exit_code: result.status.exit_code(),
        stdout: result.stdout,
        stderr: result.stderr,
        command: command.to_string(),
        output_path: success.then_some(expected_output),
        failure,
        diagnostic,
        duration_ms: result.elapsed.as_millis() as u64,
    }
}
