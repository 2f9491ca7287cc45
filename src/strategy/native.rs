use super::{clear_stale_output, compile_args, finalize, BuildRequest, BuildStrategy};
use crate::config::RunnerConfig;
use crate::core::{BuildOptions, BuildOutcome, TargetSpec};
use crate::detection::HostPlatform;
use crate::execution::{run_command_cancellable, CommandSpec};
use anyhow::Result;
use async_trait::async_trait;
use std::time::Duration;
use tracing::info;

/// Invokes a compiler installed on the host directly. No isolation.
pub struct NativeToolchain {
    target: TargetSpec,
    compiler: String,
    timeout: Duration,
    host: HostPlatform,
}

impl NativeToolchain {
    pub fn new(target: TargetSpec, compiler: impl Into<String>, timeout: Duration, host: HostPlatform) -> Self {
        Self {
            target,
            compiler: compiler.into(),
            timeout,
            host,
        }
    }

    pub fn host_default(config: &RunnerConfig, host: HostPlatform) -> Self {
        Self::new(TargetSpec::NativeHost, &config.native_compiler, config.native_timeout, host)
    }

    pub fn command(&self, request: &BuildRequest<'_>) -> CommandSpec {
        let output = request.output_dir.join(self.output_file_name(request.options));
        CommandSpec::new(&self.compiler).args(compile_args(request.options, request.source, output))
    }
}

#[async_trait]
impl BuildStrategy for NativeToolchain {
    fn target(&self) -> TargetSpec {
        self.target
    }

    fn output_file_name(&self, options: &BuildOptions) -> String {
        self.target.output_file_name(&options.output_basename, &self.host)
    }

    async fn build(&self, request: &BuildRequest<'_>) -> Result<BuildOutcome> {
        let output = request.output_dir.join(self.output_file_name(request.options));
        clear_stale_output(&output).await?;

        let command = self.command(request);
        info!(target_spec = %self.target, "Native build with {}", self.compiler);

        let result = run_command_cancellable(&command, request.output_dir, self.timeout, request.cancel).await;
        Ok(finalize(self.target, &command, result, output).await)
    }
}
