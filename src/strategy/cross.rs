use super::container::{container_name, run_prefix, to_container_path};
use super::{clear_stale_output, compile_args, finalize, BuildRequest, BuildStrategy};
use crate::config::{CrossCompiler, RunnerConfig};
use crate::core::{BuildOptions, BuildOutcome, TargetSpec};
use crate::detection::HostPlatform;
use crate::execution::{run_command_cancellable, CommandSpec};
use anyhow::Result;
use async_trait::async_trait;
use std::time::Duration;
use tracing::info;

const MINGW_DRIVER: &str = "x86_64-w64-mingw32-gcc";
const ZIG_TARGET: &str = "x86_64-windows-gnu";

/// Installs mingw-w64 then execs the compile argv passed as positional parameters.
/// Option values never become part of this script.
const MINGW_BOOTSTRAP: &str =
    "apt-get update -qq && apt-get install -y -qq mingw-w64 >/dev/null && exec \"$0\" \"$@\"";

/// Cross-compiles a Windows x86_64 executable.
///
/// With `use_isolated_container` the toolchain is bootstrapped inside a
/// disposable container and the bootstrap plus compile run as one unit under
/// the cross timeout. Otherwise the locally configured cross compiler is used.
pub struct CrossToolchain {
    runtime: String,
    image: String,
    local: CrossCompiler,
    timeout: Duration,
    host: HostPlatform,
}

impl CrossToolchain {
    pub fn new(
        runtime: impl Into<String>,
        image: impl Into<String>,
        local: CrossCompiler,
        timeout: Duration,
        host: HostPlatform,
    ) -> Self {
        Self {
            runtime: runtime.into(),
            image: image.into(),
            local,
            timeout,
            host,
        }
    }

    pub fn from_config(config: &RunnerConfig, host: HostPlatform) -> Self {
        Self::new(
            &config.container_runtime,
            &config.cross_container_image,
            config.cross_compiler.clone(),
            config.cross_timeout,
            host,
        )
    }

    pub fn command(&self, request: &BuildRequest<'_>) -> Result<CommandSpec> {
        let output = request.output_dir.join(self.output_file_name(request.options));

        if request.options.use_isolated_container {
            let source = to_container_path(request.output_dir, request.source)?;
            let output = to_container_path(request.output_dir, &output)?;
            let name = container_name(request.session_id, TargetSpec::CrossWindows);

            return Ok(run_prefix(&self.runtime, &name, request.output_dir)?
                .arg(&self.image)
                .args(["sh", "-c", MINGW_BOOTSTRAP, MINGW_DRIVER])
                .args(compile_args(request.options, source, output)));
        }

        let command = match &self.local {
            CrossCompiler::Mingw { program } => CommandSpec::new(program),
            CrossCompiler::Zig { program } => CommandSpec::new(program).args(["cc", "-target", ZIG_TARGET]),
        };
        Ok(command.args(compile_args(request.options, request.source, output)))
    }
}

#[async_trait]
impl BuildStrategy for CrossToolchain {
    fn target(&self) -> TargetSpec {
        TargetSpec::CrossWindows
    }

    fn output_file_name(&self, options: &BuildOptions) -> String {
        TargetSpec::CrossWindows.output_file_name(&options.output_basename, &self.host)
    }

    async fn build(&self, request: &BuildRequest<'_>) -> Result<BuildOutcome> {
        let output = request.output_dir.join(self.output_file_name(request.options));
        clear_stale_output(&output).await?;

        let command = self.command(request)?;
        info!(
            target_spec = %self.target(),
            isolated = request.options.use_isolated_container,
            "Cross build for {}",
            ZIG_TARGET
        );

        let result = run_command_cancellable(&command, request.output_dir, self.timeout, request.cancel).await;
        Ok(finalize(self.target(), &command, result, output).await)
    }
}
