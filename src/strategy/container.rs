use super::{clear_stale_output, compile_args, finalize, BuildRequest, BuildStrategy};
use crate::config::RunnerConfig;
use crate::core::{BuildOptions, BuildOutcome, TargetSpec};
use crate::detection::HostPlatform;
use crate::execution::{run_command_cancellable, CommandSpec};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::path::{Component, Path};
use std::time::Duration;
use tracing::info;
use uuid::Uuid;

/// Mount point of the session directory inside the isolated environment.
pub const CONTAINER_WORKDIR: &str = "/work";

/// Translates a path under `session_root` to the path the container sees.
pub fn to_container_path(session_root: &Path, host_path: &Path) -> Result<String> {
    let relative = host_path
        .strip_prefix(session_root)
        .map_err(|_| anyhow!("{:?} is outside the session directory {:?}", host_path, session_root))?;

    let mut translated = String::from(CONTAINER_WORKDIR);
    for component in relative.components() {
        match component {
            Component::Normal(part) => {
                let part = part
                    .to_str()
                    .ok_or_else(|| anyhow!("non UTF-8 path component in {:?}", host_path))?;
                translated.push('/');
                translated.push_str(part);
            }
            Component::CurDir => {}
            _ => return Err(anyhow!("refusing to translate {:?}", host_path)),
        }
    }
    Ok(translated)
}

/// Unique, predictable container name so a killed build can be removed by name.
pub fn container_name(session_id: Uuid, target: TargetSpec) -> String {
    format!("autobuild-{}-{}", session_id.simple(), target.as_str().replace('_', "-"))
}

/// `<runtime> run --rm --name <name> -v <root>:/work:rw -w /work`, without the image.
pub(crate) fn run_prefix(runtime: &str, name: &str, session_root: &Path) -> Result<CommandSpec> {
    let root = session_root
        .to_str()
        .ok_or_else(|| anyhow!("session directory {:?} is not valid UTF-8", session_root))?;
    if root.contains(':') {
        return Err(anyhow!("session directory {:?} cannot be bind-mounted", session_root));
    }

    Ok(CommandSpec::new(runtime)
        .args(["run", "--rm", "--name", name])
        .arg("-v")
        .arg(format!("{}:{}:rw", root, CONTAINER_WORKDIR))
        .args(["-w", CONTAINER_WORKDIR])
        .with_cleanup(CommandSpec::new(runtime).args(["rm", "-f", name])))
}

/// Runs the compiler inside a disposable container with the session directory bind-mounted.
pub struct ContainerToolchain {
    runtime: String,
    image: String,
    compiler: String,
    timeout: Duration,
    host: HostPlatform,
}

impl ContainerToolchain {
    pub fn new(
        runtime: impl Into<String>,
        image: impl Into<String>,
        compiler: impl Into<String>,
        timeout: Duration,
        host: HostPlatform,
    ) -> Self {
        Self {
            runtime: runtime.into(),
            image: image.into(),
            compiler: compiler.into(),
            timeout,
            host,
        }
    }

    pub fn from_config(config: &RunnerConfig, host: HostPlatform) -> Self {
        Self::new(
            &config.container_runtime,
            &config.container_image,
            &config.container_compiler,
            config.container_timeout,
            host,
        )
    }

    pub fn command(&self, request: &BuildRequest<'_>) -> Result<CommandSpec> {
        let output = request.output_dir.join(self.output_file_name(request.options));
        let source = to_container_path(request.output_dir, request.source)?;
        let output = to_container_path(request.output_dir, &output)?;
        let name = container_name(request.session_id, TargetSpec::ContainerizedLinux);

        Ok(run_prefix(&self.runtime, &name, request.output_dir)?
            .args(["--network", "none"])
            .arg(&self.image)
            .arg(&self.compiler)
            .args(compile_args(request.options, source, output)))
    }
}

#[async_trait]
impl BuildStrategy for ContainerToolchain {
    fn target(&self) -> TargetSpec {
        TargetSpec::ContainerizedLinux
    }

    fn output_file_name(&self, options: &BuildOptions) -> String {
        TargetSpec::ContainerizedLinux.output_file_name(&options.output_basename, &self.host)
    }

    async fn build(&self, request: &BuildRequest<'_>) -> Result<BuildOutcome> {
        let output = request.output_dir.join(self.output_file_name(request.options));
        clear_stale_output(&output).await?;

        let command = self.command(request)?;
        info!(target_spec = %self.target(), "Containerized build in {} via {}", self.image, self.runtime);

        let result = run_command_cancellable(&command, request.output_dir, self.timeout, request.cancel).await;
        Ok(finalize(self.target(), &command, result, output).await)
    }
}
