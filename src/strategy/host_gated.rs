use super::{BuildRequest, BuildStrategy};
use crate::core::{exit_code, BuildOptions, BuildOutcome, FailureKind, TargetSpec};
use crate::detection::{HostOs, HostPlatform};
use anyhow::Result;
use async_trait::async_trait;
use tracing::warn;

/// Wraps a strategy whose toolchain only runs on a specific host OS.
pub struct HostGated<S> {
    required: HostOs,
    host: HostPlatform,
    inner: S,
}

impl<S: BuildStrategy> HostGated<S> {
    pub fn new(required: HostOs, host: HostPlatform, inner: S) -> Self {
        Self { required, host, inner }
    }
}

#[async_trait]
impl<S: BuildStrategy> BuildStrategy for HostGated<S> {
    fn target(&self) -> TargetSpec {
        self.inner.target()
    }

    fn output_file_name(&self, options: &BuildOptions) -> String {
        self.inner.output_file_name(options)
    }

    async fn build(&self, request: &BuildRequest<'_>) -> Result<BuildOutcome> {
        if !self.host.satisfies(&self.required) {
            warn!(
                target_spec = %self.target(),
                "Host {}/{} cannot build this target",
                self.host.os,
                self.host.arch
            );
            return Ok(BuildOutcome::rejected(
                self.target().as_str(),
                FailureKind::UnsupportedTarget,
                exit_code::UNSUPPORTED_HOST,
                format!(
                    "{} binaries must be built on a {} host (current host: {}/{})",
                    self.required, self.required, self.host.os, self.host.arch
                ),
            ));
        }

        self.inner.build(request).await
    }
}
