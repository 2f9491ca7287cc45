use crate::config::RunnerConfig;
use crate::core::{BuildOptions, BuildOutcome, SessionReport, TargetSpec};
use crate::detection::{HostOs, HostPlatform};
use crate::error::{Result, RunnerError};
use crate::session::BuildSession;
use crate::strategy::{
    BuildRequest, BuildStrategy, ContainerToolchain, CrossToolchain, HostGated, NativeToolchain,
};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

/// Resolves one strategy per requested target and runs them with failure isolation.
#[derive(Clone)]
pub struct Orchestrator {
    config: Arc<RunnerConfig>,
    host: HostPlatform,
}

impl Orchestrator {
    pub fn new(config: Arc<RunnerConfig>, host: HostPlatform) -> Self {
        Self { config, host }
    }

    pub fn host(&self) -> &HostPlatform {
        &self.host
    }

    pub fn strategy_for(&self, target: TargetSpec) -> Arc<dyn BuildStrategy> {
        let config = &self.config;
        match target {
            TargetSpec::NativeHost => Arc::new(NativeToolchain::host_default(config, self.host.clone())),
            TargetSpec::ContainerizedLinux => {
                Arc::new(ContainerToolchain::from_config(config, self.host.clone()))
            }
            TargetSpec::CrossWindows => Arc::new(CrossToolchain::from_config(config, self.host.clone())),
            TargetSpec::HostMacos => Arc::new(HostGated::new(
                HostOs::Macos,
                self.host.clone(),
                NativeToolchain::new(
                    TargetSpec::HostMacos,
                    &config.macos_compiler,
                    config.native_timeout,
                    self.host.clone(),
                ),
            )),
        }
    }

    /// Builds every requested target and returns exactly one outcome per distinct target id.
    ///
    /// Only invalid options or an empty target list are errors; everything that
    /// goes wrong with an individual target ends up in its outcome.
    pub async fn run_session(
        &self,
        session: Arc<BuildSession>,
        targets: &[String],
        options: &BuildOptions,
    ) -> Result<SessionReport> {
        options.validate()?;
        let requested = normalize_targets(targets)?;

        info!(
            session = %session.id(),
            "Running {} target(s): {}",
            requested.len(),
            requested.iter().cloned().collect::<Vec<_>>().join(", ")
        );

        let mut outcomes = BTreeMap::new();
        let semaphore = Arc::new(Semaphore::new(self.config.max_parallel_builds.max(1)));
        let mut join_set = JoinSet::new();

        for id in &requested {
            let target = match id.parse::<TargetSpec>() {
                Ok(target) => target,
                Err(_) => {
                    warn!(session = %session.id(), "Unknown target requested: {}", id);
                    outcomes.insert(id.clone(), BuildOutcome::unknown_target(id));
                    continue;
                }
            };

            let strategy = self.strategy_for(target);
            let session = session.clone();
            let options = options.clone();
            let semaphore = semaphore.clone();

            join_set.spawn(async move {
                let outcome = build_target(strategy, &session, &options, &semaphore).await;
                (target, outcome)
            });
        }

        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((target, outcome)) => {
                    if let Some(path) = &outcome.output_path {
                        if let Err(e) = session.record_output(path) {
                            error!(session = %session.id(), target_spec = %target, error = %e, "Rejected output path");
                        }
                    }
                    outcomes.insert(target.as_str().to_string(), outcome);
                }
                Err(e) => {
                    error!(session = %session.id(), error = %e, "Build task panicked");
                }
            }
        }

        // A panicked task loses its target id; fill any gap so every target is reported.
        for id in &requested {
            if !outcomes.contains_key(id) {
                outcomes.insert(id.clone(), BuildOutcome::internal(id, "Build task aborted unexpectedly"));
            }
        }

        let succeeded = outcomes.values().filter(|o| o.success).count();
        info!(
            session = %session.id(),
            "Session finished: {}/{} target(s) succeeded",
            succeeded,
            outcomes.len()
        );

        Ok(SessionReport {
            session_id: session.id(),
            created_at: session.created_at(),
            options: options.clone(),
            requested_targets: requested.into_iter().collect(),
            outcomes,
        })
    }
}

async fn build_target(
    strategy: Arc<dyn BuildStrategy>,
    session: &BuildSession,
    options: &BuildOptions,
    semaphore: &Semaphore,
) -> BuildOutcome {
    let target = strategy.target();

    let _permit = tokio::select! {
        permit = semaphore.acquire() => match permit {
            Ok(permit) => permit,
            Err(e) => return BuildOutcome::internal(target.as_str(), format!("Build slot unavailable: {}", e)),
        },
        _ = session.cancellation().cancelled() => return BuildOutcome::cancelled(target.as_str()),
    };
    if session.is_cancelled() {
        return BuildOutcome::cancelled(target.as_str());
    }

    let source = session.source_path();
    let request = BuildRequest {
        session_id: session.id(),
        output_dir: session.root(),
        source: &source,
        options,
        cancel: session.cancellation(),
    };

    match strategy.build(&request).await {
        Ok(outcome) => {
            if outcome.success {
                info!(session = %session.id(), target_spec = %target, "Target built in {} ms", outcome.duration_ms);
            } else {
                warn!(
                    session = %session.id(),
                    target_spec = %target,
                    exit_code = outcome.exit_code,
                    "Target failed: {:?}",
                    outcome.failure
                );
            }
            outcome
        }
        Err(e) => {
            error!(session = %session.id(), target_spec = %target, error = %e, "Strategy error");
            BuildOutcome::internal(target.as_str(), format!("Build strategy failed: {:#}", e))
        }
    }
}

/// Trims, canonicalizes known ids and deduplicates the requested targets.
fn normalize_targets(targets: &[String]) -> Result<BTreeSet<String>> {
    let requested: BTreeSet<String> = targets
        .iter()
        .map(|t| t.trim())
        .filter(|t| !t.is_empty())
        .map(|t| match t.parse::<TargetSpec>() {
            Ok(target) => target.as_str().to_string(),
            Err(_) => t.to_string(),
        })
        .collect();

    if requested.is_empty() {
        return Err(RunnerError::InvalidInput("no build targets requested".to_string()));
    }
    Ok(requested)
}
