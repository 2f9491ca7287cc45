//! `autobuild_runner` turns a single C source file into binaries for several
//! targets by delegating to external toolchains (native compiler, container,
//! cross compiler) and bundles every output, log and manifest of the request
//! into one zip archive.
//!
//! Each request gets its own session directory; targets are built
//! concurrently and a failing target never aborts its siblings.

pub mod config;
pub mod core;
pub mod detection;
pub mod error;
pub mod execution;
pub mod orchestrator;
pub mod packaging;
pub mod session;
pub mod strategy;

use crate::config::RunnerConfig;
use crate::core::{BuildOptions, SessionReport};
use crate::error::Result;
use crate::orchestrator::Orchestrator;
use crate::session::{BuildSession, SessionManager};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

/// Everything a caller gets back for one build request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildSummary {
    pub session_id: Uuid,
    pub report: SessionReport,
    pub report_path: PathBuf,
    pub json_report_path: PathBuf,
    pub archive_path: PathBuf,
}

#[async_trait]
pub trait BuildRunner {
    async fn submit(&self, source: &[u8], targets: &[String], options: BuildOptions) -> Result<BuildSummary>;
    async fn cleanup(&self, session_id: &str) -> Result<()>;
}

pub struct AutoBuildRunner {
    config: Arc<RunnerConfig>,
    sessions: SessionManager,
    orchestrator: Orchestrator,
}

impl AutoBuildRunner {
    pub async fn new(config: RunnerConfig) -> Result<Self> {
        Self::with_host(config, detection::detect_host()).await
    }

    /// Like [`AutoBuildRunner::new`] but with an explicit host platform.
    pub async fn with_host(config: RunnerConfig, host: detection::HostPlatform) -> Result<Self> {
        let config = Arc::new(config);
        let sessions = SessionManager::new(&config.work_root).await?;
        let orchestrator = Orchestrator::new(config.clone(), host);
        Ok(Self {
            config,
            sessions,
            orchestrator,
        })
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    pub fn cancel(&self, session_id: &Uuid) -> Result<()> {
        self.sessions.cancel_session(session_id)
    }
}

#[async_trait]
impl BuildRunner for AutoBuildRunner {
    /// Builds and packages one request.
    ///
    /// The work runs on its own task. If the caller drops this future the
    /// session is cancelled, which kills every in-flight toolchain process and
    /// runs its cleanup; the task then finishes on its own.
    async fn submit(&self, source: &[u8], targets: &[String], options: BuildOptions) -> Result<BuildSummary> {
        // Input errors surface before a session directory exists.
        options.validate()?;
        if targets.iter().all(|t| t.trim().is_empty()) {
            return Err(error::RunnerError::InvalidInput("no build targets requested".to_string()));
        }

        let session = self.sessions.create_session(source).await?;
        let session_id = session.id();
        let cancel_on_drop = session.cancellation().clone().drop_guard();

        let sessions = self.sessions.clone();
        let orchestrator = self.orchestrator.clone();
        let targets = targets.to_vec();
        let task = tokio::spawn(async move {
            let result = build_and_package(&orchestrator, session, &targets, &options).await;
            sessions.release(&session_id);
            result
        });

        let result = task
            .await
            .map_err(|e| error::RunnerError::TaskFailed(format!("session {}: {}", session_id, e)))?;
        let _ = cancel_on_drop.disarm();
        result
    }

    async fn cleanup(&self, session_id: &str) -> Result<()> {
        self.sessions.teardown_by_id(session_id).await
    }
}

async fn build_and_package(
    orchestrator: &Orchestrator,
    session: Arc<BuildSession>,
    targets: &[String],
    options: &BuildOptions,
) -> Result<BuildSummary> {
    let report = orchestrator.run_session(session.clone(), targets, options).await?;

    let packaged = async {
        packaging::write_target_logs(&session, &report).await?;
        let report_path = packaging::write_report(&session, &report).await?;
        let json_report_path = packaging::write_json_report(&session, &report).await?;
        let archive_path = packaging::package_artifacts(&session).await?;
        Ok::<_, error::RunnerError>((report_path, json_report_path, archive_path))
    }
    .await;

    let (report_path, json_report_path, archive_path) = match packaged {
        Ok(paths) => paths,
        Err(e) => {
            error!(session = %session.id(), error = %e, "Packaging failed");
            return Err(error::RunnerError::PackagingFailed {
                session_id: session.id(),
                report: Box::new(report),
                source: Box::new(e),
            });
        }
    };

    info!(session = %session.id(), "Artifacts ready: {}", archive_path.display());
    Ok(BuildSummary {
        session_id: session.id(),
        report,
        report_path,
        json_report_path,
        archive_path,
    })
}
