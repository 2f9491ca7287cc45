use crate::detection::HostPlatform;
use crate::error::RunnerError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use uuid::Uuid;

/// Exit codes reported when no real process exit code exists.
///
/// All sentinels are negative so they can never collide with a code produced
/// by a child process (0..=255, or 128 + signal for signalled children).
pub mod exit_code {
    pub const UNSUPPORTED_HOST: i32 = -1;
    pub const UNKNOWN_TARGET: i32 = -2;
    pub const INTERNAL_ERROR: i32 = -96;
    pub const CANCELLED: i32 = -97;
    pub const TIMEOUT: i32 = -98;
    pub const LAUNCH_FAILURE: i32 = -99;
}

const LANGUAGE_STANDARDS: &[&str] = &[
    "c89", "c90", "c99", "c11", "c17", "c18", "c2x", "c23", "gnu89", "gnu90", "gnu99", "gnu11",
    "gnu17", "gnu18", "gnu2x", "gnu23",
];

const OPTIMIZATION_LEVELS: &[&str] = &["O0", "O1", "O2", "O3", "Os", "Oz", "Og", "Ofast"];

const MAX_BASENAME_LEN: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetSpec {
    NativeHost,
    ContainerizedLinux,
    CrossWindows,
    HostMacos,
}

impl TargetSpec {
    pub const ALL: [TargetSpec; 4] = [
        TargetSpec::NativeHost,
        TargetSpec::ContainerizedLinux,
        TargetSpec::CrossWindows,
        TargetSpec::HostMacos,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TargetSpec::NativeHost => "native_host",
            TargetSpec::ContainerizedLinux => "containerized_linux",
            TargetSpec::CrossWindows => "cross_windows",
            TargetSpec::HostMacos => "host_macos",
        }
    }

    /// File name of the binary this target produces inside the session directory.
    /// Names are distinct per target so concurrent builds never share an output.
    pub fn output_file_name(&self, basename: &str, host: &HostPlatform) -> String {
        match self {
            TargetSpec::NativeHost => format!("{}_native_{}_{}", basename, host.os.as_str(), host.arch),
            TargetSpec::ContainerizedLinux => format!("{}_linux_{}", basename, host.arch),
            TargetSpec::CrossWindows => format!("{}_windows_x86_64.exe", basename),
            TargetSpec::HostMacos => format!("{}_macos_{}", basename, host.arch),
        }
    }
}

impl fmt::Display for TargetSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TargetSpec {
    type Err = RunnerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "native_host" | "native" => Ok(TargetSpec::NativeHost),
            "containerized_linux" | "linux" => Ok(TargetSpec::ContainerizedLinux),
            "cross_windows" | "windows" => Ok(TargetSpec::CrossWindows),
            "host_macos" | "macos" => Ok(TargetSpec::HostMacos),
            other => Err(RunnerError::InvalidInput(format!("unknown target: {}", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildOptions {
    pub language_standard: String,
    pub optimization_level: String,
    pub static_link: bool,
    pub use_isolated_container: bool,
    pub output_basename: String,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            language_standard: "c11".to_string(),
            optimization_level: "O2".to_string(),
            static_link: false,
            use_isolated_container: true,
            output_basename: "main".to_string(),
        }
    }
}

impl BuildOptions {
    /// Checks every string option against its allow-list before it can reach a command line.
    pub fn validate(&self) -> Result<(), RunnerError> {
        if !LANGUAGE_STANDARDS.contains(&self.language_standard.as_str()) {
            return Err(RunnerError::InvalidOption {
                option: "language_standard",
                reason: format!("unsupported standard `{}`", self.language_standard),
            });
        }

        if !OPTIMIZATION_LEVELS.contains(&self.optimization_level.as_str()) {
            return Err(RunnerError::InvalidOption {
                option: "optimization_level",
                reason: format!("unsupported level `{}`", self.optimization_level),
            });
        }

        let name = &self.output_basename;
        if name.is_empty() || name.len() > MAX_BASENAME_LEN {
            return Err(RunnerError::InvalidOption {
                option: "output_basename",
                reason: format!("must be 1-{} characters", MAX_BASENAME_LEN),
            });
        }
        if name.starts_with('-') {
            return Err(RunnerError::InvalidOption {
                option: "output_basename",
                reason: "must not start with '-'".to_string(),
            });
        }
        if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-') {
            return Err(RunnerError::InvalidOption {
                option: "output_basename",
                reason: format!("`{}` contains characters outside [A-Za-z0-9_-]", name),
            });
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    LaunchFailure,
    Timeout,
    CompileFailure,
    MissingOutput,
    UnsupportedTarget,
    UnknownTarget,
    Cancelled,
    Internal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildOutcome {
    pub target: String,
    pub success: bool,
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub command: String,
    pub output_path: Option<PathBuf>,
    pub failure: Option<FailureKind>,
    pub diagnostic: Option<String>,
    pub duration_ms: u64,
}

impl BuildOutcome {
    /// A failure that happened before (or instead of) running any process.
    pub fn rejected(
        target: impl Into<String>,
        failure: FailureKind,
        exit_code: i32,
        diagnostic: impl Into<String>,
    ) -> Self {
        let diagnostic = diagnostic.into();
        Self {
            target: target.into(),
            success: false,
            exit_code,
            stdout: String::new(),
            stderr: diagnostic.clone(),
            command: String::new(),
            output_path: None,
            failure: Some(failure),
            diagnostic: Some(diagnostic),
            duration_ms: 0,
        }
    }

    pub fn unknown_target(target: &str) -> Self {
        Self::rejected(
            target,
            FailureKind::UnknownTarget,
            exit_code::UNKNOWN_TARGET,
            format!("Unknown target `{}`", target),
        )
    }

    pub fn internal(target: impl Into<String>, diagnostic: impl Into<String>) -> Self {
        Self::rejected(target, FailureKind::Internal, exit_code::INTERNAL_ERROR, diagnostic)
    }

    pub fn cancelled(target: impl Into<String>) -> Self {
        Self::rejected(
            target,
            FailureKind::Cancelled,
            exit_code::CANCELLED,
            "Session cancelled before the build completed",
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionReport {
    pub session_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub options: BuildOptions,
    pub requested_targets: Vec<String>,
    pub outcomes: BTreeMap<String, BuildOutcome>,
}

impl SessionReport {
    pub fn all_succeeded(&self) -> bool {
        !self.outcomes.is_empty() && self.outcomes.values().all(|o| o.success)
    }

    pub fn succeeded(&self) -> impl Iterator<Item = &BuildOutcome> {
        self.outcomes.values().filter(|o| o.success)
    }

    pub fn failed(&self) -> impl Iterator<Item = &BuildOutcome> {
        self.outcomes.values().filter(|o| !o.success)
    }
}
