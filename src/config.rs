use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use tracing::warn;

/// Toolchain used for `cross_windows` builds that run outside a container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CrossCompiler {
    /// A MinGW-w64 gcc driver, e.g. `x86_64-w64-mingw32-gcc`.
    Mingw { program: String },
    /// `zig cc -target x86_64-windows-gnu`.
    Zig { program: PathBuf },
}

impl Default for CrossCompiler {
    fn default() -> Self {
        CrossCompiler::Mingw {
            program: "x86_64-w64-mingw32-gcc".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerConfig {
    pub work_root: PathBuf,
    pub native_timeout: Duration,
    pub container_timeout: Duration,
    pub cross_timeout: Duration,
    pub max_parallel_builds: usize,
    pub container_runtime: String,
    pub container_image: String,
    pub container_compiler: String,
    pub cross_container_image: String,
    pub native_compiler: String,
    pub macos_compiler: String,
    pub cross_compiler: CrossCompiler,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            work_root: env::temp_dir().join("autobuild-sessions"),
            native_timeout: Duration::from_secs(20),
            container_timeout: Duration::from_secs(60),
            cross_timeout: Duration::from_secs(1800),
            max_parallel_builds: 2,
            container_runtime: "docker".to_string(),
            container_image: "gcc:12".to_string(),
            container_compiler: "gcc".to_string(),
            cross_container_image: "ubuntu:22.04".to_string(),
            native_compiler: "gcc".to_string(),
            macos_compiler: "clang".to_string(),
            cross_compiler: CrossCompiler::default(),
        }
    }
}

impl RunnerConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let cross_compiler = match env::var("AUTOBUILD_ZIG") {
            Ok(zig) if !zig.trim().is_empty() => CrossCompiler::Zig {
                program: PathBuf::from(zig),
            },
            _ => match env::var("AUTOBUILD_CROSS_CC") {
                Ok(program) if !program.trim().is_empty() => CrossCompiler::Mingw { program },
                _ => defaults.cross_compiler,
            },
        };

        Self {
            work_root: env::var("AUTOBUILD_WORK_ROOT")
                .map(PathBuf::from)
                .unwrap_or(defaults.work_root),
            native_timeout: secs_var("AUTOBUILD_NATIVE_TIMEOUT_SECS", defaults.native_timeout),
            container_timeout: secs_var("AUTOBUILD_CONTAINER_TIMEOUT_SECS", defaults.container_timeout),
            cross_timeout: secs_var("AUTOBUILD_CROSS_TIMEOUT_SECS", defaults.cross_timeout),
            max_parallel_builds: parsed_var("AUTOBUILD_MAX_PARALLEL", defaults.max_parallel_builds).max(1),
            container_runtime: string_var("AUTOBUILD_CONTAINER_RUNTIME", defaults.container_runtime),
            container_image: string_var("AUTOBUILD_CONTAINER_IMAGE", defaults.container_image),
            container_compiler: string_var("AUTOBUILD_CONTAINER_CC", defaults.container_compiler),
            cross_container_image: string_var("AUTOBUILD_CROSS_IMAGE", defaults.cross_container_image),
            native_compiler: string_var("AUTOBUILD_NATIVE_CC", defaults.native_compiler),
            macos_compiler: string_var("AUTOBUILD_MACOS_CC", defaults.macos_compiler),
            cross_compiler,
        }
    }

    pub fn with_work_root(mut self, work_root: impl Into<PathBuf>) -> Self {
        self.work_root = work_root.into();
        self
    }
}

fn string_var(key: &str, default: String) -> String {
    match env::var(key) {
        Ok(value) if !value.trim().is_empty() => value,
        _ => default,
    }
}

fn parsed_var<T: std::str::FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => raw.trim().parse::<T>().unwrap_or_else(|_| {
            warn!("Ignoring unparseable value for {}: {:?}", key, raw);
            default
        }),
        Err(_) => default,
    }
}

fn secs_var(key: &str, default: Duration) -> Duration {
    Duration::from_secs(parsed_var(key, default.as_secs()).max(1))
}
