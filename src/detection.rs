use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HostOs {
    Linux,
    Macos,
    Windows,
    Other(String),
}

impl HostOs {
    pub fn from_os_str(os: &str) -> Self {
        match os {
            "linux" => HostOs::Linux,
            "macos" => HostOs::Macos,
            "windows" => HostOs::Windows,
            other => HostOs::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            HostOs::Linux => "linux",
            HostOs::Macos => "macos",
            HostOs::Windows => "windows",
            HostOs::Other(name) => name,
        }
    }
}

impl fmt::Display for HostOs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Operating system and architecture of the machine running the builds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostPlatform {
    pub os: HostOs,
    pub arch: String,
}

impl HostPlatform {
    pub fn new(os: HostOs, arch: impl Into<String>) -> Self {
        Self { os, arch: arch.into() }
    }

    pub fn satisfies(&self, required: &HostOs) -> bool {
        &self.os == required
    }
}

pub fn detect_host() -> HostPlatform {
    let host = HostPlatform::new(
        HostOs::from_os_str(std::env::consts::OS),
        std::env::consts::ARCH,
    );
    tracing::debug!("Detected host platform: {}/{}", host.os, host.arch);
    host
}
