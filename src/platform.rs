// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Host platform detection.
//!
//! Nvstrap supports exactly two operating system families: Linux and macOS.
//! Anything else is rejected before a single component is touched. The CPU
//! architecture is carried along for the few installers that need it to pick
//! a package manager prefix or a release asset name.

use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    path::PathBuf,
    str::FromStr,
};

/// Supported operating system families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OsFamily {
    Linux,
    MacOs,
}

impl OsFamily {
    /// Kernel name as reported by `uname -s`.
    pub fn kernel_name(&self) -> &'static str {
        match self {
            Self::Linux => "Linux",
            Self::MacOs => "Darwin",
        }
    }

    /// Whether an unprivileged fallback binary directory is available.
    pub fn has_user_bin_fallback(&self) -> bool {
        matches!(self, Self::Linux)
    }
}

impl FromStr for OsFamily {
    type Err = PlatformError;

    fn from_str(kernel: &str) -> Result<Self, Self::Err> {
        match kernel.trim().to_ascii_lowercase().as_str() {
            "linux" => Ok(Self::Linux),
            "darwin" | "macos" => Ok(Self::MacOs),
            _ => Err(PlatformError::UnsupportedOs(kernel.trim().to_string())),
        }
    }
}

impl Display for OsFamily {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(self.kernel_name())
    }
}

/// CPU architecture.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Arch {
    X86_64,
    Arm64,
    Other(String),
}

impl From<&str> for Arch {
    fn from(machine: &str) -> Self {
        match machine.trim().to_ascii_lowercase().as_str() {
            "x86_64" | "amd64" => Self::X86_64,
            "arm64" | "aarch64" => Self::Arm64,
            other => Self::Other(other.to_string()),
        }
    }
}

impl Display for Arch {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::X86_64 => fmt.write_str("x86_64"),
            Self::Arm64 => fmt.write_str("arm64"),
            Self::Other(name) => fmt.write_str(name),
        }
    }
}

/// Detected host platform.
///
/// Computed once per run, never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Platform {
    pub os: OsFamily,
    pub arch: Arch,
}

impl Platform {
    /// Construct new platform descriptor.
    pub fn new(os: OsFamily, arch: Arch) -> Self {
        Self { os, arch }
    }

    /// Detect the platform the current process is running on.
    ///
    /// # Errors
    ///
    /// - Return [`PlatformError::UnsupportedOs`] for anything other than
    ///   Linux or macOS.
    pub fn detect() -> Result<Self> {
        Self::from_uname(std::env::consts::OS, std::env::consts::ARCH)
    }

    /// Build platform descriptor from `uname -s` and `uname -m` strings.
    ///
    /// # Errors
    ///
    /// - Return [`PlatformError::UnsupportedOs`] for unknown kernel names.
    pub fn from_uname(kernel: &str, machine: &str) -> Result<Self> {
        Ok(Self::new(kernel.parse()?, Arch::from(machine)))
    }

    /// Homebrew installation prefix.
    ///
    /// Apple Silicon machines install Homebrew under `/opt/homebrew`, Intel
    /// machines under `/usr/local`.
    pub fn brew_prefix(&self) -> PathBuf {
        match self.arch {
            Arch::Arm64 => PathBuf::from("/opt/homebrew"),
            _ => PathBuf::from("/usr/local"),
        }
    }

    /// Architecture suffix used by Go-style release assets, e.g., yq.
    ///
    /// # Errors
    ///
    /// - Return [`PlatformError::UnsupportedArch`] if the architecture has no
    ///   published asset.
    pub fn go_arch(&self) -> Result<&'static str> {
        match self.arch {
            Arch::X86_64 => Ok("amd64"),
            Arch::Arm64 => Ok("arm64"),
            Arch::Other(ref name) => Err(PlatformError::UnsupportedArch(name.clone())),
        }
    }

    /// Architecture suffix used by goreleaser-style assets, e.g., lazygit.
    ///
    /// # Errors
    ///
    /// - Return [`PlatformError::UnsupportedArch`] if the architecture has no
    ///   published asset.
    pub fn release_arch(&self) -> Result<&'static str> {
        match self.arch {
            Arch::X86_64 => Ok("x86_64"),
            Arch::Arm64 => Ok("arm64"),
            Arch::Other(ref name) => Err(PlatformError::UnsupportedArch(name.clone())),
        }
    }
}

impl Display for Platform {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        write!(fmt, "{} ({})", self.os, self.arch)
    }
}

/// Platform detection error types.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum PlatformError {
    /// Operating system is not supported.
    #[error("unsupported operating system {0:?}, only Linux and macOS are supported")]
    UnsupportedOs(String),

    /// No release asset exists for architecture.
    #[error("unsupported architecture {0:?}")]
    UnsupportedArch(String),
}

/// Friendly result alias :3
pub type Result<T, E = PlatformError> = std::result::Result<T, E>;
