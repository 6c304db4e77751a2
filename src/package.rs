// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Native package manager dispatch.
//!
//! Installers ask for packages by logical name through a [`PackageSpec`],
//! which maps that name onto the identifier each platform's package manager
//! knows it by. The [`PackageInstaller`] lives for one provisioning session
//! and makes sure the package index is refreshed at most once per session.

use crate::{
    command::{CommandError, CommandSpec, Output, Runner},
    platform::{OsFamily, Platform},
};

use std::{borrow::Cow, path::PathBuf, thread::sleep, time::Duration};
use tracing::{debug, info, instrument, warn};

/// Homebrew package kinds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrewPackage {
    Formula(Cow<'static, str>),
    Cask(Cow<'static, str>),
}

/// Logical package with per-platform identifiers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageSpec {
    pub logical: &'static str,
    pub apt: Option<&'static str>,
    pub brew: Option<BrewPackage>,
}

impl PackageSpec {
    /// Package known under the same name everywhere.
    pub const fn same(name: &'static str) -> Self {
        Self {
            logical: name,
            apt: Some(name),
            brew: Some(BrewPackage::Formula(Cow::Borrowed(name))),
        }
    }

    /// Package known under different names per platform.
    pub const fn mapped(logical: &'static str, apt: &'static str, brew: &'static str) -> Self {
        Self {
            logical,
            apt: Some(apt),
            brew: Some(BrewPackage::Formula(Cow::Borrowed(brew))),
        }
    }

    /// Package only available through Homebrew casks.
    pub fn cask(logical: &'static str, cask: impl Into<String>) -> Self {
        Self {
            logical,
            apt: None,
            brew: Some(BrewPackage::Cask(Cow::Owned(cask.into()))),
        }
    }
}

/// Supported native package managers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PackageManager {
    Apt,
    Homebrew { prefix: PathBuf },
}

impl PackageManager {
    /// Pick package manager for platform.
    pub fn for_platform(platform: &Platform) -> Self {
        match platform.os {
            OsFamily::Linux => Self::Apt,
            OsFamily::MacOs => Self::Homebrew {
                prefix: platform.brew_prefix(),
            },
        }
    }

    fn os(&self) -> OsFamily {
        match self {
            Self::Apt => OsFamily::Linux,
            Self::Homebrew { .. } => OsFamily::MacOs,
        }
    }

    fn brew(prefix: &std::path::Path) -> String {
        prefix.join("bin").join("brew").to_string_lossy().into_owned()
    }

    /// Command refreshing the package index.
    pub fn refresh_command(&self) -> CommandSpec {
        match self {
            Self::Apt => CommandSpec::new("apt-get").arg("update").with_sudo(),
            Self::Homebrew { prefix } => CommandSpec::new(Self::brew(prefix)).arg("update"),
        }
    }

    /// Command installing a package.
    ///
    /// # Errors
    ///
    /// - Return [`PackageError::NoMapping`] if package has no identifier for
    ///   this package manager.
    pub fn install_command(&self, spec: &PackageSpec) -> Result<CommandSpec> {
        let no_mapping = || PackageError::NoMapping {
            logical: spec.logical.to_string(),
            os: self.os(),
        };

        let cmd = match self {
            Self::Apt => CommandSpec::new("apt-get")
                .args(["install", "-y"])
                .arg(spec.apt.ok_or_else(no_mapping)?)
                .with_sudo(),
            Self::Homebrew { prefix } => match spec.brew.as_ref().ok_or_else(no_mapping)? {
                BrewPackage::Formula(name) => CommandSpec::new(Self::brew(prefix))
                    .arg("install")
                    .arg(name.as_ref()),
                BrewPackage::Cask(name) => CommandSpec::new(Self::brew(prefix))
                    .args(["install", "--cask"])
                    .arg(name.as_ref()),
            },
        };

        Ok(cmd)
    }
}

/// Session scoped package installer.
#[derive(Debug, Clone)]
pub struct PackageInstaller {
    manager: PackageManager,
    refreshed: bool,
    retries: u32,
    retry_delay: Duration,
}

impl PackageInstaller {
    /// Construct new package installer for platform.
    ///
    /// Retries twice with a three second delay by default.
    pub fn new(platform: &Platform) -> Self {
        Self {
            manager: PackageManager::for_platform(platform),
            refreshed: false,
            retries: 2,
            retry_delay: Duration::from_secs(3),
        }
    }

    /// Override retry bound and delay.
    pub fn with_retry(mut self, retries: u32, retry_delay: Duration) -> Self {
        self.retries = retries;
        self.retry_delay = retry_delay;
        self
    }

    pub fn manager(&self) -> &PackageManager {
        &self.manager
    }

    /// Whether the package index refresh was already attempted.
    pub fn is_refreshed(&self) -> bool {
        self.refreshed
    }

    /// Refresh package index once per session.
    ///
    /// Failure only degrades to a warning. Individual installs are still
    /// attempted afterwards.
    #[instrument(skip(self, runner), level = "debug")]
    pub fn refresh(&mut self, runner: &dyn Runner) {
        if self.refreshed {
            return;
        }

        // INVARIANT: Never attempt a second refresh, even after failure.
        self.refreshed = true;
        let cmd = self.manager.refresh_command();
        info!("refresh package index: {cmd}");

        match self.with_retries(runner, &cmd, "package index") {
            Ok(_) => debug!("package index refreshed"),
            Err(err) => warn!("package index refresh failed, continuing anyway: {err}"),
        }
    }

    /// Install package through native package manager.
    ///
    /// # Errors
    ///
    /// - Return [`PackageError::NoMapping`] if package has no identifier for
    ///   this platform.
    /// - Return [`PackageError::NotFound`] if package manager does not know
    ///   the package. Never retried.
    /// - Return [`PackageError::Failed`] if install still fails after all
    ///   retries.
    #[instrument(skip(self, runner, spec), fields(package = spec.logical), level = "debug")]
    pub fn install_package(&mut self, runner: &dyn Runner, spec: &PackageSpec) -> Result<()> {
        let cmd = self.manager.install_command(spec)?;
        self.refresh(runner);

        info!("install package {}: {cmd}", spec.logical);
        self.with_retries(runner, &cmd, spec.logical)?;

        Ok(())
    }

    fn with_retries(&self, runner: &dyn Runner, cmd: &CommandSpec, what: &str) -> Result<Output> {
        let mut last = Output::default();
        for attempt in 0..=self.retries {
            if attempt > 0 {
                warn!("retry {what} ({attempt}/{}) in {:?}", self.retries, self.retry_delay);
                sleep(self.retry_delay);
            }

            let output = runner.run(cmd)?;
            if output.success {
                return Ok(output);
            }

            if is_not_found(&output) {
                return Err(PackageError::NotFound {
                    package: what.to_string(),
                    message: output.message(),
                });
            }

            last = output;
        }

        Err(PackageError::Failed {
            package: what.to_string(),
            message: last.message(),
        })
    }
}

fn is_not_found(output: &Output) -> bool {
    const MARKERS: [&str; 4] = [
        "Unable to locate package",
        "has no installation candidate",
        "No available formula",
        "No formulae or casks found",
    ];

    MARKERS
        .iter()
        .any(|marker| output.stderr.contains(marker) || output.stdout.contains(marker))
}

/// Package installation error types.
#[derive(Debug, thiserror::Error)]
pub enum PackageError {
    /// No package identifier configured for platform.
    #[error("no package mapping for {logical:?} on {os}")]
    NoMapping { logical: String, os: OsFamily },

    /// Package manager does not know the package.
    #[error("package {package:?} not found:\n{message}")]
    NotFound { package: String, message: String },

    /// Package manager kept failing.
    #[error("failed to install {package:?}:\n{message}")]
    Failed { package: String, message: String },

    /// Package manager could not be run.
    #[error(transparent)]
    Command(#[from] CommandError),
}

/// Friendly result alias :3
pub type Result<T, E = PackageError> = std::result::Result<T, E>;
