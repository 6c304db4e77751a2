// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Components provided entirely by the native package manager.
//!
//! Each tool is a small table of requirements. A requirement names the
//! binaries that satisfy it, any one of which is enough, and the package that
//! provides them. Only requirements whose binaries are missing are installed.

use crate::{
    component::{InstallError, Installer, Result, Session, SkipGroup},
    package::PackageSpec,
    state::{Component, Status},
};

use std::{fs, path::PathBuf};
use tracing::{debug, info, warn};

/// One binary requirement and the package providing it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requirement {
    pub binaries: &'static [&'static str],
    pub package: PackageSpec,
}

impl Requirement {
    pub const fn new(binaries: &'static [&'static str], package: PackageSpec) -> Self {
        Self { binaries, package }
    }

    /// Check if any binary of requirement is reachable.
    pub fn is_met(&self, session: &Session) -> bool {
        self.binaries.iter().any(|name| session.has_binary(name))
    }
}

/// Component made up of package manager requirements.
#[derive(Debug, Clone)]
pub struct PackageTool {
    component: Component,
    group: Option<SkipGroup>,
    requirements: Vec<Requirement>,
}

impl PackageTool {
    pub fn new(
        component: Component,
        group: Option<SkipGroup>,
        requirements: impl IntoIterator<Item = Requirement>,
    ) -> Self {
        Self {
            component,
            group,
            requirements: requirements.into_iter().collect(),
        }
    }

    pub fn neovim() -> Self {
        Self::new(
            Component::Neovim,
            None,
            [Requirement::new(&["nvim"], PackageSpec::same("neovim"))],
        )
    }

    pub fn git() -> Self {
        Self::new(
            Component::Git,
            None,
            [Requirement::new(&["git"], PackageSpec::same("git"))],
        )
    }

    pub fn jq() -> Self {
        Self::new(
            Component::Jq,
            None,
            [Requirement::new(&["jq"], PackageSpec::same("jq"))],
        )
    }

    pub fn node() -> Self {
        Self::new(
            Component::Node,
            Some(SkipGroup::Node),
            [
                Requirement::new(&["node"], PackageSpec::mapped("node", "nodejs", "node")),
                // Homebrew ships npm as part of node.
                Requirement::new(&["npm"], PackageSpec::mapped("npm", "npm", "node")),
            ],
        )
    }

    pub fn python() -> Self {
        Self::new(
            Component::Python,
            Some(SkipGroup::Python),
            [
                Requirement::new(&["python3"], PackageSpec::mapped("python3", "python3", "python")),
                Requirement::new(&["pip3"], PackageSpec::mapped("pip", "python3-pip", "python")),
            ],
        )
    }

    pub fn deps() -> Self {
        Self::new(
            Component::Deps,
            Some(SkipGroup::Deps),
            [
                Requirement::new(&["rg"], PackageSpec::same("ripgrep")),
                Requirement::new(&["fd", "fdfind"], PackageSpec::mapped("fd", "fd-find", "fd")),
                Requirement::new(&["fzf"], PackageSpec::same("fzf")),
                Requirement::new(&["curl"], PackageSpec::same("curl")),
                Requirement::new(&["unzip"], PackageSpec::same("unzip")),
            ],
        )
    }

    pub fn requirements(&self) -> &[Requirement] {
        &self.requirements
    }

    /// Install every requirement that is not met yet.
    ///
    /// Keeps going after a failed package so one unavailable package does not
    /// block the rest. The first failure is reported.
    fn install_missing(&self, session: &mut Session) -> Result<()> {
        let mut first_error = None;
        for requirement in &self.requirements {
            if requirement.is_met(session) {
                debug!("{} already present", requirement.package.logical);
                continue;
            }

            let runner = session.runner.clone();
            if let Err(err) = session
                .packages
                .install_package(runner.as_ref(), &requirement.package)
            {
                warn!("{}: {err}", self.component);
                first_error.get_or_insert(InstallError::from(err));
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl Installer for PackageTool {
    fn component(&self) -> Component {
        self.component
    }

    fn skip_group(&self) -> Option<SkipGroup> {
        self.group
    }

    fn probe(&self, session: &Session) -> bool {
        self.requirements.iter().all(|req| req.is_met(session))
    }

    fn install(&self, session: &mut Session) -> Result<()> {
        self.install_missing(session)
    }
}

/// Command line search tools the editor configuration relies on.
///
/// Debian based systems ship `fd` as `fdfind`. A link named `fd` is placed in
/// the user binary directory so the editor finds it under its usual name. The
/// link is recorded next to the state file, so that only a link nvstrap made
/// is ever removed again.
#[derive(Debug, Clone)]
pub struct Deps {
    tool: PackageTool,
}

impl Deps {
    pub fn new() -> Self {
        Self {
            tool: PackageTool::deps(),
        }
    }

    /// File recording the `fd` link nvstrap created.
    pub fn link_record(session: &Session) -> PathBuf {
        session.paths.state_file.with_file_name("fd-link")
    }

    fn link_fd(&self, session: &Session) -> Result<()> {
        if session.runner.has_program("fd") {
            return Ok(());
        }

        let Some(fdfind) = session.runner.locate("fdfind") else {
            return Ok(());
        };

        let link = session.paths.user_bin.join("fd");
        if link.symlink_metadata().is_ok() {
            debug!("{} already exists", link.display());
            return Ok(());
        }

        let user_bin = &session.paths.user_bin;
        mkdirp::mkdirp(user_bin).map_err(InstallError::io(user_bin))?;
        symlink(&fdfind, &link).map_err(InstallError::io(&link))?;
        info!("linked {} -> {}", link.display(), fdfind.display());

        let record = Self::link_record(session);
        if let Some(parent) = record.parent() {
            mkdirp::mkdirp(parent).map_err(InstallError::io(parent))?;
        }
        fs::write(&record, link.to_string_lossy().as_bytes()).map_err(InstallError::io(&record))?;

        Ok(())
    }
}

impl Default for Deps {
    fn default() -> Self {
        Self::new()
    }
}

impl Installer for Deps {
    fn component(&self) -> Component {
        self.tool.component()
    }

    fn skip_group(&self) -> Option<SkipGroup> {
        self.tool.skip_group()
    }

    fn probe(&self, session: &Session) -> bool {
        self.tool.probe(session)
    }

    fn install(&self, session: &mut Session) -> Result<()> {
        let result = self.tool.install(session);
        if session.platform.os.has_user_bin_fallback() {
            self.link_fd(session)?;
        }
        result
    }

    fn on_skip(&self, session: &Session, _status: Status) -> Result<()> {
        let link = session.paths.user_bin.join("fd");
        let record = Self::link_record(session);
        let Ok(recorded) = fs::read_to_string(&record) else {
            debug!("{} was not created by nvstrap", link.display());
            return Ok(());
        };

        if PathBuf::from(recorded.trim()) != link {
            return Ok(());
        }

        if fs::read_link(&link).is_ok_and(|target| target.ends_with("fdfind")) {
            fs::remove_file(&link).map_err(InstallError::io(&link))?;
            info!("removed {} link to fdfind", link.display());
        }
        fs::remove_file(&record).map_err(InstallError::io(&record))?;

        Ok(())
    }
}

#[cfg(unix)]
fn symlink(original: &std::path::Path, link: &std::path::Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(original, link)
}

#[cfg(not(unix))]
fn symlink(original: &std::path::Path, link: &std::path::Path) -> std::io::Result<()> {
    fs::copy(original, link).map(|_| ())
}
