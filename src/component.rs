// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Component installers.
//!
//! A __component__ is one named unit of provisioning work, e.g., the editor
//! itself, a language toolchain, a font family, or the deployed editor
//! configuration. Every component is driven through the same state machine:
//!
//! 1. If the component belongs to a skip group the operator disabled, it is
//!    __skipped by flag__. Its cleanup hook runs, the store is left alone.
//! 2. Otherwise its presence probe runs. A passing probe means the component
//!    is __already satisfied__, and the store is brought in line.
//! 3. Otherwise the component is __installed__. The store records
//!    `installed` only if the install step succeeded _and_ the probe passes
//!    afterwards, else `notinstalled`.
//!
//! The deployed configuration is the single exception to step 2. It is copied
//! on every run, so edits to the source tree always propagate.
//!
//! # See Also
//!
//! 1. [`Installer`]
//! 2. [`drive`]

pub mod deploy;
pub mod fonts;
pub mod lazygit;
pub mod plugins;
pub mod tmux;
pub mod tools;
pub mod yq;

use crate::{
    command::{CommandError, Runner},
    config::Settings,
    fetch::{ensure_on_path, install_binary, Fetch, FetchError},
    package::{PackageError, PackageInstaller},
    path::Paths,
    platform::{Platform, PlatformError},
    state::{Component, StateError, StateStore, Status},
};

use std::{
    collections::BTreeSet,
    fmt::{Display, Formatter, Result as FmtResult},
    path::{Path, PathBuf},
    sync::Arc,
};
use tracing::{error, info, instrument, warn};

/// Operator selectable groups of components that can be skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SkipGroup {
    Fonts,
    Deps,
    Node,
    Python,
    Backup,
    Plugins,
    Lazygit,
    Tmux,
}

impl SkipGroup {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fonts => "fonts",
            Self::Deps => "deps",
            Self::Node => "node",
            Self::Python => "python",
            Self::Backup => "backup",
            Self::Plugins => "plugins",
            Self::Lazygit => "lazygit",
            Self::Tmux => "tmux",
        }
    }
}

impl Display for SkipGroup {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(self.as_str())
    }
}

/// Everything an installer may touch during one provisioning run.
///
/// Platform and paths are computed once up front and never change while the
/// run is in progress. The package installer carries the once-per-session
/// index refresh flag.
pub struct Session {
    pub platform: Platform,
    pub paths: Paths,
    pub settings: Settings,
    pub runner: Arc<dyn Runner>,
    pub fetcher: Arc<dyn Fetch>,
    pub packages: PackageInstaller,
    pub skips: BTreeSet<SkipGroup>,
}

impl Session {
    /// Construct new session context.
    pub fn new(
        platform: Platform,
        paths: Paths,
        settings: Settings,
        runner: Arc<dyn Runner>,
        fetcher: Arc<dyn Fetch>,
    ) -> Self {
        let packages = PackageInstaller::new(&platform);
        Self {
            platform,
            paths,
            settings,
            runner,
            fetcher,
            packages,
            skips: BTreeSet::new(),
        }
    }

    /// Set skip groups for this run.
    pub fn with_skips(mut self, skips: impl IntoIterator<Item = SkipGroup>) -> Self {
        self.skips = skips.into_iter().collect();
        self
    }

    /// Replace package installer, e.g., to tune retries.
    pub fn with_packages(mut self, packages: PackageInstaller) -> Self {
        self.packages = packages;
        self
    }

    pub fn is_skipped(&self, group: SkipGroup) -> bool {
        self.skips.contains(&group)
    }

    /// Check if binary is reachable.
    ///
    /// Besides the search path, the system and user binary directories are
    /// consulted directly, because a binary installed there during this run
    /// may not be on the search path of the current process yet.
    pub fn has_binary(&self, name: &str) -> bool {
        self.runner.has_program(name)
            || self.paths.system_bin.join(name).is_file()
            || self.paths.user_bin.join(name).is_file()
    }

    /// Install downloaded binary, falling back to user binary directory.
    ///
    /// When the fallback is taken the shell profile is extended so the
    /// binary is on the search path of future shells.
    ///
    /// # Errors
    ///
    /// - Return [`FetchError::Install`] if no directory accepts the binary.
    /// - Return [`FetchError::Io`] if shell profile cannot be updated.
    pub fn install_binary(&self, src: &Path, name: &str) -> Result<PathBuf, FetchError> {
        let user_bin = self
            .platform
            .os
            .has_user_bin_fallback()
            .then_some(self.paths.user_bin.as_path());
        let dest = install_binary(src, name, &self.paths.system_bin, user_bin)?;
        if dest.starts_with(&self.paths.user_bin) {
            ensure_on_path(&self.paths.shell_profile, &self.paths.user_bin)?;
        }

        Ok(dest)
    }
}

/// Provisioning logic of one component.
pub trait Installer {
    /// Component this installer provisions.
    fn component(&self) -> Component;

    /// Skip group the component belongs to, if any.
    fn skip_group(&self) -> Option<SkipGroup> {
        None
    }

    /// Install step runs on every run, even when the probe passes.
    fn always_run(&self) -> bool {
        false
    }

    /// Side-effect free check whether component is present.
    fn probe(&self, session: &Session) -> bool;

    /// Perform the install work.
    fn install(&self, session: &mut Session) -> Result<()>;

    /// Cleanup performed when component is skipped by flag.
    fn on_skip(&self, _session: &Session, _status: Status) -> Result<()> {
        Ok(())
    }
}

/// Result of driving one component.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    AlreadySatisfied,
    Skipped,
    Succeeded,
    Failed,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AlreadySatisfied => "already satisfied",
            Self::Skipped => "skipped by flag",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        }
    }
}

impl Display for Outcome {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(self.as_str())
    }
}

/// Drive one component through its state machine.
///
/// # Errors
///
/// - Return [`StateError`] if the state store cannot be read or written.
///   Install failures are not errors, they turn into [`Outcome::Failed`].
#[instrument(skip_all, fields(component = %installer.component()), level = "debug")]
pub fn drive(
    installer: &dyn Installer,
    session: &mut Session,
    store: &StateStore,
) -> Result<Outcome, StateError> {
    let component = installer.component();

    if let Some(group) = installer.skip_group() {
        if session.is_skipped(group) {
            info!("{component}: skipped by flag --skip-{group}");
            let status = store.get(component)?;
            if let Err(err) = installer.on_skip(session, status) {
                warn!("{component}: cleanup after skip failed: {err}");
            }

            return Ok(Outcome::Skipped);
        }
    }

    let status = store.get(component)?;
    if installer.always_run() {
        return sync(installer, session, store, status);
    }

    if installer.probe(session) {
        if status != Status::Installed {
            store.set(component, Status::Installed)?;
        }
        info!("{component}: already satisfied");
        return Ok(Outcome::AlreadySatisfied);
    }

    if status == Status::Installed {
        warn!("{component}: recorded as installed but no longer present, reinstalling");
    }

    info!("{component}: installing");
    let result = installer.install(session);
    commit(installer, session, store, result)
}

// INVARIANT: Always-run installers report already satisfied when they were
// installed before and the fresh copy still verifies.
fn sync(
    installer: &dyn Installer,
    session: &mut Session,
    store: &StateStore,
    status: Status,
) -> Result<Outcome, StateError> {
    let component = installer.component();
    info!("{component}: installing (runs every time)");
    let result = installer.install(session);
    match commit(installer, session, store, result)? {
        Outcome::Succeeded if status == Status::Installed => {
            info!("{component}: already satisfied, files refreshed");
            Ok(Outcome::AlreadySatisfied)
        }
        outcome => Ok(outcome),
    }
}

fn commit(
    installer: &dyn Installer,
    session: &Session,
    store: &StateStore,
    result: Result<()>,
) -> Result<Outcome, StateError> {
    let component = installer.component();
    if let Err(err) = result {
        error!("{component}: failed: {err}");
        store.set(component, Status::NotInstalled)?;
        return Ok(Outcome::Failed);
    }

    if !installer.probe(session) {
        error!("{component}: failed: install finished but component still not present");
        store.set(component, Status::NotInstalled)?;
        return Ok(Outcome::Failed);
    }

    store.set(component, Status::Installed)?;
    info!("{component}: succeeded");
    Ok(Outcome::Succeeded)
}

/// Full installer lineup in run order.
pub fn default_installers() -> Vec<Box<dyn Installer>> {
    vec![
        Box::new(tools::PackageTool::neovim()),
        Box::new(tools::PackageTool::git()),
        Box::new(yq::Yq),
        Box::new(tools::PackageTool::jq()),
        Box::new(tools::Deps::new()),
        Box::new(tools::PackageTool::node()),
        Box::new(tools::PackageTool::python()),
        Box::new(fonts::Fonts),
        Box::new(deploy::Backup),
        Box::new(deploy::ConfigFiles),
        Box::new(plugins::LazyBootstrap),
        Box::new(plugins::PluginSync),
        Box::new(lazygit::Lazygit),
        Box::new(tmux::Tmux),
    ]
}

/// Component installer error types.
#[derive(Debug, thiserror::Error)]
pub enum InstallError {
    #[error(transparent)]
    Package(#[from] PackageError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Command(#[from] CommandError),

    #[error(transparent)]
    Platform(#[from] PlatformError),

    /// Filesystem operation failed.
    #[error("failed to access {path:?}")]
    Io {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Source tree walk failed.
    #[error(transparent)]
    Walk(#[from] ignore::Error),

    #[error(transparent)]
    Pattern(#[from] glob::PatternError),

    /// Configuration source directory does not exist.
    #[error("configuration source {0:?} does not exist")]
    MissingSource(PathBuf),

    /// Every fallback strategy was tried and failed.
    #[error("all install strategies for {component} failed: {}", .attempts.join("; "))]
    Exhausted {
        component: Component,
        attempts: Vec<String>,
    },
}

impl InstallError {
    /// Wrap I/O error with path it happened on.
    pub fn io(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| Self::Io { source, path }
    }
}

/// Friendly result alias :3
pub type Result<T, E = InstallError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        command::{CommandSpec, Output},
        fetch::{Artifact, FetchRequest},
        platform::{Arch, OsFamily},
    };

    use pretty_assertions::assert_eq;
    use std::sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Mutex,
    };

    struct NoRunner;

    impl Runner for NoRunner {
        fn run(&self, cmd: &CommandSpec) -> crate::command::Result<Output> {
            Ok(Output::failed(format!("unexpected {cmd}")))
        }

        fn run_interactive(&self, _cmd: &CommandSpec) -> crate::command::Result<()> {
            Ok(())
        }

        fn locate(&self, _name: &str) -> Option<PathBuf> {
            None
        }
    }

    struct NoFetch;

    impl Fetch for NoFetch {
        fn fetch_and_verify(&self, request: &FetchRequest) -> crate::fetch::Result<Artifact> {
            Err(FetchError::Status {
                url: request.url.clone(),
                status: 404,
            })
        }

        fn fetch_text(&self, url: &str) -> crate::fetch::Result<String> {
            Err(FetchError::Status {
                url: url.into(),
                status: 404,
            })
        }
    }

    struct Probe {
        component: Component,
        group: Option<SkipGroup>,
        always: bool,
        present: AtomicBool,
        install_ok: bool,
        installs: AtomicUsize,
        skips: Mutex<Vec<Status>>,
    }

    impl Probe {
        fn new(component: Component, present: bool, install_ok: bool) -> Self {
            Self {
                component,
                group: None,
                always: false,
                present: AtomicBool::new(present),
                install_ok,
                installs: AtomicUsize::new(0),
                skips: Mutex::new(Vec::new()),
            }
        }
    }

    impl Installer for Probe {
        fn component(&self) -> Component {
            self.component
        }

        fn skip_group(&self) -> Option<SkipGroup> {
            self.group
        }

        fn always_run(&self) -> bool {
            self.always
        }

        fn probe(&self, _session: &Session) -> bool {
            self.present.load(Ordering::SeqCst)
        }

        fn install(&self, _session: &mut Session) -> Result<()> {
            self.installs.fetch_add(1, Ordering::SeqCst);
            if self.install_ok {
                self.present.store(true, Ordering::SeqCst);
                Ok(())
            } else {
                Err(InstallError::MissingSource(PathBuf::from("/nowhere")))
            }
        }

        fn on_skip(&self, _session: &Session, status: Status) -> Result<()> {
            self.skips.lock().unwrap().push(status);
            Ok(())
        }
    }

    fn fixture() -> anyhow::Result<(tempfile::TempDir, Session, StateStore)> {
        let home = tempfile::tempdir()?;
        let platform = Platform::new(OsFamily::Linux, Arch::X86_64);
        let paths = Paths::with_home(home.path(), home.path().join("src"), OsFamily::Linux);
        let store = StateStore::new(&paths.state_file);
        store.init()?;
        let session = Session::new(
            platform,
            paths,
            Settings::default(),
            Arc::new(NoRunner),
            Arc::new(NoFetch),
        );
        Ok((home, session, store))
    }

    #[test]
    fn present_component_is_already_satisfied() -> anyhow::Result<()> {
        let (_home, mut session, store) = fixture()?;
        let probe = Probe::new(Component::Git, true, true);

        let outcome = drive(&probe, &mut session, &store)?;
        assert_eq!(outcome, Outcome::AlreadySatisfied);
        assert_eq!(probe.installs.load(Ordering::SeqCst), 0);
        assert_eq!(store.get(Component::Git)?, Status::Installed);

        Ok(())
    }

    #[test]
    fn missing_component_is_installed_and_committed() -> anyhow::Result<()> {
        let (_home, mut session, store) = fixture()?;
        let probe = Probe::new(Component::Jq, false, true);

        let outcome = drive(&probe, &mut session, &store)?;
        assert_eq!(outcome, Outcome::Succeeded);
        assert_eq!(probe.installs.load(Ordering::SeqCst), 1);
        assert_eq!(store.get(Component::Jq)?, Status::Installed);

        Ok(())
    }

    #[test]
    fn failed_install_records_not_installed() -> anyhow::Result<()> {
        let (_home, mut session, store) = fixture()?;
        let probe = Probe::new(Component::Node, false, false);

        let outcome = drive(&probe, &mut session, &store)?;
        assert_eq!(outcome, Outcome::Failed);
        assert_eq!(store.get(Component::Node)?, Status::NotInstalled);

        Ok(())
    }

    #[test]
    fn install_without_passing_probe_is_failure() -> anyhow::Result<()> {
        struct Liar;

        impl Installer for Liar {
            fn component(&self) -> Component {
                Component::Python
            }

            fn probe(&self, _session: &Session) -> bool {
                false
            }

            fn install(&self, _session: &mut Session) -> Result<()> {
                Ok(())
            }
        }

        let (_home, mut session, store) = fixture()?;
        let outcome = drive(&Liar, &mut session, &store)?;
        assert_eq!(outcome, Outcome::Failed);
        assert_eq!(store.get(Component::Python)?, Status::NotInstalled);

        Ok(())
    }

    #[test]
    fn skipped_component_runs_cleanup_and_keeps_state() -> anyhow::Result<()> {
        let (_home, session, store) = fixture()?;
        let mut session = session.with_skips([SkipGroup::Fonts]);
        let mut probe = Probe::new(Component::Fonts, false, true);
        probe.group = Some(SkipGroup::Fonts);
        store.set(Component::Fonts, Status::NotInstalled)?;

        let outcome = drive(&probe, &mut session, &store)?;
        assert_eq!(outcome, Outcome::Skipped);
        assert_eq!(probe.installs.load(Ordering::SeqCst), 0);
        assert_eq!(*probe.skips.lock().unwrap(), vec![Status::NotInstalled]);
        assert_eq!(store.get(Component::Fonts)?, Status::NotInstalled);

        Ok(())
    }

    #[test]
    fn drifted_component_is_reinstalled() -> anyhow::Result<()> {
        let (_home, mut session, store) = fixture()?;
        store.set(Component::Tmux, Status::Installed)?;
        let probe = Probe::new(Component::Tmux, false, true);

        let outcome = drive(&probe, &mut session, &store)?;
        assert_eq!(outcome, Outcome::Succeeded);
        assert_eq!(probe.installs.load(Ordering::SeqCst), 1);

        Ok(())
    }

    #[test]
    fn always_run_component_reinstalls_every_time() -> anyhow::Result<()> {
        let (_home, mut session, store) = fixture()?;
        let mut probe = Probe::new(Component::Config, true, true);
        probe.always = true;

        assert_eq!(drive(&probe, &mut session, &store)?, Outcome::Succeeded);
        assert_eq!(drive(&probe, &mut session, &store)?, Outcome::AlreadySatisfied);
        assert_eq!(probe.installs.load(Ordering::SeqCst), 2);

        Ok(())
    }
}
