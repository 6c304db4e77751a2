// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Command-line interface.
//!
//! Parse operator flags and turn them into either a state command, which only
//! touches the state file, or a full provisioning run.

use crate::{
    command::SystemRunner,
    component::{Session, SkipGroup},
    config::{ConfigError, Settings},
    fetch::{FetchError, HttpFetcher},
    orchestrator::{next_steps, render_summary, Orchestrator},
    path::{default_settings_file, state_file, NoWayHome, Paths},
    platform::{Platform, PlatformError},
    state::{StateError, StateStore},
};

use clap::{
    error::{ContextKind, ContextValue, ErrorKind},
    Parser,
};
use std::{ffi::OsString, io::Write, path::PathBuf, sync::Arc};
use tracing::{info, instrument};

/// Idempotent, cross-platform Neovim environment provisioning.
#[derive(Debug, Clone, Default, Parser)]
#[command(name = "nvstrap", about, override_usage = "nvstrap [options]", version)]
pub struct Cli {
    /// Skip font installation, removing a partial font install.
    #[arg(long)]
    pub skip_fonts: bool,

    /// Skip search tools (ripgrep, fd, fzf, curl, unzip).
    #[arg(long)]
    pub skip_deps: bool,

    /// Skip Node.js toolchain.
    #[arg(long)]
    pub skip_node: bool,

    /// Skip Python toolchain.
    #[arg(long)]
    pub skip_python: bool,

    /// Skip backup of existing editor config. DELETES an unmanaged config!
    #[arg(long)]
    pub skip_backup: bool,

    /// Skip plugin manager bootstrap and plugin sync.
    #[arg(long)]
    pub skip_plugins: bool,

    /// Skip lazygit.
    #[arg(long)]
    pub skip_lazygit: bool,

    /// Skip tmux and its configuration.
    #[arg(long)]
    pub skip_tmux: bool,

    /// Print recorded installation state and exit.
    #[arg(long, conflicts_with = "reset_state")]
    pub show_state: bool,

    /// Mark every component as not checked yet and exit.
    #[arg(long)]
    pub reset_state: bool,

    /// Path to settings file.
    #[arg(long, value_name = "file")]
    pub config: Option<PathBuf>,

    /// Editor configuration directory to deploy.
    #[arg(long, value_name = "dir")]
    pub source: Option<PathBuf>,
}

impl Cli {
    /// Parse command-line arguments, first item being the program name.
    ///
    /// # Errors
    ///
    /// - Return [`CliError::UnknownOption`] for unrecognized flags.
    /// - Return [`CliError::Clap`] for everything else clap rejects,
    ///   including help and version requests.
    pub fn try_parse_args<I, T>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        Self::try_parse_from(args).map_err(|err| {
            if err.kind() != ErrorKind::UnknownArgument {
                return CliError::Clap(err);
            }

            match err.get(ContextKind::InvalidArg) {
                Some(ContextValue::String(flag)) => CliError::UnknownOption(flag.clone()),
                _ => CliError::UnknownOption(String::from("<unknown>")),
            }
        })
    }

    /// Skip groups requested through flags.
    pub fn skips(&self) -> Vec<SkipGroup> {
        [
            (self.skip_fonts, SkipGroup::Fonts),
            (self.skip_deps, SkipGroup::Deps),
            (self.skip_node, SkipGroup::Node),
            (self.skip_python, SkipGroup::Python),
            (self.skip_backup, SkipGroup::Backup),
            (self.skip_plugins, SkipGroup::Plugins),
            (self.skip_lazygit, SkipGroup::Lazygit),
            (self.skip_tmux, SkipGroup::Tmux),
        ]
        .into_iter()
        .filter_map(|(skip, group)| skip.then_some(group))
        .collect()
    }

    /// Load settings file, applying the source directory override.
    ///
    /// # Errors
    ///
    /// - Return [`CliError::Home`] if default settings path cannot be found.
    /// - Return [`CliError::Config`] if settings file is invalid.
    pub fn settings(&self) -> Result<Settings> {
        let path = match &self.config {
            Some(path) => path.clone(),
            None => default_settings_file()?,
        };
        let mut settings = Settings::load(path)?;
        if let Some(source) = &self.source {
            settings.paths.source = Some(source.clone());
        }

        Ok(settings)
    }

    /// Run nvstrap on the current host, returning the process exit code.
    ///
    /// # Errors
    ///
    /// - Return any error [`Cli::run_with`] can return.
    pub fn run(self, out: &mut impl Write) -> Result<i32> {
        self.run_with(out, Platform::detect)
    }

    /// Run nvstrap with a given platform detector.
    ///
    /// State commands short-circuit before the platform is detected, so they
    /// keep working on hosts nothing can be installed on.
    ///
    /// # Errors
    ///
    /// - Return [`CliError::Platform`] if platform is unsupported.
    /// - Return [`CliError::State`] if state file is unusable.
    /// - Return [`CliError::Fetch`] if HTTP client cannot be built.
    #[instrument(skip_all, level = "debug")]
    pub fn run_with(
        self,
        out: &mut impl Write,
        detect: impl FnOnce() -> Result<Platform, PlatformError>,
    ) -> Result<i32> {
        let settings = self.settings()?;
        let store = StateStore::new(state_file(&settings.paths)?);
        if let Some(code) = self.state_command(&store, out)? {
            return Ok(code);
        }

        let platform = detect()?;
        let paths = Paths::resolve(&settings.paths, platform.os)?;
        let fetcher = HttpFetcher::new(&settings.network)?;
        let session = Session::new(
            platform,
            paths,
            settings,
            Arc::new(SystemRunner::new()),
            Arc::new(fetcher),
        )
        .with_skips(self.skips());

        provision(&mut Orchestrator::new(session, store), out)
    }

    /// Handle `--show-state` and `--reset-state`.
    ///
    /// Returns the exit code if one of them was requested, or `None` if a
    /// provisioning run should follow.
    ///
    /// # Errors
    ///
    /// - Return [`CliError::State`] if state file is unusable.
    /// - Return [`CliError::Output`] if output cannot be written.
    pub fn state_command(&self, store: &StateStore, out: &mut impl Write) -> Result<Option<i32>> {
        if self.show_state {
            store.init()?;
            writeln!(out, "{}", store.path().display())?;
            write!(out, "{}", render_summary(&store.summary()?))?;
            return Ok(Some(0));
        }

        if self.reset_state {
            store.init()?;
            store.reset_all()?;
            info!("every component reset to notcheckedyet");
            return Ok(Some(0));
        }

        Ok(None)
    }
}

/// Drive a provisioning run, then print persisted state and next steps.
///
/// Returns non-zero exit code only if a critical component failed.
///
/// # Errors
///
/// - Return [`CliError::State`] if state file is unusable.
/// - Return [`CliError::Output`] if output cannot be written.
pub fn provision(orchestrator: &mut Orchestrator, out: &mut impl Write) -> Result<i32> {
    let report = orchestrator.run()?;

    writeln!(out, "\nInstallation state:")?;
    write!(out, "{}", render_summary(&orchestrator.store().summary()?))?;
    writeln!(out, "\nNext steps:")?;
    write!(out, "{}", next_steps(&report))?;

    Ok(report.exit_code())
}

/// Command-line error types.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Flag is not recognized.
    #[error("Unknown option: {0}\nRun 'nvstrap --help' for usage.")]
    UnknownOption(String),

    /// Clap rejected the arguments, or help was requested.
    #[error(transparent)]
    Clap(#[from] clap::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Home(#[from] NoWayHome),

    #[error(transparent)]
    Platform(#[from] PlatformError),

    #[error(transparent)]
    State(#[from] StateError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// Failed to write to output stream.
    #[error("failed to write output")]
    Output(#[from] std::io::Error),
}

impl CliError {
    /// Exit code to terminate with.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Clap(err) => err.exit_code(),
            _ => 1,
        }
    }
}

/// Friendly result alias :3
pub type Result<T, E = CliError> = std::result::Result<T, E>;
