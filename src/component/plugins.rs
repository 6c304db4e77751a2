// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Plugin manager bootstrap and first plugin sync.

use crate::{
    command::CommandSpec,
    component::{Installer, Result, Session, SkipGroup},
    state::Component,
};

use std::{collections::BTreeMap, fs, path::PathBuf};
use tracing::{debug, info, instrument};

const LAZY_REPO: &str = "https://github.com/folke/lazy.nvim.git";

/// Clones the plugin manager into the editor data directory.
#[derive(Debug, Clone, Copy, Default)]
pub struct LazyBootstrap;

impl LazyBootstrap {
    pub fn checkout(session: &Session) -> PathBuf {
        session.paths.nvim_data.join("lazy").join("lazy.nvim")
    }

    pub fn clone_command(session: &Session) -> CommandSpec {
        CommandSpec::new("git")
            .args(["clone", "--filter=blob:none", "--branch=stable", LAZY_REPO])
            .arg(Self::checkout(session).to_string_lossy())
    }
}

impl Installer for LazyBootstrap {
    fn component(&self) -> Component {
        Component::Lazy
    }

    fn skip_group(&self) -> Option<SkipGroup> {
        Some(SkipGroup::Plugins)
    }

    fn probe(&self, session: &Session) -> bool {
        Self::checkout(session).join("lua").is_dir()
    }

    #[instrument(skip_all, level = "debug")]
    fn install(&self, session: &mut Session) -> Result<()> {
        session.runner.run_checked(&Self::clone_command(session))?;
        Ok(())
    }
}

/// Runs a headless editor to install every configured plugin.
#[derive(Debug, Clone, Copy, Default)]
pub struct PluginSync;

impl PluginSync {
    pub fn lockfile(session: &Session) -> PathBuf {
        session.paths.target.join("lazy-lock.json")
    }

    /// Directory the plugin manager checks plugins out into.
    pub fn plugin_root(session: &Session) -> PathBuf {
        session.paths.nvim_data.join("lazy")
    }

    /// Plugins pinned by the lockfile that have no checkout yet.
    ///
    /// Returns `None` if the lockfile is missing or unreadable.
    pub fn missing_plugins(session: &Session) -> Option<Vec<String>> {
        let lockfile = Self::lockfile(session);
        let content = fs::read_to_string(&lockfile).ok()?;
        let pinned: BTreeMap<String, serde_json::Value> = match serde_json::from_str(&content) {
            Ok(pinned) => pinned,
            Err(err) => {
                debug!("cannot parse {}: {err}", lockfile.display());
                return None;
            }
        };

        let root = Self::plugin_root(session);
        Some(
            pinned
                .into_keys()
                .filter(|name| !root.join(name).is_dir())
                .collect(),
        )
    }

    pub fn sync_command() -> CommandSpec {
        CommandSpec::new("nvim").args(["--headless", "+Lazy! sync", "+qa"])
    }
}

impl Installer for PluginSync {
    fn component(&self) -> Component {
        Component::Plugins
    }

    fn skip_group(&self) -> Option<SkipGroup> {
        Some(SkipGroup::Plugins)
    }

    fn probe(&self, session: &Session) -> bool {
        match Self::missing_plugins(session) {
            Some(missing) if missing.is_empty() => true,
            Some(missing) => {
                debug!("plugins not checked out: {}", missing.join(", "));
                false
            }
            None => false,
        }
    }

    #[instrument(skip_all, level = "debug")]
    fn install(&self, session: &mut Session) -> Result<()> {
        info!("syncing plugins, this may take a while");
        session.runner.run_interactive(&Self::sync_command())?;
        Ok(())
    }
}
