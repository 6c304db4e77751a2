// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Path resolution utilities.
//!
//! Determine relevent path information for external files that need to be
//! interacted with, or managed in some way. Every path the installers touch is
//! resolved once at startup into [`Paths`], and then handed to each installer
//! through the session. Nothing else should be reading `$HOME` ad hoc.

use crate::{config::PathSettings, platform::OsFamily};

use std::{
    env,
    path::{Path, PathBuf},
};

/// Determine absolute path to user's home directory.
///
/// Does not check if the path returned actually exists.
///
/// # Errors
///
/// - Return [`NoWayHome`] if home directory path cannot be determined.
pub fn home_dir() -> Result<PathBuf> {
    dirs::home_dir().ok_or(NoWayHome)
}

/// Determine default absolute path to nvstrap's own configuration directory.
///
/// Uses `$XDG_CONFIG_HOME/nvstrap`, falling back to `~/.config/nvstrap` even
/// on macOS. Neovim itself reads `~/.config` on every platform, so we follow
/// suit rather than using `~/Library/Application Support`.
///
/// # Errors
///
/// - Return [`NoWayHome`] if home directory path cannot be determined.
pub fn default_config_dir() -> Result<PathBuf> {
    Ok(xdg_config_home(&home_dir()?).join("nvstrap"))
}

/// Determine default absolute path to the settings file.
///
/// # Errors
///
/// - Return [`NoWayHome`] if home directory path cannot be determined.
pub fn default_settings_file() -> Result<PathBuf> {
    Ok(default_config_dir()?.join("config.toml"))
}

/// Determine absolute path to the state file.
///
/// Needs nothing but the home directory, so state commands work before the
/// platform is known.
///
/// # Errors
///
/// - Return [`NoWayHome`] if home directory path cannot be determined.
pub fn state_file(settings: &PathSettings) -> Result<PathBuf> {
    match &settings.state_file {
        Some(path) => Ok(path.clone()),
        None => Ok(default_config_dir()?.join("state.yaml")),
    }
}

fn xdg_config_home(home: &Path) -> PathBuf {
    env::var_os("XDG_CONFIG_HOME")
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| home.join(".config"))
}

fn xdg_data_home(home: &Path) -> PathBuf {
    env::var_os("XDG_DATA_HOME")
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| home.join(".local").join("share"))
}

fn default_shell_profile(home: &Path) -> PathBuf {
    let shell = env::var("SHELL").unwrap_or_default();
    if shell.ends_with("zsh") {
        home.join(".zshrc")
    } else {
        home.join(".bashrc")
    }
}

/// Every filesystem location the provisioning run touches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paths {
    /// User's home directory.
    pub home: PathBuf,

    /// Persisted installation state.
    pub state_file: PathBuf,

    /// Source-of-truth editor configuration to deploy.
    pub source: PathBuf,

    /// Deployed editor configuration directory.
    pub target: PathBuf,

    /// Editor data directory, where the plugin manager lives.
    pub nvim_data: PathBuf,

    /// Per-user font directory.
    pub font_dir: PathBuf,

    /// Unprivileged binary directory.
    pub user_bin: PathBuf,

    /// Privileged, system-wide binary directory.
    pub system_bin: PathBuf,

    /// Shell profile that receives PATH exports.
    pub shell_profile: PathBuf,

    /// Terminal multiplexer configuration file.
    pub tmux_conf: PathBuf,
}

impl Paths {
    /// Resolve every path from the environment, then apply overrides.
    ///
    /// # Errors
    ///
    /// - Return [`NoWayHome`] if home directory path cannot be determined.
    pub fn resolve(settings: &PathSettings, os: OsFamily) -> Result<Self> {
        let home = home_dir()?;
        let source = env::current_dir()
            .map(|cwd| cwd.join("nvim"))
            .unwrap_or_else(|_| PathBuf::from("nvim"));

        let config_home = xdg_config_home(&home);
        let data_home = xdg_data_home(&home);
        let mut paths = Self::with_home(&home, source, os);
        paths.state_file = config_home.join("nvstrap").join("state.yaml");
        paths.target = config_home.join("nvim");
        paths.nvim_data = data_home.join("nvim");
        if os == OsFamily::Linux {
            paths.font_dir = data_home.join("fonts");
        }
        paths.shell_profile = default_shell_profile(&home);
        paths.apply(settings);

        Ok(paths)
    }

    /// Lay out default paths underneath a given home directory.
    ///
    /// Does not consult any environment variable, which makes it the
    /// constructor of choice for sandboxed runs.
    pub fn with_home(home: impl AsRef<Path>, source: impl Into<PathBuf>, os: OsFamily) -> Self {
        let home = home.as_ref();
        let font_dir = match os {
            OsFamily::MacOs => home.join("Library").join("Fonts"),
            OsFamily::Linux => home.join(".local").join("share").join("fonts"),
        };

        Self {
            home: home.to_path_buf(),
            state_file: home.join(".config").join("nvstrap").join("state.yaml"),
            source: source.into(),
            target: home.join(".config").join("nvim"),
            nvim_data: home.join(".local").join("share").join("nvim"),
            font_dir,
            user_bin: home.join(".local").join("bin"),
            system_bin: PathBuf::from("/usr/local/bin"),
            shell_profile: home.join(".bashrc"),
            tmux_conf: home.join(".tmux.conf"),
        }
    }

    /// Override resolved paths with user supplied settings.
    pub fn apply(&mut self, settings: &PathSettings) {
        let overrides = [
            (&mut self.source, &settings.source),
            (&mut self.target, &settings.target),
            (&mut self.state_file, &settings.state_file),
            (&mut self.user_bin, &settings.user_bin),
            (&mut self.system_bin, &settings.system_bin),
            (&mut self.shell_profile, &settings.shell_profile),
        ];

        for (slot, value) in overrides {
            if let Some(value) = value {
                *slot = value.clone();
            }
        }
    }
}

/// No way to determine user's home directory.
///
/// # See Also
///
/// - [`dirs::home_dir`](https://docs.rs/dirs/latest/dirs/fn.home_dir.html)
#[derive(Clone, Debug, thiserror::Error)]
#[error("cannot determine absolute path to user's home directory")]
pub struct NoWayHome;

/// Friendly result alias :3
pub type Result<T, E = NoWayHome> = std::result::Result<T, E>;
