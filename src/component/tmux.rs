// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Terminal multiplexer with editor friendly settings.

use crate::{
    component::{InstallError, Installer, Result, Session, SkipGroup},
    package::PackageSpec,
    state::Component,
};

use std::{
    fs::{self, OpenOptions},
    io::{ErrorKind, Write},
    path::Path,
};
use tracing::{debug, info, instrument};

const BEGIN: &str = "# >>> nvstrap managed block >>>";
const END: &str = "# <<< nvstrap managed block <<<";

/// Settings `:checkhealth` asks for when running inside tmux.
const SETTINGS: &str = r#"set -g default-terminal "tmux-256color"
set -ag terminal-overrides ",xterm-256color:RGB"
set -sg escape-time 10
set -g focus-events on
set -g mouse on
"#;

/// Installer for tmux and its managed configuration block.
#[derive(Debug, Clone, Copy, Default)]
pub struct Tmux;

impl Tmux {
    /// Check if configuration file already carries the managed block.
    pub fn is_configured(conf: &Path) -> bool {
        fs::read_to_string(conf)
            .map(|content| content.contains(BEGIN))
            .unwrap_or(false)
    }

    /// Append managed block once.
    ///
    /// Returns whether the file was changed.
    ///
    /// # Errors
    ///
    /// - Return [`InstallError::Io`] if file cannot be read or written.
    pub fn append_block(conf: &Path) -> Result<bool> {
        let content = match fs::read_to_string(conf) {
            Ok(content) => content,
            Err(err) if err.kind() == ErrorKind::NotFound => String::new(),
            Err(err) => return Err(InstallError::io(conf)(err)),
        };

        if content.contains(BEGIN) {
            debug!("{} already has managed block", conf.display());
            return Ok(false);
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(conf)
            .map_err(InstallError::io(conf))?;
        let prefix = if content.is_empty() || content.ends_with('\n') { "" } else { "\n" };
        write!(file, "{prefix}{BEGIN}\n{SETTINGS}{END}\n").map_err(InstallError::io(conf))?;
        info!("added managed block to {}", conf.display());

        Ok(true)
    }
}

impl Installer for Tmux {
    fn component(&self) -> Component {
        Component::Tmux
    }

    fn skip_group(&self) -> Option<SkipGroup> {
        Some(SkipGroup::Tmux)
    }

    fn probe(&self, session: &Session) -> bool {
        session.has_binary("tmux") && Self::is_configured(&session.paths.tmux_conf)
    }

    #[instrument(skip_all, level = "debug")]
    fn install(&self, session: &mut Session) -> Result<()> {
        if !session.has_binary("tmux") {
            let runner = session.runner.clone();
            session
                .packages
                .install_package(runner.as_ref(), &PackageSpec::same("tmux"))?;
        }

        Self::append_block(&session.paths.tmux_conf)?;
        Ok(())
    }
}
