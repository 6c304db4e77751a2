// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Patched developer font.
//!
//! macOS gets the Homebrew cask. Linux gets the release zip unpacked into a
//! per-family directory of the user font directory, followed by a font cache
//! rebuild.

use crate::{
    command::CommandSpec,
    component::{InstallError, Installer, Result, Session, SkipGroup},
    fetch::{ArtifactKind, FetchRequest},
    package::PackageSpec,
    platform::OsFamily,
    state::{Component, Status},
};

use std::{fs, path::PathBuf};
use tracing::{debug, info, instrument, warn};

const RELEASE_URL: &str = "https://github.com/ryanoasis/nerd-fonts/releases/download";

/// Present in the family directory while files are being copied into it.
pub const PARTIAL_MARKER: &str = ".nvstrap-partial";

/// Installer for the configured nerd font family.
#[derive(Debug, Clone, Copy, Default)]
pub struct Fonts;

impl Fonts {
    /// Directory holding the unpacked family on Linux.
    pub fn family_dir(session: &Session) -> PathBuf {
        session.paths.font_dir.join(&session.settings.font.family)
    }

    /// Release archive request.
    pub fn request(session: &Session) -> FetchRequest {
        let font = &session.settings.font;
        FetchRequest::new(format!("{RELEASE_URL}/{}/{}.zip", font.version, font.family))
            .kind(ArtifactKind::Zip)
            .checksum(session.settings.checksum_for(Component::Fonts))
    }

    fn font_files(session: &Session) -> Vec<PathBuf> {
        let family = &session.settings.font.family;
        let patterns = match session.platform.os {
            OsFamily::MacOs => vec![session.paths.font_dir.join(format!("*{family}*NerdFont*"))],
            OsFamily::Linux => vec![
                Self::family_dir(session).join("*.ttf"),
                Self::family_dir(session).join("*.otf"),
            ],
        };

        patterns
            .iter()
            .filter_map(|pattern| glob::glob(&pattern.to_string_lossy()).ok())
            .flat_map(|paths| paths.filter_map(|entry| entry.ok()))
            .collect()
    }

    fn listed_by_fontconfig(session: &Session) -> bool {
        let name = session.settings.font.display_name();
        let cmd = CommandSpec::new("fc-list").args([":", "family"]);
        match session.runner.run(&cmd) {
            Ok(output) if output.success => output.stdout.contains(&name),
            _ => false,
        }
    }

    fn install_linux(&self, session: &Session) -> Result<()> {
        let request = Self::request(session);
        let artifact = session.fetcher.fetch_and_verify(&request)?;
        let unpacked = artifact.unpack()?;

        let dest = Self::family_dir(session);
        mkdirp::mkdirp(&dest).map_err(InstallError::io(&dest))?;
        let marker = dest.join(PARTIAL_MARKER);
        fs::write(&marker, "").map_err(InstallError::io(&marker))?;

        let mut count = 0;
        for pattern in ["**/*.ttf", "**/*.otf"] {
            let pattern = unpacked.join(pattern);
            for entry in glob::glob(&pattern.to_string_lossy())? {
                let Ok(path) = entry else {
                    continue;
                };
                let Some(name) = path.file_name() else {
                    continue;
                };

                let target = dest.join(name);
                fs::copy(&path, &target).map_err(InstallError::io(&target))?;
                count += 1;
            }
        }
        fs::remove_file(&marker).map_err(InstallError::io(&marker))?;
        info!("installed {count} font files into {}", dest.display());

        let cache = CommandSpec::new("fc-cache").arg("-f");
        match session.runner.run(&cache) {
            Ok(output) if output.success => debug!("font cache rebuilt"),
            Ok(output) => warn!("font cache rebuild failed: {}", output.message()),
            Err(err) => warn!("font cache rebuild failed: {err}"),
        }

        Ok(())
    }
}

impl Installer for Fonts {
    fn component(&self) -> Component {
        Component::Fonts
    }

    fn skip_group(&self) -> Option<SkipGroup> {
        Some(SkipGroup::Fonts)
    }

    fn probe(&self, session: &Session) -> bool {
        match session.platform.os {
            OsFamily::MacOs => !Self::font_files(session).is_empty(),
            OsFamily::Linux => {
                Self::listed_by_fontconfig(session) || !Self::font_files(session).is_empty()
            }
        }
    }

    #[instrument(skip_all, level = "debug")]
    fn install(&self, session: &mut Session) -> Result<()> {
        match session.platform.os {
            OsFamily::MacOs => {
                let cask = PackageSpec::cask("font", session.settings.font.cask());
                let runner = session.runner.clone();
                session.packages.install_package(runner.as_ref(), &cask)?;
                Ok(())
            }
            OsFamily::Linux => self.install_linux(session),
        }
    }

    /// Remove a family directory left behind by an interrupted copy.
    ///
    /// Font files placed there by other means are never touched.
    fn on_skip(&self, session: &Session, status: Status) -> Result<()> {
        if session.platform.os != OsFamily::Linux || status == Status::Installed {
            return Ok(());
        }

        let dir = Self::family_dir(session);
        if !dir.join(PARTIAL_MARKER).is_file() {
            debug!("no partial font install at {}", dir.display());
            return Ok(());
        }

        fs::remove_dir_all(&dir).map_err(InstallError::io(&dir))?;
        info!("removed partial font install at {}", dir.display());

        Ok(())
    }
}
