// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Terminal git interface.
//!
//! Lazygit is not packaged everywhere, so installation falls through three
//! strategies in order:
//!
//! 1. Native package manager.
//! 2. Latest release tarball, verified against the published checksums.
//! 3. On Linux, the release binary goes into the user binary directory when
//!    the system directory is not writable.

use crate::{
    component::{InstallError, Installer, Result, Session, SkipGroup},
    fetch::{checksum_from_listing, latest_release_tag, ArtifactKind, FetchRequest},
    package::PackageSpec,
    state::Component,
};

use tracing::{debug, info, instrument, warn};

const REPO: &str = "jesseduffield/lazygit";

/// Installer for lazygit.
#[derive(Debug, Clone, Copy, Default)]
pub struct Lazygit;

impl Lazygit {
    /// Release asset name for version tag on platform.
    pub fn asset_name(session: &Session, tag: &str) -> Result<String> {
        let version = tag.trim_start_matches('v');
        let os = session.platform.os.kernel_name();
        let arch = session.platform.release_arch()?;

        Ok(format!("lazygit_{version}_{os}_{arch}.tar.gz"))
    }

    fn from_package(&self, session: &mut Session) -> Result<()> {
        let runner = session.runner.clone();
        session
            .packages
            .install_package(runner.as_ref(), &PackageSpec::same("lazygit"))?;
        Ok(())
    }

    fn from_release(&self, session: &Session) -> Result<()> {
        let fetcher = session.fetcher.as_ref();
        let tag = latest_release_tag(fetcher, REPO)?;
        let asset = Self::asset_name(session, &tag)?;
        let base = format!("https://github.com/{REPO}/releases/download/{tag}");

        // INVARIANT: Checksum from settings wins over published listing.
        let checksum = match session.settings.checksum_for(Component::Lazygit) {
            Some(checksum) => Some(checksum.to_string()),
            None => match fetcher.fetch_text(&format!("{base}/checksums.txt")) {
                Ok(listing) => checksum_from_listing(&listing, &asset),
                Err(err) => {
                    warn!("cannot fetch lazygit checksums, falling back to type check: {err}");
                    None
                }
            },
        };
        debug!("lazygit {tag} checksum: {checksum:?}");

        let request = FetchRequest::new(format!("{base}/{asset}"))
            .kind(ArtifactKind::Gzip)
            .checksum(checksum);
        let artifact = fetcher.fetch_and_verify(&request)?;
        let unpacked = artifact.unpack()?;
        let dest = session.install_binary(&unpacked.join("lazygit"), "lazygit")?;
        info!("installed lazygit {tag} to {}", dest.display());

        Ok(())
    }
}

impl Installer for Lazygit {
    fn component(&self) -> Component {
        Component::Lazygit
    }

    fn skip_group(&self) -> Option<SkipGroup> {
        Some(SkipGroup::Lazygit)
    }

    fn probe(&self, session: &Session) -> bool {
        session.has_binary("lazygit")
    }

    #[instrument(skip_all, level = "debug")]
    fn install(&self, session: &mut Session) -> Result<()> {
        let mut attempts = Vec::new();

        match self.from_package(session) {
            Ok(()) if self.probe(session) => return Ok(()),
            Ok(()) => attempts.push("package manager: installed but binary not found".into()),
            Err(err) => attempts.push(format!("package manager: {err}")),
        }
        warn!("lazygit not available from package manager, trying release download");

        match self.from_release(session) {
            Ok(()) => Ok(()),
            Err(err) => {
                attempts.push(format!("release download: {err}"));
                Err(InstallError::Exhausted {
                    component: Component::Lazygit,
                    attempts,
                })
            }
        }
    }
}
