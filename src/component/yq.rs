// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! YAML processor.
//!
//! Distribution packages of yq are either missing or an unrelated python
//! wrapper, so on Linux the static release binary is downloaded instead.

use crate::{
    component::{Installer, Result, Session},
    fetch::{ArtifactKind, FetchRequest},
    package::PackageSpec,
    platform::OsFamily,
    state::Component,
};

use tracing::instrument;

const RELEASE_URL: &str = "https://github.com/mikefarah/yq/releases/latest/download";

/// Installer for yq.
#[derive(Debug, Clone, Copy, Default)]
pub struct Yq;

impl Yq {
    /// Release asset request for platform.
    pub fn request(session: &Session) -> Result<FetchRequest> {
        let asset = format!("yq_linux_{}", session.platform.go_arch()?);
        let request = FetchRequest::new(format!("{RELEASE_URL}/{asset}"))
            .kind(ArtifactKind::Elf)
            .checksum(session.settings.checksum_for(Component::Yq));

        Ok(request)
    }
}

impl Installer for Yq {
    fn component(&self) -> Component {
        Component::Yq
    }

    fn probe(&self, session: &Session) -> bool {
        session.has_binary("yq")
    }

    #[instrument(skip_all, level = "debug")]
    fn install(&self, session: &mut Session) -> Result<()> {
        if session.platform.os == OsFamily::MacOs {
            let runner = session.runner.clone();
            session
                .packages
                .install_package(runner.as_ref(), &PackageSpec::same("yq"))?;
            return Ok(());
        }

        let request = Self::request(session)?;
        let artifact = session.fetcher.fetch_and_verify(&request)?;
        session.install_binary(artifact.path(), "yq")?;

        Ok(())
    }
}
