// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Editor configuration deployment.
//!
//! The source configuration tree is copied into the editor's configuration
//! directory, and a marker file is dropped next to it. The marker tells later
//! runs that the directory is managed by nvstrap, which in turn decides
//! whether a pre-existing directory must be backed up first.

use crate::{
    component::{InstallError, Installer, Result, Session, SkipGroup},
    state::{Component, Status},
};

use ignore::WalkBuilder;
use std::{
    fs,
    path::{Path, PathBuf},
};
use tracing::{debug, info, instrument, warn};

/// Name of the file marking a deployed configuration directory.
pub const MARKER: &str = ".nvstrap";

/// Check if directory was deployed by nvstrap.
pub fn is_managed(dir: &Path) -> bool {
    dir.join(MARKER).is_file()
}

/// Moves a foreign configuration directory out of the way.
#[derive(Debug, Clone, Copy, Default)]
pub struct Backup;

impl Backup {
    /// Pick a fresh backup location for target directory.
    pub fn backup_path(target: &Path) -> PathBuf {
        let stamp = chrono::Local::now().format("%Y%m%d-%H%M%S");
        let base = format!("{}.backup.{stamp}", target.display());
        let mut candidate = PathBuf::from(&base);
        let mut counter = 1;
        while candidate.symlink_metadata().is_ok() {
            candidate = PathBuf::from(format!("{base}.{counter}"));
            counter += 1;
        }

        candidate
    }
}

impl Installer for Backup {
    fn component(&self) -> Component {
        Component::Backup
    }

    fn skip_group(&self) -> Option<SkipGroup> {
        Some(SkipGroup::Backup)
    }

    fn probe(&self, session: &Session) -> bool {
        let target = &session.paths.target;
        target.symlink_metadata().is_err() || is_managed(target)
    }

    #[instrument(skip_all, level = "debug")]
    fn install(&self, session: &mut Session) -> Result<()> {
        let target = &session.paths.target;
        let backup = Self::backup_path(target);
        fs::rename(target, &backup).map_err(InstallError::io(target))?;
        info!("backed up {} to {}", target.display(), backup.display());

        Ok(())
    }

    // INVARIANT: Only unmanaged directories are ever deleted.
    fn on_skip(&self, session: &Session, _status: Status) -> Result<()> {
        let target = &session.paths.target;
        let Ok(meta) = target.symlink_metadata() else {
            return Ok(());
        };

        if is_managed(target) {
            return Ok(());
        }

        warn!(
            "backup disabled, deleting existing configuration at {}",
            target.display()
        );
        if meta.is_dir() {
            fs::remove_dir_all(target).map_err(InstallError::io(target))?;
        } else {
            fs::remove_file(target).map_err(InstallError::io(target))?;
        }

        Ok(())
    }
}

/// Copies the source configuration tree into place.
///
/// Runs on every invocation so changes to the source always reach the
/// deployed copy.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConfigFiles;

impl ConfigFiles {
    /// Copy every file of source tree into target, returning file count.
    ///
    /// Version control metadata is never copied. Ignore files are not
    /// honored, so locally ignored files in the source are deployed too.
    ///
    /// # Errors
    ///
    /// - Return [`InstallError::MissingSource`] if source is not a directory.
    /// - Return [`InstallError::Walk`] if source tree cannot be walked.
    /// - Return [`InstallError::Io`] if any file cannot be copied.
    pub fn copy_tree(source: &Path, target: &Path) -> Result<usize> {
        if !source.is_dir() {
            return Err(InstallError::MissingSource(source.to_path_buf()));
        }

        let walker = WalkBuilder::new(source)
            .standard_filters(false)
            .filter_entry(|entry| entry.file_name() != ".git")
            .build();

        let mut count = 0;
        for entry in walker {
            let entry = entry?;
            if !entry.file_type().is_some_and(|kind| kind.is_file()) {
                continue;
            }

            let Ok(relative) = entry.path().strip_prefix(source) else {
                continue;
            };

            let dest = target.join(relative);
            if let Some(parent) = dest.parent() {
                mkdirp::mkdirp(parent).map_err(InstallError::io(parent))?;
            }
            fs::copy(entry.path(), &dest).map_err(InstallError::io(&dest))?;
            debug!("copied {}", relative.display());
            count += 1;
        }

        Ok(count)
    }
}

impl Installer for ConfigFiles {
    fn component(&self) -> Component {
        Component::Config
    }

    fn always_run(&self) -> bool {
        true
    }

    fn probe(&self, session: &Session) -> bool {
        is_managed(&session.paths.target)
    }

    #[instrument(skip_all, level = "debug")]
    fn install(&self, session: &mut Session) -> Result<()> {
        let source = &session.paths.source;
        let target = &session.paths.target;
        mkdirp::mkdirp(target).map_err(InstallError::io(target))?;

        let count = Self::copy_tree(source, target)?;
        let marker = target.join(MARKER);
        fs::write(&marker, format!("source = {}\n", source.display()))
            .map_err(InstallError::io(&marker))?;
        info!(
            "copied {count} files from {} to {}",
            source.display(),
            target.display()
        );

        Ok(())
    }
}
