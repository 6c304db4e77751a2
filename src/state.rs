// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Persistent installation state.
//!
//! Nvstrap remembers what it already did between runs through a small YAML
//! document called the __state file__. The state file maps every tracked
//! component to one of three lifecycle values, so repeated invocations
//! converge instead of redoing expensive or destructive work.
//!
//! # State File Layout
//!
//! The state file is a flat YAML mapping, one key per component in a fixed
//! whitelist, each holding one of `notcheckedyet`, `installed`, or
//! `notinstalled`. The file is meant to be edited by hand. Flipping a single
//! key back to `notcheckedyet` makes exactly that component get reconsidered
//! on the next run. Comments are kept intact, because writes only ever
//! rewrite the value portion of the line holding the target key.
//!
//! # Integrity
//!
//! Only whitelisted keys and tri-state values can ever be written. Invalid
//! names or values are rejected before the file is touched. A state file that
//! cannot be parsed is never repaired automatically; it is reported as
//! corrupt so the operator can decide what to do.
//!
//! Writes go through a temporary file in the same directory that is synced
//! and then renamed over the original, so a crash never leaves a half-written
//! state file behind. There is no locking, thus two concurrent runs against
//! the same state file may race.

use serde_yaml::Value;
use std::{
    collections::BTreeMap,
    fmt::{Display, Formatter, Result as FmtResult},
    fs::read_to_string,
    io::Write,
    path::{Path, PathBuf},
    str::FromStr,
};
use tempfile::NamedTempFile;
use tracing::{debug, instrument};

/// Tracked component whitelist.
///
/// Declaration order is the order the orchestrator runs components in, and
/// the order state summaries are displayed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Component {
    Neovim,
    Git,
    Yq,
    Jq,
    Deps,
    Node,
    Python,
    Fonts,
    Backup,
    Config,
    Lazy,
    Plugins,
    Lazygit,
    Tmux,
}

impl Component {
    /// Every tracked component in run order.
    pub const ALL: [Component; 14] = [
        Self::Neovim,
        Self::Git,
        Self::Yq,
        Self::Jq,
        Self::Deps,
        Self::Node,
        Self::Python,
        Self::Fonts,
        Self::Backup,
        Self::Config,
        Self::Lazy,
        Self::Plugins,
        Self::Lazygit,
        Self::Tmux,
    ];

    /// Key used for this component in the state file.
    pub fn key(&self) -> &'static str {
        match self {
            Self::Neovim => "neovim_install",
            Self::Git => "git_install",
            Self::Yq => "yq_install",
            Self::Jq => "jq_install",
            Self::Deps => "deps_install",
            Self::Node => "node_install",
            Self::Python => "python_install",
            Self::Fonts => "fonts_install",
            Self::Backup => "backup_config",
            Self::Config => "config_install",
            Self::Lazy => "lazy_install",
            Self::Plugins => "plugins_install",
            Self::Lazygit => "lazygit_install",
            Self::Tmux => "tmux_install",
        }
    }

    /// Failure of a critical component aborts the whole run.
    ///
    /// The editor itself, version control, and the state file's own YAML
    /// processor are critical.
    pub fn is_critical(&self) -> bool {
        matches!(self, Self::Neovim | Self::Git | Self::Yq)
    }
}

impl FromStr for Component {
    type Err = StateError;

    fn from_str(key: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|component| component.key() == key)
            .ok_or_else(|| StateError::InvalidComponent(key.to_string()))
    }
}

impl AsRef<str> for Component {
    fn as_ref(&self) -> &str {
        self.key()
    }
}

impl Display for Component {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(self.key())
    }
}

/// Tri-state lifecycle of a component.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    #[default]
    NotCheckedYet,
    Installed,
    NotInstalled,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotCheckedYet => "notcheckedyet",
            Self::Installed => "installed",
            Self::NotInstalled => "notinstalled",
        }
    }

    /// Whether a component in this status still needs work.
    pub fn needs_action(&self) -> bool {
        !matches!(self, Self::Installed)
    }
}

impl FromStr for Status {
    type Err = StateError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "notcheckedyet" => Ok(Self::NotCheckedYet),
            "installed" => Ok(Self::Installed),
            "notinstalled" => Ok(Self::NotInstalled),
            _ => Err(StateError::InvalidStatus(value.to_string())),
        }
    }
}

impl AsRef<str> for Status {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl Display for Status {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(self.as_str())
    }
}

const STATE_HEADER: &str = "\
# nvstrap installation state.
#
# Each key tracks one component. Valid values:
#   notcheckedyet  never probed, or reset
#   installed      verified present, left alone on later runs
#   notinstalled   last install attempt failed
#
# Set a key back to notcheckedyet to have that component reconsidered.
";

/// Handle to the state file.
///
/// Holds no open file handle. Every call reads, and possibly rewrites, the
/// state file from scratch.
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    /// Construct new state store handle.
    ///
    /// Does not touch the file system. Call [`StateStore::init`] to make sure
    /// the state file exists.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path to state file.
    pub fn path(&self) -> &Path {
        self.path.as_path()
    }

    /// Create state file with every component unchecked if it is missing.
    ///
    /// Never overwrites an existing state file.
    ///
    /// # Errors
    ///
    /// - Return [`StateError::Write`] if state file cannot be created.
    #[instrument(skip(self), level = "debug")]
    pub fn init(&self) -> Result<()> {
        if self.path.exists() {
            debug!("state file {:?} already exists", self.path.display());
            return Ok(());
        }

        if let Some(parent) = self.parent_dir() {
            mkdirp::mkdirp(parent).map_err(|err| StateError::Write {
                source: err,
                path: self.path.clone(),
            })?;
        }

        let mut content = String::from(STATE_HEADER);
        for component in Component::ALL {
            content.push_str(&format!("{}: {}\n", component.key(), Status::NotCheckedYet));
        }

        debug!("create state file {:?}", self.path.display());
        self.write_atomic(&content)
    }

    /// Lookup status of component.
    ///
    /// A whitelisted key that is absent from the state file has never been
    /// checked, so it is reported as [`Status::NotCheckedYet`].
    ///
    /// # Errors
    ///
    /// - Return [`StateError::InvalidComponent`] if name is not whitelisted.
    /// - Return [`StateError::Read`] if state file cannot be read.
    /// - Return [`StateError::Corrupt`] if state file cannot be parsed.
    pub fn get(&self, name: impl AsRef<str>) -> Result<Status> {
        let component: Component = name.as_ref().parse()?;
        let statuses = self.load()?;

        Ok(statuses.get(&component).copied().unwrap_or_default())
    }

    /// Record status of component.
    ///
    /// The write is durable by the time this returns.
    ///
    /// # Errors
    ///
    /// - Return [`StateError::InvalidComponent`] if name is not whitelisted.
    /// - Return [`StateError::InvalidStatus`] if status is not tri-state.
    /// - Return [`StateError::Read`] if state file cannot be read.
    /// - Return [`StateError::Corrupt`] if state file cannot be parsed.
    /// - Return [`StateError::Write`] if state file cannot be written.
    #[instrument(skip(self, name, status), level = "debug")]
    pub fn set(&self, name: impl AsRef<str>, status: impl AsRef<str>) -> Result<()> {
        // INVARIANT: Validate everything before touching the state file.
        let component: Component = name.as_ref().parse()?;
        let status: Status = status.as_ref().parse()?;

        let content = self.read()?;
        parse_statuses(&self.path, &content)?;

        debug!("set {component} to {status}");
        let content = rewrite_key(&content, component.key(), status.as_str());
        self.write_checked(&content, &[(component, status)])
    }

    /// Check if component still needs work.
    ///
    /// # Errors
    ///
    /// - Return any error that [`StateStore::get`] can return.
    pub fn needs_action(&self, name: impl AsRef<str>) -> Result<bool> {
        Ok(self.get(name)?.needs_action())
    }

    /// Mark every component as unchecked.
    ///
    /// # Errors
    ///
    /// - Return [`StateError::Read`] if state file cannot be read.
    /// - Return [`StateError::Corrupt`] if state file cannot be parsed.
    /// - Return [`StateError::Write`] if state file cannot be written.
    #[instrument(skip(self), level = "debug")]
    pub fn reset_all(&self) -> Result<()> {
        let mut content = self.read()?;
        parse_statuses(&self.path, &content)?;

        for component in Component::ALL {
            content = rewrite_key(&content, component.key(), Status::NotCheckedYet.as_str());
        }

        let expect = Component::ALL.map(|component| (component, Status::NotCheckedYet));
        self.write_checked(&content, &expect)
    }

    /// Status of every component in whitelist order.
    ///
    /// # Errors
    ///
    /// - Return [`StateError::Read`] if state file cannot be read.
    /// - Return [`StateError::Corrupt`] if state file cannot be parsed.
    pub fn summary(&self) -> Result<Vec<(Component, Status)>> {
        let statuses = self.load()?;

        Ok(Component::ALL
            .into_iter()
            .map(|component| {
                let status = statuses.get(&component).copied().unwrap_or_default();
                (component, status)
            })
            .collect())
    }

    fn load(&self) -> Result<BTreeMap<Component, Status>> {
        parse_statuses(&self.path, &self.read()?)
    }

    fn read(&self) -> Result<String> {
        read_to_string(&self.path).map_err(|err| StateError::Read {
            source: err,
            path: self.path.clone(),
        })
    }

    fn parent_dir(&self) -> Option<&Path> {
        self.path
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
    }

    /// Write rewritten content only if it reads back with the expected values.
    ///
    /// A hand-edited layout the line rewriter does not understand must never
    /// turn a valid state file into an unparseable one.
    fn write_checked(&self, content: &str, expect: &[(Component, Status)]) -> Result<()> {
        let statuses = parse_statuses(&self.path, content)?;
        for (component, status) in expect {
            if statuses.get(component) != Some(status) {
                return Err(StateError::Corrupt {
                    path: self.path.clone(),
                    reason: format!("cannot rewrite {component} in place"),
                });
            }
        }

        self.write_atomic(content)
    }

    fn write_atomic(&self, content: &str) -> Result<()> {
        let to_write_error = |err: std::io::Error| StateError::Write {
            source: err,
            path: self.path.clone(),
        };

        let dir = self.parent_dir().unwrap_or_else(|| Path::new("."));
        let mut temp = NamedTempFile::new_in(dir).map_err(to_write_error)?;
        temp.write_all(content.as_bytes()).map_err(to_write_error)?;
        temp.as_file().sync_all().map_err(to_write_error)?;
        temp.persist(&self.path)
            .map_err(|err| to_write_error(err.error))?;

        Ok(())
    }
}

fn parse_statuses(path: &Path, content: &str) -> Result<BTreeMap<Component, Status>> {
    let corrupt = |reason: String| StateError::Corrupt {
        path: path.to_path_buf(),
        reason,
    };

    let document: Value = serde_yaml::from_str(content).map_err(|err| corrupt(err.to_string()))?;
    let mapping = match document {
        Value::Null => return Ok(BTreeMap::new()),
        Value::Mapping(mapping) => mapping,
        _ => return Err(corrupt("top-level document is not a mapping".into())),
    };

    let mut statuses = BTreeMap::new();
    for (key, value) in mapping {
        let key = match key {
            Value::String(key) => key,
            other => return Err(corrupt(format!("non-string key {other:?}"))),
        };

        let Ok(component) = key.parse::<Component>() else {
            debug!("ignore unknown state key {key:?}");
            continue;
        };

        let status = value
            .as_str()
            .and_then(|value| value.parse::<Status>().ok())
            .ok_or_else(|| corrupt(format!("invalid status {value:?} for {key}")))?;
        statuses.insert(component, status);
    }

    Ok(statuses)
}

/// Replace the value of a top-level key, or append the key if it is missing.
///
/// Everything else in the document, comments included, is left as is. A
/// trailing comment on the target line survives the rewrite.
fn rewrite_key(content: &str, key: &str, value: &str) -> String {
    let mut out = String::with_capacity(content.len() + key.len() + value.len() + 2);
    let mut found = false;

    for line in content.split_inclusive('\n') {
        let body = line.trim_end_matches(['\n', '\r']);
        let newline = &line[body.len()..];
        if found || !is_key_line(body, key) {
            out.push_str(line);
            continue;
        }

        found = true;
        let after_colon = &body[body.find(':').map_or(body.len(), |idx| idx + 1)..];
        let comment = after_colon
            .find(" #")
            .map(|idx| &after_colon[idx..])
            .unwrap_or_default();
        out.push_str(&format!("{key}: {value}{comment}"));
        out.push_str(if newline.is_empty() { "\n" } else { newline });
    }

    if !found {
        if !out.is_empty() && !out.ends_with('\n') {
            out.push('\n');
        }
        out.push_str(&format!("{key}: {value}\n"));
    }

    out
}

/// Check if line holds a top-level key, bare or quoted.
fn is_key_line(line: &str, key: &str) -> bool {
    let rest = ["\"", "'", ""].into_iter().find_map(|quote| {
        line.strip_prefix(quote)?
            .strip_prefix(key)?
            .strip_prefix(quote)
    });

    rest.is_some_and(|rest| rest.trim_start().starts_with(':'))
}

/// State store error types.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    /// Name is not part of the component whitelist.
    #[error("invalid component {0:?}")]
    InvalidComponent(String),

    /// Value is not one of the three lifecycle values.
    #[error("invalid status {0:?}, expected notcheckedyet, installed, or notinstalled")]
    InvalidStatus(String),

    /// State file cannot be parsed.
    #[error("state file at {:?} is corrupt: {reason}", path.display())]
    Corrupt { path: PathBuf, reason: String },

    /// State file cannot be read from.
    #[error("failed to read state file at {:?}", path.display())]
    Read {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// State file cannot be written to.
    #[error("failed to write state file at {:?}", path.display())]
    Write {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },
}

/// Friendly result alias :3
pub type Result<T, E = StateError> = std::result::Result<T, E>;
