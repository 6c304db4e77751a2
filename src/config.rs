// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Configuration layout.
//!
//! Specify the layout for the optional settings file that nvstrap reads at
//! startup to simplify the process of serialization and deserialization. The
//! settings file lets the user relocate paths, pin a font, tune network
//! behavior, and supply known checksums for downloaded artifacts. Every field
//! is optional, so an empty file is a valid settings file.

use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    fmt::{Display, Error as FmtError, Formatter, Result as FmtResult},
    fs::read_to_string,
    path::{Path, PathBuf},
    str::FromStr,
    time::Duration,
};

/// Settings file layout.
///
/// # General Layout
///
/// ```toml
/// [paths]
/// source = "~/dotfiles/nvim"
/// target = "$XDG_CONFIG_HOME/nvim"
///
/// [font]
/// family = "JetBrainsMono"
///
/// [network]
/// attempts = 3
///
/// [checksums]
/// yq_install = "<sha256 hex digest>"
/// ```
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    /// Path overrides.
    pub paths: PathSettings,

    /// Font to install.
    pub font: FontSettings,

    /// Network tuning for downloads.
    pub network: NetworkSettings,

    /// Known sha256 digests keyed by state key of the component downloading.
    pub checksums: BTreeMap<String, String>,
}

impl Settings {
    /// Load settings from file, or fall back to defaults if it is missing.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError::Read`] if file exists but cannot be read.
    /// - Return [`ConfigError::Deserialize`] if file content is invalid.
    /// - Return [`ConfigError::ShellExpansion`] if a path cannot be expanded.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }

        read_to_string(path)
            .map_err(|err| ConfigError::Read {
                source: err,
                path: path.to_path_buf(),
            })?
            .parse()
    }

    /// Known checksum for a given component, if configured.
    pub fn checksum_for(&self, key: impl AsRef<str>) -> Option<&str> {
        self.checksums.get(key.as_ref()).map(String::as_str)
    }
}

impl FromStr for Settings {
    type Err = ConfigError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        let mut settings: Settings = toml::de::from_str(data).map_err(ConfigError::Deserialize)?;

        // INVARIANT: Perform shell expansion on every configured path.
        let paths = &mut settings.paths;
        for slot in [
            &mut paths.source,
            &mut paths.target,
            &mut paths.state_file,
            &mut paths.user_bin,
            &mut paths.system_bin,
            &mut paths.shell_profile,
        ] {
            if let Some(path) = slot.take() {
                *slot = Some(expand_path(&path)?);
            }
        }

        Ok(settings)
    }
}

impl Display for Settings {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(
            toml::ser::to_string_pretty(self)
                .map_err(ConfigError::Serialize)?
                .as_str(),
        )
    }
}

fn expand_path(path: &Path) -> Result<PathBuf> {
    Ok(PathBuf::from(
        shellexpand::full(path.to_string_lossy().as_ref())
            .map_err(ConfigError::ShellExpansion)?
            .into_owned(),
    ))
}

/// Path overrides.
///
/// Anything left out is resolved from the environment.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PathSettings {
    /// Source-of-truth editor configuration directory.
    pub source: Option<PathBuf>,

    /// Directory the editor configuration is deployed into.
    pub target: Option<PathBuf>,

    /// Location of the installation state file.
    pub state_file: Option<PathBuf>,

    /// Unprivileged binary directory.
    pub user_bin: Option<PathBuf>,

    /// Privileged binary directory.
    pub system_bin: Option<PathBuf>,

    /// Shell profile receiving PATH exports.
    pub shell_profile: Option<PathBuf>,
}

/// Font selection.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FontSettings {
    /// Nerd Font family name, as published in the release archive names.
    pub family: String,

    /// Nerd Fonts release tag to download from.
    pub version: String,

    /// Homebrew cask overriding the one known for the family.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cask: Option<String>,
}

impl Default for FontSettings {
    fn default() -> Self {
        Self {
            family: "JetBrainsMono".into(),
            version: "v3.2.1".into(),
            cask: None,
        }
    }
}

/// Release archive family to Homebrew cask.
///
/// Cask names follow the patched font names, which do not always match the
/// archive names.
const KNOWN_CASKS: &[(&str, &str)] = &[
    ("CascadiaCode", "font-caskaydia-cove-nerd-font"),
    ("FiraCode", "font-fira-code-nerd-font"),
    ("FiraMono", "font-fira-mono-nerd-font"),
    ("Hack", "font-hack-nerd-font"),
    ("Hasklig", "font-hasklug-nerd-font"),
    ("Inconsolata", "font-inconsolata-nerd-font"),
    ("Iosevka", "font-iosevka-nerd-font"),
    ("JetBrainsMono", "font-jetbrains-mono-nerd-font"),
    ("Meslo", "font-meslo-lg-nerd-font"),
    ("SourceCodePro", "font-sauce-code-pro-nerd-font"),
    ("UbuntuMono", "font-ubuntu-mono-nerd-font"),
];

impl FontSettings {
    /// Family name as listed by the font registry.
    pub fn display_name(&self) -> String {
        format!("{} Nerd Font", self.family)
    }

    /// Homebrew cask providing this family.
    ///
    /// Families missing from the known table fall back to the lowercased
    /// family name, which holds for single word families.
    pub fn cask(&self) -> String {
        if let Some(cask) = &self.cask {
            return cask.clone();
        }

        KNOWN_CASKS
            .iter()
            .find(|(family, _)| *family == self.family)
            .map(|(_, cask)| (*cask).to_string())
            .unwrap_or_else(|| format!("font-{}-nerd-font", self.family.to_lowercase()))
    }
}

/// Network tuning for artifact downloads.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct NetworkSettings {
    /// Whole-download attempts before giving up.
    pub attempts: u32,

    /// Base backoff, multiplied by the attempt number.
    pub backoff_secs: u64,

    /// Connection establishment timeout.
    pub connect_timeout_secs: u64,

    /// Total timeout for a single request.
    pub timeout_secs: u64,
}

impl Default for NetworkSettings {
    fn default() -> Self {
        Self {
            attempts: 3,
            backoff_secs: 2,
            connect_timeout_secs: 15,
            timeout_secs: 300,
        }
    }
}

impl NetworkSettings {
    pub fn backoff(&self) -> Duration {
        Duration::from_secs(self.backoff_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read settings file.
    #[error("failed to read settings file at {:?}", path.display())]
    Read {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Failed to deserialize configuration.
    #[error(transparent)]
    Deserialize(#[from] toml::de::Error),

    /// Failed to serialize configuration.
    #[error(transparent)]
    Serialize(#[from] toml::ser::Error),

    /// Failed to perform shell expansion on configuration.
    #[error(transparent)]
    ShellExpansion(#[from] shellexpand::LookupError<std::env::VarError>),
}

impl From<ConfigError> for FmtError {
    fn from(_: ConfigError) -> Self {
        FmtError
    }
}

/// Friendly result alias :3
type Result<T, E = ConfigError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;
    use sealed_test::prelude::*;
    use simple_test_case::test_case;

    #[sealed_test(env = [("BLAH", "/home/blah/blah")])]
    fn deserialize_settings() -> anyhow::Result<()> {
        let result: Settings = r#"
            [paths]
            source = "$BLAH/nvim"
            state_file = "$BLAH/state.yaml"

            [font]
            family = "FiraCode"

            [network]
            attempts = 5

            [checksums]
            yq_install = "abc123"
        "#
        .parse()?;

        let expect = Settings {
            paths: PathSettings {
                source: Some("/home/blah/blah/nvim".into()),
                state_file: Some("/home/blah/blah/state.yaml".into()),
                ..Default::default()
            },
            font: FontSettings {
                family: "FiraCode".into(),
                version: "v3.2.1".into(),
                cask: None,
            },
            network: NetworkSettings {
                attempts: 5,
                ..Default::default()
            },
            checksums: BTreeMap::from([("yq_install".into(), "abc123".into())]),
        };

        pretty_assertions::assert_eq!(result, expect);
        pretty_assertions::assert_eq!(result.checksum_for("yq_install"), Some("abc123"));
        pretty_assertions::assert_eq!(result.checksum_for("jq_install"), None);

        Ok(())
    }

    #[test]
    fn empty_settings_use_defaults() -> anyhow::Result<()> {
        let result: Settings = "".parse()?;
        pretty_assertions::assert_eq!(result, Settings::default());
        Ok(())
    }

    #[test]
    fn serialize_settings() -> anyhow::Result<()> {
        let settings = Settings {
            font: FontSettings {
                family: "Hack".into(),
                version: "v3.0.0".into(),
                cask: None,
            },
            ..Default::default()
        };
        let result = settings.to_string();

        let expect = indoc! {r#"
            [font]
            family = "Hack"
            version = "v3.0.0"
        "#};
        assert!(result.contains(expect), "unexpected layout:\n{result}");
        pretty_assertions::assert_eq!(result.parse::<Settings>()?, settings);

        Ok(())
    }

    #[test_case("JetBrainsMono", None, "font-jetbrains-mono-nerd-font"; "default family")]
    #[test_case("SourceCodePro", None, "font-sauce-code-pro-nerd-font"; "renamed family")]
    #[test_case("Hack", None, "font-hack-nerd-font"; "single word")]
    #[test_case("Lilex", None, "font-lilex-nerd-font"; "unknown family")]
    #[test_case("Meslo", Some("font-custom-nerd-font"), "font-custom-nerd-font"; "cask override")]
    #[test]
    fn font_cask_name(family: &str, cask: Option<&str>, expect: &str) {
        let font = FontSettings {
            family: family.into(),
            cask: cask.map(Into::into),
            ..Default::default()
        };
        pretty_assertions::assert_eq!(font.cask(), expect);
    }

    #[test]
    fn cask_override_is_read() -> anyhow::Result<()> {
        let result: Settings = indoc! {r#"
            [font]
            family = "Meslo"
            cask = "font-meslo-lg-dz-nerd-font"
        "#}
        .parse()?;
        pretty_assertions::assert_eq!(result.font.cask(), "font-meslo-lg-dz-nerd-font");
        Ok(())
    }
}
