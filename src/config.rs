// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Configuration layout.
//!
//! Specify the layout of the workspace manifest to simplify the process of
//! serialization and deserialization. File I/O is left to the caller to
//! figure out.

use serde::{Deserialize, Serialize};
use std::{
    fmt::{Display, Error as FmtError, Formatter, Result as FmtResult},
    path::{Path, PathBuf},
    str::FromStr,
};

/// Workspace manifest layout.
///
/// The __workspace manifest__ is the file curator keeps in sync with the
/// directory tree. It holds two basic parts: settings and folders. The
/// settings section decides which folders _should_ be open. The folder
/// section lists the folders that _are_ open right now.
///
/// # General Layout
///
/// ```toml
/// [settings.projects.list]
/// white = ["*"]
/// black = ["proj-b"]
///
/// [settings.projects.unmanaged]
/// list = ["../tools/linter"]
///
/// [[folder]]
/// path = "/home/blah/src/proj-a"
/// name = "proj-a"
/// ```
///
/// Missing sections and keys default to empty listings.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct Manifest {
    /// Settings that drive reconciliation.
    #[serde(default)]
    pub settings: Settings,

    /// Currently open folders.
    #[serde(default, rename = "folder")]
    pub folders: Vec<FolderEntry>,
}

impl FromStr for Manifest {
    type Err = ConfigError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        toml::de::from_str(data).map_err(ConfigError::Deserialize)
    }
}

impl Display for Manifest {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(
            toml::ser::to_string_pretty(self)
                .map_err(ConfigError::Serialize)?
                .as_str(),
        )
    }
}

/// Reconciliation settings.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct Settings {
    /// Base directory that glob patterns resolve against.
    ///
    /// Shell expanded. Relative values resolve against the manifest's own
    /// directory, which is also the default when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base: Option<String>,

    /// Folder selection listings.
    #[serde(default)]
    pub projects: ProjectSettings,

    /// Display name derivation.
    #[serde(default)]
    pub naming: NamingSettings,

    /// Branch annotation through version control.
    #[serde(default)]
    pub vcs: VcsSettings,
}

impl Settings {
    /// Resolve base directory relative to the manifest's directory.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError::ShellExpansion`] if base cannot be expanded.
    pub fn base_dir(&self, manifest_dir: impl AsRef<Path>) -> Result<PathBuf> {
        let manifest_dir = manifest_dir.as_ref();
        match &self.base {
            Some(base) => {
                let expanded = shellexpand::full(base).map_err(ConfigError::ShellExpansion)?;
                Ok(crate::path::clean(manifest_dir.join(expanded.as_ref())))
            }
            None => Ok(manifest_dir.to_path_buf()),
        }
    }
}

/// Folder selection listings.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct ProjectSettings {
    /// Glob pattern listings.
    #[serde(default)]
    pub list: ProjectLists,

    /// Folders opened by hand.
    #[serde(default)]
    pub unmanaged: UnmanagedSettings,
}

/// Include and exclude glob patterns, relative to base directory.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct ProjectLists {
    /// Patterns of folders to open.
    #[serde(default)]
    pub white: Vec<String>,

    /// Patterns of folders to close.
    #[serde(default)]
    pub black: Vec<String>,
}

/// Folders the user opened manually outside of any glob pattern.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct UnmanagedSettings {
    /// Base relative, `/` separated paths.
    #[serde(default)]
    pub list: Vec<String>,
}

/// Display name derivation settings.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct NamingSettings {
    /// Environment qualifier tokens in priority order.
    #[serde(default)]
    pub qualifiers: Vec<String>,

    /// Rename rules in priority order, first match wins.
    #[serde(default)]
    pub rename: Vec<RenameRule>,
}

/// Regular expression rename rule.
///
/// Replacement may refer to capture groups as `$1`, `$2`, etc.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct RenameRule {
    pub pattern: String,
    pub replacement: String,
}

/// Version control settings.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct VcsSettings {
    /// Systems to ask for branch annotations, in priority order.
    #[serde(default = "default_systems")]
    pub systems: Vec<VcsKind>,

    /// Subversion client binary.
    #[serde(default = "default_svn_program")]
    pub svn_program: String,

    /// Seconds to wait for an external version control query.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for VcsSettings {
    fn default() -> Self {
        Self {
            systems: default_systems(),
            svn_program: default_svn_program(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_systems() -> Vec<VcsKind> {
    vec![VcsKind::Svn]
}

fn default_svn_program() -> String {
    "svn".into()
}

fn default_timeout_secs() -> u64 {
    30
}

/// Supported version control systems.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VcsKind {
    Svn,
    Git,
}

/// Open folder entry.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct FolderEntry {
    /// Absolute path, or path relative to the manifest's directory.
    pub path: String,

    /// Display name, defaults to final path segment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Configuration error types.
#[derive(Clone, Debug, thiserror::Error)]
pub enum ConfigError {
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
    use pretty_assertions::assert_eq;
    use sealed_test::prelude::*;

    #[test]
    fn deserialize_manifest() -> anyhow::Result<()> {
        let result: Manifest = r#"
            [settings]
            base = "src"

            [settings.projects.list]
            white = ["*", "libs/*"]
            black = ["proj-b"]

            [settings.projects.unmanaged]
            list = ["../tools/linter"]

            [settings.naming]
            qualifiers = ["desa", "prep", "prod"]

            [[settings.naming.rename]]
            pattern = "^svc-(.*)$"
            replacement = "$1"

            [settings.vcs]
            systems = ["git", "svn"]
            timeout_secs = 5

            [[folder]]
            path = "/home/blah/src/proj-a"
            name = "proj-a"

            [[folder]]
            path = "proj-c"
        "#
        .parse()?;

        let expect = Manifest {
            settings: Settings {
                base: Some("src".into()),
                projects: ProjectSettings {
                    list: ProjectLists {
                        white: vec!["*".into(), "libs/*".into()],
                        black: vec!["proj-b".into()],
                    },
                    unmanaged: UnmanagedSettings {
                        list: vec!["../tools/linter".into()],
                    },
                },
                naming: NamingSettings {
                    qualifiers: vec!["desa".into(), "prep".into(), "prod".into()],
                    rename: vec![RenameRule {
                        pattern: "^svc-(.*)$".into(),
                        replacement: "$1".into(),
                    }],
                },
                vcs: VcsSettings {
                    systems: vec![VcsKind::Git, VcsKind::Svn],
                    svn_program: "svn".into(),
                    timeout_secs: 5,
                },
            },
            folders: vec![
                FolderEntry {
                    path: "/home/blah/src/proj-a".into(),
                    name: Some("proj-a".into()),
                },
                FolderEntry {
                    path: "proj-c".into(),
                    name: None,
                },
            ],
        };

        assert_eq!(result, expect);

        Ok(())
    }

    #[test]
    fn absent_keys_default_to_empty() -> anyhow::Result<()> {
        let result: Manifest = "".parse()?;
        assert_eq!(result, Manifest::default());
        assert!(result.settings.projects.list.white.is_empty());
        assert_eq!(result.settings.vcs.systems, vec![VcsKind::Svn]);

        let result: Manifest = indoc! {r#"
            [settings.projects.list]
            black = ["x"]
        "#}
        .parse()?;
        assert!(result.settings.projects.list.white.is_empty());
        assert_eq!(result.settings.projects.list.black, vec!["x".to_string()]);

        Ok(())
    }

    #[test]
    fn malformed_manifest_is_an_error() {
        let result = "[settings.projects.list\nwhite = 1".parse::<Manifest>();
        assert!(matches!(result, Err(ConfigError::Deserialize(_))));
    }

    #[test]
    fn serialize_manifest() -> anyhow::Result<()> {
        let mut manifest = Manifest::default();
        manifest.settings.projects.list.white = vec!["*".into()];
        manifest.folders.push(FolderEntry {
            path: "/work/proj-a".into(),
            name: Some("proj-a".into()),
        });

        let result: Manifest = manifest.to_string().parse()?;
        assert_eq!(result, manifest);

        Ok(())
    }

    #[sealed_test(env = [("BLAH", "/home/blah")])]
    fn base_dir_expansion() -> anyhow::Result<()> {
        let mut settings = Settings::default();
        assert_eq!(settings.base_dir("/work")?, PathBuf::from("/work"));

        settings.base = Some("$BLAH/src".into());
        assert_eq!(settings.base_dir("/work")?, PathBuf::from("/home/blah/src"));

        settings.base = Some("../src".into());
        assert_eq!(settings.base_dir("/work/ws")?, PathBuf::from("/work/src"));

        Ok(())
    }
}
