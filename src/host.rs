// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Workspace host interaction.
//!
//! The __host__ owns the live list of open folders and the persisted
//! settings. Curator never touches either directly. Instead it reads them,
//! computes what they should look like, and asks the host to apply the
//! difference through [`WorkspaceHost`].
//!
//! # Manifest Host
//!
//! [`ManifestHost`] is a host backed by a TOML workspace manifest. Every
//! write goes straight to disk. Host events are discovered by polling: the
//! manifest is re-read and compared against the last snapshot that was
//! reported. Changes curator made itself are reported like any other change,
//! which is exactly how an editor echoes its own folder updates back to
//! listeners.

use crate::{
    config::{ConfigError, Manifest, Settings},
    path::{self, NormalizedPath, PathError},
    vcs::BranchLocator,
    workspace::{Folder, FolderChange, Outcome, Reconciler, WorkspaceError},
};

use std::{
    collections::BTreeSet,
    fs::{read_to_string, write},
    path::{Path, PathBuf},
};
use tracing::{debug, error, info, instrument, warn};

/// Layer of indirection for host access.
pub trait WorkspaceHost {
    /// Directory that glob patterns resolve against.
    fn base_dir(&self) -> &Path;

    /// Read current settings.
    fn settings(&self) -> Result<Settings>;

    /// Read live folder list.
    fn folders(&self) -> Vec<Folder>;

    /// Replace entire live folder list in one batch.
    ///
    /// An error means the host rejected the update, and nothing was changed.
    fn replace_folders(&mut self, folders: &[Folder]) -> Result<()>;

    /// Persist exclude patterns.
    fn update_excluded(&mut self, patterns: Vec<String>) -> Result<()>;

    /// Persist unmanaged folder listing.
    fn update_unmanaged(&mut self, entries: Vec<String>) -> Result<()>;

    /// Reload the host environment from scratch.
    fn request_reload(&mut self) -> Result<()>;

    /// Show error message to the user.
    fn report_error(&mut self, message: &str);
}

/// Events a host delivers to curator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostEvent {
    /// Live folder list changed.
    FoldersChanged(FolderChange),

    /// Persisted settings changed.
    ConfigurationChanged(ConfigScope),

    /// Host window regained focus.
    FocusGained,
}

/// Portion of settings affected by a configuration change.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ConfigScope {
    /// Settings that feed the target model changed.
    pub model: bool,

    /// Unmanaged folder listing changed.
    pub unmanaged: bool,
}

/// Host backed by a workspace manifest file.
#[derive(Debug, Clone)]
pub struct ManifestHost {
    path: PathBuf,
    canonical: PathBuf,
    dir: PathBuf,
    base: PathBuf,
    manifest: Manifest,
    observed: Manifest,
}

impl ManifestHost {
    /// Open workspace manifest.
    ///
    /// # Errors
    ///
    /// - Return [`HostError::Read`] if manifest cannot be read.
    /// - Return [`HostError::Parse`] if manifest is not valid.
    /// - Return [`HostError::Config`] if base directory cannot be expanded.
    #[instrument(skip(path), level = "debug")]
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path::absolute(path)?;
        debug!("open workspace manifest {:?}", path.display());
        let manifest = read_manifest(&path)?;
        let dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        let base = manifest.settings.base_dir(&dir)?;
        let canonical = path.canonicalize().unwrap_or_else(|_| path.clone());

        Ok(Self {
            path,
            canonical,
            dir,
            base,
            observed: manifest.clone(),
            manifest,
        })
    }

    pub fn path(&self) -> &Path {
        self.path.as_path()
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    /// Check if a path reported by a file watcher names the manifest.
    ///
    /// Watchers may report either the path the manifest was opened through,
    /// or its canonical form with symbolic links resolved.
    pub fn is_manifest(&self, path: impl AsRef<Path>) -> bool {
        let path = path.as_ref();
        path == self.path || path == self.canonical
    }

    /// Poll manifest for changes since the last poll.
    ///
    /// Folder changes are reported before configuration changes.
    ///
    /// # Errors
    ///
    /// - Return [`HostError::Read`] if manifest cannot be read.
    /// - Return [`HostError::Parse`] if manifest is not valid.
    /// - Return [`HostError::Config`] if base directory cannot be expanded.
    pub fn poll_events(&mut self) -> Result<Vec<HostEvent>> {
        let latest = read_manifest(&self.path)?;
        self.base = latest.settings.base_dir(&self.dir)?;

        let mut events = Vec::new();
        let before = folders_of(&self.dir, &self.observed);
        let after = folders_of(&self.dir, &latest);
        let change = FolderChange {
            added: after.iter().filter(|folder| !before.contains(folder)).cloned().collect(),
            removed: before.iter().filter(|folder| !after.contains(folder)).cloned().collect(),
        };
        if !change.added.is_empty() || !change.removed.is_empty() {
            events.push(HostEvent::FoldersChanged(change));
        }

        let (old, new) = (&self.observed.settings, &latest.settings);
        let scope = ConfigScope {
            model: old.projects.list != new.projects.list
                || old.base != new.base
                || old.naming != new.naming,
            unmanaged: old.projects.unmanaged != new.projects.unmanaged,
        };
        if scope != ConfigScope::default() {
            events.push(HostEvent::ConfigurationChanged(scope));
        }

        debug!("observed {} manifest events", events.len());
        self.manifest = latest.clone();
        self.observed = latest;

        Ok(events)
    }

    // INVARIANT: Edits always apply on top of what is currently on disk.
    fn edit<E>(&mut self, editor: E) -> Result<()>
    where
        E: FnOnce(&mut Manifest) -> Result<()>,
    {
        let mut latest = read_manifest(&self.path)?;
        editor(&mut latest)?;

        write(&self.path, latest.to_string()).map_err(|source| HostError::Write {
            source,
            path: self.path.clone(),
        })?;

        // INVARIANT: Known folders only change through polling or a folder
        //   replace, so folders written by others stay unseen until polled.
        let folders = std::mem::take(&mut self.manifest.folders);
        self.manifest = Manifest { folders, ..latest };

        Ok(())
    }
}

impl WorkspaceHost for ManifestHost {
    fn base_dir(&self) -> &Path {
        self.base.as_path()
    }

    fn settings(&self) -> Result<Settings> {
        Ok(self.manifest.settings.clone())
    }

    fn folders(&self) -> Vec<Folder> {
        folders_of(&self.dir, &self.manifest)
    }

    fn replace_folders(&mut self, folders: &[Folder]) -> Result<()> {
        let mut seen = BTreeSet::new();
        if let Some(duplicate) = folders.iter().find(|folder| !seen.insert(&folder.path)) {
            return Err(HostError::DuplicateFolder {
                path: duplicate.path.clone(),
            });
        }

        // INVARIANT: Folder list on disk must still be the one the update
        //   was computed from, or folders opened since would be dropped.
        let expected = self.manifest.folders.clone();
        let entries = folders.iter().map(Folder::to_entry).collect::<Vec<_>>();
        let path = self.path.clone();
        self.edit(|manifest| {
            if manifest.folders != expected {
                return Err(HostError::Stale { path });
            }
            manifest.folders = entries.clone();
            Ok(())
        })?;
        self.manifest.folders = entries;

        Ok(())
    }

    fn update_excluded(&mut self, patterns: Vec<String>) -> Result<()> {
        self.edit(|manifest| {
            manifest.settings.projects.list.black = patterns;
            Ok(())
        })
    }

    fn update_unmanaged(&mut self, entries: Vec<String>) -> Result<()> {
        self.edit(|manifest| {
            manifest.settings.projects.unmanaged.list = entries;
            Ok(())
        })
    }

    /// Re-read manifest settings from disk.
    ///
    /// Folder changes made since the last poll are left for the next poll to
    /// report, so they reach the reconciler as events.
    fn request_reload(&mut self) -> Result<()> {
        info!("reload workspace manifest {:?}", self.path.display());
        let latest = read_manifest(&self.path)?;
        self.base = latest.settings.base_dir(&self.dir)?;
        let folders = std::mem::take(&mut self.manifest.folders);
        self.manifest = Manifest { folders, ..latest };

        Ok(())
    }

    fn report_error(&mut self, message: &str) {
        error!("{message}");
    }
}

/// Rounds of polling before [`Reconciler::settle`] gives up.
const SETTLE_LIMIT: usize = 8;

impl<L> Reconciler<ManifestHost, L>
where
    L: BranchLocator,
{
    /// Poll and handle manifest events until no more show up.
    ///
    /// Handling an event may write the manifest, which shows up as new events
    /// on the next poll. When the manifest had to be reloaded, activation runs
    /// only once polling turns up nothing, so folders opened by hand before
    /// the reload are recorded first. Stops after a bounded number of rounds
    /// in case the manifest never settles. Returns the number of events
    /// handled.
    ///
    /// # Errors
    ///
    /// - Return [`WorkspaceError`] if manifest cannot be polled, or an event
    ///   handler fails.
    pub async fn settle(&mut self) -> Result<usize, WorkspaceError> {
        let mut handled = 0;
        for _ in 0..SETTLE_LIMIT {
            let events = self.host_mut().poll_events()?;
            if events.is_empty() {
                if !self.reload_pending() {
                    return Ok(handled);
                }
                self.activate().await?;
                continue;
            }

            for event in events {
                handled += 1;
                self.handle(event).await?;
            }
        }

        warn!("workspace manifest did not settle after {SETTLE_LIMIT} rounds");
        Ok(handled)
    }

    /// Reconcile as if the host regained focus.
    ///
    /// Pending manifest events are handled before and after the pass.
    ///
    /// # Errors
    ///
    /// - Return [`WorkspaceError`] if manifest cannot be polled, or the pass
    ///   fails.
    pub async fn refresh(&mut self) -> Result<Outcome, WorkspaceError> {
        self.settle().await?;
        let outcome = self.handle(HostEvent::FocusGained).await?;
        self.settle().await?;

        Ok(outcome)
    }
}

fn read_manifest(path: &Path) -> Result<Manifest> {
    let data = read_to_string(path).map_err(|source| HostError::Read {
        source,
        path: path.to_path_buf(),
    })?;

    data.parse().map_err(|source| HostError::Parse {
        source,
        path: path.to_path_buf(),
    })
}

fn folders_of(dir: &Path, manifest: &Manifest) -> Vec<Folder> {
    manifest
        .folders
        .iter()
        .map(|entry| {
            let path = NormalizedPath::from_path(path::clean(dir.join(&entry.path)));
            let name = entry
                .name
                .clone()
                .unwrap_or_else(|| path.file_name().to_string());
            Folder { path, name }
        })
        .collect()
}

/// Host interaction error types.
#[derive(Debug, thiserror::Error)]
pub enum HostError {
    /// Manifest cannot be read.
    #[error("failed to read workspace manifest at {:?}", path.display())]
    Read {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Manifest cannot be written.
    #[error("failed to write workspace manifest at {:?}", path.display())]
    Write {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Manifest is not valid.
    #[error("invalid workspace manifest at {:?}", path.display())]
    Parse {
        #[source]
        source: ConfigError,
        path: PathBuf,
    },

    /// Settings cannot be resolved.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Manifest path cannot be resolved.
    #[error(transparent)]
    Path(#[from] PathError),

    /// Folder list on disk changed since it was last read.
    #[error("workspace manifest at {:?} changed before folder update", path.display())]
    Stale { path: PathBuf },

    /// Folder update lists the same folder twice.
    #[error("folder {path} is listed more than once")]
    DuplicateFolder { path: NormalizedPath },
}

/// Friendly result alias :3
pub type Result<T, E = HostError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::{formatdoc, indoc};
    use pretty_assertions::assert_eq;
    use sealed_test::prelude::*;

    #[sealed_test]
    fn relative_entries_resolve_against_manifest() -> anyhow::Result<()> {
        let cwd = std::env::current_dir()?;
        write(
            "workspace.toml",
            indoc! {r#"
                [[folder]]
                path = "proj-a"

                [[folder]]
                path = "../elsewhere/tool"
                name = "linter"
            "#},
        )?;

        let host = ManifestHost::open("workspace.toml")?;
        let expect = vec![
            Folder {
                path: NormalizedPath::from_path(cwd.join("proj-a")),
                name: "proj-a".into(),
            },
            Folder {
                path: NormalizedPath::from_path(path::clean(cwd.join("../elsewhere/tool"))),
                name: "linter".into(),
            },
        ];
        assert_eq!(host.folders(), expect);
        assert_eq!(host.base_dir(), cwd.as_path());

        Ok(())
    }

    #[sealed_test]
    fn poll_reports_folder_and_configuration_changes() -> anyhow::Result<()> {
        write("workspace.toml", "[[folder]]\npath = \"proj-a\"\n")?;
        let mut host = ManifestHost::open("workspace.toml")?;
        assert!(host.poll_events()?.is_empty());

        let cwd = std::env::current_dir()?;
        write(
            "workspace.toml",
            formatdoc! {r#"
                [settings.projects.list]
                white = ["*"]

                [[folder]]
                path = "{}"
            "#, cwd.join("proj-b").display()},
        )?;

        let events = host.poll_events()?;
        let expect = vec![
            HostEvent::FoldersChanged(FolderChange {
                added: vec![Folder {
                    path: NormalizedPath::from_path(cwd.join("proj-b")),
                    name: "proj-b".into(),
                }],
                removed: vec![Folder {
                    path: NormalizedPath::from_path(cwd.join("proj-a")),
                    name: "proj-a".into(),
                }],
            }),
            HostEvent::ConfigurationChanged(ConfigScope {
                model: true,
                unmanaged: false,
            }),
        ];
        assert_eq!(events, expect);
        assert!(host.poll_events()?.is_empty());

        Ok(())
    }

    #[sealed_test]
    fn own_writes_are_echoed_once() -> anyhow::Result<()> {
        write("workspace.toml", "")?;
        let mut host = ManifestHost::open("workspace.toml")?;
        let folder = Folder {
            path: NormalizedPath::new("/work/proj-a"),
            name: "proj-a".into(),
        };

        host.replace_folders(std::slice::from_ref(&folder))?;
        host.update_unmanaged(vec!["../tool".into()])?;
        assert_eq!(host.folders(), vec![folder.clone()]);

        let events = host.poll_events()?;
        let expect = vec![
            HostEvent::FoldersChanged(FolderChange {
                added: vec![folder],
                removed: vec![],
            }),
            HostEvent::ConfigurationChanged(ConfigScope {
                model: false,
                unmanaged: true,
            }),
        ];
        assert_eq!(events, expect);
        assert!(host.poll_events()?.is_empty());

        Ok(())
    }

    #[sealed_test]
    fn duplicate_folders_are_rejected() -> anyhow::Result<()> {
        write("workspace.toml", "")?;
        let mut host = ManifestHost::open("workspace.toml")?;
        let folder = Folder {
            path: NormalizedPath::new("/work/proj-a"),
            name: "proj-a".into(),
        };

        let result = host.replace_folders(&[folder.clone(), folder]);
        assert!(matches!(result, Err(HostError::DuplicateFolder { .. })));
        assert!(host.folders().is_empty());
        assert_eq!(read_to_string("workspace.toml")?, "");

        Ok(())
    }

    #[sealed_test]
    fn folder_update_over_unseen_folders_is_rejected() -> anyhow::Result<()> {
        write("workspace.toml", "[[folder]]\npath = \"/work/proj-a\"\n")?;
        let mut host = ManifestHost::open("workspace.toml")?;

        let external = "[[folder]]\npath = \"/work/proj-a\"\n\n[[folder]]\npath = \"/work/tool\"\n";
        write("workspace.toml", external)?;

        let result = host.replace_folders(&[Folder::new("/work/proj-b", "proj-b")]);
        assert!(matches!(result, Err(HostError::Stale { .. })));
        assert_eq!(read_to_string("workspace.toml")?, external);

        Ok(())
    }

    #[sealed_test]
    fn reload_keeps_unseen_changes_pending() -> anyhow::Result<()> {
        write("workspace.toml", "")?;
        let mut host = ManifestHost::open("workspace.toml")?;

        write(
            "workspace.toml",
            "[settings.projects.list]\nwhite = [\"*\"]\n\n[[folder]]\npath = \"/work/tool\"\n",
        )?;
        host.request_reload()?;
        assert_eq!(host.manifest().settings.projects.list.white, vec!["*".to_string()]);
        assert!(host.folders().is_empty());

        let expect = vec![
            HostEvent::FoldersChanged(FolderChange {
                added: vec![Folder::new("/work/tool", "tool")],
                removed: vec![],
            }),
            HostEvent::ConfigurationChanged(ConfigScope {
                model: true,
                unmanaged: false,
            }),
        ];
        assert_eq!(host.poll_events()?, expect);
        assert_eq!(host.folders(), vec![Folder::new("/work/tool", "tool")]);

        Ok(())
    }

    #[cfg(unix)]
    #[sealed_test]
    fn manifest_matches_through_symlinks() -> anyhow::Result<()> {
        std::fs::create_dir("real")?;
        write("real/workspace.toml", "")?;
        std::os::unix::fs::symlink("real", "link")?;

        let host = ManifestHost::open("link/workspace.toml")?;
        assert!(host.is_manifest(std::env::current_dir()?.join("link/workspace.toml")));
        assert!(host.is_manifest(std::fs::canonicalize("real/workspace.toml")?));
        assert!(!host.is_manifest(std::env::current_dir()?.join("real/other.toml")));

        Ok(())
    }

    #[sealed_test]
    fn edits_keep_external_changes() -> anyhow::Result<()> {
        write("workspace.toml", "")?;
        let mut host = ManifestHost::open("workspace.toml")?;

        write("workspace.toml", "[settings.projects.list]\nwhite = [\"*\"]\n")?;
        host.update_excluded(vec!["proj-b".into()])?;

        let settings = host.settings()?;
        assert_eq!(settings.projects.list.white, vec!["*".to_string()]);
        assert_eq!(settings.projects.list.black, vec!["proj-b".to_string()]);

        Ok(())
    }

    #[sealed_test]
    fn settings_edits_leave_unseen_folders_for_polling() -> anyhow::Result<()> {
        write("workspace.toml", "")?;
        let mut host = ManifestHost::open("workspace.toml")?;

        write("workspace.toml", "[[folder]]\npath = \"/work/tool\"\n")?;
        host.update_unmanaged(vec!["../lint".into()])?;
        assert!(host.folders().is_empty());
        assert_eq!(
            host.manifest().settings.projects.unmanaged.list,
            vec!["../lint".to_string()]
        );

        let result = host.replace_folders(&[Folder::new("/work/proj-a", "proj-a")]);
        assert!(matches!(result, Err(HostError::Stale { .. })));

        host.poll_events()?;
        assert_eq!(host.folders(), vec![Folder::new("/work/tool", "tool")]);

        Ok(())
    }

    #[sealed_test]
    fn missing_manifest_is_an_error() {
        let result = ManifestHost::open("workspace.toml");
        assert!(matches!(result, Err(HostError::Read { .. })));
    }
}
