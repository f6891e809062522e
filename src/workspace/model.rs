// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Target folder model.
//!
//! The __model__ is the authoritative set of folders that should be open. It
//! is recomputed from scratch on every reconciliation pass:
//!
//! 1. Include patterns are resolved against the base directory. Matching
//!    directories form the __managed__ set.
//! 2. Unmanaged entries that still point to a directory are added.
//! 3. Exclude patterns are resolved the same way. Every excluded folder in the
//!    working set is swapped for its placeholder directory, which is created
//!    if missing. Exclusion always wins over inclusion.
//! 4. Branch annotations are resolved for the whole working set.
//! 5. Each folder is labeled by the name deriver.
//!
//! Patterns matching files, or nothing at all, contribute nothing.

use crate::{
    config::Settings,
    path::{self, NormalizedPath},
    vcs::BranchLocator,
    workspace::{naming::NameDeriver, Folder},
};

use glob::{MatchOptions, Pattern};
use std::{
    collections::BTreeSet,
    path::{Path, PathBuf},
};
use tracing::{debug, instrument};

/// Computed target model.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Model {
    /// Folders that should be open.
    pub folders: BTreeSet<Folder>,

    /// Folders matched by include patterns.
    pub managed: BTreeSet<NormalizedPath>,
}

/// Build target model against a base directory.
#[derive(Debug, Clone)]
pub struct ModelBuilder {
    base: PathBuf,
    placeholder_root: PathBuf,
}

impl ModelBuilder {
    /// Construct new model builder.
    ///
    /// Placeholders for closed folders are created under `placeholder_root`.
    pub fn new(base: impl Into<PathBuf>, placeholder_root: impl Into<PathBuf>) -> Self {
        Self {
            base: base.into(),
            placeholder_root: placeholder_root.into(),
        }
    }

    pub fn base(&self) -> &Path {
        self.base.as_path()
    }

    pub fn placeholder_root(&self) -> &Path {
        self.placeholder_root.as_path()
    }

    /// Build the target model.
    ///
    /// # Errors
    ///
    /// - Return [`ModelError::Pattern`] if a glob pattern is invalid.
    /// - Return [`ModelError::Glob`] if a directory cannot be read while
    ///   matching.
    /// - Return [`ModelError::Placeholder`] if a placeholder cannot be created.
    /// - Return [`ModelError::Naming`] if a rename rule is invalid.
    /// - Return [`ModelError::Vcs`] if branch annotations cannot be resolved.
    #[instrument(skip(self, settings, locator), level = "debug")]
    pub async fn build(&self, settings: &Settings, locator: &dyn BranchLocator) -> Result<Model> {
        let deriver = NameDeriver::new(&settings.naming)?;
        let lists = &settings.projects.list;

        let managed = self.resolve_all(&lists.white)?;
        let mut working = managed.clone();

        for entry in &settings.projects.unmanaged.list {
            let folder = path::clean(self.base.join(entry));
            if folder.is_dir() {
                working.insert(NormalizedPath::from_path(folder));
            } else {
                debug!("skip unmanaged entry {entry:?}, no longer a directory");
            }
        }

        for excluded in self.resolve_all(&lists.black)? {
            if !working.remove(&excluded) {
                continue;
            }

            let placeholder = path::placeholder_for(&self.placeholder_root, &excluded);
            mkdirp::mkdirp(&placeholder).map_err(|source| ModelError::Placeholder {
                source,
                path: placeholder.clone(),
            })?;
            debug!("close {excluded} behind {:?}", placeholder.display());
            working.insert(NormalizedPath::from_path(placeholder));
        }

        let branches = locator.locate(&working).await?;
        let folders = working
            .iter()
            .map(|path| Folder {
                name: deriver.derive(path, branches.get(path).map(String::as_str)),
                path: path.clone(),
            })
            .collect();

        Ok(Model { folders, managed })
    }

    fn resolve_all(&self, patterns: &[String]) -> Result<BTreeSet<NormalizedPath>> {
        let mut resolved = BTreeSet::new();
        for pattern in patterns {
            resolved.extend(self.resolve(pattern)?);
        }

        Ok(resolved)
    }

    fn resolve(&self, pattern: &str) -> Result<Vec<NormalizedPath>> {
        let full = if Path::new(pattern).is_absolute() {
            pattern.to_string()
        } else {
            let base = Pattern::escape(self.base.to_string_lossy().as_ref());
            format!("{}/{pattern}", base.trim_end_matches(['/', '\\']))
        };

        let options = MatchOptions {
            case_sensitive: true,
            require_literal_separator: true,
            require_literal_leading_dot: true,
        };

        let mut found = Vec::new();
        let entries = glob::glob_with(&full, options).map_err(|source| ModelError::Pattern {
            source,
            pattern: pattern.to_string(),
        })?;
        for entry in entries {
            let entry = entry?;
            if entry.is_dir() {
                found.push(NormalizedPath::from_path(path::clean(entry)));
            }
        }
        debug!("pattern {pattern:?} matched {} directories", found.len());

        Ok(found)
    }
}

/// Model building error types.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    /// Glob pattern is invalid.
    #[error("invalid glob pattern {pattern:?}")]
    Pattern {
        #[source]
        source: glob::PatternError,
        pattern: String,
    },

    /// Directory cannot be read while matching a pattern.
    #[error(transparent)]
    Glob(#[from] glob::GlobError),

    /// Placeholder directory cannot be created.
    #[error("failed to create placeholder at {:?}", path.display())]
    Placeholder {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Rename rules are invalid.
    #[error(transparent)]
    Naming(#[from] crate::workspace::naming::NamingError),

    /// Branch annotations cannot be resolved.
    #[error(transparent)]
    Vcs(#[from] crate::vcs::VcsError),
}

/// Friendly result alias :3
type Result<T, E = ModelError> = std::result::Result<T, E>;
