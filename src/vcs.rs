// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Version control branch annotations.
//!
//! Folders that live inside a version controlled working copy are labeled
//! with the branch they have checked out. Finding those branches is split in
//! two steps:
//!
//! 1. Locate the __control root__ of each candidate folder, i.e., the nearest
//!    ancestor (the folder itself included) holding version control metadata.
//! 2. Ask the version control system for the branch of each control root.
//!
//! Placeholder folders are never under version control, so they are dropped
//! before anything is probed.
//!
//! # Subversion
//!
//! Subversion is asked through its command line client in one batch:
//! `svn info --show-item relative-url <root>...`. The client answers with one
//! line per root in the same order. Each line starts with `^/`, which is
//! stripped. When more than one root is queried, the client appends the root
//! path after the value, so only the first word of the line is kept.
//!
//! # Git
//!
//! Git repositories are read in-process through libgit2. The branch is the
//! shorthand name of HEAD. Detached or unborn HEADs carry no annotation.

use crate::{
    config::{VcsKind, VcsSettings},
    path::NormalizedPath,
};

use futures::future::{BoxFuture, FutureExt};
use git2::{ErrorCode, Repository};
use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    ffi::OsString,
    path::{Path, PathBuf},
    time::Duration,
};
use tokio::process::Command;
use tracing::{debug, instrument};

/// Branch annotation of each located folder.
pub type BranchMap = BTreeMap<NormalizedPath, String>;

/// Resolve branch annotations for candidate folders.
pub trait BranchLocator: Send + Sync {
    /// Locate branches of candidate folders.
    ///
    /// Only folders that sit inside a control root, and whose branch could be
    /// resolved, appear in the returned mapping.
    fn locate<'a>(
        &'a self,
        candidates: &'a BTreeSet<NormalizedPath>,
    ) -> BoxFuture<'a, Result<BranchMap>>;
}

/// Locate control roots of candidate folders.
///
/// Walks upward from each candidate until a directory holding `marker` is
/// found. Probed directories are cached, so candidates sharing ancestors only
/// pay for each directory once. Placeholders are skipped.
pub fn control_roots(
    marker: &str,
    candidates: &BTreeSet<NormalizedPath>,
) -> BTreeMap<NormalizedPath, PathBuf> {
    let mut probed: HashMap<PathBuf, bool> = HashMap::new();
    let mut roots = BTreeMap::new();

    for candidate in candidates.iter().filter(|path| !path.is_placeholder()) {
        let root = candidate.as_path().ancestors().find(|dir| {
            *probed
                .entry(dir.to_path_buf())
                .or_insert_with(|| dir.join(marker).exists())
        });

        if let Some(root) = root {
            roots.insert(candidate.clone(), root.to_path_buf());
        }
    }

    roots
}

/// Parse relative URL listing emitted by `svn info --show-item relative-url`.
///
/// # Errors
///
/// - Return [`VcsError::MalformedOutput`] if line count does not match the
///   number of queried roots.
/// - Return [`VcsError::MalformedLine`] if a line is too short to hold a
///   relative URL.
pub fn parse_relative_urls(output: &str, expected: usize) -> Result<Vec<String>> {
    let lines = output
        .lines()
        .filter(|line| !line.trim().is_empty())
        .collect::<Vec<_>>();
    if lines.len() != expected {
        return Err(VcsError::MalformedOutput {
            expected,
            found: lines.len(),
        });
    }

    lines
        .into_iter()
        .map(|line| {
            let value = if expected == 1 {
                line.trim_end()
            } else {
                line.split_whitespace().next().unwrap_or_default()
            };

            value
                .get(2..)
                .map(str::to_string)
                .ok_or_else(|| VcsError::MalformedLine {
                    line: line.to_string(),
                })
        })
        .collect()
}

/// Branch locator backed by the Subversion command line client.
#[derive(Debug, Clone)]
pub struct SvnLocator {
    program: OsString,
    timeout: Duration,
}

impl SvnLocator {
    /// Construct new Subversion locator.
    ///
    /// Every query made through `program` is abandoned, and its process
    /// killed, once `timeout` runs out.
    pub fn new(program: impl Into<OsString>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }

    #[instrument(skip(self, candidates), level = "debug")]
    async fn locate_branches(&self, candidates: &BTreeSet<NormalizedPath>) -> Result<BranchMap> {
        let roots = control_roots(".svn", candidates);
        if roots.is_empty() {
            debug!("no subversion working copy among {} candidates", candidates.len());
            return Ok(BranchMap::new());
        }

        let unique = roots.values().cloned().collect::<BTreeSet<_>>();
        let unique = unique.into_iter().collect::<Vec<_>>();
        let mut args: Vec<OsString> = vec!["info".into(), "--show-item".into(), "relative-url".into()];
        args.extend(unique.iter().map(|root| root.as_os_str().to_os_string()));

        debug!("query relative url of {} subversion roots", unique.len());
        let output = syscall_non_interactive(&self.program, args, self.timeout).await?;
        let urls = parse_relative_urls(&output, unique.len())?;
        let by_root = unique.iter().zip(urls).collect::<HashMap<_, _>>();

        Ok(roots
            .into_iter()
            .filter_map(|(candidate, root)| by_root.get(&root).map(|url| (candidate, url.clone())))
            .collect())
    }
}

impl BranchLocator for SvnLocator {
    fn locate<'a>(
        &'a self,
        candidates: &'a BTreeSet<NormalizedPath>,
    ) -> BoxFuture<'a, Result<BranchMap>> {
        self.locate_branches(candidates).boxed()
    }
}

/// Branch locator backed by libgit2.
#[derive(Debug, Default, Clone, Copy)]
pub struct GitLocator;

impl BranchLocator for GitLocator {
    fn locate<'a>(
        &'a self,
        candidates: &'a BTreeSet<NormalizedPath>,
    ) -> BoxFuture<'a, Result<BranchMap>> {
        async move {
            let mut heads: HashMap<PathBuf, Option<String>> = HashMap::new();
            let mut branches = BranchMap::new();

            for (candidate, root) in control_roots(".git", candidates) {
                let branch = match heads.get(&root) {
                    Some(branch) => branch.clone(),
                    None => {
                        let branch = head_branch(&root)?;
                        heads.insert(root, branch.clone());
                        branch
                    }
                };

                if let Some(branch) = branch {
                    branches.insert(candidate, branch);
                }
            }

            Ok(branches)
        }
        .boxed()
    }
}

fn head_branch(root: &Path) -> Result<Option<String>> {
    let repository = Repository::open(root)?;
    let head = match repository.head() {
        Ok(head) => head,
        Err(error) if error.code() == ErrorCode::UnbornBranch => return Ok(None),
        Err(error) => return Err(error.into()),
    };

    if !head.is_branch() {
        return Ok(None);
    }

    Ok(head.shorthand().map(str::to_string))
}

/// Ordered chain of branch locators.
///
/// Each locator only sees the candidates that no earlier locator resolved.
#[derive(Default)]
pub struct LocatorChain {
    locators: Vec<Box<dyn BranchLocator>>,
}

impl LocatorChain {
    /// Construct new locator chain.
    pub fn new(locators: Vec<Box<dyn BranchLocator>>) -> Self {
        Self { locators }
    }

    /// Construct locator chain from version control settings.
    pub fn from_settings(settings: &VcsSettings) -> Self {
        let locators = settings
            .systems
            .iter()
            .map(|kind| -> Box<dyn BranchLocator> {
                match kind {
                    VcsKind::Svn => Box::new(SvnLocator::new(
                        &settings.svn_program,
                        Duration::from_secs(settings.timeout_secs),
                    )),
                    VcsKind::Git => Box::new(GitLocator),
                }
            })
            .collect();

        Self { locators }
    }
}

impl BranchLocator for LocatorChain {
    fn locate<'a>(
        &'a self,
        candidates: &'a BTreeSet<NormalizedPath>,
    ) -> BoxFuture<'a, Result<BranchMap>> {
        async move {
            let mut branches = BranchMap::new();
            let mut remaining = candidates.clone();

            for locator in &self.locators {
                if remaining.is_empty() {
                    break;
                }

                let found = locator.locate(&remaining).await?;
                for path in found.keys() {
                    remaining.remove(path);
                }
                branches.extend(found);
            }

            Ok(branches)
        }
        .boxed()
    }
}

async fn syscall_non_interactive(
    program: &OsString,
    args: Vec<OsString>,
    timeout: Duration,
) -> Result<String> {
    let mut command = Command::new(program);
    command.args(args).kill_on_drop(true);

    let output = tokio::time::timeout(timeout, command.output())
        .await
        .map_err(|_| VcsError::Timeout {
            program: program.clone(),
            timeout,
        })?
        .map_err(|source| VcsError::Spawn {
            source,
            program: program.clone(),
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(output.stderr.as_slice());
        return Err(VcsError::Syscall {
            program: program.clone(),
            message: stderr.trim_end().to_string(),
        });
    }

    Ok(String::from_utf8_lossy(output.stdout.as_slice()).into_owned())
}

/// Version control error types.
#[derive(Debug, thiserror::Error)]
pub enum VcsError {
    /// External client could not be started.
    #[error("failed to run {program:?}")]
    Spawn {
        #[source]
        source: std::io::Error,
        program: OsString,
    },

    /// External client did not answer in time.
    #[error("command {program:?} did not finish within {timeout:?}")]
    Timeout { program: OsString, timeout: Duration },

    /// External client exited with failure.
    #[error("command {program:?} failed:\n{message}")]
    Syscall { program: OsString, message: String },

    /// External client answered with the wrong number of lines.
    #[error("expected {expected} relative url lines, found {found}")]
    MalformedOutput { expected: usize, found: usize },

    /// External client answered with an unreadable line.
    #[error("malformed relative url line {line:?}")]
    MalformedLine { line: String },

    /// Operations from libgit2 fail.
    #[error(transparent)]
    Git2(#[from] git2::Error),
}

/// Friendly result alias :3
pub type Result<T, E = VcsError> = std::result::Result<T, E>;
